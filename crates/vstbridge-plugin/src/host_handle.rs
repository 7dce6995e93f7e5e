//! The plugin's side of the host callback.

use std::ffi::{c_void, CString};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::sync::Arc;

use vstbridge_core::abi::string_len;
use vstbridge_core::strings::ReadBuffer;
use vstbridge_core::{
    CanDo, EventQueue, HostCallbackProc, HostOpcode, PluginDescriptor, ProcessLevel, TimeInfo,
    NOT_IMPLEMENTED,
};

/// Nested host calls allowed from a single plugin instance.
pub const MAX_CALLBACK_DEPTH: u32 = 8;

struct HostLink {
    callback: Option<HostCallbackProc>,
    effect: AtomicPtr<PluginDescriptor>,
    depth: AtomicU32,
}

/// Cheap, cloneable handle for calling into the host.
///
/// Captured at construction; it becomes inert once the instance is closed,
/// so late calls from plugin threads return defaults instead of reaching a
/// host that has already retired the callback.
#[derive(Clone)]
pub struct HostHandle {
    link: Arc<HostLink>,
}

struct DepthGuard<'a>(&'a AtomicU32);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl HostHandle {
    pub(crate) fn new(callback: HostCallbackProc, effect: *mut PluginDescriptor) -> Self {
        Self {
            link: Arc::new(HostLink {
                callback: Some(callback),
                effect: AtomicPtr::new(effect),
                depth: AtomicU32::new(0),
            }),
        }
    }

    /// A handle with no host behind it, for tests and offline use.
    pub fn detached() -> Self {
        Self {
            link: Arc::new(HostLink {
                callback: None,
                effect: AtomicPtr::new(ptr::null_mut()),
                depth: AtomicU32::new(0),
            }),
        }
    }

    pub(crate) fn attach(&self, effect: *mut PluginDescriptor) {
        self.link.effect.store(effect, Ordering::Release);
    }

    pub(crate) fn detach(&self) {
        self.link.effect.store(ptr::null_mut(), Ordering::Release);
    }

    pub fn is_attached(&self) -> bool {
        self.link.callback.is_some() && !self.link.effect.load(Ordering::Acquire).is_null()
    }

    /// Raw host call. Returns `NOT_IMPLEMENTED` when detached or nested
    /// deeper than [`MAX_CALLBACK_DEPTH`].
    ///
    /// # Safety
    /// `ptr` must satisfy the host's contract for `opcode`.
    pub unsafe fn call(
        &self,
        opcode: HostOpcode,
        index: i32,
        value: isize,
        ptr: *mut c_void,
        opt: f32,
    ) -> isize {
        let Some(callback) = self.link.callback else {
            return NOT_IMPLEMENTED;
        };
        let effect = self.link.effect.load(Ordering::Acquire);
        if effect.is_null() {
            return NOT_IMPLEMENTED;
        }

        let depth = self.link.depth.fetch_add(1, Ordering::AcqRel) + 1;
        let _guard = DepthGuard(&self.link.depth);
        if depth > MAX_CALLBACK_DEPTH {
            tracing::warn!(?opcode, depth, "host callback nesting too deep");
            return NOT_IMPLEMENTED;
        }

        callback(effect, opcode.raw(), index, value, ptr, opt)
    }

    fn query(&self, opcode: HostOpcode) -> isize {
        unsafe { self.call(opcode, 0, 0, ptr::null_mut(), 0.0) }
    }

    pub fn version(&self) -> i32 {
        self.query(HostOpcode::VERSION) as i32
    }

    /// Report a parameter change made by the plugin (e.g. from its UI).
    pub fn automate(&self, index: i32, value: f32) {
        unsafe { self.call(HostOpcode::AUTOMATE, index, 0, ptr::null_mut(), value) };
    }

    pub fn begin_edit(&self, index: i32) {
        unsafe { self.call(HostOpcode::BEGIN_EDIT, index, 0, ptr::null_mut(), 0.0) };
    }

    pub fn end_edit(&self, index: i32) {
        unsafe { self.call(HostOpcode::END_EDIT, index, 0, ptr::null_mut(), 0.0) };
    }

    pub fn current_id(&self) -> i32 {
        self.query(HostOpcode::CURRENT_ID) as i32
    }

    pub fn idle(&self) {
        self.query(HostOpcode::IDLE);
    }

    pub fn sample_rate(&self) -> Option<f32> {
        match self.query(HostOpcode::GET_SAMPLE_RATE) {
            rate if rate > 0 => Some(rate as f32),
            _ => None,
        }
    }

    pub fn block_size(&self) -> Option<i32> {
        match self.query(HostOpcode::GET_BLOCK_SIZE) {
            size if size > 0 => Some(size as i32),
            _ => None,
        }
    }

    pub fn input_latency(&self) -> i32 {
        self.query(HostOpcode::GET_INPUT_LATENCY) as i32
    }

    pub fn output_latency(&self) -> i32 {
        self.query(HostOpcode::GET_OUTPUT_LATENCY) as i32
    }

    /// Copy of the host's transport, if it answers. `mask` selects the
    /// `time_info_flags` the plugin needs.
    pub fn time_info(&self, mask: i32) -> Option<TimeInfo> {
        let ptr = unsafe { self.call(HostOpcode::GET_TIME, 0, mask as isize, ptr::null_mut(), 0.0) };
        if ptr == 0 {
            return None;
        }
        // SAFETY: a non-zero answer is a pointer to a `TimeInfo` valid until
        // the next host call.
        Some(unsafe { *(ptr as *const TimeInfo) })
    }

    /// Send events (e.g. MIDI output) to the host.
    pub fn process_events(&self, queue: &mut EventQueue) -> bool {
        if queue.is_empty() {
            return false;
        }
        let raw = queue.as_raw();
        unsafe { self.call(HostOpcode::PROCESS_EVENTS, 0, 0, raw as *mut c_void, 0.0) != 0 }
    }

    /// Tell the host that I/O counts or latency changed.
    pub fn io_changed(&self) -> bool {
        self.query(HostOpcode::IO_CHANGED) != 0
    }

    pub fn update_display(&self) -> bool {
        self.query(HostOpcode::UPDATE_DISPLAY) != 0
    }

    pub fn process_level(&self) -> ProcessLevel {
        ProcessLevel::from_raw(self.query(HostOpcode::GET_CURRENT_PROCESS_LEVEL))
    }

    pub fn automation_state(&self) -> i32 {
        self.query(HostOpcode::GET_AUTOMATION_STATE) as i32
    }

    pub fn language(&self) -> i32 {
        self.query(HostOpcode::GET_LANGUAGE) as i32
    }

    pub fn vendor_version(&self) -> i32 {
        self.query(HostOpcode::GET_VENDOR_VERSION) as i32
    }

    pub fn can_do(&self, capability: &str) -> CanDo {
        let Ok(capability) = CString::new(capability) else {
            return CanDo::No;
        };
        let answer = unsafe {
            self.call(
                HostOpcode::CAN_DO,
                0,
                0,
                capability.as_ptr() as *mut c_void,
                0.0,
            )
        };
        CanDo::from_raw(answer)
    }

    pub fn vendor_string(&self) -> Option<String> {
        self.read_string(HostOpcode::GET_VENDOR_STRING)
    }

    pub fn product_string(&self) -> Option<String> {
        self.read_string(HostOpcode::GET_PRODUCT_STRING)
    }

    fn read_string(&self, opcode: HostOpcode) -> Option<String> {
        debug_assert!(string_len::VENDOR <= string_len::HOST_READ);
        let mut buffer = ReadBuffer::new();
        let ok = unsafe { self.call(opcode, 0, 0, buffer.as_mut_ptr(), 0.0) };
        (ok != 0).then(|| buffer.into_string())
    }
}
