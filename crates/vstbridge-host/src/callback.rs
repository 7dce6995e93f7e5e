//! The `extern "C"` host callback and the per-instance context behind it.
//!
//! A plugin only hands back its descriptor pointer when it calls the host,
//! so contexts are looked up by that address. During construction the
//! plugin may call back before the host has seen the pointer; those calls
//! resolve through a thread-local constructing slot instead.

use parking_lot::RwLock;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use vstbridge_core::{
    BridgeError, HostOpcode, HostRequest, PluginDescriptor, ProcessLevel, RawCall, Result,
    TimeInfo, NOT_IMPLEMENTED, VST_VERSION,
};

use crate::host::Host;

/// Nested calls into one plugin allowed on a single thread, counting the
/// outermost one.
pub const MAX_REENTRY_DEPTH: u32 = 4;

/// Host state shared by one plugin instance and its callbacks.
pub struct HostContext {
    host: Arc<dyn Host>,
}

impl HostContext {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    fn handle(&self, call: RawCall) -> isize {
        // SAFETY: the plugin owns the payload for the duration of the call.
        let request = match unsafe { HostRequest::decode(call) } {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(opcode = ?HostOpcode(call.opcode), error = %e, "ignoring malformed host request");
                return NOT_IMPLEMENTED;
            }
        };
        let host = &self.host;

        match request {
            HostRequest::Automate { index, value } => {
                host.automate(index, value);
                0
            }
            HostRequest::Version => host.version() as isize,
            HostRequest::CurrentId => host.current_id() as isize,
            HostRequest::Idle => {
                host.idle();
                0
            }
            HostRequest::GetTime { mask } => match host.time_info(mask) {
                Some(info) => TIME_SLOT.with(|slot| {
                    slot.set(info);
                    slot.as_ptr() as isize
                }),
                None => 0,
            },
            HostRequest::ProcessEvents(events) => host.process_events(&events) as isize,
            HostRequest::IoChanged => host.io_changed() as isize,
            HostRequest::SampleRate => host.sample_rate() as isize,
            HostRequest::BlockSize => host.block_size() as isize,
            HostRequest::InputLatency => host.input_latency() as isize,
            HostRequest::OutputLatency => host.output_latency() as isize,
            HostRequest::ProcessLevel => host.process_level() as isize,
            HostRequest::AutomationState => host.automation_state() as isize,
            HostRequest::VendorString(mut buffer) => {
                buffer.write(&host.vendor_string());
                1
            }
            HostRequest::ProductString(mut buffer) => {
                buffer.write(&host.product_string());
                1
            }
            HostRequest::VendorVersion => host.vendor_version() as isize,
            HostRequest::CanDo(capability) => host.can_do(capability).to_raw(),
            HostRequest::Language => host.language() as isize,
            HostRequest::UpdateDisplay => host.update_display() as isize,
            HostRequest::BeginEdit(index) => {
                host.begin_edit(index);
                1
            }
            HostRequest::EndEdit(index) => {
                host.end_edit(index);
                1
            }
            HostRequest::Other(call) => host.other(call),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

type Registry = RwLock<HashMap<usize, Arc<HostContext>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

pub(crate) fn register(effect: *mut PluginDescriptor, context: Arc<HostContext>) {
    registry().write().insert(effect as usize, context);
}

pub(crate) fn unregister(effect: *mut PluginDescriptor) {
    registry().write().remove(&(effect as usize));
}

fn lookup(effect: *mut PluginDescriptor) -> Option<Arc<HostContext>> {
    registry().read().get(&(effect as usize)).cloned()
}

// ============================================================================
// Thread-local frames
// ============================================================================

const FRAME_SLOTS: usize = MAX_REENTRY_DEPTH as usize;

/// Descriptor addresses this thread is currently calling into, outermost
/// first. Fixed capacity so the audio thread never allocates.
struct FrameStack {
    effects: [usize; FRAME_SLOTS],
    len: usize,
}

thread_local! {
    static CONSTRUCTING: RefCell<Option<Arc<HostContext>>> = const { RefCell::new(None) };
    static FRAMES: RefCell<FrameStack> = const {
        RefCell::new(FrameStack { effects: [0; FRAME_SLOTS], len: 0 })
    };
    static CALLBACK_DEPTH: Cell<u32> = const { Cell::new(0) };
    static AUDIO_THREAD: Cell<bool> = const { Cell::new(false) };
    /// Answer to `GET_TIME`. The address stays valid until the next
    /// `GET_TIME` on the same thread.
    static TIME_SLOT: Cell<TimeInfo> = Cell::new(TimeInfo::default());
}

/// Run `f` with `context` answering callbacks from a plugin that has not
/// returned its descriptor yet.
pub(crate) fn with_constructing<R>(context: Arc<HostContext>, f: impl FnOnce() -> R) -> R {
    struct Reset(Option<Arc<HostContext>>);
    impl Drop for Reset {
        fn drop(&mut self) {
            let previous = self.0.take();
            CONSTRUCTING.with(|slot| *slot.borrow_mut() = previous);
        }
    }

    let previous = CONSTRUCTING.with(|slot| slot.borrow_mut().replace(context));
    let _reset = Reset(previous);
    f()
}

fn constructing() -> Option<Arc<HostContext>> {
    CONSTRUCTING.with(|slot| slot.borrow().clone())
}

/// Marks this thread as being inside a call to one plugin.
pub(crate) struct CallFrame(());

impl CallFrame {
    /// Whether this thread is already inside a call to `effect`.
    pub(crate) fn is_reentrant(effect: *mut PluginDescriptor) -> bool {
        let address = effect as usize;
        FRAMES.with(|frames| {
            let frames = frames.borrow();
            frames.effects[..frames.len].contains(&address)
        })
    }

    pub(crate) fn enter(effect: *mut PluginDescriptor) -> Result<Self> {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            if frames.len >= FRAME_SLOTS {
                return Err(BridgeError::ReentryLimit {
                    depth: frames.len as u32 + 1,
                });
            }
            let len = frames.len;
            frames.effects[len] = effect as usize;
            frames.len += 1;
            Ok(CallFrame(()))
        })
    }
}

impl Drop for CallFrame {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.len = frames.len.saturating_sub(1);
        });
    }
}

/// Marks this thread as the audio thread while alive.
pub(crate) struct AudioScope(bool);

impl AudioScope {
    pub(crate) fn enter() -> Self {
        AudioScope(AUDIO_THREAD.with(|flag| flag.replace(true)))
    }
}

impl Drop for AudioScope {
    fn drop(&mut self) {
        AUDIO_THREAD.with(|flag| flag.set(self.0));
    }
}

/// `Realtime` inside a process call on this thread, otherwise `User`.
pub fn current_process_level() -> ProcessLevel {
    if AUDIO_THREAD.with(Cell::get) {
        ProcessLevel::Realtime
    } else {
        ProcessLevel::User
    }
}

// ============================================================================
// Trampoline
// ============================================================================

/// The callback every plugin constructed by this crate receives.
///
/// # Safety
/// Called by plugins with arguments that follow the host-opcode contract.
pub unsafe extern "C" fn host_callback(
    effect: *mut PluginDescriptor,
    opcode: i32,
    index: i32,
    value: isize,
    ptr: *mut c_void,
    opt: f32,
) -> isize {
    let opcode = HostOpcode(opcode);
    let context = if effect.is_null() {
        constructing()
    } else {
        lookup(effect).or_else(constructing)
    };

    let Some(context) = context else {
        // Some plugins ask for the version before they have a descriptor.
        return if opcode == HostOpcode::VERSION {
            VST_VERSION as isize
        } else {
            tracing::trace!(?opcode, "callback from unknown instance");
            NOT_IMPLEMENTED
        };
    };

    let depth = CALLBACK_DEPTH.with(|d| {
        let depth = d.get() + 1;
        d.set(depth);
        depth
    });
    struct Unwind;
    impl Drop for Unwind {
        fn drop(&mut self) {
            CALLBACK_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
        }
    }
    let _unwind = Unwind;

    if depth > MAX_REENTRY_DEPTH {
        tracing::warn!(?opcode, depth, "host callback nested too deep");
        return NOT_IMPLEMENTED;
    }

    let call = RawCall::new(opcode.raw(), index, value, ptr, opt);
    panic::catch_unwind(AssertUnwindSafe(|| context.handle(call))).unwrap_or_else(|_| {
        tracing::error!(?opcode, "host panicked while answering a plugin callback");
        NOT_IMPLEMENTED
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::BridgeHost;
    use std::ptr;
    use vstbridge_core::strings::ReadBuffer;

    fn context() -> Arc<HostContext> {
        Arc::new(HostContext::new(Arc::new(BridgeHost::default())))
    }

    unsafe fn query(effect: *mut PluginDescriptor, opcode: HostOpcode) -> isize {
        host_callback(effect, opcode.raw(), 0, 0, ptr::null_mut(), 0.0)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    #[test]
    fn test_version_answered_without_context() {
        unsafe {
            assert_eq!(query(ptr::null_mut(), HostOpcode::VERSION), VST_VERSION as isize);
            assert_eq!(query(ptr::null_mut(), HostOpcode::GET_SAMPLE_RATE), 0);
        }
    }

    #[test]
    fn test_constructing_context_answers() {
        let rate = with_constructing(context(), || unsafe {
            query(ptr::null_mut(), HostOpcode::GET_SAMPLE_RATE)
        });
        assert_eq!(rate, 44100);
        assert!(constructing().is_none());
    }

    #[test]
    fn test_registered_context_answers() {
        let mut descriptor = Box::new(0u64);
        let effect = &mut *descriptor as *mut u64 as *mut PluginDescriptor;
        register(effect, context());
        unsafe {
            assert_eq!(query(effect, HostOpcode::GET_BLOCK_SIZE), 512);
            let mut vendor = ReadBuffer::new();
            let ok = host_callback(
                effect,
                HostOpcode::GET_VENDOR_STRING.raw(),
                0,
                0,
                vendor.as_mut_ptr(),
                0.0,
            );
            assert_eq!(ok, 1);
            assert_eq!(vendor.into_string(), "vstbridge");
        }
        unregister(effect);
        assert_eq!(unsafe { query(effect, HostOpcode::GET_BLOCK_SIZE) }, 0);
    }

    #[test]
    fn test_get_time_pointer_is_stable() {
        let mut descriptor = Box::new(0u64);
        let effect = &mut *descriptor as *mut u64 as *mut PluginDescriptor;
        register(effect, context());
        let first = unsafe { query(effect, HostOpcode::GET_TIME) };
        let second = unsafe { query(effect, HostOpcode::GET_TIME) };
        assert_ne!(first, 0);
        assert_eq!(first, second);
        let info = unsafe { *(first as *const TimeInfo) };
        assert_eq!(info.sample_rate, 44100.0);
        unregister(effect);
    }

    #[test]
    fn test_get_time_slot_per_thread() {
        let mut descriptor = Box::new(0u64);
        let effect = &mut *descriptor as *mut u64 as *mut PluginDescriptor;
        register(effect, context());
        let address = effect as usize;

        let here = unsafe { query(effect, HostOpcode::GET_TIME) };
        let there = std::thread::spawn(move || {
            let effect = address as *mut PluginDescriptor;
            let reply = unsafe { query(effect, HostOpcode::GET_TIME) };
            let info = unsafe { *(reply as *const TimeInfo) };
            (reply, info.sample_rate)
        })
        .join()
        .unwrap();

        assert_ne!(here, 0);
        assert_ne!(there.0, 0);
        assert_ne!(here, there.0);
        assert_eq!(there.1, 44100.0);
        let info = unsafe { *(here as *const TimeInfo) };
        assert_eq!(info.sample_rate, 44100.0);
        unregister(effect);
    }

    // ========================================================================
    // Frames
    // ========================================================================

    #[test]
    fn test_frames_bounded() {
        let effect = ptr::NonNull::<PluginDescriptor>::dangling().as_ptr();
        assert!(!CallFrame::is_reentrant(effect));
        let mut frames = Vec::new();
        for _ in 0..MAX_REENTRY_DEPTH {
            frames.push(CallFrame::enter(effect).unwrap());
        }
        assert!(CallFrame::is_reentrant(effect));
        assert!(matches!(
            CallFrame::enter(effect),
            Err(BridgeError::ReentryLimit { .. })
        ));
        frames.clear();
        assert!(!CallFrame::is_reentrant(effect));
    }

    #[test]
    fn test_audio_scope_sets_process_level() {
        assert_eq!(current_process_level(), ProcessLevel::User);
        {
            let _scope = AudioScope::enter();
            assert_eq!(current_process_level(), ProcessLevel::Realtime);
        }
        assert_eq!(current_process_level(), ProcessLevel::User);
    }
}
