//! A constructed foreign plugin and every call the host makes into it.
//!
//! Control calls serialize on a per-instance lock. A call made on a thread
//! that is already inside this plugin (the plugin called the host, and the
//! host calls back in) skips the lock, since the outer frame already holds
//! it. The audio path only ever `try_lock`s and zero-fills when it loses.

use parking_lot::{Mutex, MutexGuard};
use std::ffi::{c_void, CString};
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;

use vstbridge_core::abi::string_len;
use vstbridge_core::strings::ReadBuffer;
use vstbridge_core::{
    BridgeError, CanDo, ChannelBuffers, ChunkKind, DescriptorInfo, EffectFlags, EntryPointProc,
    EventQueue, LifecycleState, Operation, ParameterProperties, PluginCategory, PluginDescriptor,
    PluginOpcode, PluginSnapshot, ProtocolViolation, Result, Sample, SampleFormat,
    SpeakerArrangement, Transition,
};

use crate::callback::{self, AudioScope, CallFrame, HostContext};
use crate::config::HostConfig;
use crate::host::Host;
use crate::loader::Module;

/// Outcome of one [`PluginInstance::process`] call. Every outcome except
/// `Processed` leaves the outputs zero-filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Processed,
    NotProcessing(LifecycleState),
    /// A control call holds the instance.
    Busy,
    ChannelMismatch { expected: usize, actual: usize },
    Unsupported(SampleFormat),
    Closed,
}

/// Exclusive access for one call into the plugin.
struct Access<'a> {
    _frame: CallFrame,
    _guard: Option<MutexGuard<'a, ()>>,
}

pub struct PluginInstance {
    effect: *mut PluginDescriptor,
    context: Arc<HostContext>,
    info: DescriptorInfo,
    state: AtomicU8,
    latency: AtomicI32,
    gate: Mutex<()>,
    /// Keeps the code behind `effect` mapped; dropped last.
    _module: Option<Arc<Module>>,
}

// All calls through `effect` are serialized by `gate` or happen on the
// thread that already holds it.
unsafe impl Send for PluginInstance {}
unsafe impl Sync for PluginInstance {}

impl PluginInstance {
    /// Call `entry` and validate what it returns.
    ///
    /// # Safety
    /// `entry` must be a plugin entry point, and any library it lives in
    /// must stay loaded for the life of the instance.
    pub unsafe fn construct(entry: EntryPointProc, host: Arc<dyn Host>) -> Result<Self> {
        Self::construct_with_module(entry, host, None)
    }

    pub(crate) unsafe fn construct_with_module(
        entry: EntryPointProc,
        host: Arc<dyn Host>,
        module: Option<Arc<Module>>,
    ) -> Result<Self> {
        let context = Arc::new(HostContext::new(host));
        let effect = callback::with_constructing(Arc::clone(&context), || {
            entry(Some(callback::host_callback))
        });

        let descriptor = PluginDescriptor::validate(effect)?;
        let info = DescriptorInfo::from_descriptor(descriptor);
        callback::register(effect, Arc::clone(&context));

        tracing::debug!(
            unique_id = format_args!("{:#010x}", info.unique_id),
            inputs = info.num_inputs,
            outputs = info.num_outputs,
            params = info.num_params,
            f64 = info.supports_f64,
            "plugin constructed"
        );

        Ok(Self {
            effect,
            context,
            info,
            state: AtomicU8::new(LifecycleState::Constructed.to_u8()),
            latency: AtomicI32::new(info.initial_delay),
            gate: Mutex::new(()),
            _module: module,
        })
    }

    /// Construct, open, and apply the sample rate and block size.
    ///
    /// # Safety
    /// Same as [`PluginInstance::construct`].
    pub unsafe fn instantiate(
        entry: EntryPointProc,
        host: Arc<dyn Host>,
        config: &HostConfig,
    ) -> Result<Self> {
        let instance = Self::construct(entry, host)?;
        instance.setup(config)?;
        Ok(instance)
    }

    pub(crate) fn setup(&self, config: &HostConfig) -> Result<()> {
        self.open()?;
        self.set_sample_rate(config.sample_rate)?;
        self.set_block_size(config.block_size)?;
        Ok(())
    }

    pub fn info(&self) -> &DescriptorInfo {
        &self.info
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        self.context.host()
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn as_ptr(&self) -> *mut PluginDescriptor {
        self.effect
    }

    pub fn supports(&self, format: SampleFormat) -> bool {
        match format {
            SampleFormat::Float32 => true,
            SampleFormat::Float64 => self.info.supports_f64,
        }
    }

    /// Latency in samples, re-read on every resume.
    pub fn latency(&self) -> usize {
        self.latency.load(Ordering::Acquire).max(0) as usize
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    fn check(&self, operation: Operation) -> Result<()> {
        match self.state().check(operation) {
            Ok(()) => Ok(()),
            Err(violation) if violation.state == LifecycleState::Closed => Err(BridgeError::Closed),
            Err(violation) => Err(violation.into()),
        }
    }

    fn transition(&self, transition: Transition) -> Result<(LifecycleState, LifecycleState)> {
        let state = self.state();
        match state.apply(transition) {
            Ok(next) => Ok((state, next)),
            Err(_) if state == LifecycleState::Closed => Err(BridgeError::Closed),
            Err(violation) => Err(violation.into()),
        }
    }

    fn enter(&self) -> Result<Access<'_>> {
        if CallFrame::is_reentrant(self.effect) {
            return Ok(Access {
                _frame: CallFrame::enter(self.effect)?,
                _guard: None,
            });
        }
        let guard = self.gate.lock();
        Ok(Access {
            _frame: CallFrame::enter(self.effect)?,
            _guard: Some(guard),
        })
    }

    /// Enter, then re-check the state under the lock.
    fn enter_checked(&self, operation: Operation) -> Result<Access<'_>> {
        self.check(operation)?;
        let access = self.enter()?;
        self.check(operation)?;
        Ok(access)
    }

    unsafe fn call(
        &self,
        opcode: PluginOpcode,
        index: i32,
        value: isize,
        ptr: *mut c_void,
        opt: f32,
    ) -> isize {
        tracing::trace!(?opcode, index, value, "dispatch");
        match (*self.effect).dispatcher {
            Some(dispatcher) => dispatcher(self.effect, opcode.raw(), index, value, ptr, opt),
            None => 0,
        }
    }

    fn query(&self, opcode: PluginOpcode) -> Result<isize> {
        let _access = self.enter_checked(Operation::Dispatch)?;
        Ok(unsafe { self.call(opcode, 0, 0, ptr::null_mut(), 0.0) })
    }

    fn read_string(&self, opcode: PluginOpcode, index: i32) -> Result<String> {
        let _access = self.enter_checked(Operation::Dispatch)?;
        let mut buffer = ReadBuffer::new();
        unsafe { self.call(opcode, index, 0, buffer.as_mut_ptr(), 0.0) };
        Ok(buffer.into_string())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn open(&self) -> Result<()> {
        let _access = self.enter()?;
        let (state, next) = self.transition(Transition::Open)?;
        if state == LifecycleState::Constructed {
            unsafe { self.call(PluginOpcode::OPEN, 0, 0, ptr::null_mut(), 0.0) };
        }
        self.set_state(next);
        Ok(())
    }

    /// Enter `Processing`. Resuming while processing is a no-op.
    pub fn resume(&self) -> Result<()> {
        let _access = self.enter()?;
        let (state, next) = self.transition(Transition::Resume)?;
        if state != LifecycleState::Processing {
            unsafe {
                self.call(PluginOpcode::MAINS_CHANGED, 0, 1, ptr::null_mut(), 0.0);
                self.call(PluginOpcode::START_PROCESS, 0, 0, ptr::null_mut(), 0.0);
                self.latency.store((*self.effect).initial_delay, Ordering::Release);
            }
            tracing::debug!(latency = self.latency(), "plugin resumed");
        }
        self.set_state(next);
        Ok(())
    }

    /// Leave `Processing`. Suspending while suspended is a no-op.
    pub fn suspend(&self) -> Result<()> {
        let _access = self.enter()?;
        let (state, next) = self.transition(Transition::Suspend)?;
        if state == LifecycleState::Processing {
            unsafe {
                self.call(PluginOpcode::STOP_PROCESS, 0, 0, ptr::null_mut(), 0.0);
                self.call(PluginOpcode::MAINS_CHANGED, 0, 0, ptr::null_mut(), 0.0);
            }
        }
        self.set_state(next);
        Ok(())
    }

    /// Close the plugin. Every later call is rejected without reaching it.
    pub fn close(&self) -> Result<()> {
        if CallFrame::is_reentrant(self.effect) {
            return Err(ProtocolViolation {
                state: self.state(),
                operation: Operation::Close,
            }
            .into());
        }
        let _access = self.enter()?;
        let (state, _) = self.transition(Transition::Close)?;
        unsafe {
            if state == LifecycleState::Processing {
                self.call(PluginOpcode::STOP_PROCESS, 0, 0, ptr::null_mut(), 0.0);
                self.call(PluginOpcode::MAINS_CHANGED, 0, 0, ptr::null_mut(), 0.0);
            }
            self.set_state(LifecycleState::Closed);
            self.call(PluginOpcode::CLOSE, 0, 0, ptr::null_mut(), 0.0);
        }
        callback::unregister(self.effect);
        tracing::debug!("plugin closed");
        Ok(())
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub fn set_sample_rate(&self, rate: f32) -> Result<()> {
        let _access = self.enter_checked(Operation::Dispatch)?;
        unsafe { self.call(PluginOpcode::SET_SAMPLE_RATE, 0, 0, ptr::null_mut(), rate) };
        Ok(())
    }

    pub fn set_block_size(&self, frames: usize) -> Result<()> {
        let _access = self.enter_checked(Operation::Dispatch)?;
        unsafe {
            self.call(PluginOpcode::SET_BLOCK_SIZE, 0, frames as isize, ptr::null_mut(), 0.0)
        };
        Ok(())
    }

    /// Announce the precision of upcoming process calls.
    pub fn set_process_precision(&self, format: SampleFormat) -> Result<()> {
        if !self.supports(format) {
            return Err(BridgeError::UnsupportedPrecision(format));
        }
        let _access = self.enter_checked(Operation::Dispatch)?;
        let value = match format {
            SampleFormat::Float32 => 0,
            SampleFormat::Float64 => 1,
        };
        unsafe { self.call(PluginOpcode::SET_PROCESS_PRECISION, 0, value, ptr::null_mut(), 0.0) };
        Ok(())
    }

    /// Returns whether the plugin handles bypass itself.
    pub fn set_bypass(&self, bypass: bool) -> Result<bool> {
        let _access = self.enter_checked(Operation::Dispatch)?;
        let handled = unsafe {
            self.call(PluginOpcode::SET_BYPASS, 0, bypass as isize, ptr::null_mut(), 0.0)
        };
        Ok(handled != 0)
    }

    /// Propose channel layouts while audio is stopped. Returns whether the
    /// plugin accepted them.
    pub fn set_speaker_arrangement(
        &self,
        input: &SpeakerArrangement,
        output: &SpeakerArrangement,
    ) -> Result<bool> {
        let _access = self.enter_checked(Operation::Configure)?;
        let accepted = unsafe {
            self.call(
                PluginOpcode::SET_SPEAKER_ARRANGEMENT,
                0,
                input as *const SpeakerArrangement as isize,
                output as *const SpeakerArrangement as *mut c_void,
                0.0,
            )
        };
        Ok(accepted > 0)
    }

    // ========================================================================
    // Parameters and programs
    // ========================================================================

    pub fn parameter_count(&self) -> usize {
        self.info.num_params.max(0) as usize
    }

    fn check_parameter(&self, index: i32) -> Result<()> {
        if index < 0 || index >= self.info.num_params {
            return Err(BridgeError::ParameterOutOfRange {
                index,
                count: self.info.num_params,
            });
        }
        Ok(())
    }

    pub fn get_parameter(&self, index: i32) -> Result<f32> {
        self.check_parameter(index)?;
        let _access = self.enter_checked(Operation::Parameter)?;
        Ok(match unsafe { (*self.effect).get_parameter } {
            Some(get) => unsafe { get(self.effect, index) },
            None => 0.0,
        })
    }

    pub fn set_parameter(&self, index: i32, value: f32) -> Result<()> {
        self.check_parameter(index)?;
        let _access = self.enter_checked(Operation::Parameter)?;
        if let Some(set) = unsafe { (*self.effect).set_parameter } {
            unsafe { set(self.effect, index, value) };
        }
        Ok(())
    }

    pub fn parameter_name(&self, index: i32) -> Result<String> {
        self.check_parameter(index)?;
        self.read_string(PluginOpcode::GET_PARAM_NAME, index)
    }

    pub fn parameter_label(&self, index: i32) -> Result<String> {
        self.check_parameter(index)?;
        self.read_string(PluginOpcode::GET_PARAM_LABEL, index)
    }

    pub fn parameter_display(&self, index: i32) -> Result<String> {
        self.check_parameter(index)?;
        self.read_string(PluginOpcode::GET_PARAM_DISPLAY, index)
    }

    /// Display hints, if the plugin provides them for this parameter.
    pub fn parameter_properties(&self, index: i32) -> Result<Option<ParameterProperties>> {
        self.check_parameter(index)?;
        let _access = self.enter_checked(Operation::Dispatch)?;
        let mut properties = ParameterProperties::new();
        let answered = unsafe {
            self.call(
                PluginOpcode::GET_PARAMETER_PROPERTIES,
                index,
                0,
                &mut properties as *mut ParameterProperties as *mut c_void,
                0.0,
            )
        };
        Ok((answered > 0).then_some(properties))
    }

    pub fn can_be_automated(&self, index: i32) -> Result<bool> {
        self.check_parameter(index)?;
        let _access = self.enter_checked(Operation::Dispatch)?;
        Ok(unsafe { self.call(PluginOpcode::CAN_BE_AUTOMATED, index, 0, ptr::null_mut(), 0.0) } != 0)
    }

    /// Let the plugin parse `text` into the parameter.
    pub fn string_to_parameter(&self, index: i32, text: &str) -> Result<bool> {
        self.check_parameter(index)?;
        let text = CString::new(text)
            .map_err(|_| BridgeError::MalformedPayload("parameter text contains NUL".into()))?;
        let _access = self.enter_checked(Operation::Dispatch)?;
        let accepted = unsafe {
            self.call(
                PluginOpcode::STRING_TO_PARAMETER,
                index,
                0,
                text.as_ptr() as *mut c_void,
                0.0,
            )
        };
        Ok(accepted != 0)
    }

    pub fn program(&self) -> Result<i32> {
        Ok(self.query(PluginOpcode::GET_PROGRAM)? as i32)
    }

    pub fn set_program(&self, program: i32) -> Result<()> {
        let _access = self.enter_checked(Operation::Dispatch)?;
        unsafe { self.call(PluginOpcode::SET_PROGRAM, 0, program as isize, ptr::null_mut(), 0.0) };
        Ok(())
    }

    pub fn program_name(&self) -> Result<String> {
        self.read_string(PluginOpcode::GET_PROGRAM_NAME, 0)
    }

    /// Rename the current program; truncated to the protocol's limit.
    pub fn set_program_name(&self, name: &str) -> Result<()> {
        let mut bytes: Vec<u8> = name.bytes().filter(|b| *b != 0).collect();
        bytes.truncate(string_len::PROGRAM_NAME - 1);
        let name = CString::new(bytes)
            .map_err(|_| BridgeError::MalformedPayload("program name contains NUL".into()))?;
        let _access = self.enter_checked(Operation::Dispatch)?;
        unsafe {
            self.call(PluginOpcode::SET_PROGRAM_NAME, 0, 0, name.as_ptr() as *mut c_void, 0.0)
        };
        Ok(())
    }

    /// Name of any program without switching to it, if the plugin supports it.
    pub fn program_name_indexed(&self, program: i32) -> Result<Option<String>> {
        let _access = self.enter_checked(Operation::Dispatch)?;
        let mut buffer = ReadBuffer::new();
        let ok = unsafe {
            self.call(
                PluginOpcode::GET_PROGRAM_NAME_INDEXED,
                program,
                0,
                buffer.as_mut_ptr(),
                0.0,
            )
        };
        Ok((ok != 0).then(|| buffer.into_string()))
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Copy of the plugin's opaque state, if it exposes chunks.
    pub fn chunk(&self, kind: ChunkKind) -> Result<Option<Vec<u8>>> {
        if !self.info.effect_flags().contains(EffectFlags::PROGRAM_CHUNKS) {
            return Ok(None);
        }
        let _access = self.enter_checked(Operation::Dispatch)?;
        let mut data: *mut c_void = ptr::null_mut();
        let len = unsafe {
            self.call(
                PluginOpcode::GET_CHUNK,
                kind.index(),
                0,
                &mut data as *mut *mut c_void as *mut c_void,
                0.0,
            )
        };
        if len <= 0 || data.is_null() {
            return Ok(None);
        }
        // SAFETY: the plugin keeps the chunk alive until its next chunk call,
        // which cannot happen while we hold the instance.
        let bytes = unsafe { std::slice::from_raw_parts(data as *const u8, len as usize) };
        Ok(Some(bytes.to_vec()))
    }

    pub fn set_chunk(&self, kind: ChunkKind, data: &[u8]) -> Result<bool> {
        let _access = self.enter_checked(Operation::Dispatch)?;
        let accepted = unsafe {
            self.call(
                PluginOpcode::SET_CHUNK,
                kind.index(),
                data.len() as isize,
                data.as_ptr() as *mut c_void,
                0.0,
            )
        };
        Ok(accepted != 0)
    }

    pub fn snapshot(&self) -> Result<PluginSnapshot> {
        let parameters = (0..self.info.num_params)
            .map(|index| self.get_parameter(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(PluginSnapshot {
            unique_id: self.info.unique_id,
            version: self.info.version,
            program: self.program()?,
            parameters,
            chunk: self.chunk(ChunkKind::Bank)?,
        })
    }

    /// Restore a snapshot taken from the same plugin.
    pub fn restore(&self, snapshot: &PluginSnapshot) -> Result<()> {
        snapshot.check_identity(self.info.unique_id)?;
        self.set_program(snapshot.program)?;
        match &snapshot.chunk {
            Some(chunk) => {
                if !self.set_chunk(ChunkKind::Bank, chunk)? {
                    return Err(BridgeError::StateRestoreError(
                        "plugin rejected the chunk".into(),
                    ));
                }
            }
            None => {
                for (index, value) in snapshot.parameters.iter().enumerate() {
                    if (index as i32) < self.info.num_params {
                        self.set_parameter(index as i32, *value)?;
                    }
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn effect_name(&self) -> Result<String> {
        self.read_string(PluginOpcode::GET_EFFECT_NAME, 0)
    }

    pub fn vendor_string(&self) -> Result<String> {
        self.read_string(PluginOpcode::GET_VENDOR_STRING, 0)
    }

    pub fn product_string(&self) -> Result<String> {
        self.read_string(PluginOpcode::GET_PRODUCT_STRING, 0)
    }

    pub fn vendor_version(&self) -> Result<i32> {
        Ok(self.query(PluginOpcode::GET_VENDOR_VERSION)? as i32)
    }

    pub fn vst_version(&self) -> Result<i32> {
        Ok(self.query(PluginOpcode::GET_VST_VERSION)? as i32)
    }

    pub fn category(&self) -> Result<PluginCategory> {
        Ok(PluginCategory::from_raw(
            self.query(PluginOpcode::GET_PLUGIN_CATEGORY)?,
        ))
    }

    pub fn tail_size(&self) -> Result<isize> {
        self.query(PluginOpcode::GET_TAIL_SIZE)
    }

    pub fn midi_channels(&self) -> Result<(i32, i32)> {
        let inputs = self.query(PluginOpcode::GET_NUM_MIDI_INPUT_CHANNELS)? as i32;
        let outputs = self.query(PluginOpcode::GET_NUM_MIDI_OUTPUT_CHANNELS)? as i32;
        Ok((inputs, outputs))
    }

    pub fn can_do(&self, capability: &str) -> Result<CanDo> {
        let capability = CString::new(capability)
            .map_err(|_| BridgeError::MalformedPayload("capability contains NUL".into()))?;
        let _access = self.enter_checked(Operation::Dispatch)?;
        let answer = unsafe {
            self.call(PluginOpcode::CAN_DO, 0, 0, capability.as_ptr() as *mut c_void, 0.0)
        };
        Ok(CanDo::from_raw(answer))
    }

    /// Forward any opcode with raw arguments.
    ///
    /// # Safety
    /// `ptr` must satisfy the plugin's contract for `opcode`.
    pub unsafe fn dispatch_raw(
        &self,
        opcode: PluginOpcode,
        index: i32,
        value: isize,
        ptr: *mut c_void,
        opt: f32,
    ) -> Result<isize> {
        let _access = self.enter_checked(Operation::Dispatch)?;
        Ok(self.call(opcode, index, value, ptr, opt))
    }

    // ========================================================================
    // Audio
    // ========================================================================

    /// Deliver events for the next block. Only accepted while processing.
    pub fn process_events(&self, queue: &mut EventQueue) -> Result<bool> {
        let _access = self.enter_checked(Operation::Events)?;
        if queue.is_empty() {
            return Ok(false);
        }
        let raw = queue.as_raw();
        Ok(unsafe { self.call(PluginOpcode::PROCESS_EVENTS, 0, 0, raw as *mut c_void, 0.0) } != 0)
    }

    /// Run one block over `buffers`. Never blocks and never allocates.
    pub fn process<T: Sample>(&self, buffers: &mut ChannelBuffers<T>) -> ProcessStatus {
        let status = self.try_process(buffers);
        if status != ProcessStatus::Processed {
            buffers.zero_outputs();
        }
        status
    }

    fn try_process<T: Sample>(&self, buffers: &mut ChannelBuffers<T>) -> ProcessStatus {
        if self.state() == LifecycleState::Closed {
            return ProcessStatus::Closed;
        }
        if buffers.num_inputs() != self.info.inputs() {
            return ProcessStatus::ChannelMismatch {
                expected: self.info.inputs(),
                actual: buffers.num_inputs(),
            };
        }
        if buffers.num_outputs() != self.info.outputs() {
            return ProcessStatus::ChannelMismatch {
                expected: self.info.outputs(),
                actual: buffers.num_outputs(),
            };
        }
        if !self.supports(T::FORMAT) {
            return ProcessStatus::Unsupported(T::FORMAT);
        }
        if CallFrame::is_reentrant(self.effect) {
            return ProcessStatus::Busy;
        }
        let Some(_guard) = self.gate.try_lock() else {
            return ProcessStatus::Busy;
        };
        match self.state() {
            LifecycleState::Processing => {}
            LifecycleState::Closed => return ProcessStatus::Closed,
            state => return ProcessStatus::NotProcessing(state),
        }
        let Ok(_frame) = CallFrame::enter(self.effect) else {
            return ProcessStatus::Busy;
        };
        let _audio = AudioScope::enter();

        let frames = buffers.frames() as i32;
        if frames == 0 {
            return ProcessStatus::Processed;
        }
        let (inputs, outputs) = buffers.raw_tables();

        unsafe {
            match T::FORMAT {
                SampleFormat::Float32 => {
                    let inputs = inputs as *const *const f32;
                    let outputs = outputs as *mut *mut f32;
                    if let Some(process) = (*self.effect).process_replacing {
                        process(self.effect, inputs, outputs, frames);
                    } else if let Some(process) = (*self.effect).process {
                        // Accumulating entry adds into the outputs.
                        buffers.zero_outputs();
                        process(self.effect, inputs, outputs, frames);
                    } else {
                        return ProcessStatus::Unsupported(T::FORMAT);
                    }
                }
                SampleFormat::Float64 => match (*self.effect).process_double_replacing {
                    Some(process) => process(
                        self.effect,
                        inputs as *const *const f64,
                        outputs as *mut *mut f64,
                        frames,
                    ),
                    None => return ProcessStatus::Unsupported(T::FORMAT),
                },
            }
        }
        ProcessStatus::Processed
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        if self.state() != LifecycleState::Closed {
            if let Err(e) = self.close() {
                tracing::warn!(error = %e, "failed to close plugin on drop");
            }
        }
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("info", &self.info)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::BridgeHost;
    use std::cell::UnsafeCell;
    use vstbridge_core::{DescriptorEntryPoints, MAGIC};

    unsafe extern "C" fn null_entry(
        _callback: Option<vstbridge_core::HostCallbackProc>,
    ) -> *mut PluginDescriptor {
        ptr::null_mut()
    }

    struct Slot(UnsafeCell<[u8; std::mem::size_of::<PluginDescriptor>()]>);
    unsafe impl Sync for Slot {}

    static GARBAGE: Slot = Slot(UnsafeCell::new([0xAB; std::mem::size_of::<PluginDescriptor>()]));

    unsafe extern "C" fn garbage_entry(
        _callback: Option<vstbridge_core::HostCallbackProc>,
    ) -> *mut PluginDescriptor {
        GARBAGE.0.get() as *mut PluginDescriptor
    }

    unsafe extern "C" fn dispatcher(
        _effect: *mut PluginDescriptor,
        _opcode: i32,
        _index: i32,
        _value: isize,
        _ptr: *mut c_void,
        _opt: f32,
    ) -> isize {
        0
    }

    unsafe extern "C" fn set_parameter(_effect: *mut PluginDescriptor, _index: i32, _value: f32) {}

    unsafe extern "C" fn get_parameter(_effect: *mut PluginDescriptor, _index: i32) -> f32 {
        0.0
    }

    unsafe extern "C" fn process(
        _effect: *mut PluginDescriptor,
        _inputs: *const *const f32,
        outputs: *mut *mut f32,
        frames: i32,
    ) {
        let out = *outputs;
        for i in 0..frames as usize {
            *out.add(i) = 1.0;
        }
    }

    unsafe extern "C" fn mono_entry(
        callback: Option<vstbridge_core::HostCallbackProc>,
    ) -> *mut PluginDescriptor {
        assert!(callback.is_some());
        let mut descriptor = PluginDescriptor::new_managed(DescriptorEntryPoints {
            dispatcher,
            set_parameter,
            get_parameter,
            process_replacing: process,
            process_double_replacing: None,
        });
        descriptor.num_outputs = 1;
        descriptor.num_params = 2;
        // Freed by the test process exiting; the dispatcher never closes it.
        Box::into_raw(Box::new(descriptor))
    }

    fn host() -> Arc<dyn Host> {
        Arc::new(BridgeHost::default())
    }

    #[test]
    fn test_null_entry_is_construction_failure() {
        let err = unsafe { PluginInstance::construct(null_entry, host()) }.unwrap_err();
        assert!(matches!(err, BridgeError::ConstructionFailed(_)));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let err = unsafe { PluginInstance::construct(garbage_entry, host()) }.unwrap_err();
        match err {
            BridgeError::InvalidMagic(magic) => assert_ne!(magic, MAGIC),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_process_gated_then_runs() {
        let instance = unsafe { PluginInstance::instantiate(mono_entry, host(), &HostConfig::default()) }
            .unwrap();
        let mut buffers = ChannelBuffers::<f32>::new(0, 1, 32);

        for _ in 0..3 {
            buffers.fill_outputs(f32::NAN);
            assert_eq!(
                instance.process(&mut buffers),
                ProcessStatus::NotProcessing(LifecycleState::Opened)
            );
            assert!(buffers.output(0).iter().all(|s| *s == 0.0));
        }

        instance.resume().unwrap();
        assert_eq!(instance.process(&mut buffers), ProcessStatus::Processed);
        assert!(buffers.output(0).iter().all(|s| *s == 1.0));

        let mut doubles = ChannelBuffers::<f64>::new(0, 1, 32);
        assert_eq!(
            instance.process(&mut doubles),
            ProcessStatus::Unsupported(SampleFormat::Float64)
        );
    }

    #[test]
    fn test_closed_instance_rejects_calls() {
        let instance = unsafe { PluginInstance::instantiate(mono_entry, host(), &HostConfig::default()) }
            .unwrap();
        instance.close().unwrap();
        assert!(matches!(instance.get_parameter(0), Err(BridgeError::Closed)));
        assert!(matches!(instance.resume(), Err(BridgeError::Closed)));
        assert!(matches!(instance.close(), Err(BridgeError::Closed)));

        let mut buffers = ChannelBuffers::<f32>::new(0, 1, 8);
        assert_eq!(instance.process(&mut buffers), ProcessStatus::Closed);
    }

    #[test]
    fn test_parameter_range_checked() {
        let instance = unsafe { PluginInstance::construct(mono_entry, host()) }.unwrap();
        assert!(matches!(
            instance.get_parameter(2),
            Err(BridgeError::ParameterOutOfRange { index: 2, count: 2 })
        ));
        assert!(instance.get_parameter(1).is_ok());
    }
}
