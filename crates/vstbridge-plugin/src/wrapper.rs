//! Fixed-layout adapter between a [`Plugin`] and the descriptor ABI.
//!
//! The descriptor is the first field of a boxed `Wrapper`, so the pointer a
//! host holds is also a pointer to the wrapper. Every trampoline recovers the
//! wrapper from it, checks the lifecycle, and only then touches the plugin.
//!
//! Requests that need `&mut P` take the busy flag and are refused while it
//! is held. Everything else is answered from the parameter object and the
//! metadata, so queries never make the audio thread lose a block. Events
//! arriving while the flag is held are copied aside and delivered first
//! thing in the next block.

use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use vstbridge_core::{
    AudioBuffer, BridgeError, DescriptorEntryPoints, EffectFlags, EventList, EventQueue,
    HostCallbackProc, InputScratch, LifecycleState, Operation, PluginDescriptor, PluginOpcode,
    PluginRequest, RawCall, Result, Sample, SampleFormat, Transition, MAGIC, NOT_IMPLEMENTED,
    VST_VERSION,
};

use crate::guard::BusyFlag;
use crate::host_handle::HostHandle;
use crate::metadata::PluginMetadata;
use crate::params::PluginParameters;
use crate::plugin::Plugin;

/// Frames of in-place input the scratch holds before the host announces a
/// block size.
const DEFAULT_SCRATCH_FRAMES: usize = 1024;

/// Events held for the next block while the plugin is busy.
const PENDING_EVENTS: usize = 512;
const PENDING_SYSEX_BYTES: usize = 64 * 1024;

#[repr(C)]
pub(crate) struct Wrapper<P: Plugin> {
    /// Must stay first: hosts hold a pointer to this field.
    descriptor: UnsafeCell<PluginDescriptor>,
    host: HostHandle,
    state: AtomicU8,
    busy: BusyFlag,
    plugin: UnsafeCell<Option<P>>,
    params: OnceLock<Arc<dyn PluginParameters>>,
    metadata: OnceLock<PluginMetadata>,
    /// Backing store for the last `GET_CHUNK` answer.
    chunk: Mutex<Vec<u8>>,
    pending: Mutex<EventQueue>,
    /// Copies of inputs the host passed in place of an output. Only touched
    /// while the busy flag is held.
    scratch32: UnsafeCell<InputScratch<f32>>,
    scratch64: UnsafeCell<InputScratch<f64>>,
}

enum Dispatched {
    Value(isize),
    Closed,
}

impl<P: Plugin> Wrapper<P> {
    fn entry_points() -> DescriptorEntryPoints {
        DescriptorEntryPoints {
            dispatcher: dispatch::<P>,
            set_parameter: set_parameter::<P>,
            get_parameter: get_parameter::<P>,
            process_replacing: process_replacing::<P>,
            process_double_replacing: Some(process_double_replacing::<P>),
        }
    }

    /// Build an instance and return its descriptor.
    ///
    /// # Safety
    /// `callback` must be a host callback valid until the instance is closed.
    pub(crate) unsafe fn construct(callback: HostCallbackProc) -> Result<*mut PluginDescriptor> {
        let raw = Box::into_raw(Box::new(Self {
            descriptor: UnsafeCell::new(PluginDescriptor::new_managed(Self::entry_points())),
            host: HostHandle::new(callback, ptr::null_mut()),
            state: AtomicU8::new(LifecycleState::Constructed.to_u8()),
            busy: BusyFlag::default(),
            plugin: UnsafeCell::new(None),
            params: OnceLock::new(),
            metadata: OnceLock::new(),
            chunk: Mutex::new(Vec::new()),
            pending: Mutex::new(EventQueue::new(PENDING_EVENTS, PENDING_SYSEX_BYTES)),
            scratch32: UnsafeCell::new(InputScratch::new(0, 0)),
            scratch64: UnsafeCell::new(InputScratch::new(0, 0)),
        }));
        let effect = (*raw).descriptor.get();
        (*effect).object = raw as *mut c_void;
        (*raw).host.attach(effect);

        match Self::initialize(raw) {
            Ok(()) => Ok(effect),
            Err(e) => {
                (*raw).host.detach();
                drop(Box::from_raw(raw));
                Err(e)
            }
        }
    }

    unsafe fn initialize(raw: *mut Self) -> Result<()> {
        let wrapper = &*raw;

        let host_version = wrapper.host.version();
        if host_version == 0 {
            return Err(BridgeError::ConstructionFailed(
                "host did not report a protocol version".into(),
            ));
        }

        let host = wrapper.host.clone();
        let plugin = panic::catch_unwind(AssertUnwindSafe(|| P::new(host)))
            .map_err(|_| BridgeError::ConstructionFailed("plugin panicked in new".into()))??;

        let metadata = plugin.metadata();
        let params = plugin.parameters();

        let descriptor = &mut *wrapper.descriptor.get();
        descriptor.num_programs = metadata.programs as i32;
        descriptor.num_params = metadata.parameters as i32;
        descriptor.num_inputs = metadata.audio_io.inputs as i32;
        descriptor.num_outputs = metadata.audio_io.outputs as i32;
        descriptor.flags = metadata.flags().bits();
        descriptor.unique_id = metadata.unique_id;
        descriptor.version = metadata.version;
        descriptor.initial_delay = plugin.initial_delay() as i32;
        if !metadata.supports_f64 {
            descriptor.process_double_replacing = None;
        }

        let inputs = metadata.audio_io.inputs;
        *wrapper.scratch32.get() = InputScratch::new(inputs, DEFAULT_SCRATCH_FRAMES);
        if metadata.supports_f64 {
            *wrapper.scratch64.get() = InputScratch::new(inputs, DEFAULT_SCRATCH_FRAMES);
        }

        tracing::debug!(
            name = %metadata.name,
            host_version,
            inputs = descriptor.num_inputs,
            outputs = descriptor.num_outputs,
            params = descriptor.num_params,
            "plugin constructed"
        );

        *wrapper.plugin.get() = Some(plugin);
        let _ = wrapper.params.set(params);
        let _ = wrapper.metadata.set(metadata);
        Ok(())
    }

    /// Recover the wrapper behind a descriptor pointer.
    ///
    /// # Safety
    /// `effect` must be null or a descriptor this crate handed out that has
    /// not been closed.
    unsafe fn from_effect<'a>(effect: *mut PluginDescriptor) -> Option<&'a Self> {
        if effect.is_null() || (*effect).magic != MAGIC || (*effect).object != effect as *mut c_void
        {
            return None;
        }
        Some(&*(effect as *const Self))
    }

    fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    fn metadata(&self) -> Option<&PluginMetadata> {
        self.metadata.get()
    }

    fn params(&self) -> Option<&Arc<dyn PluginParameters>> {
        self.params.get()
    }

    fn param_in_range(&self, index: i32) -> bool {
        let count = self.metadata().map(|m| m.parameters).unwrap_or(0);
        usize::try_from(index).is_ok_and(|i| i < count)
    }

    fn dispatch(&self, call: RawCall) -> Dispatched {
        let state = self.state();
        if !state.accepts_calls() {
            return Dispatched::Value(NOT_IMPLEMENTED);
        }

        // SAFETY: the host owns the payload for the duration of this call.
        let request = match unsafe { PluginRequest::decode(call) } {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(opcode = ?PluginOpcode(call.opcode), error = %e, "rejecting malformed request");
                return Dispatched::Value(NOT_IMPLEMENTED);
            }
        };
        tracing::trace!(opcode = ?PluginOpcode(call.opcode), %state, "dispatch");

        let (Some(params), Some(metadata)) = (self.params(), self.metadata()) else {
            return Dispatched::Value(NOT_IMPLEMENTED);
        };
        if request.is_mutating() {
            return self.dispatch_exclusive(request);
        }

        let value = match request {
            PluginRequest::GetProgram => params.program() as isize,
            PluginRequest::SetProgram(program) => {
                params.set_program(program);
                0
            }
            PluginRequest::SetProgramName(name) => {
                params.set_program_name(name);
                0
            }
            PluginRequest::GetProgramName(mut buffer) => {
                buffer.write(&params.program_name(params.program()));
                0
            }
            PluginRequest::GetProgramNameIndexed { index, mut buffer } => {
                if usize::try_from(index).is_ok_and(|i| i < metadata.programs) {
                    buffer.write(&params.program_name(index));
                    1
                } else {
                    0
                }
            }
            PluginRequest::GetParameterName { index, mut buffer } => {
                if self.param_in_range(index) {
                    buffer.write(&params.parameter_name(index));
                }
                0
            }
            PluginRequest::GetParameterLabel { index, mut buffer } => {
                if self.param_in_range(index) {
                    buffer.write(&params.parameter_label(index));
                }
                0
            }
            PluginRequest::GetParameterDisplay { index, mut buffer } => {
                if self.param_in_range(index) {
                    buffer.write(&params.parameter_text(index));
                }
                0
            }
            PluginRequest::CanBeAutomated(index) => {
                (self.param_in_range(index) && params.can_be_automated(index)) as isize
            }
            PluginRequest::StringToParameter { index, text } => match text {
                Some(text) if self.param_in_range(index) => {
                    params.string_to_parameter(index, text) as isize
                }
                _ => 0,
            },
            PluginRequest::GetChunk { kind, sink } => {
                let data = params.chunk(kind);
                let mut cache = self.chunk.lock();
                *cache = data;
                sink.publish(&cache)
            }
            PluginRequest::SetChunk { kind, data } => params.load_chunk(kind, data) as isize,
            PluginRequest::GetPluginCategory => metadata.category as isize,
            PluginRequest::GetEffectName(mut buffer) => {
                buffer.write(&metadata.name);
                1
            }
            PluginRequest::GetVendorString(mut buffer) => {
                buffer.write(&metadata.vendor);
                1
            }
            PluginRequest::GetProductString(mut buffer) => {
                buffer.write(metadata.product_name());
                1
            }
            PluginRequest::GetVendorVersion => metadata.vendor_version as isize,
            PluginRequest::GetVstVersion => VST_VERSION as isize,
            PluginRequest::GetNumMidiInputChannels => metadata.midi_inputs as isize,
            PluginRequest::GetNumMidiOutputChannels => metadata.midi_outputs as isize,
            PluginRequest::SetProcessPrecision(format) => {
                (format == SampleFormat::Float32 || metadata.supports_f64) as isize
            }
            PluginRequest::CanDo(capability) => metadata.capability(capability).to_raw(),
            PluginRequest::GetTailSize => metadata.tail_samples,
            PluginRequest::GetParameterProperties { index, properties } => {
                match params.parameter_properties(index) {
                    Some(answer) if self.param_in_range(index) => {
                        *properties = answer;
                        1
                    }
                    _ => 0,
                }
            }
            // Editor requests: managed plugins never declare an editor.
            _ => NOT_IMPLEMENTED,
        };
        Dispatched::Value(value)
    }

    /// Requests that need `&mut P`. Turned away while another call holds the
    /// plugin, including a reentrant call from inside a host callback.
    fn dispatch_exclusive(&self, request: PluginRequest<'_>) -> Dispatched {
        let Some(_guard) = self.busy.try_acquire() else {
            let value = match request {
                PluginRequest::ProcessEvents(events) => self.hold_events(&events),
                request => {
                    tracing::warn!(?request, "plugin busy, request refused");
                    NOT_IMPLEMENTED
                }
            };
            return Dispatched::Value(value);
        };
        // SAFETY: the busy flag grants exclusive access to the plugin slot.
        let slot = unsafe { &mut *self.plugin.get() };
        let Some(plugin) = slot.as_mut() else {
            return Dispatched::Value(NOT_IMPLEMENTED);
        };
        let state = self.state();

        let value = match request {
            PluginRequest::Open => match state.apply(Transition::Open) {
                Ok(next) => {
                    if state == LifecycleState::Constructed {
                        plugin.open();
                    }
                    self.set_state(next);
                    0
                }
                Err(violation) => {
                    tracing::warn!(%violation, "open refused");
                    0
                }
            },
            PluginRequest::Close => {
                if state == LifecycleState::Processing {
                    plugin.suspend();
                }
                plugin.close();
                self.set_state(LifecycleState::Closed);
                self.host.detach();
                drop(slot.take());
                return Dispatched::Closed;
            }
            PluginRequest::MainsChanged(true) => match state.apply(Transition::Resume) {
                Ok(next) => {
                    if state != LifecycleState::Processing {
                        // Latency may only change while suspended.
                        let delay = plugin.initial_delay() as i32;
                        unsafe { (*self.descriptor.get()).initial_delay = delay };
                        plugin.resume();
                    }
                    self.set_state(next);
                    0
                }
                Err(violation) => {
                    tracing::warn!(%violation, "resume refused");
                    0
                }
            },
            PluginRequest::MainsChanged(false) => match state.apply(Transition::Suspend) {
                Ok(next) => {
                    if state == LifecycleState::Processing {
                        plugin.suspend();
                    }
                    self.set_state(next);
                    0
                }
                Err(violation) => {
                    tracing::warn!(%violation, "suspend refused");
                    0
                }
            },
            PluginRequest::SetSampleRate(rate) => {
                if !state.latency_mutable() {
                    tracing::warn!(rate, "sample rate changed while processing");
                }
                plugin.set_sample_rate(rate);
                0
            }
            PluginRequest::SetBlockSize(size) => {
                // SAFETY: the busy flag is held.
                unsafe { self.reserve_scratch(usize::try_from(size).unwrap_or(0)) };
                plugin.set_block_size(size as i64);
                0
            }
            PluginRequest::ProcessEvents(events) => match state.check(Operation::Events) {
                Ok(()) => {
                    self.deliver_held_events(plugin);
                    plugin.process_events(&events);
                    1
                }
                Err(violation) => {
                    tracing::debug!(%violation, "events dropped");
                    0
                }
            },
            PluginRequest::SetBypass(bypass) => plugin.set_bypass(bypass) as isize,
            PluginRequest::StartProcess => {
                plugin.start_process();
                0
            }
            PluginRequest::StopProcess => {
                plugin.stop_process();
                0
            }
            PluginRequest::SetSpeakerArrangement { input, output } => {
                match state.check(Operation::Configure) {
                    Ok(()) => plugin.set_speaker_arrangement(input, output) as isize,
                    Err(violation) => {
                        tracing::warn!(%violation, "speaker arrangement refused");
                        0
                    }
                }
            }
            PluginRequest::Other(call) => plugin.dispatch_other(call),
            _ => NOT_IMPLEMENTED,
        };
        Dispatched::Value(value)
    }

    /// Copy events that arrived while the plugin was busy. Returns whether
    /// they were accepted.
    fn hold_events(&self, events: &EventList<'_>) -> isize {
        if let Err(violation) = self.state().check(Operation::Events) {
            tracing::debug!(%violation, "events dropped");
            return 0;
        }
        let Some(mut pending) = self.pending.try_lock() else {
            tracing::debug!(count = events.len(), "event hold contended, events dropped");
            return 0;
        };
        let mut dropped = 0usize;
        for event in events.iter() {
            if pending.push_event(&event).is_err() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, "event hold full");
        }
        1
    }

    fn deliver_held_events(&self, plugin: &mut P) {
        let Some(mut pending) = self.pending.try_lock() else {
            return;
        };
        if pending.is_empty() {
            return;
        }
        plugin.process_events(&pending.as_list());
        pending.clear();
    }

    /// Grow the in-place scratch to the announced block size.
    ///
    /// # Safety
    /// The caller holds the busy flag.
    unsafe fn reserve_scratch(&self, frames: usize) {
        let scratch = &mut *self.scratch32.get();
        if frames > scratch.max_frames() {
            *scratch = InputScratch::new(scratch.channels(), frames);
        }
        let scratch = &mut *self.scratch64.get();
        if scratch.channels() > 0 && frames > scratch.max_frames() {
            *scratch = InputScratch::new(scratch.channels(), frames);
        }
    }

    /// Run one block, or zero-fill the outputs when the plugin cannot run.
    unsafe fn process<T: Sample>(
        &self,
        inputs: *const *const T,
        outputs: *mut *mut T,
        frames: i32,
        scratch: &UnsafeCell<InputScratch<T>>,
        run: impl FnOnce(&mut P, &mut AudioBuffer<'_, T>),
    ) {
        if frames <= 0 || outputs.is_null() {
            return;
        }
        let frames = frames as usize;
        let descriptor = self.descriptor.get();
        let num_outputs = (*descriptor).num_outputs.max(0) as usize;
        let mut num_inputs = (*descriptor).num_inputs.max(0) as usize;

        if (0..num_outputs).any(|i| (*outputs.add(i)).is_null()) {
            return;
        }
        // Output-only view for the paths that never reach the plugin.
        let silence = || {
            AudioBuffer::<T>::from_raw(ptr::null(), 0, outputs, num_outputs, frames).zero_outputs()
        };

        let inputs_valid =
            !inputs.is_null() && (0..num_inputs).all(|i| !(*inputs.add(i)).is_null());
        if !inputs_valid {
            if num_inputs > 0 {
                silence();
                return;
            }
            num_inputs = 0;
        }
        if !self.state().can_process() {
            silence();
            return;
        }
        let Some(_guard) = self.busy.try_acquire() else {
            silence();
            return;
        };
        let Some(plugin) = (*self.plugin.get()).as_mut() else {
            silence();
            return;
        };

        // SAFETY: the busy flag is held.
        let scratch = &mut *scratch.get();
        let Some(inputs) = scratch.resolve(inputs, num_inputs, outputs, num_outputs, frames) else {
            tracing::warn!(
                frames,
                capacity = scratch.max_frames(),
                "in-place block larger than the announced block size"
            );
            silence();
            return;
        };
        let mut buffer = AudioBuffer::from_raw(inputs, num_inputs, outputs, num_outputs, frames);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.deliver_held_events(plugin);
            run(plugin, &mut buffer)
        }));
        if result.is_err() {
            buffer.zero_outputs();
        }
    }
}

unsafe extern "C" fn dispatch<P: Plugin>(
    effect: *mut PluginDescriptor,
    opcode: i32,
    index: i32,
    value: isize,
    ptr: *mut c_void,
    opt: f32,
) -> isize {
    let Some(wrapper) = Wrapper::<P>::from_effect(effect) else {
        return NOT_IMPLEMENTED;
    };
    let call = RawCall::new(opcode, index, value, ptr, opt);

    match panic::catch_unwind(AssertUnwindSafe(|| wrapper.dispatch(call))) {
        Ok(Dispatched::Value(value)) => value,
        Ok(Dispatched::Closed) => {
            tracing::debug!("plugin closed, releasing instance");
            drop(Box::from_raw(effect as *mut Wrapper<P>));
            0
        }
        Err(_) => {
            tracing::error!(opcode = ?PluginOpcode(opcode), "plugin panicked during dispatch");
            NOT_IMPLEMENTED
        }
    }
}

unsafe extern "C" fn set_parameter<P: Plugin>(effect: *mut PluginDescriptor, index: i32, value: f32) {
    let Some(wrapper) = Wrapper::<P>::from_effect(effect) else {
        return;
    };
    if !wrapper.state().accepts_calls() || !wrapper.param_in_range(index) {
        return;
    }
    if let Some(params) = wrapper.params() {
        let _ = panic::catch_unwind(AssertUnwindSafe(|| params.set_parameter(index, value)));
    }
}

unsafe extern "C" fn get_parameter<P: Plugin>(effect: *mut PluginDescriptor, index: i32) -> f32 {
    let Some(wrapper) = Wrapper::<P>::from_effect(effect) else {
        return 0.0;
    };
    if !wrapper.state().accepts_calls() || !wrapper.param_in_range(index) {
        return 0.0;
    }
    wrapper
        .params()
        .and_then(|params| {
            panic::catch_unwind(AssertUnwindSafe(|| params.get_parameter(index))).ok()
        })
        .unwrap_or(0.0)
}

unsafe extern "C" fn process_replacing<P: Plugin>(
    effect: *mut PluginDescriptor,
    inputs: *const *const f32,
    outputs: *mut *mut f32,
    frames: i32,
) {
    if let Some(wrapper) = Wrapper::<P>::from_effect(effect) {
        wrapper.process(inputs, outputs, frames, &wrapper.scratch32, |plugin, buffer| {
            plugin.process(buffer)
        });
    }
}

unsafe extern "C" fn process_double_replacing<P: Plugin>(
    effect: *mut PluginDescriptor,
    inputs: *const *const f64,
    outputs: *mut *mut f64,
    frames: i32,
) {
    let Some(wrapper) = Wrapper::<P>::from_effect(effect) else {
        return;
    };
    let supports_f64 = (*wrapper.descriptor.get())
        .effect_flags()
        .contains(EffectFlags::CAN_DOUBLE_REPLACING);
    if supports_f64 {
        wrapper.process(inputs, outputs, frames, &wrapper.scratch64, |plugin, buffer| {
            plugin.process_f64(buffer)
        });
    } else {
        wrapper.process(inputs, outputs, frames, &wrapper.scratch64, |_, buffer| {
            buffer.zero_outputs()
        });
    }
}
