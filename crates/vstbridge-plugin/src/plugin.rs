//! The trait a managed plugin implements.

use std::sync::Arc;

use vstbridge_core::{AudioBuffer, EventList, RawCall, Result, SpeakerArrangement, NOT_IMPLEMENTED};

use crate::host_handle::HostHandle;
use crate::metadata::PluginMetadata;
use crate::params::{NoParameters, PluginParameters};

/// A plugin exposed to foreign hosts through [`entry_point`](crate::entry_point).
///
/// Every `&mut self` method runs with exclusive access; the bridge never
/// calls two of them at once and turns away reentrant or concurrent calls.
/// Parameters are served separately through [`Plugin::parameters`] so hosts
/// can automate them while audio is running, and capability queries are
/// answered from [`Plugin::metadata`] without touching the instance.
pub trait Plugin: Send + 'static {
    /// Construct an instance. The host may already be queried through
    /// `host`. An error makes the entry point return null.
    fn new(host: HostHandle) -> Result<Self>
    where
        Self: Sized;

    fn metadata(&self) -> PluginMetadata;

    fn parameters(&self) -> Arc<dyn PluginParameters> {
        Arc::new(NoParameters)
    }

    fn open(&mut self) {}

    /// Release resources. Called once, before the instance is freed.
    fn close(&mut self) {}

    /// Audio is about to start; reset DSP state here.
    fn resume(&mut self) {}

    fn suspend(&mut self) {}

    fn start_process(&mut self) {}

    fn stop_process(&mut self) {}

    fn set_sample_rate(&mut self, _rate: f32) {}

    fn set_block_size(&mut self, _size: i64) {}

    /// Events for the next block, in delivery order. Copy what you need;
    /// the list is only valid during this call.
    fn process_events(&mut self, _events: &EventList<'_>) {}

    /// Replace every output sample. Must not allocate or block.
    fn process(&mut self, buffer: &mut AudioBuffer<'_, f32>);

    /// Double-precision variant; only called when the metadata declares
    /// `supports_f64`.
    fn process_f64(&mut self, buffer: &mut AudioBuffer<'_, f64>) {
        buffer.zero_outputs();
    }

    /// Latency in samples reported on each resume.
    fn initial_delay(&self) -> usize {
        self.metadata().latency_samples
    }

    /// Returns whether the plugin implements bypass itself.
    fn set_bypass(&mut self, _bypass: bool) -> bool {
        false
    }

    /// Returns whether the plugin accepts the proposed layouts. By default
    /// only layouts matching the declared channel counts are accepted.
    fn set_speaker_arrangement(
        &mut self,
        input: &SpeakerArrangement,
        output: &SpeakerArrangement,
    ) -> bool {
        let io = self.metadata().audio_io;
        input.channels() == io.inputs && output.channels() == io.outputs
    }

    /// Any opcode the bridge does not decode, with its raw arguments.
    fn dispatch_other(&mut self, _call: RawCall) -> isize {
        NOT_IMPLEMENTED
    }
}
