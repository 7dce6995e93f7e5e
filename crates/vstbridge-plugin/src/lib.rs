//! Expose Rust plugins to VST2 hosts
//!
//! Implement [`Plugin`], then export it from a `cdylib` with
//! [`export_vst2!`]. The bridge owns the descriptor, enforces the lifecycle,
//! turns away reentrant calls, and catches panics at the boundary so a host
//! never unwinds through foreign frames.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use vstbridge_plugin::*;
//!
//! struct Gain { params: Arc<AtomicParameters> }
//!
//! impl Plugin for Gain {
//!     fn new(_host: HostHandle) -> Result<Self> {
//!         let params = AtomicParameters::new(vec![ParameterSpec::new("Gain", 0.5)]);
//!         Ok(Self { params: Arc::new(params) })
//!     }
//!
//!     fn metadata(&self) -> PluginMetadata {
//!         PluginMetadata::new(*b"Gain", "Gain").parameters(1)
//!     }
//!
//!     fn parameters(&self) -> Arc<dyn PluginParameters> {
//!         self.params.clone()
//!     }
//!
//!     fn process(&mut self, buffer: &mut AudioBuffer<'_, f32>) {
//!         let gain = self.params.value(0) * 2.0;
//!         let (inputs, mut outputs) = buffer.split();
//!         for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
//!             for (o, i) in output.iter_mut().zip(input) {
//!                 *o = i * gain;
//!             }
//!         }
//!     }
//! }
//!
//! export_vst2!(Gain);
//! ```

mod entry;
pub use entry::entry_point;

mod guard;

mod host_handle;
pub use host_handle::{HostHandle, MAX_CALLBACK_DEPTH};

mod metadata;
pub use metadata::{AudioIO, PluginMetadata};

mod params;
pub use params::{AtomicParameters, NoParameters, ParameterSpec, PluginParameters};

mod plugin;
pub use plugin::Plugin;

mod wrapper;

pub use vstbridge_core::{
    AudioBuffer, BridgeError, CanDo, ChunkKind, Event, EventList, EventQueue, Inputs, MidiEvent,
    Outputs, ParameterProperties, PluginCategory, RawCall, Result, Sample, SampleFormat,
    SpeakerArrangement, SysExEvent, TimeInfo,
};

#[doc(hidden)]
pub mod __private {
    pub use vstbridge_core::{HostCallbackProc, PluginDescriptor};
}
