//! VST2 binary contract shared by hosts and plugins
//!
//! This crate names the bytes both sides of a VST 2.4 connection agree on and
//! the rules for using them. It never loads a library; `vstbridge-host` and
//! `vstbridge-plugin` build the two directions on top of it.
//!
//! ## Contents
//!
//! - **Descriptor**: the fixed `#[repr(C)]` record a plugin exposes
//! - **Dispatch**: opcodes and typed requests decoded from raw arguments
//! - **Lifecycle**: `Constructed -> Opened -> {Suspended <-> Processing} -> Closed`
//! - **Processing**: non-allocating buffer views in single or double precision
//! - **Events**: a reusable outgoing queue and a validated incoming list
//! - **Properties**: speaker arrangements and parameter display hints
//!
//! ## Usage
//!
//! ```ignore
//! use vstbridge_core::{EventQueue, LifecycleState, MidiEvent, Transition};
//!
//! let state = LifecycleState::Constructed
//!     .apply(Transition::Open)?
//!     .apply(Transition::Resume)?;
//! assert!(state.can_process());
//!
//! let mut queue = EventQueue::new(64, 4096);
//! queue.push_midi(MidiEvent::note_on(0, 0, 60, 100))?;
//! let raw = queue.as_raw(); // pass as `ptr` of PROCESS_EVENTS
//! ```

pub mod error;
pub use error::{BridgeError, LoadStage, Result};

pub mod abi;
pub use abi::{
    EffectFlags, EntryPointProc, HostCallbackProc, ParameterFlags, ParameterProperties,
    PluginDescriptor, SpeakerArrangement, SpeakerProperties, TimeInfo, MAGIC, VST_VERSION,
};

mod properties;

mod descriptor;
pub use descriptor::{DescriptorEntryPoints, DescriptorInfo};

pub mod opcode;
pub use opcode::{CanDo, HostOpcode, PluginCategory, PluginOpcode, ProcessLevel, NOT_IMPLEMENTED};

mod lifecycle;
pub use lifecycle::{LifecycleState, Operation, ProtocolViolation, Transition};

pub mod request;
pub use request::{ChunkKind, HostRequest, PluginRequest, RawCall};

mod buffer;
pub use buffer::{
    AudioBuffer, ChannelBuffers, InputScratch, Inputs, Outputs, Sample, SampleFormat,
};

pub mod events;
pub use events::{Event, EventList, EventQueue, MidiEvent, OwnedEvent, OwnedEventVec, SysExEvent};

pub mod strings;

mod time;
pub use time::{build_time_info, transport_from_time_info, TransportInfo};

mod snapshot;
pub use snapshot::PluginSnapshot;
