//! # vstbridge - VST2 binary-interface bridge
//!
//! Both directions of a VST 2.4 connection in safe Rust.
//!
//! ## Architecture
//!
//! vstbridge is an umbrella crate that coordinates:
//! - **vstbridge-core** - Descriptor layout, opcodes, events, lifecycle state machine
//! - **vstbridge-host** - Load foreign plugin libraries and drive them
//! - **vstbridge-plugin** - Export Rust plugins to foreign hosts
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use vstbridge::prelude::*;
//!
//! let config = HostConfig::default();
//! let host = Arc::new(BridgeHost::new(config.clone()));
//! let instance = Arc::new(Module::open("/usr/lib/vst/synth.so")?.instantiate(host, &config)?);
//!
//! let mut processor = Processor::new(instance, &config)?;
//! processor.resume()?;
//! processor.queue_midi(MidiEvent::note_on(0, 0, 60, 100))?;
//! processor.process(&[], &mut outputs)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Both directions
//! - `host` - Plugin hosting
//! - `plugin` - Plugin export

/// Re-export of vstbridge-core for direct access
pub use vstbridge_core as core;

// Binary contract
pub use vstbridge_core::{
    // Buffers
    AudioBuffer,
    BridgeError,
    CanDo,
    ChannelBuffers,
    ChunkKind,
    DescriptorInfo,
    EffectFlags,

    // Events
    Event,
    EventList,
    EventQueue,
    // Lifecycle
    LifecycleState,
    LoadStage,
    MidiEvent,
    Operation,
    OwnedEvent,
    // Properties
    ParameterFlags,
    ParameterProperties,
    PluginCategory,
    PluginSnapshot,
    ProtocolViolation,
    Sample,
    SampleFormat,
    SpeakerArrangement,
    SysExEvent,
    TimeInfo,
    Transition,
    TransportInfo,
    MAGIC,
    VST_VERSION,
};

// Hosting
#[cfg(feature = "host")]
pub use vstbridge_host as host;

#[cfg(feature = "host")]
pub use vstbridge_host::{
    BridgeHost, Host, HostConfig, Module, ParameterChange, PluginInstance, ProcessStatus,
    Processor,
};

// Plugin export
#[cfg(feature = "plugin")]
pub use vstbridge_plugin as plugin;

#[cfg(feature = "plugin")]
pub use vstbridge_plugin::{
    export_vst2, AtomicParameters, HostHandle, NoParameters, ParameterSpec, Plugin,
    PluginMetadata, PluginParameters,
};

mod error;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::core::{AudioBuffer, MidiEvent, OwnedEvent, SampleFormat};
    pub use crate::{Error, Result};

    // Hosting
    #[cfg(feature = "host")]
    pub use crate::host::{BridgeHost, HostConfig, Module, PluginInstance, ProcessStatus, Processor};

    // Plugin export
    #[cfg(feature = "plugin")]
    pub use crate::plugin::{
        export_vst2, AtomicParameters, HostHandle, ParameterSpec, Plugin, PluginMetadata,
        PluginParameters,
    };
}
