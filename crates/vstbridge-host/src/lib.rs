//! Load and drive VST2 plugins
//!
//! [`Module`] loads a plugin library and resolves its entry point;
//! [`PluginInstance`] is one constructed plugin with every host-to-plugin
//! call behind a typed, lifecycle-checked method. Plugin-to-host calls land
//! in [`host_callback`] and are answered by a [`Host`], by default
//! [`BridgeHost`].
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use vstbridge_host::{BridgeHost, HostConfig, Module, Processor};
//!
//! let config = HostConfig::default();
//! let module = Module::open("/usr/lib/vst/reverb.so")?;
//! let instance = Arc::new(module.instantiate(Arc::new(BridgeHost::new(config.clone())), &config)?);
//!
//! let mut processor = Processor::new(instance, &config)?;
//! processor.resume()?;
//! processor.process(&[&left, &right], &mut [&mut out_l, &mut out_r])?;
//! ```

pub mod callback;
pub use callback::{current_process_level, host_callback, HostContext, MAX_REENTRY_DEPTH};

mod config;
pub use config::HostConfig;

mod host;
pub use host::{BridgeHost, Host, ParameterChange};

mod instance;
pub use instance::{PluginInstance, ProcessStatus};

mod loader;
pub use loader::Module;

mod processor;
pub use processor::Processor;

pub mod scan;
pub use scan::{default_search_paths, scan_directory};

pub use vstbridge_core::{BridgeError, LoadStage, Result};
