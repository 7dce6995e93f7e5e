//! Host configuration.

use serde::{Deserialize, Serialize};

use vstbridge_core::events::MAX_EVENTS;
use vstbridge_core::SampleFormat;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub sample_rate: f32,

    /// Maximum frames per process call.
    pub block_size: usize,

    /// Used when the plugin supports it; otherwise single precision.
    pub preferred_format: SampleFormat,

    pub vendor: String,
    pub product: String,
    pub vendor_version: i32,

    /// Events queued toward the plugin per block.
    pub max_events: usize,

    /// Sysex payload bytes queued toward the plugin per block.
    pub max_sysex_bytes: usize,

    /// Capacity of the automation channel and of the MIDI-out queue.
    pub automation_queue: usize,

    /// Sub-plugin a shell plugin should instantiate. Shell support is
    /// only advertised when this is set.
    pub shell_plugin_id: Option<i32>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            block_size: 512,
            preferred_format: SampleFormat::Float32,
            vendor: "vstbridge".to_string(),
            product: "vstbridge host".to_string(),
            vendor_version: 1,
            max_events: 512,
            max_sysex_bytes: 64 * 1024,
            automation_queue: 1024,
            shell_plugin_id: None,
        }
    }
}

impl HostConfig {
    pub fn sample_rate(mut self, rate: f32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn block_size(mut self, frames: usize) -> Self {
        self.block_size = frames;
        self
    }

    pub fn preferred_format(mut self, format: SampleFormat) -> Self {
        self.preferred_format = format;
        self
    }

    pub fn max_events(mut self, count: usize) -> Self {
        self.max_events = count.min(MAX_EVENTS);
        self
    }

    pub fn shell_plugin_id(mut self, id: i32) -> Self {
        self.shell_plugin_id = Some(id);
        self
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
