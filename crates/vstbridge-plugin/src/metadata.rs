//! Static description a plugin hands to the bridge at construction.

use serde::{Deserialize, Serialize};
use vstbridge_core::{CanDo, EffectFlags, PluginCategory};

/// Audio I/O configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioIO {
    /// Number of audio input channels
    pub inputs: usize,
    /// Number of audio output channels
    pub outputs: usize,
}

impl AudioIO {
    /// Stereo in, stereo out
    pub fn stereo() -> Self {
        Self {
            inputs: 2,
            outputs: 2,
        }
    }
}

/// Everything the descriptor and the identity queries report.
///
/// Counts are copied into the descriptor once and stay fixed for the
/// instance's lifetime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Four-character plugin ID, used by hosts to persist references
    pub unique_id: i32,

    /// Human-readable name
    pub name: String,

    /// Vendor/author name
    pub vendor: String,

    /// Product name; falls back to `name` when empty
    pub product: String,

    /// Plugin revision reported in the descriptor
    pub version: i32,

    /// Vendor-specific version reported to `GET_VENDOR_VERSION`
    pub vendor_version: i32,

    pub category: PluginCategory,

    /// Audio I/O configuration
    pub audio_io: AudioIO,

    pub parameters: usize,

    pub programs: usize,

    /// MIDI channels accepted and produced
    pub midi_inputs: i32,
    pub midi_outputs: i32,

    /// Plugin latency in samples
    pub latency_samples: usize,

    /// Whether the plugin supports 64-bit (f64) audio processing
    #[serde(default)]
    pub supports_f64: bool,

    /// State is exchanged as opaque chunks
    #[serde(default)]
    pub preset_chunks: bool,

    /// Answers to `CanDo` queries; anything unlisted is `Maybe`
    #[serde(default)]
    pub capabilities: Vec<(String, CanDo)>,

    /// Samples of tail after input stops; 0 means default, 1 means none
    #[serde(default)]
    pub tail_samples: isize,
}

impl PluginMetadata {
    /// Create new metadata with required fields
    pub fn new(unique_id: [u8; 4], name: impl Into<String>) -> Self {
        Self {
            unique_id: i32::from_be_bytes(unique_id),
            name: name.into(),
            vendor: String::new(),
            product: String::new(),
            version: 1,
            vendor_version: 1,
            category: PluginCategory::Effect,
            audio_io: AudioIO::stereo(),
            parameters: 0,
            programs: 0,
            midi_inputs: 0,
            midi_outputs: 0,
            latency_samples: 0,
            supports_f64: false,
            preset_chunks: false,
            capabilities: Vec::new(),
            tail_samples: 0,
        }
    }

    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn product(mut self, product: impl Into<String>) -> Self {
        self.product = product.into();
        self
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn vendor_version(mut self, version: i32) -> Self {
        self.vendor_version = version;
        self
    }

    pub fn category(mut self, category: PluginCategory) -> Self {
        self.category = category;
        self
    }

    pub fn audio_io(mut self, inputs: usize, outputs: usize) -> Self {
        self.audio_io = AudioIO { inputs, outputs };
        self
    }

    pub fn parameters(mut self, count: usize) -> Self {
        self.parameters = count;
        self
    }

    pub fn programs(mut self, count: usize) -> Self {
        self.programs = count;
        self
    }

    pub fn midi(mut self, inputs: i32, outputs: i32) -> Self {
        self.midi_inputs = inputs;
        self.midi_outputs = outputs;
        self
    }

    pub fn latency(mut self, samples: usize) -> Self {
        self.latency_samples = samples;
        self
    }

    pub fn f64_support(mut self, supports_f64: bool) -> Self {
        self.supports_f64 = supports_f64;
        self
    }

    pub fn preset_chunks(mut self, enabled: bool) -> Self {
        self.preset_chunks = enabled;
        self
    }

    pub fn can_do(mut self, capability: impl Into<String>, answer: CanDo) -> Self {
        self.capabilities.push((capability.into(), answer));
        self
    }

    pub fn tail(mut self, samples: isize) -> Self {
        self.tail_samples = samples;
        self
    }

    /// Answer for a `CanDo` query.
    pub fn capability(&self, capability: &str) -> CanDo {
        self.capabilities
            .iter()
            .find(|(name, _)| name == capability)
            .map(|(_, answer)| *answer)
            .unwrap_or(CanDo::Maybe)
    }

    pub fn product_name(&self) -> &str {
        if self.product.is_empty() {
            &self.name
        } else {
            &self.product
        }
    }

    /// Capability bits derived from the description.
    pub fn flags(&self) -> EffectFlags {
        let mut flags = EffectFlags::CAN_REPLACING;
        flags.set(EffectFlags::CAN_DOUBLE_REPLACING, self.supports_f64);
        flags.set(EffectFlags::PROGRAM_CHUNKS, self.preset_chunks);
        flags.set(
            EffectFlags::IS_SYNTH,
            matches!(self.category, PluginCategory::Synth),
        );
        flags
    }
}
