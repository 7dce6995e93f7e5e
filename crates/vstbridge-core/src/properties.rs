//! Constructors and accessors for the speaker and parameter property records.

use crate::abi::{
    arrangement_types, speaker_types, ParameterFlags, ParameterProperties, SpeakerArrangement,
    SpeakerProperties, MAX_ARRANGEMENT_SPEAKERS,
};
use crate::strings::{read_fixed, write_fixed};

impl SpeakerProperties {
    pub const fn undefined() -> Self {
        Self {
            azimuth: 0.0,
            elevation: 0.0,
            radius: 0.0,
            reserved: 0.0,
            name: [0; 64],
            speaker_type: speaker_types::UNDEFINED,
            future: [0; 28],
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        write_fixed(&mut self.name, name);
        self
    }

    pub fn name(&self) -> String {
        read_fixed(&self.name)
    }
}

impl SpeakerArrangement {
    pub const fn empty() -> Self {
        Self {
            arrangement_type: arrangement_types::EMPTY,
            num_channels: 0,
            speakers: [SpeakerProperties::undefined(); MAX_ARRANGEMENT_SPEAKERS],
        }
    }

    /// Default layout for a channel count, with every speaker undefined.
    pub fn for_channels(channels: usize) -> Self {
        let arrangement_type = match channels {
            0 => arrangement_types::EMPTY,
            1 => arrangement_types::MONO,
            2 => arrangement_types::STEREO,
            3 => arrangement_types::MUSIC_30,
            4 => arrangement_types::MUSIC_40,
            5 => arrangement_types::SURROUND_50,
            6 => arrangement_types::MUSIC_60,
            7 => arrangement_types::MUSIC_70,
            8 => arrangement_types::MUSIC_80,
            _ => arrangement_types::USER_DEFINED,
        };
        Self {
            arrangement_type,
            num_channels: channels.min(i32::MAX as usize) as i32,
            ..Self::empty()
        }
    }

    pub fn channels(&self) -> usize {
        self.num_channels.max(0) as usize
    }

    /// The speakers this record can address.
    pub fn speakers(&self) -> &[SpeakerProperties] {
        &self.speakers[..self.channels().min(MAX_ARRANGEMENT_SPEAKERS)]
    }

    pub fn speakers_mut(&mut self) -> &mut [SpeakerProperties] {
        let len = self.channels().min(MAX_ARRANGEMENT_SPEAKERS);
        &mut self.speakers[..len]
    }
}

impl Default for SpeakerArrangement {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for SpeakerArrangement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeakerArrangement")
            .field("arrangement_type", &self.arrangement_type)
            .field("num_channels", &self.num_channels)
            .finish_non_exhaustive()
    }
}

impl ParameterProperties {
    pub const fn new() -> Self {
        Self {
            step_float: 0.0,
            small_step_float: 0.0,
            large_step_float: 0.0,
            label: [0; 64],
            flags: 0,
            min_integer: 0,
            max_integer: 0,
            step_integer: 0,
            large_step_integer: 0,
            short_label: [0; 8],
            display_index: 0,
            category: 0,
            num_parameters_in_category: 0,
            reserved: 0,
            category_label: [0; 24],
            future: [0; 16],
        }
    }

    pub fn flags(&self) -> ParameterFlags {
        ParameterFlags(self.flags)
    }

    fn insert(&mut self, flag: ParameterFlags) {
        let mut flags = self.flags();
        flags.insert(flag);
        self.flags = flags.bits();
    }

    pub fn with_label(mut self, label: &str) -> Self {
        write_fixed(&mut self.label, label);
        self
    }

    pub fn with_short_label(mut self, label: &str) -> Self {
        write_fixed(&mut self.short_label, label);
        self
    }

    pub fn switch(mut self) -> Self {
        self.insert(ParameterFlags::IS_SWITCH);
        self
    }

    pub fn can_ramp(mut self) -> Self {
        self.insert(ParameterFlags::CAN_RAMP);
        self
    }

    pub fn integer_range(mut self, min: i32, max: i32) -> Self {
        self.min_integer = min;
        self.max_integer = max;
        self.insert(ParameterFlags::USES_INTEGER_MIN_MAX);
        self
    }

    pub fn integer_steps(mut self, step: i32, large: i32) -> Self {
        self.step_integer = step;
        self.large_step_integer = large;
        self.insert(ParameterFlags::USES_INT_STEP);
        self
    }

    pub fn float_steps(mut self, step: f32, small: f32, large: f32) -> Self {
        self.step_float = step;
        self.small_step_float = small;
        self.large_step_float = large;
        self.insert(ParameterFlags::USES_FLOAT_STEP);
        self
    }

    pub fn display_index(mut self, index: i16) -> Self {
        self.display_index = index;
        self.insert(ParameterFlags::SUPPORTS_DISPLAY_INDEX);
        self
    }

    /// Place the parameter in a 1-based category shared by `count` parameters.
    pub fn category(mut self, category: i16, count: i16, label: &str) -> Self {
        self.category = category;
        self.num_parameters_in_category = count;
        write_fixed(&mut self.category_label, label);
        self.insert(ParameterFlags::SUPPORTS_DISPLAY_CATEGORY);
        self
    }

    pub fn label(&self) -> String {
        read_fixed(&self.label)
    }

    pub fn short_label(&self) -> String {
        read_fixed(&self.short_label)
    }

    pub fn category_label(&self) -> String {
        read_fixed(&self.category_label)
    }
}

impl Default for ParameterProperties {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ParameterProperties {
    fn eq(&self, other: &Self) -> bool {
        self.step_float == other.step_float
            && self.small_step_float == other.small_step_float
            && self.large_step_float == other.large_step_float
            && self.label == other.label
            && self.flags == other.flags
            && self.min_integer == other.min_integer
            && self.max_integer == other.max_integer
            && self.step_integer == other.step_integer
            && self.large_step_integer == other.large_step_integer
            && self.short_label == other.short_label
            && self.display_index == other.display_index
            && self.category == other.category
            && self.num_parameters_in_category == other.num_parameters_in_category
            && self.category_label == other.category_label
    }
}

impl std::fmt::Debug for ParameterProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterProperties")
            .field("label", &self.label())
            .field("short_label", &self.short_label())
            .field("flags", &self.flags())
            .field("min_integer", &self.min_integer)
            .field("max_integer", &self.max_integer)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}
