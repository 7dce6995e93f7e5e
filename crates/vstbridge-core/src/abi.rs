//! Raw VST 2.4 binary layout.
//!
//! Everything here is `#[repr(C)]` and matches the field order and widths
//! used by existing hosts and plugins. Safe wrappers live in the sibling
//! modules; this module only names the bytes.

use std::ffi::c_void;

/// `'VstP'` packed big-endian into an `i32`.
pub const MAGIC: i32 = i32::from_be_bytes(*b"VstP");

/// Protocol revision reported by both sides (2.4).
pub const VST_VERSION: i32 = 2400;

/// Generic pointer-sized integer used for `value` arguments, return values
/// and reserved slots.
pub type IntPtr = isize;

/// Shape shared by the plugin dispatcher and the host callback.
pub type DispatcherProc = unsafe extern "C" fn(
    effect: *mut PluginDescriptor,
    opcode: i32,
    index: i32,
    value: IntPtr,
    ptr: *mut c_void,
    opt: f32,
) -> IntPtr;

pub type HostCallbackProc = DispatcherProc;

pub type ProcessProc = unsafe extern "C" fn(
    effect: *mut PluginDescriptor,
    inputs: *const *const f32,
    outputs: *mut *mut f32,
    frames: i32,
);

pub type ProcessDoubleProc = unsafe extern "C" fn(
    effect: *mut PluginDescriptor,
    inputs: *const *const f64,
    outputs: *mut *mut f64,
    frames: i32,
);

pub type SetParameterProc = unsafe extern "C" fn(effect: *mut PluginDescriptor, index: i32, value: f32);

pub type GetParameterProc = unsafe extern "C" fn(effect: *mut PluginDescriptor, index: i32) -> f32;

/// Exported module factory. Hosts may pass a null callback, hence the `Option`.
pub type EntryPointProc =
    unsafe extern "C" fn(callback: Option<HostCallbackProc>) -> *mut PluginDescriptor;

/// Entry point symbol names, in lookup order.
pub const ENTRY_POINT_SYMBOLS: [&[u8]; 3] = [b"VSTPluginMain\0", b"main_macho\0", b"main\0"];

/// The fixed-layout descriptor (`AEffect`).
///
/// Function slots are `Option` so a null pointer in a foreign descriptor is a
/// checked `None` rather than an invalid function reference.
#[repr(C)]
pub struct PluginDescriptor {
    pub magic: i32,
    pub dispatcher: Option<DispatcherProc>,
    /// Deprecated accumulating entry.
    pub process: Option<ProcessProc>,
    pub set_parameter: Option<SetParameterProc>,
    pub get_parameter: Option<GetParameterProc>,
    pub num_programs: i32,
    pub num_params: i32,
    pub num_inputs: i32,
    pub num_outputs: i32,
    pub flags: i32,
    pub reserved1: IntPtr,
    pub reserved2: IntPtr,
    pub initial_delay: i32,
    pub real_qualities: i32,
    pub off_qualities: i32,
    pub io_ratio: f32,
    /// Back reference to the implementation's own state.
    pub object: *mut c_void,
    pub user: *mut c_void,
    pub unique_id: i32,
    pub version: i32,
    pub process_replacing: Option<ProcessProc>,
    pub process_double_replacing: Option<ProcessDoubleProc>,
    pub future: [u8; 56],
}

/// Capability bits stored in [`PluginDescriptor::flags`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EffectFlags(pub i32);

impl EffectFlags {
    pub const HAS_EDITOR: Self = Self(1);
    pub const CAN_REPLACING: Self = Self(1 << 4);
    pub const PROGRAM_CHUNKS: Self = Self(1 << 5);
    pub const IS_SYNTH: Self = Self(1 << 8);
    pub const NO_SOUND_IN_STOP: Self = Self(1 << 9);
    pub const CAN_DOUBLE_REPLACING: Self = Self(1 << 12);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> i32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn set(&mut self, other: Self, enabled: bool) {
        if enabled {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }
}

impl std::ops::BitOr for EffectFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Musical and wall-clock position answered to `GetTime`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct TimeInfo {
    pub sample_pos: f64,
    pub sample_rate: f64,
    pub nanoseconds: f64,
    pub ppq_pos: f64,
    pub tempo: f64,
    pub bar_start_pos: f64,
    pub cycle_start_pos: f64,
    pub cycle_end_pos: f64,
    pub time_sig_numerator: i32,
    pub time_sig_denominator: i32,
    pub smpte_offset: i32,
    pub smpte_frame_rate: i32,
    pub samples_to_next_clock: i32,
    pub flags: i32,
}

pub mod time_info_flags {
    pub const TRANSPORT_CHANGED: i32 = 1;
    pub const TRANSPORT_PLAYING: i32 = 1 << 1;
    pub const TRANSPORT_CYCLE_ACTIVE: i32 = 1 << 2;
    pub const TRANSPORT_RECORDING: i32 = 1 << 3;
    pub const AUTOMATION_WRITING: i32 = 1 << 6;
    pub const AUTOMATION_READING: i32 = 1 << 7;
    pub const NANOS_VALID: i32 = 1 << 8;
    pub const PPQ_POS_VALID: i32 = 1 << 9;
    pub const TEMPO_VALID: i32 = 1 << 10;
    pub const BARS_VALID: i32 = 1 << 11;
    pub const CYCLE_POS_VALID: i32 = 1 << 12;
    pub const TIME_SIG_VALID: i32 = 1 << 13;
    pub const SMPTE_VALID: i32 = 1 << 14;
    pub const CLOCK_VALID: i32 = 1 << 15;
}

pub mod event_types {
    pub const MIDI: i32 = 1;
    pub const SYSEX: i32 = 6;
}

pub mod midi_event_flags {
    pub const REALTIME: i32 = 1;
}

/// Common header shared by every event record.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct RawEvent {
    pub event_type: i32,
    pub byte_size: i32,
    pub delta_frames: i32,
    pub flags: i32,
    pub data: [u8; 16],
}

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct RawMidiEvent {
    pub event_type: i32,
    pub byte_size: i32,
    pub delta_frames: i32,
    pub flags: i32,
    pub note_length: i32,
    pub note_offset: i32,
    pub midi_data: [u8; 4],
    pub detune: i8,
    pub note_off_velocity: u8,
    pub reserved1: u8,
    pub reserved2: u8,
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct RawSysExEvent {
    pub event_type: i32,
    pub byte_size: i32,
    pub delta_frames: i32,
    pub flags: i32,
    pub dump_bytes: i32,
    pub reserved1: IntPtr,
    pub sysex_dump: *mut u8,
    pub reserved2: IntPtr,
}

/// Event list header. `events` is a flexible array: the real length is
/// `num_events`, the `2` only fixes the minimum allocation.
#[repr(C)]
pub struct RawEvents {
    pub num_events: i32,
    pub reserved: IntPtr,
    pub events: [*mut RawEvent; 2],
}

/// One speaker of a [`SpeakerArrangement`] (`VstSpeakerProperties`).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SpeakerProperties {
    pub azimuth: f32,
    pub elevation: f32,
    pub radius: f32,
    pub reserved: f32,
    pub name: [u8; 64],
    pub speaker_type: i32,
    pub future: [u8; 28],
}

/// Channel layout exchanged by `SetSpeakerArrangement` and
/// `GetSpeakerArrangement` (`VstSpeakerArrangement`).
///
/// The record declares eight speaker slots; `num_channels` beyond that is
/// legal on the wire but only the first eight are addressable here.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SpeakerArrangement {
    pub arrangement_type: i32,
    pub num_channels: i32,
    pub speakers: [SpeakerProperties; MAX_ARRANGEMENT_SPEAKERS],
}

pub const MAX_ARRANGEMENT_SPEAKERS: usize = 8;

pub mod arrangement_types {
    pub const USER_DEFINED: i32 = -2;
    pub const EMPTY: i32 = -1;
    pub const MONO: i32 = 0;
    pub const STEREO: i32 = 1;
    pub const STEREO_SURROUND: i32 = 2;
    pub const STEREO_CENTER: i32 = 3;
    pub const STEREO_SIDE: i32 = 4;
    pub const STEREO_CLFE: i32 = 5;
    pub const CINE_30: i32 = 6;
    pub const MUSIC_30: i32 = 7;
    pub const CINE_31: i32 = 8;
    pub const MUSIC_31: i32 = 9;
    pub const CINE_40: i32 = 10;
    pub const MUSIC_40: i32 = 11;
    pub const CINE_41: i32 = 12;
    pub const MUSIC_41: i32 = 13;
    pub const SURROUND_50: i32 = 14;
    pub const SURROUND_51: i32 = 15;
    pub const CINE_60: i32 = 16;
    pub const MUSIC_60: i32 = 17;
    pub const CINE_61: i32 = 18;
    pub const MUSIC_61: i32 = 19;
    pub const CINE_70: i32 = 20;
    pub const MUSIC_70: i32 = 21;
    pub const CINE_71: i32 = 22;
    pub const MUSIC_71: i32 = 23;
    pub const CINE_80: i32 = 24;
    pub const MUSIC_80: i32 = 25;
    pub const CINE_81: i32 = 26;
    pub const MUSIC_81: i32 = 27;
    pub const SURROUND_102: i32 = 28;
}

pub mod speaker_types {
    pub const UNDEFINED: i32 = 0x7fff_ffff;
    pub const MONO: i32 = 0;
    pub const LEFT: i32 = 1;
    pub const RIGHT: i32 = 2;
    pub const CENTER: i32 = 3;
    pub const LFE: i32 = 4;
    pub const LEFT_SURROUND: i32 = 5;
    pub const RIGHT_SURROUND: i32 = 6;
}

/// Display hints answered to `GetParameterProperties`
/// (`VstParameterProperties`).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ParameterProperties {
    pub step_float: f32,
    pub small_step_float: f32,
    pub large_step_float: f32,
    pub label: [u8; 64],
    pub flags: i32,
    pub min_integer: i32,
    pub max_integer: i32,
    pub step_integer: i32,
    pub large_step_integer: i32,
    pub short_label: [u8; 8],
    pub display_index: i16,
    pub category: i16,
    pub num_parameters_in_category: i16,
    pub reserved: i16,
    pub category_label: [u8; 24],
    pub future: [u8; 16],
}

/// Bits of [`ParameterProperties::flags`] saying which fields are meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ParameterFlags(pub i32);

impl ParameterFlags {
    pub const IS_SWITCH: Self = Self(1);
    pub const USES_INTEGER_MIN_MAX: Self = Self(1 << 1);
    pub const USES_FLOAT_STEP: Self = Self(1 << 2);
    pub const USES_INT_STEP: Self = Self(1 << 3);
    pub const SUPPORTS_DISPLAY_INDEX: Self = Self(1 << 4);
    pub const SUPPORTS_DISPLAY_CATEGORY: Self = Self(1 << 5);
    pub const CAN_RAMP: Self = Self(1 << 6);

    pub const fn bits(self) -> i32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for ParameterFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// String capacities (including the terminating NUL) fixed by the protocol.
pub mod string_len {
    pub const PROGRAM_NAME: usize = 24;
    pub const PARAM_LABEL: usize = 8;
    pub const PARAM_DISPLAY: usize = 8;
    pub const PARAM_NAME: usize = 8;
    pub const VENDOR: usize = 64;
    pub const PRODUCT: usize = 64;
    pub const EFFECT_NAME: usize = 32;
    /// Hosts in practice hand out larger buffers than the nominal limits.
    pub const HOST_READ: usize = 256;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_magic_is_vstp() {
        assert_eq!(MAGIC, 0x5673_7450);
        assert_eq!(&MAGIC.to_be_bytes(), b"VstP");
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_descriptor_layout() {
        assert_eq!(size_of::<PluginDescriptor>(), 192);
        assert_eq!(offset_of!(PluginDescriptor, dispatcher), 8);
        assert_eq!(offset_of!(PluginDescriptor, process), 16);
        assert_eq!(offset_of!(PluginDescriptor, set_parameter), 24);
        assert_eq!(offset_of!(PluginDescriptor, get_parameter), 32);
        assert_eq!(offset_of!(PluginDescriptor, num_programs), 40);
        assert_eq!(offset_of!(PluginDescriptor, flags), 56);
        assert_eq!(offset_of!(PluginDescriptor, reserved1), 64);
        assert_eq!(offset_of!(PluginDescriptor, initial_delay), 80);
        assert_eq!(offset_of!(PluginDescriptor, io_ratio), 92);
        assert_eq!(offset_of!(PluginDescriptor, object), 96);
        assert_eq!(offset_of!(PluginDescriptor, unique_id), 112);
        assert_eq!(offset_of!(PluginDescriptor, process_replacing), 120);
        assert_eq!(offset_of!(PluginDescriptor, process_double_replacing), 128);
        assert_eq!(offset_of!(PluginDescriptor, future), 136);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_event_layouts() {
        assert_eq!(size_of::<RawEvent>(), 32);
        assert_eq!(size_of::<RawMidiEvent>(), 32);
        assert_eq!(offset_of!(RawMidiEvent, midi_data), 24);
        assert_eq!(size_of::<RawSysExEvent>(), 48);
        assert_eq!(offset_of!(RawSysExEvent, sysex_dump), 32);
        assert_eq!(offset_of!(RawEvents, events), 16);
        assert_eq!(size_of::<TimeInfo>(), 88);
    }

    #[test]
    fn test_property_layouts() {
        assert_eq!(size_of::<SpeakerProperties>(), 112);
        assert_eq!(offset_of!(SpeakerProperties, name), 16);
        assert_eq!(offset_of!(SpeakerProperties, speaker_type), 80);
        assert_eq!(size_of::<SpeakerArrangement>(), 904);
        assert_eq!(offset_of!(SpeakerArrangement, speakers), 8);

        assert_eq!(size_of::<ParameterProperties>(), 152);
        assert_eq!(offset_of!(ParameterProperties, flags), 76);
        assert_eq!(offset_of!(ParameterProperties, short_label), 96);
        assert_eq!(offset_of!(ParameterProperties, display_index), 104);
        assert_eq!(offset_of!(ParameterProperties, category_label), 112);
    }

    #[test]
    fn test_effect_flags() {
        let mut flags = EffectFlags::CAN_REPLACING | EffectFlags::IS_SYNTH;
        assert!(flags.contains(EffectFlags::CAN_REPLACING));
        assert!(!flags.contains(EffectFlags::CAN_DOUBLE_REPLACING));

        flags.insert(EffectFlags::CAN_DOUBLE_REPLACING);
        assert_eq!(flags.bits(), (1 << 4) | (1 << 8) | (1 << 12));

        flags.set(EffectFlags::IS_SYNTH, false);
        assert!(!flags.contains(EffectFlags::IS_SYNTH));
    }
}
