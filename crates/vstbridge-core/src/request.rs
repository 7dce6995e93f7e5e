//! Typed requests decoded from the untyped dispatch arguments.
//!
//! Each side receives `(opcode, index, value, ptr, opt)` and decodes it here
//! into a closed set of requests it understands. Everything else travels on
//! as [`PluginRequest::Other`] / [`HostRequest::Other`] with the raw
//! arguments untouched.

use std::ffi::c_void;

use crate::abi::{string_len, ParameterProperties, RawEvents, SpeakerArrangement};
use crate::buffer::SampleFormat;
use crate::error::{BridgeError, Result};
use crate::events::EventList;
use crate::opcode::{HostOpcode, PluginOpcode};
use crate::strings::{read_c_str, read_c_string, StringBuffer};

/// The six dispatch arguments, undecoded.
#[derive(Debug, Clone, Copy)]
pub struct RawCall {
    pub opcode: i32,
    pub index: i32,
    pub value: isize,
    pub ptr: *mut c_void,
    pub opt: f32,
}

impl RawCall {
    pub fn new(opcode: i32, index: i32, value: isize, ptr: *mut c_void, opt: f32) -> Self {
        Self {
            opcode,
            index,
            value,
            ptr,
            opt,
        }
    }
}

/// Which state blob a chunk request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Bank,
    Program,
}

impl ChunkKind {
    pub fn from_index(index: i32) -> Self {
        if index == 0 {
            ChunkKind::Bank
        } else {
            ChunkKind::Program
        }
    }

    pub fn index(self) -> i32 {
        match self {
            ChunkKind::Bank => 0,
            ChunkKind::Program => 1,
        }
    }
}

/// Out-parameter of `GET_CHUNK`: the plugin stores a pointer to its data
/// and returns the length.
#[derive(Debug)]
pub struct ChunkSink {
    slot: *mut *mut c_void,
}

impl ChunkSink {
    /// Publish `data`. The bytes must stay valid until the next chunk
    /// request on the same instance.
    pub fn publish(self, data: &[u8]) -> isize {
        // SAFETY: `decode` only builds a sink from a non-null slot.
        unsafe { *self.slot = data.as_ptr() as *mut c_void };
        data.len() as isize
    }
}

/// Host-to-plugin requests the bridge decodes.
#[derive(Debug)]
pub enum PluginRequest<'a> {
    Open,
    Close,
    SetProgram(i32),
    GetProgram,
    SetProgramName(String),
    GetProgramName(StringBuffer),
    GetParameterLabel { index: i32, buffer: StringBuffer },
    GetParameterDisplay { index: i32, buffer: StringBuffer },
    GetParameterName { index: i32, buffer: StringBuffer },
    SetSampleRate(f32),
    SetBlockSize(isize),
    /// `true` resumes, `false` suspends.
    MainsChanged(bool),
    GetChunk { kind: ChunkKind, sink: ChunkSink },
    SetChunk { kind: ChunkKind, data: &'a [u8] },
    ProcessEvents(EventList<'a>),
    CanBeAutomated(i32),
    StringToParameter { index: i32, text: Option<&'a str> },
    GetProgramNameIndexed { index: i32, buffer: StringBuffer },
    GetPluginCategory,
    SetBypass(bool),
    GetEffectName(StringBuffer),
    GetVendorString(StringBuffer),
    GetProductString(StringBuffer),
    GetVendorVersion,
    CanDo(&'a str),
    GetTailSize,
    GetVstVersion,
    StartProcess,
    StopProcess,
    SetProcessPrecision(SampleFormat),
    GetNumMidiInputChannels,
    GetNumMidiOutputChannels,
    /// Layouts the host proposes; the plugin answers whether it accepts.
    SetSpeakerArrangement {
        input: &'a SpeakerArrangement,
        output: &'a SpeakerArrangement,
    },
    GetParameterProperties {
        index: i32,
        properties: &'a mut ParameterProperties,
    },
    Other(RawCall),
}

fn string_buffer(call: &RawCall, capacity: usize, what: &str) -> Result<StringBuffer> {
    // SAFETY: the sender owns a buffer of at least the protocol capacity.
    unsafe { StringBuffer::from_raw(call.ptr, capacity) }
        .ok_or_else(|| BridgeError::MalformedPayload(format!("null buffer for {what}")))
}

impl<'a> PluginRequest<'a> {
    /// Decode host-to-plugin arguments.
    ///
    /// # Safety
    /// `call.ptr` must satisfy the pointer contract of `call.opcode`
    /// (string buffer of protocol capacity, event list, chunk data of
    /// `value` bytes) for `'a`. Null pointers where a payload is required
    /// are rejected.
    pub unsafe fn decode(call: RawCall) -> Result<Self> {
        let op = PluginOpcode(call.opcode);
        let request = match op {
            PluginOpcode::OPEN => PluginRequest::Open,
            PluginOpcode::CLOSE => PluginRequest::Close,
            PluginOpcode::SET_PROGRAM => PluginRequest::SetProgram(call.value as i32),
            PluginOpcode::GET_PROGRAM => PluginRequest::GetProgram,
            PluginOpcode::SET_PROGRAM_NAME => PluginRequest::SetProgramName(
                read_c_string(call.ptr, string_len::PROGRAM_NAME).ok_or_else(|| {
                    BridgeError::MalformedPayload("null program name".into())
                })?,
            ),
            PluginOpcode::GET_PROGRAM_NAME => PluginRequest::GetProgramName(string_buffer(
                &call,
                string_len::PROGRAM_NAME,
                "program name",
            )?),
            PluginOpcode::GET_PARAM_LABEL => PluginRequest::GetParameterLabel {
                index: call.index,
                buffer: string_buffer(&call, string_len::PARAM_LABEL, "parameter label")?,
            },
            PluginOpcode::GET_PARAM_DISPLAY => PluginRequest::GetParameterDisplay {
                index: call.index,
                buffer: string_buffer(&call, string_len::PARAM_DISPLAY, "parameter display")?,
            },
            PluginOpcode::GET_PARAM_NAME => PluginRequest::GetParameterName {
                index: call.index,
                buffer: string_buffer(&call, string_len::PARAM_NAME, "parameter name")?,
            },
            PluginOpcode::SET_SAMPLE_RATE => PluginRequest::SetSampleRate(call.opt),
            PluginOpcode::SET_BLOCK_SIZE => PluginRequest::SetBlockSize(call.value),
            PluginOpcode::MAINS_CHANGED => PluginRequest::MainsChanged(call.value != 0),
            PluginOpcode::GET_CHUNK => {
                if call.ptr.is_null() {
                    return Err(BridgeError::MalformedPayload("null chunk slot".into()));
                }
                PluginRequest::GetChunk {
                    kind: ChunkKind::from_index(call.index),
                    sink: ChunkSink {
                        slot: call.ptr as *mut *mut c_void,
                    },
                }
            }
            PluginOpcode::SET_CHUNK => {
                let data = match call.value {
                    0 => &[][..],
                    len if len < 0 || call.ptr.is_null() => {
                        return Err(BridgeError::MalformedPayload(format!(
                            "invalid chunk of {len} bytes"
                        )))
                    }
                    len => std::slice::from_raw_parts(call.ptr as *const u8, len as usize),
                };
                PluginRequest::SetChunk {
                    kind: ChunkKind::from_index(call.index),
                    data,
                }
            }
            PluginOpcode::PROCESS_EVENTS => {
                PluginRequest::ProcessEvents(EventList::from_raw(call.ptr as *const RawEvents)?)
            }
            PluginOpcode::CAN_BE_AUTOMATED => PluginRequest::CanBeAutomated(call.index),
            PluginOpcode::STRING_TO_PARAMETER => PluginRequest::StringToParameter {
                index: call.index,
                text: read_c_str(call.ptr),
            },
            PluginOpcode::GET_PROGRAM_NAME_INDEXED => PluginRequest::GetProgramNameIndexed {
                index: call.index,
                buffer: string_buffer(&call, string_len::PROGRAM_NAME, "program name")?,
            },
            PluginOpcode::GET_PLUGIN_CATEGORY => PluginRequest::GetPluginCategory,
            PluginOpcode::SET_BYPASS => PluginRequest::SetBypass(call.value != 0),
            PluginOpcode::GET_EFFECT_NAME => PluginRequest::GetEffectName(string_buffer(
                &call,
                string_len::EFFECT_NAME,
                "effect name",
            )?),
            PluginOpcode::GET_VENDOR_STRING => PluginRequest::GetVendorString(string_buffer(
                &call,
                string_len::VENDOR,
                "vendor",
            )?),
            PluginOpcode::GET_PRODUCT_STRING => PluginRequest::GetProductString(string_buffer(
                &call,
                string_len::PRODUCT,
                "product",
            )?),
            PluginOpcode::GET_VENDOR_VERSION => PluginRequest::GetVendorVersion,
            PluginOpcode::CAN_DO => PluginRequest::CanDo(
                read_c_str(call.ptr)
                    .ok_or_else(|| BridgeError::MalformedPayload("invalid can-do string".into()))?,
            ),
            PluginOpcode::GET_TAIL_SIZE => PluginRequest::GetTailSize,
            PluginOpcode::GET_VST_VERSION => PluginRequest::GetVstVersion,
            PluginOpcode::START_PROCESS => PluginRequest::StartProcess,
            PluginOpcode::STOP_PROCESS => PluginRequest::StopProcess,
            PluginOpcode::SET_PROCESS_PRECISION => PluginRequest::SetProcessPrecision(
                if call.value == 1 {
                    SampleFormat::Float64
                } else {
                    SampleFormat::Float32
                },
            ),
            PluginOpcode::GET_NUM_MIDI_INPUT_CHANNELS => PluginRequest::GetNumMidiInputChannels,
            PluginOpcode::GET_NUM_MIDI_OUTPUT_CHANNELS => PluginRequest::GetNumMidiOutputChannels,
            PluginOpcode::SET_SPEAKER_ARRANGEMENT => {
                // The input layout travels in `value`, the output in `ptr`.
                let input = call.value as *const SpeakerArrangement;
                let output = call.ptr as *const SpeakerArrangement;
                if input.is_null() || output.is_null() {
                    return Err(BridgeError::MalformedPayload(
                        "null speaker arrangement".into(),
                    ));
                }
                PluginRequest::SetSpeakerArrangement {
                    input: &*input,
                    output: &*output,
                }
            }
            PluginOpcode::GET_PARAMETER_PROPERTIES => {
                let properties = call.ptr as *mut ParameterProperties;
                if properties.is_null() {
                    return Err(BridgeError::MalformedPayload(
                        "null parameter properties".into(),
                    ));
                }
                PluginRequest::GetParameterProperties {
                    index: call.index,
                    properties: &mut *properties,
                }
            }
            _ => PluginRequest::Other(call),
        };
        Ok(request)
    }

    /// Whether the request needs exclusive access to the plugin object.
    ///
    /// Everything else is answered from shared state and may run while
    /// audio is processing. Editor requests are answered without the
    /// plugin, so they are not mutating either.
    pub fn is_mutating(&self) -> bool {
        match self {
            PluginRequest::Open
            | PluginRequest::Close
            | PluginRequest::MainsChanged(_)
            | PluginRequest::SetSampleRate(_)
            | PluginRequest::SetBlockSize(_)
            | PluginRequest::ProcessEvents(_)
            | PluginRequest::SetBypass(_)
            | PluginRequest::StartProcess
            | PluginRequest::StopProcess
            | PluginRequest::SetSpeakerArrangement { .. } => true,
            PluginRequest::Other(call) => !PluginOpcode(call.opcode).is_editor(),
            _ => false,
        }
    }
}

/// Plugin-to-host requests the bridge decodes.
#[derive(Debug)]
pub enum HostRequest<'a> {
    Automate { index: i32, value: f32 },
    Version,
    CurrentId,
    Idle,
    GetTime { mask: i32 },
    ProcessEvents(EventList<'a>),
    IoChanged,
    SampleRate,
    BlockSize,
    InputLatency,
    OutputLatency,
    ProcessLevel,
    AutomationState,
    VendorString(StringBuffer),
    ProductString(StringBuffer),
    VendorVersion,
    CanDo(&'a str),
    Language,
    UpdateDisplay,
    BeginEdit(i32),
    EndEdit(i32),
    Other(RawCall),
}

impl<'a> HostRequest<'a> {
    /// Decode plugin-to-host arguments.
    ///
    /// # Safety
    /// Same pointer contract as [`PluginRequest::decode`], from the host's
    /// point of view.
    pub unsafe fn decode(call: RawCall) -> Result<Self> {
        let request = match HostOpcode(call.opcode) {
            HostOpcode::AUTOMATE => HostRequest::Automate {
                index: call.index,
                value: call.opt,
            },
            HostOpcode::VERSION => HostRequest::Version,
            HostOpcode::CURRENT_ID => HostRequest::CurrentId,
            HostOpcode::IDLE => HostRequest::Idle,
            HostOpcode::GET_TIME => HostRequest::GetTime {
                mask: call.value as i32,
            },
            HostOpcode::PROCESS_EVENTS => {
                HostRequest::ProcessEvents(EventList::from_raw(call.ptr as *const RawEvents)?)
            }
            HostOpcode::IO_CHANGED => HostRequest::IoChanged,
            HostOpcode::GET_SAMPLE_RATE => HostRequest::SampleRate,
            HostOpcode::GET_BLOCK_SIZE => HostRequest::BlockSize,
            HostOpcode::GET_INPUT_LATENCY => HostRequest::InputLatency,
            HostOpcode::GET_OUTPUT_LATENCY => HostRequest::OutputLatency,
            HostOpcode::GET_CURRENT_PROCESS_LEVEL => HostRequest::ProcessLevel,
            HostOpcode::GET_AUTOMATION_STATE => HostRequest::AutomationState,
            HostOpcode::GET_VENDOR_STRING => {
                HostRequest::VendorString(string_buffer(&call, string_len::VENDOR, "vendor")?)
            }
            HostOpcode::GET_PRODUCT_STRING => {
                HostRequest::ProductString(string_buffer(&call, string_len::PRODUCT, "product")?)
            }
            HostOpcode::GET_VENDOR_VERSION => HostRequest::VendorVersion,
            HostOpcode::CAN_DO => HostRequest::CanDo(
                read_c_str(call.ptr)
                    .ok_or_else(|| BridgeError::MalformedPayload("invalid can-do string".into()))?,
            ),
            HostOpcode::GET_LANGUAGE => HostRequest::Language,
            HostOpcode::UPDATE_DISPLAY => HostRequest::UpdateDisplay,
            HostOpcode::BEGIN_EDIT => HostRequest::BeginEdit(call.index),
            HostOpcode::END_EDIT => HostRequest::EndEdit(call.index),
            _ => HostRequest::Other(call),
        };
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventQueue, MidiEvent};
    use std::ffi::CString;
    use std::ptr;

    fn call(opcode: PluginOpcode, index: i32, value: isize, ptr: *mut c_void, opt: f32) -> RawCall {
        RawCall::new(opcode.raw(), index, value, ptr, opt)
    }

    #[test]
    fn test_decode_lifecycle() {
        let open = unsafe { PluginRequest::decode(call(PluginOpcode::OPEN, 0, 0, ptr::null_mut(), 0.0)) };
        assert!(matches!(open, Ok(PluginRequest::Open)));

        let resume = unsafe {
            PluginRequest::decode(call(PluginOpcode::MAINS_CHANGED, 0, 1, ptr::null_mut(), 0.0))
        };
        assert!(matches!(resume, Ok(PluginRequest::MainsChanged(true))));

        let rate = unsafe {
            PluginRequest::decode(call(PluginOpcode::SET_SAMPLE_RATE, 0, 0, ptr::null_mut(), 48000.0))
        };
        assert!(matches!(rate, Ok(PluginRequest::SetSampleRate(r)) if r == 48000.0));
    }

    #[test]
    fn test_decode_unknown_passes_through() {
        let request =
            unsafe { PluginRequest::decode(call(PluginOpcode(9000), 3, 7, ptr::null_mut(), 0.5)) };
        match request {
            Ok(PluginRequest::Other(raw)) => {
                assert_eq!(raw.opcode, 9000);
                assert_eq!(raw.index, 3);
                assert_eq!(raw.value, 7);
            }
            other => panic!("expected passthrough, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_string_buffer() {
        let mut storage = [0u8; 8];
        let request = unsafe {
            PluginRequest::decode(call(
                PluginOpcode::GET_PARAM_NAME,
                2,
                0,
                storage.as_mut_ptr() as *mut c_void,
                0.0,
            ))
        };
        match request {
            Ok(PluginRequest::GetParameterName { index, mut buffer }) => {
                assert_eq!(index, 2);
                assert_eq!(buffer.capacity(), string_len::PARAM_NAME);
                buffer.write("Gain");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(&storage[..5], b"Gain\0");
    }

    #[test]
    fn test_decode_rejects_null_string_buffer() {
        let request = unsafe {
            PluginRequest::decode(call(PluginOpcode::GET_EFFECT_NAME, 0, 0, ptr::null_mut(), 0.0))
        };
        assert!(matches!(request, Err(BridgeError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_events() {
        let mut queue = EventQueue::new(4, 0);
        queue.push_midi(MidiEvent::note_on(1, 0, 60, 100)).unwrap();
        let raw = queue.as_raw();

        let request = unsafe {
            PluginRequest::decode(call(PluginOpcode::PROCESS_EVENTS, 0, 0, raw as *mut c_void, 0.0))
        };
        match request {
            Ok(PluginRequest::ProcessEvents(list)) => assert_eq!(list.len(), 1),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_decode_chunk() {
        let data = [1u8, 2, 3];
        let request = unsafe {
            PluginRequest::decode(call(
                PluginOpcode::SET_CHUNK,
                1,
                3,
                data.as_ptr() as *mut c_void,
                0.0,
            ))
        };
        match request {
            Ok(PluginRequest::SetChunk { kind, data }) => {
                assert_eq!(kind, ChunkKind::Program);
                assert_eq!(data, &[1, 2, 3]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let negative = unsafe {
            PluginRequest::decode(call(PluginOpcode::SET_CHUNK, 0, -4, ptr::null_mut(), 0.0))
        };
        assert!(negative.is_err());
    }

    #[test]
    fn test_chunk_sink_publish() {
        let mut slot: *mut c_void = ptr::null_mut();
        let request = unsafe {
            PluginRequest::decode(call(
                PluginOpcode::GET_CHUNK,
                0,
                0,
                &mut slot as *mut *mut c_void as *mut c_void,
                0.0,
            ))
        };
        let data = vec![9u8; 16];
        match request {
            Ok(PluginRequest::GetChunk { kind, sink }) => {
                assert_eq!(kind, ChunkKind::Bank);
                assert_eq!(sink.publish(&data), 16);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(slot as *const u8, data.as_ptr());
    }

    #[test]
    fn test_decode_host_requests() {
        let can_do = CString::new("sendVstEvents").unwrap();
        let request = unsafe {
            HostRequest::decode(RawCall::new(
                HostOpcode::CAN_DO.raw(),
                0,
                0,
                can_do.as_ptr() as *mut c_void,
                0.0,
            ))
        };
        assert!(matches!(request, Ok(HostRequest::CanDo("sendVstEvents"))));

        let automate = unsafe {
            HostRequest::decode(RawCall::new(
                HostOpcode::AUTOMATE.raw(),
                4,
                0,
                ptr::null_mut(),
                0.25,
            ))
        };
        assert!(matches!(
            automate,
            Ok(HostRequest::Automate { index: 4, value }) if value == 0.25
        ));
    }

    #[test]
    fn test_mutating_classification() {
        assert!(PluginRequest::MainsChanged(true).is_mutating());
        assert!(PluginRequest::SetBlockSize(512).is_mutating());
        assert!(!PluginRequest::GetProgram.is_mutating());
        assert!(!PluginRequest::CanBeAutomated(0).is_mutating());
        assert!(!PluginRequest::GetTailSize.is_mutating());
        assert!(!PluginRequest::SetProcessPrecision(SampleFormat::Float64).is_mutating());

        let editor = call(PluginOpcode::EDIT_IDLE, 0, 0, ptr::null_mut(), 0.0);
        assert!(!PluginRequest::Other(editor).is_mutating());
        let vendor = call(PluginOpcode::VENDOR_SPECIFIC, 0, 0, ptr::null_mut(), 0.0);
        assert!(PluginRequest::Other(vendor).is_mutating());
    }

    #[test]
    fn test_decode_speaker_arrangement() {
        let input = SpeakerArrangement::for_channels(1);
        let output = SpeakerArrangement::for_channels(2);
        let request = unsafe {
            PluginRequest::decode(call(
                PluginOpcode::SET_SPEAKER_ARRANGEMENT,
                0,
                &input as *const SpeakerArrangement as isize,
                &output as *const SpeakerArrangement as *mut c_void,
                0.0,
            ))
        };
        match request {
            Ok(request @ PluginRequest::SetSpeakerArrangement { .. }) => {
                assert!(request.is_mutating());
                if let PluginRequest::SetSpeakerArrangement { input, output } = request {
                    assert_eq!(input.channels(), 1);
                    assert_eq!(output.channels(), 2);
                }
            }
            other => panic!("unexpected {:?}", other),
        }

        let missing = unsafe {
            PluginRequest::decode(call(
                PluginOpcode::SET_SPEAKER_ARRANGEMENT,
                0,
                0,
                &output as *const SpeakerArrangement as *mut c_void,
                0.0,
            ))
        };
        assert!(matches!(missing, Err(BridgeError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_parameter_properties() {
        let mut props = ParameterProperties::new();
        let request = unsafe {
            PluginRequest::decode(call(
                PluginOpcode::GET_PARAMETER_PROPERTIES,
                3,
                0,
                &mut props as *mut ParameterProperties as *mut c_void,
                0.0,
            ))
        };
        match request {
            Ok(PluginRequest::GetParameterProperties { index, properties }) => {
                assert_eq!(index, 3);
                *properties = ParameterProperties::new().with_label("Drive");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(props.label(), "Drive");

        let null = unsafe {
            PluginRequest::decode(call(
                PluginOpcode::GET_PARAMETER_PROPERTIES,
                0,
                0,
                ptr::null_mut(),
                0.0,
            ))
        };
        assert!(null.is_err());
    }
}
