//! Event queue transport.
//!
//! [`EventQueue`] builds the variable-length event array on the sending side
//! without allocating per block. [`EventList`] is the validated, read-only
//! view the receiving side iterates. Order is positional: receivers see
//! events exactly in insertion order, never re-sorted by `delta_frames`.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::mem::{offset_of, size_of};
use std::ptr;

use crate::abi::{event_types, midi_event_flags, RawEvent, RawEvents, RawMidiEvent, RawSysExEvent};
use crate::error::{BridgeError, Result};

/// Upper bound on `num_events` accepted from the other side.
pub const MAX_EVENTS: usize = 4096;

/// Upper bound on a single sysex dump accepted from the other side.
pub const MAX_SYSEX_BYTES: usize = 1 << 20;

pub const EVENT_STACK_CAPACITY: usize = 16;

/// Stack-first collection for copied events.
pub type OwnedEventVec = SmallVec<[OwnedEvent; EVENT_STACK_CAPACITY]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MidiEvent {
    pub delta_frames: i32,
    pub data: [u8; 3],
    pub note_length: i32,
    pub note_offset: i32,
    pub detune: i8,
    pub note_off_velocity: u8,
    pub realtime: bool,
}

impl MidiEvent {
    pub fn new(delta_frames: i32, data: [u8; 3]) -> Self {
        Self {
            delta_frames,
            data,
            ..Default::default()
        }
    }

    pub fn note_on(delta_frames: i32, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(delta_frames, [0x90 | (channel & 0x0f), note & 0x7f, velocity & 0x7f])
    }

    pub fn note_off(delta_frames: i32, channel: u8, note: u8, velocity: u8) -> Self {
        let mut event =
            Self::new(delta_frames, [0x80 | (channel & 0x0f), note & 0x7f, velocity & 0x7f]);
        event.note_off_velocity = velocity & 0x7f;
        event
    }

    pub fn control_change(delta_frames: i32, channel: u8, control: u8, value: u8) -> Self {
        Self::new(delta_frames, [0xb0 | (channel & 0x0f), control & 0x7f, value & 0x7f])
    }

    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    pub fn status(&self) -> u8 {
        self.data[0] & 0xf0
    }

    pub fn channel(&self) -> u8 {
        self.data[0] & 0x0f
    }

    fn to_raw(self) -> RawMidiEvent {
        RawMidiEvent {
            event_type: event_types::MIDI,
            byte_size: size_of::<RawMidiEvent>() as i32,
            delta_frames: self.delta_frames,
            flags: if self.realtime {
                midi_event_flags::REALTIME
            } else {
                0
            },
            note_length: self.note_length,
            note_offset: self.note_offset,
            midi_data: [self.data[0], self.data[1], self.data[2], 0],
            detune: self.detune,
            note_off_velocity: self.note_off_velocity,
            reserved1: 0,
            reserved2: 0,
        }
    }

    fn from_raw(raw: &RawMidiEvent) -> Self {
        Self {
            delta_frames: raw.delta_frames,
            data: [raw.midi_data[0], raw.midi_data[1], raw.midi_data[2]],
            note_length: raw.note_length,
            note_offset: raw.note_offset,
            detune: raw.detune,
            note_off_velocity: raw.note_off_velocity,
            realtime: raw.flags & midi_event_flags::REALTIME != 0,
        }
    }
}

/// Sysex dump borrowed from the sender for the duration of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysExEvent<'a> {
    pub delta_frames: i32,
    pub payload: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    Midi(MidiEvent),
    SysEx(SysExEvent<'a>),
    /// Any event type outside MIDI and sysex, reported but not decoded.
    Unknown { event_type: i32, delta_frames: i32 },
}

impl Event<'_> {
    pub fn delta_frames(&self) -> i32 {
        match self {
            Event::Midi(midi) => midi.delta_frames,
            Event::SysEx(sysex) => sysex.delta_frames,
            Event::Unknown { delta_frames, .. } => *delta_frames,
        }
    }

    /// Copy out of the sender's memory so the event can outlive the call.
    pub fn to_owned_event(&self) -> OwnedEvent {
        match *self {
            Event::Midi(midi) => OwnedEvent::Midi(midi),
            Event::SysEx(sysex) => OwnedEvent::SysEx {
                delta_frames: sysex.delta_frames,
                payload: sysex.payload.to_vec(),
            },
            Event::Unknown {
                event_type,
                delta_frames,
            } => OwnedEvent::Unknown {
                event_type,
                delta_frames,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnedEvent {
    Midi(MidiEvent),
    SysEx { delta_frames: i32, payload: Vec<u8> },
    Unknown { event_type: i32, delta_frames: i32 },
}

impl OwnedEvent {
    pub fn delta_frames(&self) -> i32 {
        match self {
            OwnedEvent::Midi(midi) => midi.delta_frames,
            OwnedEvent::SysEx { delta_frames, .. } => *delta_frames,
            OwnedEvent::Unknown { delta_frames, .. } => *delta_frames,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Midi(usize),
    SysEx { index: usize, offset: usize },
}

/// Reusable, preallocated builder for outgoing events.
///
/// All storage is reserved at construction. `push_*` and [`as_raw`] never
/// allocate, so a queue can be filled and delivered from the audio thread.
///
/// [`as_raw`]: EventQueue::as_raw
pub struct EventQueue {
    /// `RawEvents` header plus pointer table; `u64` words for alignment.
    header: Vec<u64>,
    midi: Vec<RawMidiEvent>,
    sysex: Vec<RawSysExEvent>,
    sysex_data: Vec<u8>,
    order: Vec<Slot>,
    capacity: usize,
    sysex_capacity: usize,
}

// Raw pointers in the queue only address storage owned by the queue.
unsafe impl Send for EventQueue {}

impl EventQueue {
    pub fn new(capacity: usize, sysex_capacity: usize) -> Self {
        let events_offset = offset_of!(RawEvents, events);
        let needed = events_offset + capacity * size_of::<*mut RawEvent>();
        let alloc_size = needed.max(size_of::<RawEvents>());
        let u64_count = alloc_size.div_ceil(8);

        Self {
            header: vec![0u64; u64_count],
            midi: Vec::with_capacity(capacity),
            sysex: Vec::with_capacity(capacity),
            sysex_data: Vec::with_capacity(sysex_capacity),
            order: Vec::with_capacity(capacity),
            capacity,
            sysex_capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes of sysex payload the arena holds.
    pub fn sysex_capacity(&self) -> usize {
        self.sysex_capacity
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.midi.clear();
        self.sysex.clear();
        self.sysex_data.clear();
        self.order.clear();
    }

    pub fn push_midi(&mut self, event: MidiEvent) -> Result<()> {
        self.ensure_room()?;
        self.order.push(Slot::Midi(self.midi.len()));
        self.midi.push(event.to_raw());
        Ok(())
    }

    /// Queue a sysex dump; the bytes are copied into the queue's arena.
    pub fn push_sysex(&mut self, delta_frames: i32, payload: &[u8]) -> Result<()> {
        self.ensure_room()?;
        if self.sysex_data.len() + payload.len() > self.sysex_capacity {
            return Err(BridgeError::QueueFull {
                capacity: self.sysex_capacity,
            });
        }

        let offset = self.sysex_data.len();
        self.sysex_data.extend_from_slice(payload);
        self.order.push(Slot::SysEx {
            index: self.sysex.len(),
            offset,
        });
        self.sysex.push(RawSysExEvent {
            event_type: event_types::SYSEX,
            byte_size: size_of::<RawSysExEvent>() as i32,
            delta_frames,
            flags: 0,
            dump_bytes: payload.len() as i32,
            reserved1: 0,
            sysex_dump: ptr::null_mut(),
            reserved2: 0,
        });
        Ok(())
    }

    /// Queue an owned event, e.g. one captured from another plugin.
    pub fn push(&mut self, event: &OwnedEvent) -> Result<()> {
        match event {
            OwnedEvent::Midi(midi) => self.push_midi(*midi),
            OwnedEvent::SysEx {
                delta_frames,
                payload,
            } => self.push_sysex(*delta_frames, payload),
            OwnedEvent::Unknown { .. } => Ok(()),
        }
    }

    /// Copy a borrowed event in without allocating.
    pub fn push_event(&mut self, event: &Event<'_>) -> Result<()> {
        match *event {
            Event::Midi(midi) => self.push_midi(midi),
            Event::SysEx(sysex) => self.push_sysex(sysex.delta_frames, sysex.payload),
            Event::Unknown { .. } => Ok(()),
        }
    }

    fn ensure_room(&self) -> Result<()> {
        if self.order.len() >= self.capacity {
            return Err(BridgeError::QueueFull {
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Lay the queue out as a `RawEvents` array in insertion order.
    ///
    /// The returned pointer is valid until the queue is next mutated or
    /// dropped; it is meant to be passed straight into a dispatch call.
    pub fn as_raw(&mut self) -> *mut RawEvents {
        let base = self.header.as_mut_ptr() as *mut u8;
        let events = base as *mut RawEvents;
        let data = self.sysex_data.as_mut_ptr();

        // SAFETY: `header` was sized for `capacity` pointers and
        // `order.len() <= capacity`; every slot index is in bounds.
        unsafe {
            (*events).num_events = self.order.len() as i32;
            (*events).reserved = 0;
            let table = base.add(offset_of!(RawEvents, events)) as *mut *mut RawEvent;

            for (i, slot) in self.order.iter().enumerate() {
                let event = match *slot {
                    Slot::Midi(index) => {
                        self.midi.as_mut_ptr().add(index) as *mut RawEvent
                    }
                    Slot::SysEx { index, offset } => {
                        let sysex = self.sysex.as_mut_ptr().add(index);
                        (*sysex).sysex_dump = data.add(offset);
                        sysex as *mut RawEvent
                    }
                };
                *table.add(i) = event;
            }
        }

        events
    }

    /// Read the queue back through the same path a receiver uses.
    pub fn as_list(&mut self) -> EventList<'_> {
        let raw = self.as_raw();
        // SAFETY: `as_raw` produced a well-formed array owned by `self`.
        match unsafe { EventList::from_raw(raw) } {
            Ok(list) => list,
            Err(_) => EventList::empty(),
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(512, 64 * 1024)
    }
}

/// Validated, read-only view of a received event array.
#[derive(Clone, Copy)]
pub struct EventList<'a> {
    events: &'a [*mut RawEvent],
}

impl<'a> EventList<'a> {
    pub fn empty() -> Self {
        Self { events: &[] }
    }

    /// Validate a foreign event array.
    ///
    /// # Safety
    /// `ptr` must be null or point at a `RawEvents` header followed by
    /// `num_events` pointers, each null or addressing a valid event record,
    /// all readable for `'a`.
    pub unsafe fn from_raw(ptr: *const RawEvents) -> Result<Self> {
        if ptr.is_null() {
            return Err(BridgeError::MalformedPayload("null event list".into()));
        }

        let num_events = (*ptr).num_events;
        if num_events < 0 || num_events as usize > MAX_EVENTS {
            return Err(BridgeError::MalformedPayload(format!(
                "event count {num_events} outside 0..={MAX_EVENTS}"
            )));
        }

        let table = (ptr as *const u8).add(offset_of!(RawEvents, events)) as *const *mut RawEvent;
        let events = if num_events == 0 {
            &[][..]
        } else {
            std::slice::from_raw_parts(table, num_events as usize)
        };
        Ok(Self { events })
    }

    /// Number of slots, including any null entries that iteration skips.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Positional access. Returns `None` for null or malformed entries.
    pub fn get(&self, index: usize) -> Option<Event<'a>> {
        let ptr = *self.events.get(index)?;
        // SAFETY: guaranteed by `from_raw`.
        unsafe { decode(ptr) }
    }

    pub fn iter(&self) -> impl Iterator<Item = Event<'a>> + 'a {
        let events = self.events;
        (0..events.len()).filter_map(move |i| unsafe { decode(events[i]) })
    }

    pub fn to_owned_events(&self) -> OwnedEventVec {
        self.iter().map(|event| event.to_owned_event()).collect()
    }
}

impl std::fmt::Debug for EventList<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventList")
            .field("len", &self.events.len())
            .finish()
    }
}

unsafe fn decode<'a>(ptr: *const RawEvent) -> Option<Event<'a>> {
    if ptr.is_null() {
        return None;
    }

    let header = &*ptr;
    match header.event_type {
        event_types::MIDI => Some(Event::Midi(MidiEvent::from_raw(
            &*(ptr as *const RawMidiEvent),
        ))),
        event_types::SYSEX => {
            let raw = &*(ptr as *const RawSysExEvent);
            let len = raw.dump_bytes;
            if len < 0 || len as usize > MAX_SYSEX_BYTES {
                tracing::warn!(len, "dropping sysex event with invalid length");
                return None;
            }
            let payload = if len == 0 {
                &[][..]
            } else if raw.sysex_dump.is_null() {
                tracing::warn!(len, "dropping sysex event with null dump");
                return None;
            } else {
                std::slice::from_raw_parts(raw.sysex_dump as *const u8, len as usize)
            };
            Some(Event::SysEx(SysExEvent {
                delta_frames: raw.delta_frames,
                payload,
            }))
        }
        other => Some(Event::Unknown {
            event_type: other,
            delta_frames: header.delta_frames,
        }),
    }
}
