//! What a loaded plugin can ask of its host.

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use vstbridge_core::{
    build_time_info, CanDo, EventList, EventQueue, OwnedEvent, ProcessLevel, RawCall, TimeInfo, TransportInfo,
    VST_VERSION,
};

use crate::callback;
use crate::config::HostConfig;

/// Answers plugin-to-host requests.
///
/// Called from whatever thread the plugin calls back on, including the
/// audio thread, so implementations must not block.
pub trait Host: Send + Sync {
    fn version(&self) -> i32 {
        VST_VERSION
    }

    /// A parameter was changed by the plugin itself.
    fn automate(&self, _index: i32, _value: f32) {}

    fn begin_edit(&self, _index: i32) {}

    fn end_edit(&self, _index: i32) {}

    fn current_id(&self) -> i32 {
        0
    }

    fn idle(&self) {}

    fn sample_rate(&self) -> f32;

    fn block_size(&self) -> i32;

    fn input_latency(&self) -> i32 {
        0
    }

    fn output_latency(&self) -> i32 {
        0
    }

    /// Transport for the current block. `mask` lists the
    /// `time_info_flags` the plugin asked for.
    fn time_info(&self, _mask: i32) -> Option<TimeInfo> {
        None
    }

    /// Events emitted by the plugin. Copy anything kept past this call.
    fn process_events(&self, _events: &EventList<'_>) -> bool {
        false
    }

    fn io_changed(&self) -> bool {
        false
    }

    fn update_display(&self) -> bool {
        false
    }

    fn process_level(&self) -> ProcessLevel {
        callback::current_process_level()
    }

    /// 1 is "automation off".
    fn automation_state(&self) -> i32 {
        1
    }

    fn vendor_string(&self) -> String {
        String::new()
    }

    fn product_string(&self) -> String {
        String::new()
    }

    fn vendor_version(&self) -> i32 {
        0
    }

    fn can_do(&self, _capability: &str) -> CanDo {
        CanDo::No
    }

    /// 1 is English.
    fn language(&self) -> i32 {
        1
    }

    /// Any opcode the bridge does not decode.
    fn other(&self, _call: RawCall) -> isize {
        0
    }
}

/// A parameter change reported by the plugin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterChange {
    pub index: i32,
    pub value: f32,
}

/// Default [`Host`]: queues automation on a bounded channel, copies plugin
/// MIDI output into a preallocated queue and serves the transport from a
/// lock-free cell.
pub struct BridgeHost {
    config: HostConfig,
    param_tx: Sender<ParameterChange>,
    param_rx: Receiver<ParameterChange>,
    /// Filled from the audio thread; never grows.
    outbox: Mutex<EventQueue>,
    /// Swapped with `outbox` when polling so the copy-out happens unlocked.
    drained: Mutex<EventQueue>,
    transport: ArcSwap<TransportInfo>,
    dropped: AtomicU64,
}

impl BridgeHost {
    pub fn new(config: HostConfig) -> Self {
        let capacity = config.automation_queue.max(1);
        let (param_tx, param_rx) = crossbeam_channel::bounded(capacity);
        let outbox = || EventQueue::new(capacity, config.max_sysex_bytes);
        Self {
            param_tx,
            param_rx,
            outbox: Mutex::new(outbox()),
            drained: Mutex::new(outbox()),
            transport: ArcSwap::from_pointee(TransportInfo::default()),
            dropped: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn set_transport(&self, transport: TransportInfo) {
        self.transport.store(Arc::new(transport));
    }

    pub fn transport(&self) -> TransportInfo {
        **self.transport.load()
    }

    /// Drain automation reported since the last poll.
    pub fn poll_parameter_changes(&self) -> Vec<ParameterChange> {
        self.param_rx.try_iter().collect()
    }

    /// Drain events the plugin has emitted since the last poll.
    pub fn poll_midi_output(&self) -> Vec<OwnedEvent> {
        let mut drained = self.drained.lock();
        std::mem::swap(&mut *drained, &mut *self.outbox.lock());
        let events = drained.as_list().iter().map(|e| e.to_owned_event()).collect();
        drained.clear();
        events
    }

    /// Messages lost because a queue was full.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn offer<T>(&self, tx: &Sender<T>, item: T) -> bool {
        match tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

impl Default for BridgeHost {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl Host for BridgeHost {
    fn automate(&self, index: i32, value: f32) {
        self.offer(&self.param_tx, ParameterChange { index, value });
    }

    fn current_id(&self) -> i32 {
        self.config.shell_plugin_id.unwrap_or(0)
    }

    fn sample_rate(&self) -> f32 {
        self.config.sample_rate
    }

    fn block_size(&self) -> i32 {
        self.config.block_size as i32
    }

    fn time_info(&self, _mask: i32) -> Option<TimeInfo> {
        let transport = self.transport.load();
        Some(build_time_info(&transport, self.config.sample_rate as f64))
    }

    fn process_events(&self, events: &EventList<'_>) -> bool {
        let Some(mut outbox) = self.outbox.try_lock() else {
            self.dropped.fetch_add(events.len() as u64, Ordering::Relaxed);
            return false;
        };
        let mut accepted = false;
        for event in events.iter() {
            match outbox.push_event(&event) {
                Ok(()) => accepted = true,
                Err(_) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        accepted
    }

    fn vendor_string(&self) -> String {
        self.config.vendor.clone()
    }

    fn product_string(&self) -> String {
        self.config.product.clone()
    }

    fn vendor_version(&self) -> i32 {
        self.config.vendor_version
    }

    fn can_do(&self, capability: &str) -> CanDo {
        match capability {
            "sendVstEvents"
            | "sendVstMidiEvent"
            | "receiveVstEvents"
            | "receiveVstMidiEvent"
            | "sendVstTimeInfo" => CanDo::Yes,
            "supportShell" if self.config.shell_plugin_id.is_some() => CanDo::Yes,
            _ => CanDo::No,
        }
    }
}
