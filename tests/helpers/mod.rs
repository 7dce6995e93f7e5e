//! Test plugins and a recording host for vstbridge integration tests
//!
//! Every test hosts managed plugins in-process: the host side calls the
//! plugin's entry point directly instead of loading a library, so both
//! halves of the bridge meet only through the raw descriptor.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::{Arc, OnceLock, Weak};

use vstbridge::core::{build_time_info, EventList, EventQueue, ProcessLevel, TimeInfo};
use vstbridge::host::current_process_level;
use vstbridge::plugin::entry_point;
use vstbridge::{
    AtomicParameters, AudioBuffer, BridgeError, CanDo, Host, HostConfig, HostHandle, OwnedEvent,
    ParameterProperties, ParameterSpec, Plugin, PluginCategory, PluginInstance, PluginMetadata, PluginParameters,
    Sample, TransportInfo, VST_VERSION,
};

/// Default test sample rate (matches common hardware)
pub const TEST_SAMPLE_RATE: f32 = 48000.0;

/// Small block so chunking is exercised
pub const TEST_BLOCK_SIZE: usize = 64;

pub fn test_config() -> HostConfig {
    HostConfig::default()
        .sample_rate(TEST_SAMPLE_RATE)
        .block_size(TEST_BLOCK_SIZE)
}

/// Route bridge logs to the test harness; `RUST_LOG=vstbridge=trace` shows dispatch.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Construct a managed plugin through its entry point without opening it.
pub fn construct<P: Plugin>(host: Arc<dyn Host>) -> Result<PluginInstance, BridgeError> {
    init_tracing();
    unsafe { PluginInstance::construct(entry_point::<P>, host) }
}

/// Construct, open and configure a managed plugin.
pub fn instantiate<P: Plugin>(host: Arc<dyn Host>) -> PluginInstance {
    init_tracing();
    unsafe { PluginInstance::instantiate(entry_point::<P>, host, &test_config()) }
        .expect("Failed to instantiate test plugin")
}

/// Peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
}

/// Ramp from 0 towards 1, distinct per sample.
pub fn ramp(num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| i as f32 / num_samples as f32)
        .collect()
}

// ============================================================================
// Recording host
// ============================================================================

/// Negative edit indices the chatty plugin uses to report its own lifecycle.
pub mod marks {
    pub const OPENED: i32 = -10;
    pub const RESUMED: i32 = -11;
    pub const SUSPENDED: i32 = -12;
    pub const CLOSED: i32 = -13;
}

/// What a plugin saw when it re-entered the host while being called.
#[derive(Debug, Clone, PartialEq)]
pub struct ReentryReport {
    /// `get_parameter(0)` from inside the callback
    pub parameter: Option<f32>,
    /// `set_bypass(false)` from inside the callback; the plugin is busy
    pub exclusive: Option<bool>,
    pub close_refused: bool,
}

/// Host that remembers every callback it receives.
///
/// When attached to an instance, each `automate` call re-enters that
/// instance and records what happened.
#[derive(Default)]
pub struct RecordingHost {
    automation: Mutex<Vec<(i32, f32)>>,
    marks: Mutex<Vec<i32>>,
    events: Mutex<Vec<OwnedEvent>>,
    levels: Mutex<Vec<ProcessLevel>>,
    transport: Mutex<TransportInfo>,
    instance: OnceLock<Weak<PluginInstance>>,
    reports: Mutex<Vec<ReentryReport>>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Re-enter `instance` from every automation callback.
    pub fn attach(&self, instance: &Arc<PluginInstance>) {
        let _ = self.instance.set(Arc::downgrade(instance));
    }

    pub fn automation(&self) -> Vec<(i32, f32)> {
        self.automation.lock().clone()
    }

    pub fn marks(&self) -> Vec<i32> {
        self.marks.lock().clone()
    }

    pub fn events(&self) -> Vec<OwnedEvent> {
        self.events.lock().clone()
    }

    pub fn levels(&self) -> Vec<ProcessLevel> {
        self.levels.lock().clone()
    }

    pub fn reports(&self) -> Vec<ReentryReport> {
        self.reports.lock().clone()
    }

    pub fn set_transport(&self, transport: TransportInfo) {
        *self.transport.lock() = transport;
    }

    fn reenter(&self) {
        let Some(instance) = self.instance.get().and_then(Weak::upgrade) else {
            return;
        };
        let report = ReentryReport {
            parameter: instance.get_parameter(0).ok(),
            exclusive: instance.set_bypass(false).ok(),
            close_refused: instance.close().is_err(),
        };
        self.reports.lock().push(report);
    }
}

impl Host for RecordingHost {
    fn automate(&self, index: i32, value: f32) {
        self.automation.lock().push((index, value));
        self.reenter();
    }

    fn begin_edit(&self, index: i32) {
        self.marks.lock().push(index);
    }

    fn sample_rate(&self) -> f32 {
        TEST_SAMPLE_RATE
    }

    fn block_size(&self) -> i32 {
        TEST_BLOCK_SIZE as i32
    }

    fn time_info(&self, _mask: i32) -> Option<TimeInfo> {
        let transport = *self.transport.lock();
        Some(build_time_info(&transport, TEST_SAMPLE_RATE as f64))
    }

    fn process_events(&self, events: &EventList<'_>) -> bool {
        self.events
            .lock()
            .extend(events.iter().map(|e| e.to_owned_event()));
        true
    }

    fn process_level(&self) -> ProcessLevel {
        let level = current_process_level();
        self.levels.lock().push(level);
        level
    }

    fn vendor_string(&self) -> String {
        "Recording Host".to_string()
    }

    fn product_string(&self) -> String {
        "recorder".to_string()
    }
}

// ============================================================================
// Test plugins
// ============================================================================

fn gain_parameters() -> AtomicParameters {
    AtomicParameters::new(vec![
        ParameterSpec::new("Gain", 0.5).label("x"),
        ParameterSpec::new("Mix", 1.0).properties(
            ParameterProperties::new()
                .with_label("Dry/Wet Mix")
                .with_short_label("Mix")
                .can_ramp()
                .category(1, 2, "Output"),
        ),
    ])
    .with_programs(vec!["Init".into(), "Loud".into()])
}

fn apply_gain<T: Sample>(gain: f32, buffer: &mut AudioBuffer<'_, T>) {
    let (inputs, mut outputs) = buffer.split();
    for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
        for (o, i) in output.iter_mut().zip(input) {
            *o = T::from_f32(i.to_f32() * gain);
        }
    }
}

/// Stereo gain, single precision only: `out = in * 2 * param[0]`.
pub struct Gain {
    params: Arc<AtomicParameters>,
}

impl Gain {
    pub const ID: [u8; 4] = *b"TGan";

    fn gain(&self) -> f32 {
        self.params.value(0) * 2.0
    }
}

impl Plugin for Gain {
    fn new(_host: HostHandle) -> vstbridge::core::Result<Self> {
        Ok(Self {
            params: Arc::new(gain_parameters()),
        })
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(Self::ID, "Test Gain")
            .vendor("vstbridge tests")
            .vendor_version(7)
            .audio_io(2, 2)
            .parameters(self.params.len())
            .programs(self.params.num_programs())
            .can_do("bypass", CanDo::No)
    }

    fn parameters(&self) -> Arc<dyn PluginParameters> {
        self.params.clone()
    }

    fn process(&mut self, buffer: &mut AudioBuffer<'_, f32>) {
        apply_gain(self.gain(), buffer);
    }
}

/// [`Gain`] with double precision and chunk state.
pub struct WideGain(Gain);

impl WideGain {
    pub const ID: [u8; 4] = *b"TGnW";
}

impl Plugin for WideGain {
    fn new(host: HostHandle) -> vstbridge::core::Result<Self> {
        Gain::new(host).map(Self)
    }

    fn metadata(&self) -> PluginMetadata {
        let mut metadata = self.0.metadata().f64_support(true).preset_chunks(true);
        metadata.unique_id = i32::from_be_bytes(Self::ID);
        metadata.name = "Test Gain (wide)".into();
        metadata
    }

    fn parameters(&self) -> Arc<dyn PluginParameters> {
        self.0.parameters()
    }

    fn process(&mut self, buffer: &mut AudioBuffer<'_, f32>) {
        self.0.process(buffer);
    }

    fn process_f64(&mut self, buffer: &mut AudioBuffer<'_, f64>) {
        apply_gain(self.0.gain(), buffer);
    }
}

/// Mono pass-through delayed by [`Lookahead::LATENCY`] samples.
pub struct Lookahead {
    ring: Vec<f32>,
    position: usize,
}

impl Lookahead {
    pub const LATENCY: usize = 32;
}

impl Plugin for Lookahead {
    fn new(_host: HostHandle) -> vstbridge::core::Result<Self> {
        Ok(Self {
            ring: vec![0.0; Self::LATENCY],
            position: 0,
        })
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(*b"TLka", "Lookahead")
            .audio_io(1, 1)
            .latency(Self::LATENCY)
    }

    fn resume(&mut self) {
        self.ring.fill(0.0);
        self.position = 0;
    }

    fn process(&mut self, buffer: &mut AudioBuffer<'_, f32>) {
        let (inputs, mut outputs) = buffer.split();
        let (Some(input), Some(output)) = (inputs.get(0), outputs.get_mut(0)) else {
            return;
        };
        for (o, i) in output.iter_mut().zip(input) {
            *o = self.ring[self.position];
            self.ring[self.position] = *i;
            self.position = (self.position + 1) % self.ring.len();
        }
    }
}

/// Mono analyzer with no outputs; parameter 0 holds the peak input seen.
pub struct Meter {
    params: Arc<AtomicParameters>,
}

impl Plugin for Meter {
    fn new(_host: HostHandle) -> vstbridge::core::Result<Self> {
        Ok(Self {
            params: Arc::new(AtomicParameters::new(vec![ParameterSpec::new("Peak", 0.0)])),
        })
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(*b"TMtr", "Meter")
            .category(PluginCategory::Analysis)
            .audio_io(1, 0)
            .parameters(1)
    }

    fn parameters(&self) -> Arc<dyn PluginParameters> {
        self.params.clone()
    }

    fn process(&mut self, buffer: &mut AudioBuffer<'_, f32>) {
        let (inputs, _) = buffer.split();
        if let Some(input) = inputs.get(0) {
            let block = input.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
            self.params.set_parameter(0, self.params.value(0).max(block));
        }
    }
}

/// Synth that sends every incoming event straight back to the host.
pub struct Echo {
    host: HostHandle,
    outgoing: EventQueue,
}

impl Plugin for Echo {
    fn new(host: HostHandle) -> vstbridge::core::Result<Self> {
        Ok(Self {
            host,
            outgoing: EventQueue::new(64, 4096),
        })
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(*b"TEch", "Echo")
            .category(PluginCategory::Synth)
            .audio_io(0, 2)
            .midi(16, 16)
            .can_do("receiveVstEvents", CanDo::Yes)
            .can_do("receiveVstMidiEvent", CanDo::Yes)
            .can_do("sendVstEvents", CanDo::Yes)
            .can_do("sendVstMidiEvent", CanDo::Yes)
            .can_do("offline", CanDo::No)
    }

    fn process_events(&mut self, events: &EventList<'_>) {
        self.outgoing.clear();
        for event in events.iter() {
            let _ = self.outgoing.push(&event.to_owned_event());
        }
        self.host.process_events(&mut self.outgoing);
    }

    fn process(&mut self, buffer: &mut AudioBuffer<'_, f32>) {
        buffer.zero_outputs();
    }
}

/// Talks back to the host from every entry point.
///
/// Lifecycle changes are reported as `begin_edit` with a negative index
/// from [`marks`]. Each block writes `tempo / 1000` to its output and
/// automates parameter 0. Bypass sets parameter 0 to 0.75 and automates it
/// while the plugin is held exclusively.
pub struct Chatty {
    host: HostHandle,
    params: Arc<AtomicParameters>,
    host_product: String,
    host_rate: f32,
}

impl Plugin for Chatty {
    fn new(host: HostHandle) -> vstbridge::core::Result<Self> {
        if host.version() != VST_VERSION {
            return Err(BridgeError::ConstructionFailed("unexpected host version".into()));
        }
        Ok(Self {
            host_product: host.product_string().unwrap_or_default(),
            host_rate: host.sample_rate().unwrap_or(0.0),
            params: Arc::new(AtomicParameters::new(vec![ParameterSpec::new("Level", 0.25)])),
            host,
        })
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(*b"TCht", "Chatty")
            .product(format!("Chatty for {}", self.host_product))
            .audio_io(0, 1)
            .parameters(1)
            .programs(1)
            .tail(self.host_rate as isize)
    }

    fn parameters(&self) -> Arc<dyn PluginParameters> {
        self.params.clone()
    }

    fn open(&mut self) {
        self.host.begin_edit(marks::OPENED);
    }

    fn close(&mut self) {
        self.host.begin_edit(marks::CLOSED);
    }

    fn resume(&mut self) {
        self.host.begin_edit(marks::RESUMED);
    }

    fn suspend(&mut self) {
        self.host.begin_edit(marks::SUSPENDED);
    }

    fn set_sample_rate(&mut self, _rate: f32) {
        self.host.process_level();
    }

    fn set_bypass(&mut self, _bypass: bool) -> bool {
        self.params.set_parameter(0, 0.75);
        self.host.automate(0, 0.75);
        true
    }

    fn process(&mut self, buffer: &mut AudioBuffer<'_, f32>) {
        self.host.process_level();
        let tempo = self.host.time_info(0).map(|t| t.tempo).unwrap_or(0.0);
        if let Some(output) = buffer.output(0) {
            output.fill((tempo / 1000.0) as f32);
        }
        self.host.automate(0, self.params.value(0));
    }
}

/// Refuses to be constructed.
pub struct Refuses;

impl Plugin for Refuses {
    fn new(_host: HostHandle) -> vstbridge::core::Result<Self> {
        Err(BridgeError::ConstructionFailed("no".into()))
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(*b"TRef", "Refuses")
    }

    fn process(&mut self, buffer: &mut AudioBuffer<'_, f32>) {
        buffer.zero_outputs();
    }
}
