//! Stereo gain plugin.
//!
//! Build with `cargo build -p vstbridge-plugin --example gain` and load the
//! resulting shared library in any VST2 host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vstbridge_plugin::{
    export_vst2, AtomicParameters, AudioBuffer, CanDo, HostHandle, ParameterProperties,
    ParameterSpec, Plugin, PluginCategory, PluginMetadata, PluginParameters, Result, Sample,
};

const GAIN: usize = 0;

struct Gain {
    params: Arc<AtomicParameters>,
    bypass: AtomicBool,
}

impl Gain {
    /// Normalized 0..1 maps to 0..2 linear.
    fn linear_gain(&self) -> f32 {
        self.params.value(GAIN) * 2.0
    }

    fn run<T: Sample>(&self, buffer: &mut AudioBuffer<'_, T>) {
        let gain = if self.bypass.load(Ordering::Relaxed) {
            1.0
        } else {
            self.linear_gain()
        };
        let (inputs, mut outputs) = buffer.split();
        for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
            for (o, i) in output.iter_mut().zip(input) {
                *o = T::from_f32(i.to_f32() * gain);
            }
        }
    }
}

impl Plugin for Gain {
    fn new(_host: HostHandle) -> Result<Self> {
        let gain = ParameterSpec::new("Gain", 0.5)
            .label("x")
            .properties(ParameterProperties::new().with_label("Gain").can_ramp());
        let params = AtomicParameters::new(vec![gain]).with_programs(vec!["Unity".into()]);
        Ok(Self {
            params: Arc::new(params),
            bypass: AtomicBool::new(false),
        })
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(*b"VbGn", "Bridge Gain")
            .vendor("vstbridge")
            .category(PluginCategory::Effect)
            .audio_io(2, 2)
            .parameters(self.params.len())
            .programs(self.params.num_programs())
            .f64_support(true)
            .preset_chunks(true)
            .can_do("bypass", CanDo::Yes)
            .can_do("receiveVstEvents", CanDo::No)
            .can_do("receiveVstMidiEvent", CanDo::No)
    }

    fn parameters(&self) -> Arc<dyn PluginParameters> {
        self.params.clone()
    }

    fn set_bypass(&mut self, bypass: bool) -> bool {
        self.bypass.store(bypass, Ordering::Relaxed);
        true
    }

    fn process(&mut self, buffer: &mut AudioBuffer<'_, f32>) {
        self.run(buffer);
    }

    fn process_f64(&mut self, buffer: &mut AudioBuffer<'_, f64>) {
        self.run(buffer);
    }
}

export_vst2!(Gain);
