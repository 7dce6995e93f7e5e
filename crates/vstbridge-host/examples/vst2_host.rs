//! Minimal host: load a plugin, run one second of a sine through it, and
//! print the output level.
//!
//! ```text
//! cargo run -p vstbridge-host --example vst2_host -- /usr/lib/vst/plugin.so
//! ```
//!
//! Without an argument, lists the plugins found in the default search paths.

use std::f32::consts::TAU;
use std::sync::Arc;

use vstbridge_host::{BridgeHost, HostConfig, Module, Processor, Result};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let Some(path) = std::env::args().nth(1) else {
        for module in vstbridge_host::scan::scan_default_paths() {
            println!("{}", module.display());
        }
        return Ok(());
    };

    let config = HostConfig::default();
    let host = Arc::new(BridgeHost::new(config.clone()));
    let module = Module::open(&path)?;
    let instance = Arc::new(module.instantiate(host.clone(), &config)?);

    println!(
        "{} by {} ({} in / {} out, {} params)",
        instance.effect_name()?,
        instance.vendor_string()?,
        instance.info().num_inputs,
        instance.info().num_outputs,
        instance.info().num_params,
    );

    let mut processor = Processor::new(Arc::clone(&instance), &config)?;
    processor.resume()?;

    let frames = config.sample_rate as usize;
    let sine: Vec<f32> = (0..frames)
        .map(|i| (TAU * 440.0 * i as f32 / config.sample_rate).sin() * 0.5)
        .collect();
    let inputs: Vec<&[f32]> = (0..instance.info().inputs()).map(|_| &sine[..]).collect();
    let mut outputs: Vec<Vec<f32>> = vec![vec![0.0; frames]; instance.info().outputs()];
    let mut output_refs: Vec<&mut [f32]> = outputs.iter_mut().map(|c| &mut c[..]).collect();

    let status = processor.process(&inputs, &mut output_refs)?;
    processor.suspend()?;

    for (channel, samples) in outputs.iter().enumerate() {
        let rms = (samples.iter().map(|s| s * s).sum::<f32>() / frames as f32).sqrt();
        println!("channel {channel}: rms {rms:.4}");
    }
    println!("status: {status:?}, latency: {} samples", processor.latency());

    for change in host.poll_parameter_changes() {
        println!("automation: param {} -> {:.3}", change.index, change.value);
    }

    instance.close()
}
