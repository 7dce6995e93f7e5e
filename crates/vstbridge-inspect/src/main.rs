//! Load a VST2 plugin and print what it reports, as JSON.
//!
//! ```text
//! vst-inspect <plugin> [config.json]
//! vst-inspect --scan [dir]
//! ```
//!
//! The report covers the descriptor, strings, parameters, a few blocks of
//! silence with a note sent in, and every event the plugin emitted.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use vstbridge_core::{BridgeError, DescriptorInfo, MidiEvent, OwnedEvent, PluginCategory};
use vstbridge_host::{BridgeHost, HostConfig, Module, PluginInstance, ProcessStatus, Processor};

const BLOCKS: usize = 8;

#[derive(Error, Debug)]
enum InspectError {
    #[error("usage: vst-inspect <plugin> [config.json] | vst-inspect --scan [dir]")]
    Usage,

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, InspectError>;

#[derive(Serialize)]
struct ParameterReport {
    index: i32,
    name: String,
    label: String,
    display: String,
    value: f32,
    automatable: bool,
}

#[derive(Serialize)]
struct Report {
    path: PathBuf,
    entry_symbol: &'static str,
    descriptor: DescriptorInfo,
    name: String,
    vendor: String,
    product: String,
    vendor_version: i32,
    vst_version: i32,
    category: PluginCategory,
    latency: usize,
    programs: Vec<String>,
    parameters: Vec<ParameterReport>,
    blocks: Vec<String>,
    events: Vec<OwnedEvent>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(std::env::args().skip(1).collect()) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Vec<String>) -> Result<()> {
    match args.as_slice() {
        [flag] if flag == "--scan" => scan(None),
        [flag, dir] if flag == "--scan" => scan(Some(Path::new(dir))),
        [plugin] => inspect(Path::new(plugin), HostConfig::default()),
        [plugin, config] => {
            let config = HostConfig::from_json(&std::fs::read_to_string(config)?)?;
            inspect(Path::new(plugin), config)
        }
        _ => Err(InspectError::Usage),
    }
}

fn scan(dir: Option<&Path>) -> Result<()> {
    let modules = match dir {
        Some(dir) => vstbridge_host::scan_directory(dir)?,
        None => vstbridge_host::scan::scan_default_paths(),
    };
    println!("{}", serde_json::to_string_pretty(&modules)?);
    Ok(())
}

fn inspect(path: &Path, config: HostConfig) -> Result<()> {
    let host = Arc::new(BridgeHost::new(config.clone()));
    let module = Module::open(path)?;
    let instance = Arc::new(module.instantiate(host.clone(), &config)?);
    tracing::info!(path = %path.display(), "inspecting");

    let parameters = (0..instance.info().num_params)
        .map(|index| parameter_report(&instance, index))
        .collect::<Result<Vec<_>>>()?;
    let programs = (0..instance.info().num_programs)
        .filter_map(|index| instance.program_name_indexed(index).transpose())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut processor = Processor::new(Arc::clone(&instance), &config)?;
    processor.resume()?;
    let blocks = drive(&mut processor, config.block_size)?;
    processor.suspend()?;

    let report = Report {
        path: path.to_path_buf(),
        entry_symbol: module.entry_symbol(),
        descriptor: *instance.info(),
        name: instance.effect_name()?,
        vendor: instance.vendor_string()?,
        product: instance.product_string()?,
        vendor_version: instance.vendor_version()?,
        vst_version: instance.vst_version()?,
        category: instance.category()?,
        latency: processor.latency(),
        programs,
        parameters,
        blocks,
        events: host.poll_midi_output(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    instance.close()?;
    Ok(())
}

fn parameter_report(instance: &PluginInstance, index: i32) -> Result<ParameterReport> {
    Ok(ParameterReport {
        index,
        name: instance.parameter_name(index)?,
        label: instance.parameter_label(index)?,
        display: instance.parameter_display(index)?,
        value: instance.get_parameter(index)?,
        automatable: instance.can_be_automated(index)?,
    })
}

/// Run silent blocks, with a note-on in the first and its note-off in the
/// middle one.
fn drive(processor: &mut Processor, block_size: usize) -> Result<Vec<String>> {
    let info = *processor.instance().info();
    let silence = vec![0.0f32; block_size];
    let inputs: Vec<&[f32]> = (0..info.inputs()).map(|_| &silence[..]).collect();
    let mut outputs = vec![vec![0.0f32; block_size]; info.outputs()];

    let mut statuses = Vec::with_capacity(BLOCKS);
    for block in 0..BLOCKS {
        if block == 0 {
            processor.queue_midi(MidiEvent::note_on(0, 0, 60, 100))?;
        } else if block == BLOCKS / 2 {
            processor.queue_midi(MidiEvent::note_off(0, 0, 60, 0))?;
        }
        let mut refs: Vec<&mut [f32]> = outputs.iter_mut().map(|c| &mut c[..]).collect();
        let status = processor.process(&inputs, &mut refs)?;
        if status != ProcessStatus::Processed {
            tracing::warn!(block, ?status, "block not processed");
        }
        let peak = outputs
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f32, |peak, s| peak.max(s.abs()));
        statuses.push(format!("{status:?} peak={peak:.4}"));
    }
    Ok(statuses)
}
