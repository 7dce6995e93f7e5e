//! Block driver on top of [`PluginInstance::process`].

use std::sync::Arc;

use vstbridge_core::{
    BridgeError, ChannelBuffers, EventQueue, MidiEvent, OwnedEvent, Result, Sample, SampleFormat,
};

use crate::config::HostConfig;
use crate::instance::{PluginInstance, ProcessStatus};

/// Feeds `f32` audio of any length through a plugin in blocks of at most
/// the configured size, in whichever precision the plugin was set up for.
pub struct Processor {
    instance: Arc<PluginInstance>,
    format: SampleFormat,
    single: ChannelBuffers<f32>,
    double: Option<ChannelBuffers<f64>>,
    events: EventQueue,
    frames_processed: u64,
    latency: usize,
}

impl Processor {
    /// Pick the precision, announce it to the plugin and allocate buffers.
    /// Call before [`Processor::resume`].
    pub fn new(instance: Arc<PluginInstance>, config: &HostConfig) -> Result<Self> {
        let format = if config.preferred_format == SampleFormat::Float64
            && instance.supports(SampleFormat::Float64)
        {
            SampleFormat::Float64
        } else {
            SampleFormat::Float32
        };
        instance.set_process_precision(format)?;

        let info = *instance.info();
        let block = config.block_size.max(1);
        let single = ChannelBuffers::new(info.inputs(), info.outputs(), block);
        let double = (format == SampleFormat::Float64)
            .then(|| ChannelBuffers::new(info.inputs(), info.outputs(), block));

        tracing::debug!(?format, block, "processor ready");

        Ok(Self {
            latency: instance.latency(),
            instance,
            format,
            single,
            double,
            events: EventQueue::new(config.max_events, config.max_sysex_bytes),
            frames_processed: 0,
        })
    }

    pub fn instance(&self) -> &Arc<PluginInstance> {
        &self.instance
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn block_size(&self) -> usize {
        self.single.max_frames()
    }

    /// Latency reported at the last resume.
    pub fn latency(&self) -> usize {
        self.latency
    }

    /// First output frame, counted from the last resume, that lines up with
    /// input frame zero.
    pub fn valid_from(&self) -> u64 {
        self.latency as u64
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Whether output has caught up with the plugin's latency.
    pub fn is_primed(&self) -> bool {
        self.frames_processed >= self.valid_from()
    }

    pub fn resume(&mut self) -> Result<()> {
        self.instance.resume()?;
        self.latency = self.instance.latency();
        self.frames_processed = 0;
        Ok(())
    }

    pub fn suspend(&mut self) -> Result<()> {
        self.instance.suspend()
    }

    /// Queue an event for the next block.
    pub fn queue_midi(&mut self, event: MidiEvent) -> Result<()> {
        self.events.push_midi(event)
    }

    pub fn queue_event(&mut self, event: &OwnedEvent) -> Result<()> {
        self.events.push(event)
    }

    /// Process as many frames as the channels hold; a plugin without
    /// outputs is driven by its inputs. Queued events go out with the
    /// first block.
    ///
    /// Returns `Processed` only if every block was processed, otherwise
    /// the first other status seen. Only processed blocks count toward
    /// [`Processor::frames_processed`].
    pub fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]]) -> Result<ProcessStatus> {
        let info = *self.instance.info();
        if inputs.len() != info.inputs() {
            return Err(BridgeError::ChannelMismatch {
                expected: info.inputs(),
                actual: inputs.len(),
            });
        }
        if outputs.len() != info.outputs() {
            return Err(BridgeError::ChannelMismatch {
                expected: info.outputs(),
                actual: outputs.len(),
            });
        }

        let total = outputs
            .first()
            .map(|c| c.len())
            .or_else(|| inputs.first().map(|c| c.len()))
            .unwrap_or(0);
        if inputs.iter().any(|c| c.len() < total) || outputs.iter().any(|c| c.len() < total) {
            return Err(BridgeError::MalformedPayload(
                "channel lengths differ".to_string(),
            ));
        }

        self.flush_events();

        let block = self.block_size();
        let mut status = ProcessStatus::Processed;
        let mut offset = 0;
        while offset < total {
            let frames = block.min(total - offset);
            let block_status = match self.double.as_mut() {
                Some(buffers) => {
                    run_block(&self.instance, buffers, inputs, outputs, offset, frames)
                }
                None => run_block(&self.instance, &mut self.single, inputs, outputs, offset, frames),
            };
            if block_status == ProcessStatus::Processed {
                self.frames_processed += frames as u64;
            } else if status == ProcessStatus::Processed {
                status = block_status;
            }
            offset += frames;
        }
        Ok(status)
    }

    fn flush_events(&mut self) {
        if self.events.is_empty() {
            return;
        }
        if let Err(e) = self.instance.process_events(&mut self.events) {
            tracing::debug!(error = %e, dropped = self.events.len(), "events not delivered");
        }
        self.events.clear();
    }
}

fn run_block<T: Sample>(
    instance: &PluginInstance,
    buffers: &mut ChannelBuffers<T>,
    inputs: &[&[f32]],
    outputs: &mut [&mut [f32]],
    offset: usize,
    frames: usize,
) -> ProcessStatus {
    buffers.set_frames(frames);
    for (channel, input) in inputs.iter().enumerate() {
        let source = &input[offset..offset + frames];
        for (dst, src) in buffers.input_mut(channel).iter_mut().zip(source) {
            *dst = T::from_f32(*src);
        }
    }

    let status = instance.process(buffers);

    for (channel, output) in outputs.iter_mut().enumerate() {
        let target = &mut output[offset..offset + frames];
        for (dst, src) in target.iter_mut().zip(buffers.output(channel)) {
            *dst = src.to_f32();
        }
    }
    status
}
