//! Audio buffers exchanged by the processing invocation.
//!
//! [`AudioBuffer`] is a borrowed, non-allocating view over the raw
//! channel-pointer tables of a single process call. [`ChannelBuffers`] owns
//! storage and pointer tables for callers that need to produce such a call.
//! [`InputScratch`] separates inputs a host passed in place of an output.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::mem::size_of;
use std::slice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleFormat {
    #[default]
    Float32,
    Float64,
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Sample precision accepted by the processing path.
pub trait Sample: Copy + Default + PartialEq + Send + Sync + 'static + sealed::Sealed {
    const FORMAT: SampleFormat;
    const ZERO: Self;

    fn from_f32(value: f32) -> Self;
    fn to_f32(self) -> f32;
}

impl Sample for f32 {
    const FORMAT: SampleFormat = SampleFormat::Float32;
    const ZERO: Self = 0.0;

    #[inline]
    fn from_f32(value: f32) -> Self {
        value
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
}

impl Sample for f64 {
    const FORMAT: SampleFormat = SampleFormat::Float64;
    const ZERO: Self = 0.0;

    #[inline]
    fn from_f32(value: f32) -> Self {
        value as f64
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
}

/// View over one block of multichannel audio.
pub struct AudioBuffer<'a, T: Sample> {
    inputs: &'a [*const T],
    outputs: &'a [*mut T],
    frames: usize,
    _marker: PhantomData<&'a mut T>,
}

impl<'a, T: Sample> AudioBuffer<'a, T> {
    /// Build a view from raw pointer tables.
    ///
    /// # Safety
    /// Each table must hold the given number of non-null channel pointers,
    /// each valid for `frames` samples for `'a`. Output channels must not
    /// overlap each other, and no input may overlap an output. Tables from
    /// a host that processes in place go through [`InputScratch::resolve`]
    /// first.
    pub unsafe fn from_raw(
        inputs: *const *const T,
        num_inputs: usize,
        outputs: *mut *mut T,
        num_outputs: usize,
        frames: usize,
    ) -> Self {
        let inputs = if num_inputs == 0 || inputs.is_null() {
            &[][..]
        } else {
            slice::from_raw_parts(inputs, num_inputs)
        };
        let outputs = if num_outputs == 0 || outputs.is_null() {
            &[][..]
        } else {
            slice::from_raw_parts(outputs as *const *mut T, num_outputs)
        };
        Self {
            inputs,
            outputs,
            frames,
            _marker: PhantomData,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn input(&self, channel: usize) -> Option<&[T]> {
        let ptr = *self.inputs.get(channel)?;
        // SAFETY: guaranteed by `from_raw`.
        Some(unsafe { slice::from_raw_parts(ptr, self.frames) })
    }

    pub fn output(&mut self, channel: usize) -> Option<&mut [T]> {
        let ptr = *self.outputs.get(channel)?;
        // SAFETY: guaranteed by `from_raw`; `&mut self` prevents a second
        // live borrow of the same channel.
        Some(unsafe { slice::from_raw_parts_mut(ptr, self.frames) })
    }

    /// Split into independent input and output halves.
    pub fn split(&mut self) -> (Inputs<'_, T>, Outputs<'_, T>) {
        (
            Inputs {
                ptrs: self.inputs,
                frames: self.frames,
                _marker: PhantomData,
            },
            Outputs {
                ptrs: self.outputs,
                frames: self.frames,
                _marker: PhantomData,
            },
        )
    }

    pub fn zero_outputs(&mut self) {
        for &ptr in self.outputs {
            // SAFETY: guaranteed by `from_raw`.
            unsafe { slice::from_raw_parts_mut(ptr, self.frames) }.fill(T::ZERO);
        }
    }
}

pub struct Inputs<'a, T: Sample> {
    ptrs: &'a [*const T],
    frames: usize,
    _marker: PhantomData<&'a T>,
}

impl<'a, T: Sample> Inputs<'a, T> {
    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ptrs.is_empty()
    }

    pub fn get(&self, channel: usize) -> Option<&'a [T]> {
        let ptr = *self.ptrs.get(channel)?;
        Some(unsafe { slice::from_raw_parts(ptr, self.frames) })
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a [T]> + '_ {
        let frames = self.frames;
        self.ptrs
            .iter()
            .map(move |&ptr| unsafe { slice::from_raw_parts(ptr, frames) })
    }
}

pub struct Outputs<'a, T: Sample> {
    ptrs: &'a [*mut T],
    frames: usize,
    _marker: PhantomData<&'a mut T>,
}

impl<'a, T: Sample> Outputs<'a, T> {
    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ptrs.is_empty()
    }

    pub fn get_mut(&mut self, channel: usize) -> Option<&mut [T]> {
        let ptr = *self.ptrs.get(channel)?;
        Some(unsafe { slice::from_raw_parts_mut(ptr, self.frames) })
    }

    /// Iterate over all output channels. Channels never alias, so the slices
    /// may be held at the same time.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut [T]> + '_ {
        let frames = self.frames;
        self.ptrs
            .iter()
            .map(move |&ptr| unsafe { slice::from_raw_parts_mut(ptr, frames) })
    }

    pub fn fill(&mut self, value: T) {
        for channel in self.iter_mut() {
            channel.fill(value);
        }
    }
}

/// Owned per-channel storage with stable pointer tables.
///
/// Allocates once at construction; `set_frames` and the accessors never
/// allocate, so a block driver can keep one of these per instance.
pub struct ChannelBuffers<T: Sample> {
    inputs: Vec<Box<[T]>>,
    outputs: Vec<Box<[T]>>,
    input_ptrs: Vec<*const T>,
    output_ptrs: Vec<*mut T>,
    max_frames: usize,
    frames: usize,
}

// The pointer tables only ever address the boxed storage owned by `self`.
unsafe impl<T: Sample> Send for ChannelBuffers<T> {}

impl<T: Sample> ChannelBuffers<T> {
    pub fn new(num_inputs: usize, num_outputs: usize, max_frames: usize) -> Self {
        let mut inputs: Vec<Box<[T]>> = (0..num_inputs)
            .map(|_| vec![T::ZERO; max_frames].into_boxed_slice())
            .collect();
        let mut outputs: Vec<Box<[T]>> = (0..num_outputs)
            .map(|_| vec![T::ZERO; max_frames].into_boxed_slice())
            .collect();
        let input_ptrs = inputs
            .iter_mut()
            .map(|c| c.as_mut_ptr() as *const T)
            .collect();
        let output_ptrs = outputs.iter_mut().map(|c| c.as_mut_ptr()).collect();
        Self {
            inputs,
            outputs,
            input_ptrs,
            output_ptrs,
            max_frames,
            frames: max_frames,
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Set the active block length, clamped to the allocated capacity.
    pub fn set_frames(&mut self, frames: usize) -> usize {
        self.frames = frames.min(self.max_frames);
        self.frames
    }

    pub fn input(&self, channel: usize) -> &[T] {
        &self.inputs[channel][..self.frames]
    }

    pub fn input_mut(&mut self, channel: usize) -> &mut [T] {
        &mut self.inputs[channel][..self.frames]
    }

    pub fn output(&self, channel: usize) -> &[T] {
        &self.outputs[channel][..self.frames]
    }

    pub fn output_mut(&mut self, channel: usize) -> &mut [T] {
        &mut self.outputs[channel][..self.frames]
    }

    pub fn fill_inputs(&mut self, value: T) {
        for channel in &mut self.inputs {
            channel.fill(value);
        }
    }

    pub fn fill_outputs(&mut self, value: T) {
        for channel in &mut self.outputs {
            channel.fill(value);
        }
    }

    pub fn zero_outputs(&mut self) {
        self.fill_outputs(T::ZERO);
    }

    /// Raw tables for a foreign process call. Valid until `self` is dropped.
    pub fn raw_tables(&mut self) -> (*const *const T, *mut *mut T) {
        (self.input_ptrs.as_ptr(), self.output_ptrs.as_mut_ptr())
    }

    /// Borrow as an [`AudioBuffer`] for the active block length.
    pub fn as_audio_buffer(&mut self) -> AudioBuffer<'_, T> {
        let frames = self.frames;
        let num_inputs = self.input_ptrs.len();
        let num_outputs = self.output_ptrs.len();
        let (inputs, outputs) = self.raw_tables();
        // SAFETY: tables point at owned storage of `max_frames >= frames`.
        unsafe { AudioBuffer::from_raw(inputs, num_inputs, outputs, num_outputs, frames) }
    }
}

/// Private copies of input channels that share memory with an output.
///
/// Storage for `channels` inputs of up to `max_frames` samples is reserved
/// at construction; [`resolve`](InputScratch::resolve) never allocates.
pub struct InputScratch<T: Sample> {
    data: Vec<T>,
    ptrs: Vec<*const T>,
    channels: usize,
    max_frames: usize,
}

// `ptrs` only ever addresses `data` or the caller's tables for one call.
unsafe impl<T: Sample> Send for InputScratch<T> {}

impl<T: Sample> InputScratch<T> {
    pub fn new(channels: usize, max_frames: usize) -> Self {
        Self {
            data: vec![T::ZERO; channels * max_frames],
            ptrs: Vec::with_capacity(channels),
            channels,
            max_frames,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Return an input table in which no channel overlaps any output.
    ///
    /// Tables without overlap come back unchanged. Overlapping inputs are
    /// copied into scratch storage and the returned table points there.
    /// `None` means an overlapping block does not fit the scratch.
    ///
    /// # Safety
    /// The tables must satisfy [`AudioBuffer::from_raw`] apart from the
    /// input/output overlap. The returned table is valid until the next
    /// call on `self`.
    pub unsafe fn resolve(
        &mut self,
        inputs: *const *const T,
        num_inputs: usize,
        outputs: *const *mut T,
        num_outputs: usize,
        frames: usize,
    ) -> Option<*const *const T> {
        if inputs.is_null() || outputs.is_null() || num_inputs == 0 || num_outputs == 0 || frames == 0 {
            return Some(inputs);
        }
        let input_table = slice::from_raw_parts(inputs, num_inputs);
        let output_table = slice::from_raw_parts(outputs, num_outputs);
        let overlaps = |input: *const T| {
            output_table
                .iter()
                .any(|&output| ranges_overlap(input, output as *const T, frames))
        };
        if !input_table.iter().any(|&input| overlaps(input)) {
            return Some(inputs);
        }
        if num_inputs > self.channels || frames > self.max_frames {
            return None;
        }

        self.ptrs.clear();
        for (channel, &input) in input_table.iter().enumerate() {
            if overlaps(input) {
                let start = channel * self.max_frames;
                let copy = &mut self.data[start..start + frames];
                copy.copy_from_slice(slice::from_raw_parts(input, frames));
                self.ptrs.push(copy.as_ptr());
            } else {
                self.ptrs.push(input);
            }
        }
        Some(self.ptrs.as_ptr())
    }
}

fn ranges_overlap<T>(a: *const T, b: *const T, frames: usize) -> bool {
    let bytes = frames * size_of::<T>();
    let (a, b) = (a as usize, b as usize);
    a < b + bytes && b < a + bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_format_default() {
        assert_eq!(SampleFormat::default(), SampleFormat::Float32);
        assert_eq!(<f64 as Sample>::FORMAT, SampleFormat::Float64);
    }

    #[test]
    fn test_channel_buffers_view() {
        let mut buffers = ChannelBuffers::<f32>::new(2, 2, 64);
        buffers.input_mut(0).fill(0.5);
        buffers.input_mut(1).fill(-0.5);

        let mut audio = buffers.as_audio_buffer();
        assert_eq!(audio.frames(), 64);
        assert_eq!(audio.num_inputs(), 2);
        assert_eq!(audio.num_outputs(), 2);

        let (inputs, mut outputs) = audio.split();
        for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
            output.copy_from_slice(input);
        }

        assert!(buffers.output(0).iter().all(|s| *s == 0.5));
        assert!(buffers.output(1).iter().all(|s| *s == -0.5));
    }

    #[test]
    fn test_set_frames_clamps() {
        let mut buffers = ChannelBuffers::<f64>::new(1, 1, 32);
        assert_eq!(buffers.set_frames(16), 16);
        assert_eq!(buffers.output(0).len(), 16);
        assert_eq!(buffers.set_frames(1000), 32);
    }

    #[test]
    fn test_zero_outputs() {
        let mut buffers = ChannelBuffers::<f32>::new(0, 3, 8);
        buffers.fill_outputs(1.0);
        buffers.as_audio_buffer().zero_outputs();
        for channel in 0..3 {
            assert!(buffers.output(channel).iter().all(|s| *s == 0.0));
        }
    }

    #[test]
    fn test_out_of_range_channel() {
        let mut buffers = ChannelBuffers::<f32>::new(1, 1, 4);
        let mut audio = buffers.as_audio_buffer();
        assert!(audio.input(1).is_none());
        assert!(audio.output(1).is_none());
    }

    #[test]
    fn test_in_place_input_copied() {
        let mut shared = vec![0.25f32; 16];
        let mut other_out = vec![0.0f32; 16];
        let separate_in = vec![0.75f32; 16];
        let inputs = [shared.as_ptr(), separate_in.as_ptr()];
        let outputs = [shared.as_mut_ptr(), other_out.as_mut_ptr()];

        let mut scratch = InputScratch::<f32>::new(2, 16);
        let table = unsafe { scratch.resolve(inputs.as_ptr(), 2, outputs.as_ptr(), 2, 16) }.unwrap();
        assert_ne!(table, inputs.as_ptr());

        let mut audio = unsafe { AudioBuffer::from_raw(table, 2, outputs.as_ptr() as *mut *mut f32, 2, 16) };
        let (ins, mut outs) = audio.split();
        let copy = ins.get(0).unwrap();
        assert_ne!(copy.as_ptr(), shared.as_ptr());
        assert!(ins.get(1).unwrap().as_ptr() == separate_in.as_ptr());
        outs.fill(1.0);
        assert!(copy.iter().all(|s| *s == 0.25));
        drop(audio);
        assert!(shared.iter().all(|s| *s == 1.0));
    }

    #[test]
    fn test_partial_overlap_detected() {
        let mut storage = vec![0.0f64; 24];
        let base = storage.as_mut_ptr();
        let inputs = [base as *const f64];
        let outputs = [unsafe { base.add(8) }];

        let mut scratch = InputScratch::<f64>::new(1, 16);
        let table = unsafe { scratch.resolve(inputs.as_ptr(), 1, outputs.as_ptr(), 1, 16) }.unwrap();
        assert_ne!(table, inputs.as_ptr());

        // Adjacent but disjoint ranges need no copy.
        let table = unsafe { scratch.resolve(inputs.as_ptr(), 1, outputs.as_ptr(), 1, 8) }.unwrap();
        assert_eq!(table, inputs.as_ptr());
    }

    #[test]
    fn test_scratch_too_small() {
        let mut shared = vec![0.0f32; 64];
        let inputs = [shared.as_ptr()];
        let outputs = [shared.as_mut_ptr()];
        let mut scratch = InputScratch::<f32>::new(1, 32);
        assert!(unsafe { scratch.resolve(inputs.as_ptr(), 1, outputs.as_ptr(), 1, 64) }.is_none());
        assert!(unsafe { scratch.resolve(inputs.as_ptr(), 1, outputs.as_ptr(), 1, 32) }.is_some());
    }
}
