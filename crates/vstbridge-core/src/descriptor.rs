//! Descriptor validation and snapshots.

use serde::{Deserialize, Serialize};
use std::ffi::c_void;
use std::ptr;

use crate::abi::{
    DispatcherProc, EffectFlags, GetParameterProc, PluginDescriptor, ProcessDoubleProc,
    ProcessProc, SetParameterProc, MAGIC,
};
use crate::buffer::SampleFormat;
use crate::error::{BridgeError, Result};

/// Entry points a managed implementation installs into its descriptor.
#[derive(Clone, Copy)]
pub struct DescriptorEntryPoints {
    pub dispatcher: DispatcherProc,
    pub set_parameter: SetParameterProc,
    pub get_parameter: GetParameterProc,
    pub process_replacing: ProcessProc,
    pub process_double_replacing: Option<ProcessDoubleProc>,
}

impl PluginDescriptor {
    /// Descriptor for the managed side with every count zero, every reserved
    /// byte zero and the deprecated `process` slot aliased to the replacing
    /// entry.
    pub fn new_managed(entry: DescriptorEntryPoints) -> Self {
        Self {
            magic: MAGIC,
            dispatcher: Some(entry.dispatcher),
            process: Some(entry.process_replacing),
            set_parameter: Some(entry.set_parameter),
            get_parameter: Some(entry.get_parameter),
            num_programs: 0,
            num_params: 0,
            num_inputs: 0,
            num_outputs: 0,
            flags: EffectFlags::CAN_REPLACING.bits(),
            reserved1: 0,
            reserved2: 0,
            initial_delay: 0,
            real_qualities: 0,
            off_qualities: 0,
            io_ratio: 1.0,
            object: ptr::null_mut::<c_void>(),
            user: ptr::null_mut::<c_void>(),
            unique_id: 0,
            version: 0,
            process_replacing: Some(entry.process_replacing),
            process_double_replacing: entry.process_double_replacing,
            future: [0; 56],
        }
    }

    /// Validate a descriptor handed over by a foreign party.
    ///
    /// `magic` is read before any other field; a mismatch rejects the
    /// descriptor without touching the rest of it.
    ///
    /// # Safety
    /// `ptr` must be null or point to memory readable for at least
    /// `size_of::<PluginDescriptor>()` bytes for the returned lifetime.
    pub unsafe fn validate<'a>(ptr: *const PluginDescriptor) -> Result<&'a PluginDescriptor> {
        if ptr.is_null() {
            return Err(BridgeError::ConstructionFailed(
                "entry point returned null".into(),
            ));
        }

        let magic = ptr::read_unaligned(ptr::addr_of!((*ptr).magic));
        if magic != MAGIC {
            return Err(BridgeError::InvalidMagic(magic));
        }

        let descriptor = &*ptr;
        if descriptor.dispatcher.is_none() {
            return Err(BridgeError::InvalidDescriptor("missing dispatcher".into()));
        }

        for (name, count) in [
            ("numPrograms", descriptor.num_programs),
            ("numParams", descriptor.num_params),
            ("numInputs", descriptor.num_inputs),
            ("numOutputs", descriptor.num_outputs),
        ] {
            if count < 0 {
                return Err(BridgeError::InvalidDescriptor(format!(
                    "{name} is negative ({count})"
                )));
            }
        }

        Ok(descriptor)
    }

    pub fn effect_flags(&self) -> EffectFlags {
        EffectFlags(self.flags)
    }

    /// Whether the double-precision path may be invoked.
    pub fn supports(&self, format: SampleFormat) -> bool {
        match format {
            SampleFormat::Float32 => self.process_replacing.is_some(),
            SampleFormat::Float64 => {
                self.effect_flags()
                    .contains(EffectFlags::CAN_DOUBLE_REPLACING)
                    && self.process_double_replacing.is_some()
            }
        }
    }
}

/// Owned copy of a validated descriptor's identity and capabilities.
///
/// Counts and flags are fixed after construction, so hosts keep this instead
/// of re-reading foreign memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorInfo {
    pub unique_id: i32,
    pub version: i32,
    pub num_programs: i32,
    pub num_params: i32,
    pub num_inputs: i32,
    pub num_outputs: i32,
    pub flags: i32,
    pub initial_delay: i32,
    pub supports_f64: bool,
}

impl DescriptorInfo {
    pub fn from_descriptor(descriptor: &PluginDescriptor) -> Self {
        Self {
            unique_id: descriptor.unique_id,
            version: descriptor.version,
            num_programs: descriptor.num_programs,
            num_params: descriptor.num_params,
            num_inputs: descriptor.num_inputs,
            num_outputs: descriptor.num_outputs,
            flags: descriptor.flags,
            initial_delay: descriptor.initial_delay,
            supports_f64: descriptor.supports(SampleFormat::Float64),
        }
    }

    pub fn effect_flags(&self) -> EffectFlags {
        EffectFlags(self.flags)
    }

    pub fn is_synth(&self) -> bool {
        self.effect_flags().contains(EffectFlags::IS_SYNTH)
    }

    pub fn inputs(&self) -> usize {
        self.num_inputs.max(0) as usize
    }

    pub fn outputs(&self) -> usize {
        self.num_outputs.max(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::PluginDescriptor;

    unsafe extern "C" fn dispatcher(
        _effect: *mut PluginDescriptor,
        _opcode: i32,
        _index: i32,
        _value: isize,
        _ptr: *mut c_void,
        _opt: f32,
    ) -> isize {
        0
    }

    unsafe extern "C" fn set_parameter(_effect: *mut PluginDescriptor, _index: i32, _value: f32) {}

    unsafe extern "C" fn get_parameter(_effect: *mut PluginDescriptor, _index: i32) -> f32 {
        0.0
    }

    unsafe extern "C" fn process(
        _effect: *mut PluginDescriptor,
        _inputs: *const *const f32,
        _outputs: *mut *mut f32,
        _frames: i32,
    ) {
    }

    fn entry_points() -> DescriptorEntryPoints {
        DescriptorEntryPoints {
            dispatcher,
            set_parameter,
            get_parameter,
            process_replacing: process,
            process_double_replacing: None,
        }
    }

    #[test]
    fn test_new_managed_zeroes_reserved() {
        let descriptor = PluginDescriptor::new_managed(entry_points());
        assert_eq!(descriptor.magic, MAGIC);
        assert_eq!(descriptor.reserved1, 0);
        assert_eq!(descriptor.reserved2, 0);
        assert!(descriptor.future.iter().all(|b| *b == 0));
        assert!(descriptor.process.is_some());
    }

    #[test]
    fn test_validate_accepts_managed() {
        let mut descriptor = PluginDescriptor::new_managed(entry_points());
        descriptor.num_inputs = 2;
        descriptor.num_outputs = 2;

        let validated = unsafe { PluginDescriptor::validate(&descriptor) }.unwrap();
        let info = DescriptorInfo::from_descriptor(validated);
        assert_eq!(info.inputs(), 2);
        assert!(!info.supports_f64);
    }

    #[test]
    fn test_validate_rejects_null() {
        let result = unsafe { PluginDescriptor::validate(ptr::null()) };
        assert!(matches!(result, Err(BridgeError::ConstructionFailed(_))));
    }

    #[test]
    fn test_validate_rejects_bad_magic_first() {
        let mut descriptor = PluginDescriptor::new_managed(entry_points());
        descriptor.magic = 0x1234_5678;
        descriptor.dispatcher = None;
        descriptor.num_params = -1;

        let result = unsafe { PluginDescriptor::validate(&descriptor) };
        assert!(matches!(result, Err(BridgeError::InvalidMagic(0x1234_5678))));
    }

    #[test]
    fn test_validate_rejects_negative_counts() {
        let mut descriptor = PluginDescriptor::new_managed(entry_points());
        descriptor.num_outputs = -2;

        let result = unsafe { PluginDescriptor::validate(&descriptor) };
        match result {
            Err(BridgeError::InvalidDescriptor(reason)) => assert!(reason.contains("numOutputs")),
            other => panic!("expected invalid descriptor, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_double_precision_gating() {
        let mut descriptor = PluginDescriptor::new_managed(entry_points());
        assert!(descriptor.supports(SampleFormat::Float32));
        assert!(!descriptor.supports(SampleFormat::Float64));

        // Flag without the entry is still unsupported.
        descriptor.flags |= EffectFlags::CAN_DOUBLE_REPLACING.bits();
        assert!(!descriptor.supports(SampleFormat::Float64));
    }
}
