//! Parameter and program access.
//!
//! Parameters are reached through `&self` from any thread: hosts call
//! `getParameter`/`setParameter` from the UI thread while audio runs, and
//! plugins may be re-entered from their own host callbacks. Implementations
//! therefore keep their values in atomics or behind short locks.

use atomic_float::AtomicF32;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};

use vstbridge_core::{ChunkKind, ParameterProperties};

pub trait PluginParameters: Send + Sync {
    fn get_parameter(&self, _index: i32) -> f32 {
        0.0
    }

    fn set_parameter(&self, _index: i32, _value: f32) {}

    fn parameter_name(&self, _index: i32) -> String {
        String::new()
    }

    /// Unit shown after the value, e.g. "dB".
    fn parameter_label(&self, _index: i32) -> String {
        String::new()
    }

    /// Value formatted for display.
    fn parameter_text(&self, _index: i32) -> String {
        String::new()
    }

    fn can_be_automated(&self, _index: i32) -> bool {
        true
    }

    /// Display hints for hosts that build their own controls.
    fn parameter_properties(&self, _index: i32) -> Option<ParameterProperties> {
        None
    }

    /// Parse `text` into the parameter. Returns whether it was accepted.
    fn string_to_parameter(&self, _index: i32, _text: &str) -> bool {
        false
    }

    fn program(&self) -> i32 {
        0
    }

    fn set_program(&self, _program: i32) {}

    fn program_name(&self, _program: i32) -> String {
        String::new()
    }

    fn set_program_name(&self, _name: String) {}

    fn chunk(&self, _kind: ChunkKind) -> Vec<u8> {
        Vec::new()
    }

    /// Returns whether the chunk was accepted.
    fn load_chunk(&self, _kind: ChunkKind, _data: &[u8]) -> bool {
        false
    }
}

/// For plugins without parameters.
pub struct NoParameters;

impl PluginParameters for NoParameters {}

#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub label: String,
    pub default: f32,
    pub properties: Option<ParameterProperties>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, default: f32) -> Self {
        Self {
            name: name.into(),
            label: String::new(),
            default: default.clamp(0.0, 1.0),
            properties: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn properties(mut self, properties: ParameterProperties) -> Self {
        self.properties = Some(properties);
        self
    }
}

/// Lock-free bank of normalized parameters with named programs.
///
/// The chunk format is the parameter values as little-endian `f32`s.
pub struct AtomicParameters {
    specs: Vec<ParameterSpec>,
    values: Vec<AtomicF32>,
    program: AtomicI32,
    program_names: Mutex<Vec<String>>,
}

impl AtomicParameters {
    pub fn new(specs: Vec<ParameterSpec>) -> Self {
        let values = specs.iter().map(|s| AtomicF32::new(s.default)).collect();
        Self {
            specs,
            values,
            program: AtomicI32::new(0),
            program_names: Mutex::new(vec!["Default".to_string()]),
        }
    }

    pub fn with_programs(self, names: Vec<String>) -> Self {
        *self.program_names.lock() = names;
        self
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn num_programs(&self) -> usize {
        self.program_names.lock().len()
    }

    /// Real-time read for use inside `process`.
    #[inline]
    pub fn value(&self, index: usize) -> f32 {
        self.values
            .get(index)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0.0)
    }

    fn slot(&self, index: i32) -> Option<(&ParameterSpec, &AtomicF32)> {
        let index = usize::try_from(index).ok()?;
        Some((self.specs.get(index)?, self.values.get(index)?))
    }
}

impl PluginParameters for AtomicParameters {
    fn get_parameter(&self, index: i32) -> f32 {
        self.slot(index)
            .map(|(_, v)| v.load(Ordering::Acquire))
            .unwrap_or(0.0)
    }

    fn set_parameter(&self, index: i32, value: f32) {
        if let Some((_, v)) = self.slot(index) {
            v.store(value.clamp(0.0, 1.0), Ordering::Release);
        }
    }

    fn parameter_name(&self, index: i32) -> String {
        self.slot(index)
            .map(|(spec, _)| spec.name.clone())
            .unwrap_or_default()
    }

    fn parameter_label(&self, index: i32) -> String {
        self.slot(index)
            .map(|(spec, _)| spec.label.clone())
            .unwrap_or_default()
    }

    fn parameter_text(&self, index: i32) -> String {
        self.slot(index)
            .map(|(_, v)| format!("{:.3}", v.load(Ordering::Acquire)))
            .unwrap_or_default()
    }

    fn parameter_properties(&self, index: i32) -> Option<ParameterProperties> {
        self.slot(index).and_then(|(spec, _)| spec.properties)
    }

    fn string_to_parameter(&self, index: i32, text: &str) -> bool {
        match (self.slot(index), text.trim().parse::<f32>()) {
            (Some((_, v)), Ok(value)) => {
                v.store(value.clamp(0.0, 1.0), Ordering::Release);
                true
            }
            _ => false,
        }
    }

    fn program(&self) -> i32 {
        self.program.load(Ordering::Acquire)
    }

    fn set_program(&self, program: i32) {
        let count = self.num_programs() as i32;
        if (0..count).contains(&program) {
            self.program.store(program, Ordering::Release);
        }
    }

    fn program_name(&self, program: i32) -> String {
        usize::try_from(program)
            .ok()
            .and_then(|i| self.program_names.lock().get(i).cloned())
            .unwrap_or_default()
    }

    fn set_program_name(&self, name: String) {
        let current = self.program() as usize;
        if let Some(slot) = self.program_names.lock().get_mut(current) {
            *slot = name;
        }
    }

    fn chunk(&self, _kind: ChunkKind) -> Vec<u8> {
        self.values
            .iter()
            .flat_map(|v| v.load(Ordering::Acquire).to_le_bytes())
            .collect()
    }

    fn load_chunk(&self, _kind: ChunkKind, data: &[u8]) -> bool {
        if data.len() != self.values.len() * 4 {
            return false;
        }
        for (value, bytes) in self.values.iter().zip(data.chunks_exact(4)) {
            let decoded = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            value.store(decoded.clamp(0.0, 1.0), Ordering::Release);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bank() -> AtomicParameters {
        AtomicParameters::new(vec![
            ParameterSpec::new("Gain", 0.5).label("dB"),
            ParameterSpec::new("Mix", 1.0),
        ])
    }

    #[test]
    fn test_set_get_round_trip() {
        let params = bank();
        params.set_parameter(0, 0.8);
        assert_relative_eq!(params.get_parameter(0), 0.8);
        assert_relative_eq!(params.value(1), 1.0);
    }

    #[test]
    fn test_out_of_range_index_is_ignored() {
        let params = bank();
        params.set_parameter(5, 0.1);
        params.set_parameter(-1, 0.1);
        assert_eq!(params.get_parameter(5), 0.0);
        assert_eq!(params.parameter_name(-1), "");
    }

    #[test]
    fn test_values_are_clamped() {
        let params = bank();
        params.set_parameter(0, 4.0);
        assert_eq!(params.get_parameter(0), 1.0);
    }

    #[test]
    fn test_names_and_text() {
        let params = bank();
        assert_eq!(params.parameter_name(0), "Gain");
        assert_eq!(params.parameter_label(0), "dB");
        assert_eq!(params.parameter_text(0), "0.500");
        assert!(params.string_to_parameter(1, " 0.25 "));
        assert!(!params.string_to_parameter(1, "loud"));
        assert_relative_eq!(params.get_parameter(1), 0.25);
    }

    #[test]
    fn test_parameter_properties() {
        let params = AtomicParameters::new(vec![
            ParameterSpec::new("Mode", 0.0)
                .properties(ParameterProperties::new().with_label("Mode").integer_range(0, 3)),
            ParameterSpec::new("Mix", 1.0),
        ]);
        let props = params.parameter_properties(0).unwrap();
        assert_eq!(props.label(), "Mode");
        assert_eq!(props.max_integer, 3);
        assert!(params.parameter_properties(1).is_none());
        assert!(params.parameter_properties(9).is_none());
    }

    #[test]
    fn test_programs() {
        let params = bank().with_programs(vec!["Init".into(), "Bright".into()]);
        assert_eq!(params.num_programs(), 2);
        params.set_program(1);
        assert_eq!(params.program(), 1);
        params.set_program(7);
        assert_eq!(params.program(), 1);
        params.set_program_name("Brighter".into());
        assert_eq!(params.program_name(1), "Brighter");
    }

    #[test]
    fn test_chunk_round_trip() {
        let params = bank();
        params.set_parameter(0, 0.125);
        let chunk = params.chunk(ChunkKind::Bank);
        assert_eq!(chunk.len(), 8);

        let other = bank();
        assert!(other.load_chunk(ChunkKind::Bank, &chunk));
        assert_relative_eq!(other.get_parameter(0), 0.125);
        assert!(!other.load_chunk(ChunkKind::Bank, &chunk[..3]));
    }
}
