//! Transport state and its `TimeInfo` encoding.

use serde::{Deserialize, Serialize};

use crate::abi::{time_info_flags, TimeInfo};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransportInfo {
    pub playing: bool,
    pub recording: bool,
    pub cycle_active: bool,
    pub tempo: f64,
    pub time_sig_numerator: i32,
    pub time_sig_denominator: i32,
    pub position_samples: i64,
    pub position_quarters: f64,
    pub bar_position_quarters: f64,
    pub cycle_start_quarters: f64,
    pub cycle_end_quarters: f64,
}

impl Default for TransportInfo {
    fn default() -> Self {
        Self {
            playing: false,
            recording: false,
            cycle_active: false,
            tempo: 120.0,
            time_sig_numerator: 4,
            time_sig_denominator: 4,
            position_samples: 0,
            position_quarters: 0.0,
            bar_position_quarters: 0.0,
            cycle_start_quarters: 0.0,
            cycle_end_quarters: 0.0,
        }
    }
}

impl TransportInfo {
    /// Advance the sample and musical position by one block.
    pub fn advance(&mut self, frames: usize, sample_rate: f64) {
        self.position_samples += frames as i64;
        if sample_rate > 0.0 {
            self.position_quarters += frames as f64 / sample_rate * self.tempo / 60.0;
        }
    }
}

/// Encode transport state the way plugins expect it from `GetTime`.
pub fn build_time_info(transport: &TransportInfo, sample_rate: f64) -> TimeInfo {
    use time_info_flags::*;

    let mut flags = TRANSPORT_CHANGED | TEMPO_VALID | TIME_SIG_VALID | PPQ_POS_VALID | BARS_VALID;

    if transport.playing {
        flags |= TRANSPORT_PLAYING;
    }
    if transport.recording {
        flags |= TRANSPORT_RECORDING;
    }
    if transport.cycle_active {
        flags |= TRANSPORT_CYCLE_ACTIVE | CYCLE_POS_VALID;
    }

    TimeInfo {
        sample_rate,
        sample_pos: transport.position_samples as f64,
        ppq_pos: transport.position_quarters,
        tempo: transport.tempo,
        bar_start_pos: transport.bar_position_quarters,
        cycle_start_pos: transport.cycle_start_quarters,
        cycle_end_pos: transport.cycle_end_quarters,
        time_sig_numerator: transport.time_sig_numerator,
        time_sig_denominator: transport.time_sig_denominator,
        flags,
        ..Default::default()
    }
}

/// Decode the parts of a `TimeInfo` covered by its validity flags.
pub fn transport_from_time_info(info: &TimeInfo) -> TransportInfo {
    use time_info_flags::*;

    let defaults = TransportInfo::default();
    let valid = |flag: i32| info.flags & flag != 0;

    TransportInfo {
        playing: valid(TRANSPORT_PLAYING),
        recording: valid(TRANSPORT_RECORDING),
        cycle_active: valid(TRANSPORT_CYCLE_ACTIVE),
        tempo: if valid(TEMPO_VALID) { info.tempo } else { defaults.tempo },
        time_sig_numerator: if valid(TIME_SIG_VALID) {
            info.time_sig_numerator
        } else {
            defaults.time_sig_numerator
        },
        time_sig_denominator: if valid(TIME_SIG_VALID) {
            info.time_sig_denominator
        } else {
            defaults.time_sig_denominator
        },
        position_samples: info.sample_pos as i64,
        position_quarters: if valid(PPQ_POS_VALID) { info.ppq_pos } else { 0.0 },
        bar_position_quarters: if valid(BARS_VALID) {
            info.bar_start_pos
        } else {
            0.0
        },
        cycle_start_quarters: if valid(CYCLE_POS_VALID) {
            info.cycle_start_pos
        } else {
            0.0
        },
        cycle_end_quarters: if valid(CYCLE_POS_VALID) {
            info.cycle_end_pos
        } else {
            0.0
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transport_default() {
        let transport = TransportInfo::default();
        assert_eq!(transport.tempo, 120.0);
        assert_eq!(transport.time_sig_numerator, 4);
        assert!(!transport.playing);
    }

    #[test]
    fn test_time_info_flags() {
        let transport = TransportInfo {
            playing: true,
            cycle_active: true,
            ..Default::default()
        };
        let info = build_time_info(&transport, 48000.0);
        assert_ne!(info.flags & time_info_flags::TRANSPORT_PLAYING, 0);
        assert_ne!(info.flags & time_info_flags::CYCLE_POS_VALID, 0);
        assert_eq!(info.flags & time_info_flags::TRANSPORT_RECORDING, 0);
        assert_eq!(info.sample_rate, 48000.0);
    }

    #[test]
    fn test_advance() {
        let mut transport = TransportInfo::default();
        transport.advance(48000, 48000.0);
        assert_eq!(transport.position_samples, 48000);
        // One second at 120 bpm is two quarters.
        assert_relative_eq!(transport.position_quarters, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_decode_respects_validity() {
        let info = TimeInfo {
            tempo: 90.0,
            sample_pos: 256.0,
            flags: time_info_flags::TRANSPORT_PLAYING,
            ..Default::default()
        };
        let transport = transport_from_time_info(&info);
        assert!(transport.playing);
        assert_eq!(transport.tempo, 120.0);
        assert_eq!(transport.position_samples, 256);

        let round = transport_from_time_info(&build_time_info(&transport, 44100.0));
        assert_eq!(round.tempo, 120.0);
        assert!(round.playing);
    }
}
