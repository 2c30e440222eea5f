// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::{Error, Result};
use crate::frame::FrameDuration;

/// Sample rates accepted at the API boundary.
pub const API_SAMPLE_RATES: [u32; 7] = [8000, 12000, 16000, 24000, 32000, 44100, 48000];

/// Internal sample rates the codec core runs at.
pub const INTERNAL_SAMPLE_RATES: [u32; 3] = [8000, 12000, 16000];

pub const MIN_BITRATE_BPS: u32 = 5000;
pub const MAX_BITRATE_BPS: u32 = 80000;

/// Maximum number of states of the delayed-decision quantizer.
pub const MAX_DEL_DEC_STATES: usize = 4;

/// Frequency warping of the noise shaping filter per kHz of internal sample rate, in Q16.
const WARPING_MULTIPLIER_Q16: i32 = 983;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Sample rate of the PCM handed to the encoder.
    pub api_sample_rate: u32,
    pub channels: usize,
    pub max_internal_rate: u32,
    pub min_internal_rate: u32,
    pub desired_internal_rate: u32,
    /// Packet duration in milliseconds: 10, 20, 40 or 60.
    pub payload_ms: u32,
    /// Target bitrate in bits per second, all channels included.
    pub bitrate: u32,
    /// Expected packet loss in percent.
    pub packet_loss_pct: u32,
    /// Complexity from 0 (fastest) to 10 (best quality).
    pub complexity: u32,
    pub use_cbr: bool,
    pub use_dtx: bool,
    pub use_in_band_fec: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        return EncoderConfig {
            api_sample_rate: 16000,
            channels: 1,
            max_internal_rate: 16000,
            min_internal_rate: 8000,
            desired_internal_rate: 16000,
            payload_ms: 20,
            bitrate: 25000,
            packet_loss_pct: 0,
            complexity: 10,
            use_cbr: false,
            use_dtx: false,
            use_in_band_fec: false,
        };
    }
}

impl EncoderConfig {
    pub fn validate(&self) -> Result<()> {
        if !API_SAMPLE_RATES.contains(&self.api_sample_rate) {
            return Err(Error::InvalidSampleRate(self.api_sample_rate));
        }

        let rates = [self.min_internal_rate, self.desired_internal_rate, self.max_internal_rate];

        if rates.iter().any(|r| !INTERNAL_SAMPLE_RATES.contains(r))
            || self.min_internal_rate > self.desired_internal_rate
            || self.desired_internal_rate > self.max_internal_rate
        {
            return Err(Error::InvalidInternalRate {
                min: self.min_internal_rate,
                max: self.max_internal_rate,
                desired: self.desired_internal_rate,
            });
        }

        if self.channels == 0 || self.channels > 2 {
            return Err(Error::InvalidChannelCount(self.channels));
        }

        FrameDuration::try_from(self.payload_ms)?;

        let channels = self.channels as u32;

        if self.bitrate < MIN_BITRATE_BPS * channels || self.bitrate > MAX_BITRATE_BPS * channels {
            return Err(Error::InvalidBitrate(self.bitrate));
        }

        if self.packet_loss_pct > 100 {
            return Err(Error::InvalidPacketLoss(self.packet_loss_pct));
        }

        if self.complexity > 10 {
            return Err(Error::InvalidComplexity(self.complexity));
        }

        return Ok(());
    }

    pub fn frame_duration(&self) -> Result<FrameDuration> {
        return FrameDuration::try_from(self.payload_ms);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Sample rate of the PCM produced by the decoder.
    pub api_sample_rate: u32,
    pub channels: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        return DecoderConfig { api_sample_rate: 16000, channels: 1 };
    }
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<()> {
        if !API_SAMPLE_RATES.contains(&self.api_sample_rate) {
            return Err(Error::InvalidSampleRate(self.api_sample_rate));
        }

        if self.channels == 0 || self.channels > 2 {
            return Err(Error::InvalidChannelCount(self.channels));
        }

        return Ok(());
    }
}

/// Encoder tunables derived from the complexity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplexitySettings {
    /// Pitch search effort, 0 to 2.
    pub pitch_complexity: u8,
    /// Normalized correlation a pitch candidate must exceed to classify a frame as voiced, in Q16.
    pub pitch_threshold_q16: i32,
    /// Order of the whitening filter applied before the pitch search.
    pub pitch_lpc_order: usize,
    /// Order of the noise shaping filter. Always even.
    pub shaping_lpc_order: usize,
    pub n_states_delayed_decision: usize,
    pub use_interpolated_nlsfs: bool,
    /// Number of stage-1 NLSF candidates refined by the second stage.
    pub nlsf_survivors: usize,
    pub use_warping: bool,
}

impl ComplexitySettings {
    pub fn from_complexity(complexity: u32) -> Self {
        let (pitch_complexity, thres, pitch_lpc_order, shaping_lpc_order) = match complexity {
            0 => (0, 0.80, 6, 12),
            1 => (1, 0.76, 8, 14),
            2 => (0, 0.80, 6, 12),
            3 => (1, 0.76, 8, 14),
            4 | 5 => (1, 0.74, 10, 16),
            6 | 7 => (1, 0.72, 12, 16),
            _ => (2, 0.70, 16, 16),
        };

        let (n_states_delayed_decision, use_interpolated_nlsfs, nlsf_survivors, use_warping) =
            match complexity {
                0 => (1, false, 2, false),
                1 => (1, false, 3, false),
                2 => (2, false, 2, false),
                3 => (2, false, 4, false),
                4 | 5 => (2, true, 6, true),
                6 | 7 => (3, true, 8, true),
                _ => (MAX_DEL_DEC_STATES, true, 16, true),
            };

        return ComplexitySettings {
            pitch_complexity,
            pitch_threshold_q16: (thres * 65536.0) as i32,
            pitch_lpc_order,
            shaping_lpc_order,
            n_states_delayed_decision,
            use_interpolated_nlsfs,
            nlsf_survivors,
            use_warping,
        };
    }

    /// Warping coefficient of the noise shaping filter at an internal sample rate.
    pub fn warping_q16(&self, fs_khz: usize) -> i32 {
        if self.use_warping {
            return fs_khz as i32 * WARPING_MULTIPLIER_Q16;
        }

        return 0;
    }

    /// True if the delayed-decision quantizer should be used.
    pub fn use_delayed_decision(&self, fs_khz: usize) -> bool {
        return self.n_states_delayed_decision > 1 || self.warping_q16(fs_khz) > 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_encoder_config_validation() {
        assert_eq!(EncoderConfig::default().validate(), Ok(()));

        let config = EncoderConfig { api_sample_rate: 22050, ..Default::default() };
        assert_eq!(config.validate(), Err(Error::InvalidSampleRate(22050)));

        let config = EncoderConfig { min_internal_rate: 16000, desired_internal_rate: 12000, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::InvalidInternalRate { .. })));

        let config = EncoderConfig { max_internal_rate: 24000, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::InvalidInternalRate { .. })));

        let config = EncoderConfig { payload_ms: 30, ..Default::default() };
        assert_eq!(config.validate(), Err(Error::InvalidPayloadSize(30)));

        let config = EncoderConfig { complexity: 11, ..Default::default() };
        assert_eq!(config.validate(), Err(Error::InvalidComplexity(11)));

        let config = EncoderConfig { bitrate: 1000, ..Default::default() };
        assert_eq!(config.validate(), Err(Error::InvalidBitrate(1000)));

        let config = EncoderConfig { channels: 2, bitrate: 150_000, ..Default::default() };
        assert_eq!(config.validate(), Ok(()));

        let config = EncoderConfig { packet_loss_pct: 101, ..Default::default() };
        assert_eq!(config.validate(), Err(Error::InvalidPacketLoss(101)));

        let config = EncoderConfig { channels: 3, ..Default::default() };
        assert_eq!(config.validate(), Err(Error::InvalidChannelCount(3)));
    }

    #[test]
    fn verify_decoder_config_validation() {
        assert_eq!(DecoderConfig::default().validate(), Ok(()));
        assert_eq!(
            DecoderConfig { api_sample_rate: 48000, channels: 2 }.validate(),
            Ok(())
        );
        assert_eq!(
            DecoderConfig { api_sample_rate: 11025, channels: 1 }.validate(),
            Err(Error::InvalidSampleRate(11025))
        );
        assert_eq!(
            DecoderConfig { api_sample_rate: 8000, channels: 0 }.validate(),
            Err(Error::InvalidChannelCount(0))
        );
    }

    #[test]
    fn verify_complexity_mapping() {
        let low = ComplexitySettings::from_complexity(0);
        assert_eq!(low.n_states_delayed_decision, 1);
        assert!(!low.use_delayed_decision(16));

        let mid = ComplexitySettings::from_complexity(2);
        assert!(mid.use_delayed_decision(8));
        assert_eq!(mid.warping_q16(8), 0);

        let high = ComplexitySettings::from_complexity(10);
        assert_eq!(high.n_states_delayed_decision, MAX_DEL_DEC_STATES);
        assert!(high.use_interpolated_nlsfs);
        assert_eq!(high.warping_q16(16), 16 * 983);

        for c in 0..=10 {
            assert_eq!(ComplexitySettings::from_complexity(c).shaping_lpc_order % 2, 0);
        }
    }
}
