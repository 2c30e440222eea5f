// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::convert::TryFrom;

use crate::error::Error;

pub const MAX_NB_SUBFR: usize = 4;
pub const SUB_FRAME_LENGTH_MS: usize = 5;
pub const MAX_FS_KHZ: usize = 16;
pub const MAX_SUB_FRAME_LENGTH: usize = SUB_FRAME_LENGTH_MS * MAX_FS_KHZ;
pub const MAX_FRAME_LENGTH: usize = MAX_SUB_FRAME_LENGTH * MAX_NB_SUBFR;
pub const LTP_MEM_LENGTH_MS: usize = 20;
pub const MAX_LPC_ORDER: usize = 16;
pub const LTP_ORDER: usize = 5;

/// Maximum number of SILK frames in one packet.
pub const MAX_FRAMES_PER_PACKET: usize = 3;

/// Signal classification of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalType {
    #[default]
    Inactive,
    Unvoiced,
    Voiced,
}

impl SignalType {
    pub fn index(self) -> usize {
        return match self {
            SignalType::Inactive => 0,
            SignalType::Unvoiced => 1,
            SignalType::Voiced => 2,
        };
    }
}

impl TryFrom<u8> for SignalType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        return match value {
            0 => Ok(SignalType::Inactive),
            1 => Ok(SignalType::Unvoiced),
            2 => Ok(SignalType::Voiced),
            _ => Err(Error::InvalidFrameType),
        };
    }
}

/// Selects which of the two quantization offsets of the signal type applies to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantOffsetType {
    #[default]
    Low,
    High,
}

impl QuantOffsetType {
    pub fn index(self) -> usize {
        return match self {
            QuantOffsetType::Low => 0,
            QuantOffsetType::High => 1,
        };
    }
}

impl TryFrom<u8> for QuantOffsetType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        return match value {
            0 => Ok(QuantOffsetType::Low),
            1 => Ok(QuantOffsetType::High),
            _ => Err(Error::InvalidQuantizationOffsetType),
        };
    }
}

/// Audio bandwidth of the internal signal. Each bandwidth has a fixed internal sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Bandwidth {
    /// 8 kHz internal sample rate.
    NarrowBand,
    /// 12 kHz internal sample rate.
    MediumBand,
    /// 16 kHz internal sample rate.
    WideBand,
}

impl Bandwidth {
    pub fn from_fs_khz(fs_khz: usize) -> Option<Bandwidth> {
        return match fs_khz {
            8 => Some(Bandwidth::NarrowBand),
            12 => Some(Bandwidth::MediumBand),
            16 => Some(Bandwidth::WideBand),
            _ => None,
        };
    }

    pub fn fs_khz(self) -> usize {
        return match self {
            Bandwidth::NarrowBand => 8,
            Bandwidth::MediumBand => 12,
            Bandwidth::WideBand => 16,
        };
    }

    /// Order of the short-term prediction filter.
    pub fn lpc_order(self) -> usize {
        return match self {
            Bandwidth::WideBand => 16,
            _ => 10,
        };
    }

    pub fn is_wideband(self) -> bool {
        return self == Bandwidth::WideBand;
    }
}

/// Duration of the audio carried by one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDuration {
    Ms10,
    Ms20,
    Ms40,
    Ms60,
}

impl FrameDuration {
    pub fn ms(self) -> usize {
        return match self {
            FrameDuration::Ms10 => 10,
            FrameDuration::Ms20 => 20,
            FrameDuration::Ms40 => 40,
            FrameDuration::Ms60 => 60,
        };
    }

    /// Number of SILK frames in a packet. 10 ms packets hold a single short frame.
    pub fn frames_per_packet(self) -> usize {
        return match self {
            FrameDuration::Ms10 | FrameDuration::Ms20 => 1,
            FrameDuration::Ms40 => 2,
            FrameDuration::Ms60 => 3,
        };
    }

    /// Number of 5 ms subframes per SILK frame.
    pub fn nb_subfr(self) -> usize {
        return match self {
            FrameDuration::Ms10 => 2,
            _ => 4,
        };
    }
}

impl TryFrom<u32> for FrameDuration {
    type Error = Error;

    fn try_from(ms: u32) -> Result<Self, Self::Error> {
        return match ms {
            10 => Ok(FrameDuration::Ms10),
            20 => Ok(FrameDuration::Ms20),
            40 => Ok(FrameDuration::Ms40),
            60 => Ok(FrameDuration::Ms60),
            _ => Err(Error::InvalidPayloadSize(ms)),
        };
    }
}

/// Lengths derived from the internal sample rate and the number of subframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub bandwidth: Bandwidth,
    pub fs_khz: usize,
    pub nb_subfr: usize,
    pub subfr_length: usize,
    pub frame_length: usize,
    pub ltp_mem_length: usize,
    pub lpc_order: usize,
}

impl FrameGeometry {
    pub fn new(bandwidth: Bandwidth, nb_subfr: usize) -> Self {
        debug_assert!(nb_subfr == 2 || nb_subfr == MAX_NB_SUBFR);

        let fs_khz = bandwidth.fs_khz();
        let subfr_length = SUB_FRAME_LENGTH_MS * fs_khz;

        let geometry = FrameGeometry {
            bandwidth,
            fs_khz,
            nb_subfr,
            subfr_length,
            frame_length: subfr_length * nb_subfr,
            ltp_mem_length: LTP_MEM_LENGTH_MS * fs_khz,
            lpc_order: bandwidth.lpc_order(),
        };

        debug_assert!(geometry.ltp_mem_length >= geometry.frame_length);

        return geometry;
    }

    /// Smallest coded pitch lag.
    pub fn min_lag(&self) -> usize {
        return 2 * self.fs_khz;
    }

    /// Largest coded pitch lag.
    pub fn max_lag(&self) -> usize {
        return 18 * self.fs_khz;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_geometry() {
        let g = FrameGeometry::new(Bandwidth::WideBand, 4);
        assert_eq!(g.frame_length, 320);
        assert_eq!(g.subfr_length, 80);
        assert_eq!(g.ltp_mem_length, 320);
        assert_eq!(g.lpc_order, 16);

        let g = FrameGeometry::new(Bandwidth::MediumBand, 2);
        assert_eq!(g.frame_length, 120);
        assert_eq!(g.lpc_order, 10);
        assert_eq!(g.min_lag(), 24);
        assert_eq!(g.max_lag(), 216);
    }

    #[test]
    fn verify_conversions() {
        assert_eq!(SignalType::try_from(2u8), Ok(SignalType::Voiced));
        assert_eq!(SignalType::try_from(3u8), Err(Error::InvalidFrameType));
        assert_eq!(QuantOffsetType::try_from(1u8), Ok(QuantOffsetType::High));
        assert_eq!(FrameDuration::try_from(40u32), Ok(FrameDuration::Ms40));
        assert_eq!(FrameDuration::try_from(30u32), Err(Error::InvalidPayloadSize(30)));
        assert_eq!(FrameDuration::Ms60.frames_per_packet(), 3);
        assert_eq!(Bandwidth::from_fs_khz(12), Some(Bandwidth::MediumBand));
        assert_eq!(Bandwidth::from_fs_khz(24), None);
    }
}
