// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Packet layout.
//!
//! A packet carries 10 or 20 ms frames, one to three of them per channel. It starts with a header
//! of one voice activity flag per frame and one redundancy flag per channel. For packets with more
//! than one frame, channels with redundancy follow with a symbol telling which frames have a
//! redundant copy. The redundant (LBRR) frames of the previous packet come next, and the regular
//! frames last, interleaved by channel.
//!
//! The encoder only knows the header once all frames are coded, so it reserves the header bits at
//! the start of the payload and patches them at the end.

use symphonia_core::io::ReadBytes;

use crate::error::{Error, Result};
use crate::frame::{Bandwidth, FrameDuration, MAX_FRAMES_PER_PACKET};
use crate::indices::ConditionalCoding;
use crate::range;
use crate::table::{LBRR_FLAGS_2, LBRR_FLAGS_3};

/// Maximum number of coded channels.
pub const MAX_CHANNELS: usize = 2;

/// An encoded packet together with the parameters needed to decode it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// The payload. Empty when the encoder skipped the packet (DTX).
    pub data: Vec<u8>,
    /// Internal bandwidth the packet was coded at.
    pub bandwidth: Bandwidth,
    pub duration: FrameDuration,
}

impl Packet {
    /// True if the packet carries no payload.
    pub fn is_dtx(&self) -> bool {
        return self.data.is_empty();
    }
}

/// Voice activity and redundancy flags of a packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFlags {
    pub vad: [[bool; MAX_FRAMES_PER_PACKET]; MAX_CHANNELS],
    /// Which frames of the previous packet have a redundant copy in this packet.
    pub lbrr: [[bool; MAX_FRAMES_PER_PACKET]; MAX_CHANNELS],
}

/// Conditional coding of frame `i` of a redundant payload.
pub fn lbrr_conditional_coding(lbrr: &[bool], i: usize) -> ConditionalCoding {
    if i > 0 && lbrr[i - 1] {
        return ConditionalCoding::Conditional;
    }

    return ConditionalCoding::Independent;
}

/// Conditional coding of frame `i` of the regular payload.
pub fn conditional_coding(i: usize) -> ConditionalCoding {
    if i == 0 {
        return ConditionalCoding::Independent;
    }

    return ConditionalCoding::Conditional;
}

fn lbrr_flags_cdf(frames: usize) -> &'static [u32] {
    return if frames == 2 { LBRR_FLAGS_2 } else { LBRR_FLAGS_3 };
}

fn header_bits(channels: usize, frames: usize) -> u32 {
    return ((frames + 1) * channels) as u32;
}

impl PacketFlags {
    /// True if any frame of channel `ch` has a redundant copy.
    pub fn has_lbrr(&self, ch: usize, frames: usize) -> bool {
        return self.lbrr[ch][..frames].iter().any(|&f| f);
    }

    /// Reserves the header bits at the start of an empty payload.
    pub fn reserve(enc: &mut range::Encoder, channels: usize, frames: usize) -> Result<()> {
        let nbits = header_bits(channels, frames);
        let cdf = [256, 256 >> nbits, 256];

        return enc.encode_symbol_with_cdf(0, &cdf);
    }

    /// Writes the header into the reserved bits.
    pub fn patch(&self, enc: &mut range::Encoder, channels: usize, frames: usize) -> Result<()> {
        let mut val = 0u32;

        for ch in 0..channels {
            for &vad in &self.vad[ch][..frames] {
                val = (val << 1) | u32::from(vad);
            }

            val = (val << 1) | u32::from(self.has_lbrr(ch, frames));
        }

        return enc.patch_initial_bits(val, header_bits(channels, frames));
    }

    /// Codes which frames carry redundancy, for channels that carry any.
    pub fn encode_lbrr_symbols(&self, enc: &mut range::Encoder, channels: usize, frames: usize) -> Result<()> {
        if frames < 2 {
            return Ok(());
        }

        for ch in (0..channels).filter(|&ch| self.has_lbrr(ch, frames)) {
            let symbol = self.lbrr[ch][..frames]
                .iter()
                .enumerate()
                .fold(0, |acc, (i, &f)| acc | (usize::from(f) << i));

            enc.encode_symbol_with_cdf(symbol - 1, lbrr_flags_cdf(frames))?;
        }

        return Ok(());
    }

    /// Reads the header and the redundancy symbols.
    pub fn read<B: ReadBytes>(dec: &mut range::Decoder<'_, B>, channels: usize, frames: usize) -> Result<Self> {
        if channels == 0 || channels > MAX_CHANNELS || frames == 0 || frames > MAX_FRAMES_PER_PACKET {
            return Err(Error::DecodingError("silk: invalid packet layout"));
        }

        let mut flags = PacketFlags::default();
        let mut any_lbrr = [false; MAX_CHANNELS];

        for ch in 0..channels {
            for vad in flags.vad[ch][..frames].iter_mut() {
                *vad = dec.decode_symbol_log_p(1)?;
            }

            any_lbrr[ch] = dec.decode_symbol_log_p(1)?;
        }

        for ch in (0..channels).filter(|&ch| any_lbrr[ch]) {
            if frames == 1 {
                flags.lbrr[ch][0] = true;
                continue;
            }

            let symbol = dec.decode_symbol_with_cdf(lbrr_flags_cdf(frames))? + 1;

            for (i, lbrr) in flags.lbrr[ch][..frames].iter_mut().enumerate() {
                *lbrr = (symbol >> i) & 1 != 0;
            }
        }

        return Ok(flags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia_core::io::BufReader;

    #[test]
    fn verify_flags_round_trip() -> Result<()> {
        let mut flags = PacketFlags::default();
        flags.vad[0] = [true, false, true];
        flags.vad[1] = [false, false, true];
        flags.lbrr[1] = [false, true, true];

        let mut enc = range::Encoder::new();
        PacketFlags::reserve(&mut enc, 2, 3)?;
        flags.encode_lbrr_symbols(&mut enc, 2, 3)?;
        enc.encode_symbol_with_cdf(2, crate::table::UNIFORM4)?;
        flags.patch(&mut enc, 2, 3)?;

        let data = enc.finish();

        let mut reader = BufReader::new(&data);
        let mut dec = range::Decoder::new(&mut reader);

        assert_eq!(PacketFlags::read(&mut dec, 2, 3)?, flags);
        assert_eq!(dec.decode_symbol_with_cdf(crate::table::UNIFORM4)?, 2);

        return Ok(());
    }

    #[test]
    fn verify_single_frame_redundancy_has_no_symbol() -> Result<()> {
        let mut flags = PacketFlags::default();
        flags.vad[0][0] = true;
        flags.lbrr[0][0] = true;

        let mut enc = range::Encoder::new();
        PacketFlags::reserve(&mut enc, 1, 1)?;
        flags.encode_lbrr_symbols(&mut enc, 1, 1)?;
        flags.patch(&mut enc, 1, 1)?;

        let data = enc.finish();

        let mut reader = BufReader::new(&data);
        let mut dec = range::Decoder::new(&mut reader);

        let read = PacketFlags::read(&mut dec, 1, 1)?;
        assert!(read.vad[0][0]);
        assert!(read.has_lbrr(0, 1));

        assert!(PacketFlags::read(&mut dec, 3, 1).is_err());

        return Ok(());
    }

    #[test]
    fn verify_coding_dependencies() {
        assert_eq!(conditional_coding(0), ConditionalCoding::Independent);
        assert_eq!(conditional_coding(2), ConditionalCoding::Conditional);

        let lbrr = [true, false, true];
        assert_eq!(lbrr_conditional_coding(&lbrr, 0), ConditionalCoding::Independent);
        assert_eq!(lbrr_conditional_coding(&lbrr, 1), ConditionalCoding::Conditional);
        assert_eq!(lbrr_conditional_coding(&lbrr, 2), ConditionalCoding::Independent);
    }
}
