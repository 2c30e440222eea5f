// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Excitation pulse coding.
//!
//! The excitation is split into shell blocks of 16 samples. For every block the number of pulses
//! is coded under a frame wide rate level, then the pulses are distributed over the block by
//! recursively coding the count of the left half of each partition. Large magnitudes are scaled
//! down until they fit the shell coder and the dropped least significant bits are coded
//! separately. Signs come last.

use symphonia_core::io::ReadBytes;

use crate::error::{Error, Result};
use crate::frame::{QuantOffsetType, SignalType, MAX_FRAME_LENGTH};
use crate::range;
use crate::table::{
    EXC_LSB, EXC_RATE, EXC_SIGN, PULSE_COUNT, PULSE_COUNT_BITS_Q5, PULSE_SPLIT, RATE_LEVEL_BITS_Q5,
};

/// Number of samples in a shell block.
pub const SHELL_CODEC_FRAME_LENGTH: usize = 16;

/// Largest pulse count of a block that can be coded directly.
const MAX_PULSES: usize = 16;

/// Pulse count symbol signalling that the block magnitudes were scaled down.
const ESCAPE: usize = MAX_PULSES + 1;

/// Number of rate levels, excluding the escape rows.
const N_RATE_LEVELS: usize = 9;

/// Row of [`PULSE_COUNT`] used after an escape.
const ESCAPE_ROW: usize = N_RATE_LEVELS;

/// Number of escapes after which the count is coded with the final row.
const MAX_LSHIFTS: usize = 10;

/// Largest pulse count allowed in a partition of 2, 4, 8 and 16 samples before scaling down.
const MAX_PULSES_PER_PARTITION: [u32; 4] = [8, 10, 12, 16];

const MAX_SHELL_BLOCKS: usize = MAX_FRAME_LENGTH.div_ceil(SHELL_CODEC_FRAME_LENGTH);

/// Number of shell blocks of a frame. A partial last block is zero padded.
fn shell_blocks(frame_length: usize) -> usize {
    return frame_length.div_ceil(SHELL_CODEC_FRAME_LENGTH);
}

fn count_row(index: usize) -> &'static [u32] {
    return PULSE_COUNT[index];
}

/// Row coding the count that follows the `nth` escape.
fn escape_row(nth: usize) -> usize {
    return if nth == MAX_LSHIFTS { ESCAPE_ROW + 1 } else { ESCAPE_ROW };
}

/// Checks that every partition of `block` fits the shell coder and returns the total.
fn fits_shell_coder(block: &[u32; SHELL_CODEC_FRAME_LENGTH]) -> Option<u32> {
    let mut sums = *block;
    let mut len = SHELL_CODEC_FRAME_LENGTH;

    for &max in MAX_PULSES_PER_PARTITION.iter() {
        len /= 2;

        for k in 0..len {
            sums[k] = sums[2 * k] + sums[2 * k + 1];

            if sums[k] > max {
                return None;
            }
        }
    }

    return Some(sums[0]);
}

/// Codes the distribution of the pulses of one partition in preorder.
fn encode_split(enc: &mut range::Encoder, block: &[u32], level: usize) -> Result<()> {
    let total: u32 = block.iter().sum();

    if total == 0 {
        return Ok(());
    }

    let (left, right) = block.split_at(block.len() / 2);
    let left_sum: u32 = left.iter().sum();

    enc.encode_symbol_with_cdf(left_sum as usize, PULSE_SPLIT[level][total as usize - 1])?;

    if block.len() > 2 {
        encode_split(enc, left, level + 1)?;
        encode_split(enc, right, level + 1)?;
    }

    return Ok(());
}

fn decode_split<B: ReadBytes>(
    dec: &mut range::Decoder<'_, B>,
    out: &mut [i16],
    total: usize,
    level: usize,
) -> Result<()> {
    if total == 0 {
        out.fill(0);
        return Ok(());
    }

    let left = dec.decode_symbol_with_cdf(PULSE_SPLIT[level][total - 1])?;
    let right = total - left;

    let (lo, hi) = out.split_at_mut(out.len() / 2);

    if lo.len() == 1 {
        lo[0] = left as i16;
        hi[0] = right as i16;
    }
    else {
        decode_split(dec, lo, left, level + 1)?;
        decode_split(dec, hi, right, level + 1)?;
    }

    return Ok(());
}

fn sign_cdf(signal_type: SignalType, quant_offset: QuantOffsetType, sum: u32) -> [u32; 3] {
    let p = EXC_SIGN[signal_type.index()][quant_offset.index()][usize::min(sum as usize & 0x1f, 6)];
    return [256, p, 256];
}

/// Range codes the excitation pulses of a frame.
pub fn encode_pulses(
    enc: &mut range::Encoder,
    signal_type: SignalType,
    quant_offset: QuantOffsetType,
    pulses: &[i8],
) -> Result<()> {
    let frame_length = pulses.len();
    let n_blocks = shell_blocks(frame_length);

    debug_assert!(n_blocks <= MAX_SHELL_BLOCKS);

    let mut abs = [[0u32; SHELL_CODEC_FRAME_LENGTH]; MAX_SHELL_BLOCKS];

    for (i, &p) in pulses.iter().enumerate() {
        abs[i / SHELL_CODEC_FRAME_LENGTH][i % SHELL_CODEC_FRAME_LENGTH] = u32::from(p.unsigned_abs());
    }

    // Scale each block down until all of its partitions fit.
    let mut sums = [0u32; MAX_SHELL_BLOCKS];
    let mut n_rshifts = [0usize; MAX_SHELL_BLOCKS];

    for i in 0..n_blocks {
        loop {
            if let Some(sum) = fits_shell_coder(&abs[i]) {
                sums[i] = sum;
                break;
            }

            n_rshifts[i] += 1;
            abs[i].iter_mut().for_each(|a| *a >>= 1);
        }

        if n_rshifts[i] > MAX_LSHIFTS {
            return Err(Error::EncodingError("pulse magnitude out of range"));
        }
    }

    // Pick the cheapest rate level.
    let voiced = usize::from(signal_type == SignalType::Voiced);
    let mut best = (i32::MAX, 0);

    for level in 0..N_RATE_LEVELS {
        let bits = &PULSE_COUNT_BITS_Q5[level];

        let cost = RATE_LEVEL_BITS_Q5[voiced][level]
            + (0..n_blocks)
                .map(|i| if n_rshifts[i] > 0 { bits[ESCAPE] } else { bits[sums[i] as usize] })
                .sum::<i32>();

        if cost < best.0 {
            best = (cost, level);
        }
    }

    let rate_level = best.1;

    enc.encode_symbol_with_cdf(rate_level, EXC_RATE[voiced])?;

    // Pulse counts.
    for i in 0..n_blocks {
        let mut row = rate_level;

        for nth in 1..=n_rshifts[i] {
            enc.encode_symbol_with_cdf(ESCAPE, count_row(row))?;
            row = escape_row(nth);
        }

        enc.encode_symbol_with_cdf(sums[i] as usize, count_row(row))?;
    }

    // Pulse positions.
    for i in 0..n_blocks {
        encode_split(enc, &abs[i], 0)?;
    }

    // Least significant bits of scaled down blocks.
    for i in 0..n_blocks {
        if n_rshifts[i] == 0 {
            continue;
        }

        let start = i * SHELL_CODEC_FRAME_LENGTH;

        // Padding samples are coded too.
        for k in start..start + SHELL_CODEC_FRAME_LENGTH {
            let mag = pulses.get(k).map_or(0, |p| u32::from(p.unsigned_abs()));

            for j in (0..n_rshifts[i]).rev() {
                enc.encode_symbol_with_cdf(((mag >> j) & 1) as usize, EXC_LSB)?;
            }
        }
    }

    // Signs.
    for i in 0..n_blocks {
        let start = i * SHELL_CODEC_FRAME_LENGTH;
        let end = usize::min(start + SHELL_CODEC_FRAME_LENGTH, frame_length);

        if sums[i] == 0 {
            continue;
        }

        let cdf = sign_cdf(signal_type, quant_offset, sums[i]);

        for &p in pulses[start..end].iter().filter(|&&p| p != 0) {
            enc.encode_symbol_with_cdf(usize::from(p > 0), &cdf)?;
        }
    }

    return Ok(());
}

/// Decodes the excitation pulses of a frame into `pulses`, whose length is the frame length.
pub fn decode_pulses<B: ReadBytes>(
    dec: &mut range::Decoder<'_, B>,
    signal_type: SignalType,
    quant_offset: QuantOffsetType,
    pulses: &mut [i16],
) -> Result<()> {
    let frame_length = pulses.len();
    let n_blocks = shell_blocks(frame_length);

    debug_assert!(n_blocks <= MAX_SHELL_BLOCKS);

    let voiced = usize::from(signal_type == SignalType::Voiced);
    let rate_level = dec.decode_symbol_with_cdf(EXC_RATE[voiced])?;

    let mut sums = [0usize; MAX_SHELL_BLOCKS];
    let mut n_lshifts = [0usize; MAX_SHELL_BLOCKS];

    for i in 0..n_blocks {
        let mut sum = dec.decode_symbol_with_cdf(count_row(rate_level))?;

        while sum == ESCAPE {
            n_lshifts[i] += 1;

            if n_lshifts[i] > MAX_LSHIFTS {
                return Err(Error::DecodingError("silk: too many pulse count escapes"));
            }

            sum = dec.decode_symbol_with_cdf(count_row(escape_row(n_lshifts[i])))?;
        }

        sums[i] = sum;
    }

    let mut padded = [0i16; MAX_SHELL_BLOCKS * SHELL_CODEC_FRAME_LENGTH];
    let padded = &mut padded[..n_blocks * SHELL_CODEC_FRAME_LENGTH];

    for (block, &sum) in padded.chunks_exact_mut(SHELL_CODEC_FRAME_LENGTH).zip(sums.iter()) {
        decode_split(dec, block, sum, 0)?;
    }

    for (block, &shifts) in padded.chunks_exact_mut(SHELL_CODEC_FRAME_LENGTH).zip(n_lshifts.iter()) {
        if shifts == 0 {
            continue;
        }

        for p in block.iter_mut() {
            let mut mag = i32::from(*p);

            for _ in 0..shifts {
                mag = (mag << 1) + dec.decode_symbol_with_cdf(EXC_LSB)? as i32;
            }

            *p = mag as i16;
        }
    }

    for (i, block) in padded.chunks_exact_mut(SHELL_CODEC_FRAME_LENGTH).enumerate() {
        if sums[i] == 0 {
            continue;
        }

        let cdf = sign_cdf(signal_type, quant_offset, sums[i] as u32);
        let valid = usize::min(SHELL_CODEC_FRAME_LENGTH, frame_length - i * SHELL_CODEC_FRAME_LENGTH);

        for p in block[..valid].iter_mut().filter(|p| **p != 0) {
            if dec.decode_symbol_with_cdf(&cdf)? == 0 {
                *p = -*p;
            }
        }
    }

    pulses.copy_from_slice(&padded[..frame_length]);

    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use symphonia_core::io::BufReader;

    fn round_trip(pulses: &[i8], signal_type: SignalType, offset: QuantOffsetType) -> Result<Vec<i16>> {
        let mut enc = range::Encoder::new();
        encode_pulses(&mut enc, signal_type, offset, pulses)?;
        let data = enc.finish();

        let mut reader = BufReader::new(&data);
        let mut dec = range::Decoder::new(&mut reader);

        let mut out = vec![0i16; pulses.len()];
        decode_pulses(&mut dec, signal_type, offset, &mut out)?;

        return Ok(out);
    }

    #[test]
    fn verify_silent_frame() -> Result<()> {
        let pulses = [0i8; 320];
        let out = round_trip(&pulses, SignalType::Inactive, QuantOffsetType::Low)?;
        assert!(out.iter().all(|&p| p == 0));

        return Ok(());
    }

    #[test]
    fn verify_large_pulses_are_scaled() -> Result<()> {
        // A block full of large magnitudes needs several escapes.
        let mut pulses = [0i8; 160];

        for (i, p) in pulses.iter_mut().enumerate() {
            *p = if i % 2 == 0 { 31 } else { -29 };
        }

        let out = round_trip(&pulses, SignalType::Voiced, QuantOffsetType::High)?;
        assert!(out.iter().zip(pulses.iter()).all(|(&a, &b)| a == i16::from(b)));

        return Ok(());
    }

    #[test]
    fn verify_partial_last_block() -> Result<()> {
        // 12 kHz with 10 ms frames leaves half a shell block at the end.
        let mut pulses = [0i8; 120];
        pulses[119] = -3;
        pulses[113] = 2;
        pulses[0] = 1;

        let out = round_trip(&pulses, SignalType::Unvoiced, QuantOffsetType::Low)?;
        assert!(out.iter().zip(pulses.iter()).all(|(&a, &b)| a == i16::from(b)));

        return Ok(());
    }

    proptest! {
        #[test]
        fn prop_shell_coder_round_trip(
            pulses in proptest::collection::vec(-20i8..=20, 80..=320),
            signal in 0u8..3,
            offset in 0u8..2,
        ) {
            let signal_type = SignalType::try_from(signal).unwrap();
            let offset = QuantOffsetType::try_from(offset).unwrap();

            let out = round_trip(&pulses, signal_type, offset).unwrap();

            for (&a, &b) in out.iter().zip(pulses.iter()) {
                prop_assert_eq!(a, i16::from(b));
            }
        }
    }
}
