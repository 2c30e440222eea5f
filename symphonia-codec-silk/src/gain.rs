// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subframe gain quantization.
//!
//! Gains are quantized on a 64 level logarithmic scale spanning 2 dB to 88 dB. The first subframe
//! of a frame that does not depend on the previous one is coded absolutely, every other subframe
//! as a delta against the previous index. Large upward deltas are coded with a doubled step size.

use crate::fixed::{lin2log, log2lin, smulwb};

pub const N_LEVELS_QGAIN: i32 = 64;
pub const MIN_DELTA_GAIN_QUANT: i32 = -4;
pub const MAX_DELTA_GAIN_QUANT: i32 = 36;

pub const MIN_QGAIN_DB: i32 = 2;
const MAX_QGAIN_DB: i32 = 88;

const OFFSET: i32 = (MIN_QGAIN_DB * 128) / 6 + 16 * 128;
const SCALE_Q16: i32 = (65536 * (N_LEVELS_QGAIN - 1)) / (((MAX_QGAIN_DB - MIN_QGAIN_DB) * 128) / 6);
const INV_SCALE_Q16: i32 =
    (65536 * (((MAX_QGAIN_DB - MIN_QGAIN_DB) * 128) / 6)) / (N_LEVELS_QGAIN - 1);

#[inline(always)]
fn index_to_gain(ind: i32) -> i32 {
    return log2lin(i32::min(smulwb(INV_SCALE_Q16, ind) + OFFSET, 3967));
}

#[inline(always)]
fn double_step_threshold(prev_ind: i32) -> i32 {
    return 2 * MAX_DELTA_GAIN_QUANT - N_LEVELS_QGAIN + prev_ind;
}

/// Quantizes the gains in place and writes their indices.
///
/// `prev_ind` carries the last gain index across frames. If `conditional` is false the first
/// index is coded absolutely.
pub fn quantize(ind: &mut [u8], gains_q16: &mut [i32], prev_ind: &mut i32, conditional: bool) {
    debug_assert_eq!(ind.len(), gains_q16.len());

    for (k, (ind, gain)) in ind.iter_mut().zip(gains_q16.iter_mut()).enumerate() {
        let mut idx = smulwb(SCALE_Q16, lin2log(*gain) - OFFSET);

        // Round towards the previous index to reduce hysteresis.
        if idx < *prev_ind {
            idx += 1;
        }

        idx = idx.clamp(0, N_LEVELS_QGAIN - 1);

        if k == 0 && !conditional {
            idx = idx.clamp(*prev_ind + MIN_DELTA_GAIN_QUANT, N_LEVELS_QGAIN - 1);
            *prev_ind = idx;
            *ind = idx as u8;
        }
        else {
            let mut delta = idx - *prev_ind;
            let thres = double_step_threshold(*prev_ind);

            if delta > thres {
                delta = thres + ((delta - thres + 1) >> 1);
            }

            delta = delta.clamp(MIN_DELTA_GAIN_QUANT, MAX_DELTA_GAIN_QUANT);

            if delta > thres {
                *prev_ind = i32::min(*prev_ind + (delta << 1) - thres, N_LEVELS_QGAIN - 1);
            }
            else {
                *prev_ind += delta;
            }

            *ind = (delta - MIN_DELTA_GAIN_QUANT) as u8;
        }

        *gain = index_to_gain(*prev_ind);
    }
}

/// Reconstructs the gains from their indices.
pub fn dequantize(gains_q16: &mut [i32], ind: &[u8], prev_ind: &mut i32, conditional: bool) {
    debug_assert_eq!(ind.len(), gains_q16.len());

    for (k, (gain, &ind)) in gains_q16.iter_mut().zip(ind.iter()).enumerate() {
        let ind = i32::from(ind);

        if k == 0 && !conditional {
            // Gain index is not allowed to go down more than 16 steps (~21.8 dB).
            *prev_ind = i32::max(ind, *prev_ind - 16);
        }
        else {
            let delta = ind + MIN_DELTA_GAIN_QUANT;
            let thres = double_step_threshold(*prev_ind);

            if delta > thres {
                *prev_ind += (delta << 1) - thres;
            }
            else {
                *prev_ind += delta;
            }
        }

        *prev_ind = (*prev_ind).clamp(0, N_LEVELS_QGAIN - 1);
        *gain = index_to_gain(*prev_ind);
    }
}

/// Fingerprint of a set of gain indices. Equal fingerprints imply equal quantized gains.
pub fn gains_id(ind: &[u8]) -> i32 {
    return ind.iter().fold(0i32, |id, &i| id.wrapping_shl(8).wrapping_add(i32::from(i)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn verify_gain_range() {
        assert_eq!(OFFSET, 2090);
        assert_eq!(SCALE_Q16, 2251);
        assert_eq!(INV_SCALE_Q16, 1907825);

        // Index 0 is about 2 dB above unity in Q16, index 63 about 88 dB.
        let lo = index_to_gain(0) as f64 / 65536.0;
        let hi = index_to_gain(63) as f64 / 65536.0;

        assert!((20.0 * lo.log10() - 2.0).abs() < 0.5, "lo={}", lo);
        assert!((20.0 * hi.log10() - 88.0).abs() < 0.5, "hi={}", hi);
    }

    #[test]
    fn verify_gains_id() {
        assert_eq!(gains_id(&[1, 2]), 0x0102);
        assert_eq!(gains_id(&[1, 2, 3, 4]), 0x01020304);
        assert_ne!(gains_id(&[4, 3, 2, 1]), gains_id(&[1, 2, 3, 4]));
    }

    #[test]
    fn verify_large_downward_step_is_limited() {
        let mut ind = [0u8; 4];
        let mut gains = [1 << 16; 4];
        let mut prev = 60;

        quantize(&mut ind, &mut gains, &mut prev, false);

        // Absolute coding cannot drop more than four levels on the first subframe.
        assert_eq!(ind[0], 56);
    }

    proptest! {
        #[test]
        fn prop_dequantize_mirrors_quantize(
            gains in proptest::collection::vec(1i32..i32::MAX, 4),
            prev in 0i32..64,
            conditional in any::<bool>(),
        ) {
            let mut ind = [0u8; 4];
            let mut quantized = [0i32; 4];
            quantized.copy_from_slice(&gains);

            let mut prev_enc = prev;
            quantize(&mut ind, &mut quantized, &mut prev_enc, conditional);

            let mut decoded = [0i32; 4];
            let mut prev_dec = prev;
            dequantize(&mut decoded, &ind, &mut prev_dec, conditional);

            prop_assert_eq!(decoded, quantized);
            prop_assert_eq!(prev_dec, prev_enc);

            for (k, &i) in ind.iter().enumerate() {
                if k == 0 && !conditional {
                    prop_assert!(i32::from(i) < N_LEVELS_QGAIN);
                }
                else {
                    prop_assert!(i32::from(i) <= MAX_DELTA_GAIN_QUANT - MIN_DELTA_GAIN_QUANT);
                }
            }
        }
    }
}
