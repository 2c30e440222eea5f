// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pitch lags and long-term prediction (LTP) filters.
//!
//! A voiced frame transmits a primary pitch lag plus a contour index selecting per-subframe
//! offsets, and one 5-tap LTP filter per subframe drawn from one of three codebooks selected by
//! the periodicity index.

use crate::fixed::{log2lin, smulbb};
use crate::frame::{FrameGeometry, LTP_ORDER, MAX_NB_SUBFR};
use crate::table::{
    LTP_FILTER_BITS_Q5, LTP_SCALES_Q14, LTP_TAPS_Q7, PITCH_CB_MBWB_10MS, PITCH_CB_MBWB_20MS,
    PITCH_CB_NB_10MS, PITCH_CB_NB_20MS, PITCH_CONTOUR_MBWB_10MS, PITCH_CONTOUR_MBWB_20MS,
    PITCH_CONTOUR_NB_10MS, PITCH_CONTOUR_NB_20MS,
};

/// Number of LTP codebooks.
pub const NB_LTP_CODEBOOKS: usize = 3;

/// Weight of one Q5 bit against the Q14 squared tap error in the LTP codebook search.
const LTP_RATE_WEIGHT: i64 = 3;

#[derive(Clone, Copy)]
enum ContourOffsets {
    Short(&'static [[i8; 2]]),
    Long(&'static [[i8; 4]]),
}

/// Pitch contour codebook for a bandwidth and frame duration.
#[derive(Clone, Copy)]
pub struct ContourTable {
    /// Distribution of the contour index.
    pub cdf: &'static [u32],
    offsets: ContourOffsets,
}

impl ContourTable {
    /// Number of contours in the codebook.
    pub fn len(&self) -> usize {
        return match self.offsets {
            ContourOffsets::Short(cb) => cb.len(),
            ContourOffsets::Long(cb) => cb.len(),
        };
    }

    /// Lag offset of subframe `k` under `contour`.
    pub fn offset(&self, contour: usize, k: usize) -> i32 {
        return match self.offsets {
            ContourOffsets::Short(cb) => i32::from(cb[contour][k]),
            ContourOffsets::Long(cb) => i32::from(cb[contour][k]),
        };
    }
}

/// Selects the contour codebook. Narrowband uses a smaller codebook than medium and wideband.
pub fn contour_table(fs_khz: usize, nb_subfr: usize) -> ContourTable {
    return match (fs_khz == 8, nb_subfr == MAX_NB_SUBFR) {
        (true, false) => ContourTable {
            cdf: PITCH_CONTOUR_NB_10MS,
            offsets: ContourOffsets::Short(&PITCH_CB_NB_10MS),
        },
        (true, true) => ContourTable {
            cdf: PITCH_CONTOUR_NB_20MS,
            offsets: ContourOffsets::Long(&PITCH_CB_NB_20MS),
        },
        (false, false) => ContourTable {
            cdf: PITCH_CONTOUR_MBWB_10MS,
            offsets: ContourOffsets::Short(&PITCH_CB_MBWB_10MS),
        },
        (false, true) => ContourTable {
            cdf: PITCH_CONTOUR_MBWB_20MS,
            offsets: ContourOffsets::Long(&PITCH_CB_MBWB_20MS),
        },
    };
}

/// Reconstructs the per-subframe pitch lags from the primary lag index and the contour index.
pub fn decode_pitch(pitch_l: &mut [i32], lag_index: i32, contour: usize, geom: &FrameGeometry) {
    let table = contour_table(geom.fs_khz, geom.nb_subfr);

    let min_lag = geom.min_lag() as i32;
    let max_lag = geom.max_lag() as i32;

    for (k, lag) in pitch_l.iter_mut().take(geom.nb_subfr).enumerate() {
        *lag = (min_lag + lag_index + table.offset(contour, k)).clamp(min_lag, max_lag);
    }
}

/// Finds the lag index and contour that best represent the per-subframe pitch lags.
pub fn quantize_lags(pitch_l: &[i32], geom: &FrameGeometry) -> (i32, usize) {
    let table = contour_table(geom.fs_khz, geom.nb_subfr);
    let nb_subfr = geom.nb_subfr;

    let min_lag = geom.min_lag() as i32;
    let max_lag = geom.max_lag() as i32;

    let mut best = (i32::MAX, 0, 0);

    for contour in 0..table.len() {
        // The median lag minimizes the absolute error for a fixed contour.
        let mut base = [0i32; MAX_NB_SUBFR];

        for (k, b) in base.iter_mut().take(nb_subfr).enumerate() {
            *b = pitch_l[k] - table.offset(contour, k);
        }

        base[..nb_subfr].sort_unstable();

        // The largest index cannot be represented by the absolute lag code.
        let lag_index = (base[nb_subfr / 2] - min_lag).clamp(0, max_lag - min_lag - 1);

        let err = (0..nb_subfr)
            .map(|k| {
                let lag = (min_lag + lag_index + table.offset(contour, k)).clamp(min_lag, max_lag);
                (lag - pitch_l[k]).abs()
            })
            .sum::<i32>();

        if err < best.0 {
            best = (err, lag_index, contour);
        }
    }

    return (best.1, best.2);
}

/// Quantized LTP filters of one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LtpQuantization {
    pub per_index: usize,
    pub ltp_index: [u8; MAX_NB_SUBFR],
    pub b_q14: [i16; MAX_NB_SUBFR * LTP_ORDER],
}

/// Expands the LTP codebook entries selected by the periodicity and filter indices to Q14.
pub fn decode_ltp(b_q14: &mut [i16], per_index: usize, ltp_index: &[u8]) {
    for (taps, &idx) in b_q14.chunks_exact_mut(LTP_ORDER).zip(ltp_index) {
        let cb = &LTP_TAPS_Q7[per_index][usize::from(idx)];

        for (t, &c) in taps.iter_mut().zip(cb.iter()) {
            *t = i16::from(c) << 7;
        }
    }
}

/// Quantizes the unquantized LTP filters `target_q14` (5 taps per subframe).
///
/// Every codebook is searched and the one with the lowest combined squared tap error and coding
/// cost is selected.
pub fn quantize_ltp(target_q14: &[i32], nb_subfr: usize) -> LtpQuantization {
    debug_assert!(target_q14.len() >= nb_subfr * LTP_ORDER);

    let mut best_cost = i64::MAX;
    let mut result = LtpQuantization::default();

    for per_index in 0..NB_LTP_CODEBOOKS {
        let codebook = LTP_TAPS_Q7[per_index];
        let bits = &LTP_FILTER_BITS_Q5[per_index];

        let mut ltp_index = [0u8; MAX_NB_SUBFR];
        let mut total = 0i64;

        for (k, target) in target_q14.chunks_exact(LTP_ORDER).take(nb_subfr).enumerate() {
            let (cost, idx) = codebook
                .iter()
                .enumerate()
                .map(|(i, taps)| {
                    let err = taps
                        .iter()
                        .zip(target)
                        .map(|(&c, &t)| {
                            let d = i64::from(t) - (i64::from(c) << 7);
                            d * d
                        })
                        .sum::<i64>()
                        >> 14;

                    (err + LTP_RATE_WEIGHT * i64::from(bits[i]), i)
                })
                .min()
                .unwrap_or((0, 0));

            ltp_index[k] = idx as u8;
            total += cost;
        }

        if total < best_cost {
            best_cost = total;
            result.per_index = per_index;
            result.ltp_index = ltp_index;
        }
    }

    decode_ltp(&mut result.b_q14[..nb_subfr * LTP_ORDER], result.per_index, &result.ltp_index);

    return result;
}

/// Chooses how strongly the LTP state is scaled down at the start of an independently coded
/// frame. Higher loss and higher LTP coding gain both call for more scaling, limiting error
/// propagation after a lost packet.
pub fn ltp_scale_index(
    packet_loss_pct: u32,
    frames_per_packet: usize,
    lbrr_enabled: bool,
    snr_db_q7: i32,
    ltp_pred_cod_gain_q7: i32,
    independent: bool,
) -> usize {
    if !independent {
        return 0;
    }

    let mut round_loss = (packet_loss_pct as i32).saturating_mul(frames_per_packet as i32);

    if lbrr_enabled {
        // In-band redundancy roughly squares the effective loss rate.
        round_loss = 2 + round_loss.saturating_mul(round_loss) / 100;
    }

    let weight = smulbb(ltp_pred_cod_gain_q7, round_loss);

    let mut index = 0;

    if weight > log2lin(2900 + 7 * 128 - snr_db_q7) {
        index += 1;
    }

    if weight > log2lin(3900 + 7 * 128 - snr_db_q7) {
        index += 1;
    }

    return index;
}

/// LTP state scaling for a scale index, in Q14.
pub fn ltp_scale_q14(index: usize) -> i32 {
    return LTP_SCALES_Q14[index];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Bandwidth;

    #[test]
    fn verify_decode_pitch() {
        let geom = FrameGeometry::new(Bandwidth::WideBand, 4);
        let mut lags = [0; 4];

        decode_pitch(&mut lags, 100, 1, &geom);
        assert_eq!(lags, [132, 132, 133, 133]);

        // Lags are clamped to the valid range.
        decode_pitch(&mut lags, 0, 3, &geom);
        assert_eq!(lags, [32, 32, 32, 32]);

        let geom = FrameGeometry::new(Bandwidth::NarrowBand, 2);
        let mut lags = [0; 2];
        decode_pitch(&mut lags, 10, 2, &geom);
        assert_eq!(lags, [26, 27]);
    }

    #[test]
    fn verify_quantize_lags_round_trip() {
        for (bw, nb_subfr) in [
            (Bandwidth::NarrowBand, 2),
            (Bandwidth::NarrowBand, 4),
            (Bandwidth::MediumBand, 2),
            (Bandwidth::WideBand, 4),
        ] {
            let geom = FrameGeometry::new(bw, nb_subfr);
            let table = contour_table(geom.fs_khz, nb_subfr);

            for contour in 0..table.len() {
                let mut lags = [0; 4];
                decode_pitch(&mut lags, 40, contour, &geom);

                let (lag_index, c) = quantize_lags(&lags[..nb_subfr], &geom);

                let mut back = [0; 4];
                decode_pitch(&mut back, lag_index, c, &geom);
                assert_eq!(back[..nb_subfr], lags[..nb_subfr]);
            }
        }
    }

    #[test]
    fn verify_contour_tables_match_codebooks() {
        for fs_khz in [8, 12, 16] {
            for nb_subfr in [2, 4] {
                let table = contour_table(fs_khz, nb_subfr);
                assert_eq!(table.cdf.len(), table.len() + 1);
            }
        }
    }

    #[test]
    fn verify_quantize_ltp_exact_entries() {
        let mut target = [0i32; 20];

        for (k, taps) in target.chunks_exact_mut(5).enumerate() {
            let cb = &LTP_TAPS_Q7[2][k + 3];
            taps.iter_mut().zip(cb.iter()).for_each(|(t, &c)| *t = i32::from(c) << 7);
        }

        let q = quantize_ltp(&target, 4);

        // The search cost of the exact entries bounds the squared error of the chosen ones.
        let bound = (0..4).map(|k| LTP_RATE_WEIGHT * i64::from(LTP_FILTER_BITS_Q5[2][k + 3])).sum::<i64>();

        let err = q
            .b_q14
            .iter()
            .zip(target.iter())
            .map(|(&a, &b)| {
                let d = (i64::from(a) - i64::from(b)) >> 7;
                d * d
            })
            .sum::<i64>();

        assert!(err <= bound, "err={} bound={}", err, bound);

        // Every subframe gets a valid codebook entry.
        assert!(q.ltp_index.iter().all(|&i| usize::from(i) < LTP_TAPS_Q7[q.per_index].len()));
    }

    #[test]
    fn verify_ltp_scale_index() {
        assert_eq!(ltp_scale_index(50, 3, false, 0, 500, false), 0);
        assert_eq!(ltp_scale_index(0, 1, false, 0, 500, true), 0);
        assert_eq!(ltp_scale_index(5, 2, false, 0, 120, true), 0);
        assert_eq!(ltp_scale_index(25, 2, false, 3000, 100, true), 1);
        assert_eq!(ltp_scale_index(40, 3, true, 6000, 500, true), 2);
        assert_eq!(ltp_scale_q14(0), 15565);
    }
}
