// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Normalized Line Spectral Frequencies.
//!
//! The short-term prediction filter is transmitted as a vector of NLSFs in Q15, the angular
//! frequencies of the roots of the symmetric and antisymmetric polynomials derived from the LPC
//! filter, normalized so that 32768 corresponds to pi. NLSFs are quantized with a two stage
//! vector quantizer: a stage-1 codebook vector followed by a predictively coded scalar residual
//! per coefficient.

use std::cmp::Ordering;

use crate::fixed::{div32_varq, lin2log, rshift_round, rshift_round64, smlabb, smulbb};
use crate::frame::MAX_LPC_ORDER;
use crate::lpc::{bwexpander_32, inverse_pred_gain, lpc_fit};
use crate::table::{
    LSF_S1, LSF_S2_BITS_Q5, NLSF_CB1_NB_MB_Q8, NLSF_CB1_SIZE, NLSF_CB1_WB_Q8, NLSF_CB1_WGHT_NB_MB_Q9,
    NLSF_CB1_WGHT_WB_Q9, NLSF_CB2_SELECT_NB_MB, NLSF_CB2_SELECT_WB, NLSF_COS_Q12, NLSF_COS_TABLE_SIZE,
    NLSF_DELTA_MIN_NB_MB, NLSF_DELTA_MIN_WB, NLSF_ORDERING_NB_MB, NLSF_ORDERING_WB, NLSF_PRED_NB_MB_Q8,
    NLSF_PRED_SELECT_NB_MB, NLSF_PRED_SELECT_WB, NLSF_PRED_WB_Q8,
};

/// Largest magnitude of a stage-2 residual index.
pub const MAX_RESIDUAL_INDEX: i32 = 10;

/// Largest magnitude of a stage-2 residual index coded without the extension table.
const MAX_AMPLITUDE: i32 = 4;

/// Stage-2 quantization step sizes in Q16, and their inverses in Q6.
const STEP_NB_MB_Q16: i32 = 11796;
const STEP_WB_Q16: i32 = 9830;
const INV_STEP_NB_MB_Q6: i32 = 356;
const INV_STEP_WB_Q6: i32 = 427;

/// Dead-zone applied to residual indices, in Q10.
const QUANT_LEVEL_ADJUST_Q10: i32 = 102;

/// Approximate cost of the first extended residual magnitude, and of each further step, in Q5.
const EXT_RATE_Q5: i32 = 280;
const EXT_STEP_RATE_Q5: i32 = 43;

/// Paths kept alive by the residual trellis.
const DEL_DEC_STATES: usize = 4;

const MAX_STABILIZE_LOOPS: usize = 20;
const MAX_LPC_STABILIZE_ITERATIONS: usize = 16;

/// LPC coefficients are built in Q16 and filtered down to Q12.
const QA: u32 = 16;

const BIN_DIV_STEPS: usize = 3;
const MAX_A2NLSF_ITERATIONS: usize = 16;

fn step_q16(order: usize) -> i32 {
    return if order == 16 { STEP_WB_Q16 } else { STEP_NB_MB_Q16 };
}

/// Minimum spacing of the NLSFs of a filter order, including both band edges.
pub fn delta_min(order: usize) -> &'static [i32] {
    return if order == 16 { &NLSF_DELTA_MIN_WB } else { &NLSF_DELTA_MIN_NB_MB };
}

fn ordering(order: usize) -> &'static [usize] {
    return if order == 16 { &NLSF_ORDERING_WB } else { &NLSF_ORDERING_NB_MB };
}

fn stage1_vector(order: usize, index: usize) -> &'static [u8] {
    return if order == 16 { &NLSF_CB1_WB_Q8[index] } else { &NLSF_CB1_NB_MB_Q8[index] };
}

fn stage1_weights(order: usize, index: usize) -> &'static [i16] {
    return if order == 16 { &NLSF_CB1_WGHT_WB_Q9[index] } else { &NLSF_CB1_WGHT_NB_MB_Q9[index] };
}

/// Row of the stage-2 residual tables that codes residual `i` of stage-1 vector `stage1`.
pub fn residual_row(order: usize, stage1: usize, i: usize) -> usize {
    if order == 16 {
        return 8 + usize::from(NLSF_CB2_SELECT_WB[stage1][i]);
    }

    return usize::from(NLSF_CB2_SELECT_NB_MB[stage1][i]);
}

/// Coefficient in Q8 predicting residual `i` from residual `i + 1`.
fn residual_pred_q8(order: usize, stage1: usize, i: usize) -> i32 {
    if i + 1 >= order {
        return 0;
    }

    if order == 16 {
        return i32::from(NLSF_PRED_WB_Q8[usize::from(NLSF_PRED_SELECT_WB[stage1][i])][i]);
    }

    return i32::from(NLSF_PRED_NB_MB_Q8[usize::from(NLSF_PRED_SELECT_NB_MB[stage1][i])][i]);
}

/// Reconstruction level of a residual index in Q10, before prediction.
#[inline(always)]
fn residual_level_q10(index: i32, step_q16: i32) -> i32 {
    let mut out_q10 = index << 10;

    match out_q10.cmp(&0) {
        Ordering::Greater => out_q10 -= QUANT_LEVEL_ADJUST_Q10,
        Ordering::Less => out_q10 += QUANT_LEVEL_ADJUST_Q10,
        Ordering::Equal => (),
    }

    return smulbb(out_q10, step_q16) >> 16;
}

/// Reconstructs the stage-2 residuals in Q10. Each residual is predicted from the next one, so
/// they are dequantized from the last coefficient to the first.
fn dequantize_residuals(res_q10: &mut [i32], indices: &[i8], stage1: usize) {
    let order = res_q10.len();
    let step = step_q16(order);

    let mut out_q10 = 0;

    for i in (0..order).rev() {
        let pred_q10 = (out_q10 * residual_pred_q8(order, stage1, i)) >> 8;
        out_q10 = pred_q10 + residual_level_q10(i32::from(indices[i]), step);
        res_q10[i] = out_q10;
    }
}

/// Decodes NLSFs from their stage-1 index (`indices[0]`) and stage-2 residual indices
/// (`indices[1..=order]`). The result is stabilized.
pub fn decode(nlsf_q15: &mut [i16], indices: &[i8]) {
    let order = nlsf_q15.len();
    debug_assert!(order == 10 || order == 16);
    debug_assert_eq!(indices.len(), order + 1);

    let stage1 = indices[0] as usize;

    let mut res_q10 = [0i32; MAX_LPC_ORDER];
    dequantize_residuals(&mut res_q10[..order], &indices[1..], stage1);

    let cb = stage1_vector(order, stage1);
    let w_q9 = stage1_weights(order, stage1);

    for (i, nlsf) in nlsf_q15.iter_mut().enumerate() {
        let value = (i32::from(cb[i]) << 7) + (res_q10[i] << 14) / i32::from(w_q9[i]);
        *nlsf = value.clamp(0, 32767) as i16;
    }

    stabilize(nlsf_q15, delta_min(order));
}

/// Laroia weights in Q2: the inverse distances to both neighbours, emphasizing closely spaced
/// NLSFs whose position matters most for the spectral envelope.
pub fn laroia_weights(w_q2: &mut [i32], nlsf_q15: &[i16]) {
    let order = nlsf_q15.len();

    let inv = |d: i32| (1 << 17) / d.max(1);

    for i in 0..order {
        let lo = if i > 0 { i32::from(nlsf_q15[i - 1]) } else { 0 };
        let hi = if i + 1 < order { i32::from(nlsf_q15[i + 1]) } else { 1 << 15 };
        let x = i32::from(nlsf_q15[i]);

        w_q2[i] = (inv(x - lo) + inv(hi - x)).min(i32::from(i16::MAX));
    }
}

/// Weighted distance of a target to every stage-1 vector. Each weighted difference is compared
/// against half of its upper neighbour's, mirroring the backward prediction of the residuals.
fn stage1_errors(err_q24: &mut [(i32, usize)], nlsf_q15: &[i16]) {
    let order = nlsf_q15.len();

    for (s, entry) in err_q24.iter_mut().enumerate() {
        let cb = stage1_vector(order, s);
        let w_q9 = stage1_weights(order, s);

        let mut sum_q24 = 0i32;
        let mut pred_q24 = 0i32;

        for k in (0..order).rev() {
            let diff_q15 = i32::from(nlsf_q15[k]) - (i32::from(cb[k]) << 7);
            let diffw_q24 = diff_q15 * i32::from(w_q9[k]);

            sum_q24 = sum_q24.saturating_add((diffw_q24 - (pred_q24 >> 1)).abs());
            pred_q24 = diffw_q24;
        }

        *entry = (sum_q24, s);
    }
}

/// Rates in Q5 of residual indices `index` and `index + 1`.
fn residual_rates_q5(index: i32, rates_q5: &[i32]) -> (i32, i32) {
    if index + 1 >= MAX_AMPLITUDE {
        if index + 1 == MAX_AMPLITUDE {
            return (rates_q5[(index + MAX_AMPLITUDE) as usize], EXT_RATE_Q5);
        }

        let rate0 = EXT_RATE_Q5 - EXT_STEP_RATE_Q5 * MAX_AMPLITUDE + EXT_STEP_RATE_Q5 * index;
        return (rate0, rate0 + EXT_STEP_RATE_Q5);
    }
    else if index <= -MAX_AMPLITUDE {
        if index == -MAX_AMPLITUDE {
            return (EXT_RATE_Q5, rates_q5[(index + 1 + MAX_AMPLITUDE) as usize]);
        }

        let rate0 = EXT_RATE_Q5 - EXT_STEP_RATE_Q5 * MAX_AMPLITUDE - EXT_STEP_RATE_Q5 * index;
        return (rate0, rate0 - EXT_STEP_RATE_Q5);
    }

    let i = (index + MAX_AMPLITUDE) as usize;

    return (rates_q5[i], rates_q5[i + 1]);
}

/// Quantizes the stage-2 residuals `x_q10` of one stage-1 vector with a trellis of
/// [`DEL_DEC_STATES`] surviving paths, minimizing weighted error plus `mu_q20` times the rate.
///
/// Every residual is rounded down and up, and the best paths are kept. Returns the
/// rate-distortion cost of the winner in Q25.
fn quantize_residuals(indices: &mut [i8], x_q10: &[i32], w_q5: &[i32], stage1: usize, mu_q20: i32) -> i64 {
    const S: usize = DEL_DEC_STATES;

    let order = x_q10.len();
    let step = step_q16(order);
    let inv_step_q6 = if order == 16 { INV_STEP_WB_Q6 } else { INV_STEP_NB_MB_Q6 };

    let mut ind = [[0i8; MAX_LPC_ORDER]; S];
    let mut prev_out_q10 = [0i32; 2 * S];
    let mut rd_q25 = [0i64; 2 * S];
    let mut rd_min_q25 = [0i64; S];
    let mut rd_max_q25 = [0i64; S];
    let mut ind_sort = [0usize; S];

    let mut n_states = 1;

    for i in (0..order).rev() {
        let rates_q5 = &LSF_S2_BITS_Q5[residual_row(order, stage1, i)];
        let pred_coef_q8 = residual_pred_q8(order, stage1, i);
        let in_q10 = x_q10[i];

        for j in 0..n_states {
            let pred_q10 = (pred_coef_q8 * prev_out_q10[j]) >> 8;
            let res_q10 = in_q10 - pred_q10;

            let index = (smulbb(inv_step_q6, res_q10) >> 16).clamp(-MAX_RESIDUAL_INDEX, MAX_RESIDUAL_INDEX - 1);
            ind[j][i] = index as i8;

            let out0_q10 = residual_level_q10(index, step) + pred_q10;
            let out1_q10 = residual_level_q10(index + 1, step) + pred_q10;

            prev_out_q10[j] = out0_q10;
            prev_out_q10[j + n_states] = out1_q10;

            let (rate0_q5, rate1_q5) = residual_rates_q5(index, rates_q5);

            let cost = |out_q10: i32, rate_q5: i32| -> i64 {
                let diff = i64::from(in_q10 - out_q10);
                return diff * diff * i64::from(w_q5[i]) + i64::from(mu_q20) * i64::from(rate_q5);
            };

            let rd = rd_q25[j];
            rd_q25[j] = rd + cost(out0_q10, rate0_q5);
            rd_q25[j + n_states] = rd + cost(out1_q10, rate1_q5);
        }

        if n_states <= S / 2 {
            // Keep both roundings of every path.
            for j in 0..n_states {
                ind[j + n_states][i] = ind[j][i] + 1;
            }

            n_states <<= 1;

            for j in n_states..S {
                ind[j][i] = ind[j - n_states][i];
            }
        }
        else {
            // Pair up the two roundings of each path, the cheaper one first.
            for j in 0..S {
                if rd_q25[j] > rd_q25[j + S] {
                    rd_max_q25[j] = rd_q25[j];
                    rd_min_q25[j] = rd_q25[j + S];
                    rd_q25.swap(j, j + S);
                    prev_out_q10.swap(j, j + S);
                    ind_sort[j] = j + S;
                }
                else {
                    rd_min_q25[j] = rd_q25[j];
                    rd_max_q25[j] = rd_q25[j + S];
                    ind_sort[j] = j;
                }
            }

            // Replace the worst winner with the best loser while the loser is cheaper.
            loop {
                let mut min_max_q25 = i64::MAX;
                let mut max_min_q25 = 0;
                let mut ind_min_max = 0;
                let mut ind_max_min = 0;

                for j in 0..S {
                    if min_max_q25 > rd_max_q25[j] {
                        min_max_q25 = rd_max_q25[j];
                        ind_min_max = j;
                    }

                    if max_min_q25 < rd_min_q25[j] {
                        max_min_q25 = rd_min_q25[j];
                        ind_max_min = j;
                    }
                }

                if min_max_q25 >= max_min_q25 {
                    break;
                }

                ind_sort[ind_max_min] = ind_sort[ind_min_max] ^ S;
                rd_q25[ind_max_min] = rd_q25[ind_min_max + S];
                prev_out_q10[ind_max_min] = prev_out_q10[ind_min_max + S];
                rd_min_q25[ind_max_min] = 0;
                rd_max_q25[ind_min_max] = i64::MAX;
                ind[ind_max_min] = ind[ind_min_max];
            }

            // Paths taken from the upper half rounded up.
            for j in 0..S {
                ind[j][i] += (ind_sort[j] / S) as i8;
            }
        }
    }

    let mut best = 0;

    for j in 1..2 * S {
        if rd_q25[j] < rd_q25[best] {
            best = j;
        }
    }

    indices.copy_from_slice(&ind[best % S][..order]);
    indices[0] += (best / S) as i8;

    return rd_q25[best];
}

/// Quantizes NLSFs in place and writes their codebook indices.
///
/// The `survivors` stage-1 vectors closest to the target are each refined by the residual
/// trellis. The candidate with the smallest weighted error plus `mu_q20` times its rate wins,
/// with the rate of the stage-1 index taken from the table of voiced or unvoiced frames.
/// `w_q2` holds the Laroia weights of the target, see [`laroia_weights`]. On return `nlsf_q15`
/// holds exactly what [`decode`] produces from `indices`.
pub fn quantize(
    nlsf_q15: &mut [i16],
    indices: &mut [i8],
    w_q2: &[i32],
    mu_q20: i32,
    survivors: usize,
    voiced: bool,
) {
    let order = nlsf_q15.len();
    debug_assert!(order == 10 || order == 16);
    debug_assert_eq!(indices.len(), order + 1);
    debug_assert_eq!(w_q2.len(), order);

    stabilize(nlsf_q15, delta_min(order));

    let mut ranked = [(0i32, 0usize); NLSF_CB1_SIZE];
    stage1_errors(&mut ranked, nlsf_q15);
    ranked.sort_by_key(|&(err, _)| err);

    let stage1_cdf = LSF_S1[usize::from(order == 16)][usize::from(voiced)];

    let mut best_rd = i64::MAX;
    let mut best = [0i8; MAX_LPC_ORDER + 1];

    for &(_, s) in ranked.iter().take(survivors.clamp(1, NLSF_CB1_SIZE)) {
        let cb = stage1_vector(order, s);
        let w_q9 = stage1_weights(order, s);

        let mut res_q10 = [0i32; MAX_LPC_ORDER];
        let mut w_adj_q5 = [0i32; MAX_LPC_ORDER];

        for i in 0..order {
            let w = i32::from(w_q9[i]);
            let diff_q15 = i32::from(nlsf_q15[i]) - (i32::from(cb[i]) << 7);

            res_q10[i] = i32::from((smulbb(diff_q15, w) >> 14) as i16);
            w_adj_q5[i] = div32_varq(w_q2[i], smulbb(w, w), 21);
        }

        let mut candidate = [0i8; MAX_LPC_ORDER + 1];
        candidate[0] = s as i8;

        let mut rd_q25 =
            quantize_residuals(&mut candidate[1..=order], &res_q10[..order], &w_adj_q5[..order], s, mu_q20);

        // Rate of the stage-1 index.
        let prob_q8 = stage1_cdf[s + 1] - if s > 0 { stage1_cdf[s] } else { 0 };
        let bits_q7 = (8 << 7) - lin2log((prob_q8 as i32).max(1));
        rd_q25 += i64::from(smlabb(0, bits_q7, mu_q20 >> 2));

        if rd_q25 < best_rd {
            best_rd = rd_q25;
            best = candidate;
        }
    }

    indices.copy_from_slice(&best[..=order]);
    decode(nlsf_q15, indices);
}

/// Enforces the minimum spacing `delta_min_q15` between neighbouring NLSFs and the band edges.
///
/// `delta_min_q15` has one more entry than `nlsf_q15`: the last entry is the minimum distance to
/// pi.
pub fn stabilize(nlsf_q15: &mut [i16], delta_min_q15: &[i32]) {
    let l = nlsf_q15.len();

    if l == 0 {
        return;
    }

    debug_assert_eq!(delta_min_q15.len(), l + 1);

    for _ in 0..MAX_STABILIZE_LOOPS {
        // Find the smallest distance relative to its minimum.
        let mut min_diff = i32::from(nlsf_q15[0]) - delta_min_q15[0];
        let mut index = 0;

        for i in 1..l {
            let diff = i32::from(nlsf_q15[i]) - (i32::from(nlsf_q15[i - 1]) + delta_min_q15[i]);

            if diff < min_diff {
                min_diff = diff;
                index = i;
            }
        }

        let last_diff = (1 << 15) - (i32::from(nlsf_q15[l - 1]) + delta_min_q15[l]);

        if last_diff < min_diff {
            min_diff = last_diff;
            index = l;
        }

        if min_diff >= 0 {
            return;
        }

        if index == 0 {
            nlsf_q15[0] = delta_min_q15[0] as i16;
        }
        else if index == l {
            nlsf_q15[l - 1] = ((1 << 15) - delta_min_q15[l]) as i16;
        }
        else {
            // Move the offending pair apart around its center, keeping room for the others.
            let half = delta_min_q15[index] >> 1;

            let min_center = delta_min_q15[..index].iter().sum::<i32>() + half;
            let max_center = (1 << 15) - delta_min_q15[index + 1..].iter().sum::<i32>() - half;

            let sum = i32::from(nlsf_q15[index - 1]) + i32::from(nlsf_q15[index]);
            let center = ((sum + 1) >> 1).clamp(min_center, max_center);

            nlsf_q15[index - 1] = (center - half) as i16;
            nlsf_q15[index] = (i32::from(nlsf_q15[index - 1]) + delta_min_q15[index]) as i16;
        }
    }

    // Fall back to sorting and clamping if the loop did not converge.
    nlsf_q15.sort_unstable();

    nlsf_q15[0] = i32::max(i32::from(nlsf_q15[0]), delta_min_q15[0]) as i16;

    for i in 1..l {
        let lo = i32::from(nlsf_q15[i - 1]) + delta_min_q15[i];
        nlsf_q15[i] = i32::max(i32::from(nlsf_q15[i]), lo).min(32767) as i16;
    }

    let hi = (1 << 15) - delta_min_q15[l];
    nlsf_q15[l - 1] = i32::min(i32::from(nlsf_q15[l - 1]), hi) as i16;

    for i in (0..l - 1).rev() {
        let hi = i32::from(nlsf_q15[i + 1]) - delta_min_q15[i + 1];
        nlsf_q15[i] = i32::min(i32::from(nlsf_q15[i]), hi) as i16;
    }
}

/// Interpolates between two NLSF vectors: `out = x0 + (x1 - x0) * ifact_q2 / 4`.
pub fn interpolate(out: &mut [i16], x0: &[i16], x1: &[i16], ifact_q2: i32) {
    debug_assert!((0..=4).contains(&ifact_q2));

    for ((out, &x0), &x1) in out.iter_mut().zip(x0).zip(x1) {
        let diff = i32::from(x1) - i32::from(x0);
        *out = (i32::from(x0) + ((diff * ifact_q2) >> 2)) as i16;
    }
}

fn find_poly(out: &mut [i32], cos_lsf: &[i32], dd: usize) {
    out[0] = 1 << QA;
    out[1] = -cos_lsf[0];

    for k in 1..dd {
        let ftmp = cos_lsf[2 * k];

        out[k + 1] = (out[k - 1] << 1)
            .wrapping_sub(rshift_round64(i64::from(ftmp) * i64::from(out[k]), QA) as i32);

        for n in (2..=k).rev() {
            let prod = rshift_round64(i64::from(ftmp) * i64::from(out[n - 1]), QA) as i32;
            out[n] = out[n].wrapping_add(out[n - 2]).wrapping_sub(prod);
        }

        out[1] = out[1].wrapping_sub(ftmp);
    }
}

/// Converts NLSFs to a stable Q12 LPC filter.
pub fn nlsf_to_lpc(a_q12: &mut [i16], nlsf_q15: &[i16]) {
    let order = a_q12.len();
    debug_assert!(order == 10 || order == 16);
    debug_assert_eq!(nlsf_q15.len(), order);

    let mut cos_lsf = [0i32; MAX_LPC_ORDER];

    for (&nlsf, &k) in nlsf_q15.iter().zip(ordering(order)) {
        let nlsf = i32::from(nlsf).clamp(0, 32767);

        // Piecewise linear interpolation of the cosine table.
        let f_int = (nlsf >> 8) as usize;
        let f_frac = nlsf - ((f_int as i32) << 8);

        let cos = NLSF_COS_Q12[f_int];
        let delta = NLSF_COS_Q12[f_int + 1] - cos;

        cos_lsf[k] =
            rshift_round64((i64::from(cos) << 8) + i64::from(delta) * i64::from(f_frac), 20 - QA)
                as i32;
    }

    let dd = order / 2;

    let mut p = [0i32; MAX_LPC_ORDER / 2 + 1];
    let mut q = [0i32; MAX_LPC_ORDER / 2 + 1];

    find_poly(&mut p[..=dd], &cos_lsf[..order], dd);
    find_poly(&mut q[..=dd], &cos_lsf[1..order], dd);

    let mut a32_qa1 = [0i32; MAX_LPC_ORDER];

    for k in 0..dd {
        let ptmp = p[k + 1].wrapping_add(p[k]);
        let qtmp = q[k + 1].wrapping_sub(q[k]);

        a32_qa1[k] = qtmp.wrapping_neg().wrapping_sub(ptmp);
        a32_qa1[order - k - 1] = qtmp.wrapping_sub(ptmp);
    }

    let a32_qa1 = &mut a32_qa1[..order];

    lpc_fit(a_q12, a32_qa1, 12, QA + 1);

    for i in 0..MAX_LPC_STABILIZE_ITERATIONS {
        if inverse_pred_gain(a_q12) != 0 {
            return;
        }

        bwexpander_32(a32_qa1, 65536 - (2 << i));

        for (a, &a32) in a_q12.iter_mut().zip(a32_qa1.iter()) {
            *a = rshift_round(a32, QA + 1 - 12) as i16;
        }
    }
}

#[inline(always)]
fn smlaaw(a: i32, b: i32, c: i32) -> i32 {
    return a.wrapping_add(((i64::from(b) * i64::from(c)) >> 16) as i32);
}

fn eval_poly(poly: &[i32], x: i32) -> i32 {
    let x_q16 = x << 4;
    let (last, rest) = poly.split_last().map_or((0, poly), |(&l, r)| (l, r));

    return rest.iter().rev().fold(last, |y, &p| smlaaw(p, y, x_q16));
}

fn transform_poly(poly: &mut [i32], dd: usize) {
    for k in 2..=dd {
        for n in (k + 1..=dd).rev() {
            poly[n - 2] = poly[n - 2].wrapping_sub(poly[n]);
        }

        poly[k - 2] = poly[k - 2].wrapping_sub(poly[k] << 1);
    }
}

fn init_polys(a_q16: &[i32], p: &mut [i32], q: &mut [i32], dd: usize) {
    p[dd] = 1 << 16;
    q[dd] = 1 << 16;

    for k in 0..dd {
        p[k] = -a_q16[dd - k - 1] - a_q16[dd + k];
        q[k] = -a_q16[dd - k - 1] + a_q16[dd + k];
    }

    // Divide out the trivial roots at z = -1 and z = 1.
    for k in (1..=dd).rev() {
        p[k - 1] -= p[k];
        q[k - 1] += q[k];
    }

    transform_poly(p, dd);
    transform_poly(q, dd);
}

/// Converts a Q16 LPC filter to NLSFs in Q15 by searching the roots of the symmetric and
/// antisymmetric polynomials on the cosine grid.
///
/// If roots cannot be found the filter is bandwidth expanded and the search repeated. As a last
/// resort the NLSFs are spread uniformly.
pub fn lpc_to_nlsf(nlsf_q15: &mut [i16], a_q16: &mut [i32]) {
    let d = nlsf_q15.len();
    debug_assert!(d % 2 == 0 && d <= MAX_LPC_ORDER);
    debug_assert_eq!(a_q16.len(), d);

    let dd = d / 2;

    let mut p = [0i32; MAX_LPC_ORDER / 2 + 1];
    let mut q = [0i32; MAX_LPC_ORDER / 2 + 1];

    let mut iteration = 0;

    'search: loop {
        init_polys(a_q16, &mut p, &mut q, dd);

        let polys: [&[i32]; 2] = [&p[..=dd], &q[..=dd]];

        let mut xlo = NLSF_COS_Q12[0];
        let mut ylo = eval_poly(polys[0], xlo);
        let mut root_ix = 0;

        if ylo < 0 {
            // Set the first NLSF to zero and move on to the next root.
            nlsf_q15[0] = 0;
            root_ix = 1;
            ylo = eval_poly(polys[1], xlo);
        }

        let mut k = 1;
        let mut thr = 0;

        while root_ix < d {
            if k > NLSF_COS_TABLE_SIZE {
                iteration += 1;

                if iteration > MAX_A2NLSF_ITERATIONS {
                    let spacing = ((1 << 15) / (d as i32 + 1)) as i16;

                    for (i, nlsf) in nlsf_q15.iter_mut().enumerate() {
                        *nlsf = spacing * (i as i16 + 1);
                    }

                    return;
                }

                bwexpander_32(a_q16, 65536 - (1 << iteration));
                continue 'search;
            }

            let poly = polys[root_ix & 1];

            let mut xhi = NLSF_COS_Q12[k];
            let mut yhi = eval_poly(poly, xhi);

            if (ylo <= 0 && yhi >= thr) || (ylo >= 0 && yhi <= -thr) {
                thr = if yhi == 0 { 1 } else { 0 };

                // Binary division.
                let mut ffrac = -256;

                for m in 0..BIN_DIV_STEPS {
                    let xmid = rshift_round(xlo + xhi, 1);
                    let ymid = eval_poly(poly, xmid);

                    if (ylo <= 0 && ymid >= 0) || (ylo >= 0 && ymid <= 0) {
                        xhi = xmid;
                        yhi = ymid;
                    }
                    else {
                        xlo = xmid;
                        ylo = ymid;
                        ffrac += 128 >> m;
                    }
                }

                // Linear interpolation of the remaining fraction.
                if ylo.abs() < 65536 {
                    let den = ylo - yhi;

                    if den != 0 {
                        let nom = (ylo << (8 - BIN_DIV_STEPS)) + (den >> 1);
                        ffrac += nom / den;
                    }
                }
                else {
                    let den = (ylo - yhi) >> (8 - BIN_DIV_STEPS);

                    if den != 0 {
                        ffrac += ylo / den;
                    }
                }

                nlsf_q15[root_ix] = (((k as i32) << 8) + ffrac).clamp(0, 32767) as i16;

                root_ix += 1;

                if root_ix >= d {
                    break;
                }

                // Alternate between the polynomials.
                xlo = NLSF_COS_Q12[k - 1];
                ylo = (1 - (root_ix & 2) as i32) << 12;
            }
            else {
                k += 1;
                xlo = xhi;
                ylo = yhi;
                thr = 0;
            }
        }

        return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_stable(nlsf: &[i16]) {
        let dmin = delta_min(nlsf.len());
        let l = nlsf.len();

        assert!(i32::from(nlsf[0]) >= dmin[0]);

        for i in 1..l {
            assert!(
                i32::from(nlsf[i]) - i32::from(nlsf[i - 1]) >= dmin[i],
                "nlsf={:?} i={}",
                nlsf,
                i
            );
        }

        assert!(i32::from(nlsf[l - 1]) <= (1 << 15) - dmin[l]);
    }

    #[test]
    fn verify_stabilize_separates_close_values() {
        let mut nlsf = [3000i16, 3001, 6000, 9000, 12000, 15000, 18000, 21000, 24000, 24001];
        stabilize(&mut nlsf, delta_min(10));
        assert_stable(&nlsf);
    }

    #[test]
    fn verify_interpolate() {
        let x0 = [0i16, 1000, 2000];
        let x1 = [400i16, 2000, 1000];
        let mut out = [0i16; 3];

        interpolate(&mut out, &x0, &x1, 0);
        assert_eq!(out, x0);

        interpolate(&mut out, &x0, &x1, 4);
        assert_eq!(out, x1);

        interpolate(&mut out, &x0, &x1, 1);
        assert_eq!(out, [100, 1250, 1750]);
    }

    #[test]
    fn verify_nlsf_to_lpc_is_stable() {
        for order in [10, 16] {
            for s in 0..NLSF_CB1_SIZE {
                let mut nlsf = [0i16; 16];
                let mut ind = [0i8; 17];
                ind[0] = s as i8;
                ind[1..=order].iter_mut().enumerate().for_each(|(i, v)| *v = (i % 3) as i8 - 1);

                decode(&mut nlsf[..order], &ind[..order + 1]);
                assert_stable(&nlsf[..order]);

                let mut a_q12 = [0i16; 16];
                nlsf_to_lpc(&mut a_q12[..order], &nlsf[..order]);
                assert!(inverse_pred_gain(&a_q12[..order]) > 0);
            }
        }
    }

    #[test]
    fn verify_lpc_to_nlsf_inverts_nlsf_to_lpc() {
        for order in [10, 16] {
            let mut nlsf = [0i16; 16];
            let mut ind = [0i8; 17];
            ind[0] = 9;

            decode(&mut nlsf[..order], &ind[..order + 1]);

            let mut a_q12 = [0i16; 16];
            nlsf_to_lpc(&mut a_q12[..order], &nlsf[..order]);

            let mut a_q16 = [0i32; 16];
            a_q16.iter_mut().zip(a_q12.iter()).for_each(|(d, &s)| *d = i32::from(s) << 4);

            let mut back = [0i16; 16];
            lpc_to_nlsf(&mut back[..order], &mut a_q16[..order]);

            for (&x, &y) in nlsf[..order].iter().zip(back[..order].iter()) {
                assert!((i32::from(x) - i32::from(y)).abs() < 200, "{:?} vs {:?}", nlsf, back);
            }
        }
    }

    #[test]
    fn verify_lpc_to_nlsf_of_flat_filter() {
        // A zero filter has uniformly spaced line spectral frequencies.
        let mut a_q16 = [0i32; 10];
        let mut nlsf = [0i16; 10];

        lpc_to_nlsf(&mut nlsf, &mut a_q16);

        for (i, &x) in nlsf.iter().enumerate() {
            let expected = (i as i32 + 1) * 32768 / 11;
            assert!((i32::from(x) - expected).abs() < 100, "nlsf={:?}", nlsf);
        }
    }

    #[test]
    fn verify_decode_of_stage1_vector() {
        // Zero residuals reconstruct the stage-1 vector itself.
        let mut nlsf = [0i16; 10];
        decode(&mut nlsf, &[0; 11]);

        let expected: Vec<i16> = NLSF_CB1_NB_MB_Q8[0].iter().map(|&c| i16::from(c) << 7).collect();
        assert_eq!(&nlsf[..], &expected[..]);
    }

    #[test]
    fn verify_residuals_are_predicted_backwards() {
        for order in [10, 16] {
            let mut ind = [0i8; 17];
            ind[0] = 5;
            ind[order] = 3;

            let mut res_q10 = [0i32; 16];
            dequantize_residuals(&mut res_q10[..order], &ind[1..=order], 5);

            // The last residual carries into each earlier one through its predictor.
            let step = step_q16(order);
            assert_eq!(res_q10[order - 1], residual_level_q10(3, step));

            for i in (0..order - 1).rev() {
                let pred = residual_pred_q8(order, 5, i);
                assert!(pred > 0);
                assert_eq!(res_q10[i], (res_q10[i + 1] * pred) >> 8);
            }
        }
    }

    #[test]
    fn verify_residual_rates() {
        let rates = &LSF_S2_BITS_Q5[0];

        assert_eq!(residual_rates_q5(0, rates), (rates[4], rates[5]));
        assert_eq!(residual_rates_q5(3, rates), (rates[7], EXT_RATE_Q5));
        assert_eq!(residual_rates_q5(-4, rates), (EXT_RATE_Q5, rates[1]));

        // Each step into the extension costs the same.
        assert_eq!(residual_rates_q5(4, rates), (EXT_RATE_Q5, EXT_RATE_Q5 + EXT_STEP_RATE_Q5));
        assert_eq!(residual_rates_q5(-6, rates), (EXT_RATE_Q5 + 2 * EXT_STEP_RATE_Q5, EXT_RATE_Q5 + EXT_STEP_RATE_Q5));
    }

    #[test]
    fn verify_trellis_trades_rate_for_error() {
        let x_q10 = [300, -250, 600, -120, 40, 900, -700, 220, 150, -60];
        let w_q5 = [40; 10];

        let error = |ind: &[i8]| -> i64 {
            let mut res_q10 = [0i32; 10];
            dequantize_residuals(&mut res_q10, ind, 3);
            return res_q10.iter().zip(&x_q10).map(|(&a, &b)| i64::from(a - b).pow(2)).sum();
        };

        let mut exact = [0i8; 10];
        quantize_residuals(&mut exact, &x_q10, &w_q5, 3, 0);

        let mut cheap = [0i8; 10];
        quantize_residuals(&mut cheap, &x_q10, &w_q5, 3, 1 << 20);

        assert!(exact.iter().all(|&i| i32::from(i).abs() <= MAX_RESIDUAL_INDEX));

        // Ignoring rate, every residual lands within one step of its target.
        let step_q10 = i64::from(STEP_NB_MB_Q16 >> 6);
        assert!(error(&exact) <= 10 * step_q10 * step_q10, "{:?}", exact);

        // A heavy rate penalty gives smaller indices at a larger error.
        let magnitude = |ind: &[i8]| ind.iter().map(|&i| i32::from(i).abs()).sum::<i32>();
        assert!(magnitude(&cheap) < magnitude(&exact));
        assert!(error(&cheap) >= error(&exact));
    }

    #[test]
    fn verify_quantize_matches_decode() {
        for order in [10, 16] {
            let mut target = [0i16; 16];
            let mut ind = [0i8; 17];
            ind[0] = 7;
            decode(&mut target[..order], &ind[..order + 1]);

            // Perturb the target away from the codebook vector.
            for (i, x) in target[..order].iter_mut().enumerate() {
                *x += if i % 2 == 0 { 150 } else { -90 };
            }

            let mut w_q2 = [0i32; 16];
            laroia_weights(&mut w_q2[..order], &target[..order]);

            let mut quantized = target;
            let mut ind = [0i8; 17];
            quantize(&mut quantized[..order], &mut ind[..order + 1], &w_q2[..order], 3146, 8, false);

            let mut decoded = [0i16; 16];
            decode(&mut decoded[..order], &ind[..order + 1]);
            assert_eq!(decoded, quantized);

            assert!(ind[1..=order].iter().all(|&i| i32::from(i).abs() <= MAX_RESIDUAL_INDEX));

            let mean_err = target[..order]
                .iter()
                .zip(quantized[..order].iter())
                .map(|(&a, &b)| (i32::from(a) - i32::from(b)).abs())
                .sum::<i32>()
                / order as i32;

            assert!(mean_err < 400, "mean_err={}", mean_err);
        }
    }

    #[test]
    fn verify_laroia_weights() {
        let nlsf = [4096i16, 8192, 8448, 16384];
        let mut w_q2 = [0i32; 4];
        laroia_weights(&mut w_q2, &nlsf);

        assert_eq!(w_q2[0], 32 + 32);
        assert_eq!(w_q2[1], 32 + 512);
        assert_eq!(w_q2[3], 16 + 8);

        // Closely spaced NLSFs weigh the most.
        assert!(w_q2[1] > w_q2[0] && w_q2[2] > w_q2[3]);
    }

    proptest! {
        #[test]
        fn prop_stabilize_enforces_spacing(mut nlsf in proptest::collection::vec(0i16..32767, 16)) {
            stabilize(&mut nlsf, delta_min(16));
            assert_stable(&nlsf);
        }
    }
}
