// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delayed-decision quantizer.
//!
//! Every candidate sequence spawns two children per sample, one for each of the two nearest
//! reconstruction levels. The best child of every candidate survives, and the worst survivor is
//! replaced by the best runner-up if that one is cheaper. A sample is only committed once it is
//! `decision_delay` samples old, taken from the candidate that is currently the cheapest.

use itertools::Itertools;

use super::*;
use crate::config::MAX_DEL_DEC_STATES;

/// Largest delay, in samples, between quantizing a sample and committing to it.
const DECISION_DELAY: usize = 40;

/// Cost added to candidates that can no longer be chosen without contradicting committed output.
const RD_PENALTY_Q10: i32 = i32::MAX >> 4;

/// One candidate quantization sequence.
#[derive(Clone)]
struct Candidate {
    s_lpc_q14: [i32; MAX_SUB_FRAME_LENGTH + NSQ_LPC_BUF_LENGTH],
    // Rings of the not yet committed samples, indexed by the shared sample buffer index.
    rand_state: [i32; DECISION_DELAY],
    q_q10: [i32; DECISION_DELAY],
    xq_q14: [i32; DECISION_DELAY],
    pred_q15: [i32; DECISION_DELAY],
    shape_q14: [i32; DECISION_DELAY],
    s_ar2_q14: [i32; MAX_SHAPE_LPC_ORDER],
    lf_ar_q14: i32,
    diff_q14: i32,
    seed: i32,
    seed_init: i32,
    rd_q10: i32,
}

impl Default for Candidate {
    fn default() -> Self {
        return Candidate {
            s_lpc_q14: [0; MAX_SUB_FRAME_LENGTH + NSQ_LPC_BUF_LENGTH],
            rand_state: [0; DECISION_DELAY],
            q_q10: [0; DECISION_DELAY],
            xq_q14: [0; DECISION_DELAY],
            pred_q15: [0; DECISION_DELAY],
            shape_q14: [0; DECISION_DELAY],
            s_ar2_q14: [0; MAX_SHAPE_LPC_ORDER],
            lf_ar_q14: 0,
            diff_q14: 0,
            seed: 0,
            seed_init: 0,
            rd_q10: 0,
        };
    }
}

/// A child of a candidate: the candidate extended by one quantized sample.
#[derive(Clone, Copy, Default)]
struct Child {
    q_q10: i32,
    rd_q10: i32,
    xq_q14: i32,
    lf_ar_q14: i32,
    diff_q14: i32,
    ltp_shp_q14: i32,
    lpc_exc_q14: i32,
}

/// Position in the candidate rings, shared by all candidates.
struct DelayLine {
    smpl_buf_idx: usize,
    decision_delay: usize,
    delayed_gain_q10: [i32; DECISION_DELAY],
}

impl DelayLine {
    /// Ring index of the oldest uncommitted sample, `i + 1` samples after the newest.
    fn oldest(&self) -> usize {
        return (self.smpl_buf_idx + self.decision_delay) % DECISION_DELAY;
    }
}

fn decision_delay(geom: &FrameGeometry, ctrl: &FrameControl, voiced: bool, lag_prev: i32) -> usize {
    let mut delay = DECISION_DELAY.min(geom.subfr_length);

    // The long-term predictor must only ever see committed samples.
    let lags: &[i32] = if voiced { &ctrl.synth.pitch_l[..geom.nb_subfr] } else { &[lag_prev] };

    for &lag in lags.iter().filter(|&&lag| lag > 0) {
        delay = delay.min((lag - LTP_ORDER as i32 / 2 - 1).max(0) as usize);
    }

    return delay;
}

fn cheapest(candidates: &[Candidate]) -> usize {
    return candidates.iter().position_min_by_key(|c| c.rd_q10).unwrap_or(0);
}

pub(super) fn quantize(
    nsq: &mut NsqState,
    geom: &FrameGeometry,
    ctrl: &FrameControl,
    indices: &mut SideInfoIndices,
    x16: &[i16],
    pulses: &mut [i8],
    n_states: usize,
    shaping_order: usize,
    warping_q16: i32,
) {
    let len = geom.subfr_length;
    let n_states = n_states.clamp(1, MAX_DEL_DEC_STATES);
    let voiced = indices.signal_type == SignalType::Voiced;

    let mut arena: [Candidate; MAX_DEL_DEC_STATES] = std::array::from_fn(|_| Candidate::default());
    let candidates = &mut arena[..n_states];

    for (k, c) in candidates.iter_mut().enumerate() {
        c.seed = (k as i32 + i32::from(indices.seed)) & 3;
        c.seed_init = c.seed;
        c.lf_ar_q14 = nsq.s_lf_ar_shp_q14;
        c.diff_q14 = nsq.s_diff_shp_q14;
        c.shape_q14[0] = nsq.s_ltp_shp_q14[geom.ltp_mem_length - 1];
        c.s_lpc_q14[..NSQ_LPC_BUF_LENGTH].copy_from_slice(&nsq.s_lpc_q14[..NSQ_LPC_BUF_LENGTH]);
        c.s_ar2_q14 = nsq.s_ar2_q14;
    }

    let mut lag = nsq.lag_prev;

    let mut delay = DelayLine {
        smpl_buf_idx: 0,
        decision_delay: decision_delay(geom, ctrl, voiced, lag),
        delayed_gain_q10: [0; DECISION_DELAY],
    };

    let mut s_ltp_q15 = [0i32; 2 * MAX_FRAME_LENGTH];
    let mut s_ltp = [0i16; 2 * MAX_FRAME_LENGTH];
    let mut x_sc_q10 = [0i32; MAX_SUB_FRAME_LENGTH];

    nsq.s_ltp_shp_buf_idx = geom.ltp_mem_length;
    nsq.s_ltp_buf_idx = geom.ltp_mem_length;

    // Subframes quantized since the delay line was last flushed.
    let mut subfr = 0;

    for k in 0..geom.nb_subfr {
        if voiced {
            lag = ctrl.synth.pitch_l[k];
        }

        let filters = SubframeFilters::new(geom, ctrl, indices, k, lag, shaping_order);

        nsq.rewhite_flag = false;

        if voiced && needs_rewhitening(indices, k) {
            if k == 2 {
                // Re-whitening needs the output of the first half, so commit to a winner now.
                let winner = cheapest(candidates);

                for (i, c) in candidates.iter_mut().enumerate() {
                    if i != winner {
                        c.rd_q10 = add_sat32(c.rd_q10, RD_PENALTY_Q10);
                    }
                }

                let gain_q10 = ctrl.synth.gains_q16[1] >> 6;
                flush(nsq, &candidates[winner], &delay, pulses, k * len, geom.ltp_mem_length + k * len, gain_q10);

                subfr = 0;
            }

            rewhiten(nsq, geom, &mut s_ltp, filters.a_q12, lag, k);

            nsq.rewhite_flag = true;
            nsq.s_ltp_buf_idx = geom.ltp_mem_length;
        }

        let x_sc_q10 = &mut x_sc_q10[..len];

        let gain_adj_q16 = scale_histories(
            nsq,
            geom,
            ctrl,
            voiced,
            k,
            &x16[k * len..(k + 1) * len],
            x_sc_q10,
            &s_ltp,
            &mut s_ltp_q15,
            delay.decision_delay,
        );

        if let Some(gain_adj_q16) = gain_adj_q16 {
            for c in candidates.iter_mut() {
                c.lf_ar_q14 = smulww(gain_adj_q16, c.lf_ar_q14);
                c.diff_q14 = smulww(gain_adj_q16, c.diff_q14);

                let states = c.s_lpc_q14[..NSQ_LPC_BUF_LENGTH]
                    .iter_mut()
                    .chain(c.s_ar2_q14.iter_mut())
                    .chain(c.pred_q15.iter_mut())
                    .chain(c.shape_q14.iter_mut());

                for v in states {
                    *v = smulww(gain_adj_q16, *v);
                }
            }
        }

        quantize_subframe(
            nsq,
            candidates,
            &filters,
            x_sc_q10,
            pulses,
            k * len,
            geom.ltp_mem_length + k * len,
            &mut s_ltp_q15,
            &mut delay,
            subfr,
            warping_q16,
        );

        subfr += 1;
    }

    let winner = &candidates[cheapest(candidates)];

    indices.seed = winner.seed_init as u8;

    let gain_q10 = ctrl.synth.gains_q16[geom.nb_subfr - 1] >> 6;
    flush(nsq, winner, &delay, pulses, geom.frame_length, geom.ltp_mem_length + geom.frame_length, gain_q10);

    nsq.s_lpc_q14[..NSQ_LPC_BUF_LENGTH].copy_from_slice(&winner.s_lpc_q14[..NSQ_LPC_BUF_LENGTH]);
    nsq.s_ar2_q14 = winner.s_ar2_q14;
    nsq.s_lf_ar_shp_q14 = winner.lf_ar_q14;
    nsq.s_diff_shp_q14 = winner.diff_q14;
    nsq.lag_prev = ctrl.synth.pitch_l[geom.nb_subfr - 1];

    let history = geom.frame_length..geom.frame_length + geom.ltp_mem_length;
    nsq.xq.copy_within(history.clone(), 0);
    nsq.s_ltp_shp_q14.copy_within(history, 0);
}

/// Commits the uncommitted samples of `winner`, which end just before `pulses_end` and `xq_end`.
fn flush(
    nsq: &mut NsqState,
    winner: &Candidate,
    delay: &DelayLine,
    pulses: &mut [i8],
    pulses_end: usize,
    xq_end: usize,
    gain_q10: i32,
) {
    let dd = delay.decision_delay;
    let mut last = delay.oldest();

    for i in 0..dd {
        last = (last + DECISION_DELAY - 1) % DECISION_DELAY;

        pulses[pulses_end - dd + i] = rshift_round(winner.q_q10[last], 10) as i8;
        nsq.xq[xq_end - dd + i] = scale_output(winner.xq_q14[last], gain_q10);
        nsq.s_ltp_shp_q14[nsq.s_ltp_shp_buf_idx - dd + i] = winner.shape_q14[last];
    }
}

/// Noise shaping AR filter on a frequency-warped delay line. Returns the shaping signal in Q12.
///
/// With a zero warping coefficient this is the plain AR filter.
fn warped_shaping(c: &mut Candidate, ar_shp_q13: &[i16], warping_q16: i32) -> i32 {
    let order = ar_shp_q13.len();
    debug_assert!(order % 2 == 0 && order >= 2);

    let s = &mut c.s_ar2_q14;

    let mut tmp2 = smlawb(c.diff_q14, s[0], warping_q16);
    let mut tmp1 = smlawb(s[0], s[1].wrapping_sub(tmp2), warping_q16);
    s[0] = tmp2;

    let mut out = (order >> 1) as i32;
    out = smlawb(out, tmp2, i32::from(ar_shp_q13[0]));

    for j in (2..order).step_by(2) {
        tmp2 = smlawb(s[j - 1], s[j].wrapping_sub(tmp1), warping_q16);
        s[j - 1] = tmp1;
        out = smlawb(out, tmp1, i32::from(ar_shp_q13[j - 1]));

        tmp1 = smlawb(s[j], s[j + 1].wrapping_sub(tmp2), warping_q16);
        s[j] = tmp2;
        out = smlawb(out, tmp2, i32::from(ar_shp_q13[j]));
    }

    s[order - 1] = tmp1;
    out = smlawb(out, tmp1, i32::from(ar_shp_q13[order - 1]));

    return out << 1;
}

fn quantize_subframe(
    nsq: &mut NsqState,
    candidates: &mut [Candidate],
    f: &SubframeFilters<'_>,
    x_sc_q10: &[i32],
    pulses: &mut [i8],
    pulses_offset: usize,
    xq_offset: usize,
    s_ltp_q15: &mut [i32],
    delay: &mut DelayLine,
    subfr: usize,
    warping_q16: i32,
) {
    let mut children = [[Child::default(); 2]; MAX_DEL_DEC_STATES];

    let lag = f.lag.max(0) as usize;
    let dd = delay.decision_delay;

    let mut shp_lag_ptr = nsq.s_ltp_shp_buf_idx + HARM_SHAPE_FIR_TAPS / 2 - lag;
    let mut pred_lag_ptr = nsq.s_ltp_buf_idx + LTP_ORDER / 2 - lag;

    let gain_q10 = f.gain_q16 >> 6;

    for (i, &x_sc) in x_sc_q10.iter().enumerate() {
        let ltp_pred_q14 = if f.voiced {
            let pred = ltp_prediction(s_ltp_q15, pred_lag_ptr, f.b_q14) << 1;
            pred_lag_ptr += 1;
            pred
        }
        else {
            0
        };

        let n_ltp_q14 = if lag > 0 {
            let n = harmonic_shaping(&nsq.s_ltp_shp_q14, shp_lag_ptr, f.harm_shape_fir_packed_q14);
            shp_lag_ptr += 1;
            ltp_pred_q14.wrapping_sub(n << 1)
        }
        else {
            0
        };

        for (c, child) in candidates.iter_mut().zip(children.iter_mut()) {
            c.seed = silk_rand(c.seed);

            let lpc_pred_q10 = short_prediction(&c.s_lpc_q14, NSQ_LPC_BUF_LENGTH - 1 + i, f.a_q12);
            let lpc_pred_q14 = lshift_sat32(lpc_pred_q10, 4);

            let mut n_ar_q14 = warped_shaping(c, f.ar_shp_q13, warping_q16);
            n_ar_q14 = smlawb(n_ar_q14, c.lf_ar_q14, f.tilt_q14) << 2;

            let mut n_lf_q14 = smulwb(c.shape_q14[delay.smpl_buf_idx], f.lf_shp_q14);
            n_lf_q14 = smlawt(n_lf_q14, c.lf_ar_q14, f.lf_shp_q14) << 2;

            let shaping_q14 = add_sat32(n_ar_q14, n_lf_q14);
            let pred_q14 = n_ltp_q14.wrapping_add(lpc_pred_q14);
            let pred_q10 = rshift_round(sub_sat32(pred_q14, shaping_q14), 4);

            let mut r_q10 = x_sc.wrapping_sub(pred_q10);

            if c.seed < 0 {
                r_q10 = r_q10.wrapping_neg();
            }

            r_q10 = limit(r_q10, -(31 << 10), 30 << 10);

            let levels = quantization_candidates(r_q10, f.offset_q10, f.lambda_q10);

            for (child, (q_q10, rd_q20)) in child.iter_mut().zip(levels) {
                let mut exc_q14 = q_q10 << 4;

                if c.seed < 0 {
                    exc_q14 = exc_q14.wrapping_neg();
                }

                let lpc_exc_q14 = exc_q14.wrapping_add(ltp_pred_q14);
                let xq_q14 = add_sat32(lpc_exc_q14, lpc_pred_q14);
                let diff_q14 = xq_q14.wrapping_sub(x_sc << 4);
                let lf_ar_q14 = diff_q14.wrapping_sub(n_ar_q14);

                *child = Child {
                    q_q10,
                    rd_q10: c.rd_q10.wrapping_add(rshift_round(rd_q20, 10)),
                    xq_q14,
                    lf_ar_q14,
                    diff_q14,
                    ltp_shp_q14: lf_ar_q14.wrapping_sub(n_lf_q14),
                    lpc_exc_q14,
                };
            }
        }

        let children = &mut children[..candidates.len()];

        delay.smpl_buf_idx = (delay.smpl_buf_idx + DECISION_DELAY - 1) % DECISION_DELAY;
        let last = delay.oldest();

        let winner = children.iter().position_min_by_key(|child| child[0].rd_q10).unwrap_or(0);

        // Candidates that disagree with the winner on the sample about to be committed are kept
        // out of future wins.
        let winner_seed = candidates[winner].rand_state[last];

        for (c, child) in candidates.iter().zip(children.iter_mut()) {
            if c.rand_state[last] != winner_seed {
                child[0].rd_q10 = add_sat32(child[0].rd_q10, RD_PENALTY_Q10);
                child[1].rd_q10 = add_sat32(child[1].rd_q10, RD_PENALTY_Q10);
            }
        }

        let worst = children.iter().position_max_by_key(|child| child[0].rd_q10).unwrap_or(0);
        let best_runner_up = children.iter().position_min_by_key(|child| child[1].rd_q10).unwrap_or(0);

        if children[best_runner_up][1].rd_q10 < children[worst][0].rd_q10 {
            candidates[worst] = candidates[best_runner_up].clone();
            children[worst][0] = children[best_runner_up][1];
        }

        if subfr > 0 || i >= dd {
            let w = &candidates[winner];

            pulses[pulses_offset + i - dd] = rshift_round(w.q_q10[last], 10) as i8;
            nsq.xq[xq_offset + i - dd] = scale_output(w.xq_q14[last], delay.delayed_gain_q10[last]);
            nsq.s_ltp_shp_q14[nsq.s_ltp_shp_buf_idx - dd] = w.shape_q14[last];
            s_ltp_q15[nsq.s_ltp_buf_idx - dd] = w.pred_q15[last];
        }

        nsq.s_ltp_shp_buf_idx += 1;
        nsq.s_ltp_buf_idx += 1;

        let idx = delay.smpl_buf_idx;

        for (c, child) in candidates.iter_mut().zip(children.iter()) {
            let chosen = child[0];

            c.lf_ar_q14 = chosen.lf_ar_q14;
            c.diff_q14 = chosen.diff_q14;
            c.s_lpc_q14[NSQ_LPC_BUF_LENGTH + i] = chosen.xq_q14;
            c.xq_q14[idx] = chosen.xq_q14;
            c.q_q10[idx] = chosen.q_q10;
            c.pred_q15[idx] = chosen.lpc_exc_q14 << 1;
            c.shape_q14[idx] = chosen.ltp_shp_q14;
            c.seed = c.seed.wrapping_add(rshift_round(chosen.q_q10, 10));
            c.rand_state[idx] = c.seed;
            c.rd_q10 = chosen.rd_q10;
        }

        delay.delayed_gain_q10[idx] = gain_q10;
    }

    let len = x_sc_q10.len();

    for c in candidates.iter_mut() {
        c.s_lpc_q14.copy_within(len..len + NSQ_LPC_BUF_LENGTH, 0);
    }
}
