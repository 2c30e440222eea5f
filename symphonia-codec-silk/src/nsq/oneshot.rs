// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::*;

/// Quantizes a frame deciding every sample as soon as it is seen.
pub(super) fn quantize(
    nsq: &mut NsqState,
    geom: &FrameGeometry,
    ctrl: &FrameControl,
    indices: &mut SideInfoIndices,
    x16: &[i16],
    pulses: &mut [i8],
    shaping_order: usize,
) {
    let len = geom.subfr_length;

    nsq.rand_seed = i32::from(indices.seed);

    let mut lag = nsq.lag_prev;

    let mut s_ltp_q15 = [0i32; 2 * MAX_FRAME_LENGTH];
    let mut s_ltp = [0i16; 2 * MAX_FRAME_LENGTH];
    let mut x_sc_q10 = [0i32; MAX_SUB_FRAME_LENGTH];

    nsq.s_ltp_shp_buf_idx = geom.ltp_mem_length;
    nsq.s_ltp_buf_idx = geom.ltp_mem_length;

    for k in 0..geom.nb_subfr {
        let voiced = indices.signal_type == SignalType::Voiced;

        if voiced {
            lag = ctrl.synth.pitch_l[k];
        }

        let filters = SubframeFilters::new(geom, ctrl, indices, k, lag, shaping_order);

        nsq.rewhite_flag = false;

        if voiced && needs_rewhitening(indices, k) {
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
            0,
        );

        if let Some(gain_adj_q16) = gain_adj_q16 {
            nsq.s_lf_ar_shp_q14 = smulww(gain_adj_q16, nsq.s_lf_ar_shp_q14);
            nsq.s_diff_shp_q14 = smulww(gain_adj_q16, nsq.s_diff_shp_q14);

            for v in nsq.s_lpc_q14[..NSQ_LPC_BUF_LENGTH].iter_mut().chain(nsq.s_ar2_q14.iter_mut()) {
                *v = smulww(gain_adj_q16, *v);
            }
        }

        quantize_subframe(
            nsq,
            &filters,
            x_sc_q10,
            &mut pulses[k * len..(k + 1) * len],
            &mut s_ltp_q15,
            geom.ltp_mem_length + k * len,
        );
    }

    nsq.lag_prev = ctrl.synth.pitch_l[geom.nb_subfr - 1];

    let history = geom.frame_length..geom.frame_length + geom.ltp_mem_length;
    nsq.xq.copy_within(history.clone(), 0);
    nsq.s_ltp_shp_q14.copy_within(history, 0);
}

/// Noise shaping AR filter. Returns the shaping signal in Q12.
fn shaping_feedback(diff_q14: i32, s_ar2_q14: &mut [i32], ar_shp_q13: &[i16]) -> i32 {
    let order = ar_shp_q13.len();
    debug_assert!(order % 2 == 0 && order >= 2);

    let mut tmp2 = diff_q14;
    let mut tmp1 = s_ar2_q14[0];
    s_ar2_q14[0] = tmp2;

    let mut out = (order >> 1) as i32;
    out = smlawb(out, tmp2, i32::from(ar_shp_q13[0]));

    for j in (2..order).step_by(2) {
        tmp2 = s_ar2_q14[j - 1];
        s_ar2_q14[j - 1] = tmp1;
        out = smlawb(out, tmp1, i32::from(ar_shp_q13[j - 1]));

        tmp1 = s_ar2_q14[j];
        s_ar2_q14[j] = tmp2;
        out = smlawb(out, tmp2, i32::from(ar_shp_q13[j]));
    }

    s_ar2_q14[order - 1] = tmp1;
    out = smlawb(out, tmp1, i32::from(ar_shp_q13[order - 1]));

    return out << 1;
}

fn quantize_subframe(
    nsq: &mut NsqState,
    f: &SubframeFilters<'_>,
    x_sc_q10: &[i32],
    pulses: &mut [i8],
    s_ltp_q15: &mut [i32],
    xq_offset: usize,
) {
    let lag = f.lag.max(0) as usize;

    let mut shp_lag_ptr = nsq.s_ltp_shp_buf_idx + HARM_SHAPE_FIR_TAPS / 2 - lag;
    let mut pred_lag_ptr = nsq.s_ltp_buf_idx + LTP_ORDER / 2 - lag;

    let gain_q10 = f.gain_q16 >> 6;

    for (i, (&x_sc, pulse)) in x_sc_q10.iter().zip(pulses.iter_mut()).enumerate() {
        nsq.rand_seed = silk_rand(nsq.rand_seed);

        let lpc_pred_q10 = short_prediction(&nsq.s_lpc_q14, NSQ_LPC_BUF_LENGTH - 1 + i, f.a_q12);

        let ltp_pred_q13 = if f.voiced {
            let pred = ltp_prediction(s_ltp_q15, pred_lag_ptr, f.b_q14);
            pred_lag_ptr += 1;
            pred
        }
        else {
            0
        };

        let shaping_order = f.ar_shp_q13.len();

        let mut n_ar_q12 =
            shaping_feedback(nsq.s_diff_shp_q14, &mut nsq.s_ar2_q14[..shaping_order], f.ar_shp_q13);
        n_ar_q12 = smlawb(n_ar_q12, nsq.s_lf_ar_shp_q14, f.tilt_q14);

        let mut n_lf_q12 = smulwb(nsq.s_ltp_shp_q14[nsq.s_ltp_shp_buf_idx - 1], f.lf_shp_q14);
        n_lf_q12 = smlawt(n_lf_q12, nsq.s_lf_ar_shp_q14, f.lf_shp_q14);

        // Combined prediction and shaping.
        let pred_q12 = (lpc_pred_q10 << 2).wrapping_sub(n_ar_q12).wrapping_sub(n_lf_q12);

        let pred_q10 = if lag > 0 {
            let n_ltp_q13 =
                harmonic_shaping(&nsq.s_ltp_shp_q14, shp_lag_ptr, f.harm_shape_fir_packed_q14);
            shp_lag_ptr += 1;

            let ltp_q13 = ltp_pred_q13.wrapping_sub(n_ltp_q13);
            rshift_round(ltp_q13.wrapping_add(pred_q12 << 1), 3)
        }
        else {
            rshift_round(pred_q12, 2)
        };

        let mut r_q10 = x_sc.wrapping_sub(pred_q10);

        if nsq.rand_seed < 0 {
            r_q10 = r_q10.wrapping_neg();
        }

        r_q10 = limit(r_q10, -(31 << 10), 30 << 10);

        let [(q_q10, _), _] = quantization_candidates(r_q10, f.offset_q10, f.lambda_q10);

        *pulse = rshift_round(q_q10, 10) as i8;

        let mut exc_q14 = q_q10 << 4;

        if nsq.rand_seed < 0 {
            exc_q14 = exc_q14.wrapping_neg();
        }

        let lpc_exc_q14 = exc_q14.wrapping_add(ltp_pred_q13 << 1);
        let xq_q14 = add_sat32(lpc_exc_q14, lshift_sat32(lpc_pred_q10, 4));

        nsq.xq[xq_offset + i] = scale_output(xq_q14, gain_q10);

        nsq.s_lpc_q14[NSQ_LPC_BUF_LENGTH + i] = xq_q14;
        nsq.s_diff_shp_q14 = xq_q14.wrapping_sub(x_sc << 4);
        nsq.s_lf_ar_shp_q14 = nsq.s_diff_shp_q14.wrapping_sub(n_ar_q12 << 2);
        nsq.s_ltp_shp_q14[nsq.s_ltp_shp_buf_idx] = nsq.s_lf_ar_shp_q14.wrapping_sub(n_lf_q12 << 2);
        s_ltp_q15[nsq.s_ltp_buf_idx] = lpc_exc_q14 << 1;

        nsq.s_ltp_shp_buf_idx += 1;
        nsq.s_ltp_buf_idx += 1;

        nsq.rand_seed = nsq.rand_seed.wrapping_add(i32::from(*pulse));
    }

    let len = x_sc_q10.len();
    nsq.s_lpc_q14.copy_within(len..len + NSQ_LPC_BUF_LENGTH, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_shaping_feedback_shifts_state() {
        let mut state = [0i32; 4];
        let coefs = [8192i16, 0, 0, 0];

        // A unit coefficient on the newest tap passes the input through: 1.0 in Q11, plus the
        // rounding offset, shifted to Q12.
        let out = shaping_feedback(1 << 14, &mut state, &coefs);
        assert_eq!(out, (2 + (1 << 11)) << 1);
        assert_eq!(state, [1 << 14, 0, 0, 0]);

        let out = shaping_feedback(0, &mut state, &coefs);
        assert_eq!(out, 4);
        assert_eq!(state, [0, 1 << 14, 0, 0]);
    }
}
