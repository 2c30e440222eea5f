// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Linear prediction filter utilities.

use crate::fixed::*;

const QA: u32 = 24;
const A_LIMIT: i32 = (((1i64 << QA) * 3999 + 2000) / 4000) as i32;
const MIN_INV_GAIN_Q30: i32 = (((1i64 << 30) + 5000) / 10000) as i32;

/// Computes the LPC residual of `input`.
///
/// The first `order` output samples cannot be predicted from `input` alone and are set to zero.
pub fn analysis_filter(out: &mut [i16], input: &[i16], a_q12: &[i16]) {
    let order = a_q12.len();
    let len = input.len();

    debug_assert!(order % 2 == 0 && order <= len);
    debug_assert!(out.len() >= len);

    for ix in order..len {
        let history = &input[ix - order..ix];

        // History runs oldest to newest while the coefficients run newest to oldest.
        let pred_q12 = history
            .iter()
            .rev()
            .zip(a_q12)
            .fold(0i32, |acc, (&x, &a)| acc.wrapping_add(smulbb(i32::from(x), i32::from(a))));

        let res_q12 = (i32::from(input[ix]) << 12).wrapping_sub(pred_q12);

        out[ix] = sat16(rshift_round(res_q12, 12));
    }

    out[..order].fill(0);
}

/// Computes the inverse prediction gain of a filter in Q30, or 0 if the filter is unstable or
/// too close to instability.
pub fn inverse_pred_gain(a_q12: &[i16]) -> i32 {
    let order = a_q12.len();
    debug_assert!(order > 0 && order <= 24);

    let mut a_qa = [0i32; 24];
    let mut dc_resp = 0;

    for (k, &a) in a_q12.iter().enumerate() {
        dc_resp += i32::from(a);
        a_qa[k] = i32::from(a) << (QA - 12);
    }

    // A DC response of 1 or more implies a root on or outside the unit circle.
    if dc_resp >= 4096 {
        return 0;
    }

    return inverse_pred_gain_qa(&mut a_qa[..order]);
}

#[inline(always)]
fn mul32_frac_q(a: i32, b: i32, q: u32) -> i32 {
    return rshift_round64(i64::from(a) * i64::from(b), q) as i32;
}

/// Step-down recursion computing the reflection coefficients of the filter.
fn inverse_pred_gain_qa(a_qa: &mut [i32]) -> i32 {
    let mut inv_gain_q30 = 1 << 30;

    for k in (1..a_qa.len()).rev() {
        if a_qa[k] > A_LIMIT || a_qa[k] < -A_LIMIT {
            return 0;
        }

        let rc_q31 = -(a_qa[k] << (31 - QA));
        let rc_mult1_q30 = (1 << 30) - smmul(rc_q31, rc_q31);

        inv_gain_q30 = smmul(inv_gain_q30, rc_mult1_q30) << 2;

        if inv_gain_q30 < MIN_INV_GAIN_Q30 {
            return 0;
        }

        let mult2q = 32 - clz32(rc_mult1_q30.abs());
        let rc_mult2 = inverse32_varq(rc_mult1_q30, mult2q + 30);

        for n in 0..(k + 1) >> 1 {
            let tmp1 = a_qa[n];
            let tmp2 = a_qa[k - n - 1];

            let t1 = i64::from(sub_sat32(tmp1, mul32_frac_q(tmp2, rc_q31, 31))) * i64::from(rc_mult2);
            let t1 = rshift_round64(t1, mult2q as u32);

            let t2 = i64::from(sub_sat32(tmp2, mul32_frac_q(tmp1, rc_q31, 31))) * i64::from(rc_mult2);
            let t2 = rshift_round64(t2, mult2q as u32);

            if t1 > i64::from(i32::MAX) || t1 < i64::from(i32::MIN) {
                return 0;
            }

            if t2 > i64::from(i32::MAX) || t2 < i64::from(i32::MIN) {
                return 0;
            }

            a_qa[n] = t1 as i32;
            a_qa[k - n - 1] = t2 as i32;
        }
    }

    if a_qa[0] > A_LIMIT || a_qa[0] < -A_LIMIT {
        return 0;
    }

    let rc_q31 = -(a_qa[0] << (31 - QA));
    let rc_mult1_q30 = (1 << 30) - smmul(rc_q31, rc_q31);

    inv_gain_q30 = smmul(inv_gain_q30, rc_mult1_q30) << 2;

    if inv_gain_q30 < MIN_INV_GAIN_Q30 {
        return 0;
    }

    return inv_gain_q30;
}

/// Chirps (bandwidth expands) a Q12 filter: `a[i] *= chirp^(i + 1)`.
pub fn bwexpander(ar: &mut [i16], chirp_q16: i32) {
    let mut chirp_q16 = chirp_q16;
    let chirp_minus_one_q16 = chirp_q16 - 65536;

    let Some((last, head)) = ar.split_last_mut()
    else {
        return;
    };

    for a in head {
        *a = rshift_round64(i64::from(chirp_q16) * i64::from(*a), 16) as i16;
        chirp_q16 += rshift_round64(i64::from(chirp_q16) * i64::from(chirp_minus_one_q16), 16) as i32;
    }

    *last = rshift_round64(i64::from(chirp_q16) * i64::from(*last), 16) as i16;
}

/// Chirps a filter with 32-bit coefficients.
pub fn bwexpander_32(ar: &mut [i32], chirp_q16: i32) {
    let mut chirp_q16 = chirp_q16;
    let chirp_minus_one_q16 = chirp_q16 - 65536;

    let Some((last, head)) = ar.split_last_mut()
    else {
        return;
    };

    for a in head {
        *a = smulww(chirp_q16, *a);
        chirp_q16 += rshift_round64(i64::from(chirp_q16) * i64::from(chirp_minus_one_q16), 16) as i32;
    }

    *last = smulww(chirp_q16, *last);
}

/// Converts `a_qin` to 16 bits in `a_qout`, chirping the filter until every coefficient fits.
///
/// If the coefficients still do not fit after the maximum number of iterations, they are
/// saturated and `a_qin` is updated to match the saturated values.
pub fn lpc_fit(a_qout: &mut [i16], a_qin: &mut [i32], q_out: u32, q_in: u32) {
    const MAX_ITERATIONS: usize = 10;
    const CHIRP_0_999_Q16: i32 = 65470;

    debug_assert_eq!(a_qout.len(), a_qin.len());
    debug_assert!(q_in > q_out);

    let shift = q_in - q_out;

    for _ in 0..MAX_ITERATIONS {
        let (idx, maxabs) = a_qin
            .iter()
            .map(|a| a.wrapping_abs())
            .enumerate()
            .fold((0, 0), |best, (k, a)| if a > best.1 { (k, a) } else { best });

        let maxabs = rshift_round(maxabs, shift);

        if maxabs <= i32::from(i16::MAX) {
            for (out, &a) in a_qout.iter_mut().zip(a_qin.iter()) {
                *out = rshift_round(a, shift) as i16;
            }

            return;
        }

        let maxabs = i32::min(maxabs, 163838);
        let chirp_q16 = CHIRP_0_999_Q16
            - ((maxabs - i32::from(i16::MAX)) << 14) / ((maxabs * (idx as i32 + 1)) >> 2);

        bwexpander_32(a_qin, chirp_q16);
    }

    for (out, a) in a_qout.iter_mut().zip(a_qin.iter_mut()) {
        *out = sat16(rshift_round(*a, shift));
        *a = i32::from(*out) << shift;
    }
}

/// Second order ARMA filter in transposed direct form II, applied in place.
///
/// The denominator `a_q28` excludes the leading one and is applied with a negative sign.
pub fn biquad_alt(signal: &mut [i16], b_q28: &[i32; 3], a_q28: &[i32; 2], state: &mut [i32; 2]) {
    // Split the negated denominator into a low and an upper part for extra precision.
    let a0_l_q28 = (-a_q28[0]) & 0x3fff;
    let a0_u_q28 = (-a_q28[0]) >> 14;
    let a1_l_q28 = (-a_q28[1]) & 0x3fff;
    let a1_u_q28 = (-a_q28[1]) >> 14;

    for x in signal.iter_mut() {
        let inval = i32::from(*x);
        let out32_q14 = smlawb(state[0], b_q28[0], inval) << 2;

        state[0] = state[1].wrapping_add(rshift_round(smulwb(out32_q14, a0_l_q28), 14));
        state[0] = smlawb(state[0], out32_q14, a0_u_q28);
        state[0] = smlawb(state[0], b_q28[1], inval);

        state[1] = rshift_round(smulwb(out32_q14, a1_l_q28), 14);
        state[1] = smlawb(state[1], out32_q14, a1_u_q28);
        state[1] = smlawb(state[1], b_q28[2], inval);

        *x = sat16(out32_q14.wrapping_add((1 << 14) - 1) >> 14);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{TRANSITION_LP_A_Q28, TRANSITION_LP_B_Q28};

    #[test]
    fn verify_analysis_filter() {
        // A first order predictor x[n] = x[n - 1] leaves only the steps of the input.
        let input = [0i16, 0, 100, 100, 100, 100, 300, 300];
        let mut out = [1i16; 8];
        let mut a_q12 = [0i16; 2];
        a_q12[0] = 4096;

        analysis_filter(&mut out, &input, &a_q12);

        assert_eq!(out, [0, 0, 100, 0, 0, 0, 200, 0]);
    }

    #[test]
    fn verify_inverse_pred_gain() {
        // The empty filter has unity gain.
        assert_eq!(inverse_pred_gain(&[0; 10]), 1 << 30);

        // A pole at z = 0.5 has an inverse gain of 1 - 0.25.
        let mut a = [0i16; 10];
        a[0] = 2048;
        let gain = inverse_pred_gain(&a) as f64 / (1u64 << 30) as f64;
        assert!((gain - 0.75).abs() < 1e-3, "gain={}", gain);

        // A pole on the unit circle is unstable.
        a[0] = 4096;
        assert_eq!(inverse_pred_gain(&a), 0);

        a[0] = 8000;
        a[1] = -3000;
        assert_eq!(inverse_pred_gain(&a), 0);
    }

    #[test]
    fn verify_bwexpander() {
        let mut ar = [8192i16, -4096, 2048, -1024];
        bwexpander(&mut ar, 58982);
        assert_eq!(ar, [7373, -3318, 1493, -672]);

        let mut ar = [1000i16, -1000];
        bwexpander(&mut ar, 32768);
        assert_eq!(ar, [500, -250]);

        let mut ar = [123_456_789, -98_765_432];
        bwexpander_32(&mut ar, 1 << 16);
        assert_eq!(ar, [123_456_789, -98_765_432]);
    }

    #[test]
    fn verify_lpc_fit() {
        let mut a_in = [4000, -8000, 6000, -2000];
        let mut a_out = [0i16; 4];

        lpc_fit(&mut a_out, &mut a_in, 12, 13);
        assert_eq!(a_out, [2000, -4000, 3000, -1000]);

        let mut a_in = [1_500_000, -1_200_000, 800_000, -600_000];
        lpc_fit(&mut a_out, &mut a_in, 12, 17);
        assert!(a_out.iter().all(|&a| i32::from(a).abs() <= 32767));
    }

    #[test]
    fn verify_biquad_passes_dc() {
        for (b, a) in TRANSITION_LP_B_Q28.iter().zip(TRANSITION_LP_A_Q28.iter()) {
            let mut state = [0; 2];
            let mut signal = [1000i16; 400];

            biquad_alt(&mut signal, b, a, &mut state);

            let settled = signal[399] as i32;
            assert!((settled - 1000).abs() < 30, "settled={}", settled);
        }
    }
}
