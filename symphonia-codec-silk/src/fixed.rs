// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-point arithmetic primitives.
//!
//! SILK is specified in terms of bit-exact integer arithmetic. The encoder's noise shaping
//! quantizer and the decoder must run the exact same operations on the exact same values, so every
//! multiply, shift, and saturation used by either side lives here.
//!
//! Naming follows the conventional DSP notation: `W` is a 32-bit word, `B` the bottom (low) 16
//! bits of a word, `T` the top 16 bits. `smulwb(a, b)` therefore multiplies a 32-bit word with the
//! sign-extended low half of `b` and keeps the upper 32 bits of the 48-bit product.

#[inline(always)]
pub fn smulwb(a: i32, b: i32) -> i32 {
    return ((a as i64 * (b as i16) as i64) >> 16) as i32;
}

#[inline(always)]
pub fn smlawb(a: i32, b: i32, c: i32) -> i32 {
    return a.wrapping_add(smulwb(b, c));
}

#[inline(always)]
pub fn smulwt(a: i32, b: i32) -> i32 {
    return ((a as i64 * (b >> 16) as i64) >> 16) as i32;
}

#[inline(always)]
pub fn smlawt(a: i32, b: i32, c: i32) -> i32 {
    return a.wrapping_add(smulwt(b, c));
}

#[inline(always)]
pub fn smulbb(a: i32, b: i32) -> i32 {
    return (a as i16 as i32).wrapping_mul(b as i16 as i32);
}

#[inline(always)]
pub fn smlabb(a: i32, b: i32, c: i32) -> i32 {
    return a.wrapping_add(smulbb(b, c));
}

#[inline(always)]
pub fn smultt(a: i32, b: i32) -> i32 {
    return (a >> 16).wrapping_mul(b >> 16);
}

#[inline(always)]
pub fn smulww(a: i32, b: i32) -> i32 {
    return ((a as i64 * b as i64) >> 16) as i32;
}

#[inline(always)]
pub fn smlaww(a: i32, b: i32, c: i32) -> i32 {
    return a.wrapping_add(smulww(b, c));
}

/// Upper 32 bits of the 64-bit product.
#[inline(always)]
pub fn smmul(a: i32, b: i32) -> i32 {
    return ((a as i64 * b as i64) >> 32) as i32;
}

/// Arithmetic right shift with rounding. `shift` must be at least 1.
#[inline(always)]
pub fn rshift_round(a: i32, shift: u32) -> i32 {
    debug_assert!(shift > 0 && shift < 32);

    if shift == 1 {
        return (a >> 1) + (a & 1);
    }

    return ((a >> (shift - 1)) + 1) >> 1;
}

#[inline(always)]
pub fn rshift_round64(a: i64, shift: u32) -> i64 {
    debug_assert!(shift > 0 && shift < 64);

    if shift == 1 {
        return (a >> 1) + (a & 1);
    }

    return ((a >> (shift - 1)) + 1) >> 1;
}

/// Clamps `a` to `[min(l1, l2), max(l1, l2)]`.
#[inline(always)]
pub fn limit(a: i32, l1: i32, l2: i32) -> i32 {
    if l1 > l2 {
        return a.clamp(l2, l1);
    }

    return a.clamp(l1, l2);
}

/// Saturating left shift.
#[inline(always)]
pub fn lshift_sat32(a: i32, shift: u32) -> i32 {
    return limit(a, i32::MIN >> shift, i32::MAX >> shift) << shift;
}

#[inline(always)]
pub fn add_sat32(a: i32, b: i32) -> i32 {
    return a.saturating_add(b);
}

#[inline(always)]
pub fn sub_sat32(a: i32, b: i32) -> i32 {
    return a.saturating_sub(b);
}

#[inline(always)]
pub fn sub_lshift32(a: i32, b: i32, shift: u32) -> i32 {
    return a.wrapping_sub(b.wrapping_shl(shift));
}

#[inline(always)]
pub fn sat16(a: i32) -> i16 {
    return a.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
}

#[inline(always)]
pub fn clz32(a: i32) -> i32 {
    return (a as u32).leading_zeros() as i32;
}

/// Returns the number of leading zeros and the 7 bits that follow the leading one.
#[inline(always)]
pub fn clz_frac(a: i32) -> (i32, i32) {
    let lz = clz32(a);
    let rot = (24 - lz).rem_euclid(32) as u32;
    let frac_q7 = ((a as u32).rotate_right(rot) & 0x7f) as i32;

    return (lz, frac_q7);
}

/// Approximation of `128 * log2(x)`.
pub fn lin2log(x: i32) -> i32 {
    let (lz, frac_q7) = clz_frac(x);

    return smlawb(frac_q7, frac_q7 * (128 - frac_q7), 179) + ((31 - lz) << 7);
}

/// Approximation of `2^(x / 128)`, the inverse of [`lin2log`].
pub fn log2lin(x_q7: i32) -> i32 {
    if x_q7 < 0 {
        return 0;
    }
    else if x_q7 >= 3967 {
        return i32::MAX;
    }

    let out = 1i32 << (x_q7 >> 7);
    let frac_q7 = x_q7 & 0x7f;
    let poly = smlawb(frac_q7, smulbb(frac_q7, 128 - frac_q7), -174);

    if x_q7 < 2048 {
        return out.wrapping_add(out.wrapping_mul(poly) >> 7);
    }

    return out.wrapping_add((out >> 7).wrapping_mul(poly));
}

/// Approximation of the square root of `x`.
pub fn sqrt_approx(x: i32) -> i32 {
    if x <= 0 {
        return 0;
    }

    let (lz, frac_q7) = clz_frac(x);

    let mut y: i32 = if lz & 1 != 0 { 32768 } else { 46214 };
    y >>= lz >> 1;

    return smlawb(y, y, smulbb(213, frac_q7));
}

/// Approximation of `(1 << q_res) / b`.
pub fn inverse32_varq(b: i32, q_res: i32) -> i32 {
    debug_assert!(b != 0);
    debug_assert!(q_res > 0);

    let headroom = clz32(b.wrapping_abs()) - 1;
    let b_nrm = b.wrapping_shl(headroom as u32);

    let b_inv = (i32::MAX >> 2) / (b_nrm >> 16);

    let mut result = b_inv << 16;
    let err_q32 = ((1i32 << 29).wrapping_sub(smulwb(b_nrm, b_inv))).wrapping_shl(3);
    result = smlaww(result, err_q32, b_inv);

    return shift_var_q(result, 61 - headroom - q_res);
}

/// Approximation of `(a << q_res) / b`.
pub fn div32_varq(a: i32, b: i32, q_res: i32) -> i32 {
    debug_assert!(b != 0);
    debug_assert!(q_res >= 0);

    let a_headroom = clz32(a.wrapping_abs()) - 1;
    let mut a_nrm = a.wrapping_shl(a_headroom as u32);
    let b_headroom = clz32(b.wrapping_abs()) - 1;
    let b_nrm = b.wrapping_shl(b_headroom as u32);

    let b_inv = (i32::MAX >> 2) / (b_nrm >> 16);

    let mut result = smulwb(a_nrm, b_inv);
    a_nrm = a_nrm.wrapping_sub(smmul(b_nrm, result).wrapping_shl(3));
    result = smlawb(result, a_nrm, b_inv);

    return shift_var_q(result, 29 + a_headroom - b_headroom - q_res);
}

fn shift_var_q(result: i32, lshift: i32) -> i32 {
    if lshift <= 0 {
        return lshift_sat32(result, (-lshift) as u32);
    }
    else if lshift < 32 {
        return result >> lshift;
    }

    return 0;
}

const SIGM_SLOPE_Q10: [i32; 6] = [237, 153, 73, 30, 12, 7];
const SIGM_POS_Q15: [i32; 6] = [16384, 23955, 28861, 31213, 32178, 32548];
const SIGM_NEG_Q15: [i32; 6] = [16384, 8812, 3906, 1554, 589, 219];

/// Approximation of the logistic function. The input is in Q5, the output in Q15.
pub fn sigm_q15(in_q5: i32) -> i32 {
    if in_q5 < 0 {
        let x = -in_q5;

        if x >= 6 * 32 {
            return 0;
        }

        let ind = (x >> 5) as usize;
        return SIGM_NEG_Q15[ind] - smulbb(SIGM_SLOPE_Q10[ind], x & 0x1f);
    }

    if in_q5 >= 6 * 32 {
        return 32767;
    }

    let ind = (in_q5 >> 5) as usize;
    return SIGM_POS_Q15[ind] + smulbb(SIGM_SLOPE_Q10[ind], in_q5 & 0x1f);
}

/// Linear congruential pseudo-random generator.
#[inline(always)]
pub fn silk_rand(seed: i32) -> i32 {
    return 907633515i32.wrapping_add(seed.wrapping_mul(196314165));
}

/// Computes the energy of `x` together with the right shift applied to keep it within 32 bits.
///
/// Returns `(energy, shift)`.
pub fn sum_sqr_shift(x: &[i16]) -> (i32, i32) {
    let len = x.len() as i32;

    let mut shift = 31 - clz32(len);
    let mut nrg = accumulate_energy(x, len as u32, shift);

    shift = i32::max(0, shift + 3 - clz32(nrg as i32));
    nrg = accumulate_energy(x, 0, shift);

    return (nrg as i32, shift);
}

fn accumulate_energy(x: &[i16], init: u32, shift: i32) -> u32 {
    let shift = shift as u32;
    let mut nrg = init;

    let mut pairs = x.chunks_exact(2);

    for pair in &mut pairs {
        let tmp = (smulbb(pair[0] as i32, pair[0] as i32) as u32)
            .wrapping_add(smulbb(pair[1] as i32, pair[1] as i32) as u32);
        nrg = nrg.wrapping_add(tmp >> shift);
    }

    if let [last] = pairs.remainder() {
        let tmp = smulbb(*last as i32, *last as i32) as u32;
        nrg = nrg.wrapping_add(tmp >> shift);
    }

    return nrg;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn verify_multiplies() {
        assert_eq!(smulwb(1 << 16, 1234), 1234);
        assert_eq!(smulwb(-(1 << 16), 1234), -1234);
        assert_eq!(smulwb(1 << 16, 0x1_0005), 5);
        assert_eq!(smulwt(1 << 16, 7 << 16), 7);
        assert_eq!(smulbb(0x1_0003, -4), -12);
        assert_eq!(smultt(3 << 16, -5 << 16), -15);
        assert_eq!(smulww(3 << 16, 5 << 16), 15 << 16);
        assert_eq!(smmul(1 << 30, 1 << 30), 1 << 28);
    }

    #[test]
    fn verify_rshift_round() {
        assert_eq!(rshift_round(5, 1), 3);
        assert_eq!(rshift_round(4, 1), 2);
        assert_eq!(rshift_round(-5, 1), -2);
        assert_eq!(rshift_round(6, 2), 2);
        assert_eq!(rshift_round(5, 2), 1);
        assert_eq!(rshift_round64(1 << 40, 20), 1 << 20);
    }

    #[test]
    fn verify_saturation() {
        assert_eq!(lshift_sat32(1 << 30, 2), i32::MAX & !3);
        assert_eq!(lshift_sat32(-(1 << 30), 2), i32::MIN);
        assert_eq!(lshift_sat32(3, 4), 48);
        assert_eq!(sat16(40000), i16::MAX);
        assert_eq!(sat16(-40000), i16::MIN);
        assert_eq!(add_sat32(i32::MAX, 1), i32::MAX);
        assert_eq!(limit(10, 5, 0), 5);
    }

    #[test]
    fn verify_log_domain() {
        assert_eq!(lin2log(1 << 16), 16 << 7);
        assert_eq!(log2lin(16 << 7), 1 << 16);
        assert_eq!(log2lin(-1), 0);
        assert_eq!(log2lin(3967), i32::MAX);

        for &x in &[3i32, 100, 1000, 65535, 1 << 20, 123_456_789] {
            let back = log2lin(lin2log(x)) as f64;
            let rel = (back - x as f64).abs() / x as f64;
            assert!(rel < 0.02, "x={} back={}", x, back);
        }
    }

    #[test]
    fn verify_sqrt_approx() {
        assert_eq!(sqrt_approx(0), 0);

        for &x in &[1i32, 4, 10_000, 987_654, 1 << 20, 1 << 30] {
            let expected = (x as f64).sqrt();
            let got = sqrt_approx(x) as f64;
            assert!((got - expected).abs() / expected < 0.05, "x={} got={}", x, got);
        }
    }

    #[test]
    fn verify_sigmoid() {
        assert_eq!(sigm_q15(0), 16384);
        assert_eq!(sigm_q15(1000), 32767);
        assert_eq!(sigm_q15(-1000), 0);

        let mut last = 0;

        for x in -200..200 {
            let y = sigm_q15(x);
            // The piecewise linear segments overlap by a couple of LSBs at their ends.
            assert!(y + 4 >= last, "x={}", x);
            last = y;
        }
    }

    #[test]
    fn verify_rand_sequence() {
        assert_eq!(silk_rand(0), 907633515);
        assert_eq!(silk_rand(1), 907633515 + 196314165);
        assert_eq!(silk_rand(silk_rand(0)), 907633515i32.wrapping_add(907633515i32.wrapping_mul(196314165)));
    }

    #[test]
    fn verify_sum_sqr_shift() {
        let (nrg, shift) = sum_sqr_shift(&[0; 40]);
        assert_eq!(nrg, 0);
        assert_eq!(shift, 0);

        let x = [i16::MAX; 320];
        let (nrg, shift) = sum_sqr_shift(&x);
        let exact = 320.0 * (i16::MAX as f64).powi(2);
        let approx = (nrg as f64) * 2f64.powi(shift);
        assert!(nrg > 0);
        assert!((approx - exact).abs() / exact < 0.01);
    }

    #[test]
    fn verify_div32_varq_truncates() {
        // 5025 * 65536 / 518612 = 634.99, truncated toward zero.
        assert_eq!(div32_varq(5025, 518612, 16), 634);
        // The reciprocal approximation may also land one below an exact quotient.
        assert_eq!(div32_varq(1 << 20, 1 << 10, 16), (1 << 26) - 1);
    }

    proptest! {
        #[test]
        fn prop_inverse32_varq(b in 1i32..(1 << 30)) {
            let approx = inverse32_varq(b, 47) as f64;
            let exact = 2f64.powi(47) / b as f64;

            if exact < i32::MAX as f64 && exact > 64.0 {
                prop_assert!((approx - exact).abs() / exact < 1e-3);
            }
        }

        #[test]
        fn prop_div32_varq(a in 1i32..(1 << 24), b in 1i32..(1 << 24)) {
            let approx = div32_varq(a, b, 16) as f64;
            let exact = a as f64 * 65536.0 / b as f64;

            // The final shift truncates, so small quotients may be one below the exact value.
            if exact < (i32::MAX / 2) as f64 {
                prop_assert!((approx - exact).abs() <= 1.0 + exact * 1e-6);
            }
        }
    }
}
