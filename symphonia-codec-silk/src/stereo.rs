// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mid/side conversion of stereo signals.

/// Splits interleaved stereo samples into a mid and a side channel.
///
/// `mid = (l + r) / 2` and `side = (l - r) / 2`, both rounded towards negative infinity.
pub fn to_mid_side(interleaved: &[i16], mid: &mut [i16], side: &mut [i16]) {
    debug_assert_eq!(interleaved.len(), 2 * mid.len());
    debug_assert_eq!(mid.len(), side.len());

    for ((lr, m), s) in interleaved.chunks_exact(2).zip(mid.iter_mut()).zip(side.iter_mut()) {
        let l = i32::from(lr[0]);
        let r = i32::from(lr[1]);

        *m = ((l + r) >> 1) as i16;
        *s = ((l - r) >> 1) as i16;
    }
}

/// Recombines mid and side channels into interleaved stereo samples.
pub fn to_left_right(mid: &[i16], side: &[i16], interleaved: &mut [i16]) {
    debug_assert_eq!(mid.len(), side.len());
    debug_assert_eq!(interleaved.len(), 2 * mid.len());

    for ((lr, &m), &s) in interleaved.chunks_exact_mut(2).zip(mid).zip(side) {
        let m = i32::from(m);
        let s = i32::from(s);

        lr[0] = (m + s).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        lr[1] = (m - s).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_mid_side_round_trip() {
        let lr = [1000i16, -1000, 300, 301, i16::MAX, i16::MIN, -7, -7];

        let mut mid = [0i16; 4];
        let mut side = [0i16; 4];
        to_mid_side(&lr, &mut mid, &mut side);

        assert_eq!(mid, [0, 300, -1, -7]);
        assert_eq!(side, [1000, -1, 32767, 0]);

        let mut out = [0i16; 8];
        to_left_right(&mid, &side, &mut out);

        // Exact up to the bit lost when halving.
        for (&a, &b) in lr.iter().zip(out.iter()) {
            assert!((i32::from(a) - i32::from(b)).abs() <= 1);
        }
    }
}
