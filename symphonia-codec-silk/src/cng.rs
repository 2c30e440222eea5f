// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Comfort noise generation.
//!
//! During inactive frames the generator tracks smoothed NLSFs, a smoothed gain and a buffer of
//! recent excitation. When frames are lost, noise with that spectrum and level is added on top of
//! the concealed signal, filling in for the attenuation applied by the concealer.

use crate::control::DecoderControl;
use crate::fixed::*;
use crate::frame::{FrameGeometry, SignalType, MAX_FRAME_LENGTH, MAX_LPC_ORDER};
use crate::nlsf;

const BUF_MASK_MAX: usize = 255;

/// Smoothing coefficients of the gain and the NLSFs, in Q16.
const GAIN_SMTH_Q16: i32 = 4634;
const NLSF_SMTH_Q16: i32 = 16348;

/// The smoothed gain never exceeds the gain of the current subframe by more than this factor, in
/// Q16 of its inverse.
const GAIN_SMTH_THRESHOLD_Q16: i32 = 46396;

const RAND_SEED_INIT: i32 = 3176576;

#[derive(Debug, Clone)]
pub struct Cng {
    exc_buf_q14: [i32; MAX_FRAME_LENGTH],
    smth_nlsf_q15: [i16; MAX_LPC_ORDER],
    synth_state: [i32; MAX_LPC_ORDER],
    smth_gain_q16: i32,
    rand_seed: i32,
    fs_khz: usize,
}

impl Default for Cng {
    fn default() -> Self {
        return Cng {
            exc_buf_q14: [0; MAX_FRAME_LENGTH],
            smth_nlsf_q15: [0; MAX_LPC_ORDER],
            synth_state: [0; MAX_LPC_ORDER],
            smth_gain_q16: 0,
            rand_seed: RAND_SEED_INIT,
            fs_khz: 0,
        };
    }
}

impl Cng {
    pub fn new() -> Self {
        return Self::default();
    }

    /// Resets the generator for a new internal sample rate. The NLSFs start out evenly spaced.
    pub fn reset(&mut self, geom: &FrameGeometry) {
        *self = Cng { fs_khz: geom.fs_khz, ..Default::default() };

        let order = geom.lpc_order;
        let step_q15 = i16::MAX as i32 / (order as i32 + 1);

        for (i, nlsf) in self.smth_nlsf_q15[..order].iter_mut().enumerate() {
            *nlsf = (step_q15 * (i as i32 + 1)) as i16;
        }
    }

    /// Updates the noise model from a good inactive frame, or adds comfort noise to a concealed
    /// frame.
    ///
    /// `prev_nlsf_q15` and `exc_q14` are the NLSFs and excitation of the last good frame, and
    /// `plc_gain_q16` the gain of the noise the concealer already put into `frame`.
    pub fn process(
        &mut self,
        geom: &FrameGeometry,
        ctrl: &DecoderControl,
        prev_nlsf_q15: &[i16],
        exc_q14: &[i32; MAX_FRAME_LENGTH],
        signal_type: SignalType,
        loss_count: usize,
        plc_gain_q16: i32,
        frame: &mut [i16],
    ) {
        if self.fs_khz != geom.fs_khz {
            self.reset(geom);
        }

        let order = geom.lpc_order;
        let subfr = geom.subfr_length;

        if loss_count == 0 && signal_type == SignalType::Inactive {
            for (smth, &nlsf) in self.smth_nlsf_q15[..order].iter_mut().zip(prev_nlsf_q15) {
                let delta = i32::from(nlsf) - i32::from(*smth);
                *smth = (i32::from(*smth) + smulwb(delta, NLSF_SMTH_Q16)) as i16;
            }

            // Keep the excitation of the loudest subframe at the front of the buffer.
            let gains = &ctrl.gains_q16[..geom.nb_subfr];

            let loudest = gains
                .iter()
                .enumerate()
                .fold(0, |best, (i, &g)| if g > gains[best] { i } else { best });

            self.exc_buf_q14.copy_within(0..subfr * (geom.nb_subfr - 1), subfr);
            self.exc_buf_q14[..subfr].copy_from_slice(&exc_q14[loudest * subfr..(loudest + 1) * subfr]);

            for &gain in gains {
                self.smth_gain_q16 += smulwb(gain - self.smth_gain_q16, GAIN_SMTH_Q16);

                // Follow sudden drops in level immediately.
                if smulww(self.smth_gain_q16, GAIN_SMTH_THRESHOLD_Q16) > gain {
                    self.smth_gain_q16 = gain;
                }
            }
        }

        if loss_count == 0 {
            self.synth_state = [0; MAX_LPC_ORDER];
            return;
        }

        // The comfort noise makes up for the energy the concealer no longer produces.
        let mut gain_q16;

        if plc_gain_q16 >= (1 << 21) || self.smth_gain_q16 > (1 << 23) {
            gain_q16 = smultt(plc_gain_q16, plc_gain_q16);
            gain_q16 = sub_lshift32(smultt(self.smth_gain_q16, self.smth_gain_q16), gain_q16, 5);
            gain_q16 = sqrt_approx(gain_q16) << 16;
        }
        else {
            gain_q16 = smulww(plc_gain_q16, plc_gain_q16);
            gain_q16 = sub_lshift32(smulww(self.smth_gain_q16, self.smth_gain_q16), gain_q16, 5);
            gain_q16 = sqrt_approx(gain_q16) << 8;
        }

        let gain_q10 = gain_q16 >> 6;

        let mut sig_q14 = [0i32; MAX_FRAME_LENGTH + MAX_LPC_ORDER];
        let len = frame.len();

        self.excitation(&mut sig_q14[MAX_LPC_ORDER..MAX_LPC_ORDER + len]);

        let mut a_q12 = [0i16; MAX_LPC_ORDER];
        nlsf::nlsf_to_lpc(&mut a_q12[..order], &self.smth_nlsf_q15[..order]);

        sig_q14[..MAX_LPC_ORDER].copy_from_slice(&self.synth_state);

        for (i, out) in frame.iter_mut().enumerate() {
            let mut pred_q10 = (order >> 1) as i32;

            for (j, &a) in a_q12[..order].iter().enumerate() {
                pred_q10 = smlawb(pred_q10, sig_q14[MAX_LPC_ORDER + i - j - 1], i32::from(a));
            }

            let x = add_sat32(sig_q14[MAX_LPC_ORDER + i], lshift_sat32(pred_q10, 4));
            sig_q14[MAX_LPC_ORDER + i] = x;

            let noise = sat16(rshift_round(smulww(x, gain_q10), 8));
            *out = sat16(i32::from(*out) + i32::from(noise));
        }

        self.synth_state.copy_from_slice(&sig_q14[len..len + MAX_LPC_ORDER]);
    }

    /// Fills `exc_q14` with samples drawn at random from the excitation buffer.
    fn excitation(&mut self, exc_q14: &mut [i32]) {
        let mut mask = BUF_MASK_MAX;

        while mask > exc_q14.len() {
            mask >>= 1;
        }

        let mut seed = self.rand_seed;

        for e in exc_q14.iter_mut() {
            seed = silk_rand(seed);
            *e = self.exc_buf_q14[(seed >> 24) as usize & mask];
        }

        self.rand_seed = seed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Bandwidth;

    fn inactive_control(gain_q16: i32) -> DecoderControl {
        let mut ctrl = DecoderControl::default();
        ctrl.gains_q16 = [gain_q16; 4];
        return ctrl;
    }

    #[test]
    fn verify_reset_spaces_nlsfs_evenly() {
        let geom = FrameGeometry::new(Bandwidth::NarrowBand, 4);

        let mut cng = Cng::new();
        cng.reset(&geom);

        assert_eq!(cng.smth_nlsf_q15[0], 2978);
        assert_eq!(cng.smth_nlsf_q15[9], 29780);
        assert_eq!(cng.smth_gain_q16, 0);
        assert_eq!(cng.rand_seed, RAND_SEED_INIT);
    }

    #[test]
    fn verify_comfort_noise_follows_inactive_frames() {
        let geom = FrameGeometry::new(Bandwidth::WideBand, 4);
        let ctrl = inactive_control(500 << 16);

        let mut exc = [0i32; MAX_FRAME_LENGTH];

        for (i, e) in exc.iter_mut().enumerate() {
            *e = if i % 3 == 0 { -(1 << 14) } else { 1 << 14 };
        }

        let mut nlsf = [0i16; 16];

        for (i, x) in nlsf.iter_mut().enumerate() {
            *x = (1900 * (i as i32 + 1)) as i16;
        }

        let mut cng = Cng::new();

        // Good inactive frames only update the model.
        for _ in 0..10 {
            let mut frame = vec![0i16; geom.frame_length];
            cng.process(&geom, &ctrl, &nlsf, &exc, SignalType::Inactive, 0, 0, &mut frame);
            assert!(frame.iter().all(|&x| x == 0));
        }

        assert!(cng.smth_gain_q16 > 450 << 16 && cng.smth_gain_q16 <= 500 << 16);
        assert!((i32::from(cng.smth_nlsf_q15[0]) - 1900).abs() < 100);

        // A lost frame gets noise at roughly the level of the inactive signal.
        let mut frame = vec![0i16; geom.frame_length];
        cng.process(&geom, &ctrl, &nlsf, &exc, SignalType::Inactive, 1, 1 << 16, &mut frame);

        assert!(frame.iter().any(|&x| x != 0));
        assert!(cng.synth_state.iter().any(|&s| s != 0));

        // A good frame clears the synthesis state.
        let mut frame = vec![0i16; geom.frame_length];
        cng.process(&geom, &ctrl, &nlsf, &exc, SignalType::Voiced, 0, 0, &mut frame);

        assert!(frame.iter().all(|&x| x == 0));
        assert_eq!(cng.synth_state, [0; MAX_LPC_ORDER]);
    }
}
