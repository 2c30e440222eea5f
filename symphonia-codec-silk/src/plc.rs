// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Packet loss concealment.
//!
//! While frames arrive, the concealer keeps the pitch, LTP and LPC parameters of the most recent
//! frame. When a frame is lost it extrapolates the signal by running the long-term predictor on
//! the re-whitened history, mixed with excitation picked at random from the last good frame. Both
//! components are attenuated a little further with every consecutive loss. The first good frame
//! after a loss is faded in if it is louder than the concealed signal.

use log::trace;

use crate::control::DecoderControl;
use crate::fixed::*;
use crate::frame::{FrameGeometry, SignalType, LTP_ORDER, MAX_FRAME_LENGTH, MAX_LPC_ORDER};
use crate::lpc;
use crate::nsq::NSQ_LPC_BUF_LENGTH;

/// Chirp applied to the LPC filter of a concealed frame.
const BWE_COEF_Q16: i32 = 64881;

/// Bounds of the LTP gain used to extrapolate a voiced frame, in Q14.
const V_PITCH_GAIN_START_MIN_Q14: i32 = 11469;
const V_PITCH_GAIN_START_MAX_Q14: i32 = 15565;

const MAX_PITCH_LAG_MS: i32 = 18;

/// Pitch lag growth per concealed subframe, in Q16.
const PITCH_DRIFT_FAC_Q16: i32 = 655;

const RAND_BUF_SIZE: usize = 128;
const RAND_BUF_MASK: i32 = RAND_BUF_SIZE as i32 - 1;

/// Limits of the inverse prediction gain used to scale noise for unvoiced frames, as right shifts
/// of 1.0 in Q30.
const LOG2_INV_LPC_GAIN_HIGH_THRES: u32 = 3;
const LOG2_INV_LPC_GAIN_LOW_THRES: u32 = 8;

/// Attenuation per subframe, indexed by the first and subsequent losses, in Q15.
const HARM_ATT_Q15: [i32; 2] = [32440, 31130];
const RAND_ATTENUATE_V_Q15: [i32; 2] = [31130, 26214];
const RAND_ATTENUATE_UV_Q15: [i32; 2] = [32440, 29491];

/// Concealment state of one channel.
#[derive(Debug, Clone)]
pub struct Plc {
    /// Pitch lag to extrapolate with, in Q8.
    pitch_l_q8: i32,
    ltp_coef_q14: [i16; LTP_ORDER],
    prev_lpc_q12: [i16; MAX_LPC_ORDER],
    prev_ltp_scale_q14: i32,
    /// Gains of the last two subframes of the last good frame.
    prev_gain_q16: [i32; 2],
    rand_seed: i32,
    rand_scale_q14: i32,
    /// Energy of the last concealed frame and its shift.
    conc_energy: i32,
    conc_energy_shift: i32,
    last_frame_lost: bool,
    fs_khz: usize,
}

impl Default for Plc {
    fn default() -> Self {
        return Plc {
            pitch_l_q8: 0,
            ltp_coef_q14: [0; LTP_ORDER],
            prev_lpc_q12: [0; MAX_LPC_ORDER],
            prev_ltp_scale_q14: 0,
            prev_gain_q16: [1 << 16; 2],
            rand_seed: 0,
            rand_scale_q14: 1 << 14,
            conc_energy: 0,
            conc_energy_shift: 0,
            last_frame_lost: false,
            fs_khz: 0,
        };
    }
}

impl Plc {
    pub fn new() -> Self {
        return Self::default();
    }

    /// Resets the concealer for a new internal sample rate.
    pub fn reset(&mut self, geom: &FrameGeometry) {
        *self = Plc {
            pitch_l_q8: (geom.frame_length as i32) << 7,
            fs_khz: geom.fs_khz,
            ..Default::default()
        };
    }

    /// Resets the concealer if the internal sample rate changed since the last call.
    pub fn check_sample_rate(&mut self, geom: &FrameGeometry) {
        if self.fs_khz != geom.fs_khz {
            self.reset(geom);
        }
    }

    /// Gain of the noise component of the last concealed frame, in Q16.
    pub fn noise_gain_q16(&self) -> i32 {
        return smulww(self.rand_scale_q14, self.prev_gain_q16[1]);
    }

    /// Stores the parameters of a correctly received frame.
    pub fn update(&mut self, geom: &FrameGeometry, ctrl: &DecoderControl, signal_type: SignalType) {
        let nb_subfr = geom.nb_subfr;

        self.ltp_coef_q14 = [0; LTP_ORDER];

        if signal_type == SignalType::Voiced {
            let mut ltp_gain_q14 = 0;

            // Search the subframes spanning the last pitch period for the strongest LTP filter.
            let last_lag = ctrl.pitch_l[nb_subfr - 1];

            for j in (0..nb_subfr).take_while(|&j| ((j * geom.subfr_length) as i32) < last_lag) {
                let k = nb_subfr - 1 - j;
                let taps = &ctrl.ltp_coef_q14[k * LTP_ORDER..(k + 1) * LTP_ORDER];
                let gain_q14 = taps.iter().map(|&b| i32::from(b)).sum::<i32>();

                if gain_q14 > ltp_gain_q14 {
                    ltp_gain_q14 = gain_q14;
                    self.pitch_l_q8 = ctrl.pitch_l[k] << 8;
                }
            }

            // Concentrate the gain on the centre tap, within a range that decays reasonably.
            let mut centre_q14 = ltp_gain_q14;

            if ltp_gain_q14 < V_PITCH_GAIN_START_MIN_Q14 {
                let scale_q10 = (V_PITCH_GAIN_START_MIN_Q14 << 10) / ltp_gain_q14.max(1);
                centre_q14 = smulbb(centre_q14, scale_q10) >> 10;
            }
            else if ltp_gain_q14 > V_PITCH_GAIN_START_MAX_Q14 {
                let scale_q14 = (V_PITCH_GAIN_START_MAX_Q14 << 14) / ltp_gain_q14.max(1);
                centre_q14 = smulbb(centre_q14, scale_q14) >> 14;
            }

            self.ltp_coef_q14[LTP_ORDER / 2] = centre_q14 as i16;
        }
        else {
            self.pitch_l_q8 = (geom.fs_khz as i32 * MAX_PITCH_LAG_MS) << 8;
        }

        self.prev_lpc_q12[..geom.lpc_order].copy_from_slice(&ctrl.pred_coef_q12[1][..geom.lpc_order]);
        self.prev_ltp_scale_q14 = ctrl.ltp_scale_q14;
        self.prev_gain_q16 = [ctrl.gains_q16[nb_subfr - 2], ctrl.gains_q16[nb_subfr - 1]];
    }

    /// Synthesizes a replacement for a lost frame into `frame`.
    ///
    /// `history` holds the last `ltp_mem_length` output samples, `exc_q14` the excitation of the
    /// last good frame and `s_lpc_q14` the short-term synthesis state, which is updated.
    /// `loss_count` is the number of frames already concealed in a row. Returns the pitch lag that
    /// was extrapolated last.
    pub fn conceal(
        &mut self,
        geom: &FrameGeometry,
        history: &[i16],
        exc_q14: &[i32; MAX_FRAME_LENGTH],
        s_lpc_q14: &mut [i32; NSQ_LPC_BUF_LENGTH],
        signal_type: SignalType,
        loss_count: usize,
        first_frame_after_reset: bool,
        frame: &mut [i16],
    ) -> i32 {
        let order = geom.lpc_order;
        let subfr = geom.subfr_length;
        let nb_subfr = geom.nb_subfr;
        let ltp_mem = geom.ltp_mem_length;

        debug_assert_eq!(history.len(), ltp_mem);
        debug_assert_eq!(frame.len(), geom.frame_length);

        let prev_gain_q10 = [self.prev_gain_q16[0] >> 6, self.prev_gain_q16[1] >> 6];

        // Energy of the excitation in the last two subframes.
        let mut exc_buf = [0i16; 2 * MAX_FRAME_LENGTH / 4];

        for (k, chunk) in exc_buf[..2 * subfr].chunks_exact_mut(subfr).enumerate() {
            let src = &exc_q14[(k + nb_subfr - 2) * subfr..(k + nb_subfr - 1) * subfr];

            for (out, &e) in chunk.iter_mut().zip(src) {
                *out = sat16(smulww(e, prev_gain_q10[k]) >> 8);
            }
        }

        let (energy1, shift1) = sum_sqr_shift(&exc_buf[..subfr]);
        let (energy2, shift2) = sum_sqr_shift(&exc_buf[subfr..2 * subfr]);

        // Take the random excitation from the quieter of the two subframes.
        let rand_start = if (energy1 >> shift2) < (energy2 >> shift1) {
            ((nb_subfr - 1) * subfr).saturating_sub(RAND_BUF_SIZE)
        }
        else {
            (nb_subfr * subfr).saturating_sub(RAND_BUF_SIZE)
        };

        let rand_buf = &exc_q14[rand_start..rand_start + RAND_BUF_SIZE];

        if first_frame_after_reset {
            self.prev_lpc_q12 = [0; MAX_LPC_ORDER];
        }

        let att = loss_count.min(1);
        let harm_gain_q15 = HARM_ATT_Q15[att];

        let mut rand_gain_q15 = if signal_type == SignalType::Voiced {
            RAND_ATTENUATE_V_Q15[att]
        }
        else {
            RAND_ATTENUATE_UV_Q15[att]
        };

        lpc::bwexpander(&mut self.prev_lpc_q12[..order], BWE_COEF_Q16);
        let a_q12 = self.prev_lpc_q12;
        let a_q12 = &a_q12[..order];

        let mut b_q14 = self.ltp_coef_q14;

        if loss_count == 0 {
            self.rand_scale_q14 = 1 << 14;

            if signal_type == SignalType::Voiced {
                // Reduce the noise by the share of the signal the LTP filter predicts.
                for &b in b_q14.iter() {
                    self.rand_scale_q14 -= i32::from(b);
                }

                self.rand_scale_q14 = self.rand_scale_q14.max(3277);
                self.rand_scale_q14 = smulbb(self.rand_scale_q14, self.prev_ltp_scale_q14) >> 14;
            }
            else {
                // Decay faster for filters with a high prediction gain.
                let inv_gain_q30 = lpc::inverse_pred_gain(a_q12);

                let down_scale_q30 = inv_gain_q30
                    .min((1 << 30) >> LOG2_INV_LPC_GAIN_HIGH_THRES)
                    .max((1 << 30) >> LOG2_INV_LPC_GAIN_LOW_THRES)
                    << LOG2_INV_LPC_GAIN_HIGH_THRES;

                rand_gain_q15 = smulwb(down_scale_q30, rand_gain_q15) >> 14;
            }
        }

        let mut rand_seed = self.rand_seed;
        let mut rand_scale_q14 = self.rand_scale_q14;
        let mut lag = rshift_round(self.pitch_l_q8, 8);

        // Re-whiten the history with the concealment filter.
        let mut s_ltp = [0i16; 2 * MAX_FRAME_LENGTH];
        let mut s_ltp_q14 = [0i32; 2 * MAX_FRAME_LENGTH];

        let start = ltp_mem as i32 - lag - order as i32 - LTP_ORDER as i32 / 2;
        debug_assert!(start > 0);
        let start = start.max(0) as usize;

        lpc::analysis_filter(&mut s_ltp[start..ltp_mem], &history[start..ltp_mem], a_q12);

        let inv_gain_q30 = inverse32_varq(self.prev_gain_q16[1], 46).min(i32::MAX >> 1);

        for i in start + order..ltp_mem {
            s_ltp_q14[i] = smulwb(inv_gain_q30, i32::from(s_ltp[i]));
        }

        // Long-term synthesis with attenuated noise.
        let mut buf_idx = ltp_mem;

        for _ in 0..nb_subfr {
            let mut pred_lag_ptr = (buf_idx + LTP_ORDER / 2) as i32 - lag;

            for _ in 0..subfr {
                let mut ltp_pred_q12 = 2;

                for (j, &b) in b_q14.iter().enumerate() {
                    ltp_pred_q12 = smlawb(ltp_pred_q12, s_ltp_q14[pred_lag_ptr as usize - j], i32::from(b));
                }

                pred_lag_ptr += 1;

                rand_seed = silk_rand(rand_seed);
                let idx = ((rand_seed >> 25) & RAND_BUF_MASK) as usize;

                s_ltp_q14[buf_idx] = lshift_sat32(smlawb(ltp_pred_q12, rand_buf[idx], rand_scale_q14), 2);
                buf_idx += 1;
            }

            for b in b_q14.iter_mut() {
                *b = (smulbb(harm_gain_q15, i32::from(*b)) >> 15) as i16;
            }

            if signal_type != SignalType::Inactive {
                rand_scale_q14 = smulbb(rand_scale_q14, rand_gain_q15) >> 15;
            }

            // Slowly lengthen the pitch period.
            self.pitch_l_q8 = smlawb(self.pitch_l_q8, self.pitch_l_q8, PITCH_DRIFT_FAC_Q16);
            self.pitch_l_q8 = self.pitch_l_q8.min((MAX_PITCH_LAG_MS * geom.fs_khz as i32) << 8);
            lag = rshift_round(self.pitch_l_q8, 8);
        }

        // Short-term synthesis in place over the LTP output.
        let lpc_start = ltp_mem - NSQ_LPC_BUF_LENGTH;
        s_ltp_q14[lpc_start..ltp_mem].copy_from_slice(s_lpc_q14);

        let s_lpc = &mut s_ltp_q14[lpc_start..];

        for (i, out) in frame.iter_mut().enumerate() {
            let mut pred_q10 = (order >> 1) as i32;

            for (j, &a) in a_q12.iter().enumerate() {
                pred_q10 = smlawb(pred_q10, s_lpc[NSQ_LPC_BUF_LENGTH + i - j - 1], i32::from(a));
            }

            let x = add_sat32(s_lpc[NSQ_LPC_BUF_LENGTH + i], lshift_sat32(pred_q10, 4));
            s_lpc[NSQ_LPC_BUF_LENGTH + i] = x;

            *out = sat16(rshift_round(smulww(x, prev_gain_q10[1]), 8));
        }

        let len = frame.len();
        s_lpc_q14.copy_from_slice(&s_lpc[len..len + NSQ_LPC_BUF_LENGTH]);

        self.rand_seed = rand_seed;
        self.rand_scale_q14 = rand_scale_q14;

        trace!("plc: concealed frame {}, lag {}, noise scale {}", loss_count + 1, lag, rand_scale_q14);

        return lag;
    }

    /// Smooths the transition from concealed frames to the first good frame.
    ///
    /// Call for every output frame once concealment and comfort noise have been applied.
    pub fn glue_frames(&mut self, frame: &mut [i16], loss_count: usize) {
        if loss_count > 0 {
            let (energy, shift) = sum_sqr_shift(frame);
            self.conc_energy = energy;
            self.conc_energy_shift = shift;
            self.last_frame_lost = true;
            return;
        }

        if self.last_frame_lost {
            let (mut energy, energy_shift) = sum_sqr_shift(frame);
            let mut conc_energy = self.conc_energy;

            // Bring both energies to the same scale.
            if energy_shift > self.conc_energy_shift {
                conc_energy >>= energy_shift - self.conc_energy_shift;
            }
            else if energy_shift < self.conc_energy_shift {
                energy >>= self.conc_energy_shift - energy_shift;
            }

            if energy > conc_energy {
                let lz = (clz32(conc_energy) - 1).max(0);
                conc_energy <<= lz;
                energy >>= (24 - lz).max(0);

                let frac_q24 = conc_energy / energy.max(1);

                let mut gain_q16 = sqrt_approx(frac_q24) << 4;
                let slope_q16 = (((1 << 16) - gain_q16) / frame.len() as i32) << 2;

                for x in frame.iter_mut() {
                    *x = sat16(smulwb(gain_q16, i32::from(*x)));
                    gain_q16 += slope_q16;

                    if gain_q16 > 1 << 16 {
                        break;
                    }
                }
            }
        }

        self.last_frame_lost = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Bandwidth;

    fn energy(x: &[i16]) -> i64 {
        return x.iter().map(|&s| i64::from(s) * i64::from(s)).sum();
    }

    /// Excitation of constant magnitude with an irregular sign pattern.
    fn flat_excitation() -> [i32; MAX_FRAME_LENGTH] {
        let mut exc = [0i32; MAX_FRAME_LENGTH];

        for (i, e) in exc.iter_mut().enumerate() {
            *e = if (i * 7) % 5 < 2 { -(500 << 14) } else { 500 << 14 };
        }

        return exc;
    }

    #[test]
    fn verify_unvoiced_concealment_decays() {
        let geom = FrameGeometry::new(Bandwidth::WideBand, 4);

        let mut ctrl = DecoderControl::default();
        ctrl.gains_q16 = [1 << 16; 4];

        let mut plc = Plc::new();
        plc.reset(&geom);
        plc.update(&geom, &ctrl, SignalType::Unvoiced);

        let history = vec![0i16; geom.ltp_mem_length];
        let exc = flat_excitation();
        let mut s_lpc = [0i32; NSQ_LPC_BUF_LENGTH];

        let mut energies = Vec::new();

        for loss_count in 0..4 {
            let mut frame = vec![0i16; geom.frame_length];
            plc.conceal(&geom, &history, &exc, &mut s_lpc, SignalType::Unvoiced, loss_count, false, &mut frame);
            energies.push(energy(&frame));
        }

        assert!(energies[0] > 0);

        for pair in energies.windows(2) {
            assert!(pair[1] <= pair[0], "energies: {:?}", energies);
        }

        // The attenuation speeds up after the first loss.
        assert!(energies[3] < energies[0] / 2);
    }

    #[test]
    fn verify_voiced_update_limits_ltp_gain() {
        let geom = FrameGeometry::new(Bandwidth::NarrowBand, 4);

        let mut ctrl = DecoderControl::default();
        ctrl.pitch_l = [50, 50, 52, 55];
        ctrl.gains_q16 = [1 << 16; 4];

        // A weak filter is boosted to the minimum start gain.
        for k in 0..4 {
            ctrl.ltp_coef_q14[k * LTP_ORDER + 2] = 4000;
        }

        ctrl.ltp_coef_q14[3 * LTP_ORDER + 2] = 6000;

        let mut plc = Plc::new();
        plc.reset(&geom);
        plc.update(&geom, &ctrl, SignalType::Voiced);

        assert_eq!(plc.pitch_l_q8, 55 << 8);
        assert_eq!(plc.ltp_coef_q14[..2], [0, 0]);
        assert!((i32::from(plc.ltp_coef_q14[2]) - V_PITCH_GAIN_START_MIN_Q14).abs() < 16);

        // A strong filter is limited to the maximum start gain.
        ctrl.ltp_coef_q14[3 * LTP_ORDER + 2] = 16000;
        ctrl.ltp_coef_q14[3 * LTP_ORDER + 1] = 4000;

        plc.update(&geom, &ctrl, SignalType::Voiced);
        assert!((i32::from(plc.ltp_coef_q14[2]) - V_PITCH_GAIN_START_MAX_Q14).abs() < 16);

        // Unvoiced frames extrapolate at the longest lag without LTP.
        plc.update(&geom, &ctrl, SignalType::Unvoiced);
        assert_eq!(plc.pitch_l_q8, (8 * MAX_PITCH_LAG_MS) << 8);
        assert_eq!(plc.ltp_coef_q14, [0; LTP_ORDER]);
    }

    #[test]
    fn verify_glue_frames_fades_in_loud_frame() {
        let mut plc = Plc::new();

        let mut quiet = vec![10i16; 160];
        plc.glue_frames(&mut quiet, 1);
        assert!(plc.last_frame_lost);

        let mut loud = vec![10000i16; 160];
        plc.glue_frames(&mut loud, 0);

        assert!(!plc.last_frame_lost);
        assert!(loud[0] < 1000);
        assert!(loud[0] <= loud[80]);

        // Without a preceding loss the frame is untouched.
        let mut frame = vec![10000i16; 160];
        plc.glue_frames(&mut frame, 0);
        assert!(frame.iter().all(|&x| x == 10000));
    }
}
