// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Noise shaping quantizer.
//!
//! The quantizer turns the input signal into excitation pulses while running the exact synthesis
//! of the decoder alongside, so that the coding noise ends up shaped by the noise shaping filters
//! rather than by the prediction filters. Two strategies are available: a one-shot quantizer that
//! decides every sample greedily, and a delayed-decision quantizer that keeps several candidate
//! sequences alive and commits to the best one a few dozen samples later.

mod del_dec;
mod oneshot;

use crate::config::ComplexitySettings;
use crate::control::{FrameControl, MAX_SHAPE_LPC_ORDER};
use crate::fixed::*;
use crate::frame::{
    FrameGeometry, SignalType, LTP_ORDER, MAX_FRAME_LENGTH, MAX_LPC_ORDER, MAX_SUB_FRAME_LENGTH,
};
use crate::indices::SideInfoIndices;
use crate::lpc;
use crate::table::QUANT_OFFSETS_Q10;

/// Length of the short-term prediction history.
pub(crate) const NSQ_LPC_BUF_LENGTH: usize = MAX_LPC_ORDER;

/// Distance, in Q10, that the reconstruction levels are pulled towards zero.
pub(crate) const QUANT_LEVEL_ADJUST_Q10: i32 = 80;

pub(crate) const HARM_SHAPE_FIR_TAPS: usize = 3;

/// Persistent state of the noise shaping quantizer of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsqState {
    /// Reconstructed output: the LTP memory followed by the frame being quantized.
    pub(crate) xq: [i16; 2 * MAX_FRAME_LENGTH],
    /// Noise shaping history used by the harmonic and low-frequency shaping filters.
    pub(crate) s_ltp_shp_q14: [i32; 2 * MAX_FRAME_LENGTH],
    /// Short-term synthesis history followed by the current subframe.
    pub(crate) s_lpc_q14: [i32; MAX_SUB_FRAME_LENGTH + NSQ_LPC_BUF_LENGTH],
    /// Noise shaping AR filter state.
    pub(crate) s_ar2_q14: [i32; MAX_SHAPE_LPC_ORDER],
    pub(crate) s_lf_ar_shp_q14: i32,
    pub(crate) s_diff_shp_q14: i32,
    pub(crate) lag_prev: i32,
    pub(crate) s_ltp_buf_idx: usize,
    pub(crate) s_ltp_shp_buf_idx: usize,
    pub(crate) rand_seed: i32,
    pub(crate) prev_gain_q16: i32,
    pub(crate) rewhite_flag: bool,
}

impl Default for NsqState {
    fn default() -> Self {
        return NsqState {
            xq: [0; 2 * MAX_FRAME_LENGTH],
            s_ltp_shp_q14: [0; 2 * MAX_FRAME_LENGTH],
            s_lpc_q14: [0; MAX_SUB_FRAME_LENGTH + NSQ_LPC_BUF_LENGTH],
            s_ar2_q14: [0; MAX_SHAPE_LPC_ORDER],
            s_lf_ar_shp_q14: 0,
            s_diff_shp_q14: 0,
            lag_prev: 100,
            s_ltp_buf_idx: 0,
            s_ltp_shp_buf_idx: 0,
            rand_seed: 0,
            prev_gain_q16: 65536,
            rewhite_flag: false,
        };
    }
}

impl NsqState {
    pub fn new() -> Self {
        return Self::default();
    }

    /// Returns the part of the state a decoder reconstructs from the bitstream.
    pub fn synthesis_snapshot(&self, geom: &FrameGeometry) -> SynthesisSnapshot {
        let mut s_lpc_q14 = [0; NSQ_LPC_BUF_LENGTH];
        s_lpc_q14.copy_from_slice(&self.s_lpc_q14[..NSQ_LPC_BUF_LENGTH]);

        return SynthesisSnapshot {
            history: self.xq[..geom.ltp_mem_length].to_vec(),
            s_lpc_q14,
            prev_gain_q16: self.prev_gain_q16,
            lag_prev: self.lag_prev,
        };
    }
}

/// Synthesis state shared by the encoder and the decoder. Without packet loss both sides hold an
/// identical snapshot at every frame boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisSnapshot {
    /// The most recent `ltp_mem_length` output samples at the internal sample rate.
    pub history: Vec<i16>,
    pub s_lpc_q14: [i32; NSQ_LPC_BUF_LENGTH],
    pub prev_gain_q16: i32,
    pub lag_prev: i32,
}

/// Quantization strategy of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantizer {
    OneShot { shaping_order: usize },
    DelayedDecision { n_states: usize, shaping_order: usize, warping_q16: i32 },
}

impl Quantizer {
    /// Selects the strategy for a complexity setting at an internal sample rate.
    pub fn new(settings: &ComplexitySettings, fs_khz: usize) -> Self {
        let shaping_order = settings.shaping_lpc_order;

        if settings.use_delayed_decision(fs_khz) {
            return Quantizer::DelayedDecision {
                n_states: settings.n_states_delayed_decision.max(1),
                shaping_order,
                warping_q16: settings.warping_q16(fs_khz),
            };
        }

        return Quantizer::OneShot { shaping_order };
    }

    /// Quantizes one frame of `x16` into `pulses`.
    ///
    /// The delayed-decision strategy may replace the dither seed in `indices` with the seed of the
    /// winning candidate.
    pub fn quantize(
        &self,
        nsq: &mut NsqState,
        geom: &FrameGeometry,
        ctrl: &FrameControl,
        indices: &mut SideInfoIndices,
        x16: &[i16],
        pulses: &mut [i8],
    ) {
        debug_assert_eq!(x16.len(), geom.frame_length);
        debug_assert_eq!(pulses.len(), geom.frame_length);
        debug_assert!(nsq.prev_gain_q16 != 0);

        match *self {
            Quantizer::OneShot { shaping_order } => {
                oneshot::quantize(nsq, geom, ctrl, indices, x16, pulses, shaping_order)
            }
            Quantizer::DelayedDecision { n_states, shaping_order, warping_q16 } => del_dec::quantize(
                nsq,
                geom,
                ctrl,
                indices,
                x16,
                pulses,
                n_states,
                shaping_order,
                warping_q16,
            ),
        }
    }
}

/// Filters and quantizer settings of one subframe.
pub(crate) struct SubframeFilters<'a> {
    pub a_q12: &'a [i16],
    pub b_q14: &'a [i16],
    pub ar_shp_q13: &'a [i16],
    pub lag: i32,
    pub harm_shape_fir_packed_q14: i32,
    pub tilt_q14: i32,
    pub lf_shp_q14: i32,
    pub gain_q16: i32,
    pub lambda_q10: i32,
    pub offset_q10: i32,
    pub voiced: bool,
}

impl<'a> SubframeFilters<'a> {
    pub fn new(
        geom: &FrameGeometry,
        ctrl: &'a FrameControl,
        indices: &SideInfoIndices,
        k: usize,
        lag: i32,
        shaping_order: usize,
    ) -> Self {
        let synth = &ctrl.synth;

        // Without interpolation both halves of the frame use the second filter.
        let half = (k >> 1) | usize::from(indices.nlsf_interp_coef_q2 == 4);
        let ar = k * MAX_SHAPE_LPC_ORDER;

        return SubframeFilters {
            a_q12: &synth.pred_coef_q12[half][..geom.lpc_order],
            b_q14: &synth.ltp_coef_q14[k * LTP_ORDER..(k + 1) * LTP_ORDER],
            ar_shp_q13: &ctrl.ar_q13[ar..ar + shaping_order],
            lag,
            harm_shape_fir_packed_q14: harm_shape_fir_packed(ctrl.harm_shape_gain_q14[k]),
            tilt_q14: ctrl.tilt_q14[k],
            lf_shp_q14: ctrl.lf_shp_q14[k],
            gain_q16: synth.gains_q16[k],
            lambda_q10: ctrl.lambda_q10,
            offset_q10: quantization_offset(indices),
            voiced: indices.signal_type == SignalType::Voiced,
        };
    }
}

/// True if the LTP history must be re-whitened before subframe `k` of a voiced frame: at the start
/// of the frame, and halfway through when the first half uses interpolated filters.
pub(crate) fn needs_rewhitening(indices: &SideInfoIndices, k: usize) -> bool {
    let interpolated = indices.nlsf_interp_coef_q2 != 4;
    return k == 0 || (k == 2 && interpolated);
}

/// Normalizes the input of subframe `k` by the subframe gain and brings the long-term histories
/// to the new gain.
///
/// The last `pending` entries of the LTP history are not written yet and are left alone. Returns
/// the gain adjustment in Q16 when the gain changed, so the caller can rescale its own filter
/// states.
pub(crate) fn scale_histories(
    nsq: &mut NsqState,
    geom: &FrameGeometry,
    ctrl: &FrameControl,
    voiced: bool,
    k: usize,
    x16: &[i16],
    x_sc_q10: &mut [i32],
    s_ltp: &[i16],
    s_ltp_q15: &mut [i32],
    pending: usize,
) -> Option<i32> {
    let synth = &ctrl.synth;
    let lag = synth.pitch_l[k] as usize;
    let gain_q16 = synth.gains_q16[k];

    let mut inv_gain_q31 = inverse32_varq(gain_q16.max(1), 47);
    let inv_gain_q26 = rshift_round(inv_gain_q31, 5);

    for (x_sc, &x) in x_sc_q10.iter_mut().zip(x16) {
        *x_sc = smulww(i32::from(x), inv_gain_q26);
    }

    if nsq.rewhite_flag {
        if k == 0 {
            // Downscale the LTP state to limit error propagation into the next packet.
            inv_gain_q31 = smulwb(inv_gain_q31, synth.ltp_scale_q14) << 2;
        }

        let start = nsq.s_ltp_buf_idx - lag - LTP_ORDER / 2;

        for i in start..nsq.s_ltp_buf_idx {
            s_ltp_q15[i] = smulwb(inv_gain_q31, i32::from(s_ltp[i]));
        }
    }

    if gain_q16 == nsq.prev_gain_q16 {
        return None;
    }

    let gain_adj_q16 = div32_varq(nsq.prev_gain_q16, gain_q16, 16);

    let start = nsq.s_ltp_shp_buf_idx - geom.ltp_mem_length;

    for v in nsq.s_ltp_shp_q14[start..nsq.s_ltp_shp_buf_idx].iter_mut() {
        *v = smulww(gain_adj_q16, *v);
    }

    if voiced && !nsq.rewhite_flag {
        let start = nsq.s_ltp_buf_idx - lag - LTP_ORDER / 2;

        for v in s_ltp_q15[start..nsq.s_ltp_buf_idx - pending].iter_mut() {
            *v = smulww(gain_adj_q16, *v);
        }
    }

    nsq.prev_gain_q16 = gain_q16;

    return Some(gain_adj_q16);
}

/// Reconstruction offset of the frame's signal type and quantization offset type.
pub(crate) fn quantization_offset(indices: &SideInfoIndices) -> i32 {
    let row = usize::from(indices.signal_type == SignalType::Voiced);
    return QUANT_OFFSETS_Q10[row][indices.quant_offset_type.index()];
}

/// Packs the symmetric 3-tap harmonic shaping filter: the outer taps in the lower and the centre
/// tap in the upper 16 bits.
pub(crate) fn harm_shape_fir_packed(harm_shape_gain_q14: i32) -> i32 {
    return (harm_shape_gain_q14 >> 2) | ((harm_shape_gain_q14 >> 1) << 16);
}

/// Short-term prediction of the sample following `buf[last]`, in Q10.
#[inline(always)]
pub(crate) fn short_prediction(buf: &[i32], last: usize, a_q12: &[i16]) -> i32 {
    let mut out = (a_q12.len() >> 1) as i32;

    for (j, &a) in a_q12.iter().enumerate() {
        out = smlawb(out, buf[last - j], i32::from(a));
    }

    return out;
}

/// Long-term prediction from the five samples ending at `buf[ptr]`, in Q13.
#[inline(always)]
pub(crate) fn ltp_prediction(buf: &[i32], ptr: usize, b_q14: &[i16]) -> i32 {
    let mut out = 2;

    for (j, &b) in b_q14.iter().enumerate() {
        out = smlawb(out, buf[ptr - j], i32::from(b));
    }

    return out;
}

/// Harmonic noise shaping from the three samples ending at `buf[ptr]`, in Q13.
#[inline(always)]
pub(crate) fn harmonic_shaping(buf: &[i32], ptr: usize, packed_q14: i32) -> i32 {
    let n_ltp = smulwb(add_sat32(buf[ptr], buf[ptr - 2]), packed_q14);
    return smlawt(n_ltp, buf[ptr - 1], packed_q14) << 1;
}

/// Runs the LTP memory of the frame through the analysis filter of subframe `k`, producing the
/// whitened history the long-term predictor works on.
pub(crate) fn rewhiten(
    nsq: &NsqState,
    geom: &FrameGeometry,
    s_ltp: &mut [i16],
    a_q12: &[i16],
    lag: i32,
    k: usize,
) {
    let start = geom.ltp_mem_length as i32 - lag - a_q12.len() as i32 - (LTP_ORDER as i32 / 2);
    debug_assert!(start > 0);

    let start = start as usize;
    let offset = k * geom.subfr_length;

    lpc::analysis_filter(
        &mut s_ltp[start..geom.ltp_mem_length],
        &nsq.xq[start + offset..geom.ltp_mem_length + offset],
        a_q12,
    );
}

/// Returns the two reconstruction levels nearest the residual `r_q10` together with their
/// rate-distortion costs in Q20, the cheaper level first.
#[inline(always)]
pub(crate) fn quantization_candidates(r_q10: i32, offset_q10: i32, lambda_q10: i32) -> [(i32, i32); 2] {
    let mut q1_q10 = r_q10.wrapping_sub(offset_q10);
    let mut q1_q0 = q1_q10 >> 10;

    if lambda_q10 > 2048 {
        let rdo_offset = (lambda_q10 >> 1) - 512;

        if q1_q10 > rdo_offset {
            q1_q0 = (q1_q10 - rdo_offset) >> 10;
        }
        else if q1_q10 < -rdo_offset {
            q1_q0 = (q1_q10 + rdo_offset) >> 10;
        }
        else if q1_q10 < 0 {
            q1_q0 = -1;
        }
        else {
            q1_q0 = 0;
        }
    }

    let q2_q10;
    let mut rd1_q20;
    let mut rd2_q20;

    if q1_q0 > 0 {
        q1_q10 = (q1_q0 << 10).wrapping_sub(QUANT_LEVEL_ADJUST_Q10).wrapping_add(offset_q10);
        q2_q10 = q1_q10.wrapping_add(1024);
        rd1_q20 = smulbb(q1_q10, lambda_q10);
        rd2_q20 = smulbb(q2_q10, lambda_q10);
    }
    else if q1_q0 == 0 {
        q1_q10 = offset_q10;
        q2_q10 = q1_q10.wrapping_add(1024 - QUANT_LEVEL_ADJUST_Q10);
        rd1_q20 = smulbb(q1_q10, lambda_q10);
        rd2_q20 = smulbb(q2_q10, lambda_q10);
    }
    else if q1_q0 == -1 {
        q2_q10 = offset_q10;
        q1_q10 = q2_q10 - (1024 - QUANT_LEVEL_ADJUST_Q10);
        rd1_q20 = smulbb(-q1_q10, lambda_q10);
        rd2_q20 = smulbb(q2_q10, lambda_q10);
    }
    else {
        q1_q10 = (q1_q0 << 10).wrapping_add(QUANT_LEVEL_ADJUST_Q10).wrapping_add(offset_q10);
        q2_q10 = q1_q10.wrapping_add(1024);
        rd1_q20 = smulbb(-q1_q10, lambda_q10);
        rd2_q20 = smulbb(-q2_q10, lambda_q10);
    }

    let rr_q10 = r_q10.wrapping_sub(q1_q10);
    rd1_q20 = smlabb(rd1_q20, rr_q10, rr_q10);

    let rr_q10 = r_q10.wrapping_sub(q2_q10);
    rd2_q20 = smlabb(rd2_q20, rr_q10, rr_q10);

    if rd2_q20 < rd1_q20 {
        return [(q2_q10, rd2_q20), (q1_q10, rd1_q20)];
    }

    return [(q1_q10, rd1_q20), (q2_q10, rd2_q20)];
}

/// Converts a reconstructed sample from Q14 of the normalized domain to the output domain.
#[inline(always)]
pub(crate) fn scale_output(xq_q14: i32, gain_q10: i32) -> i16 {
    return sat16(rshift_round(smulww(xq_q14, gain_q10), 8));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Bandwidth, QuantOffsetType};

    /// Builds frame parameters with flat prediction and no noise shaping.
    fn flat_control(geom: &FrameGeometry, gain_q16: i32, lambda_q10: i32) -> FrameControl {
        let mut ctrl = FrameControl::default();

        for k in 0..geom.nb_subfr {
            ctrl.synth.gains_q16[k] = gain_q16;
        }

        ctrl.lambda_q10 = lambda_q10;
        return ctrl;
    }

    fn sine(len: usize, period: f32, amplitude: f32) -> Vec<i16> {
        return (0..len)
            .map(|i| (amplitude * (2.0 * std::f32::consts::PI * i as f32 / period).sin()) as i16)
            .collect();
    }

    fn snr_db(reference: &[i16], decoded: &[i16]) -> f64 {
        let signal: f64 = reference.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
        let noise: f64 = reference
            .iter()
            .zip(decoded)
            .map(|(&x, &y)| (f64::from(x) - f64::from(y)).powi(2))
            .sum();

        return 10.0 * (signal / noise.max(1.0)).log10();
    }

    fn quantize_sine(quantizer: Quantizer) -> (Vec<i16>, Vec<i8>, SideInfoIndices) {
        let geom = FrameGeometry::new(Bandwidth::WideBand, 4);
        let ctrl = flat_control(&geom, 100 << 16, 1024);

        let x = sine(geom.frame_length, 40.0, 2000.0);
        let mut pulses = vec![0i8; geom.frame_length];
        let mut indices = SideInfoIndices {
            signal_type: SignalType::Unvoiced,
            quant_offset_type: QuantOffsetType::Low,
            seed: 2,
            ..Default::default()
        };

        let mut nsq = NsqState::new();
        quantizer.quantize(&mut nsq, &geom, &ctrl, &mut indices, &x, &mut pulses);

        let snapshot = nsq.synthesis_snapshot(&geom);
        assert_eq!(snapshot.prev_gain_q16, 100 << 16);
        assert_eq!(snapshot.lag_prev, 0);

        return (snapshot.history, pulses, indices);
    }

    #[test]
    fn verify_one_shot_reconstruction() {
        let quantizer = Quantizer::OneShot { shaping_order: 16 };
        let (xq, pulses, indices) = quantize_sine(quantizer);

        let x = sine(xq.len(), 40.0, 2000.0);
        assert!(snr_db(&x, &xq) > 20.0);
        assert!(pulses.iter().any(|&p| p != 0));
        assert_eq!(indices.seed, 2);
    }

    #[test]
    fn verify_delayed_decision_reconstruction() {
        let quantizer = Quantizer::DelayedDecision { n_states: 4, shaping_order: 16, warping_q16: 0 };
        let (xq, pulses, indices) = quantize_sine(quantizer);

        let x = sine(xq.len(), 40.0, 2000.0);
        assert!(snr_db(&x, &xq) > 20.0);
        assert!(pulses.iter().any(|&p| p != 0));
        assert!(indices.seed < 4);
    }

    #[test]
    fn verify_quantization_is_deterministic() {
        let quantizer = Quantizer::DelayedDecision { n_states: 3, shaping_order: 12, warping_q16: 15728 };
        assert_eq!(quantize_sine(quantizer), quantize_sine(quantizer));
    }

    #[test]
    fn verify_strategy_selection() {
        let fast = Quantizer::new(&ComplexitySettings::from_complexity(0), 16);
        assert_eq!(fast, Quantizer::OneShot { shaping_order: 12 });

        let best = Quantizer::new(&ComplexitySettings::from_complexity(10), 16);
        assert!(matches!(best, Quantizer::DelayedDecision { n_states: 4, shaping_order: 16, .. }));
    }

    #[test]
    fn verify_quantization_candidates() {
        // A residual exactly on a reconstruction level picks that level.
        let [(q, _), _] = quantization_candidates(2 * 1024 - QUANT_LEVEL_ADJUST_Q10 + 100, 100, 256);
        assert_eq!(q, 2 * 1024 - QUANT_LEVEL_ADJUST_Q10 + 100);
        assert_eq!(rshift_round(q, 10), 2);

        // A small residual falls on the offset, coded as a zero pulse.
        let [(q, _), _] = quantization_candidates(90, 100, 1024);
        assert_eq!(q, 100);
        assert_eq!(rshift_round(q, 10), 0);

        // The rate term pulls large lambdas towards zero.
        let [(q, _), _] = quantization_candidates(700, 100, 8000);
        assert_eq!(rshift_round(q, 10), 0);
    }
}
