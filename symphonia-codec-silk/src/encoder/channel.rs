// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::{debug, trace};

use crate::analysis::FrameAnalysis;
use crate::config::ComplexitySettings;
use crate::control::FrameControl;
use crate::error::Result;
use crate::fixed::*;
use crate::frame::{
    Bandwidth, FrameDuration, FrameGeometry, QuantOffsetType, SignalType, MAX_FRAMES_PER_PACKET,
    MAX_FRAME_LENGTH, MAX_LPC_ORDER,
};
use crate::gain::{self, MIN_QGAIN_DB, N_LEVELS_QGAIN};
use crate::indices::{encode_indices, ConditionalCoding, IndexContext, SideInfoIndices};
use crate::lpc;
use crate::nlsf;
use crate::nsq::{NsqState, Quantizer, SynthesisSnapshot};
use crate::pitch;
use crate::pulses::encode_pulses;
use crate::range;
use crate::table::{
    QUANT_OFFSETS_Q10, TARGET_RATE_MB_21, TARGET_RATE_NB_21, TARGET_RATE_WB_21,
};

/// Gain index of a freshly reset channel.
const RESET_GAIN_INDEX: i32 = 10;

/// Speech activity below which a frame is coded as inactive, in Q8.
const SPEECH_ACTIVITY_DTX_THRES_Q8: i32 = 13;

/// Speech activity above which a frame gets a redundant copy, in Q8.
const LBRR_SPEECH_ACTIVITY_THRES_Q8: i32 = 77;

/// Inactive frames coded before discontinuous transmission starts.
const NB_SPEECH_FRAMES_BEFORE_DTX: u32 = 10;

/// Frames skipped in a row before one is coded anyway.
const MAX_CONSECUTIVE_DTX: u32 = 20;

const MIN_TARGET_RATE_BPS: i32 = 5000;
const MAX_TARGET_RATE_BPS: i32 = 80000;

/// 10 ms frames spend a larger share of their bits on side information.
const REDUCE_BITRATE_10_MS_BPS: i32 = 2200;

/// Rate-distortion tradeoff of the NLSF quantizer, 0.003 in Q20 lowered by 0.001 in Q28 per unit
/// of speech activity.
const NLSF_MU_Q20: i32 = 3146;
const NLSF_MU_ACTIVITY_Q28: i32 = -268_435;

/// Highest iteration of the rate control loop.
const MAX_RATE_ITERATIONS: usize = 6;

const MIN_GAIN_MULT_Q8: i32 = 64;
const MAX_GAIN_MULT_Q8: i32 = 16384;

/// 0.16 in Q16.
const GAIN_SNR_SLOPE_Q16: i32 = 10486;

/// The redundant copy of a frame.
#[derive(Debug, Clone)]
pub struct LbrrFrame {
    pub indices: SideInfoIndices,
    pub pulses: [i8; MAX_FRAME_LENGTH],
}

/// Per-frame inputs of [`ChannelEncoder::encode_frame`].
#[derive(Debug, Clone, Copy)]
pub struct FrameParams {
    /// Position of the frame in its packet.
    pub frame_index: usize,
    pub cond: ConditionalCoding,
    /// Budget for the range coder position after this frame, in bits.
    pub max_bits: i32,
    /// Aim for exactly `max_bits`, not just at most.
    pub use_cbr: bool,
}

/// Search bound of the rate control loop.
#[derive(Debug, Clone, Copy)]
struct RateBound {
    n_bits: i32,
    gain_mult_q8: i32,
    gains_id: i32,
}

/// State after a trial encode.
#[derive(Clone)]
struct TrialState {
    enc: range::Encoder,
    nsq: NsqState,
    ctx: IndexContext,
    indices: SideInfoIndices,
    last_gain_index: i32,
}

/// Encoder state of one channel.
#[derive(Clone)]
pub struct ChannelEncoder {
    geom: FrameGeometry,
    frames_per_packet: usize,
    settings: ComplexitySettings,
    quantizer: Quantizer,
    nsq: NsqState,
    ctx: IndexContext,
    last_gain_index: i32,
    prev_nlsf_q15: [i16; MAX_LPC_ORDER],
    first_frame_after_reset: bool,
    frame_counter: u32,
    target_rate_bps: i32,
    snr_db_q7: i32,
    speech_activity_q8: i32,
    no_speech_counter: u32,
    in_dtx: bool,
    packet_loss_pct: u32,
    lbrr_enabled: bool,
    lbrr_gain_increases: i32,
    lbrr_prev_last_gain_index: i32,
    lbrr: [Option<LbrrFrame>; MAX_FRAMES_PER_PACKET],
    last_signal_type: SignalType,
}

impl ChannelEncoder {
    pub fn new(bandwidth: Bandwidth, duration: FrameDuration, settings: ComplexitySettings) -> Self {
        let geom = FrameGeometry::new(bandwidth, duration.nb_subfr());

        return ChannelEncoder {
            geom,
            frames_per_packet: duration.frames_per_packet(),
            settings,
            quantizer: Quantizer::new(&settings, geom.fs_khz),
            nsq: NsqState::new(),
            ctx: IndexContext::default(),
            last_gain_index: RESET_GAIN_INDEX,
            prev_nlsf_q15: [0; MAX_LPC_ORDER],
            first_frame_after_reset: true,
            frame_counter: 0,
            target_rate_bps: 0,
            snr_db_q7: 0,
            speech_activity_q8: 0,
            no_speech_counter: 0,
            in_dtx: false,
            packet_loss_pct: 0,
            lbrr_enabled: false,
            lbrr_gain_increases: 7,
            lbrr_prev_last_gain_index: RESET_GAIN_INDEX,
            lbrr: Default::default(),
            last_signal_type: SignalType::Inactive,
        };
    }

    pub fn geometry(&self) -> &FrameGeometry {
        return &self.geom;
    }

    /// Reconfigures the channel. A change of the internal sample rate resets the channel, the way
    /// the decoder does when it sees the new rate.
    pub fn set_geometry(&mut self, bandwidth: Bandwidth, duration: FrameDuration) {
        if bandwidth != self.geom.bandwidth {
            debug!("silk: encoder switching internal rate to {} kHz", bandwidth.fs_khz());

            let lbrr_enabled = self.lbrr_enabled;
            let packet_loss_pct = self.packet_loss_pct;

            *self = ChannelEncoder::new(bandwidth, duration, self.settings);

            self.lbrr_enabled = lbrr_enabled;
            self.packet_loss_pct = packet_loss_pct;
        }
        else if duration.nb_subfr() != self.geom.nb_subfr
            || duration.frames_per_packet() != self.frames_per_packet
        {
            self.geom = FrameGeometry::new(bandwidth, duration.nb_subfr());
            self.frames_per_packet = duration.frames_per_packet();

            // Redundancy is only valid for packets of the same layout.
            self.lbrr = Default::default();
            self.target_rate_bps = 0;
        }
    }

    pub fn set_complexity(&mut self, settings: ComplexitySettings) {
        self.settings = settings;
        self.quantizer = Quantizer::new(&settings, self.geom.fs_khz);
    }

    /// True once enough inactive frames were seen to stop transmitting.
    pub fn in_dtx(&self) -> bool {
        return self.in_dtx;
    }

    pub fn snr_db_q7(&self) -> i32 {
        return self.snr_db_q7;
    }

    pub fn lbrr_enabled(&self) -> bool {
        return self.lbrr_enabled;
    }

    /// Signal type of the last coded frame.
    pub fn last_signal_type(&self) -> SignalType {
        return self.last_signal_type;
    }

    /// Hands over the redundant frames produced for the current packet.
    pub fn take_lbrr(&mut self) -> [Option<LbrrFrame>; MAX_FRAMES_PER_PACKET] {
        return std::mem::take(&mut self.lbrr);
    }

    /// Puts back redundant frames of a packet that was never transmitted. Copies made for the
    /// current packet take precedence.
    pub fn restore_lbrr(&mut self, pending: [Option<LbrrFrame>; MAX_FRAMES_PER_PACKET]) {
        if self.lbrr.iter().all(Option::is_none) {
            self.lbrr = pending;
        }
    }

    /// Returns the part of the state that a decoder mirrors.
    pub fn synthesis_snapshot(&self) -> SynthesisSnapshot {
        return self.nsq.synthesis_snapshot(&self.geom);
    }

    /// Decides whether the next frame is active, and tracks the run of inactive frames that leads
    /// to discontinuous transmission.
    pub fn do_vad(&mut self, speech_activity_q8: i32) -> bool {
        self.speech_activity_q8 = speech_activity_q8;

        if speech_activity_q8 >= SPEECH_ACTIVITY_DTX_THRES_Q8 {
            self.no_speech_counter = 0;
            self.in_dtx = false;
            return true;
        }

        self.no_speech_counter += 1;

        if self.no_speech_counter <= NB_SPEECH_FRAMES_BEFORE_DTX {
            self.in_dtx = false;
        }
        else if self.no_speech_counter > MAX_CONSECUTIVE_DTX + NB_SPEECH_FRAMES_BEFORE_DTX {
            self.no_speech_counter = NB_SPEECH_FRAMES_BEFORE_DTX;
            self.in_dtx = false;
        }
        else {
            if !self.in_dtx {
                debug!("silk: entering discontinuous transmission");
            }
            self.in_dtx = true;
        }

        return false;
    }

    /// Sets the target SNR of the quantizer from the target bitrate of the channel.
    pub fn control_snr(&mut self, target_rate_bps: i32) {
        let mut rate = target_rate_bps;

        if self.geom.nb_subfr == 2 {
            rate -= REDUCE_BITRATE_10_MS_BPS;
        }

        let rate = rate.clamp(MIN_TARGET_RATE_BPS, MAX_TARGET_RATE_BPS);

        if rate == self.target_rate_bps {
            return;
        }

        self.target_rate_bps = rate;

        let table: &[u8] = match self.geom.bandwidth {
            Bandwidth::NarrowBand => &TARGET_RATE_NB_21,
            Bandwidth::MediumBand => &TARGET_RATE_MB_21,
            Bandwidth::WideBand => &TARGET_RATE_WB_21,
        };

        let id = ((rate + 200) / 400 - 10).min(table.len() as i32 - 1);

        self.snr_db_q7 = if id <= 0 { 0 } else { i32::from(table[id as usize]) * 21 };
    }

    /// Decides whether the frames of the next packet get redundant copies.
    pub fn setup_lbrr(&mut self, target_rate_bps: i32, packet_loss_pct: u32, use_in_band_fec: bool) {
        let was_enabled = self.lbrr_enabled;

        self.packet_loss_pct = packet_loss_pct;
        self.lbrr_enabled = false;

        if !use_in_band_fec || packet_loss_pct == 0 {
            return;
        }

        let min_rate = match self.geom.bandwidth {
            Bandwidth::NarrowBand => 12000,
            Bandwidth::MediumBand => 14000,
            Bandwidth::WideBand => 16000,
        };

        let loss = packet_loss_pct.min(25) as i32;
        let thres = min_rate * (125 - loss) / 100;

        if target_rate_bps > thres {
            self.lbrr_enabled = true;

            self.lbrr_gain_increases = if was_enabled {
                i32::max(7 - smulwb(packet_loss_pct as i32, 26214), 2)
            }
            else {
                7
            };
        }
    }

    /// Quantizes one frame and range codes it into `enc`. Returns the position of the range coder
    /// afterwards, in bits.
    pub fn encode_frame(
        &mut self,
        enc: &mut range::Encoder,
        analysis: &FrameAnalysis,
        params: &FrameParams,
    ) -> Result<usize> {
        let geom = self.geom;

        let mut indices = SideInfoIndices {
            signal_type: analysis.signal_type,
            seed: (self.frame_counter & 3) as u8,
            ..Default::default()
        };

        self.frame_counter = self.frame_counter.wrapping_add(1);

        let mut ctrl = FrameControl {
            ar_q13: analysis.ar_q13,
            lf_shp_q14: analysis.lf_shp_q14,
            tilt_q14: analysis.tilt_q14,
            harm_shape_gain_q14: analysis.harm_shape_gain_q14,
            ltp_pred_cod_gain_q7: analysis.ltp_pred_cod_gain_q7,
            input_quality_q14: analysis.input_quality_q14,
            ..Default::default()
        };

        self.set_prediction(&mut indices, &mut ctrl, analysis);
        self.set_long_term_prediction(&mut indices, &mut ctrl, analysis, params.cond);

        self.process_gains(&mut indices, &mut ctrl, analysis, params.cond);

        self.encode_lbrr(&indices, &ctrl, &analysis.x16[..geom.frame_length], params.frame_index, params.cond);

        let bits = self.rate_loop(enc, &mut indices, &mut ctrl, &analysis.x16[..geom.frame_length], params)?;

        self.first_frame_after_reset = false;
        self.last_signal_type = indices.signal_type;

        return Ok(bits);
    }

    /// Quantizes the NLSFs and chooses the interpolation factor of the first half of the frame.
    fn set_prediction(&mut self, indices: &mut SideInfoIndices, ctrl: &mut FrameControl, analysis: &FrameAnalysis) {
        let order = self.geom.lpc_order;

        let mut nlsf_q15 = [0i16; MAX_LPC_ORDER];
        nlsf_q15[..order].copy_from_slice(&analysis.nlsf_q15[..order]);

        indices.nlsf_interp_coef_q2 = if self.first_frame_after_reset
            || !self.settings.use_interpolated_nlsfs
            || self.geom.nb_subfr != 4
        {
            4
        }
        else {
            self.choose_interpolation(&nlsf_q15[..order], &analysis.x16)
        };

        let mut w_q2 = [0i32; MAX_LPC_ORDER];
        nlsf::laroia_weights(&mut w_q2[..order], &nlsf_q15[..order]);

        // The first half of an interpolated frame also depends on the quantized NLSFs.
        let interp_q2 = indices.nlsf_interp_coef_q2;

        if interp_q2 < 4 {
            let mut interp_q15 = [0i16; MAX_LPC_ORDER];
            nlsf::interpolate(&mut interp_q15[..order], &self.prev_nlsf_q15[..order], &nlsf_q15[..order], interp_q2);

            let mut w0_q2 = [0i32; MAX_LPC_ORDER];
            nlsf::laroia_weights(&mut w0_q2[..order], &interp_q15[..order]);

            let i_sqr_q15 = (interp_q2 * interp_q2) << 11;

            for (w, &w0) in w_q2.iter_mut().zip(&w0_q2).take(order) {
                *w = (*w >> 1) + (smulbb(w0, i_sqr_q15) >> 16);
            }
        }

        // Rate weighs less in active speech. 10 ms frames carry the same NLSFs for half the time.
        let mut mu_q20 = smlawb(NLSF_MU_Q20, NLSF_MU_ACTIVITY_Q28, self.speech_activity_q8);

        if self.geom.nb_subfr == 2 {
            mu_q20 += mu_q20 >> 1;
        }

        nlsf::quantize(
            &mut nlsf_q15[..order],
            &mut indices.nlsf_indices[..order + 1],
            &w_q2[..order],
            mu_q20,
            self.settings.nlsf_survivors,
            indices.signal_type == SignalType::Voiced,
        );

        ctrl.synth.set_prediction_filters(
            &nlsf_q15[..order],
            &self.prev_nlsf_q15[..order],
            indices.nlsf_interp_coef_q2,
        );

        self.prev_nlsf_q15 = nlsf_q15;
    }

    /// Finds the interpolation factor giving the smallest prediction residual over the first half
    /// of the frame.
    fn choose_interpolation(&self, nlsf_q15: &[i16], x16: &[i16]) -> i32 {
        let order = nlsf_q15.len();
        let half = &x16[..2 * self.geom.subfr_length];

        let residual_energy = |nlsf: &[i16]| -> i64 {
            let mut a_q12 = [0i16; MAX_LPC_ORDER];
            nlsf::nlsf_to_lpc(&mut a_q12[..order], nlsf);

            let mut res = [0i16; MAX_FRAME_LENGTH / 2];
            let res = &mut res[..half.len()];
            lpc::analysis_filter(res, half, &a_q12[..order]);

            return res[order..].iter().map(|&r| i64::from(r) * i64::from(r)).sum();
        };

        let mut best_energy = residual_energy(nlsf_q15);
        let mut best = 4;

        let mut interp = [0i16; MAX_LPC_ORDER];

        for k in (0..4).rev() {
            nlsf::interpolate(&mut interp[..order], &self.prev_nlsf_q15[..order], nlsf_q15, k);

            let energy = residual_energy(&interp[..order]);

            if energy < best_energy {
                best_energy = energy;
                best = k;
            }
            else if best < 4 {
                // Moving further from the current frame only gets worse.
                break;
            }
        }

        return best;
    }

    /// Copies the pitch and LTP parameters of a voiced frame into the indices.
    fn set_long_term_prediction(
        &self,
        indices: &mut SideInfoIndices,
        ctrl: &mut FrameControl,
        analysis: &FrameAnalysis,
        cond: ConditionalCoding,
    ) {
        if indices.signal_type == SignalType::Voiced {
            indices.lag_index = analysis.lag_index;
            indices.contour_index = analysis.contour_index;
            indices.per_index = analysis.ltp.per_index;
            indices.ltp_index = analysis.ltp.ltp_index;

            indices.ltp_scale_index = pitch::ltp_scale_index(
                self.packet_loss_pct,
                self.frames_per_packet,
                self.lbrr_enabled,
                self.snr_db_q7,
                analysis.ltp_pred_cod_gain_q7,
                cond == ConditionalCoding::Independent,
            );
        }

        ctrl.synth.set_long_term_prediction(indices, &self.geom);
    }

    /// Turns the residual levels of the analysis into quantized gains, and sets the quantization
    /// offset and the rate-distortion trade-off of the frame.
    pub fn process_gains(
        &mut self,
        indices: &mut SideInfoIndices,
        ctrl: &mut FrameControl,
        analysis: &FrameAnalysis,
        cond: ConditionalCoding,
    ) {
        let nb_subfr = self.geom.nb_subfr;
        let voiced = indices.signal_type == SignalType::Voiced;

        // The gains follow the residual energy of a whole subframe, not of a single sample.
        let win_sqrt_q8 = sqrt_approx((self.geom.subfr_length << 16) as i32);

        let gain_mult_q16 = log2lin((16 << 7) - smulwb(GAIN_SNR_SLOPE_Q16, self.snr_db_q7));
        let gain_add_q16 = log2lin((16 << 7) + smulwb(GAIN_SNR_SLOPE_Q16, MIN_QGAIN_DB << 7));

        for (gain, &res) in ctrl.gains_unq_q16.iter_mut().zip(&analysis.res_gains_q16).take(nb_subfr) {
            let g = ((i64::from(res) * i64::from(win_sqrt_q8)) >> 8).min(i64::from(i32::MAX)) as i32;
            *gain = add_sat32(smulww(g, gain_mult_q16), gain_add_q16);
        }

        if voiced {
            // Strong long-term prediction lowers the gains.
            let s_q16 = -sigm_q15(rshift_round(ctrl.ltp_pred_cod_gain_q7 - (12 << 7), 4));

            for gain in ctrl.gains_unq_q16[..nb_subfr].iter_mut() {
                *gain = smlawb(*gain, *gain, s_q16);
            }
        }

        indices.quant_offset_type = if voiced
            && ctrl.ltp_pred_cod_gain_q7 + (analysis.input_tilt_q15 >> 8) > (1 << 7)
        {
            QuantOffsetType::Low
        }
        else {
            QuantOffsetType::High
        };

        ctrl.coding_quality_q14 = sigm_q15(rshift_round(self.snr_db_q7 - (20 << 7), 4)) >> 1;

        let offset_q10 =
            QUANT_OFFSETS_Q10[indices.signal_type.index() >> 1][indices.quant_offset_type.index()];

        let lambda_q10 = 1229
            + smulbb(-51, self.settings.n_states_delayed_decision as i32)
            + smulwb(-52429, self.speech_activity_q8)
            + smulwb(-410, ctrl.input_quality_q14)
            + smulwb(-819, ctrl.coding_quality_q14)
            + smulwb(52429, offset_q10);

        ctrl.lambda_q10 = lambda_q10.max(1);

        ctrl.synth.gains_q16 = ctrl.gains_unq_q16;
        ctrl.last_gain_index_prev = self.last_gain_index;

        gain::quantize(
            &mut indices.gains_indices[..nb_subfr],
            &mut ctrl.synth.gains_q16[..nb_subfr],
            &mut self.last_gain_index,
            cond.is_conditional(),
        );
    }

    /// Quantizes a redundant copy of the frame with coarser gains. The primary state is left
    /// untouched.
    pub fn encode_lbrr(
        &mut self,
        indices: &SideInfoIndices,
        ctrl: &FrameControl,
        x16: &[i16],
        frame_index: usize,
        cond: ConditionalCoding,
    ) {
        if !self.lbrr_enabled || self.speech_activity_q8 <= LBRR_SPEECH_ACTIVITY_THRES_Q8 {
            return;
        }

        let nb_subfr = self.geom.nb_subfr;
        let len = self.geom.frame_length;

        let mut lbrr_indices = *indices;
        let mut lbrr_ctrl = *ctrl;

        // The copy is coded independently unless the previous frame has a copy too.
        let independent = frame_index == 0 || self.lbrr[frame_index - 1].is_none();

        if independent {
            let mut first = ctrl.last_gain_index_prev;
            let mut first_gain_q16 = [0];
            gain::dequantize(&mut first_gain_q16, &indices.gains_indices[..1], &mut first, cond.is_conditional());

            self.lbrr_prev_last_gain_index = ctrl.last_gain_index_prev;
            lbrr_indices.gains_indices[0] =
                (first + self.lbrr_gain_increases).min(N_LEVELS_QGAIN - 1) as u8;
        }

        gain::dequantize(
            &mut lbrr_ctrl.synth.gains_q16[..nb_subfr],
            &lbrr_indices.gains_indices[..nb_subfr],
            &mut self.lbrr_prev_last_gain_index,
            !independent,
        );

        let mut nsq = self.nsq.clone();
        let mut frame = LbrrFrame { indices: lbrr_indices, pulses: [0; MAX_FRAME_LENGTH] };

        self.quantizer.quantize(&mut nsq, &self.geom, &lbrr_ctrl, &mut frame.indices, x16, &mut frame.pulses[..len]);

        trace!("silk: redundant copy of frame {}", frame_index);

        self.lbrr[frame_index] = Some(frame);
    }

    /// Quantizes and codes the frame, adjusting the gains until the frame fits the budget.
    ///
    /// Every trial starts from the same range coder and quantizer state. Bounds on the gain
    /// multiplier are tightened from both sides, and the loop gives up after a fixed number of
    /// iterations, restoring the best trial that fit the budget.
    fn rate_loop(
        &mut self,
        enc: &mut range::Encoder,
        indices: &mut SideInfoIndices,
        ctrl: &mut FrameControl,
        x16: &[i16],
        params: &FrameParams,
    ) -> Result<usize> {
        let geom = self.geom;
        let nb_subfr = geom.nb_subfr;
        let len = geom.frame_length;
        let max_bits = params.max_bits;

        let start = TrialState {
            enc: enc.clone(),
            nsq: self.nsq.clone(),
            ctx: self.ctx,
            indices: *indices,
            last_gain_index: self.last_gain_index,
        };

        let mut pulses = [0i8; MAX_FRAME_LENGTH];

        let mut gain_mult_q8 = 1 << 8;
        let mut gains_id = gain::gains_id(&indices.gains_indices[..nb_subfr]);

        let mut lower: Option<RateBound> = None;
        let mut upper: Option<RateBound> = None;
        let mut lower_state: Option<TrialState> = None;

        // Indices and gain index of the trial the range coder currently holds.
        let mut coded = (*indices, self.last_gain_index);

        for iter in 0..=MAX_RATE_ITERATIONS {
            let n_bits = match (lower, upper) {
                (Some(lo), _) if lo.gains_id == gains_id => lo.n_bits,
                (_, Some(up)) if up.gains_id == gains_id => up.n_bits,
                _ => {
                    if iter > 0 {
                        *enc = start.enc.clone();
                        self.nsq = start.nsq.clone();
                        self.ctx = start.ctx;
                        indices.seed = start.indices.seed;
                    }

                    self.quantizer.quantize(&mut self.nsq, &geom, ctrl, indices, x16, &mut pulses[..len]);

                    encode_indices(enc, indices, &geom, false, params.cond, &mut self.ctx)?;
                    encode_pulses(enc, indices.signal_type, indices.quant_offset_type, &pulses[..len])?;

                    coded = (*indices, self.last_gain_index);

                    enc.tell() as i32
                }
            };

            trace!(
                "silk: rate loop iteration {} gain {} bits {} of {}",
                iter,
                gain_mult_q8,
                n_bits,
                max_bits
            );

            if !params.use_cbr && iter == 0 && n_bits <= max_bits {
                break;
            }

            if iter == MAX_RATE_ITERATIONS {
                if let (Some(lo), Some(state)) = (lower, lower_state.take()) {
                    if gains_id == lo.gains_id || n_bits > max_bits {
                        *enc = state.enc;
                        self.nsq = state.nsq;
                        self.ctx = state.ctx;
                        coded = (state.indices, state.last_gain_index);
                    }
                }
                break;
            }

            if n_bits > max_bits {
                if lower.is_none() && iter >= 2 {
                    // Raising the gains alone does not get there, trade more distortion for rate
                    // and drop the larger quantization offset.
                    ctrl.lambda_q10 += ctrl.lambda_q10 >> 1;
                    indices.quant_offset_type = QuantOffsetType::Low;
                    upper = None;
                }
                else {
                    upper = Some(RateBound { n_bits, gain_mult_q8, gains_id });
                }
            }
            else if n_bits < max_bits - 5 {
                let is_new = lower.map_or(true, |lo| lo.gains_id != gains_id);

                lower = Some(RateBound { n_bits, gain_mult_q8, gains_id });

                if is_new {
                    lower_state = Some(TrialState {
                        enc: enc.clone(),
                        nsq: self.nsq.clone(),
                        ctx: self.ctx,
                        indices: *indices,
                        last_gain_index: self.last_gain_index,
                    });
                }
            }
            else {
                break;
            }

            gain_mult_q8 = match (lower, upper) {
                (Some(lo), Some(up)) => {
                    let span = up.gain_mult_q8 - lo.gain_mult_q8;
                    let mult = lo.gain_mult_q8 + span * (max_bits - lo.n_bits) / (up.n_bits - lo.n_bits);

                    // Stay within the middle half of the bracket.
                    let a = lo.gain_mult_q8 + (span >> 2);
                    let b = up.gain_mult_q8 - (span >> 2);
                    mult.clamp(a.min(b), a.max(b))
                }
                _ => {
                    let overshoot_q7 = ((n_bits - max_bits) << 7) / len as i32;
                    let mut factor_q16 = log2lin(overshoot_q7 + (16 << 7)).min(2 << 16);

                    if n_bits > max_bits {
                        // At least 1.3.
                        factor_q16 = factor_q16.max(85197);
                    }

                    smulwb(factor_q16, gain_mult_q8)
                }
            };

            gain_mult_q8 = gain_mult_q8.clamp(MIN_GAIN_MULT_Q8, MAX_GAIN_MULT_Q8);

            for (gain, &unq) in ctrl.synth.gains_q16.iter_mut().zip(&ctrl.gains_unq_q16).take(nb_subfr) {
                *gain = lshift_sat32(smulwb(unq, gain_mult_q8), 8);
            }

            self.last_gain_index = ctrl.last_gain_index_prev;

            gain::quantize(
                &mut indices.gains_indices[..nb_subfr],
                &mut ctrl.synth.gains_q16[..nb_subfr],
                &mut self.last_gain_index,
                params.cond.is_conditional(),
            );

            gains_id = gain::gains_id(&indices.gains_indices[..nb_subfr]);
        }

        *indices = coded.0;
        self.last_gain_index = coded.1;

        return Ok(enc.tell() as usize);
    }
}
