// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Frame reconstruction of a single channel.

use log::debug;
use symphonia_core::io::ReadBytes;

use crate::cng::Cng;
use crate::control::DecoderControl;
use crate::error::{Error, Result};
use crate::fixed::*;
use crate::frame::{
    Bandwidth, FrameGeometry, SignalType, LTP_ORDER, MAX_FRAME_LENGTH, MAX_LPC_ORDER, MAX_NB_SUBFR,
    MAX_SUB_FRAME_LENGTH,
};
use crate::gain;
use crate::indices::{decode_indices, ConditionalCoding, IndexContext, SideInfoIndices};
use crate::lpc;
use crate::nlsf;
use crate::nsq::{
    ltp_prediction, quantization_offset, scale_output, short_prediction, SynthesisSnapshot,
    NSQ_LPC_BUF_LENGTH, QUANT_LEVEL_ADJUST_Q10,
};
use crate::plc::Plc;
use crate::pulses::decode_pulses;
use crate::range;

/// Chirp applied to the prediction filters of the first good frame after a loss.
const BWE_AFTER_LOSS_Q16: i32 = 63570;

/// Gain index a channel starts from after a reset or a lost packet.
pub(crate) const RESET_GAIN_INDEX: i32 = 10;

/// How the payload of a frame is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// A regular frame. `voice_activity` is the frame's flag from the packet header.
    Normal { voice_activity: bool },
    /// The frame is missing and must be concealed.
    Lost,
    /// The low bitrate redundant copy of the frame, carried by the following packet.
    Redundant,
}

/// Decoder state of one channel.
#[derive(Clone)]
pub struct ChannelDecoder {
    geom: FrameGeometry,
    /// Output history followed by the frame being decoded.
    out_buf: [i16; 2 * MAX_FRAME_LENGTH],
    s_lpc_q14_buf: [i32; NSQ_LPC_BUF_LENGTH],
    /// Excitation of the last decoded frame.
    exc_q14: [i32; MAX_FRAME_LENGTH],
    prev_gain_q16: i32,
    lag_prev: i32,
    last_gain_index: i32,
    prev_nlsf_q15: [i16; MAX_LPC_ORDER],
    ctx: IndexContext,
    prev_signal_type: SignalType,
    loss_count: usize,
    first_frame_after_reset: bool,
    indices: SideInfoIndices,
    ctrl: DecoderControl,
    plc: Plc,
    cng: Cng,
}

impl ChannelDecoder {
    pub fn new(bandwidth: Bandwidth, nb_subfr: usize) -> Self {
        let geom = FrameGeometry::new(bandwidth, nb_subfr);

        let mut plc = Plc::new();
        plc.reset(&geom);

        let mut cng = Cng::new();
        cng.reset(&geom);

        return ChannelDecoder {
            geom,
            out_buf: [0; 2 * MAX_FRAME_LENGTH],
            s_lpc_q14_buf: [0; NSQ_LPC_BUF_LENGTH],
            exc_q14: [0; MAX_FRAME_LENGTH],
            prev_gain_q16: 1 << 16,
            lag_prev: 100,
            last_gain_index: RESET_GAIN_INDEX,
            prev_nlsf_q15: [0; MAX_LPC_ORDER],
            ctx: IndexContext::default(),
            prev_signal_type: SignalType::Inactive,
            loss_count: 0,
            first_frame_after_reset: true,
            indices: SideInfoIndices::default(),
            ctrl: DecoderControl::default(),
            plc,
            cng,
        };
    }

    pub fn geometry(&self) -> &FrameGeometry {
        return &self.geom;
    }

    /// Reconfigures the channel for a bandwidth and frame duration. A change of the internal
    /// sample rate resets the channel.
    pub fn set_geometry(&mut self, bandwidth: Bandwidth, nb_subfr: usize) {
        if bandwidth != self.geom.bandwidth {
            debug!("silk: decoder switching internal rate to {} kHz", bandwidth.fs_khz());
            *self = ChannelDecoder::new(bandwidth, nb_subfr);
        }
        else if nb_subfr != self.geom.nb_subfr {
            self.geom = FrameGeometry::new(bandwidth, nb_subfr);
        }
    }

    /// Forgets the gain history after a lost packet, so the next frame starts from a neutral
    /// gain index.
    pub fn reset_gain_index(&mut self) {
        self.last_gain_index = RESET_GAIN_INDEX;
    }

    /// Returns the part of the state that an encoder mirrors.
    pub fn synthesis_snapshot(&self) -> SynthesisSnapshot {
        return SynthesisSnapshot {
            history: self.out_buf[..self.geom.ltp_mem_length].to_vec(),
            s_lpc_q14: self.s_lpc_q14_buf,
            prev_gain_q16: self.prev_gain_q16,
            lag_prev: self.lag_prev,
        };
    }

    /// Side information of the last decoded frame.
    pub fn indices(&self) -> &SideInfoIndices {
        return &self.indices;
    }

    /// Signal type of the last decoded or concealed frame.
    pub fn prev_signal_type(&self) -> SignalType {
        return self.prev_signal_type;
    }

    pub fn lag_prev(&self) -> i32 {
        return self.lag_prev;
    }

    /// Decodes, or conceals, one frame into `out` and returns the number of samples written.
    ///
    /// A range decoder is required unless the frame is lost.
    pub fn decode_frame<B: ReadBytes>(
        &mut self,
        dec: Option<&mut range::Decoder<'_, B>>,
        mode: DecodeMode,
        cond: ConditionalCoding,
        out: &mut [i16],
    ) -> Result<usize> {
        let geom = self.geom;
        let len = geom.frame_length;
        let ltp_mem = geom.ltp_mem_length;

        if out.len() < len {
            return Err(Error::BufferTooSmall { needed: len, actual: out.len() });
        }

        let out = &mut out[..len];

        self.plc.check_sample_rate(&geom);

        match (mode, dec) {
            (DecodeMode::Lost, _) => {
                let (history, frame) = self.out_buf.split_at_mut(ltp_mem);

                let lag = self.plc.conceal(
                    &geom,
                    history,
                    &self.exc_q14,
                    &mut self.s_lpc_q14_buf,
                    self.prev_signal_type,
                    self.loss_count,
                    self.first_frame_after_reset,
                    &mut frame[..len],
                );

                self.indices.signal_type = self.prev_signal_type;
                self.ctrl.pitch_l = [lag; MAX_NB_SUBFR];
                self.loss_count += 1;
            }
            (DecodeMode::Normal { .. } | DecodeMode::Redundant, Some(dec)) => {
                let active = match mode {
                    DecodeMode::Normal { voice_activity } => voice_activity,
                    _ => true,
                };

                self.indices = decode_indices(dec, &geom, active, cond, &mut self.ctx)?;

                let mut pulses = [0i16; MAX_FRAME_LENGTH];
                decode_pulses(dec, self.indices.signal_type, self.indices.quant_offset_type, &mut pulses[..len])?;

                self.decode_parameters(cond);
                self.decode_core(&pulses[..len]);

                self.plc.update(&geom, &self.ctrl, self.indices.signal_type);

                self.loss_count = 0;
                self.prev_signal_type = self.indices.signal_type;
                self.first_frame_after_reset = false;
            }
            (_, None) => return Err(Error::DecodingError("silk: missing payload for frame")),
        }

        out.copy_from_slice(&self.out_buf[ltp_mem..ltp_mem + len]);

        // The history keeps the signal before comfort noise and gluing.
        self.out_buf.copy_within(len..len + ltp_mem, 0);

        self.cng.process(
            &geom,
            &self.ctrl,
            &self.prev_nlsf_q15[..geom.lpc_order],
            &self.exc_q14,
            self.prev_signal_type,
            self.loss_count,
            self.plc.noise_gain_q16(),
            out,
        );

        self.plc.glue_frames(out, self.loss_count);

        self.lag_prev = self.ctrl.pitch_l[geom.nb_subfr - 1];

        return Ok(len);
    }

    /// Reconstructs the gains and the prediction filters of the frame from its indices.
    pub fn decode_parameters(&mut self, cond: ConditionalCoding) {
        let geom = self.geom;
        let order = geom.lpc_order;
        let nb_subfr = geom.nb_subfr;

        gain::dequantize(
            &mut self.ctrl.gains_q16[..nb_subfr],
            &self.indices.gains_indices[..nb_subfr],
            &mut self.last_gain_index,
            cond.is_conditional(),
        );

        let mut nlsf_q15 = [0i16; MAX_LPC_ORDER];
        nlsf::decode(&mut nlsf_q15[..order], &self.indices.nlsf_indices[..order + 1]);

        // Without a previous frame there is nothing to interpolate from.
        if self.first_frame_after_reset {
            self.indices.nlsf_interp_coef_q2 = 4;
        }

        self.ctrl.set_prediction_filters(
            &nlsf_q15[..order],
            &self.prev_nlsf_q15[..order],
            self.indices.nlsf_interp_coef_q2,
        );

        self.prev_nlsf_q15 = nlsf_q15;

        // Soften the filters after a loss, the history they run on is only an estimate.
        if self.loss_count > 0 {
            for a_q12 in self.ctrl.pred_coef_q12.iter_mut() {
                lpc::bwexpander(&mut a_q12[..order], BWE_AFTER_LOSS_Q16);
            }
        }

        self.ctrl.set_long_term_prediction(&self.indices, &geom);
    }

    /// Runs the synthesis filters on the excitation described by `pulses`.
    pub fn decode_core(&mut self, pulses: &[i16]) {
        let geom = self.geom;
        let order = geom.lpc_order;
        let subfr = geom.subfr_length;
        let ltp_mem = geom.ltp_mem_length;

        debug_assert_eq!(pulses.len(), geom.frame_length);

        let offset_q10 = quantization_offset(&self.indices);
        let interpolated = self.indices.nlsf_interp_coef_q2 < 4;

        // Excitation, with the same dither the quantizer applied.
        let mut rand_seed = i32::from(self.indices.seed);

        for (exc, &pulse) in self.exc_q14.iter_mut().zip(pulses) {
            rand_seed = silk_rand(rand_seed);

            let mut e = i32::from(pulse) << 14;

            if e > 0 {
                e -= QUANT_LEVEL_ADJUST_Q10 << 4;
            }
            else if e < 0 {
                e += QUANT_LEVEL_ADJUST_Q10 << 4;
            }

            e += offset_q10 << 4;

            if rand_seed < 0 {
                e = -e;
            }

            rand_seed = rand_seed.wrapping_add(i32::from(pulse));
            *exc = e;
        }

        let mut s_lpc = [0i32; MAX_SUB_FRAME_LENGTH + NSQ_LPC_BUF_LENGTH];
        s_lpc[..NSQ_LPC_BUF_LENGTH].copy_from_slice(&self.s_lpc_q14_buf);

        let mut s_ltp = [0i16; 2 * MAX_FRAME_LENGTH];
        let mut s_ltp_q15 = [0i32; 2 * MAX_FRAME_LENGTH];
        let mut buf_idx = ltp_mem;

        for k in 0..geom.nb_subfr {
            let a_q12 = self.ctrl.pred_coef_q12[k >> 1];
            let a_q12 = &a_q12[..order];

            let mut b_q14 = [0i16; LTP_ORDER];
            b_q14.copy_from_slice(&self.ctrl.ltp_coef_q14[k * LTP_ORDER..(k + 1) * LTP_ORDER]);

            let gain_q16 = self.ctrl.gains_q16[k];
            let gain_q10 = gain_q16 >> 6;
            let mut inv_gain_q31 = inverse32_varq(gain_q16, 47);

            let gain_adj_q16 = if gain_q16 != self.prev_gain_q16 {
                let adj = div32_varq(self.prev_gain_q16, gain_q16, 16);

                for s in s_lpc[..NSQ_LPC_BUF_LENGTH].iter_mut() {
                    *s = smulww(adj, *s);
                }

                adj
            }
            else {
                1 << 16
            };

            self.prev_gain_q16 = gain_q16;

            let mut voiced = self.indices.signal_type == SignalType::Voiced;

            // Ease the transition from a concealed voiced frame into an unvoiced one.
            if self.loss_count > 0 && self.prev_signal_type == SignalType::Voiced && !voiced && k < 2 {
                b_q14 = [0; LTP_ORDER];
                b_q14[LTP_ORDER / 2] = 1 << 12;

                voiced = true;
                self.ctrl.pitch_l[k] = self.lag_prev;
            }

            let lag = self.ctrl.pitch_l[k].max(0) as usize;

            if voiced {
                if k == 0 || (k == 2 && interpolated) {
                    // Re-whiten the output history with the filter of this subframe.
                    let start = ltp_mem - lag - order - LTP_ORDER / 2;
                    let offset = k * subfr;

                    lpc::analysis_filter(
                        &mut s_ltp[start..ltp_mem],
                        &self.out_buf[start + offset..ltp_mem + offset],
                        a_q12,
                    );

                    if k == 0 {
                        inv_gain_q31 = smulwb(inv_gain_q31, self.ctrl.ltp_scale_q14) << 2;
                    }

                    for i in 0..lag + LTP_ORDER / 2 {
                        s_ltp_q15[buf_idx - i - 1] = smulwb(inv_gain_q31, i32::from(s_ltp[ltp_mem - i - 1]));
                    }
                }
                else if gain_adj_q16 != 1 << 16 {
                    for s in s_ltp_q15[buf_idx - lag - LTP_ORDER / 2..buf_idx].iter_mut() {
                        *s = smulww(gain_adj_q16, *s);
                    }
                }
            }

            let exc = &self.exc_q14[k * subfr..(k + 1) * subfr];
            let out_offset = ltp_mem + k * subfr;

            for (i, &e) in exc.iter().enumerate() {
                let mut pres_q14 = e;

                if voiced {
                    let pred_q13 = ltp_prediction(&s_ltp_q15, buf_idx + LTP_ORDER / 2 - lag, &b_q14);
                    pres_q14 = pres_q14.wrapping_add(pred_q13 << 1);

                    s_ltp_q15[buf_idx] = pres_q14 << 1;
                    buf_idx += 1;
                }

                let pred_q10 = short_prediction(&s_lpc, NSQ_LPC_BUF_LENGTH - 1 + i, a_q12);
                let x_q14 = add_sat32(pres_q14, lshift_sat32(pred_q10, 4));

                s_lpc[NSQ_LPC_BUF_LENGTH + i] = x_q14;
                self.out_buf[out_offset + i] = scale_output(x_q14, gain_q10);
            }

            s_lpc.copy_within(subfr..subfr + NSQ_LPC_BUF_LENGTH, 0);
        }

        self.s_lpc_q14_buf.copy_from_slice(&s_lpc[..NSQ_LPC_BUF_LENGTH]);
    }
}
