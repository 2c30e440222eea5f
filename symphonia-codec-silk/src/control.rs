// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-frame parameters of the prediction and noise shaping filters.

use crate::frame::{FrameGeometry, SignalType, LTP_ORDER, MAX_LPC_ORDER, MAX_NB_SUBFR};
use crate::indices::SideInfoIndices;
use crate::nlsf;
use crate::pitch;

/// Largest order of the noise shaping filter.
pub const MAX_SHAPE_LPC_ORDER: usize = 16;

/// Parameters of the synthesis filters, reconstructed identically by the encoder and decoder from
/// the side information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderControl {
    pub pitch_l: [i32; MAX_NB_SUBFR],
    pub gains_q16: [i32; MAX_NB_SUBFR],
    /// Short-term prediction filters for the first and second half of the frame.
    pub pred_coef_q12: [[i16; MAX_LPC_ORDER]; 2],
    pub ltp_coef_q14: [i16; LTP_ORDER * MAX_NB_SUBFR],
    pub ltp_scale_q14: i32,
}

impl Default for DecoderControl {
    fn default() -> Self {
        return DecoderControl {
            pitch_l: [0; MAX_NB_SUBFR],
            gains_q16: [0; MAX_NB_SUBFR],
            pred_coef_q12: [[0; MAX_LPC_ORDER]; 2],
            ltp_coef_q14: [0; LTP_ORDER * MAX_NB_SUBFR],
            ltp_scale_q14: 0,
        };
    }
}

impl DecoderControl {
    /// Converts the quantized NLSFs to prediction filters.
    ///
    /// The first half of the frame uses NLSFs interpolated between the previous and the current
    /// frame unless `interp_coef_q2` is 4.
    pub fn set_prediction_filters(&mut self, nlsf_q15: &[i16], prev_nlsf_q15: &[i16], interp_coef_q2: i32) {
        let order = nlsf_q15.len();

        nlsf::nlsf_to_lpc(&mut self.pred_coef_q12[1][..order], nlsf_q15);

        if interp_coef_q2 < 4 {
            let mut nlsf0_q15 = [0i16; MAX_LPC_ORDER];
            nlsf::interpolate(&mut nlsf0_q15[..order], prev_nlsf_q15, nlsf_q15, interp_coef_q2);
            nlsf::nlsf_to_lpc(&mut self.pred_coef_q12[0][..order], &nlsf0_q15[..order]);
        }
        else {
            self.pred_coef_q12[0] = self.pred_coef_q12[1];
        }
    }

    /// Sets the pitch lags and LTP filters of a voiced frame, or clears them otherwise.
    pub fn set_long_term_prediction(&mut self, indices: &SideInfoIndices, geom: &FrameGeometry) {
        if indices.signal_type == SignalType::Voiced {
            pitch::decode_pitch(&mut self.pitch_l, indices.lag_index, indices.contour_index, geom);

            pitch::decode_ltp(
                &mut self.ltp_coef_q14[..geom.nb_subfr * LTP_ORDER],
                indices.per_index,
                &indices.ltp_index[..geom.nb_subfr],
            );

            self.ltp_scale_q14 = pitch::ltp_scale_q14(indices.ltp_scale_index);
        }
        else {
            self.pitch_l = [0; MAX_NB_SUBFR];
            self.ltp_coef_q14 = [0; LTP_ORDER * MAX_NB_SUBFR];
            self.ltp_scale_q14 = 0;
        }
    }
}

/// Encoder parameters of one frame: the synthesis parameters plus noise shaping and rate-distortion
/// control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameControl {
    pub synth: DecoderControl,
    /// Noise shaping AR filters, one per subframe, in Q13.
    pub ar_q13: [i16; MAX_NB_SUBFR * MAX_SHAPE_LPC_ORDER],
    /// Low-frequency shaping: AR coefficient in the upper and MA coefficient in the lower 16 bits,
    /// both Q14.
    pub lf_shp_q14: [i32; MAX_NB_SUBFR],
    pub tilt_q14: [i32; MAX_NB_SUBFR],
    pub harm_shape_gain_q14: [i32; MAX_NB_SUBFR],
    /// Rate-distortion trade-off of the quantizer in Q10.
    pub lambda_q10: i32,
    /// Gains before quantization.
    pub gains_unq_q16: [i32; MAX_NB_SUBFR],
    /// Previous gain index before the gains of this frame were quantized.
    pub last_gain_index_prev: i32,
    pub ltp_pred_cod_gain_q7: i32,
    pub input_quality_q14: i32,
    pub coding_quality_q14: i32,
}

impl Default for FrameControl {
    fn default() -> Self {
        return FrameControl {
            synth: DecoderControl::default(),
            ar_q13: [0; MAX_NB_SUBFR * MAX_SHAPE_LPC_ORDER],
            lf_shp_q14: [0; MAX_NB_SUBFR],
            tilt_q14: [0; MAX_NB_SUBFR],
            harm_shape_gain_q14: [0; MAX_NB_SUBFR],
            lambda_q10: 0,
            gains_unq_q16: [0; MAX_NB_SUBFR],
            last_gain_index_prev: 0,
            ltp_pred_cod_gain_q7: 0,
            input_quality_q14: 0,
            coding_quality_q14: 0,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Bandwidth, QuantOffsetType};
    use crate::lpc::inverse_pred_gain;

    #[test]
    fn verify_prediction_filters() {
        let mut nlsf0 = [0i16; 10];
        let mut nlsf1 = [0i16; 10];
        let mut ind = [0i8; 11];

        ind[0] = 3;
        nlsf::decode(&mut nlsf0, &ind);
        ind[0] = 20;
        nlsf::decode(&mut nlsf1, &ind);

        let mut ctrl = DecoderControl::default();

        ctrl.set_prediction_filters(&nlsf1, &nlsf0, 4);
        assert_eq!(ctrl.pred_coef_q12[0], ctrl.pred_coef_q12[1]);

        ctrl.set_prediction_filters(&nlsf1, &nlsf0, 1);
        assert_ne!(ctrl.pred_coef_q12[0], ctrl.pred_coef_q12[1]);
        assert!(inverse_pred_gain(&ctrl.pred_coef_q12[0][..10]) > 0);
    }

    #[test]
    fn verify_long_term_prediction() {
        let geom = FrameGeometry::new(Bandwidth::MediumBand, 4);

        let indices = SideInfoIndices {
            signal_type: SignalType::Voiced,
            quant_offset_type: QuantOffsetType::Low,
            lag_index: 60,
            ltp_index: [1, 2, 3, 4],
            per_index: 2,
            ltp_scale_index: 1,
            ..Default::default()
        };

        let mut ctrl = DecoderControl::default();
        ctrl.set_long_term_prediction(&indices, &geom);

        assert_eq!(ctrl.pitch_l, [84, 84, 84, 84]);
        assert_eq!(ctrl.ltp_scale_q14, 12288);
        assert!(ctrl.ltp_coef_q14.iter().any(|&b| b != 0));

        let indices = SideInfoIndices { signal_type: SignalType::Unvoiced, ..indices };
        ctrl.set_long_term_prediction(&indices, &geom);

        assert_eq!(ctrl.pitch_l, [0; 4]);
        assert!(ctrl.ltp_coef_q14.iter().all(|&b| b == 0));
    }
}
