// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Side information of a SILK frame.

use std::convert::TryFrom;

use symphonia_core::io::ReadBytes;

use crate::error::Result;
use crate::frame::{FrameGeometry, QuantOffsetType, SignalType, MAX_LPC_ORDER, MAX_NB_SUBFR};
use crate::nlsf;
use crate::pitch::contour_table;
use crate::range;
use crate::table::{
    FRAME_TYPE_ACTIVE, FRAME_TYPE_INACTIVE, GAIN_DELTA, GAIN_HIGHBITS, GAIN_LOWBITS, LSF_EXT,
    LSF_INTERP, LSF_S1, LSF_S2, LTP_FILTER, LTP_PERIODICITY, LTP_SCALE, PITCH_DELTA, PITCH_HIGH,
    UNIFORM4, UNIFORM6, UNIFORM8,
};

/// Largest stage-2 NLSF residual index coded without the extension.
const NLSF_QUANT_MAX_AMPLITUDE: i32 = 4;

/// Range of pitch lag deltas coded against the previous frame.
const MIN_DELTA_LAG: i32 = -8;
const MAX_DELTA_LAG: i32 = 11;

/// How a frame depends on the previous frame of the same channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionalCoding {
    /// The first frame of a packet. The first gain is coded absolutely and the LTP scale index is
    /// transmitted.
    #[default]
    Independent,
    /// An absolutely coded frame following a lost or skipped frame. No LTP scale index.
    IndependentNoLtpScaling,
    /// Gains and pitch lag are coded as deltas against the previous frame.
    Conditional,
}

impl ConditionalCoding {
    pub fn is_conditional(self) -> bool {
        return self == ConditionalCoding::Conditional;
    }
}

/// Quantization indices of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideInfoIndices {
    pub gains_indices: [u8; MAX_NB_SUBFR],
    pub ltp_index: [u8; MAX_NB_SUBFR],
    /// Stage-1 index followed by one stage-2 residual index per coefficient.
    pub nlsf_indices: [i8; MAX_LPC_ORDER + 1],
    pub lag_index: i32,
    pub contour_index: usize,
    pub signal_type: SignalType,
    pub quant_offset_type: QuantOffsetType,
    /// Interpolation factor between the previous and current NLSFs for the first half of the
    /// frame, in Q2. 4 means no interpolation.
    pub nlsf_interp_coef_q2: i32,
    pub per_index: usize,
    pub ltp_scale_index: usize,
    /// Seed of the dither generator.
    pub seed: u8,
}

impl Default for SideInfoIndices {
    fn default() -> Self {
        return SideInfoIndices {
            gains_indices: [0; MAX_NB_SUBFR],
            ltp_index: [0; MAX_NB_SUBFR],
            nlsf_indices: [0; MAX_LPC_ORDER + 1],
            lag_index: 0,
            contour_index: 0,
            signal_type: SignalType::Inactive,
            quant_offset_type: QuantOffsetType::Low,
            nlsf_interp_coef_q2: 4,
            per_index: 0,
            ltp_scale_index: 0,
            seed: 0,
        };
    }
}

/// Coding context carried from one frame of a channel to the next.
///
/// The pitch lag of a voiced frame following a voiced frame is coded as a delta, so the encoder
/// and decoder both keep track of the last coded signal type and lag index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexContext {
    pub prev_signal_type: SignalType,
    pub prev_lag_index: i32,
}

fn nlsf_s1_cdf(geom: &FrameGeometry, signal_type: SignalType) -> &'static [u32] {
    let wb = usize::from(geom.bandwidth.is_wideband());
    let voiced = usize::from(signal_type == SignalType::Voiced);
    return LSF_S1[wb][voiced];
}

fn nlsf_s2_cdf(geom: &FrameGeometry, stage1: i8, i: usize) -> &'static [u32] {
    return LSF_S2[nlsf::residual_row(geom.lpc_order, stage1 as usize, i)];
}

fn lag_low_cdf(fs_khz: usize) -> &'static [u32] {
    return match fs_khz {
        8 => UNIFORM4,
        12 => UNIFORM6,
        _ => UNIFORM8,
    };
}

/// Range codes the side information of a frame.
///
/// Redundant (LBRR) frames are always coded as active frames.
pub fn encode_indices(
    enc: &mut range::Encoder,
    indices: &SideInfoIndices,
    geom: &FrameGeometry,
    lbrr: bool,
    cond: ConditionalCoding,
    ctx: &mut IndexContext,
) -> Result<()> {
    let signal_type = indices.signal_type;

    // Frame type.
    let type_offset = 2 * signal_type.index() + indices.quant_offset_type.index();

    if lbrr || signal_type != SignalType::Inactive {
        debug_assert!(type_offset >= 2);
        enc.encode_symbol_with_cdf(type_offset - 2, FRAME_TYPE_ACTIVE)?;
    }
    else {
        enc.encode_symbol_with_cdf(type_offset, FRAME_TYPE_INACTIVE)?;
    }

    // Gains.
    let first = if cond.is_conditional() {
        0
    }
    else {
        let ind = usize::from(indices.gains_indices[0]);
        enc.encode_symbol_with_cdf(ind >> 3, GAIN_HIGHBITS[signal_type.index()])?;
        enc.encode_symbol_with_cdf(ind & 7, GAIN_LOWBITS)?;
        1
    };

    for &ind in &indices.gains_indices[first..geom.nb_subfr] {
        enc.encode_symbol_with_cdf(usize::from(ind), GAIN_DELTA)?;
    }

    // NLSFs.
    let stage1 = indices.nlsf_indices[0];
    enc.encode_symbol_with_cdf(stage1 as usize, nlsf_s1_cdf(geom, signal_type))?;

    for i in 0..geom.lpc_order {
        let res = i32::from(indices.nlsf_indices[i + 1]);
        let cdf = nlsf_s2_cdf(geom, stage1, i);

        if res >= NLSF_QUANT_MAX_AMPLITUDE {
            enc.encode_symbol_with_cdf(2 * NLSF_QUANT_MAX_AMPLITUDE as usize, cdf)?;
            enc.encode_symbol_with_cdf((res - NLSF_QUANT_MAX_AMPLITUDE) as usize, LSF_EXT)?;
        }
        else if res <= -NLSF_QUANT_MAX_AMPLITUDE {
            enc.encode_symbol_with_cdf(0, cdf)?;
            enc.encode_symbol_with_cdf((-res - NLSF_QUANT_MAX_AMPLITUDE) as usize, LSF_EXT)?;
        }
        else {
            enc.encode_symbol_with_cdf((res + NLSF_QUANT_MAX_AMPLITUDE) as usize, cdf)?;
        }
    }

    if geom.nb_subfr == MAX_NB_SUBFR {
        enc.encode_symbol_with_cdf(indices.nlsf_interp_coef_q2 as usize, LSF_INTERP)?;
    }

    if signal_type == SignalType::Voiced {
        // Pitch lag.
        let mut absolute = true;

        if cond.is_conditional() && ctx.prev_signal_type == SignalType::Voiced {
            let delta = indices.lag_index - ctx.prev_lag_index;

            if (MIN_DELTA_LAG..=MAX_DELTA_LAG).contains(&delta) {
                enc.encode_symbol_with_cdf((delta - MIN_DELTA_LAG + 1) as usize, PITCH_DELTA)?;
                absolute = false;
            }
            else {
                enc.encode_symbol_with_cdf(0, PITCH_DELTA)?;
            }
        }

        if absolute {
            let half = geom.fs_khz as i32 / 2;
            let high = indices.lag_index / half;
            let low = indices.lag_index - high * half;

            enc.encode_symbol_with_cdf(high as usize, PITCH_HIGH)?;
            enc.encode_symbol_with_cdf(low as usize, lag_low_cdf(geom.fs_khz))?;
        }

        ctx.prev_lag_index = indices.lag_index;

        let contours = contour_table(geom.fs_khz, geom.nb_subfr);
        enc.encode_symbol_with_cdf(indices.contour_index, contours.cdf)?;

        // LTP filters.
        enc.encode_symbol_with_cdf(indices.per_index, LTP_PERIODICITY)?;

        for &ind in &indices.ltp_index[..geom.nb_subfr] {
            enc.encode_symbol_with_cdf(usize::from(ind), LTP_FILTER[indices.per_index])?;
        }

        if cond == ConditionalCoding::Independent {
            enc.encode_symbol_with_cdf(indices.ltp_scale_index, LTP_SCALE)?;
        }
    }

    ctx.prev_signal_type = signal_type;

    enc.encode_symbol_with_cdf(usize::from(indices.seed), UNIFORM4)?;

    return Ok(());
}

/// Decodes the side information of a frame.
///
/// `active` is the voice activity flag of the frame, or true for redundant (LBRR) frames.
pub fn decode_indices<B: ReadBytes>(
    dec: &mut range::Decoder<'_, B>,
    geom: &FrameGeometry,
    active: bool,
    cond: ConditionalCoding,
    ctx: &mut IndexContext,
) -> Result<SideInfoIndices> {
    let mut indices = SideInfoIndices::default();

    let type_offset = if active {
        dec.decode_symbol_with_cdf(FRAME_TYPE_ACTIVE)? + 2
    }
    else {
        dec.decode_symbol_with_cdf(FRAME_TYPE_INACTIVE)?
    };

    indices.signal_type = SignalType::try_from((type_offset >> 1) as u8)?;
    indices.quant_offset_type = QuantOffsetType::try_from((type_offset & 1) as u8)?;

    let signal_type = indices.signal_type;

    let first = if cond.is_conditional() {
        0
    }
    else {
        let high = dec.decode_symbol_with_cdf(GAIN_HIGHBITS[signal_type.index()])?;
        let low = dec.decode_symbol_with_cdf(GAIN_LOWBITS)?;
        indices.gains_indices[0] = ((high << 3) + low) as u8;
        1
    };

    for ind in &mut indices.gains_indices[first..geom.nb_subfr] {
        *ind = dec.decode_symbol_with_cdf(GAIN_DELTA)? as u8;
    }

    let stage1 = dec.decode_symbol_with_cdf(nlsf_s1_cdf(geom, signal_type))? as i8;
    indices.nlsf_indices[0] = stage1;

    for i in 0..geom.lpc_order {
        let sym = dec.decode_symbol_with_cdf(nlsf_s2_cdf(geom, stage1, i))? as i32;

        let res = match sym - NLSF_QUANT_MAX_AMPLITUDE {
            0 => 0,
            res if res == NLSF_QUANT_MAX_AMPLITUDE => {
                res + dec.decode_symbol_with_cdf(LSF_EXT)? as i32
            }
            res if res == -NLSF_QUANT_MAX_AMPLITUDE => {
                res - dec.decode_symbol_with_cdf(LSF_EXT)? as i32
            }
            res => res,
        };

        indices.nlsf_indices[i + 1] = res as i8;
    }

    indices.nlsf_interp_coef_q2 = if geom.nb_subfr == MAX_NB_SUBFR {
        dec.decode_symbol_with_cdf(LSF_INTERP)? as i32
    }
    else {
        4
    };

    if signal_type == SignalType::Voiced {
        let mut absolute = true;

        if cond.is_conditional() && ctx.prev_signal_type == SignalType::Voiced {
            let delta = dec.decode_symbol_with_cdf(PITCH_DELTA)? as i32;

            if delta > 0 {
                indices.lag_index = ctx.prev_lag_index + delta - 1 + MIN_DELTA_LAG;
                absolute = false;
            }
        }

        if absolute {
            let half = geom.fs_khz as i32 / 2;
            let high = dec.decode_symbol_with_cdf(PITCH_HIGH)? as i32;
            let low = dec.decode_symbol_with_cdf(lag_low_cdf(geom.fs_khz))? as i32;

            indices.lag_index = high * half + low;
        }

        ctx.prev_lag_index = indices.lag_index;

        let contours = contour_table(geom.fs_khz, geom.nb_subfr);
        indices.contour_index = dec.decode_symbol_with_cdf(contours.cdf)?;

        indices.per_index = dec.decode_symbol_with_cdf(LTP_PERIODICITY)?;

        for ind in &mut indices.ltp_index[..geom.nb_subfr] {
            *ind = dec.decode_symbol_with_cdf(LTP_FILTER[indices.per_index])? as u8;
        }

        if cond == ConditionalCoding::Independent {
            indices.ltp_scale_index = dec.decode_symbol_with_cdf(LTP_SCALE)?;
        }
    }

    ctx.prev_signal_type = signal_type;

    indices.seed = dec.decode_symbol_with_cdf(UNIFORM4)? as u8;

    return Ok(indices);
}
