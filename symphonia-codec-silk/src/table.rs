// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Probability models, codebooks and other constant tables shared by the encoder and decoder.
//!
//! Every probability model is a cumulative frequency table in the form accepted by
//! [`crate::range`]: `[total, f(1), f(2), ..., total]`. Tables that are cheaper to describe by
//! formula than by value are generated once on first use.

use once_cell::sync::Lazy;

/// Frame type when the voice activity flag is not set: inactive signal, low or high offset.
pub const FRAME_TYPE_INACTIVE: &[u32] = &[256, 26, 256];

/// Frame type when the voice activity flag is set: unvoiced low/high, voiced low/high.
pub const FRAME_TYPE_ACTIVE: &[u32] = &[256, 24, 98, 246, 256];

/// Most significant bits of an independently coded gain index, per signal type.
pub const GAIN_HIGHBITS: [&[u32]; 3] = [
    &[256, 32, 144, 212, 241, 253, 254, 255, 256],
    &[256, 2, 19, 64, 124, 186, 233, 252, 256],
    &[256, 1, 4, 30, 101, 195, 245, 254, 256],
];

/// Least significant bits of an independently coded gain index.
pub const GAIN_LOWBITS: &[u32] = &[256, 32, 64, 96, 128, 160, 192, 224, 256];

/// Delta coded gain index.
pub const GAIN_DELTA: &[u32] = &[
    256, 6, 11, 22, 53, 185, 206, 214, 218, 221, 223, 225, 227, 228, 229, 230, 231, 232, 233, 234,
    235, 236, 237, 238, 239, 240, 241, 242, 243, 244, 245, 246, 247, 248, 249, 250, 251, 252, 253,
    254, 255, 256,
];

/// First stage NLSF index, indexed by `[wideband][voiced]`.
pub const LSF_S1: [[&[u32]; 2]; 2] = [
    [
        &[
            256, 44, 78, 108, 127, 148, 160, 171, 174, 177, 179, 195, 197, 199, 200, 205, 207, 208,
            211, 214, 215, 216, 218, 220, 222, 225, 226, 235, 244, 246, 253, 255, 256,
        ],
        &[
            256, 1, 11, 12, 20, 23, 31, 39, 53, 66, 80, 81, 95, 107, 120, 131, 142, 154, 165, 175,
            185, 196, 204, 213, 221, 228, 236, 237, 238, 244, 245, 251, 256,
        ],
    ],
    [
        &[
            256, 31, 52, 55, 72, 73, 81, 98, 102, 103, 121, 137, 141, 143, 146, 147, 157, 158, 161,
            177, 188, 204, 206, 208, 211, 213, 224, 225, 229, 238, 246, 253, 256,
        ],
        &[
            256, 1, 5, 21, 26, 44, 55, 60, 74, 89, 90, 93, 105, 118, 132, 146, 152, 166, 178, 180,
            186, 187, 199, 211, 222, 232, 235, 245, 250, 251, 252, 253, 256,
        ],
    ],
];

/// Second stage NLSF residual index, offset by 4. Rows 0-7 serve narrowband and mediumband,
/// rows 8-15 wideband.
pub const LSF_S2: [&[u32]; 16] = [
    &[256, 1, 2, 3, 18, 242, 253, 254, 255, 256],
    &[256, 1, 2, 4, 38, 221, 253, 254, 255, 256],
    &[256, 1, 2, 6, 48, 197, 252, 254, 255, 256],
    &[256, 1, 2, 10, 62, 185, 246, 254, 255, 256],
    &[256, 1, 4, 20, 73, 174, 248, 254, 255, 256],
    &[256, 1, 4, 21, 76, 166, 239, 254, 255, 256],
    &[256, 1, 8, 32, 85, 159, 226, 252, 255, 256],
    &[256, 1, 2, 20, 83, 161, 219, 249, 255, 256],
    &[256, 1, 2, 3, 12, 244, 253, 254, 255, 256],
    &[256, 1, 2, 4, 32, 218, 253, 254, 255, 256],
    &[256, 1, 2, 5, 47, 199, 252, 254, 255, 256],
    &[256, 1, 2, 12, 61, 187, 252, 254, 255, 256],
    &[256, 1, 5, 24, 72, 172, 249, 254, 255, 256],
    &[256, 1, 2, 16, 70, 170, 242, 254, 255, 256],
    &[256, 1, 2, 17, 78, 165, 226, 251, 255, 256],
    &[256, 1, 8, 29, 79, 156, 237, 254, 255, 256],
];

/// Magnitude extension of a second stage NLSF residual index.
pub const LSF_EXT: &[u32] = &[256, 156, 216, 240, 249, 253, 255, 256];

/// NLSF interpolation coefficient.
pub const LSF_INTERP: &[u32] = &[256, 13, 35, 64, 75, 256];

pub const UNIFORM4: &[u32] = &[256, 64, 128, 192, 256];
pub const UNIFORM6: &[u32] = &[256, 43, 85, 128, 171, 213, 256];
pub const UNIFORM8: &[u32] = &[256, 32, 64, 96, 128, 160, 192, 224, 256];

/// Excitation rate level, indexed by `[voiced]`.
pub const EXC_RATE: [&[u32]; 2] = [
    &[256, 15, 66, 78, 124, 169, 182, 215, 242, 256],
    &[256, 33, 63, 99, 116, 150, 199, 217, 238, 256],
];

/// Number of pulses in a shell block. Rows 0-8 are rate levels, row 9 follows an escape (17) and
/// row 10 is used after the tenth escape, where a further escape is impossible.
pub const PULSE_COUNT: [&[u32]; 11] = [
    &[256, 131, 205, 230, 238, 241, 244, 245, 246, 247, 248, 249, 250, 251, 252, 253, 254, 255, 256],
    &[256, 58, 151, 211, 234, 241, 244, 245, 246, 247, 248, 249, 250, 251, 252, 253, 254, 255, 256],
    &[256, 43, 94, 140, 173, 197, 213, 224, 232, 238, 241, 244, 247, 249, 250, 251, 253, 254, 256],
    &[256, 17, 69, 140, 197, 228, 240, 245, 246, 247, 248, 249, 250, 251, 252, 253, 254, 255, 256],
    &[256, 6, 27, 68, 121, 170, 205, 226, 237, 243, 246, 248, 250, 251, 252, 253, 254, 255, 256],
    &[256, 7, 21, 43, 71, 100, 128, 153, 173, 190, 203, 214, 223, 230, 235, 239, 243, 246, 256],
    &[256, 2, 7, 21, 50, 92, 138, 179, 210, 229, 240, 246, 249, 251, 252, 253, 254, 255, 256],
    &[256, 1, 3, 7, 17, 36, 65, 100, 137, 171, 199, 219, 233, 241, 246, 250, 252, 254, 256],
    &[256, 1, 3, 5, 10, 19, 33, 53, 77, 104, 132, 158, 181, 201, 216, 227, 235, 241, 256],
    &[256, 1, 2, 3, 9, 36, 94, 150, 189, 214, 228, 238, 244, 247, 250, 252, 253, 254, 256],
    &[256, 2, 3, 9, 36, 94, 150, 189, 214, 228, 238, 244, 247, 250, 252, 253, 254, 256, 256],
];

/// Number of pulses in the first half of a shell partition, indexed by
/// `[partition][pulses in the partition - 1]`. Partitions are 16, 8, 4 and 2 samples long.
pub const PULSE_SPLIT: [[&[u32]; 16]; 4] = [
    [
        &[256, 126, 256],
        &[256, 56, 198, 256],
        &[256, 25, 126, 230, 256],
        &[256, 12, 72, 180, 244, 256],
        &[256, 7, 42, 126, 213, 250, 256],
        &[256, 4, 24, 83, 169, 232, 253, 256],
        &[256, 3, 15, 53, 125, 200, 242, 254, 256],
        &[256, 2, 10, 35, 89, 162, 221, 248, 255, 256],
        &[256, 2, 7, 24, 63, 126, 191, 233, 251, 255, 256],
        &[256, 1, 5, 17, 45, 94, 157, 211, 241, 252, 255, 256],
        &[256, 1, 5, 13, 33, 70, 125, 182, 223, 245, 253, 255, 256],
        &[256, 1, 4, 11, 26, 54, 98, 151, 199, 232, 248, 254, 255, 256],
        &[256, 1, 3, 9, 21, 42, 77, 124, 172, 212, 237, 249, 254, 255, 256],
        &[256, 1, 2, 6, 16, 33, 60, 97, 144, 187, 220, 241, 250, 254, 255, 256],
        &[256, 1, 2, 3, 11, 25, 47, 80, 120, 163, 201, 229, 245, 253, 254, 255, 256],
        &[256, 1, 2, 3, 4, 17, 35, 62, 98, 139, 180, 214, 238, 252, 253, 254, 255, 256],
    ],
    [
        &[256, 127, 256],
        &[256, 53, 202, 256],
        &[256, 22, 127, 233, 256],
        &[256, 11, 72, 183, 246, 256],
        &[256, 6, 41, 127, 215, 251, 256],
        &[256, 4, 24, 83, 170, 232, 253, 256],
        &[256, 3, 16, 56, 127, 200, 241, 254, 256],
        &[256, 3, 12, 39, 92, 162, 218, 246, 255, 256],
        &[256, 3, 11, 30, 67, 124, 185, 229, 249, 255, 256],
        &[256, 3, 10, 25, 53, 97, 151, 200, 233, 250, 255, 256],
        &[256, 1, 8, 21, 43, 77, 123, 171, 209, 237, 251, 255, 256],
        &[256, 1, 2, 13, 35, 62, 97, 139, 186, 219, 244, 254, 255, 256],
        &[256, 1, 2, 8, 22, 48, 85, 128, 171, 208, 234, 248, 254, 255, 256],
        &[256, 1, 2, 6, 16, 36, 67, 107, 149, 189, 220, 240, 250, 254, 255, 256],
        &[256, 1, 2, 5, 13, 29, 55, 90, 128, 166, 201, 227, 243, 251, 254, 255, 256],
        &[256, 1, 2, 4, 10, 22, 43, 73, 109, 147, 183, 213, 234, 246, 252, 254, 255, 256],
    ],
    [
        &[256, 127, 256],
        &[256, 49, 206, 256],
        &[256, 20, 127, 236, 256],
        &[256, 11, 71, 184, 246, 256],
        &[256, 7, 43, 127, 214, 250, 256],
        &[256, 6, 30, 87, 169, 229, 252, 256],
        &[256, 5, 23, 62, 126, 194, 236, 252, 256],
        &[256, 6, 20, 49, 96, 157, 209, 239, 253, 256],
        &[256, 1, 16, 39, 74, 125, 175, 215, 245, 255, 256],
        &[256, 1, 2, 23, 55, 97, 149, 195, 236, 254, 255, 256],
        &[256, 1, 7, 23, 50, 86, 128, 170, 206, 233, 249, 255, 256],
        &[256, 1, 6, 18, 39, 70, 108, 148, 186, 217, 238, 250, 255, 256],
        &[256, 1, 4, 13, 30, 56, 90, 128, 166, 200, 226, 243, 252, 255, 256],
        &[256, 1, 4, 11, 25, 47, 76, 110, 146, 180, 209, 231, 245, 252, 255, 256],
        &[256, 1, 3, 8, 19, 37, 62, 93, 128, 163, 194, 219, 237, 248, 253, 255, 256],
        &[256, 1, 2, 6, 15, 30, 51, 79, 111, 145, 177, 205, 226, 241, 250, 254, 255, 256],
    ],
    [
        &[256, 128, 256],
        &[256, 42, 214, 256],
        &[256, 21, 128, 235, 256],
        &[256, 12, 72, 184, 245, 256],
        &[256, 8, 42, 128, 214, 249, 256],
        &[256, 8, 31, 86, 176, 231, 251, 256],
        &[256, 5, 20, 58, 130, 202, 238, 253, 256],
        &[256, 6, 18, 45, 97, 174, 221, 241, 251, 256],
        &[256, 6, 25, 53, 88, 128, 168, 203, 231, 250, 256],
        &[256, 4, 18, 40, 71, 108, 148, 185, 216, 238, 252, 256],
        &[256, 3, 13, 31, 57, 90, 128, 166, 199, 225, 243, 253, 256],
        &[256, 2, 10, 23, 44, 73, 109, 147, 183, 212, 233, 246, 254, 256],
        &[256, 1, 6, 16, 33, 58, 90, 128, 166, 198, 223, 240, 250, 255, 256],
        &[256, 1, 5, 12, 25, 46, 75, 110, 146, 181, 210, 231, 244, 251, 255, 256],
        &[256, 1, 3, 8, 18, 35, 60, 92, 128, 164, 196, 221, 238, 248, 253, 255, 256],
        &[256, 1, 3, 7, 14, 27, 48, 76, 110, 146, 180, 208, 229, 242, 249, 253, 255, 256],
    ],
];

/// A least significant bit of a pulse magnitude.
pub const EXC_LSB: &[u32] = &[256, 136, 256];

/// Probability of a negative sign out of 256, indexed by
/// `[signal type][quantization offset type][min(pulses in block, 6)]`.
pub const EXC_SIGN: [[[u32; 7]; 2]; 3] = [
    [[2, 207, 189, 179, 174, 163, 157], [58, 245, 238, 232, 225, 220, 211]],
    [[1, 210, 190, 178, 169, 162, 152], [48, 242, 235, 224, 214, 205, 190]],
    [[1, 162, 152, 147, 144, 141, 138], [8, 203, 187, 176, 168, 161, 154]],
];

/// Quantization offsets in Q10, indexed by `[voiced][quantization offset type]`.
pub const QUANT_OFFSETS_Q10: [[i32; 2]; 2] = [[100, 240], [32, 100]];

/// Most significant part of an absolute pitch lag.
pub const PITCH_HIGH: &[u32] = &[
    256, 3, 6, 12, 23, 44, 74, 106, 125, 136, 146, 158, 171, 184, 196, 207, 216, 224, 231, 237, 241,
    243, 245, 247, 248, 249, 250, 251, 252, 253, 254, 255, 256,
];

/// Pitch lag delta against the previous frame, offset by 9. Zero escapes to absolute coding.
pub const PITCH_DELTA: &[u32] = &[
    256, 46, 48, 50, 53, 57, 63, 73, 88, 114, 152, 182, 204, 219, 229, 236, 242, 246, 250, 252, 254,
    256,
];

pub const PITCH_CONTOUR_NB_10MS: &[u32] = &[256, 143, 193, 256];
pub const PITCH_CONTOUR_NB_20MS: &[u32] = &[256, 68, 80, 101, 118, 137, 159, 189, 213, 230, 246, 256];
pub const PITCH_CONTOUR_MBWB_10MS: &[u32] = &[256, 91, 137, 176, 195, 209, 221, 229, 236, 242, 247, 252, 256];
pub const PITCH_CONTOUR_MBWB_20MS: &[u32] = &[
    256, 33, 55, 73, 89, 104, 118, 132, 145, 158, 168, 177, 186, 194, 200, 206, 212, 217, 221, 225,
    229, 232, 235, 238, 240, 242, 244, 246, 248, 250, 252, 253, 254, 255, 256,
];

pub const PITCH_CB_NB_10MS: [[i8; 2]; 3] = [[0, 0], [1, 0], [0, 1]];

pub const PITCH_CB_NB_20MS: [[i8; 4]; 11] = [
    [0, 0, 0, 0],
    [2, 1, 0, -1],
    [-1, 0, 1, 2],
    [-1, 0, 0, 1],
    [-1, 0, 0, 0],
    [0, 0, 0, 1],
    [0, 0, 1, 1],
    [1, 1, 0, 0],
    [1, 0, 0, 0],
    [0, 0, 0, -1],
    [1, 0, 0, -1],
];

pub const PITCH_CB_MBWB_10MS: [[i8; 2]; 12] = [
    [0, 0],
    [0, 1],
    [1, 0],
    [-1, 1],
    [1, -1],
    [-1, 2],
    [2, -1],
    [-2, 2],
    [2, -2],
    [-2, 3],
    [3, -2],
    [-3, 3],
];

pub const PITCH_CB_MBWB_20MS: [[i8; 4]; 34] = [
    [0, 0, 0, 0],
    [0, 0, 1, 1],
    [1, 1, 0, 0],
    [-1, 0, 0, 0],
    [0, 0, 0, 1],
    [1, 0, 0, 0],
    [-1, 0, 0, 1],
    [0, 0, 0, -1],
    [-1, 0, 1, 2],
    [1, 0, 0, -1],
    [-2, -1, 1, 2],
    [2, 1, 0, -1],
    [-2, 0, 0, 2],
    [-2, 0, 1, 3],
    [2, 1, -1, -2],
    [-3, -1, 1, 3],
    [2, 0, 0, -2],
    [3, 1, 0, -2],
    [-3, -1, 2, 4],
    [-4, -1, 1, 4],
    [3, 1, -1, -3],
    [-4, -1, 2, 5],
    [4, 2, -1, -3],
    [4, 1, -1, -4],
    [-5, -1, 2, 6],
    [5, 2, -1, -4],
    [-6, -2, 2, 6],
    [-5, -2, 2, 5],
    [6, 2, -1, -5],
    [-7, -2, 3, 8],
    [6, 2, -2, -6],
    [5, 2, -2, -5],
    [8, 3, -2, -7],
    [-9, -3, 3, 9],
];

/// LTP filter periodicity index. Selects the codebook of [`LTP_FILTER`] and [`LTP_TAPS_Q7`].
pub const LTP_PERIODICITY: &[u32] = &[256, 77, 157, 256];

pub const LTP_FILTER: [&[u32]; 3] = [
    &[256, 185, 200, 213, 226, 235, 244, 250, 256],
    &[256, 57, 91, 112, 132, 147, 160, 172, 185, 195, 205, 214, 224, 233, 241, 248, 256],
    &[
        256, 15, 31, 45, 57, 69, 81, 92, 103, 114, 124, 133, 142, 151, 160, 168, 176, 184, 192, 199,
        206, 212, 218, 223, 227, 232, 236, 240, 244, 247, 251, 254, 256,
    ],
];

/// 5-tap LTP filters in Q7, one codebook per periodicity.
pub const LTP_TAPS_Q7: [&[[i8; 5]]; 3] = [
    &[
        [4, 6, 24, 7, 5],
        [0, 0, 2, 0, 0],
        [12, 28, 41, 13, -4],
        [-9, 15, 42, 25, 14],
        [1, -2, 62, 41, -9],
        [-10, 37, 65, -4, 3],
        [-6, 4, 66, 7, -8],
        [16, 14, 38, -3, 33],
    ],
    &[
        [13, 22, 39, 23, 12],
        [-1, 36, 64, 27, -6],
        [-7, 10, 55, 43, 17],
        [1, 1, 8, 1, 1],
        [6, -11, 74, 53, -9],
        [-12, 55, 76, -12, 8],
        [-3, 3, 93, 27, -4],
        [26, 39, 59, 3, -8],
        [2, 0, 77, 11, 9],
        [-8, 22, 44, -6, 7],
        [40, 9, 26, 3, 9],
        [-7, 20, 101, -7, 4],
        [3, -8, 42, 26, 0],
        [-15, 33, 68, 2, 23],
        [-2, 55, 46, -2, 15],
        [3, -1, 21, 16, 41],
    ],
    &[
        [-6, 27, 61, 39, 5],
        [-11, 42, 88, 4, 1],
        [-2, 60, 65, 6, -4],
        [-1, -5, 73, 56, 1],
        [-9, 19, 94, 29, -9],
        [0, 12, 99, 6, 4],
        [8, -19, 102, 46, -13],
        [3, 2, 13, 3, 2],
        [9, -21, 84, 72, -18],
        [-11, 46, 104, -22, 8],
        [18, 38, 48, 23, 0],
        [-16, 70, 83, -21, 11],
        [5, -11, 117, 22, -8],
        [-6, 23, 117, -12, 3],
        [3, -8, 95, 28, 4],
        [-10, 15, 77, 60, -15],
        [-1, 4, 124, 2, -4],
        [3, 38, 84, 24, -25],
        [2, 13, 42, 13, 31],
        [21, -4, 56, 46, -1],
        [-1, 35, 79, -13, 19],
        [-7, 65, 88, -9, -14],
        [20, 4, 81, 49, -29],
        [20, 0, 75, 3, -17],
        [5, -9, 44, 92, -8],
        [1, -3, 22, 69, 31],
        [-6, 95, 41, -12, 5],
        [39, 67, 16, -4, 1],
        [0, -6, 120, 55, -36],
        [-13, 44, 122, 4, -24],
        [81, 5, 11, 3, 7],
        [2, 0, 9, 10, 88],
    ],
];

pub const LTP_SCALE: &[u32] = &[256, 128, 192, 256];
pub const LTP_SCALES_Q14: [i32; 3] = [15565, 12288, 8192];

/// Per-frame LBRR flags of a packet with two or three frames, minus one.
pub const LBRR_FLAGS_2: &[u32] = &[256, 53, 106, 256];
pub const LBRR_FLAGS_3: &[u32] = &[256, 41, 61, 90, 131, 146, 174, 256];

/// Minimum distance between neighbouring NLSFs in Q15, including both band edges.
pub const NLSF_DELTA_MIN_NB_MB: [i32; 11] = [250, 3, 6, 3, 3, 3, 4, 3, 3, 3, 461];
pub const NLSF_DELTA_MIN_WB: [i32; 17] = [100, 3, 40, 3, 3, 3, 5, 14, 14, 10, 11, 3, 8, 9, 7, 3, 347];

/// Order in which cosines of the NLSFs enter the polynomial construction.
pub const NLSF_ORDERING_NB_MB: [usize; 10] = [0, 9, 6, 3, 4, 5, 8, 1, 2, 7];
pub const NLSF_ORDERING_WB: [usize; 16] = [0, 15, 8, 7, 4, 11, 12, 3, 2, 13, 10, 5, 6, 9, 14, 1];

/// Number of stage-1 NLSF codebook vectors.
pub const NLSF_CB1_SIZE: usize = 32;

/// Stage-1 NLSF codebook vectors in Q8 for 10th order prediction.
pub const NLSF_CB1_NB_MB_Q8: [[u8; 10]; NLSF_CB1_SIZE] = [
    [12, 35, 60, 83, 108, 132, 157, 180, 206, 228],
    [15, 32, 55, 77, 101, 125, 151, 175, 201, 225],
    [19, 42, 66, 89, 114, 137, 162, 184, 209, 230],
    [12, 25, 50, 72, 97, 120, 147, 172, 200, 223],
    [26, 44, 69, 90, 114, 135, 159, 180, 205, 225],
    [13, 22, 53, 80, 106, 130, 156, 180, 205, 228],
    [15, 25, 44, 64, 90, 115, 142, 168, 196, 222],
    [19, 24, 62, 82, 100, 120, 145, 168, 190, 214],
    [22, 31, 50, 79, 103, 120, 151, 170, 203, 227],
    [21, 29, 45, 65, 106, 124, 150, 171, 196, 224],
    [30, 49, 75, 97, 121, 142, 165, 186, 209, 229],
    [19, 25, 52, 70, 93, 116, 143, 166, 192, 219],
    [26, 34, 62, 75, 97, 118, 145, 167, 194, 217],
    [25, 33, 56, 70, 91, 113, 143, 165, 196, 223],
    [21, 34, 51, 72, 97, 117, 145, 171, 196, 222],
    [20, 29, 50, 67, 90, 117, 144, 168, 197, 221],
    [22, 31, 48, 66, 95, 117, 146, 168, 196, 222],
    [24, 33, 51, 77, 116, 134, 158, 180, 200, 224],
    [21, 28, 70, 87, 106, 124, 149, 170, 194, 217],
    [26, 33, 53, 64, 83, 117, 152, 173, 204, 225],
    [27, 34, 65, 95, 108, 129, 155, 174, 210, 225],
    [20, 26, 72, 99, 113, 131, 154, 176, 200, 219],
    [34, 43, 61, 78, 93, 114, 155, 177, 205, 229],
    [23, 29, 54, 97, 124, 138, 163, 179, 209, 229],
    [30, 38, 56, 89, 118, 129, 158, 178, 200, 231],
    [21, 29, 49, 63, 85, 111, 142, 163, 193, 222],
    [27, 48, 77, 103, 133, 158, 179, 196, 215, 232],
    [29, 47, 74, 99, 124, 151, 176, 198, 220, 237],
    [33, 42, 61, 76, 93, 121, 155, 174, 207, 225],
    [29, 53, 87, 112, 136, 154, 170, 188, 208, 227],
    [24, 30, 52, 84, 131, 150, 166, 186, 203, 229],
    [37, 48, 64, 84, 104, 118, 156, 177, 201, 230],
];

/// Stage-1 NLSF codebook vectors in Q8 for 16th order prediction.
pub const NLSF_CB1_WB_Q8: [[u8; 16]; NLSF_CB1_SIZE] = [
    [7, 23, 38, 54, 69, 85, 100, 116, 131, 147, 162, 178, 193, 208, 223, 239],
    [13, 25, 41, 55, 69, 83, 98, 112, 127, 142, 157, 171, 187, 203, 220, 236],
    [15, 21, 34, 51, 61, 78, 92, 106, 126, 136, 152, 167, 185, 205, 225, 240],
    [10, 21, 36, 50, 63, 79, 95, 110, 126, 141, 157, 173, 189, 205, 221, 237],
    [17, 20, 37, 51, 59, 78, 89, 107, 123, 134, 150, 164, 184, 205, 224, 240],
    [10, 15, 32, 51, 67, 81, 96, 112, 129, 142, 158, 173, 189, 204, 220, 236],
    [8, 21, 37, 51, 65, 79, 98, 113, 126, 138, 155, 168, 179, 192, 209, 218],
    [12, 15, 34, 55, 63, 78, 87, 108, 118, 131, 148, 167, 185, 203, 219, 236],
    [16, 19, 32, 36, 56, 68, 99, 102, 112, 132, 141, 161, 180, 199, 216, 233],
    [9, 17, 34, 49, 62, 75, 86, 95, 107, 122, 143, 167, 185, 203, 221, 237],
    [11, 20, 29, 47, 68, 81, 94, 106, 118, 132, 150, 167, 186, 204, 222, 238],
    [18, 33, 38, 61, 71, 82, 95, 105, 123, 137, 151, 167, 182, 198, 215, 233],
    [13, 28, 49, 60, 69, 85, 98, 106, 119, 136, 152, 168, 183, 199, 215, 232],
    [11, 23, 39, 53, 63, 76, 91, 108, 122, 136, 152, 168, 183, 198, 213, 229],
    [17, 27, 37, 48, 64, 78, 97, 114, 124, 134, 146, 163, 181, 201, 220, 237],
    [13, 24, 35, 48, 62, 76, 89, 102, 120, 134, 151, 167, 187, 206, 226, 239],
    [12, 28, 42, 57, 68, 84, 100, 116, 131, 147, 163, 178, 195, 210, 225, 240],
    [10, 21, 39, 54, 70, 86, 101, 116, 131, 146, 161, 176, 191, 207, 222, 237],
    [19, 26, 31, 42, 54, 68, 84, 100, 115, 133, 152, 170, 188, 206, 223, 239],
    [15, 20, 37, 51, 67, 81, 96, 110, 124, 138, 153, 168, 184, 201, 218, 235],
    [14, 21, 30, 43, 60, 78, 95, 112, 128, 143, 158, 174, 190, 207, 223, 239],
    [11, 17, 27, 40, 55, 70, 87, 104, 122, 139, 156, 171, 186, 202, 219, 235],
    [15, 29, 45, 60, 77, 91, 108, 122, 137, 151, 166, 180, 195, 210, 225, 240],
    [9, 18, 32, 51, 68, 85, 102, 119, 136, 153, 170, 187, 204, 221, 238, 248],
    [14, 24, 32, 45, 61, 73, 89, 104, 117, 131, 145, 161, 179, 198, 218, 236],
    [11, 19, 33, 47, 59, 72, 88, 103, 117, 130, 144, 158, 175, 194, 215, 235],
    [16, 24, 35, 53, 67, 78, 92, 107, 120, 138, 155, 170, 186, 202, 219, 236],
    [13, 22, 40, 58, 73, 88, 102, 115, 129, 142, 157, 172, 188, 205, 222, 239],
    [10, 18, 29, 44, 58, 74, 90, 106, 122, 139, 156, 172, 188, 204, 221, 238],
    [20, 28, 40, 54, 67, 81, 94, 108, 123, 138, 154, 170, 187, 204, 221, 237],
    [12, 20, 31, 44, 59, 75, 92, 109, 125, 140, 155, 170, 186, 203, 220, 237],
    [15, 25, 38, 50, 64, 77, 91, 106, 122, 137, 153, 169, 186, 203, 221, 238],
];

/// Row of [`LSF_S2`] coding each stage-2 residual, per stage-1 vector.
pub const NLSF_CB2_SELECT_NB_MB: [[u8; 10]; NLSF_CB1_SIZE] = [
    [0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [1, 3, 1, 2, 2, 1, 2, 1, 1, 1],
    [2, 1, 1, 1, 1, 1, 1, 1, 1, 1],
    [1, 2, 2, 2, 2, 1, 2, 1, 1, 1],
    [2, 3, 3, 3, 3, 2, 2, 2, 2, 2],
    [0, 5, 3, 3, 2, 2, 2, 2, 1, 1],
    [0, 2, 2, 2, 2, 2, 2, 2, 2, 1],
    [2, 3, 6, 4, 4, 4, 5, 4, 5, 5],
    [2, 4, 5, 5, 4, 5, 4, 6, 4, 4],
    [2, 4, 4, 7, 4, 5, 4, 5, 5, 4],
    [4, 3, 3, 3, 2, 3, 2, 2, 2, 2],
    [1, 5, 5, 6, 4, 5, 4, 5, 5, 5],
    [2, 7, 4, 6, 5, 5, 5, 5, 5, 5],
    [2, 7, 5, 5, 5, 5, 5, 6, 5, 4],
    [3, 3, 5, 4, 4, 5, 4, 5, 4, 4],
    [2, 3, 3, 5, 5, 4, 4, 4, 4, 4],
    [2, 4, 4, 6, 4, 5, 4, 5, 5, 5],
    [2, 5, 4, 6, 5, 5, 5, 4, 5, 4],
    [2, 7, 4, 5, 4, 5, 4, 5, 5, 5],
    [2, 5, 4, 6, 7, 6, 5, 6, 5, 4],
    [3, 6, 7, 4, 6, 5, 5, 6, 4, 5],
    [2, 7, 6, 4, 4, 4, 5, 4, 5, 5],
    [4, 5, 5, 4, 6, 6, 5, 6, 5, 4],
    [2, 5, 5, 6, 5, 6, 4, 6, 4, 4],
    [4, 5, 5, 5, 3, 7, 4, 5, 5, 4],
    [2, 3, 4, 5, 5, 6, 4, 5, 5, 4],
    [2, 3, 2, 3, 3, 4, 2, 3, 3, 3],
    [1, 1, 2, 2, 2, 2, 2, 3, 2, 2],
    [4, 5, 5, 6, 6, 6, 5, 6, 4, 5],
    [3, 5, 5, 4, 4, 4, 4, 3, 3, 2],
    [2, 5, 3, 7, 5, 5, 4, 4, 5, 4],
    [4, 4, 5, 4, 5, 6, 5, 6, 5, 4],
];

/// Row of [`LSF_S2`] coding each stage-2 residual, per stage-1 vector, counted from the first
/// wideband row.
pub const NLSF_CB2_SELECT_WB: [[u8; 16]; NLSF_CB1_SIZE] = [
    [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [2, 3, 3, 3, 3, 3, 2, 2, 2, 2, 2, 1, 1, 1, 0, 3],
    [2, 5, 5, 3, 7, 4, 4, 5, 2, 5, 4, 5, 5, 4, 3, 3],
    [0, 2, 1, 2, 2, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 1],
    [0, 6, 5, 4, 6, 4, 7, 5, 4, 4, 4, 5, 5, 4, 4, 3],
    [0, 3, 5, 5, 4, 3, 3, 5, 3, 3, 3, 3, 3, 3, 2, 4],
    [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 2, 6, 3, 7, 2, 5, 3, 4, 5, 5, 4, 3, 3, 2, 3],
    [0, 6, 2, 6, 6, 4, 5, 4, 6, 5, 4, 4, 5, 3, 3, 3],
    [2, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
    [2, 2, 3, 4, 5, 3, 3, 3, 3, 3, 3, 3, 2, 2, 1, 3],
    [2, 2, 3, 3, 4, 3, 3, 3, 3, 3, 3, 3, 3, 2, 1, 3],
    [3, 4, 4, 4, 6, 4, 4, 5, 3, 5, 4, 4, 5, 4, 3, 4],
    [0, 6, 4, 5, 4, 7, 5, 2, 6, 5, 7, 4, 4, 3, 5, 3],
    [0, 1, 0, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 1, 0],
    [1, 6, 5, 7, 5, 4, 5, 3, 4, 5, 4, 4, 4, 3, 3, 4],
    [1, 3, 3, 4, 4, 3, 3, 5, 2, 3, 3, 5, 5, 5, 3, 4],
    [0, 6, 4, 6, 4, 5, 4, 5, 4, 5, 6, 4, 5, 4, 3, 3],
    [0, 2, 0, 3, 2, 3, 3, 3, 3, 3, 3, 2, 2, 2, 2, 1],
    [0, 5, 6, 5, 5, 4, 4, 5, 4, 5, 6, 4, 5, 4, 4, 3],
    [2, 3, 3, 5, 5, 5, 4, 4, 4, 4, 4, 3, 3, 3, 2, 4],
    [0, 3, 5, 3, 4, 3, 3, 3, 3, 3, 3, 3, 3, 3, 2, 3],
    [0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
    [3, 5, 3, 5, 4, 4, 5, 4, 4, 4, 4, 4, 3, 3, 3, 3],
    [2, 4, 5, 4, 6, 5, 4, 5, 4, 5, 5, 4, 4, 3, 2, 3],
    [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [1, 6, 5, 6, 4, 4, 4, 4, 4, 4, 4, 3, 3, 3, 3, 3],
    [2, 3, 3, 4, 3, 3, 3, 3, 3, 3, 3, 3, 3, 2, 2, 2],
    [2, 5, 5, 4, 5, 4, 5, 5, 4, 4, 4, 3, 3, 3, 3, 3],
    [0, 2, 3, 2, 3, 3, 3, 3, 3, 2, 2, 2, 2, 2, 2, 1],
    [2, 6, 5, 5, 5, 4, 4, 4, 4, 4, 3, 4, 3, 3, 3, 3],
];

/// Backward predictor, an index into [`NLSF_PRED_NB_MB_Q8`], of each stage-2 residual.
pub const NLSF_PRED_SELECT_NB_MB: [[u8; 9]; NLSF_CB1_SIZE] = [
    [0, 1, 0, 0, 0, 0, 0, 0, 0],
    [1, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 0, 0, 0, 0],
    [1, 1, 1, 0, 0, 0, 0, 1, 0],
    [0, 1, 0, 0, 0, 0, 0, 0, 0],
    [0, 1, 0, 0, 0, 0, 0, 0, 0],
    [1, 0, 1, 1, 0, 0, 0, 1, 0],
    [0, 1, 1, 0, 0, 1, 1, 0, 0],
    [0, 0, 1, 1, 0, 1, 0, 1, 1],
    [0, 0, 1, 1, 0, 0, 1, 1, 1],
    [0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 1, 0, 1, 1, 1, 1, 1, 0],
    [0, 1, 0, 1, 1, 1, 1, 1, 0],
    [0, 1, 1, 1, 1, 1, 1, 1, 0],
    [1, 0, 1, 1, 0, 1, 1, 1, 1],
    [0, 1, 1, 1, 1, 1, 0, 1, 0],
    [0, 0, 1, 1, 0, 1, 0, 1, 0],
    [0, 0, 1, 1, 1, 0, 1, 1, 1],
    [0, 1, 1, 0, 0, 1, 1, 1, 0],
    [0, 0, 0, 1, 1, 1, 0, 1, 0],
    [0, 1, 1, 0, 0, 1, 0, 1, 0],
    [0, 1, 1, 0, 0, 0, 1, 1, 0],
    [0, 0, 0, 0, 0, 1, 1, 1, 1],
    [0, 0, 1, 1, 0, 0, 0, 1, 1],
    [0, 0, 0, 1, 0, 1, 1, 1, 1],
    [0, 1, 1, 1, 1, 1, 1, 1, 0],
    [0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 1, 0, 1, 1, 0, 1, 0],
    [1, 0, 0, 1, 0, 0, 0, 0, 0],
    [0, 0, 0, 1, 1, 0, 1, 0, 1],
    [1, 0, 1, 1, 0, 1, 1, 1, 1],
];

/// Backward predictor, an index into [`NLSF_PRED_WB_Q8`], of each stage-2 residual.
pub const NLSF_PRED_SELECT_WB: [[u8; 15]; NLSF_CB1_SIZE] = [
    [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
    [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 1, 0, 0, 1, 1, 1, 0, 1, 1, 1, 1, 0, 0],
    [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0],
    [0, 1, 1, 0, 1, 0, 1, 1, 0, 1, 1, 1, 1, 1, 0],
    [0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1, 0],
    [0, 1, 1, 0, 0, 0, 1, 0, 1, 1, 1, 0, 1, 0, 1],
    [0, 1, 0, 1, 1, 0, 1, 0, 1, 0, 1, 1, 1, 1, 1],
    [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
    [0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 1, 0, 1, 1, 1, 1, 1, 1, 1, 0, 1, 0, 0],
    [0, 0, 1, 0, 0, 1, 0, 1, 0, 1, 0, 0, 1, 0, 0],
    [0, 0, 0, 0, 1, 1, 0, 1, 0, 1, 1, 1, 1, 0, 0],
    [0, 1, 0, 0, 0, 1, 1, 0, 1, 1, 1, 0, 1, 1, 1],
    [0, 0, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 0],
    [0, 1, 1, 0, 1, 0, 1, 1, 1, 1, 1, 0, 1, 0, 0],
    [0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 1, 1, 1, 0, 0],
    [0, 1, 0, 1, 1, 1, 1, 1, 1, 0, 1, 1, 1, 0, 1],
    [0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 1, 1, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0],
    [0, 0, 1, 1, 1, 0, 1, 0, 1, 1, 1, 1, 1, 0, 0],
    [0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 0, 1, 0, 0],
    [0, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0],
    [0, 0, 1, 0, 1, 1, 1, 1, 1, 1, 1, 0, 1, 1, 0],
    [0, 0, 0, 1, 1, 0, 1, 1, 1, 0, 0, 0, 0, 1, 0],
    [0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
    [0, 1, 0, 1, 1, 1, 1, 1, 1, 0, 1, 1, 1, 0, 0],
    [0, 0, 1, 0, 0, 1, 0, 1, 0, 1, 0, 0, 0, 0, 0],
    [0, 0, 1, 0, 1, 0, 1, 0, 1, 1, 1, 1, 1, 1, 0],
    [0, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 1, 0, 1, 1, 1, 1, 0, 1, 1, 1, 0, 1, 1, 0],
];

/// Prediction coefficients between neighbouring stage-2 residuals in Q8.
pub const NLSF_PRED_NB_MB_Q8: [[u8; 9]; 2] =
    [[179, 138, 140, 148, 151, 149, 153, 151, 163], [116, 67, 82, 59, 92, 72, 100, 89, 92]];

pub const NLSF_PRED_WB_Q8: [[u8; 15]; 2] = [
    [175, 148, 160, 176, 178, 173, 174, 164, 177, 174, 196, 182, 198, 192, 182],
    [68, 62, 66, 60, 72, 117, 85, 90, 118, 136, 151, 142, 160, 142, 155],
];

/// Weights of the stage-1 vectors in Q9, scaling residuals from Q10 to Q15.
pub static NLSF_CB1_WGHT_NB_MB_Q9: Lazy<[[i16; 10]; NLSF_CB1_SIZE]> =
    Lazy::new(|| codebook_weights(&NLSF_CB1_NB_MB_Q8));

pub static NLSF_CB1_WGHT_WB_Q9: Lazy<[[i16; 16]; NLSF_CB1_SIZE]> =
    Lazy::new(|| codebook_weights(&NLSF_CB1_WB_Q8));

/// Approximates the square root of the Laroia weight of each codebook entry from the distances to
/// its neighbours.
fn codebook_weights<const N: usize>(cb: &[[u8; N]; NLSF_CB1_SIZE]) -> [[i16; N]; NLSF_CB1_SIZE] {
    let mut out = [[0; N]; NLSF_CB1_SIZE];

    for (weights, vector) in out.iter_mut().zip(cb) {
        for (k, w) in weights.iter_mut().enumerate() {
            let x = i32::from(vector[k]);
            let lo = if k > 0 { i32::from(vector[k - 1]) } else { 0 };
            let hi = if k + 1 < N { i32::from(vector[k + 1]) } else { 256 };

            let w2_q18 = (1024 / (x - lo) + 1024 / (hi - x)) << 16;

            let i = 32 - w2_q18.leading_zeros() as i32;
            let f = (w2_q18 >> (i - 8)) & 127;
            let y = (if i & 1 != 0 { 32768 } else { 46214 }) >> ((32 - i) >> 1);

            *w = (y + ((213 * f * y) >> 16)) as i16;
        }
    }

    return out;
}

/// Number of entries in [`NLSF_COS_Q12`] minus one.
pub const NLSF_COS_TABLE_SIZE: usize = 128;

/// `2 * cos(pi * i / 128)` in Q12.
pub static NLSF_COS_Q12: Lazy<[i32; NLSF_COS_TABLE_SIZE + 1]> = Lazy::new(|| {
    let mut table = [0; NLSF_COS_TABLE_SIZE + 1];

    for (i, v) in table.iter_mut().enumerate() {
        let w = std::f64::consts::PI * i as f64 / NLSF_COS_TABLE_SIZE as f64;
        *v = (8192.0 * w.cos()).round() as i32;
    }

    table
});

/// Cost in Q5 bits of each symbol of a cumulative frequency table. Zero probability symbols cost
/// far more than any real symbol.
pub(crate) fn symbol_costs_q5(cdf: &[u32]) -> Vec<i32> {
    let ft = cdf[0] as f64;

    return (1..cdf.len())
        .map(|k| {
            let fl = if k > 1 { cdf[k - 1] } else { 0 };
            let p = (cdf[k] - fl) as f64 / ft;

            if p > 0.0 {
                (-p.log2() * 32.0).round() as i32
            }
            else {
                1 << 10
            }
        })
        .collect();
}

/// Cost of each rate level, indexed by `[voiced][level]`.
pub static RATE_LEVEL_BITS_Q5: Lazy<[Vec<i32>; 2]> =
    Lazy::new(|| [symbol_costs_q5(EXC_RATE[0]), symbol_costs_q5(EXC_RATE[1])]);

/// Cost of each pulse count symbol, indexed by `[row][count]`.
pub static PULSE_COUNT_BITS_Q5: Lazy<Vec<Vec<i32>>> =
    Lazy::new(|| PULSE_COUNT.iter().map(|cdf| symbol_costs_q5(cdf)).collect());

/// Cost of each stage-2 NLSF residual symbol, indexed by `[row][residual + 4]`.
pub static LSF_S2_BITS_Q5: Lazy<Vec<Vec<i32>>> =
    Lazy::new(|| LSF_S2.iter().map(|cdf| symbol_costs_q5(cdf)).collect());

/// Cost of each LTP filter index, indexed by `[periodicity][index]`.
pub static LTP_FILTER_BITS_Q5: Lazy<Vec<Vec<i32>>> =
    Lazy::new(|| LTP_FILTER.iter().map(|cdf| symbol_costs_q5(cdf)).collect());

/// Achievable SNR in Q7 divided by 21 for target rates from 4 kbps upwards in steps of 400 bps.
pub const TARGET_RATE_NB_21: [u8; 107] = [
    0, 15, 39, 52, 61, 68, 74, 79, 84, 88, 92, 95, 99, 102, 105, 108, 111, 114, 117, 119, 122, 124,
    126, 129, 131, 133, 135, 137, 139, 142, 143, 145, 147, 149, 151, 153, 155, 157, 158, 160, 162,
    163, 165, 167, 168, 170, 171, 173, 174, 176, 177, 179, 180, 182, 183, 185, 186, 187, 189, 190,
    192, 193, 194, 196, 197, 199, 200, 201, 203, 204, 205, 207, 208, 209, 211, 212, 213, 215, 216,
    217, 219, 220, 221, 223, 224, 225, 227, 228, 230, 231, 232, 234, 235, 236, 238, 239, 241, 242,
    243, 245, 246, 248, 249, 250, 252, 253, 255,
];

pub const TARGET_RATE_MB_21: [u8; 155] = [
    0, 0, 28, 43, 52, 59, 65, 70, 74, 78, 81, 85, 87, 90, 93, 95, 98, 100, 102, 105, 107, 109, 111,
    113, 115, 116, 118, 120, 122, 123, 125, 127, 128, 130, 131, 133, 134, 136, 137, 138, 140, 141,
    143, 144, 145, 147, 148, 149, 151, 152, 153, 154, 156, 157, 158, 159, 160, 162, 163, 164, 165,
    166, 167, 168, 169, 171, 172, 173, 174, 175, 176, 177, 178, 179, 180, 181, 182, 183, 184, 185,
    186, 187, 188, 188, 189, 190, 191, 192, 193, 194, 195, 196, 197, 198, 199, 200, 201, 202, 203,
    203, 204, 205, 206, 207, 208, 209, 210, 211, 212, 213, 214, 214, 215, 216, 217, 218, 219, 220,
    221, 222, 223, 224, 224, 225, 226, 227, 228, 229, 230, 231, 232, 233, 234, 235, 236, 236, 237,
    238, 239, 240, 241, 242, 243, 244, 245, 246, 247, 248, 249, 250, 251, 252, 253, 254, 255,
];

pub const TARGET_RATE_WB_21: [u8; 191] = [
    0, 0, 0, 8, 29, 41, 49, 56, 62, 66, 70, 74, 77, 80, 83, 86, 88, 91, 93, 95, 97, 99, 101, 103,
    105, 107, 108, 110, 112, 113, 115, 116, 118, 119, 121, 122, 123, 125, 126, 127, 129, 130, 131,
    132, 134, 135, 136, 137, 138, 140, 141, 142, 143, 144, 145, 146, 147, 148, 149, 150, 151, 152,
    153, 154, 156, 157, 158, 159, 159, 160, 161, 162, 163, 164, 165, 166, 167, 168, 169, 170, 171,
    171, 172, 173, 174, 175, 176, 177, 177, 178, 179, 180, 181, 181, 182, 183, 184, 185, 185, 186,
    187, 188, 189, 189, 190, 191, 192, 192, 193, 194, 195, 195, 196, 197, 198, 198, 199, 200, 200,
    201, 202, 203, 203, 204, 205, 206, 206, 207, 208, 209, 209, 210, 211, 211, 212, 213, 214, 214,
    215, 216, 216, 217, 218, 219, 219, 220, 221, 221, 222, 223, 224, 224, 225, 226, 226, 227, 228,
    229, 229, 230, 231, 232, 232, 233, 234, 234, 235, 236, 237, 237, 238, 239, 240, 240, 241, 242,
    243, 243, 244, 245, 246, 246, 247, 248, 249, 249, 250, 251, 252, 253, 255,
];

/// Number of interpolation points of the transition low-pass filter.
pub const TRANSITION_INT_NUM: usize = 5;

/// Numerators of the transition low-pass filter in Q28, from the widest to the narrowest cutoff.
pub const TRANSITION_LP_B_Q28: [[i32; 3]; TRANSITION_INT_NUM] = [
    [250767114, 501534038, 250767114],
    [209867381, 419732057, 209867381],
    [170987846, 341967853, 170987846],
    [131531482, 263046905, 131531482],
    [89306658, 178584282, 89306658],
];

/// Denominators of the transition low-pass filter in Q28, without the leading one.
pub const TRANSITION_LP_A_Q28: [[i32; 2]; TRANSITION_INT_NUM] = [
    [506393414, 239854379],
    [411067935, 169683996],
    [306733530, 116694253],
    [185807084, 77959395],
    [35497197, 57401098],
];

#[cfg(test)]
mod tests {
    use super::*;

    fn is_valid_cdf(cdf: &[u32]) -> bool {
        return cdf.len() >= 3
            && cdf[0] == 256
            && cdf[cdf.len() - 1] == 256
            && cdf[1..].windows(2).all(|w| w[0] <= w[1]);
    }

    #[test]
    fn verify_cdfs_are_well_formed() {
        let mut all: Vec<&[u32]> = vec![
            FRAME_TYPE_INACTIVE,
            FRAME_TYPE_ACTIVE,
            GAIN_LOWBITS,
            GAIN_DELTA,
            LSF_EXT,
            LSF_INTERP,
            UNIFORM4,
            UNIFORM6,
            UNIFORM8,
            EXC_LSB,
            PITCH_HIGH,
            PITCH_DELTA,
            PITCH_CONTOUR_NB_10MS,
            PITCH_CONTOUR_NB_20MS,
            PITCH_CONTOUR_MBWB_10MS,
            PITCH_CONTOUR_MBWB_20MS,
            LTP_PERIODICITY,
            LTP_SCALE,
            LBRR_FLAGS_2,
            LBRR_FLAGS_3,
        ];

        all.extend(GAIN_HIGHBITS);
        all.extend(LSF_S1.iter().flatten());
        all.extend(LSF_S2);
        all.extend(EXC_RATE);
        all.extend(PULSE_COUNT);
        all.extend(PULSE_SPLIT.iter().flatten());
        all.extend(LTP_FILTER);

        for cdf in all {
            assert!(is_valid_cdf(cdf), "{:?}", cdf);
        }
    }

    #[test]
    fn verify_table_shapes() {
        for (i, row) in PULSE_SPLIT.iter().enumerate() {
            for (n, cdf) in row.iter().enumerate() {
                assert_eq!(cdf.len(), n + 3, "partition {} pulses {}", i, n + 1);
            }
        }

        assert_eq!(PITCH_CONTOUR_NB_10MS.len() - 1, PITCH_CB_NB_10MS.len());
        assert_eq!(PITCH_CONTOUR_NB_20MS.len() - 1, PITCH_CB_NB_20MS.len());
        assert_eq!(PITCH_CONTOUR_MBWB_10MS.len() - 1, PITCH_CB_MBWB_10MS.len());
        assert_eq!(PITCH_CONTOUR_MBWB_20MS.len() - 1, PITCH_CB_MBWB_20MS.len());

        for (cdf, cb) in LTP_FILTER.iter().zip(LTP_TAPS_Q7.iter()) {
            assert_eq!(cdf.len() - 1, cb.len());
        }
    }

    #[test]
    fn verify_nlsf_codebooks() {
        for cb in NLSF_CB1_NB_MB_Q8.iter() {
            assert!(cb.windows(2).all(|w| w[0] < w[1]), "{:?}", cb);
        }

        for cb in NLSF_CB1_WB_Q8.iter() {
            assert!(cb.windows(2).all(|w| w[0] < w[1]), "{:?}", cb);
        }

        // Residual rows stay within their half of the second stage tables.
        assert!(NLSF_CB2_SELECT_NB_MB.iter().flatten().all(|&r| r < 8));
        assert!(NLSF_CB2_SELECT_WB.iter().flatten().all(|&r| r < 8));
        assert!(NLSF_PRED_SELECT_NB_MB.iter().flatten().all(|&p| p < 2));
        assert!(NLSF_PRED_SELECT_WB.iter().flatten().all(|&p| p < 2));

        assert_eq!(NLSF_CB2_SELECT_NB_MB[7], [2, 3, 6, 4, 4, 4, 5, 4, 5, 5]);
        assert_eq!(NLSF_CB2_SELECT_NB_MB[19], [2, 5, 4, 6, 7, 6, 5, 6, 5, 4]);
        assert_eq!(NLSF_CB2_SELECT_NB_MB[31], [4, 4, 5, 4, 5, 6, 5, 6, 5, 4]);
        assert_eq!(NLSF_CB2_SELECT_WB[2], [2, 5, 5, 3, 7, 4, 4, 5, 2, 5, 4, 5, 5, 4, 3, 3]);
        assert_eq!(NLSF_CB2_SELECT_WB[5], [0, 3, 5, 5, 4, 3, 3, 5, 3, 3, 3, 3, 3, 3, 2, 4]);
        assert_eq!(NLSF_CB2_SELECT_WB[8], [0, 6, 2, 6, 6, 4, 5, 4, 6, 5, 4, 4, 5, 3, 3, 3]);
        assert_eq!(NLSF_PRED_SELECT_WB[0][14], 1);
    }

    #[test]
    fn verify_nlsf_codebook_weights() {
        assert_eq!(NLSF_CB1_WGHT_NB_MB_Q9[0], [2897, 2314, 2314, 2314, 2287, 2287, 2314, 2300, 2327, 2287]);
        assert_eq!(NLSF_CB1_WGHT_WB_Q9[0][..4], [3657, 2925, 2925, 2925]);
        assert_eq!(NLSF_CB1_WGHT_WB_Q9[0][15], 2846);
    }

    #[test]
    fn verify_generated_tables() {
        assert_eq!(NLSF_COS_Q12[0], 8192);
        assert_eq!(NLSF_COS_Q12[64], 0);
        assert_eq!(NLSF_COS_Q12[128], -8192);

        assert_eq!(RATE_LEVEL_BITS_Q5[0].len(), 9);
        assert_eq!(PULSE_COUNT_BITS_Q5[0][0], (-(131f64 / 256.0).log2() * 32.0).round() as i32);
        assert_eq!(PULSE_COUNT_BITS_Q5[10][17], 1 << 10);
    }
}
