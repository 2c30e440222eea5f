// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("invalid internal sample rate limits: min {min} Hz, max {max} Hz, desired {desired} Hz")]
    InvalidInternalRate { min: u32, max: u32, desired: u32 },

    #[error("invalid payload size: {0} ms")]
    InvalidPayloadSize(u32),

    #[error("invalid complexity: {0}")]
    InvalidComplexity(u32),

    #[error("invalid bitrate: {0} bps")]
    InvalidBitrate(u32),

    #[error("invalid packet loss percentage: {0}")]
    InvalidPacketLoss(u32),

    #[error("invalid channel count: {0}")]
    InvalidChannelCount(usize),

    #[error("invalid input length: expected {expected} samples, got {actual}")]
    InvalidInputLength { expected: usize, actual: usize },

    #[error("output buffer too small: need {needed} samples, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("invalid cdf")]
    InvalidCdf,

    #[error("invalid frame type")]
    InvalidFrameType,

    #[error("invalid quantization offset type")]
    InvalidQuantizationOffsetType,

    #[error("decoding error: {0}")]
    DecodingError(&'static str),

    #[error("encoding error: {0}")]
    EncodingError(&'static str),
}

impl From<Error> for symphonia_core::errors::Error {
    fn from(err: Error) -> Self {
        return symphonia_core::errors::Error::DecodeError(err.to_string().leak());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_symphonia_error() {
        let err: symphonia_core::errors::Error = Error::InvalidComplexity(11).into();

        match err {
            symphonia_core::errors::Error::DecodeError(msg) => assert_eq!(msg, "invalid complexity: 11"),
            _ => panic!("unexpected error kind"),
        }
    }
}
