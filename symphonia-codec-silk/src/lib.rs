// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Symphonia crates. Please see clippy.toml for their
// justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::excessive_precision)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]
// Disable to better express the fixed-point reference arithmetic.
#![allow(clippy::collapsible_else_if)]

//! A SILK speech codec core.
//!
//! [`SilkEncoder`] turns 10 to 60 ms of PCM into a [`Packet`], and [`SilkDecoder`] turns packets
//! back into PCM, concealing lost packets or rebuilding them from the redundancy carried by the
//! following packet.

pub mod analysis;
pub mod bandwidth;
pub mod cng;
pub mod config;
pub mod control;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod fixed;
pub mod frame;
pub mod gain;
pub mod indices;
pub mod lpc;
pub mod nlsf;
pub mod nsq;
pub mod packet;
pub mod pitch;
pub mod plc;
pub mod pulses;
pub mod range;
pub mod resample;
pub mod stereo;
mod table;

pub use config::{DecoderConfig, EncoderConfig};
pub use decoder::SilkDecoder;
pub use encoder::SilkEncoder;
pub use error::{Error, Result};
pub use frame::{Bandwidth, FrameDuration};
pub use packet::Packet;
