// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::{cdf_total, ilog, CODE_BITS, CODE_BOT, CODE_SHIFT, CODE_TOP, SYM_BITS, SYM_MAX};
use crate::error::{Error, Result};

/// Range encoder, the exact inverse of [`super::Decoder`].
///
/// The encoder is cheap to clone. The encoder's rate control loop relies on cloning it to take a
/// snapshot before a trial encode and restoring the snapshot if the trial is rejected.
///
/// https://datatracker.ietf.org/doc/html/rfc6716#section-5.1
#[derive(Clone, Debug)]
pub struct Encoder {
    buf: Vec<u8>,
    range: u32,
    low: u32,
    /// The last byte produced, held back until the carry is known. Negative if none.
    rem: i32,
    /// Number of pending 0xFF bytes held back for carry propagation.
    ext: u32,
    nbits_total: u32,
}

impl Default for Encoder {
    fn default() -> Self {
        return Self::new();
    }
}

impl Encoder {
    pub fn new() -> Self {
        return Encoder {
            buf: Vec::with_capacity(256),
            range: CODE_TOP,
            low: 0,
            rem: -1,
            ext: 0,
            nbits_total: CODE_BITS + 1,
        };
    }

    /// Encodes symbol `sym` with a cumulative frequency table.
    pub fn encode_symbol_with_cdf(&mut self, sym: usize, cdf: &[u32]) -> Result<()> {
        let ft = cdf_total(cdf)?;

        if sym + 2 > cdf.len() {
            return Err(Error::EncodingError("symbol out of range"));
        }

        let fl = if sym > 0 { cdf[sym] } else { 0 };
        let fh = cdf[sym + 1];

        if fh <= fl {
            return Err(Error::EncodingError("symbol has zero probability"));
        }

        let r = self.range / ft;

        if fl > 0 {
            self.low = self.low.wrapping_add(self.range - r * (ft - fl));
            self.range = r * (fh - fl);
        }
        else {
            self.range -= r * (ft - fh);
        }

        self.normalize();

        return Ok(());
    }

    /// Encodes a binary symbol where a "1" has probability `1 / 2^logp`.
    pub fn encode_bit_log_p(&mut self, bit: bool, logp: u32) {
        debug_assert!(logp > 0 && logp <= 24);

        let s = self.range >> logp;
        let r = self.range - s;

        if bit {
            self.low = self.low.wrapping_add(r);
            self.range = s;
        }
        else {
            self.range = r;
        }

        self.normalize();
    }

    /// Returns the number of whole bits written so far, rounded up.
    pub fn tell(&self) -> u32 {
        return self.nbits_total - ilog(self.range);
    }

    /// Overwrites the first `nbits` bits of the stream with `val`.
    ///
    /// The caller must have reserved the bits by first encoding a symbol of probability
    /// `1 / 2^nbits` at the start of the stream.
    pub fn patch_initial_bits(&mut self, val: u32, nbits: u32) -> Result<()> {
        debug_assert!(nbits > 0 && nbits <= SYM_BITS);

        let shift = SYM_BITS - nbits;
        let mask = ((1u32 << nbits) - 1) << shift;

        if !self.buf.is_empty() {
            self.buf[0] = ((self.buf[0] as u32 & !mask) | (val << shift)) as u8;
        }
        else if self.rem >= 0 {
            self.rem = ((self.rem as u32 & !mask) | (val << shift)) as i32;
        }
        else if self.range <= CODE_TOP >> nbits {
            self.low = (self.low & !(mask << CODE_SHIFT)) | (val << (CODE_SHIFT + shift));
        }
        else {
            return Err(Error::EncodingError("initial bits were not reserved"));
        }

        return Ok(());
    }

    /// Flushes the encoder and returns the payload.
    pub fn finish(mut self) -> Vec<u8> {
        let nbytes = ((self.tell() + 7) >> 3) as usize;

        let mut l = CODE_BITS as i32 - ilog(self.range) as i32;
        let mut mask = (CODE_TOP - 1) >> l;
        let mut end = self.low.wrapping_add(mask) & !mask;

        if (end | mask) as u64 >= self.low as u64 + self.range as u64 {
            l += 1;
            mask >>= 1;
            end = self.low.wrapping_add(mask) & !mask;
        }

        while l > 0 {
            self.carry_out(end >> CODE_SHIFT);
            end = (end << SYM_BITS) & (CODE_TOP - 1);
            l -= SYM_BITS as i32;
        }

        if self.rem >= 0 || self.ext > 0 {
            self.carry_out(0);
        }

        if self.buf.len() < nbytes {
            self.buf.resize(nbytes, 0);
        }

        return self.buf;
    }

    fn normalize(&mut self) {
        while self.range <= CODE_BOT {
            self.carry_out(self.low >> CODE_SHIFT);
            self.low = (self.low << SYM_BITS) & (CODE_TOP - 1);
            self.range <<= SYM_BITS;
            self.nbits_total += SYM_BITS;
        }
    }

    /// Outputs a byte, propagating a carry into any previously held bytes.
    fn carry_out(&mut self, c: u32) {
        if c != SYM_MAX {
            let carry = c >> SYM_BITS;

            if self.rem >= 0 {
                self.buf.push((self.rem as u32 + carry) as u8);
            }

            if self.ext > 0 {
                let sym = ((SYM_MAX + carry) & SYM_MAX) as u8;
                self.buf.extend(std::iter::repeat(sym).take(self.ext as usize));
                self.ext = 0;
            }

            self.rem = (c & SYM_MAX) as i32;
        }
        else {
            self.ext += 1;
        }
    }
}
