// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Range coder implementing rfc6716#section-4.1 and its encoder counterpart.
//!
//! Probability models are expressed as cumulative frequency tables of the form
//! `[ft, f(1), f(2), ..., ft]`, where `ft` is the total frequency and symbol `k` occupies the
//! interval `[f(k), f(k + 1))` with `f(0) = 0`.

mod encoder;

pub use encoder::Encoder;

use symphonia_core::io::ReadBytes;

use crate::error::{Error, Result};

const CODE_BITS: u32 = 32;
const SYM_BITS: u32 = 8;
const SYM_MAX: u32 = (1 << SYM_BITS) - 1;
const CODE_TOP: u32 = 1 << (CODE_BITS - 1);
const CODE_BOT: u32 = CODE_TOP >> SYM_BITS;
const CODE_SHIFT: u32 = CODE_BITS - SYM_BITS - 1;
const CODE_EXTRA: u32 = (CODE_BITS - 2) % SYM_BITS + 1;

/// Number of bits required to represent `x`.
#[inline(always)]
fn ilog(x: u32) -> u32 {
    return 32 - x.leading_zeros();
}

/// Validates a cumulative frequency table and returns its total frequency.
fn cdf_total(cdf: &[u32]) -> Result<u32> {
    if cdf.len() < 3 {
        return Err(Error::InvalidCdf);
    }

    let ft = cdf[0];

    if ft == 0 || ft > 1 << 16 || cdf[cdf.len() - 1] != ft {
        return Err(Error::InvalidCdf);
    }

    return Ok(ft);
}

/// Decoder implements rfc6716#section-4.1
/// SILK payloads use an entropy coder based on range coding [RANGE-CODING]
/// [MARTIN79], which is itself a rediscovery of the FIFO arithmetic code
/// introduced by [CODING-THESIS].  It is very similar to arithmetic
/// encoding, except that encoding is done with digits in any base
/// instead of with bits, so it is faster when using larger bases (i.e.,
/// a byte).  All of the calculations in the range coder must use bit-
/// exact integer arithmetic.
pub struct Decoder<'a, B: ReadBytes> {
    reader: &'a mut B,
    range: u32,
    value: u32,
    rem: u32,
    nbits_total: u32,
}

impl<'a, B: ReadBytes> Decoder<'a, B> {
    /// Creates a new range decoder and initializes its state.
    ///
    /// Let b0 be an 8-bit unsigned integer containing first input byte (or
    /// containing zero if the payload is empty).
    /// The decoder initializes rng to 128 and initializes val to
    /// (127 - (b0>>1)), where (b0>>1) is the top 7 bits of the first input byte.
    ///
    /// https://datatracker.ietf.org/doc/html/rfc6716#section-4.1.1
    pub fn new(reader: &'a mut B) -> Self {
        let mut decoder = Decoder {
            reader,
            range: 1 << CODE_EXTRA,
            value: 0,
            rem: 0,
            nbits_total: CODE_BITS + 1 - ((CODE_BITS - CODE_EXTRA) / SYM_BITS) * SYM_BITS,
        };

        decoder.rem = decoder.read_byte();
        decoder.value = decoder.range - 1 - (decoder.rem >> (SYM_BITS - CODE_EXTRA));
        decoder.normalize();

        return decoder;
    }

    /// Decodes a single symbol with a cumulative frequency table.
    ///
    /// https://datatracker.ietf.org/doc/html/rfc6716#section-4.1.3.1
    pub fn decode_symbol_with_cdf(&mut self, cdf: &[u32]) -> Result<usize> {
        let ft = cdf_total(cdf)?;

        let scale = self.range / ft;
        let fs = ft - u32::min(self.value / scale + 1, ft);

        let k = cdf[1..]
            .iter()
            .position(|&fh| fh > fs)
            .ok_or(Error::InvalidCdf)?;

        let fl = if k > 0 { cdf[k] } else { 0 };
        let fh = cdf[k + 1];

        let s = scale * (ft - fh);
        self.value -= s;
        self.range = if fl > 0 { scale * (fh - fl) } else { self.range - s };

        self.normalize();

        return Ok(k);
    }

    /// DecodeSymbolLogP decodes a single binary symbol.
    ///
    /// The context is described by a single parameter, logp, which
    /// is the absolute value of the base-2 logarithm of the probability of a "1".
    ///
    /// https://datatracker.ietf.org/doc/html/rfc6716#section-4.1.3.2
    pub fn decode_symbol_log_p(&mut self, logp: u32) -> Result<bool> {
        if logp == 0 || logp > 24 {
            return Err(Error::DecodingError("invalid logp value"));
        }

        let s = self.range >> logp;
        let bit = self.value < s;

        if bit {
            self.range = s;
        }
        else {
            self.value -= s;
            self.range -= s;
        }

        self.normalize();

        return Ok(bit);
    }

    /// Returns the number of whole bits consumed so far, rounded up.
    ///
    /// https://datatracker.ietf.org/doc/html/rfc6716#section-4.1.6
    pub fn tell(&self) -> u32 {
        return self.nbits_total - ilog(self.range);
    }

    /// Normalizes the range as described in RFC 6716, Section 4.1.2.1.
    ///
    /// To normalize the range, the decoder repeats the following process,
    /// until rng > 2**23. If rng is already greater than 2**23,
    /// the entire process is skipped.
    fn normalize(&mut self) {
        while self.range <= CODE_BOT {
            self.nbits_total += SYM_BITS;
            self.range <<= SYM_BITS;

            let prev = self.rem;
            self.rem = self.read_byte();

            let sym = ((prev << SYM_BITS) | self.rem) >> (SYM_BITS - CODE_EXTRA);
            self.value = ((self.value << SYM_BITS) + (SYM_MAX & !sym)) & (CODE_TOP - 1);
        }
    }

    /// Reads the next byte of the payload. Bytes past the end of the payload are zero.
    fn read_byte(&mut self) -> u32 {
        return self.reader.read_byte().map(u32::from).unwrap_or(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table;
    use proptest::prelude::*;
    use symphonia_core::io::BufReader;

    const UNIFORM4: &[u32] = &[4, 1, 2, 3, 4];

    #[test]
    fn decode_symbol_with_cdf_rejects_invalid_tables() -> Result<()> {
        let data = [0xFF];
        let mut reader = BufReader::new(&data);
        let mut decoder = Decoder::new(&mut reader);

        assert!(decoder.decode_symbol_with_cdf(&[]).is_err());
        assert!(decoder.decode_symbol_with_cdf(&[256, 256]).is_err());
        assert!(decoder.decode_symbol_with_cdf(&[256, 12, 200]).is_err());

        return Ok(());
    }

    #[test]
    fn decode_symbol_log_p_rejects_invalid_logp() -> Result<()> {
        let data = [0xFF, 0xFF];
        let mut reader = BufReader::new(&data);
        let mut decoder = Decoder::new(&mut reader);

        assert!(decoder.decode_symbol_log_p(0).is_err());
        assert!(decoder.decode_symbol_log_p(25).is_err());

        return Ok(());
    }

    #[test]
    fn decoder_on_empty_payload() -> Result<()> {
        let data: [u8; 0] = [];
        let mut reader = BufReader::new(&data);
        let mut decoder = Decoder::new(&mut reader);

        // An empty payload decodes as all zero bytes and never fails.
        for _ in 0..64 {
            decoder.decode_symbol_with_cdf(table::GAIN_DELTA)?;
        }

        assert!(decoder.tell() > 0);

        return Ok(());
    }

    #[test]
    fn round_trip_mixed_symbols() -> Result<()> {
        let mut encoder = Encoder::new();

        encoder.encode_bit_log_p(true, 1);
        encoder.encode_bit_log_p(false, 1);
        encoder.encode_symbol_with_cdf(1, table::FRAME_TYPE_INACTIVE)?;
        encoder.encode_symbol_with_cdf(0, table::GAIN_HIGHBITS[0])?;
        encoder.encode_symbol_with_cdf(6, table::GAIN_LOWBITS)?;
        encoder.encode_symbol_with_cdf(40, table::GAIN_DELTA)?;
        encoder.encode_symbol_with_cdf(3, UNIFORM4)?;
        encoder.encode_bit_log_p(true, 8);

        let data = encoder.finish();

        let mut reader = BufReader::new(&data);
        let mut decoder = Decoder::new(&mut reader);

        assert!(decoder.decode_symbol_log_p(1)?);
        assert!(!decoder.decode_symbol_log_p(1)?);
        assert_eq!(decoder.decode_symbol_with_cdf(table::FRAME_TYPE_INACTIVE)?, 1);
        assert_eq!(decoder.decode_symbol_with_cdf(table::GAIN_HIGHBITS[0])?, 0);
        assert_eq!(decoder.decode_symbol_with_cdf(table::GAIN_LOWBITS)?, 6);
        assert_eq!(decoder.decode_symbol_with_cdf(table::GAIN_DELTA)?, 40);
        assert_eq!(decoder.decode_symbol_with_cdf(UNIFORM4)?, 3);
        assert!(decoder.decode_symbol_log_p(8)?);

        return Ok(());
    }

    #[test]
    fn patched_initial_bits_decode_as_flags() -> Result<()> {
        let mut encoder = Encoder::new();

        // Reserve three bits, code some data, then fill in the reserved bits.
        encoder.encode_symbol_with_cdf(0, &[256, 32, 256])?;

        for i in 0..200 {
            encoder.encode_symbol_with_cdf(i % 4, UNIFORM4)?;
        }

        encoder.patch_initial_bits(0b101, 3)?;

        let data = encoder.finish();

        let mut reader = BufReader::new(&data);
        let mut decoder = Decoder::new(&mut reader);

        assert!(decoder.decode_symbol_log_p(1)?);
        assert!(!decoder.decode_symbol_log_p(1)?);
        assert!(decoder.decode_symbol_log_p(1)?);

        for i in 0..200 {
            assert_eq!(decoder.decode_symbol_with_cdf(UNIFORM4)?, i % 4);
        }

        return Ok(());
    }

    #[test]
    fn encoder_and_decoder_agree_on_tell() -> Result<()> {
        let mut encoder = Encoder::new();
        let mut tells = Vec::new();

        // Interleave skewed binary symbols with symbols from two differently shaped tables.
        for i in 0..60 {
            encoder.encode_symbol_with_cdf(i % 8, table::GAIN_LOWBITS)?;
            tells.push(encoder.tell());

            encoder.encode_bit_log_p(i % 5 == 0, 1 + (i % 7) as u32);
            tells.push(encoder.tell());

            encoder.encode_symbol_with_cdf((i * 7) % 41, table::GAIN_DELTA)?;
            tells.push(encoder.tell());
        }

        let data = encoder.finish();
        assert!(data.len() * 8 >= *tells.last().unwrap() as usize);

        let mut reader = BufReader::new(&data);
        let mut decoder = Decoder::new(&mut reader);

        for (i, tell) in tells.chunks_exact(3).enumerate() {
            assert_eq!(decoder.decode_symbol_with_cdf(table::GAIN_LOWBITS)?, i % 8);
            assert_eq!(decoder.tell(), tell[0]);

            assert_eq!(decoder.decode_symbol_log_p(1 + (i % 7) as u32)?, i % 5 == 0);
            assert_eq!(decoder.tell(), tell[1]);

            assert_eq!(decoder.decode_symbol_with_cdf(table::GAIN_DELTA)?, (i * 7) % 41);
            assert_eq!(decoder.tell(), tell[2]);
        }

        return Ok(());
    }

    #[test]
    fn verify_out_of_range_symbol_is_rejected() {
        let mut encoder = Encoder::new();

        assert!(encoder.encode_symbol_with_cdf(8, table::GAIN_LOWBITS).is_err());
        assert!(encoder.encode_symbol_with_cdf(7, table::GAIN_LOWBITS).is_ok());
    }

    proptest! {
        #[test]
        fn prop_round_trip(symbols in proptest::collection::vec((0usize..41, 0u32..16, any::<bool>()), 1..400)) {
            let mut encoder = Encoder::new();

            for &(sym, logp, bit) in &symbols {
                encoder.encode_symbol_with_cdf(sym, table::GAIN_DELTA).unwrap();
                encoder.encode_bit_log_p(bit, logp + 1);
            }

            let data = encoder.finish();

            let mut reader = BufReader::new(&data);
            let mut decoder = Decoder::new(&mut reader);

            for &(sym, logp, bit) in &symbols {
                prop_assert_eq!(decoder.decode_symbol_with_cdf(table::GAIN_DELTA).unwrap(), sym);
                prop_assert_eq!(decoder.decode_symbol_log_p(logp + 1).unwrap(), bit);
            }
        }
    }
}
