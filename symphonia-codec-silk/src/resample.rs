// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sample rate conversion between the API rate and the internal rate of the codec.

use crate::error::{Error, Result};

/// Converts blocks of samples from one sample rate to another.
///
/// Blocks must span a whole number of milliseconds, so that every block maps to a whole number
/// of output samples. State is carried from one block to the next.
pub trait Resampler {
    /// Number of output samples produced for `input_len` input samples.
    fn output_len(&self, input_len: usize) -> usize;

    /// Resamples `input` into `output` and returns the number of samples written.
    fn process(&mut self, input: &[i16], output: &mut [i16]) -> Result<usize>;

    /// Forgets the signal seen so far.
    fn reset(&mut self);
}

/// Linear interpolation resampler.
///
/// Output sample `j` of a block lies at the fractional input position `j * in_len / out_len`,
/// measured from the last sample of the previous block. The output is therefore delayed by one
/// input sample.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    in_rate: u32,
    out_rate: u32,
    last: i16,
}

impl LinearResampler {
    pub fn new(in_rate: u32, out_rate: u32) -> Self {
        debug_assert!(in_rate > 0 && out_rate > 0);
        return LinearResampler { in_rate, out_rate, last: 0 };
    }

    pub fn in_rate(&self) -> u32 {
        return self.in_rate;
    }

    pub fn out_rate(&self) -> u32 {
        return self.out_rate;
    }

    /// Changes the rates while keeping the interpolation history.
    pub fn set_rates(&mut self, in_rate: u32, out_rate: u32) {
        self.in_rate = in_rate;
        self.out_rate = out_rate;
    }
}

impl Resampler for LinearResampler {
    fn output_len(&self, input_len: usize) -> usize {
        return (input_len as u64 * u64::from(self.out_rate) / u64::from(self.in_rate)) as usize;
    }

    fn process(&mut self, input: &[i16], output: &mut [i16]) -> Result<usize> {
        let out_len = self.output_len(input.len());

        if output.len() < out_len {
            return Err(Error::BufferTooSmall { needed: out_len, actual: output.len() });
        }

        if input.is_empty() {
            return Ok(0);
        }

        if self.in_rate == self.out_rate {
            output[..out_len].copy_from_slice(input);
            self.last = input[input.len() - 1];
            return Ok(out_len);
        }

        let in_len = input.len() as u64;
        let n = out_len as u64;

        for (j, out) in output[..out_len].iter_mut().enumerate() {
            let pos = j as u64 * in_len;
            let idx = (pos / n) as usize;
            let frac = (pos % n) as i64;

            let prev = if idx == 0 { self.last } else { input[idx - 1] };
            let next = input[idx];

            let delta = i64::from(next) - i64::from(prev);
            *out = (i64::from(prev) + delta * frac / n as i64) as i16;
        }

        self.last = input[input.len() - 1];

        return Ok(out_len);
    }

    fn reset(&mut self) {
        self.last = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_output_lengths() {
        assert_eq!(LinearResampler::new(16000, 48000).output_len(320), 960);
        assert_eq!(LinearResampler::new(12000, 44100).output_len(120), 441);
        assert_eq!(LinearResampler::new(48000, 8000).output_len(960), 160);
    }

    #[test]
    fn verify_equal_rates_pass_through() -> Result<()> {
        let mut resampler = LinearResampler::new(16000, 16000);
        let input: Vec<i16> = (0..160).map(|i| i as i16 * 3).collect();
        let mut output = vec![0i16; 160];

        assert_eq!(resampler.process(&input, &mut output)?, 160);
        assert_eq!(input, output);

        return Ok(());
    }

    #[test]
    fn verify_upsampling_interpolates() -> Result<()> {
        let mut resampler = LinearResampler::new(8000, 16000);
        let input: Vec<i16> = (1..=80).map(|i| i as i16 * 100).collect();
        let mut output = vec![0i16; 160];

        assert_eq!(resampler.process(&input, &mut output)?, 160);

        // Delayed by one input sample, starting from silence.
        assert_eq!(output[0], 0);
        assert_eq!(output[1], 50);
        assert_eq!(output[2], 100);
        assert_eq!(output[3], 150);
        assert_eq!(output[159], 7950);

        // The next block continues from the last sample.
        let mut output = vec![0i16; 160];
        resampler.process(&input, &mut output)?;
        assert_eq!(output[0], 8000);
        assert_eq!(output[1], 4050);

        return Ok(());
    }

    #[test]
    fn verify_downsampling_keeps_level() -> Result<()> {
        let mut resampler = LinearResampler::new(48000, 16000);
        let input = vec![1000i16; 960];
        let mut output = vec![0i16; 320];

        resampler.process(&input, &mut output)?;
        assert!(output[1..].iter().all(|&x| x == 1000));

        let mut short = vec![0i16; 10];
        assert!(resampler.process(&input, &mut short).is_err());

        return Ok(());
    }
}
