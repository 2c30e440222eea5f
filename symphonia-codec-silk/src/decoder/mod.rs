// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Packet decoder.

mod channel;

pub use channel::{ChannelDecoder, DecodeMode};

use log::{debug, trace};
use symphonia_core::io::{BufReader, ReadBytes};

use crate::config::DecoderConfig;
use crate::error::{Error, Result};
use crate::frame::{Bandwidth, FrameDuration, FrameGeometry, MAX_FRAMES_PER_PACKET, MAX_FRAME_LENGTH};
use crate::indices::{decode_indices, ConditionalCoding, IndexContext};
use crate::packet::{conditional_coding, lbrr_conditional_coding, Packet, PacketFlags, MAX_CHANNELS};
use crate::pulses::decode_pulses;
use crate::range;
use crate::resample::{LinearResampler, Resampler};
use crate::stereo;

/// Decodes packets into interleaved PCM at the API sample rate.
///
/// Stereo packets code a mid and a side channel, which are recombined after resampling.
pub struct SilkDecoder {
    config: DecoderConfig,
    channels: Vec<ChannelDecoder>,
    resamplers: Vec<LinearResampler>,
    bandwidth: Bandwidth,
    duration: FrameDuration,
}

/// Reads past a redundant frame that is not needed.
fn skip_frame<B: ReadBytes>(
    dec: &mut range::Decoder<'_, B>,
    geom: &FrameGeometry,
    cond: ConditionalCoding,
    ctx: &mut IndexContext,
) -> Result<()> {
    let indices = decode_indices(dec, geom, true, cond, ctx)?;

    let mut pulses = [0i16; MAX_FRAME_LENGTH];
    decode_pulses(dec, indices.signal_type, indices.quant_offset_type, &mut pulses[..geom.frame_length])?;

    return Ok(());
}

impl SilkDecoder {
    pub fn try_new(config: DecoderConfig) -> Result<Self> {
        config.validate()?;

        let bandwidth = Bandwidth::WideBand;
        let duration = FrameDuration::Ms20;

        let channels = (0..config.channels)
            .map(|_| ChannelDecoder::new(bandwidth, duration.nb_subfr()))
            .collect();

        let resamplers = (0..config.channels)
            .map(|_| LinearResampler::new(bandwidth.fs_khz() as u32 * 1000, config.api_sample_rate))
            .collect();

        return Ok(SilkDecoder { config, channels, resamplers, bandwidth, duration });
    }

    pub fn config(&self) -> &DecoderConfig {
        return &self.config;
    }

    /// Returns the decoder to the state it was created in.
    pub fn reset(&mut self) {
        debug!("silk: decoder reset");

        self.bandwidth = Bandwidth::WideBand;
        self.duration = FrameDuration::Ms20;

        for ch in self.channels.iter_mut() {
            *ch = ChannelDecoder::new(self.bandwidth, self.duration.nb_subfr());
        }

        for r in self.resamplers.iter_mut() {
            r.set_rates(self.bandwidth.fs_khz() as u32 * 1000, self.config.api_sample_rate);
            r.reset();
        }
    }

    /// Number of samples per channel a packet of `duration` decodes to.
    pub fn output_len(&self, duration: FrameDuration) -> usize {
        return self.config.api_sample_rate as usize * duration.ms() / 1000;
    }

    /// Decodes a packet into `out` as interleaved samples and returns the number of samples per
    /// channel.
    ///
    /// A missing or empty packet is concealed using the layout of the previous packet. With `fec`
    /// set, `packet` is the packet following a lost one, and the lost packet is rebuilt from the
    /// redundant frames it carries.
    pub fn decode(&mut self, packet: Option<&Packet>, fec: bool, out: &mut [i16]) -> Result<usize> {
        let (bandwidth, duration) = match packet {
            Some(p) => (p.bandwidth, p.duration),
            None => (self.bandwidth, self.duration),
        };

        let payload = packet.filter(|p| !p.is_dtx()).map(|p| p.data.as_slice());

        let nch = self.channels.len();
        let frames = duration.frames_per_packet();

        let needed = self.output_len(duration) * nch;

        if out.len() < needed {
            return Err(Error::BufferTooSmall { needed, actual: out.len() });
        }

        self.set_layout(bandwidth, duration);

        let frame_len = self.channels[0].geometry().frame_length;

        let mut internal = [[0i16; MAX_FRAMES_PER_PACKET * MAX_FRAME_LENGTH]; MAX_CHANNELS];

        match payload {
            None => {
                trace!("silk: concealing {} frames", frames);

                for i in 0..frames {
                    for (ch, buf) in self.channels.iter_mut().zip(internal.iter_mut()) {
                        let out = &mut buf[i * frame_len..(i + 1) * frame_len];
                        ch.decode_frame::<BufReader<'_>>(None, DecodeMode::Lost, ConditionalCoding::Independent, out)?;
                    }
                }

                for ch in self.channels.iter_mut() {
                    ch.reset_gain_index();
                }
            }
            Some(data) => {
                let mut reader = BufReader::new(data);
                let mut dec = range::Decoder::new(&mut reader);

                let flags = PacketFlags::read(&mut dec, nch, frames)?;

                if fec {
                    self.decode_redundant(&mut dec, &flags, frames, &mut internal)?;
                }
                else {
                    self.decode_regular(&mut dec, &flags, frames, &mut internal)?;
                }
            }
        }

        return self.render(&internal, frames * frame_len, out);
    }

    fn set_layout(&mut self, bandwidth: Bandwidth, duration: FrameDuration) {
        for ch in self.channels.iter_mut() {
            ch.set_geometry(bandwidth, duration.nb_subfr());
        }

        if bandwidth != self.bandwidth {
            for r in self.resamplers.iter_mut() {
                r.set_rates(bandwidth.fs_khz() as u32 * 1000, self.config.api_sample_rate);
            }
        }

        self.bandwidth = bandwidth;
        self.duration = duration;
    }

    fn decode_regular<B: ReadBytes>(
        &mut self,
        dec: &mut range::Decoder<'_, B>,
        flags: &PacketFlags,
        frames: usize,
        internal: &mut [[i16; MAX_FRAMES_PER_PACKET * MAX_FRAME_LENGTH]; MAX_CHANNELS],
    ) -> Result<()> {
        let geom = *self.channels[0].geometry();
        let frame_len = geom.frame_length;

        // The redundant frames precede the regular ones.
        let mut ctx = [IndexContext::default(); MAX_CHANNELS];

        for i in 0..frames {
            for ch in 0..self.channels.len() {
                if flags.lbrr[ch][i] {
                    skip_frame(dec, &geom, lbrr_conditional_coding(&flags.lbrr[ch], i), &mut ctx[ch])?;
                }
            }
        }

        for i in 0..frames {
            for (ch, (decoder, buf)) in self.channels.iter_mut().zip(internal.iter_mut()).enumerate() {
                let mode = DecodeMode::Normal { voice_activity: flags.vad[ch][i] };
                let out = &mut buf[i * frame_len..(i + 1) * frame_len];

                decoder.decode_frame(Some(&mut *dec), mode, conditional_coding(i), out)?;
            }
        }

        return Ok(());
    }

    fn decode_redundant<B: ReadBytes>(
        &mut self,
        dec: &mut range::Decoder<'_, B>,
        flags: &PacketFlags,
        frames: usize,
        internal: &mut [[i16; MAX_FRAMES_PER_PACKET * MAX_FRAME_LENGTH]; MAX_CHANNELS],
    ) -> Result<()> {
        let frame_len = self.channels[0].geometry().frame_length;

        for i in 0..frames {
            for (ch, (decoder, buf)) in self.channels.iter_mut().zip(internal.iter_mut()).enumerate() {
                let out = &mut buf[i * frame_len..(i + 1) * frame_len];

                if flags.lbrr[ch][i] {
                    let cond = lbrr_conditional_coding(&flags.lbrr[ch], i);
                    decoder.decode_frame(Some(&mut *dec), DecodeMode::Redundant, cond, out)?;
                }
                else {
                    decoder.decode_frame::<B>(None, DecodeMode::Lost, ConditionalCoding::Independent, out)?;
                }
            }
        }

        return Ok(());
    }

    /// Resamples the decoded channels and writes them to `out`.
    fn render(
        &mut self,
        internal: &[[i16; MAX_FRAMES_PER_PACKET * MAX_FRAME_LENGTH]; MAX_CHANNELS],
        len: usize,
        out: &mut [i16],
    ) -> Result<usize> {
        let n = self.resamplers[0].output_len(len);

        let mut resampled = vec![vec![0i16; n]; self.channels.len()];

        for ((r, buf), res) in self.resamplers.iter_mut().zip(internal.iter()).zip(resampled.iter_mut()) {
            r.process(&buf[..len], res)?;
        }

        match resampled.as_slice() {
            [mono] => out[..n].copy_from_slice(mono),
            [mid, side] => stereo::to_left_right(mid, side, &mut out[..2 * n]),
            _ => return Err(Error::InvalidChannelCount(resampled.len())),
        }

        return Ok(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_decoder_construction() {
        assert!(SilkDecoder::try_new(DecoderConfig { api_sample_rate: 11025, channels: 1 }).is_err());
        assert!(SilkDecoder::try_new(DecoderConfig { api_sample_rate: 48000, channels: 3 }).is_err());

        let decoder = SilkDecoder::try_new(DecoderConfig { api_sample_rate: 48000, channels: 2 });
        assert!(decoder.is_ok());
    }

    #[test]
    fn verify_lost_packets_are_concealed() -> Result<()> {
        let mut decoder = SilkDecoder::try_new(DecoderConfig { api_sample_rate: 48000, channels: 2 })?;

        let mut out = vec![0i16; 2 * 960];
        assert_eq!(decoder.decode(None, false, &mut out)?, 960);

        // Nothing was ever decoded, so the concealment is silent.
        assert!(out.iter().all(|&x| x == 0));

        let mut short = vec![0i16; 100];
        assert!(decoder.decode(None, false, &mut short).is_err());

        return Ok(());
    }

    #[test]
    fn verify_dtx_packet_uses_its_layout() -> Result<()> {
        let mut decoder = SilkDecoder::try_new(DecoderConfig { api_sample_rate: 16000, channels: 1 })?;

        let packet = Packet { data: Vec::new(), bandwidth: Bandwidth::NarrowBand, duration: FrameDuration::Ms40 };

        let mut out = vec![0i16; 640];
        assert_eq!(decoder.decode(Some(&packet), false, &mut out)?, 640);
        assert_eq!(decoder.channels[0].geometry().fs_khz, 8);

        return Ok(());
    }
}
