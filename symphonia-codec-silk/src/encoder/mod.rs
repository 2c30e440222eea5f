// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Packet encoder.

mod channel;

pub use channel::{ChannelEncoder, FrameParams, LbrrFrame};

use log::{debug, trace};

use crate::analysis::{Analyzer, BasicAnalyzer};
use crate::bandwidth::{BandwidthController, BandwidthRequest};
use crate::config::{ComplexitySettings, EncoderConfig, MIN_BITRATE_BPS};
use crate::error::{Error, Result};
use crate::frame::{Bandwidth, FrameDuration, SignalType, MAX_FRAMES_PER_PACKET, MAX_FRAME_LENGTH};
use crate::indices::{encode_indices, IndexContext};
use crate::packet::{conditional_coding, lbrr_conditional_coding, Packet, PacketFlags, MAX_CHANNELS};
use crate::pulses::encode_pulses;
use crate::range;
use crate::resample::{LinearResampler, Resampler};
use crate::stereo;

/// Largest payload the encoder produces, in bytes.
const MAX_PAYLOAD_BYTES: i32 = 1275;

/// Bits over budget carried into the following packets.
const MAX_BITS_EXCEEDED: i32 = 10000;

/// Over or under spending is paid back over this period.
const BIT_RESERVOIR_DECAY_MS: i32 = 500;

/// Encodes interleaved PCM at the API sample rate into packets.
///
/// Stereo input is coded as a mid and a side channel. Each channel runs its own analysis,
/// bandwidth transition filter, and resampler, while the bandwidth decision is shared.
pub struct SilkEncoder {
    config: EncoderConfig,
    settings: ComplexitySettings,
    duration: FrameDuration,
    bandwidth: Option<Bandwidth>,
    channels: Vec<ChannelEncoder>,
    analyzers: Vec<Box<dyn Analyzer + Send>>,
    controllers: Vec<BandwidthController>,
    resamplers: Vec<LinearResampler>,
    /// The previous packet reported that a bandwidth switch is pending.
    switch_ready: bool,
    n_bits_exceeded: i32,
}

impl SilkEncoder {
    pub fn try_new(config: EncoderConfig) -> Result<Self> {
        config.validate()?;

        let duration = config.frame_duration()?;
        let settings = ComplexitySettings::from_complexity(config.complexity);
        let nch = config.channels;

        let channels =
            (0..nch).map(|_| ChannelEncoder::new(Bandwidth::WideBand, duration, settings)).collect();

        let analyzers =
            (0..nch).map(|_| Box::new(BasicAnalyzer::new()) as Box<dyn Analyzer + Send>).collect();

        let resamplers = (0..nch)
            .map(|_| LinearResampler::new(config.api_sample_rate, Bandwidth::WideBand.fs_khz() as u32 * 1000))
            .collect();

        return Ok(SilkEncoder {
            config,
            settings,
            duration,
            bandwidth: None,
            channels,
            analyzers,
            controllers: vec![BandwidthController::new(); nch],
            resamplers,
            switch_ready: false,
            n_bits_exceeded: 0,
        });
    }

    pub fn config(&self) -> &EncoderConfig {
        return &self.config;
    }

    /// Bandwidth of the last encoded packet.
    pub fn bandwidth(&self) -> Option<Bandwidth> {
        return self.bandwidth;
    }

    /// Number of samples per channel one packet is encoded from.
    pub fn input_len(&self) -> usize {
        return self.config.api_sample_rate as usize * self.duration.ms() / 1000;
    }

    /// Applies a new configuration from the next packet on.
    ///
    /// A change of the channel count restarts the encoder. Everything else is picked up without
    /// losing state.
    pub fn set_config(&mut self, config: EncoderConfig) -> Result<()> {
        config.validate()?;

        if config.channels != self.config.channels {
            debug!("silk: encoder channel count changed to {}", config.channels);

            *self = SilkEncoder::try_new(config)?;
            return Ok(());
        }

        let duration = config.frame_duration()?;

        if config.complexity != self.config.complexity {
            self.settings = ComplexitySettings::from_complexity(config.complexity);

            for ch in self.channels.iter_mut() {
                ch.set_complexity(self.settings);
            }
        }

        if config != self.config {
            debug!("silk: encoder reconfigured: {:?}", config);
        }

        self.duration = duration;
        self.config = config;

        return Ok(());
    }

    /// Returns the encoder to the state it was created in, keeping the configuration.
    pub fn reset(&mut self) {
        debug!("silk: encoder reset");

        for ch in self.channels.iter_mut() {
            *ch = ChannelEncoder::new(Bandwidth::WideBand, self.duration, self.settings);
        }

        for analyzer in self.analyzers.iter_mut() {
            analyzer.reset();
        }

        for ctl in self.controllers.iter_mut() {
            *ctl = BandwidthController::new();
        }

        for r in self.resamplers.iter_mut() {
            r.set_rates(self.config.api_sample_rate, Bandwidth::WideBand.fs_khz() as u32 * 1000);
            r.reset();
        }

        self.bandwidth = None;
        self.switch_ready = false;
        self.n_bits_exceeded = 0;
    }

    /// Encodes one packet worth of interleaved samples.
    ///
    /// The packet carries the redundant copies of the previous packet's frames ahead of its own
    /// frames. With DTX enabled, the payload is empty while every channel is in DTX.
    pub fn encode(&mut self, pcm: &[i16]) -> Result<Packet> {
        let nch = self.channels.len();
        let api_len = self.input_len();

        if pcm.len() != api_len * nch {
            return Err(Error::InvalidInputLength { expected: api_len * nch, actual: pcm.len() });
        }

        let frames = self.duration.frames_per_packet();
        let payload_ms = self.duration.ms() as i32;
        let packet_bits = self.config.bitrate as i32 * payload_ms / 1000;

        let max_bits = if self.config.use_cbr { packet_bits } else { MAX_PAYLOAD_BYTES * 8 };

        let max_bits = self.control_bandwidth(max_bits);

        let geom = *self.channels[0].geometry();
        let frame_len = geom.frame_length;

        let internal = self.resample_input(pcm, api_len, frames * frame_len)?;

        let mut enc = range::Encoder::new();
        let mut flags = PacketFlags::default();

        PacketFlags::reserve(&mut enc, nch, frames)?;

        let pending = self.encode_redundant(&mut enc, &mut flags, frames)?;

        let lbrr_bits = enc.tell() as i32;

        // Redundancy for this packet's frames is decided on the configured rate.
        let channel_rate_bps = self.config.bitrate as i32 / nch as i32;

        for ch in self.channels.iter_mut() {
            ch.setup_lbrr(channel_rate_bps, self.config.packet_loss_pct, self.config.use_in_band_fec);
        }

        // Target bits of one frame, and the corresponding rate.
        let frame_bits = (packet_bits - lbrr_bits) / frames as i32;
        let frame_rate_bps = frame_bits * (1000 / (geom.nb_subfr as i32 * 5));

        for i in 0..frames {
            let mut target_bps = frame_rate_bps - self.n_bits_exceeded * 1000 / BIT_RESERVOIR_DECAY_MS;

            if i > 0 {
                let balance = enc.tell() as i32 - lbrr_bits - frame_bits * i as i32;
                target_bps -= balance * 1000 / BIT_RESERVOIR_DECAY_MS;
            }

            let target_bps = target_bps.clamp(MIN_BITRATE_BPS as i32, self.config.bitrate as i32);

            let rates = split_rate(target_bps, nch);

            // Cumulative budget up to and including this frame.
            let frame_max_bits = match (frames, i) {
                (2, 0) => max_bits * 3 / 5,
                (3, 0) => max_bits * 2 / 5,
                (3, 1) => max_bits * 3 / 4,
                _ => max_bits,
            };

            // Only the final frame of the packet is padded to the budget.
            let use_cbr = self.config.use_cbr && i == frames - 1;

            for ch in 0..nch {
                let mut frame = [0i16; MAX_FRAME_LENGTH];
                frame[..frame_len].copy_from_slice(&internal[ch][i * frame_len..(i + 1) * frame_len]);
                let frame = &mut frame[..frame_len];

                let activity = self.analyzers[ch].speech_activity_q8(frame);
                let vad = self.channels[ch].do_vad(activity);

                self.controllers[ch].filter(frame);

                let analysis = self.analyzers[ch].analyze(frame, &geom, &self.settings, activity, vad);

                let channel = &mut self.channels[ch];

                channel.control_snr(rates[ch]);

                // The mid channel leaves room for the side channel of the same frame.
                let mut ch_max_bits = frame_max_bits;

                if nch == 2 && ch == 0 {
                    ch_max_bits -= max_bits / (frames as i32 * 2);
                }

                let params = FrameParams {
                    frame_index: i,
                    cond: conditional_coding(i),
                    max_bits: ch_max_bits,
                    use_cbr: use_cbr && ch == nch - 1,
                };

                channel.encode_frame(&mut enc, &analysis, &params)?;

                flags.vad[ch][i] = channel.last_signal_type() != SignalType::Inactive;
            }

            trace!(
                "silk: frame {} coded, {} bits so far (budget {}, cbr {})",
                i,
                enc.tell(),
                frame_max_bits,
                use_cbr
            );
        }

        flags.patch(&mut enc, nch, frames)?;

        let data = if self.config.use_dtx && self.channels.iter().all(|ch| ch.in_dtx()) {
            trace!("silk: dropping packet during discontinuous transmission");

            // The redundancy of the previous packet goes out with the next transmitted one.
            for (ch, copies) in self.channels.iter_mut().zip(pending) {
                ch.restore_lbrr(copies);
            }

            Vec::new()
        }
        else {
            enc.finish()
        };

        self.n_bits_exceeded =
            (self.n_bits_exceeded + data.len() as i32 * 8 - packet_bits).clamp(0, MAX_BITS_EXCEEDED);

        let bandwidth = geom.bandwidth;

        return Ok(Packet { data, bandwidth, duration: self.duration });
    }

    /// Runs the bandwidth state machine and reconfigures the channels for the decided bandwidth.
    /// Returns the bit budget of the packet, reduced while a switch is pending.
    fn control_bandwidth(&mut self, max_bits: i32) -> i32 {
        let req = BandwidthRequest {
            api_rate: self.config.api_sample_rate,
            min_rate: self.config.min_internal_rate,
            max_rate: self.config.max_internal_rate,
            desired_rate: self.config.desired_internal_rate,
            switch_allowed: self.switch_ready,
            payload_ms: self.duration.ms(),
        };

        // All channels see the same inputs, the first one decides.
        let decisions: Vec<_> =
            self.controllers.iter_mut().map(|ctl| ctl.control(self.bandwidth, &req, max_bits)).collect();

        let decision = decisions[0];

        if Some(decision.bandwidth) != self.bandwidth {
            debug!("silk: encoding at {} kHz", decision.bandwidth.fs_khz());
        }

        let internal_rate = decision.bandwidth.fs_khz() as u32 * 1000;

        for (ch, r) in self.channels.iter_mut().zip(self.resamplers.iter_mut()) {
            ch.set_geometry(decision.bandwidth, self.duration);

            if r.in_rate() != self.config.api_sample_rate || r.out_rate() != internal_rate {
                r.set_rates(self.config.api_sample_rate, internal_rate);
            }
        }

        self.bandwidth = Some(decision.bandwidth);
        self.switch_ready = decision.switch_ready;

        return decision.max_bits;
    }

    /// Splits the input into coded channels and converts them to the internal rate.
    fn resample_input(&mut self, pcm: &[i16], api_len: usize, len: usize) -> Result<Vec<Vec<i16>>> {
        let nch = self.channels.len();

        let mut api = vec![vec![0i16; api_len]; nch];

        match api.as_mut_slice() {
            [mono] => mono.copy_from_slice(pcm),
            [mid, side] => stereo::to_mid_side(pcm, mid, side),
            _ => return Err(Error::InvalidChannelCount(nch)),
        }

        let mut internal = vec![vec![0i16; len]; nch];

        for ((r, src), dst) in self.resamplers.iter_mut().zip(api.iter()).zip(internal.iter_mut()) {
            let n = r.process(src, dst)?;

            if n != len {
                return Err(Error::EncodingError("silk: resampled length does not match frame layout"));
            }
        }

        return Ok(internal);
    }

    /// Codes the redundant frames produced while encoding the previous packet, and returns them.
    fn encode_redundant(
        &mut self,
        enc: &mut range::Encoder,
        flags: &mut PacketFlags,
        frames: usize,
    ) -> Result<Vec<[Option<LbrrFrame>; MAX_FRAMES_PER_PACKET]>> {
        let nch = self.channels.len();

        let lbrr: Vec<[Option<LbrrFrame>; MAX_FRAMES_PER_PACKET]> =
            self.channels.iter_mut().map(|ch| ch.take_lbrr()).collect();

        for (ch, copies) in lbrr.iter().enumerate() {
            for (flag, copy) in flags.lbrr[ch][..frames].iter_mut().zip(copies.iter()) {
                *flag = copy.is_some();
            }
        }

        flags.encode_lbrr_symbols(enc, nch, frames)?;

        let mut ctx = [IndexContext::default(); MAX_CHANNELS];

        for i in 0..frames {
            for (ch, copies) in lbrr.iter().enumerate() {
                let Some(copy) = &copies[i] else {
                    continue;
                };

                let geom = self.channels[ch].geometry();
                let cond = lbrr_conditional_coding(&flags.lbrr[ch], i);

                encode_indices(enc, &copy.indices, geom, true, cond, &mut ctx[ch])?;
                encode_pulses(
                    enc,
                    copy.indices.signal_type,
                    copy.indices.quant_offset_type,
                    &copy.pulses[..geom.frame_length],
                )?;
            }
        }

        return Ok(lbrr);
    }
}

/// Splits the target rate between the coded channels. The side channel of a stereo pair gets
/// the smaller share.
fn split_rate(rate_bps: i32, channels: usize) -> [i32; MAX_CHANNELS] {
    if channels == 1 {
        return [rate_bps, 0];
    }

    let mid = rate_bps * 3 / 5;

    return [mid, rate_bps - mid];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderConfig;
    use crate::decoder::SilkDecoder;
    use serial_test::serial;
    use std::sync::LazyLock;
    use symphonia_core::io::BufReader;

    static _LOGGER: LazyLock<(), fn()> = LazyLock::new(init_logger);

    fn init_logger() {
        env_logger::builder().is_test(true).filter_level(log::LevelFilter::Debug).try_init().unwrap();
    }

    /// A decaying pulse train with a little noise.
    fn speech_like(len: usize, period: usize, seed: &mut u32) -> Vec<i16> {
        let mut y = 0.0f64;

        return (0..len)
            .map(|n| {
                *seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                let noise = f64::from((*seed >> 16) as i16 >> 8);
                let pulse = if n % period == 0 { 6000.0 } else { 0.0 };
                y = 0.9 * y + pulse + noise;
                y.clamp(-32000.0, 32000.0) as i16
            })
            .collect();
    }

    fn energy(x: &[i16]) -> f64 {
        return x.iter().map(|&v| f64::from(v).powi(2)).sum();
    }

    fn correlation(a: &[i16], b: &[i16]) -> f64 {
        let cross: f64 = a.iter().zip(b).map(|(&x, &y)| f64::from(x) * f64::from(y)).sum();
        return cross / (energy(a) * energy(b)).sqrt().max(1.0);
    }

    fn mono_config() -> EncoderConfig {
        return EncoderConfig { bitrate: 30000, complexity: 2, ..Default::default() };
    }

    fn flags_of(packet: &Packet, channels: usize) -> Result<PacketFlags> {
        let mut reader = BufReader::new(&packet.data);
        let mut dec = range::Decoder::new(&mut reader);
        return PacketFlags::read(&mut dec, channels, packet.duration.frames_per_packet());
    }

    #[test]
    fn verify_encoder_construction() {
        let config = EncoderConfig { api_sample_rate: 22050, ..Default::default() };
        assert!(SilkEncoder::try_new(config).is_err());
        assert!(SilkEncoder::try_new(EncoderConfig { payload_ms: 30, ..Default::default() }).is_err());
        assert!(SilkEncoder::try_new(EncoderConfig { complexity: 11, ..Default::default() }).is_err());
        assert!(SilkEncoder::try_new(EncoderConfig { channels: 3, ..Default::default() }).is_err());
        assert!(SilkEncoder::try_new(EncoderConfig::default()).is_ok());
    }

    #[test]
    fn verify_input_length_is_checked() -> Result<()> {
        let config = EncoderConfig { channels: 2, bitrate: 30000, ..Default::default() };
        let mut encoder = SilkEncoder::try_new(config)?;

        assert_eq!(encoder.input_len(), 320);

        match encoder.encode(&[0i16; 320]) {
            Err(Error::InvalidInputLength { expected: 640, actual: 320 }) => (),
            other => panic!("unexpected result: {:?}", other.map(|p| p.data.len())),
        }

        return Ok(());
    }

    #[test]
    fn verify_mono_round_trip() -> Result<()> {
        let mut encoder = SilkEncoder::try_new(mono_config())?;
        let mut decoder = SilkDecoder::try_new(DecoderConfig { api_sample_rate: 16000, channels: 1 })?;

        let mut seed = 1;
        let input = speech_like(10 * 320, 100, &mut seed);
        let mut output = vec![0i16; input.len()];

        for (pcm, out) in input.chunks_exact(320).zip(output.chunks_exact_mut(320)) {
            let packet = encoder.encode(pcm)?;

            assert_eq!(packet.bandwidth, Bandwidth::WideBand);
            assert!(!packet.is_dtx());
            assert!(packet.data.len() <= MAX_PAYLOAD_BYTES as usize);

            assert_eq!(decoder.decode(Some(&packet), false, out)?, 320);
        }

        assert!(correlation(&input[320..], &output[320..]) > 0.7);

        return Ok(());
    }

    #[test]
    fn verify_stereo_multi_frame_round_trip() -> Result<()> {
        for payload_ms in [40, 60] {
            let config = EncoderConfig { channels: 2, payload_ms, bitrate: 40000, ..mono_config() };

            let mut encoder = SilkEncoder::try_new(config)?;
            let mut decoder = SilkDecoder::try_new(DecoderConfig { api_sample_rate: 16000, channels: 2 })?;

            let n = encoder.input_len();

            let mut seed = 7;
            let mono = speech_like(4 * n, 80, &mut seed);

            // Right is the left channel at half the level.
            let input: Vec<i16> = mono.iter().flat_map(|&x| [x, x / 2]).collect();
            let mut output = vec![0i16; input.len()];

            for (pcm, out) in input.chunks_exact(2 * n).zip(output.chunks_exact_mut(2 * n)) {
                let packet = encoder.encode(pcm)?;
                assert_eq!(packet.duration.ms(), payload_ms as usize);

                let flags = flags_of(&packet, 2)?;
                assert!(flags.vad[0][..packet.duration.frames_per_packet()].iter().any(|&v| v));

                assert_eq!(decoder.decode(Some(&packet), false, out)?, n);
            }

            let left: Vec<i16> = output.iter().step_by(2).copied().collect();
            let right: Vec<i16> = output.iter().skip(1).step_by(2).copied().collect();

            assert!(correlation(&mono[n..], &left[n..]) > 0.5);
            assert!(correlation(&mono[n..], &right[n..]) > 0.5);
            assert!(energy(&left[n..]) > energy(&right[n..]));
        }

        return Ok(());
    }

    #[test]
    fn verify_dtx_drops_silent_packets() -> Result<()> {
        let mut encoder = SilkEncoder::try_new(EncoderConfig { use_dtx: true, ..mono_config() })?;

        let silence = [0i16; 320];

        for _ in 0..10 {
            let packet = encoder.encode(&silence)?;
            assert!(!packet.is_dtx());
            assert!(!flags_of(&packet, 1)?.vad[0][0]);
        }

        assert!(encoder.encode(&silence)?.is_dtx());

        // Speech ends the skipped run at once.
        let mut seed = 3;
        let speech = speech_like(320, 100, &mut seed);
        assert!(!encoder.encode(&speech)?.is_dtx());

        return Ok(());
    }

    #[test]
    fn verify_redundancy_survives_dropped_packets() -> Result<()> {
        let config =
            EncoderConfig { use_dtx: true, packet_loss_pct: 20, use_in_band_fec: true, ..mono_config() };
        let mut encoder = SilkEncoder::try_new(config)?;

        let mut seed = 13;
        let speech = speech_like(3 * 320, 100, &mut seed);

        for pcm in speech.chunks_exact(320) {
            encoder.encode(pcm)?;
        }

        let pending = encoder.channels[0].take_lbrr();
        assert!(pending[0].is_some());

        let silence = [0i16; 320];
        let mut dropped = false;

        for _ in 0..30 {
            if encoder.encode(&silence)?.is_dtx() {
                dropped = true;
                break;
            }
        }

        assert!(dropped);

        // Redundancy pending while a packet is dropped is sent with the next packet.
        encoder.channels[0].restore_lbrr(pending);
        assert!(encoder.encode(&silence)?.is_dtx());

        let resumed = encoder.encode(&speech[..320])?;
        assert!(!resumed.is_dtx());
        assert!(flags_of(&resumed, 1)?.lbrr[0][0]);

        return Ok(());
    }

    #[test]
    fn verify_lost_packet_is_rebuilt_from_redundancy() -> Result<()> {
        let config = EncoderConfig { packet_loss_pct: 20, use_in_band_fec: true, ..mono_config() };

        let mut encoder = SilkEncoder::try_new(config)?;
        let mut decoder = SilkDecoder::try_new(DecoderConfig { api_sample_rate: 16000, channels: 1 })?;

        let mut seed = 5;
        let input = speech_like(6 * 320, 100, &mut seed);

        let packets =
            input.chunks_exact(320).map(|pcm| encoder.encode(pcm)).collect::<Result<Vec<_>>>()?;

        // The first packet has nothing to repeat.
        assert!(!flags_of(&packets[0], 1)?.lbrr[0][0]);
        assert!(packets[1..].iter().all(|p| flags_of(p, 1).map(|f| f.lbrr[0][0]).unwrap_or(false)));

        let mut out = vec![0i16; 320];

        for packet in &packets[..3] {
            decoder.decode(Some(packet), false, &mut out)?;
        }

        // Packet 3 is lost and rebuilt from the copy in packet 4.
        assert_eq!(decoder.decode(Some(&packets[4]), true, &mut out)?, 320);
        assert!(correlation(&input[3 * 320..4 * 320], &out) > 0.5);

        assert_eq!(decoder.decode(Some(&packets[4]), false, &mut out)?, 320);
        assert!(energy(&out) > 0.0);

        return Ok(());
    }

    #[test]
    fn verify_cbr_packets_fit_the_budget() -> Result<()> {
        let config = EncoderConfig { use_cbr: true, bitrate: 20000, ..mono_config() };
        let mut encoder = SilkEncoder::try_new(config)?;

        let mut seed = 11;
        let input = speech_like(8 * 320, 90, &mut seed);

        let mut within = 0;

        for pcm in input.chunks_exact(320) {
            let packet = encoder.encode(pcm)?;

            if packet.data.len() * 8 <= 20000 * 20 / 1000 {
                within += 1;
            }
        }

        assert!(within >= 6);

        return Ok(());
    }

    #[test]
    fn verify_encoding_is_deterministic() -> Result<()> {
        let config = EncoderConfig { api_sample_rate: 48000, payload_ms: 40, complexity: 10, ..mono_config() };

        let mut seed = 9;
        let input = speech_like(5 * 1920, 120, &mut seed);

        let mut runs = Vec::new();

        for _ in 0..2 {
            let mut encoder = SilkEncoder::try_new(config.clone())?;

            let packets =
                input.chunks_exact(1920).map(|pcm| encoder.encode(pcm)).collect::<Result<Vec<_>>>()?;
            runs.push(packets);
        }

        assert_eq!(runs[0], runs[1]);

        // A reset encoder repeats itself too.
        let mut encoder = SilkEncoder::try_new(config)?;
        let first = encoder.encode(&input[..1920])?;
        encoder.reset();
        assert_eq!(encoder.encode(&input[..1920])?, first);

        return Ok(());
    }

    #[test]
    #[serial]
    fn verify_bandwidth_follows_configuration() -> Result<()> {
        LazyLock::force(&_LOGGER);

        let mut encoder = SilkEncoder::try_new(mono_config())?;
        let mut decoder = SilkDecoder::try_new(DecoderConfig { api_sample_rate: 16000, channels: 1 })?;

        let mut seed = 13;
        let input = speech_like(320, 100, &mut seed);
        let mut out = vec![0i16; 320];

        let packet = encoder.encode(&input)?;
        assert_eq!(packet.bandwidth, Bandwidth::WideBand);

        encoder.set_config(EncoderConfig { desired_internal_rate: 12000, ..mono_config() })?;

        // The cut-off is swept down before the switch.
        let mut switched = None;

        for n in 0..200 {
            let packet = encoder.encode(&input)?;
            decoder.decode(Some(&packet), false, &mut out)?;

            if packet.bandwidth == Bandwidth::MediumBand {
                switched = Some(n);
                break;
            }
        }

        let n = switched.ok_or(Error::EncodingError("no bandwidth switch"))?;
        assert!(n > 100);

        // A lower maximum takes effect at once.
        let config = EncoderConfig { max_internal_rate: 8000, desired_internal_rate: 8000, ..mono_config() };
        encoder.set_config(config)?;
        assert_eq!(encoder.encode(&input)?.bandwidth, Bandwidth::NarrowBand);

        // Changing the channel count starts over.
        encoder.set_config(EncoderConfig { channels: 2, ..mono_config() })?;
        assert_eq!(encoder.bandwidth(), None);
        assert_eq!(encoder.input_len(), 320);

        return Ok(());
    }
}
