// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Signal analysis for the encoder.
//!
//! The analyzer estimates, for every frame, the parameters the quantizer works with: voice
//! activity, the short-term predictor (as NLSFs), the pitch lags and long-term predictor of voiced
//! frames, the noise shaping filters and the residual level of every subframe. The estimates are
//! computed in floating point; everything the decoder must reproduce is quantized afterwards by
//! the encoder.

use itertools::izip;
use log::trace;

use crate::config::ComplexitySettings;
use crate::control::MAX_SHAPE_LPC_ORDER;
use crate::frame::{
    FrameGeometry, SignalType, LTP_ORDER, MAX_FRAME_LENGTH, MAX_LPC_ORDER, MAX_NB_SUBFR,
};
use crate::nlsf;
use crate::pitch::{self, LtpQuantization};

/// Longest analysis history: the LTP memory plus the predictor order.
const MAX_HISTORY: usize = MAX_FRAME_LENGTH + MAX_LPC_ORDER;

/// White noise added to the autocorrelation before solving for the predictor.
const WHITE_NOISE_FRACTION: f64 = 1e-4;

/// Bandwidth expansion of the noise shaping filter.
const SHAPING_CHIRP: f64 = 0.94;

/// Largest magnitude of a shaping coefficient in the quantizer's Q13 format.
const SHAPING_COEF_LIMIT: f64 = 3.999;

const MAX_LIMIT_ITERATIONS: usize = 10;

/// Energy per sample below which a frame is treated as digital silence.
const SILENCE_ENERGY: f64 = 4.0;

/// Initial and minimum noise floor of the activity detector, in energy per sample.
const MIN_NOISE_ENERGY: f64 = 100.0;

/// Per-frame growth of the noise floor while the signal is louder than it.
const NOISE_RISE: f64 = 1.02;

/// A sub-multiple of the best lag is preferred if its correlation is at least this fraction of the
/// best correlation.
const OCTAVE_BIAS: f64 = 0.85;

/// Parameters of one frame as estimated by an [`Analyzer`].
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub signal_type: SignalType,
    pub speech_activity_q8: i32,
    /// Spectral tilt of the input, the first normalized autocorrelation coefficient in Q15.
    pub input_tilt_q15: i32,
    pub input_quality_q14: i32,
    /// Unquantized NLSFs of the short-term predictor.
    pub nlsf_q15: [i16; MAX_LPC_ORDER],
    /// Coded pitch lag of a voiced frame.
    pub lag_index: i32,
    pub contour_index: usize,
    /// Pitch lags reconstructed from `lag_index` and `contour_index`.
    pub pitch_l: [i32; MAX_NB_SUBFR],
    pub ltp: LtpQuantization,
    pub ltp_pred_cod_gain_q7: i32,
    pub ar_q13: [i16; MAX_NB_SUBFR * MAX_SHAPE_LPC_ORDER],
    pub lf_shp_q14: [i32; MAX_NB_SUBFR],
    pub tilt_q14: [i32; MAX_NB_SUBFR],
    pub harm_shape_gain_q14: [i32; MAX_NB_SUBFR],
    /// RMS of the short-term prediction residual of each subframe, in Q16.
    pub res_gains_q16: [i32; MAX_NB_SUBFR],
    /// The analyzed frame.
    pub x16: [i16; MAX_FRAME_LENGTH],
}

impl Default for FrameAnalysis {
    fn default() -> Self {
        return FrameAnalysis {
            signal_type: SignalType::Inactive,
            speech_activity_q8: 0,
            input_tilt_q15: 0,
            input_quality_q14: 0,
            nlsf_q15: [0; MAX_LPC_ORDER],
            lag_index: 0,
            contour_index: 0,
            pitch_l: [0; MAX_NB_SUBFR],
            ltp: LtpQuantization::default(),
            ltp_pred_cod_gain_q7: 0,
            ar_q13: [0; MAX_NB_SUBFR * MAX_SHAPE_LPC_ORDER],
            lf_shp_q14: [0; MAX_NB_SUBFR],
            tilt_q14: [0; MAX_NB_SUBFR],
            harm_shape_gain_q14: [0; MAX_NB_SUBFR],
            res_gains_q16: [0; MAX_NB_SUBFR],
            x16: [0; MAX_FRAME_LENGTH],
        };
    }
}

/// Source of the per-frame parameters the encoder quantizes.
pub trait Analyzer {
    /// Estimates the probability that `frame` contains speech, in Q8.
    fn speech_activity_q8(&mut self, frame: &[i16]) -> i32;

    /// Analyzes `frame`. `voice_activity` is the activity decision for the frame; inactive frames
    /// are never classified as voiced.
    fn analyze(
        &mut self,
        frame: &[i16],
        geom: &FrameGeometry,
        settings: &ComplexitySettings,
        speech_activity_q8: i32,
        voice_activity: bool,
    ) -> FrameAnalysis;

    /// Forgets all history.
    fn reset(&mut self);
}

/// A straightforward analyzer built on autocorrelation methods.
#[derive(Debug, Clone)]
pub struct BasicAnalyzer {
    /// Input history in front of the next frame.
    history: [i16; MAX_HISTORY],
    fs_khz: usize,
    noise_energy: f64,
}

impl Default for BasicAnalyzer {
    fn default() -> Self {
        return BasicAnalyzer {
            history: [0; MAX_HISTORY],
            fs_khz: 0,
            noise_energy: MIN_NOISE_ENERGY,
        };
    }
}

impl BasicAnalyzer {
    pub fn new() -> Self {
        return Self::default();
    }
}

/// Solves the normal equations of a predictor of order `a.len()` by the Levinson-Durbin
/// recursion. Returns the prediction error energy.
///
/// The predictor estimates `x[n]` as `sum(a[j] * x[n - 1 - j])`.
fn levinson(r: &[f64], a: &mut [f64]) -> f64 {
    let order = a.len();
    debug_assert!(r.len() > order);

    a.fill(0.0);

    let mut err = r[0];

    if err <= 0.0 {
        return 0.0;
    }

    let mut prev = [0f64; MAX_SHAPE_LPC_ORDER];

    for i in 0..order {
        let acc = r[i + 1] - (0..i).map(|j| a[j] * r[i - j]).sum::<f64>();
        let k = (acc / err).clamp(-0.999, 0.999);

        prev[..i].copy_from_slice(&a[..i]);

        for j in 0..i {
            a[j] = prev[j] - k * prev[i - 1 - j];
        }

        a[i] = k;
        err *= 1.0 - k * k;
    }

    return err;
}

/// Scales coefficient `i` by `chirp^(i + 1)`.
fn bandwidth_expand(a: &mut [f64], chirp: f64) {
    let mut c = chirp;

    for v in a.iter_mut() {
        *v *= c;
        c *= chirp;
    }
}

/// Autocorrelation on a frequency-warped time axis: every unit delay is replaced by a first order
/// allpass section with coefficient `warping`. `corr.len() - 1` must be even.
fn warped_autocorrelation(corr: &mut [f64], x: &[f64], warping: f64) {
    let order = corr.len() - 1;
    debug_assert!(order % 2 == 0 && order <= MAX_SHAPE_LPC_ORDER);

    let mut state = [0f64; MAX_SHAPE_LPC_ORDER + 1];
    corr.fill(0.0);

    for &s in x {
        let mut tmp1 = s;

        for i in (0..order).step_by(2) {
            let tmp2 = state[i] + warping * (state[i + 1] - tmp1);
            state[i] = tmp1;
            corr[i] += state[0] * tmp1;

            tmp1 = state[i + 1] + warping * (state[i + 2] - tmp2);
            state[i + 1] = tmp2;
            corr[i + 1] += state[0] * tmp2;
        }

        state[order] = tmp1;
        corr[order] += state[0] * tmp1;
    }
}

/// Turns true warped coefficients into the monic form of the quantizer's warped filter. Returns
/// the gain that was applied.
fn warped_to_monic(a: &mut [f64], warping: f64) -> f64 {
    for i in (1..a.len()).rev() {
        a[i - 1] -= warping * a[i];
    }

    let gain = (1.0 - warping * warping) / (1.0 + warping * a[0]);

    for v in a.iter_mut() {
        *v *= gain;
    }

    return gain;
}

fn warped_from_monic(a: &mut [f64], warping: f64, gain: f64) {
    for i in 1..a.len() {
        a[i - 1] += warping * a[i];
    }

    for v in a.iter_mut() {
        *v /= gain;
    }
}

/// Converts warped shaping coefficients to monic form, bandwidth expanding the true filter until
/// no monic coefficient exceeds `limit`.
fn limit_warped_coefs(a: &mut [f64], warping: f64, limit: f64) {
    let mut gain = warped_to_monic(a, warping);

    for iter in 0..MAX_LIMIT_ITERATIONS {
        let (ind, max_abs) = a
            .iter()
            .map(|v| v.abs())
            .enumerate()
            .fold((0, -1.0), |best, (i, v)| if v > best.1 { (i, v) } else { best });

        if max_abs <= limit {
            return;
        }

        warped_from_monic(a, warping, gain);

        let chirp = 0.99 - (0.8 + 0.1 * iter as f64) * (max_abs - limit) / (max_abs * (ind + 1) as f64);
        bandwidth_expand(a, chirp);

        gain = warped_to_monic(a, warping);
    }
}

/// Solves `m * b = rhs` for a small symmetric positive definite system by Gaussian elimination.
fn solve_ltp(m: &mut [[f64; LTP_ORDER]; LTP_ORDER], rhs: &mut [f64; LTP_ORDER]) -> [f64; LTP_ORDER] {
    let mut b = [0f64; LTP_ORDER];

    for col in 0..LTP_ORDER {
        let pivot = m[col][col];

        if pivot.abs() < 1e-9 {
            return b;
        }

        for row in col + 1..LTP_ORDER {
            let f = m[row][col] / pivot;

            for c in col..LTP_ORDER {
                m[row][c] -= f * m[col][c];
            }

            rhs[row] -= f * rhs[col];
        }
    }

    for row in (0..LTP_ORDER).rev() {
        let acc = (row + 1..LTP_ORDER).map(|c| m[row][c] * b[c]).sum::<f64>();
        b[row] = (rhs[row] - acc) / m[row][row];
    }

    return b;
}

fn normalized_correlation(x: &[f64], start: usize, len: usize, lag: usize) -> f64 {
    let cur = &x[start..start + len];
    let past = &x[start - lag..start - lag + len];

    let (mut xy, mut xx, mut yy) = (0.0, 0.0, 0.0);

    for (&a, &b) in cur.iter().zip(past) {
        xy += a * b;
        xx += a * a;
        yy += b * b;
    }

    return xy / (xx * yy + 1e-9).sqrt();
}

fn to_q(x: f64, q: u32, limit: f64) -> i32 {
    return (x * f64::from(1u32 << q)).round().clamp(-limit, limit) as i32;
}

impl BasicAnalyzer {
    /// Searches the open-loop pitch lag of the frame held in `e[start..start + len]`.
    fn search_pitch(e: &[f64], start: usize, len: usize, geom: &FrameGeometry) -> (usize, f64) {
        let min_lag = geom.min_lag();
        let max_lag = geom.max_lag();

        let (best_lag, best_corr) = (min_lag..=max_lag)
            .map(|lag| (lag, normalized_correlation(e, start, len, lag)))
            .fold((min_lag, f64::MIN), |best, cand| if cand.1 > best.1 { cand } else { best });

        // Guard against picking a multiple of the true period.
        for d in (2..=4).rev() {
            let centre = (best_lag + d / 2) / d;

            if centre < min_lag + 1 {
                continue;
            }

            let (lag, corr) = (centre - 1..=centre + 1)
                .map(|lag| (lag, normalized_correlation(e, start, len, lag)))
                .fold((centre, f64::MIN), |best, cand| if cand.1 > best.1 { cand } else { best });

            if corr >= OCTAVE_BIAS * best_corr {
                return (lag, corr);
            }
        }

        return (best_lag, best_corr);
    }

    /// Estimates the 5-tap long-term predictor of subframe `k` and returns the unquantized taps
    /// together with the residual energies before and after prediction.
    fn ltp_taps(e: &[f64], start: usize, len: usize, lag: usize) -> ([f64; LTP_ORDER], f64, f64) {
        let mut m = [[0f64; LTP_ORDER]; LTP_ORDER];
        let mut rhs = [0f64; LTP_ORDER];
        let mut energy = 0.0;

        for n in start..start + len {
            let base = n + LTP_ORDER / 2 - lag;

            energy += e[n] * e[n];

            for i in 0..LTP_ORDER {
                rhs[i] += e[n] * e[base - i];

                for j in 0..LTP_ORDER {
                    m[i][j] += e[base - i] * e[base - j];
                }
            }
        }

        let trace = (0..LTP_ORDER).map(|i| m[i][i]).sum::<f64>();
        let reg = 0.01 * trace / LTP_ORDER as f64 + 1e-6;

        for (i, row) in m.iter_mut().enumerate() {
            row[i] += reg;
        }

        let (m0, rhs0) = (m, rhs);
        let b = solve_ltp(&mut m, &mut rhs);

        // Residual energy after prediction: E - 2 b.r + b'Mb.
        let br = b.iter().zip(&rhs0).map(|(b, r)| b * r).sum::<f64>();
        let bmb = (0..LTP_ORDER)
            .map(|i| (0..LTP_ORDER).map(|j| b[i] * m0[i][j] * b[j]).sum::<f64>())
            .sum::<f64>();

        let res = (energy - 2.0 * br + bmb).max(energy * 1e-3);

        return (b, energy, res);
    }
}

impl Analyzer for BasicAnalyzer {
    fn speech_activity_q8(&mut self, frame: &[i16]) -> i32 {
        if frame.is_empty() {
            return 0;
        }

        let energy =
            frame.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>() / frame.len() as f64;

        if energy < SILENCE_ENERGY {
            return 0;
        }

        let snr_db = 10.0 * (energy / self.noise_energy).log10();

        if energy < self.noise_energy {
            self.noise_energy = energy.max(MIN_NOISE_ENERGY);
        }
        else {
            self.noise_energy *= NOISE_RISE;
        }

        // Map 2 dB to 18 dB above the noise floor onto the full activity range.
        return ((snr_db - 2.0) * 16.0).clamp(0.0, 255.0) as i32;
    }

    fn analyze(
        &mut self,
        frame: &[i16],
        geom: &FrameGeometry,
        settings: &ComplexitySettings,
        speech_activity_q8: i32,
        voice_activity: bool,
    ) -> FrameAnalysis {
        let len = geom.frame_length;
        let order = geom.lpc_order;
        let subfr = geom.subfr_length;
        let hist = geom.ltp_mem_length + order;

        debug_assert_eq!(frame.len(), len);

        if geom.fs_khz != self.fs_khz {
            self.history = [0; MAX_HISTORY];
            self.fs_khz = geom.fs_khz;
        }

        let mut out = FrameAnalysis {
            speech_activity_q8,
            input_quality_q14: (speech_activity_q8 << 6).min(16383),
            ..Default::default()
        };

        out.x16[..len].copy_from_slice(frame);

        // History followed by the frame.
        let mut x = [0f64; MAX_HISTORY + MAX_FRAME_LENGTH];

        for (dst, &src) in x.iter_mut().zip(self.history[MAX_HISTORY - hist..].iter().chain(frame)) {
            *dst = f64::from(src);
        }

        let x = &x[..hist + len];

        self.history.copy_within(len.., 0);
        self.history[MAX_HISTORY - len..].copy_from_slice(frame);

        // Autocorrelation of the sine-windowed frame.
        let mut r = [0f64; MAX_SHAPE_LPC_ORDER + 1];

        let mut windowed = [0f64; MAX_FRAME_LENGTH];
        for (n, (w, &s)) in windowed.iter_mut().zip(&x[hist..]).enumerate() {
            let phase = std::f64::consts::PI * (n as f64 + 0.5) / len as f64;
            *w = s * phase.sin();
        }

        let windowed = &windowed[..len];

        for (lag, r) in r.iter_mut().enumerate() {
            *r = windowed.iter().zip(&windowed[lag..]).map(|(a, b)| a * b).sum();
        }

        r[0] *= 1.0 + WHITE_NOISE_FRACTION;
        r[0] += 1e-9;

        out.input_tilt_q15 = to_q(r[1] / r[0], 15, 32767.0);

        // Short-term predictor and its NLSFs.
        let mut a = [0f64; MAX_LPC_ORDER];
        levinson(&r, &mut a[..order]);

        let mut a_q16 = [0i32; MAX_LPC_ORDER];
        for (q, &a) in a_q16.iter_mut().zip(&a[..order]) {
            *q = to_q(a, 16, f64::from(i32::MAX >> 1));
        }

        nlsf::lpc_to_nlsf(&mut out.nlsf_q15[..order], &mut a_q16[..order]);

        // Prediction residual over the history and the frame.
        let mut e = [0f64; MAX_HISTORY + MAX_FRAME_LENGTH];

        for n in order..hist + len {
            let pred = a[..order].iter().enumerate().map(|(j, &a)| a * x[n - 1 - j]).sum::<f64>();
            e[n] = x[n] - pred;
        }

        let e = &e[..hist + len];

        for (k, gain) in out.res_gains_q16.iter_mut().take(geom.nb_subfr).enumerate() {
            let sub = &e[hist + k * subfr..hist + (k + 1) * subfr];
            let rms = (sub.iter().map(|v| v * v).sum::<f64>() / subfr as f64).sqrt();
            *gain = to_q(rms.min(32000.0), 16, f64::from(i32::MAX));
        }

        // Pitch.
        let threshold = f64::from(settings.pitch_threshold_q16) / 65536.0;

        out.signal_type = if voice_activity { SignalType::Unvoiced } else { SignalType::Inactive };

        if voice_activity {
            let (lag, corr) = Self::search_pitch(e, hist, len, geom);

            trace!("silk: open-loop pitch lag {} correlation {:.3}", lag, corr);

            if corr >= threshold {
                Self::voiced_parameters(&mut out, e, hist, geom, lag, corr);
            }
        }

        // Noise shaping. The quantizer runs the shaping filter on a warped delay line when warping
        // is enabled, so the filter is estimated on the same warped frequency axis.
        let shaping_order = settings.shaping_lpc_order.min(MAX_SHAPE_LPC_ORDER);
        let warping = f64::from(settings.warping_q16(geom.fs_khz)) / 65536.0;

        let mut r_shp = r;

        if warping > 0.0 {
            warped_autocorrelation(&mut r_shp[..=shaping_order], windowed, warping);
            r_shp[0] = r_shp[0] * (1.0 + WHITE_NOISE_FRACTION) + 1e-9;
        }

        let mut ar = [0f64; MAX_SHAPE_LPC_ORDER];
        levinson(&r_shp, &mut ar[..shaping_order]);

        bandwidth_expand(&mut ar[..shaping_order], SHAPING_CHIRP);

        if warping > 0.0 {
            limit_warped_coefs(&mut ar[..shaping_order], warping, SHAPING_COEF_LIMIT);
        }

        let fs_khz = geom.fs_khz as i32;
        let voiced = out.signal_type == SignalType::Voiced;

        let tilt_q14 = if voiced {
            // More high-pass noise shaping for voiced speech, scaled by activity.
            -4096 - ((3 * 5734 * speech_activity_q8) >> 10)
        }
        else {
            -4096
        };

        let subframes = izip!(
            out.ar_q13.chunks_exact_mut(MAX_SHAPE_LPC_ORDER),
            out.lf_shp_q14.iter_mut(),
            out.tilt_q14.iter_mut(),
            out.pitch_l.iter(),
        );

        for (ar_q13, lf_shp_q14, tilt, &lag) in subframes.take(geom.nb_subfr) {
            for (dst, &c) in ar_q13.iter_mut().zip(&ar[..shaping_order]) {
                *dst = to_q(c, 13, f64::from(i16::MAX)) as i16;
            }

            // Low-frequency shaping: MA coefficient in the lower, AR coefficient in the upper half.
            let b_q14 = if voiced { 3277 / fs_khz + 49152 / lag.max(1) } else { 21299 / fs_khz };
            let strength_q14 = if voiced { b_q14 } else { (b_q14 * 3) >> 1 };

            let lf_ar_q14 = 16384 - b_q14 - strength_q14;
            *lf_shp_q14 = (lf_ar_q14 << 16) | ((b_q14 - 16384) & 0xffff);
            *tilt = tilt_q14;
        }

        return out;
    }

    fn reset(&mut self) {
        *self = BasicAnalyzer::default();
    }
}

impl BasicAnalyzer {
    /// Fills in the pitch lags and long-term predictor of a voiced frame.
    fn voiced_parameters(
        out: &mut FrameAnalysis,
        e: &[f64],
        start: usize,
        geom: &FrameGeometry,
        lag: usize,
        corr: f64,
    ) {
        let subfr = geom.subfr_length;
        let nb_subfr = geom.nb_subfr;

        // Refine the lag of every subframe around the frame lag.
        let mut lags = [0i32; MAX_NB_SUBFR];

        for (k, l) in lags.iter_mut().take(nb_subfr).enumerate() {
            let lo = lag.saturating_sub(2).max(geom.min_lag());
            let hi = (lag + 2).min(geom.max_lag());

            let best = (lo..=hi)
                .map(|l| (l, normalized_correlation(e, start + k * subfr, subfr, l)))
                .fold((lag, f64::MIN), |best, cand| if cand.1 > best.1 { cand } else { best });

            *l = best.0 as i32;
        }

        let (lag_index, contour_index) = pitch::quantize_lags(&lags[..nb_subfr], geom);

        out.lag_index = lag_index;
        out.contour_index = contour_index;
        pitch::decode_pitch(&mut out.pitch_l, lag_index, contour_index, geom);

        // Long-term predictor at the coded lags.
        let mut target_q14 = [0i32; MAX_NB_SUBFR * LTP_ORDER];
        let (mut energy, mut res) = (0.0, 0.0);

        for (k, target) in target_q14.chunks_exact_mut(LTP_ORDER).take(nb_subfr).enumerate() {
            let (b, e0, e1) = Self::ltp_taps(e, start + k * subfr, subfr, out.pitch_l[k] as usize);

            for (t, &b) in target.iter_mut().zip(&b) {
                *t = to_q(b, 14, 32767.0);
            }

            energy += e0;
            res += e1;
        }

        out.ltp = pitch::quantize_ltp(&target_q14[..nb_subfr * LTP_ORDER], nb_subfr);

        let gain_db = if res > 0.0 { 10.0 * (energy / res).log10() } else { 0.0 };
        out.ltp_pred_cod_gain_q7 = to_q(gain_db.clamp(0.0, 24.0), 7, f64::from(i32::MAX));

        // Harmonic shaping grows with the periodicity of the frame.
        let harm_q14 = to_q(0.3 * corr.clamp(0.0, 1.0).sqrt(), 14, 16384.0);

        out.harm_shape_gain_q14[..nb_subfr].fill(harm_q14);

        out.signal_type = SignalType::Voiced;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Bandwidth;

    fn pulse_train(len: usize, period: usize, amplitude: f64) -> Vec<i16> {
        let mut y = 0.0;

        return (0..len)
            .map(|n| {
                let p = if n % period == 0 { amplitude } else { 0.0 };
                y = p + 0.9 * y;
                y as i16
            })
            .collect();
    }

    fn noise(len: usize, amplitude: i32, seed: i32) -> Vec<i16> {
        let mut s = seed;

        return (0..len)
            .map(|_| {
                s = crate::fixed::silk_rand(s);
                (((s >> 16) * amplitude) >> 15) as i16
            })
            .collect();
    }

    #[test]
    fn verify_silence_is_inactive() {
        let mut analyzer = BasicAnalyzer::new();
        let frame = vec![0i16; 320];

        assert_eq!(analyzer.speech_activity_q8(&frame), 0);

        let geom = FrameGeometry::new(Bandwidth::WideBand, 4);
        let settings = ComplexitySettings::from_complexity(10);

        let analysis = analyzer.analyze(&frame, &geom, &settings, 0, false);

        assert_eq!(analysis.signal_type, SignalType::Inactive);
        assert!(analysis.res_gains_q16.iter().all(|&g| g < 65536));
    }

    #[test]
    fn verify_activity_follows_level() {
        let mut analyzer = BasicAnalyzer::new();

        let quiet = noise(320, 8, 1);
        let loud = noise(320, 8000, 2);

        let quiet_activity = analyzer.speech_activity_q8(&quiet);
        let loud_activity = analyzer.speech_activity_q8(&loud);

        assert!(quiet_activity < 20);
        assert!(loud_activity > 200);
    }

    #[test]
    fn verify_pulse_train_is_voiced() {
        let geom = FrameGeometry::new(Bandwidth::WideBand, 4);
        let settings = ComplexitySettings::from_complexity(10);
        let signal = pulse_train(4 * 320, 80, 8000.0);

        let mut analyzer = BasicAnalyzer::new();
        let mut last = FrameAnalysis::default();

        for frame in signal.chunks_exact(320) {
            let activity = analyzer.speech_activity_q8(frame);
            last = analyzer.analyze(frame, &geom, &settings, activity, true);
        }

        assert_eq!(last.signal_type, SignalType::Voiced);
        assert!(last.pitch_l.iter().all(|&l| (78..=82).contains(&l)), "lags {:?}", last.pitch_l);
        assert!(last.ltp_pred_cod_gain_q7 > 0);
        assert!(last.harm_shape_gain_q14.iter().all(|&h| h > 0));
    }

    #[test]
    fn verify_noise_analysis() {
        let geom = FrameGeometry::new(Bandwidth::NarrowBand, 4);
        let settings = ComplexitySettings::from_complexity(2);
        let signal = noise(3 * 160, 4000, 7);

        let mut analyzer = BasicAnalyzer::new();

        for frame in signal.chunks_exact(160) {
            let analysis = analyzer.analyze(frame, &geom, &settings, 200, true);

            assert_ne!(analysis.signal_type, SignalType::Inactive);

            // NLSFs are strictly increasing.
            let nlsf = &analysis.nlsf_q15[..10];
            assert!(nlsf.windows(2).all(|w| w[0] < w[1]));

            // White noise is barely predictable, so the residual keeps its level.
            assert!(analysis.res_gains_q16.iter().all(|&g| g > 1000 << 16));
            assert_eq!(&analysis.x16[..160], frame);
        }
    }

    #[test]
    fn verify_unwarped_autocorrelation() {
        let x: Vec<f64> = noise(320, 4000, 3).iter().map(|&v| f64::from(v)).collect();

        let mut corr = [0f64; 17];
        warped_autocorrelation(&mut corr, &x, 0.0);

        for (lag, &c) in corr.iter().enumerate() {
            let plain: f64 = x.iter().zip(&x[lag..]).map(|(a, b)| a * b).sum();
            assert!((c - plain).abs() <= 1e-6 * plain.abs().max(1.0), "lag {}", lag);
        }
    }

    #[test]
    fn verify_warped_coefs_are_limited() {
        let warping = f64::from(16 * 983) / 65536.0;

        // A sharply resonant filter whose monic form exceeds the Q13 range.
        let true_coefs = [-3.0, 5.0, -5.5, 4.5, -3.0, 1.5, -0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];

        let mut monic = true_coefs;
        warped_to_monic(&mut monic, warping);
        assert!(monic.iter().any(|v| v.abs() > SHAPING_COEF_LIMIT));

        let mut a = true_coefs;
        limit_warped_coefs(&mut a, warping, SHAPING_COEF_LIMIT);

        assert!(a.iter().all(|v| v.abs() <= SHAPING_COEF_LIMIT), "{:?}", a);

        // Monic conversion is invertible.
        let orig = [0.5, -0.25, 0.125, 0.0625];
        let mut b = orig;
        let gain = warped_to_monic(&mut b, warping);
        warped_from_monic(&mut b, warping, gain);

        assert!(orig.iter().zip(&b).all(|(x, y)| (x - y).abs() < 1e-12));
    }

    #[test]
    fn verify_warped_shaping_filter_is_stable() {
        let geom = FrameGeometry::new(Bandwidth::WideBand, 4);
        let settings = ComplexitySettings::from_complexity(10);
        assert!(settings.warping_q16(geom.fs_khz) > 0);

        let signal = pulse_train(4 * 320, 64, 12000.0);
        let mut analyzer = BasicAnalyzer::new();

        for frame in signal.chunks_exact(320) {
            let activity = analyzer.speech_activity_q8(frame);
            let analysis = analyzer.analyze(frame, &geom, &settings, activity, true);

            // The warped filter in monic form stays inside the Q13 range without clipping.
            for ar in analysis.ar_q13.chunks_exact(MAX_SHAPE_LPC_ORDER).take(geom.nb_subfr) {
                assert!(ar.iter().all(|&c| i32::from(c).abs() <= 32760), "{:?}", ar);
            }
        }
    }

    #[test]
    fn verify_levinson() {
        // First order autoregressive process with coefficient 0.5.
        let r = [1.0, 0.5, 0.25, 0.125];
        let mut a = [0f64; 3];

        let err = levinson(&r, &mut a);

        assert!((a[0] - 0.5).abs() < 1e-9);
        assert!(a[1].abs() < 1e-9 && a[2].abs() < 1e-9);
        assert!((err - 0.75).abs() < 1e-9);
    }
}
