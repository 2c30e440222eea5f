// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Internal bandwidth selection.
//!
//! Switching the internal sample rate abruptly is audible. Before switching down, the encoder
//! therefore sweeps a low-pass filter over the input from the full band down to the band of the
//! lower rate, and only then asks for permission to switch. After switching up, the filter sweeps
//! the other way. A sweep takes [`TRANSITION_FRAMES`] 20 ms frames (10 ms frames advance it at the
//! same per-frame pace).

use log::debug;

use crate::fixed::smlawb;
use crate::frame::Bandwidth;
use crate::lpc::biquad_alt;
use crate::table::{TRANSITION_INT_NUM, TRANSITION_LP_A_Q28, TRANSITION_LP_B_Q28};

/// Number of frames a full sweep of the transition filter takes.
pub const TRANSITION_FRAMES: i32 = 256;

/// Frames between two consecutive filter designs of the sweep.
const TRANSITION_INT_STEPS: i32 = TRANSITION_FRAMES / (TRANSITION_INT_NUM as i32 - 1);

/// Direction of a bandwidth transition in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    /// No transition: the filter is bypassed.
    Stable,
    /// The cut-off is being lowered ahead of a switch to a lower bandwidth.
    Down,
    /// The cut-off is being raised after a switch to a higher bandwidth.
    Up,
}

/// Low-pass filter with a cut-off that moves a little every frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionFilter {
    state: [i32; 2],
    /// Position of the sweep, from 0 (lowest cut-off) to `TRANSITION_FRAMES` (full band).
    frame_no: i32,
    /// Sweep step per frame: negative when going down, positive when going up.
    mode: i32,
}

/// Interpolates the filter taps for a position between two designs of the table.
fn interpolate_taps(ind: usize, fac_q16: i32) -> ([i32; 3], [i32; 2]) {
    if ind >= TRANSITION_INT_NUM - 1 {
        return (TRANSITION_LP_B_Q28[TRANSITION_INT_NUM - 1], TRANSITION_LP_A_Q28[TRANSITION_INT_NUM - 1]);
    }

    let (b0, a0) = (&TRANSITION_LP_B_Q28[ind], &TRANSITION_LP_A_Q28[ind]);
    let (b1, a1) = (&TRANSITION_LP_B_Q28[ind + 1], &TRANSITION_LP_A_Q28[ind + 1]);

    if fac_q16 <= 0 {
        return (*b0, *a0);
    }

    let mut b = [0; 3];
    let mut a = [0; 2];

    // Interpolate from whichever design is closer to limit the error of the 16 bit factor.
    if fac_q16 < 32768 {
        for i in 0..3 {
            b[i] = smlawb(b0[i], b1[i] - b0[i], fac_q16);
        }
        for i in 0..2 {
            a[i] = smlawb(a0[i], a1[i] - a0[i], fac_q16);
        }
    }
    else {
        for i in 0..3 {
            b[i] = smlawb(b1[i], b1[i] - b0[i], fac_q16 - (1 << 16));
        }
        for i in 0..2 {
            a[i] = smlawb(a1[i], a1[i] - a0[i], fac_q16 - (1 << 16));
        }
    }

    return (b, a);
}

impl TransitionFilter {
    pub fn new() -> Self {
        return Self::default();
    }

    pub fn state(&self) -> TransitionState {
        return match self.mode {
            0 => TransitionState::Stable,
            m if m < 0 => TransitionState::Down,
            _ => TransitionState::Up,
        };
    }

    pub fn frame_no(&self) -> i32 {
        return self.frame_no;
    }

    fn restart(&mut self, frame_no: i32) {
        self.frame_no = frame_no;
        self.state = [0; 2];
    }

    /// Filters one frame in place and advances the sweep.
    pub fn process(&mut self, frame: &mut [i16]) {
        if self.mode == 0 {
            return;
        }

        let mut fac_q16 = ((TRANSITION_FRAMES - self.frame_no) << 16) / TRANSITION_INT_STEPS;
        let ind = (fac_q16 >> 16) as usize;
        fac_q16 -= (ind as i32) << 16;

        let (b_q28, a_q28) = interpolate_taps(ind, fac_q16);

        self.frame_no = (self.frame_no + self.mode).clamp(0, TRANSITION_FRAMES);

        biquad_alt(frame, &b_q28, &a_q28, &mut self.state);
    }
}

/// Rates the bandwidth is chosen against, all in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandwidthRequest {
    pub api_rate: u32,
    pub min_rate: u32,
    pub max_rate: u32,
    pub desired_rate: u32,
    /// The caller accepts a bandwidth change in this frame.
    pub switch_allowed: bool,
    pub payload_ms: usize,
}

/// Outcome of [`BandwidthController::control`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandwidthDecision {
    pub bandwidth: Bandwidth,
    /// The transition is complete and the encoder would like to switch on the next frame.
    pub switch_ready: bool,
    /// Bit budget of the frame, reduced when a switch is pending.
    pub max_bits: i32,
}

/// Largest bandwidth whose internal rate does not exceed `rate`.
fn bandwidth_for_rate(rate: u32) -> Bandwidth {
    return match rate {
        r if r >= 16000 => Bandwidth::WideBand,
        r if r >= 12000 => Bandwidth::MediumBand,
        _ => Bandwidth::NarrowBand,
    };
}

fn step_down(bandwidth: Bandwidth) -> Bandwidth {
    return match bandwidth {
        Bandwidth::WideBand => Bandwidth::MediumBand,
        _ => Bandwidth::NarrowBand,
    };
}

fn step_up(bandwidth: Bandwidth) -> Bandwidth {
    return match bandwidth {
        Bandwidth::NarrowBand => Bandwidth::MediumBand,
        _ => Bandwidth::WideBand,
    };
}

/// Chooses the internal bandwidth of a channel frame by frame.
#[derive(Debug, Clone, Default)]
pub struct BandwidthController {
    filter: TransitionFilter,
}

impl BandwidthController {
    pub fn new() -> Self {
        return Self::default();
    }

    pub fn transition(&self) -> TransitionState {
        return self.filter.state();
    }

    /// Applies the transition filter to a frame at the internal rate.
    pub fn filter(&mut self, frame: &mut [i16]) {
        self.filter.process(frame);
    }

    /// Decides the bandwidth of the next frame given the bandwidth of the previous one.
    ///
    /// Moves at most one bandwidth step at a time, and only in frames where the caller allows a
    /// switch.
    pub fn control(
        &mut self,
        current: Option<Bandwidth>,
        req: &BandwidthRequest,
        max_bits: i32,
    ) -> BandwidthDecision {
        let mut decision = BandwidthDecision {
            bandwidth: current.unwrap_or(Bandwidth::WideBand),
            switch_ready: false,
            max_bits,
        };

        let current = match current {
            Some(bw) => bw,
            None => {
                decision.bandwidth = bandwidth_for_rate(req.desired_rate.min(req.api_rate));
                return decision;
            }
        };

        let rate = current.fs_khz() as u32 * 1000;

        if rate > req.api_rate || rate > req.max_rate || rate < req.min_rate {
            decision.bandwidth = bandwidth_for_rate(req.api_rate.min(req.max_rate).max(req.min_rate));
            return decision;
        }

        if self.filter.frame_no >= TRANSITION_FRAMES {
            self.filter.mode = 0;
        }

        let desired = req.desired_rate.min(req.api_rate).min(req.max_rate).max(req.min_rate);

        if rate > desired {
            // Going down starts with a sweep from the full band.
            if self.filter.mode == 0 {
                self.filter.restart(TRANSITION_FRAMES);
            }

            if req.switch_allowed {
                self.filter.mode = 0;
                decision.bandwidth = step_down(current);

                debug!("silk: switching down to {:?}", decision.bandwidth);
            }
            else if self.filter.frame_no <= 0 {
                decision.switch_ready = true;
                decision.max_bits -= max_bits * 5 / (req.payload_ms as i32 + 5);
            }
            else {
                self.filter.mode = -2;
            }
        }
        else if rate < desired {
            if req.switch_allowed {
                decision.bandwidth = step_up(current);
                self.filter.restart(0);
                self.filter.mode = 1;

                debug!("silk: switching up to {:?}", decision.bandwidth);
            }
            else if self.filter.mode == 0 {
                decision.switch_ready = true;
                decision.max_bits -= max_bits * 5 / (req.payload_ms as i32 + 5);
            }
            else {
                self.filter.mode = 1;
            }
        }
        else if self.filter.mode < 0 {
            // The desired rate went back up during a downward sweep.
            self.filter.mode = 1;
        }

        return decision;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(desired_rate: u32, switch_allowed: bool) -> BandwidthRequest {
        return BandwidthRequest {
            api_rate: 48000,
            min_rate: 8000,
            max_rate: 16000,
            desired_rate,
            switch_allowed,
            payload_ms: 20,
        };
    }

    #[test]
    fn verify_initial_bandwidth() {
        let mut ctrl = BandwidthController::new();

        let mut req = request(12000, false);
        assert_eq!(ctrl.control(None, &req, 1000).bandwidth, Bandwidth::MediumBand);

        req.api_rate = 8000;
        assert_eq!(ctrl.control(None, &req, 1000).bandwidth, Bandwidth::NarrowBand);

        // A bandwidth outside of the allowed range is replaced immediately.
        let mut req = request(8000, false);
        req.max_rate = 12000;
        assert_eq!(ctrl.control(Some(Bandwidth::WideBand), &req, 1000).bandwidth, Bandwidth::MediumBand);
    }

    #[test]
    fn verify_switch_up_handshake() {
        let mut ctrl = BandwidthController::new();

        // Asks for permission first, and reserves bits for the switch.
        let decision = ctrl.control(Some(Bandwidth::NarrowBand), &request(16000, false), 1000);
        assert_eq!(decision.bandwidth, Bandwidth::NarrowBand);
        assert!(decision.switch_ready);
        assert_eq!(decision.max_bits, 800);

        // One step at a time, followed by an upward sweep.
        let decision = ctrl.control(Some(Bandwidth::NarrowBand), &request(16000, true), 1000);
        assert_eq!(decision.bandwidth, Bandwidth::MediumBand);
        assert!(!decision.switch_ready);
        assert_eq!(ctrl.transition(), TransitionState::Up);
        assert_eq!(ctrl.filter.frame_no(), 0);

        let mut frame = [0i16; 320];
        for _ in 0..TRANSITION_FRAMES {
            ctrl.filter(&mut frame);
        }
        assert_eq!(ctrl.filter.frame_no(), TRANSITION_FRAMES);

        // The sweep ends once the full band is reached.
        let decision = ctrl.control(Some(Bandwidth::MediumBand), &request(12000, false), 1000);
        assert_eq!(decision.bandwidth, Bandwidth::MediumBand);
        assert_eq!(ctrl.transition(), TransitionState::Stable);
    }

    #[test]
    fn verify_switch_down_sweeps_first() {
        let mut ctrl = BandwidthController::new();

        let decision = ctrl.control(Some(Bandwidth::WideBand), &request(8000, false), 1000);
        assert_eq!(decision.bandwidth, Bandwidth::WideBand);
        assert!(!decision.switch_ready);
        assert_eq!(ctrl.transition(), TransitionState::Down);

        let mut frame = [0i16; 320];
        for _ in 0..TRANSITION_FRAMES / 2 {
            ctrl.filter(&mut frame);
        }
        assert_eq!(ctrl.filter.frame_no(), 0);

        let decision = ctrl.control(Some(Bandwidth::WideBand), &request(8000, false), 1000);
        assert!(decision.switch_ready);

        let decision = ctrl.control(Some(Bandwidth::WideBand), &request(8000, true), 1000);
        assert_eq!(decision.bandwidth, Bandwidth::MediumBand);
        assert_eq!(ctrl.transition(), TransitionState::Stable);
    }

    #[test]
    fn verify_interrupted_down_sweep_reverses() {
        let mut ctrl = BandwidthController::new();

        ctrl.control(Some(Bandwidth::WideBand), &request(12000, false), 1000);
        assert_eq!(ctrl.transition(), TransitionState::Down);

        let mut frame = [0i16; 320];
        for _ in 0..10 {
            ctrl.filter(&mut frame);
        }

        ctrl.control(Some(Bandwidth::WideBand), &request(16000, false), 1000);
        assert_eq!(ctrl.transition(), TransitionState::Up);
    }

    #[test]
    fn verify_filter_removes_high_frequencies() {
        let mut filter = TransitionFilter::new();
        filter.mode = -2;

        // At the bottom of the sweep, the cut-off is far below the Nyquist frequency.
        let mut nyquist: Vec<i16> = (0..320).map(|i| if i % 2 == 0 { 8000 } else { -8000 }).collect();
        filter.process(&mut nyquist);
        assert!(nyquist[160..].iter().all(|&x| x.abs() < 200));

        let mut dc = [4000i16; 320];
        filter.restart(0);
        filter.process(&mut dc);
        assert!(dc[160..].iter().all(|&x| (x - 4000).abs() < 200));

        // Bypassed when stable.
        let mut filter = TransitionFilter::new();
        let mut frame = [1234i16; 16];
        filter.process(&mut frame);
        assert_eq!(frame, [1234; 16]);
    }

    #[test]
    fn verify_taps_at_design_points() {
        assert_eq!(interpolate_taps(0, 0), (TRANSITION_LP_B_Q28[0], TRANSITION_LP_A_Q28[0]));
        assert_eq!(interpolate_taps(4, 0), (TRANSITION_LP_B_Q28[4], TRANSITION_LP_A_Q28[4]));

        // Halfway lies between the neighbouring designs.
        let (b, _) = interpolate_taps(1, 32768);
        let (lo, hi) = (TRANSITION_LP_B_Q28[1][0], TRANSITION_LP_B_Q28[2][0]);
        assert!(b[0] >= lo.min(hi) && b[0] <= lo.max(hi));
    }
}
