//! Frame pacing
//!
//! Reconciles capture cadence with the consumer's stream clock. Each tick
//! first decides whether to wait, then asks the backend for a frame and
//! commits it against the nominal frame grid. Frame boundaries always move
//! by exactly one frame length from the last committed boundary, so wake-up
//! jitter never accumulates.

use crate::capture::{BackendError, CaptureBackend, FrameOutcome};
use crate::clock::{ClockTime, ReferenceClock, UNITS, UNITS_PER_MS};
use crate::convert::I420Frame;
use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shortest sleep the cadence wait will ask for
pub const MIN_SLEEP: ClockTime = UNITS_PER_MS;

/// Nominal frame length for a frame rate
pub fn frame_length_for_fps(fps: u32) -> ClockTime {
    UNITS / ClockTime::from(fps.max(1))
}

/// Why the pacer is about to sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Stream clock not running yet
    NoClock,
    /// Next frame boundary not reached
    Cadence,
    /// Behind schedule after a miss; short resync sleep
    CatchUp,
}

/// A sleep decided by the wait policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPlan {
    pub reason: WaitReason,
    pub duration: ClockTime,
}

/// Timing state of one session
#[derive(Debug, Clone)]
pub struct PacingState {
    frame_length: ClockTime,
    previous_boundary: ClockTime,
    frame_number: u64,
    missed_count: u64,
    missed: bool,
    delivered: u64,
    fastest_round: Option<Duration>,
    total_round: Duration,
    session_start: Instant,
}

impl PacingState {
    pub fn new(frame_length: ClockTime) -> Self {
        Self {
            frame_length: frame_length.max(1),
            previous_boundary: 0,
            frame_number: 0,
            missed_count: 0,
            missed: true,
            delivered: 0,
            fastest_round: None,
            total_round: Duration::ZERO,
            session_start: Instant::now(),
        }
    }

    /// Back to the freshly-initialized state, keeping the frame length
    pub fn reset(&mut self) {
        *self = Self::new(self.frame_length);
    }

    pub fn frame_length(&self) -> ClockTime {
        self.frame_length
    }

    pub fn previous_boundary(&self) -> ClockTime {
        self.previous_boundary
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn missed_count(&self) -> u64 {
        self.missed_count
    }

    pub fn missed(&self) -> bool {
        self.missed
    }

    /// Wait policy, evaluated in priority order
    ///
    /// Returns the sleep to perform, or `None` when the caller should go
    /// straight to producing a frame. The catch-up branches update the
    /// counters as a side effect.
    pub fn plan_wait(&mut self, now: ClockTime) -> Option<WaitPlan> {
        let len = self.frame_length;
        let next_boundary = self.previous_boundary + len;

        if now <= 0 {
            return Some(WaitPlan {
                reason: WaitReason::NoClock,
                duration: len / 2,
            });
        }

        if now < next_boundary {
            return Some(WaitPlan {
                reason: WaitReason::Cadence,
                duration: (next_boundary - now).min(len).max(MIN_SLEEP),
            });
        }

        if self.missed {
            return Some(WaitPlan {
                reason: WaitReason::CatchUp,
                duration: len / 2,
            });
        }

        if now > self.previous_boundary + 2 * len {
            let missed = ((now - len - self.previous_boundary) / len) as u64;
            self.frame_number += missed;
            self.missed_count += missed;
            self.previous_boundary += missed as ClockTime * len;
            debug!(
                "missed {} frames can't keep up {} {} {:.02}%",
                missed,
                self.frame_number,
                self.missed_count,
                100.0 * self.missed_count as f64 / self.frame_number.max(1) as f64
            );
        }
        self.missed = true;
        None
    }

    /// Whether a stale frame may stand in for a fresh one at `now`
    pub fn allow_repeat(&self, now: ClockTime) -> bool {
        self.missed && now > self.previous_boundary + self.frame_length / 5
    }

    /// First frame after a reset only anchors the frame grid
    fn anchor(&mut self, now: ClockTime) {
        self.previous_boundary = now;
        self.missed = false;
    }

    fn needs_anchor(&self) -> bool {
        self.previous_boundary <= 0
    }

    /// Commit a delivered frame and return its `[start, end)` pair
    fn commit(&mut self, round: Duration) -> (ClockTime, ClockTime) {
        self.missed = false;
        self.fastest_round = Some(self.fastest_round.map_or(round, |f| f.min(round)));
        self.total_round += round;

        self.previous_boundary = self.previous_boundary.max(0) + self.frame_length;

        let start = self.frame_number as ClockTime * self.frame_length;
        let end = start + self.frame_length;
        self.frame_number += 1;
        self.delivered += 1;
        (start, end)
    }

    pub fn stats(&self) -> PacingStats {
        PacingStats {
            frame_number: self.frame_number,
            delivered: self.delivered,
            missed_count: self.missed_count,
            fastest_round: self.fastest_round,
            total_round: self.total_round,
            elapsed: self.session_start.elapsed(),
            frame_length: self.frame_length,
        }
    }
}

/// Read-only view of the pacing counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingStats {
    pub frame_number: u64,
    pub delivered: u64,
    pub missed_count: u64,
    pub fastest_round: Option<Duration>,
    pub total_round: Duration,
    pub elapsed: Duration,
    pub frame_length: ClockTime,
}

impl PacingStats {
    /// Frames per second since the session started
    pub fn average_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frame_number as f64 / secs
        } else {
            0.0
        }
    }

    /// Frame rate the backend could sustain on average
    pub fn average_possible_fps(&self) -> f64 {
        let secs = self.total_round.as_secs_f64();
        if secs > 0.0 {
            self.delivered as f64 / secs
        } else {
            0.0
        }
    }

    pub fn fastest_round_fps(&self) -> f64 {
        match self.fastest_round {
            Some(round) if !round.is_zero() => 1.0 / round.as_secs_f64(),
            _ => 0.0,
        }
    }

    pub fn negotiated_fps(&self) -> f64 {
        UNITS as f64 / self.frame_length as f64
    }
}

/// A timestamped frame handed to the consumer
#[derive(Debug, Clone)]
pub struct Sample {
    pub frame: Arc<I420Frame>,
    pub start: ClockTime,
    pub end: ClockTime,
    /// Every delivered frame is independently decodable
    pub sync_point: bool,
    /// First frame of the session
    pub discontinuity: bool,
    /// The backend handed out a stale frame
    pub repeated: bool,
}

/// Result of one pacing tick
#[derive(Debug, Clone)]
pub enum Tick {
    /// Slept or got nothing; tick again
    Pending,
    /// The first frame after a reset was used as the timing anchor
    Anchored,
    Delivered(Sample),
}

/// Drives a capture backend against the stream clock
pub struct FramePacer {
    clock: Arc<dyn ReferenceClock>,
    state: PacingState,
}

impl FramePacer {
    pub fn new(clock: Arc<dyn ReferenceClock>, frame_length: ClockTime) -> Self {
        Self {
            clock,
            state: PacingState::new(frame_length),
        }
    }

    pub fn clock(&self) -> &Arc<dyn ReferenceClock> {
        &self.clock
    }

    pub fn state(&self) -> &PacingState {
        &self.state
    }

    pub fn stats(&self) -> PacingStats {
        self.state.stats()
    }

    pub fn reset(&mut self) {
        self.state.reset();
        debug!("frame_length: {}", self.state.frame_length);
    }

    /// Change the frame rate; implies a reset
    pub fn set_frame_length(&mut self, frame_length: ClockTime) {
        self.state = PacingState::new(frame_length);
    }

    /// One pass of wait policy followed by a produce attempt
    pub fn tick(&mut self, backend: &mut dyn CaptureBackend) -> Result<Tick, BackendError> {
        let mut now = self.clock.now();

        if let Some(plan) = self.state.plan_wait(now) {
            match plan.reason {
                WaitReason::NoClock => debug!("no reference graph clock - sleeping {}", plan.duration),
                WaitReason::Cadence => debug!("sleeping - {}", plan.duration),
                WaitReason::CatchUp => debug!("starting/missed - sleeping {}", plan.duration),
            }
            self.clock.sleep(plan.duration);
            if plan.reason == WaitReason::NoClock {
                return Ok(Tick::Pending);
            }
            now = self.clock.now();
        }

        let allow_repeat = self.state.allow_repeat(now);
        let round_start = Instant::now();
        let outcome = backend.produce_frame(now, allow_repeat)?;

        let (frame, repeated) = match outcome {
            FrameOutcome::Empty => return Ok(Tick::Pending),
            FrameOutcome::Fresh(frame) => (frame, false),
            FrameOutcome::Repeated(frame) => (frame, true),
            FrameOutcome::Substituted(frame) => {
                if allow_repeat {
                    self.state.missed_count += 1;
                }
                (frame, true)
            }
        };

        if self.state.needs_anchor() {
            self.state.anchor(now);
            debug!("skip first frame");
            return Ok(Tick::Anchored);
        }

        let round = round_start.elapsed();
        let (start, end) = self.state.commit(round);
        let discontinuity = self.state.delivered == 1;
        debug!(
            "timestamping ({}) video packet {} -> {} drift:({})",
            now,
            start,
            end,
            now - self.state.previous_boundary
        );
        self.log_round(&frame, round);

        Ok(Tick::Delivered(Sample {
            frame,
            start,
            end,
            sync_point: true,
            discontinuity,
            repeated,
        }))
    }

    fn log_round(&self, frame: &I420Frame, round: Duration) {
        let stats = self.state.stats();
        let round_ms = round.as_secs_f64() * 1000.0;
        let round_fps = if round_ms > 0.0 { 1000.0 / round_ms } else { 0.0 };
        debug!(
            "done video frame! total frames: {} size {}x{} took: {:.02}ms, {:.02} ave fps ({:.02} is the theoretical max fps based on this round, ave. possible fps {:.02}, fastest round fps {:.02}, negotiated fps {:.06}), frame missed {}",
            stats.frame_number,
            frame.width,
            frame.height,
            round_ms,
            stats.average_fps(),
            round_fps,
            stats.average_possible_fps(),
            stats.fastest_round_fps(),
            stats.negotiated_fps(),
            stats.missed_count
        );
    }
}
