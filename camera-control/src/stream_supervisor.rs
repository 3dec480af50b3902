//! Stall detection and restart back-off for one playback session.
//!
//! The supervisor is a pure state machine. It never sleeps and never talks to
//! the backend; the caller feeds it readings and the current time, and carries
//! out the [`RestartPlan`] it returns.
//!
//! ```text
//! Healthy -> Stalling -> Restarting -> Cooldown -> Healthy
//!    ^          |                                    |
//!    +----------+------------------------------------+
//! ```

use crate::playback::PlaybackState;
use crate::stream_session::{SamplingConfig, StreamSession, Throughput};
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub sampling: SamplingConfig,
    /// Cadence of throughput sampling for display.
    pub sample_interval: Duration,
    /// Cadence of state and stall checks.
    pub evaluate_interval: Duration,
    pub zero_sample_threshold: u32,
    pub restart_base_delay: Duration,
    pub max_restart_delay: Duration,
    /// Pause between stopping the player and reattaching the media.
    pub stop_settle: Duration,
    /// Pause after resuming playback before the restart is considered done.
    pub play_settle: Duration,
    /// Quiet window after a restart during which no stall is evaluated.
    pub cooldown: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            sample_interval: Duration::from_secs(1),
            evaluate_interval: Duration::from_secs(2),
            zero_sample_threshold: 3,
            restart_base_delay: Duration::from_secs(5),
            max_restart_delay: Duration::from_secs(30),
            stop_settle: Duration::from_secs(1),
            play_settle: Duration::from_secs(2),
            cooldown: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorPhase {
    Healthy,
    Stalling { zero_samples: u32 },
    Restarting { attempt: u32 },
    Cooldown { until: Instant },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartReason {
    State(PlaybackState),
    NoThroughput { samples: u32 },
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State(state) => write!(f, "player state {state}"),
            Self::NoThroughput { samples } => {
                write!(f, "no throughput for {samples} consecutive samples")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartPlan {
    pub reason: RestartReason,
    pub attempt: u32,
    pub delay: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    Stalling { zero_samples: u32 },
    CoolingDown,
    Restart(RestartPlan),
}

pub struct StreamSupervisor {
    config: SupervisorConfig,
    session: StreamSession,
    phase: SupervisorPhase,
}

impl StreamSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let session = StreamSession::new(config.sampling.clone());
        Self {
            config,
            session,
            phase: SupervisorPhase::Healthy,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.phase
    }

    /// Feeds one cumulative byte reading (`None` when the backend reported no
    /// stats) and returns the smoothed throughput.
    pub fn sample(&mut self, now: Instant, reading: Option<u64>) -> Throughput {
        self.session.record(now, reading)
    }

    pub fn throughput(&self) -> Throughput {
        self.session.throughput()
    }

    /// Decides whether the session needs a restart.
    ///
    /// `state` is `None` when the backend could not report it; the decision
    /// then rests on throughput alone.
    pub fn evaluate(&mut self, now: Instant, state: Option<PlaybackState>) -> Verdict {
        match self.phase {
            SupervisorPhase::Restarting { .. } => return Verdict::CoolingDown,
            SupervisorPhase::Cooldown { until } if now < until => return Verdict::CoolingDown,
            _ => {}
        }

        if let Some(state) = state.filter(|state| state.is_terminal()) {
            self.session.consecutive_zero_samples = 0;
            return Verdict::Restart(self.begin_restart(RestartReason::State(state)));
        }

        if self.session.throughput().is_zero() {
            self.session.consecutive_zero_samples += 1;
            let zero_samples = self.session.consecutive_zero_samples;
            if zero_samples >= self.config.zero_sample_threshold {
                self.session.consecutive_zero_samples = 0;
                let reason = RestartReason::NoThroughput {
                    samples: zero_samples,
                };
                return Verdict::Restart(self.begin_restart(reason));
            }
            self.phase = SupervisorPhase::Stalling { zero_samples };
            return Verdict::Stalling { zero_samples };
        }

        self.session.consecutive_zero_samples = 0;
        self.session.restart_attempt = 0;
        self.phase = SupervisorPhase::Healthy;
        Verdict::Healthy
    }

    /// Delay before the next restart, from the attempts issued so far.
    pub fn next_restart_delay(&self) -> Duration {
        let factor = self.session.restart_attempt.saturating_add(1);
        self.config
            .restart_base_delay
            .saturating_mul(factor)
            .min(self.config.max_restart_delay)
    }

    /// The restart sequence finished; start the quiet window.
    pub fn restart_completed(&mut self, now: Instant) {
        self.phase = SupervisorPhase::Cooldown {
            until: now + self.config.cooldown,
        };
    }

    /// The backend refused the restart. The attempt still counts toward the
    /// back-off and the next evaluation decides again.
    pub fn restart_failed(&mut self) {
        self.phase = SupervisorPhase::Stalling { zero_samples: 0 };
    }

    fn begin_restart(&mut self, reason: RestartReason) -> RestartPlan {
        let delay = self.next_restart_delay();
        self.session.restart_attempt = self.session.restart_attempt.saturating_add(1);
        let attempt = self.session.restart_attempt;
        self.phase = SupervisorPhase::Restarting { attempt };
        RestartPlan {
            reason,
            attempt,
            delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    fn supervisor() -> StreamSupervisor {
        StreamSupervisor::new(SupervisorConfig::default())
    }

    /// Drives the session to a steady positive throughput.
    fn feed_healthy(supervisor: &mut StreamSupervisor, start: Instant) -> Instant {
        supervisor.sample(start, Some(1_000_000));
        let now = start + SECOND;
        supervisor.sample(now, Some(2_000_000));
        now
    }

    fn restart_plan(verdict: Verdict) -> RestartPlan {
        match verdict {
            Verdict::Restart(plan) => plan,
            other => panic!("expected restart, got {other:?}"),
        }
    }

    #[test]
    fn terminal_state_restarts_immediately() {
        let mut supervisor = supervisor();
        let now = feed_healthy(&mut supervisor, Instant::now());
        let plan = restart_plan(supervisor.evaluate(now, Some(PlaybackState::Error)));
        assert_eq!(plan.reason, RestartReason::State(PlaybackState::Error));
        assert_eq!(plan.attempt, 1);
        assert_eq!(plan.delay, Duration::from_secs(5));
        assert_eq!(supervisor.phase(), SupervisorPhase::Restarting { attempt: 1 });
    }

    #[test]
    fn three_zero_samples_trigger_restart() {
        let mut supervisor = supervisor();
        let now = Instant::now();
        assert_eq!(
            supervisor.evaluate(now, Some(PlaybackState::Playing)),
            Verdict::Stalling { zero_samples: 1 }
        );
        assert_eq!(
            supervisor.evaluate(now, Some(PlaybackState::Buffering)),
            Verdict::Stalling { zero_samples: 2 }
        );
        let plan = restart_plan(supervisor.evaluate(now, Some(PlaybackState::Playing)));
        assert_eq!(plan.reason, RestartReason::NoThroughput { samples: 3 });
        assert_eq!(supervisor.session().consecutive_zero_samples(), 0);
    }

    #[test]
    fn positive_sample_breaks_zero_streak() {
        let mut supervisor = supervisor();
        let start = Instant::now();
        supervisor.evaluate(start, Some(PlaybackState::Playing));
        supervisor.evaluate(start, Some(PlaybackState::Playing));
        assert_eq!(supervisor.session().consecutive_zero_samples(), 2);

        let now = feed_healthy(&mut supervisor, start);
        assert_eq!(supervisor.evaluate(now, Some(PlaybackState::Playing)), Verdict::Healthy);
        assert_eq!(supervisor.session().consecutive_zero_samples(), 0);
        assert_eq!(supervisor.phase(), SupervisorPhase::Healthy);
    }

    #[test]
    fn unknown_state_falls_back_to_throughput() {
        let mut supervisor = supervisor();
        let now = feed_healthy(&mut supervisor, Instant::now());
        assert_eq!(supervisor.evaluate(now, None), Verdict::Healthy);
    }

    #[test]
    fn restart_delay_backs_off_and_resets() {
        let mut supervisor = supervisor();
        let mut now = Instant::now();
        let mut delays = Vec::new();
        for _ in 0..8 {
            let plan = restart_plan(supervisor.evaluate(now, Some(PlaybackState::Ended)));
            delays.push(plan.delay.as_secs());
            supervisor.restart_completed(now);
            now += supervisor.config().cooldown;
        }
        assert_eq!(delays, vec![5, 10, 15, 20, 25, 30, 30, 30]);

        let now = feed_healthy(&mut supervisor, now);
        assert_eq!(supervisor.evaluate(now, Some(PlaybackState::Playing)), Verdict::Healthy);
        assert_eq!(supervisor.session().restart_attempt(), 0);
        assert_eq!(supervisor.next_restart_delay(), Duration::from_secs(5));
    }

    #[test]
    fn cooldown_suppresses_evaluation() {
        let mut supervisor = supervisor();
        let now = Instant::now();
        restart_plan(supervisor.evaluate(now, Some(PlaybackState::Stopped)));
        assert_eq!(
            supervisor.evaluate(now, Some(PlaybackState::Stopped)),
            Verdict::CoolingDown
        );

        supervisor.restart_completed(now);
        let inside = now + Duration::from_secs(9);
        assert_eq!(
            supervisor.evaluate(inside, Some(PlaybackState::Stopped)),
            Verdict::CoolingDown
        );
        let after = now + Duration::from_secs(10);
        let plan = restart_plan(supervisor.evaluate(after, Some(PlaybackState::Stopped)));
        assert_eq!(plan.attempt, 2);
        assert_eq!(plan.delay, Duration::from_secs(10));
    }

    #[test]
    fn failed_restart_keeps_backoff() {
        let mut supervisor = supervisor();
        let now = Instant::now();
        restart_plan(supervisor.evaluate(now, Some(PlaybackState::Error)));
        supervisor.restart_failed();
        let plan = restart_plan(supervisor.evaluate(now, Some(PlaybackState::Error)));
        assert_eq!(plan.attempt, 2);
        assert_eq!(plan.delay, Duration::from_secs(10));
    }

    #[test]
    fn zero_streak_tracks_every_positive_sample() {
        let mut supervisor = supervisor();
        let mut now = Instant::now();
        let mut bytes = 1_000_000u64;
        supervisor.sample(now, Some(bytes));
        // Alternate stalled and flowing seconds; the streak never reaches three.
        for step in 0..12 {
            now += SECOND;
            if step % 3 == 2 {
                bytes += 500_000;
            }
            supervisor.sample(now, Some(bytes));
            let verdict = supervisor.evaluate(now, Some(PlaybackState::Playing));
            if !supervisor.throughput().is_zero() {
                assert_eq!(verdict, Verdict::Healthy);
                assert_eq!(supervisor.session().consecutive_zero_samples(), 0);
            }
            assert!(!matches!(verdict, Verdict::Restart(_)));
        }
    }
}
