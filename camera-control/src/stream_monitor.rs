//! Background task that keeps one playback session alive.
//!
//! The task owns the backend and the [`StreamSupervisor`]. Sampling, stall
//! checks and the restart sequence all run inside it, one after the other, so
//! a restart decision can never race a concurrent reset. Every wait inside a
//! restart observes the cancellation token; once shutdown is requested or
//! the handle is dropped, the task makes no further backend calls.

use crate::playback::{MediaSource, PlaybackBackend, PlaybackState};
use crate::stream_session::Throughput;
use crate::stream_supervisor::{RestartPlan, StreamSupervisor, SupervisorConfig, Verdict};
use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Events kept for a presentation layer that is not reading; newer ones are
/// dropped once this many are pending.
pub const EVENT_BACKLOG: usize = 64;

/// Status notifications for the presentation layer.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Stalling { zero_samples: u32 },
    RestartScheduled(RestartPlan),
    Restarted { attempt: u32 },
    RestartFailed { attempt: u32, error: String },
    Recovered,
}

#[derive(Clone, Copy, Debug)]
pub enum StreamControl {
    SetMute(bool),
}

/// Handle to a running monitor task. Dropping it cancels the task.
pub struct StreamMonitor<B> {
    cancel: CancellationToken,
    _cancel_on_drop: DropGuard,
    control_tx: mpsc::UnboundedSender<StreamControl>,
    events_rx: mpsc::Receiver<StreamEvent>,
    throughput_rx: watch::Receiver<Throughput>,
    task: JoinHandle<B>,
}

impl<B: PlaybackBackend> StreamMonitor<B> {
    /// Starts playback of `source` on `backend` and spawns the monitor task.
    /// Must be called from within a tokio runtime.
    pub fn start(backend: B, source: MediaSource, config: SupervisorConfig) -> Self {
        let cancel = CancellationToken::new();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BACKLOG);
        let (throughput_tx, throughput_rx) = watch::channel(Throughput::Unknown);
        let worker = Worker {
            backend,
            source,
            supervisor: StreamSupervisor::new(config),
            cancel: cancel.clone(),
            events_tx,
            throughput_tx,
            degraded: false,
        };
        let task = tokio::spawn(worker.run(control_rx));
        Self {
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            control_tx,
            events_rx,
            throughput_rx,
            task,
        }
    }

    /// Latest smoothed throughput, for display.
    pub fn throughput(&self) -> Throughput {
        *self.throughput_rx.borrow()
    }

    pub fn try_recv_event(&mut self) -> Option<StreamEvent> {
        self.events_rx.try_recv().ok()
    }

    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events_rx.recv().await
    }

    pub fn set_muted(&self, muted: bool) {
        let _ = self.control_tx.send(StreamControl::SetMute(muted));
    }

    /// Cancels the task, including any restart in flight, and returns the
    /// backend untouched by the monitor from then on.
    pub async fn shutdown(self) -> Result<B> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|err| anyhow!("stream monitor task failed: {err}"))
    }
}

enum RestartOutcome {
    Completed,
    Failed(anyhow::Error),
    Cancelled,
}

struct Worker<B> {
    backend: B,
    source: MediaSource,
    supervisor: StreamSupervisor,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<StreamEvent>,
    throughput_tx: watch::Sender<Throughput>,
    degraded: bool,
}

impl<B: PlaybackBackend> Worker<B> {
    async fn run(mut self, mut control_rx: mpsc::UnboundedReceiver<StreamControl>) -> B {
        if let Err(err) = self.backend.play() {
            log::warn!("initial play of {} failed: {err:#}", self.source.uri());
        }
        let config = self.supervisor.config().clone();
        let mut sample_tick = ticker(config.sample_interval);
        let mut evaluate_tick = ticker(config.evaluate_interval);
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(control) = control_rx.recv() => self.apply_control(control),
                _ = sample_tick.tick() => self.sample(),
                _ = evaluate_tick.tick() => {
                    let Some(plan) = self.evaluate() else {
                        continue;
                    };
                    if !self.restart(plan).await {
                        break;
                    }
                    sample_tick.reset();
                    evaluate_tick.reset();
                }
            }
        }
        log::debug!("stream monitor for {} stopped", self.source.uri());
        self.backend
    }

    fn apply_control(&mut self, control: StreamControl) {
        match control {
            StreamControl::SetMute(muted) => {
                if let Err(err) = self.backend.set_mute(muted) {
                    log::warn!("set mute={muted} failed: {err:#}");
                }
            }
        }
    }

    fn sample(&mut self) {
        let reading = match self.backend.cumulative_bytes() {
            Ok(reading) => reading,
            Err(err) => {
                log::debug!("stream stats unavailable: {err:#}");
                None
            }
        };
        let throughput = self.supervisor.sample(Instant::now().into_std(), reading);
        self.throughput_tx.send_replace(throughput);
    }

    fn evaluate(&mut self) -> Option<RestartPlan> {
        let state = self.read_state();
        match self.supervisor.evaluate(Instant::now().into_std(), state) {
            Verdict::Healthy => {
                if std::mem::take(&mut self.degraded) {
                    log::info!("stream {} recovered", self.source.uri());
                    self.emit(StreamEvent::Recovered);
                }
                None
            }
            Verdict::Stalling { zero_samples } => {
                self.degraded = true;
                log::debug!("no throughput for {zero_samples} sample(s)");
                self.emit(StreamEvent::Stalling { zero_samples });
                None
            }
            Verdict::CoolingDown => None,
            Verdict::Restart(plan) => {
                self.degraded = true;
                Some(plan)
            }
        }
    }

    fn read_state(&self) -> Option<PlaybackState> {
        match self.backend.state() {
            Ok(state) => Some(state),
            Err(err) => {
                log::debug!("player state unavailable: {err:#}");
                None
            }
        }
    }

    /// Runs one restart sequence. Returns `false` when cancelled.
    async fn restart(&mut self, plan: RestartPlan) -> bool {
        log::warn!(
            "restarting stream {} in {:?} (attempt {}, {})",
            self.source.uri(),
            plan.delay,
            plan.attempt,
            plan.reason
        );
        self.emit(StreamEvent::RestartScheduled(plan));
        match self.run_restart(plan.delay).await {
            RestartOutcome::Cancelled => false,
            RestartOutcome::Completed => {
                self.supervisor.restart_completed(Instant::now().into_std());
                self.emit(StreamEvent::Restarted {
                    attempt: plan.attempt,
                });
                true
            }
            RestartOutcome::Failed(err) => {
                log::error!("restart attempt {} failed: {err:#}", plan.attempt);
                self.supervisor.restart_failed();
                self.emit(StreamEvent::RestartFailed {
                    attempt: plan.attempt,
                    error: format!("{err:#}"),
                });
                true
            }
        }
    }

    async fn run_restart(&mut self, delay: Duration) -> RestartOutcome {
        let config = self.supervisor.config().clone();
        let cancel = self.cancel.clone();
        if !wait(&cancel, delay).await {
            return RestartOutcome::Cancelled;
        }
        if let Err(err) = self.backend.stop().context("stop player") {
            return RestartOutcome::Failed(err);
        }
        if !wait(&cancel, config.stop_settle).await {
            return RestartOutcome::Cancelled;
        }
        let reattached = self
            .backend
            .set_media(&self.source)
            .context("reattach media")
            .and_then(|()| self.backend.play().context("resume playback"));
        if let Err(err) = reattached {
            return RestartOutcome::Failed(err);
        }
        if !wait(&cancel, config.play_settle).await {
            return RestartOutcome::Cancelled;
        }
        RestartOutcome::Completed
    }

    fn emit(&self, event: StreamEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.events_tx.try_send(event) {
            log::debug!("stream event backlog full, dropping {event:?}");
        }
    }
}

async fn wait(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = time::sleep(duration) => true,
    }
}

fn ticker(period: Duration) -> time::Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
