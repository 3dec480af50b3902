use crate::motion_controller::CommandSink;
use crate::ptz_actuator::{self, ActuatorError, PtzActuator, PtzCommand};
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(1500);

/// Fire-and-forget PTZ dispatcher.
///
/// Commands queue on a channel and run in order on a dedicated thread, so a
/// slow camera never stalls key handling. Failures come back through
/// [`PtzWorker::try_recv_error`].
pub struct PtzWorker {
    tx: Option<Sender<PtzCommand>>,
    err_rx: Receiver<ActuatorError>,
    thread: Option<JoinHandle<()>>,
}

impl PtzWorker {
    pub fn new<A: PtzActuator>(actuator: A, call_timeout: Duration) -> Result<Self> {
        Self::spawn(async move { Ok(actuator) }, call_timeout)
    }

    /// Builds the actuator on the worker's runtime first. If that fails the
    /// error is returned here and no worker is left running.
    pub fn connect<A, F>(init: F, call_timeout: Duration) -> Result<Self>
    where
        A: PtzActuator,
        F: Future<Output = Result<A>> + Send + 'static,
    {
        Self::spawn(init, call_timeout)
    }

    fn spawn<A, F>(init: F, call_timeout: Duration) -> Result<Self>
    where
        A: PtzActuator,
        F: Future<Output = Result<A>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let (err_tx, err_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("ptz-worker".to_string())
            .spawn(move || run_worker(init, call_timeout, rx, err_tx, ready_tx))
            .context("spawn ptz worker thread")?;
        ready_rx
            .recv()
            .context("ptz worker exited during startup")??;
        Ok(Self {
            tx: Some(tx),
            err_rx,
            thread: Some(thread),
        })
    }

    pub fn send(&self, command: PtzCommand) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(command);
        }
    }

    pub fn try_recv_error(&self) -> Option<ActuatorError> {
        self.err_rx.try_recv().ok()
    }

    /// Drains queued commands, then stops the worker thread.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("ptz worker thread panicked");
            }
        }
    }
}

impl Drop for PtzWorker {
    fn drop(&mut self) {
        self.close();
    }
}

impl CommandSink for PtzWorker {
    fn submit(&mut self, command: PtzCommand) {
        self.send(command);
    }
}

fn run_worker<A, F>(
    init: F,
    call_timeout: Duration,
    rx: Receiver<PtzCommand>,
    err_tx: Sender<ActuatorError>,
    ready_tx: Sender<Result<()>>,
) where
    A: PtzActuator,
    F: Future<Output = Result<A>>,
{
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ready_tx.send(Err(anyhow::anyhow!("tokio runtime init failed: {err}")));
            return;
        }
    };
    let actuator = match runtime.block_on(init) {
        Ok(actuator) => actuator,
        Err(err) => {
            let _ = ready_tx.send(Err(err.context("ptz init error")));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    for command in rx {
        log::debug!("PTZ command: {command:?}");
        let result = runtime.block_on(ptz_actuator::execute(&actuator, &command, call_timeout));
        if let Err(err) = result {
            log::debug!("PTZ {err}");
            let _ = err_tx.send(err);
        }
    }
    log::debug!("ptz worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ptz_actuator::{MockPtzActuator, Velocity};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::sync::{Arc, Mutex};

    #[test]
    fn commands_run_in_order() {
        let mut actuator = MockPtzActuator::new();
        let mut seq = Sequence::new();
        actuator
            .expect_continuous_move()
            .with(eq(Velocity::new(0.5, 0.0, 0.0)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        actuator
            .expect_stop()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        actuator
            .expect_goto_preset()
            .withf(|token| token == "PresetToken1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let worker = PtzWorker::new(actuator, DEFAULT_CALL_TIMEOUT).unwrap();
        worker.send(PtzCommand::Continuous(Velocity::new(0.5, 0.0, 0.0)));
        worker.send(PtzCommand::Stop);
        worker.send(PtzCommand::GotoPreset("PresetToken1".to_string()));
        worker.shutdown();
    }

    #[test]
    fn failures_are_reported_not_fatal() {
        let mut actuator = MockPtzActuator::new();
        actuator
            .expect_stop()
            .times(1)
            .returning(|| Err(anyhow!("HTTP 500")));
        actuator.expect_stop_focus().times(1).returning(|| Ok(()));

        let mut worker = PtzWorker::new(actuator, DEFAULT_CALL_TIMEOUT).unwrap();
        worker.submit(PtzCommand::Stop);
        worker.submit(PtzCommand::StopFocus);
        worker.close();
        let err = worker.try_recv_error().unwrap();
        assert_eq!(err.operation(), "Stop");
        assert!(!err.is_timeout());
        assert!(worker.try_recv_error().is_none());
    }

    struct SlowActuator {
        move_delay: Duration,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl PtzActuator for SlowActuator {
        async fn continuous_move(&self, _velocity: Velocity) -> anyhow::Result<()> {
            tokio::time::sleep(self.move_delay).await;
            self.calls.lock().unwrap().push("continuous_move");
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("stop");
            Ok(())
        }

        async fn start_focus(&self, _speed: f32) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("start_focus");
            Ok(())
        }

        async fn stop_focus(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("stop_focus");
            Ok(())
        }

        async fn goto_preset(&self, _token: &str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("goto_preset");
            Ok(())
        }
    }

    #[test]
    fn slow_command_times_out_and_queue_continues() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let actuator = SlowActuator {
            move_delay: Duration::from_millis(500),
            calls: calls.clone(),
        };
        let mut worker = PtzWorker::new(actuator, Duration::from_millis(50)).unwrap();
        worker.send(PtzCommand::Continuous(Velocity::new(0.5, 0.0, 0.0)));
        worker.send(PtzCommand::Stop);
        worker.close();

        let err = worker.try_recv_error().unwrap();
        assert!(err.is_timeout());
        assert_eq!(err.operation(), "ContinuousMove");
        assert!(matches!(
            err,
            ActuatorError::Timeout { timeout, .. } if timeout == Duration::from_millis(50)
        ));
        assert!(worker.try_recv_error().is_none());
        assert_eq!(*calls.lock().unwrap(), vec!["stop"]);
    }

    #[test]
    fn failed_init_is_returned() {
        let result = PtzWorker::connect::<MockPtzActuator, _>(
            async { Err(anyhow!("camera unreachable")) },
            DEFAULT_CALL_TIMEOUT,
        );
        let err = result.err().unwrap();
        assert!(format!("{err:#}").contains("camera unreachable"));
    }
}
