use crate::app_config::Target;
use crate::key_input::{KeyInput, KeyReader};
use crate::motion_controller::{KeyOutcome, MotionConfig, MotionController};
use crate::onvif_camera::OnvifCamera;
use crate::ptz_worker::PtzWorker;
use anyhow::{Context, Result};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

const ERROR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Keyboard PTZ session against one camera. Returns when Escape or Ctrl+C is
/// pressed.
pub fn run(target: Target, config: MotionConfig, call_timeout: Duration) -> Result<()> {
    let camera_id = target.camera_id().to_string();
    log::info!("camera {camera_id}: connecting to {}", target.onvif_endpoint());
    let worker = PtzWorker::connect(OnvifCamera::connect(target), call_timeout)
        .context("ptz connect failed")?;
    let mut controller = MotionController::new(config, worker);

    let (tx, rx) = mpsc::channel();
    let reader = KeyReader::spawn(tx).context("spawn key reader")?;
    log::info!(
        "PTZ ready: WASD/arrows move, shift/ctrl zoom, q/e focus, m/n speed, 1-9 presets, Esc quits"
    );

    loop {
        match rx.recv_timeout(ERROR_POLL_INTERVAL) {
            Ok(KeyInput::Press(key)) => match controller.handle_key_press(&key) {
                KeyOutcome::Quit => break,
                KeyOutcome::Speed(speed) => log::debug!("speed now {speed:.1}"),
                KeyOutcome::Motion | KeyOutcome::Preset(_) | KeyOutcome::Ignored => {}
            },
            Ok(KeyInput::Release(key)) => {
                controller.handle_key_release(&key);
            }
            Ok(KeyInput::Interrupt) | Err(RecvTimeoutError::Disconnected) => {
                controller.escape();
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
        while let Some(err) = controller.sink().try_recv_error() {
            log::warn!("camera {camera_id}: PTZ {err}");
        }
    }

    drop(reader);
    controller.into_sink().shutdown();
    log::info!("camera {camera_id}: PTZ session closed");
    Ok(())
}
