use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use std::time::Duration;
use thiserror::Error;

/// Continuous-move velocity, each component in [-1, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity {
    pub pan: f32,
    pub tilt: f32,
    pub zoom: f32,
}

impl Velocity {
    pub const ZERO: Velocity = Velocity {
        pan: 0.0,
        tilt: 0.0,
        zoom: 0.0,
    };

    pub fn new(pan: f32, tilt: f32, zoom: f32) -> Self {
        Self { pan, tilt, zoom }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PtzCommand {
    Continuous(Velocity),
    Stop,
    StartFocus(f32),
    StopFocus,
    GotoPreset(String),
}

impl PtzCommand {
    pub fn operation(&self) -> &'static str {
        match self {
            PtzCommand::Continuous(_) => "ContinuousMove",
            PtzCommand::Stop => "Stop",
            PtzCommand::StartFocus(_) => "FocusMove",
            PtzCommand::StopFocus => "FocusStop",
            PtzCommand::GotoPreset(_) => "GotoPreset",
        }
    }
}

/// Remote PTZ hardware.
#[automock]
#[async_trait]
pub trait PtzActuator: Send + Sync + 'static {
    async fn continuous_move(&self, velocity: Velocity) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn start_focus(&self, speed: f32) -> Result<()>;

    async fn stop_focus(&self) -> Result<()>;

    async fn goto_preset(&self, token: &str) -> Result<()>;
}

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("{operation} failed: {source:#}")]
    Failed {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ActuatorError {
    pub fn operation(&self) -> &'static str {
        match self {
            ActuatorError::Timeout { operation, .. } | ActuatorError::Failed { operation, .. } => {
                operation
            }
        }
    }

    /// Both variants leave the camera usable; the next command may succeed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ActuatorError::Timeout { .. })
    }
}

/// Applies one command to the actuator, bounded by `timeout`.
pub async fn execute<A: PtzActuator + ?Sized>(
    actuator: &A,
    command: &PtzCommand,
    timeout: Duration,
) -> Result<(), ActuatorError> {
    let operation = command.operation();
    let call = async {
        match command {
            PtzCommand::Continuous(velocity) => actuator.continuous_move(*velocity).await,
            PtzCommand::Stop => actuator.stop().await,
            PtzCommand::StartFocus(speed) => actuator.start_focus(*speed).await,
            PtzCommand::StopFocus => actuator.stop_focus().await,
            PtzCommand::GotoPreset(token) => actuator.goto_preset(token).await,
        }
    };
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(ActuatorError::Failed { operation, source }),
        Err(_) => Err(ActuatorError::Timeout { operation, timeout }),
    }
}
