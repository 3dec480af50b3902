use crate::app_config::OnvifAuth;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Drive IP camera PTZ and resolve live streams over ONVIF")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Keyboard PTZ control of one camera
    Ptz(PtzArgs),
    /// Print the RTSP URI the player would attach
    StreamUri(CameraArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CameraArgs {
    /// Camera identifier, used in log lines
    pub camera_id: String,

    /// IP address or hostname of the camera
    pub ip: String,

    /// Username for RTSP/ONVIF authentication
    #[arg(env = "CAMERA_USERNAME")]
    pub username: String,

    /// Password for RTSP/ONVIF authentication
    #[arg(env = "CAMERA_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// ONVIF port
    #[arg(long, default_value_t = 80)]
    pub onvif_port: u16,

    /// ONVIF device service path
    #[arg(long, default_value = "/onvif/device_service")]
    pub onvif_path: String,

    /// ONVIF auth mode (basic or wsse)
    #[arg(long, value_enum, default_value_t = OnvifAuth::Wsse)]
    pub onvif_auth: OnvifAuth,

    /// Allow invalid TLS certificates for ONVIF HTTPS
    #[arg(long)]
    pub onvif_insecure: bool,

    /// Media profile token override (auto-detect when omitted)
    #[arg(long)]
    pub profile_token: Option<String>,

    /// HTTP timeout in milliseconds
    #[arg(long, default_value_t = 3000)]
    pub timeout_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct PtzArgs {
    #[command(flatten)]
    pub camera: CameraArgs,

    /// JSON key map overriding bindings and preset tokens
    #[arg(long)]
    pub key_map: Option<PathBuf>,

    /// Per-command PTZ timeout in milliseconds
    #[arg(long, default_value_t = 1500)]
    pub call_timeout_ms: u64,
}
