use crate::cli::CameraArgs;
use crate::motion_controller::MotionConfig;
use crate::playback::MediaSource;
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const RTSP_PORT: u16 = 554;
const RTSP_FALLBACK_PATH: &str = "/Streaming/Channels/101";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnvifAuth {
    Basic,
    Wsse,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("failed to read key map {path}")]
    ReadKeyMap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid key map {path}")]
    ParseKeyMap {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Target {
    camera_id: String,
    host: String,
    username: String,
    password: String,
    onvif_port: u16,
    onvif_path: String,
    onvif_auth: OnvifAuth,
    onvif_insecure: bool,
    profile_token: Option<String>,
    timeout: Duration,
}

impl Target {
    pub fn from_args(args: &CameraArgs) -> Result<Self, ConfigError> {
        let host = required(&args.ip, "ip")?;
        let username = required(&args.username, "username")?;
        let password = args.password.clone();
        if password.is_empty() {
            return Err(ConfigError::Missing("password"));
        }
        Ok(Self {
            camera_id: args.camera_id.trim().to_string(),
            host,
            username,
            password,
            onvif_port: args.onvif_port,
            onvif_path: normalize_path(&args.onvif_path),
            onvif_auth: args.onvif_auth,
            onvif_insecure: args.onvif_insecure,
            profile_token: args
                .profile_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
            timeout: Duration::from_millis(args.timeout_ms),
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn onvif_endpoint(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.host, self.onvif_port, self.onvif_path
        )
    }

    pub fn credentials(&self) -> (&str, &str) {
        (self.username.as_str(), self.password.as_str())
    }

    pub fn onvif_auth(&self) -> OnvifAuth {
        self.onvif_auth
    }

    pub fn onvif_insecure(&self) -> bool {
        self.onvif_insecure
    }

    pub fn profile_token(&self) -> Option<&str> {
        self.profile_token.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Source the player attaches. A discovered URI that already carries
    /// credentials is used as is; an RTSP one without gets them embedded.
    /// Otherwise the camera's default main channel is used.
    pub fn stream_source(&self, discovered: Option<&str>) -> MediaSource {
        let uri = match discovered {
            Some(uri) if uri.contains('@') => uri.to_string(),
            Some(uri) => self
                .embed_credentials(uri)
                .unwrap_or_else(|| self.fallback_rtsp()),
            None => self.fallback_rtsp(),
        };
        MediaSource::new(uri)
    }

    /// Userinfo is percent-encoded, so `@`, `:` and `/` in credentials
    /// survive.
    fn embed_credentials(&self, uri: &str) -> Option<String> {
        let mut url = Url::parse(uri).ok().filter(|url| url.scheme() == "rtsp")?;
        url.set_username(&self.username).ok()?;
        url.set_password(Some(&self.password)).ok()?;
        Some(url.into())
    }

    fn fallback_rtsp(&self) -> String {
        let plain = format!("rtsp://{}:{}{}", self.host, RTSP_PORT, RTSP_FALLBACK_PATH);
        self.embed_credentials(&plain).unwrap_or(plain)
    }
}

/// Reads a JSON key map. Fields left out keep their defaults.
pub fn load_motion_config(path: &Path) -> Result<MotionConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadKeyMap {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::ParseKeyMap {
        path: path.to_path_buf(),
        source,
    })
}

fn required(value: &str, name: &'static str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Missing(name));
    }
    Ok(trimmed.to_string())
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
