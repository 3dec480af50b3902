use anyhow::Result;
use mockall::automock;
use strum::Display;

/// Playback state as reported by the media backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum PlaybackState {
    Opening,
    Playing,
    Buffering,
    Stalled,
    Error,
    Ended,
    Stopped,
}

impl PlaybackState {
    /// States that require a restart regardless of throughput.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Ended | Self::Stopped)
    }
}

/// The source a session was opened with; reattached verbatim on restart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaSource {
    uri: String,
}

impl MediaSource {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

/// Narrow view of a media player used by the stream monitor.
///
/// Every call may fail. The monitor treats a failed query as "no stats" and a
/// failed control call as a failed restart; nothing here is fatal.
#[automock]
pub trait PlaybackBackend: Send + 'static {
    fn state(&self) -> Result<PlaybackState>;

    /// Cumulative demuxed bytes, or `None` when the backend has no stats yet.
    fn cumulative_bytes(&self) -> Result<Option<u64>>;

    fn play(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn set_media(&mut self, source: &MediaSource) -> Result<()>;

    fn set_mute(&mut self, muted: bool) -> Result<()>;
}
