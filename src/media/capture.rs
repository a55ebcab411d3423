//! Capture provider seam
//!
//! Sessions never talk to capture hardware directly. They ask a
//! [`CaptureSource`] for tracks, so tests and headless deployments can
//! substitute a synthetic provider while real integrations wrap a device
//! stack behind the same trait.

use crate::media::track::{LocalTrack, TrackSource};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which media kinds an acquire call should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    /// Request a microphone track
    pub audio: bool,
    /// Request a camera track
    pub video: bool,
}

impl MediaConstraints {
    /// Audio and video both requested
    pub fn audio_video() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }

    /// Camera only
    pub fn video_only() -> Self {
        Self {
            audio: false,
            video: true,
        }
    }

    /// True when nothing is requested
    pub fn is_empty(&self) -> bool {
        !self.audio && !self.video
    }
}

/// Provider of local media tracks
///
/// Implementations map the two acquisition surfaces of the platform media
/// layer: user media (microphone and camera) and display media (screen).
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Acquire microphone and/or camera tracks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaAccessDenied`] when the user or platform refuses
    /// access and [`Error::MediaDeviceUnavailable`] when no device exists.
    async fn acquire_user_media(&self, constraints: MediaConstraints)
        -> Result<Vec<Arc<LocalTrack>>>;

    /// Acquire one display-capture video track.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScreenShareDenied`] when the picker is dismissed or
    /// capture is refused.
    async fn acquire_display_media(&self) -> Result<Arc<LocalTrack>>;
}

/// Capture provider that manufactures silent/blank tracks.
///
/// Used by the probe binary and by tests: the tracks are real sample tracks
/// that negotiate normally, they just carry no frames until a feeder writes
/// some. Failure injection makes denied-permission paths testable.
///
/// # Example
///
/// ```
/// use classmesh::{CaptureSource, MediaConstraints, SyntheticCapture};
///
/// # tokio_test::block_on(async {
/// let capture = SyntheticCapture::new();
/// let tracks = capture
///     .acquire_user_media(MediaConstraints::audio_video())
///     .await
///     .unwrap();
/// assert_eq!(tracks.len(), 2);
/// # });
/// ```
#[derive(Default)]
pub struct SyntheticCapture {
    fail_user_media: parking_lot::Mutex<Option<Error>>,
    fail_display_media: parking_lot::Mutex<Option<Error>>,
}

impl SyntheticCapture {
    /// New provider that always succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `acquire_user_media` call fail with `err`
    pub fn fail_next_user_media(&self, err: Error) {
        *self.fail_user_media.lock() = Some(err);
    }

    /// Make the next `acquire_display_media` call fail with `err`
    pub fn fail_next_display_media(&self, err: Error) {
        *self.fail_display_media.lock() = Some(err);
    }
}

#[async_trait]
impl CaptureSource for SyntheticCapture {
    async fn acquire_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Vec<Arc<LocalTrack>>> {
        if let Some(err) = self.fail_user_media.lock().take() {
            return Err(err);
        }

        let stream_id = format!("stream-{}", uuid::Uuid::new_v4());
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(Arc::new(LocalTrack::audio(
                TrackSource::Microphone,
                stream_id.clone(),
            )));
        }
        if constraints.video {
            tracks.push(Arc::new(LocalTrack::video(
                TrackSource::Camera,
                stream_id.clone(),
            )));
        }

        Ok(tracks)
    }

    async fn acquire_display_media(&self) -> Result<Arc<LocalTrack>> {
        if let Some(err) = self.fail_display_media.lock().take() {
            return Err(err);
        }

        let stream_id = format!("screen-{}", uuid::Uuid::new_v4());
        Ok(Arc::new(LocalTrack::video(TrackSource::Screen, stream_id)))
    }
}
