//! Local media lifecycle
//!
//! [`MediaController`] owns the local tracks for one session: acquisition
//! through a [`CaptureSource`], mute toggles, and the camera/screen
//! substitution. It is owned and driven by the session loop, so it needs no
//! interior locking of its own.

use crate::media::capture::{CaptureSource, MediaConstraints};
use crate::media::track::{LocalTrack, TrackKind, TrackSource};
use crate::peer::transport::PeerTransport;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Snapshot of local media flags, published as part of the session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalMediaState {
    /// Microphone track present and unmuted
    pub audio_enabled: bool,
    /// Video track present and unmuted
    pub video_enabled: bool,
    /// The video slot currently holds a screen track
    pub screen_sharing: bool,
}

/// Owner of the session's local tracks
pub struct MediaController {
    source: Arc<dyn CaptureSource>,
    audio: Option<Arc<LocalTrack>>,
    video: Option<Arc<LocalTrack>>,
    screen_sharing: bool,
    /// Whether a camera track was swapped out when the share started
    camera_before_share: bool,
}

impl MediaController {
    /// New controller with no tracks acquired
    pub fn new(source: Arc<dyn CaptureSource>) -> Self {
        Self {
            source,
            audio: None,
            video: None,
            screen_sharing: false,
            camera_before_share: false,
        }
    }

    /// Acquire microphone/camera tracks per `constraints`.
    ///
    /// Requesting nothing succeeds with no tracks. Tracks already held for a
    /// re-requested kind are stopped and replaced.
    ///
    /// # Errors
    ///
    /// Propagates the capture provider's error; held tracks are untouched
    /// when acquisition fails.
    pub async fn acquire(&mut self, constraints: MediaConstraints) -> Result<()> {
        if constraints.is_empty() {
            debug!("No media requested, skipping capture");
            return Ok(());
        }

        let tracks = self.source.acquire_user_media(constraints).await?;
        for track in tracks {
            let slot = match track.kind() {
                TrackKind::Audio => &mut self.audio,
                TrackKind::Video => &mut self.video,
            };
            if let Some(old) = slot.replace(track) {
                warn!(
                    track_id = %old.id(),
                    "Replacing existing {} track",
                    old.kind().as_str()
                );
                old.stop();
            }
        }

        info!(
            audio = self.audio.is_some(),
            video = self.video.is_some(),
            "Local media acquired"
        );
        Ok(())
    }

    /// All currently held tracks
    pub fn tracks(&self) -> Vec<Arc<LocalTrack>> {
        self.audio.iter().chain(self.video.iter()).cloned().collect()
    }

    /// Current microphone track, if any
    pub fn audio_track(&self) -> Option<&Arc<LocalTrack>> {
        self.audio.as_ref()
    }

    /// Current video track (camera or screen), if any
    pub fn video_track(&self) -> Option<&Arc<LocalTrack>> {
        self.video.as_ref()
    }

    /// True once any track is held
    pub fn has_media(&self) -> bool {
        self.audio.is_some() || self.video.is_some()
    }

    /// Snapshot of the media flags
    pub fn state(&self) -> LocalMediaState {
        LocalMediaState {
            audio_enabled: self.audio.as_ref().map(|t| t.is_enabled()).unwrap_or(false),
            video_enabled: self.video.as_ref().map(|t| t.is_enabled()).unwrap_or(false),
            screen_sharing: self.screen_sharing,
        }
    }

    /// Flip the microphone mute flag, returning the new state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaDeviceUnavailable`] when no audio track is held.
    pub fn toggle_audio(&mut self) -> Result<bool> {
        let track = self
            .audio
            .as_ref()
            .ok_or_else(|| Error::MediaDeviceUnavailable("no audio track acquired".to_string()))?;
        let enabled = track.toggle();
        debug!(enabled, "Audio toggled");
        Ok(enabled)
    }

    /// Flip the video mute flag, returning the new state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MediaDeviceUnavailable`] when no video track is held.
    pub fn toggle_video(&mut self) -> Result<bool> {
        let track = self
            .video
            .as_ref()
            .ok_or_else(|| Error::MediaDeviceUnavailable("no video track acquired".to_string()))?;
        let enabled = track.toggle();
        debug!(enabled, "Video toggled");
        Ok(enabled)
    }

    /// Acquire a screen track and substitute it for the current video track
    /// on every given transport.
    ///
    /// Swap order: transports receive the new track first, the local
    /// reference moves second, the old track stops last. An acquisition
    /// failure leaves everything as it was.
    ///
    /// Returns the screen track so callers can watch for its end.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::ScreenShareDenied`] from the capture provider.
    pub async fn start_screen_share(
        &mut self,
        transports: &[Arc<dyn PeerTransport>],
    ) -> Result<Arc<LocalTrack>> {
        if self.screen_sharing {
            if let Some(screen) = &self.video {
                debug!("Screen share already active");
                return Ok(Arc::clone(screen));
            }
        }

        let screen = self.source.acquire_display_media().await?;
        self.swap_video(Arc::clone(&screen), transports).await;

        self.screen_sharing = true;
        info!(track_id = %screen.id(), "Screen share started");
        Ok(screen)
    }

    /// End the screen share and swap a camera track back in.
    ///
    /// A camera is re-acquired only when one was swapped out at share start;
    /// otherwise the video slot just empties. Calling this while not sharing
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates the capture provider's error when camera re-acquisition
    /// fails; the screen track keeps streaming in that case.
    pub async fn stop_screen_share(
        &mut self,
        transports: &[Arc<dyn PeerTransport>],
    ) -> Result<()> {
        if !self.screen_sharing {
            debug!("Screen share not active, nothing to stop");
            return Ok(());
        }

        if self.camera_before_share {
            let tracks = self
                .source
                .acquire_user_media(MediaConstraints::video_only())
                .await?;
            let camera = tracks
                .into_iter()
                .find(|t| t.kind() == TrackKind::Video)
                .ok_or_else(|| {
                    Error::MediaDeviceUnavailable(
                        "capture provider returned no video track".to_string(),
                    )
                })?;
            self.swap_video(camera, transports).await;
        } else if let Some(screen) = self.video.take() {
            screen.stop();
        }

        self.screen_sharing = false;
        info!("Screen share stopped");
        Ok(())
    }

    /// Install `track` as the video slot: transports first, local reference
    /// second, old track stopped last.
    async fn swap_video(&mut self, track: Arc<LocalTrack>, transports: &[Arc<dyn PeerTransport>]) {
        for transport in transports {
            if let Err(e) = transport.replace_video_track(Arc::clone(&track)).await {
                warn!(
                    peer_id = %transport.peer_id(),
                    "Failed to swap video track: {}",
                    e
                );
            }
        }

        let old = self.video.replace(track);
        self.camera_before_share = old
            .as_ref()
            .map(|t| t.source() == TrackSource::Camera)
            .unwrap_or(false);
        if let Some(old) = old {
            old.stop();
        }
    }

    /// Stop every held track and clear the slots
    pub fn stop_all(&mut self) {
        if let Some(audio) = self.audio.take() {
            audio.stop();
        }
        if let Some(video) = self.video.take() {
            video.stop();
        }
        self.screen_sharing = false;
        self.camera_before_share = false;
        debug!("All local tracks stopped");
    }
}
