//! Local media track handles
//!
//! A [`LocalTrack`] wraps the transport-level sample track with the
//! lifecycle state the session cares about: an `enabled` flag (mute without
//! renegotiation), a `stopped` latch, and ended-hooks that fire exactly once
//! when the track stops. Sample writers run outside the session dispatch
//! loop, so the flags are atomics.

use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Microphone or other audio
    Audio,
    /// Camera or screen video
    Video,
}

impl TrackKind {
    /// Lowercase name for logging and track IDs
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

/// What produces a track's frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    /// Microphone capture
    Microphone,
    /// Camera capture
    Camera,
    /// Display capture
    Screen,
}

impl TrackSource {
    /// Lowercase name for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackSource::Microphone => "microphone",
            TrackSource::Camera => "camera",
            TrackSource::Screen => "screen",
        }
    }
}

type EndedHook = Box<dyn Fn() + Send + Sync>;

/// A local audio or video track
pub struct LocalTrack {
    /// Unique track ID
    id: String,

    /// Stream the track belongs to (groups audio+video from one acquire)
    stream_id: String,

    kind: TrackKind,
    source: TrackSource,

    /// Mute flag. Disabled tracks suppress samples; the RTP sender stays
    /// attached, so flipping this never renegotiates.
    enabled: AtomicBool,

    /// Set once by `stop()`; a stopped track never writes again
    stopped: AtomicBool,

    /// Samples actually written (suppressed writes do not count)
    frames_written: AtomicU64,

    /// Hooks fired exactly once when the track stops
    ended_hooks: parking_lot::Mutex<Vec<EndedHook>>,

    /// Underlying WebRTC track
    rtp_track: Arc<TrackLocalStaticSample>,
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("enabled", &self.enabled)
            .field("stopped", &self.stopped)
            .field("frames_written", &self.frames_written)
            .finish_non_exhaustive()
    }
}

impl LocalTrack {
    /// Create an Opus audio track
    pub fn audio(source: TrackSource, stream_id: impl Into<String>) -> Self {
        let stream_id = stream_id.into();
        let id = format!("audio-{}", uuid::Uuid::new_v4());
        let rtp_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            id.clone(),
            stream_id.clone(),
        ));

        Self::new(id, stream_id, TrackKind::Audio, source, rtp_track)
    }

    /// Create a VP8 video track
    pub fn video(source: TrackSource, stream_id: impl Into<String>) -> Self {
        let stream_id = stream_id.into();
        let id = format!("video-{}", uuid::Uuid::new_v4());
        let rtp_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                clock_rate: 90000,
                ..Default::default()
            },
            id.clone(),
            stream_id.clone(),
        ));

        Self::new(id, stream_id, TrackKind::Video, source, rtp_track)
    }

    fn new(
        id: String,
        stream_id: String,
        kind: TrackKind,
        source: TrackSource,
        rtp_track: Arc<TrackLocalStaticSample>,
    ) -> Self {
        Self {
            id,
            stream_id,
            kind,
            source,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            frames_written: AtomicU64::new(0),
            ended_hooks: parking_lot::Mutex::new(Vec::new()),
            rtp_track,
        }
    }

    /// Unique track ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stream the track belongs to
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Media kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Frame producer
    pub fn source(&self) -> TrackSource {
        self.source
    }

    /// Whether samples currently pass through
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Set the mute flag; no renegotiation happens
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Flip the mute flag, returning the new state
    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::SeqCst)
    }

    /// Whether the track has not been stopped
    pub fn is_live(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Samples written so far
    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::SeqCst)
    }

    /// Register a hook fired when the track stops.
    ///
    /// Hooks registered after the track already stopped never fire,
    /// matching the ended-event contract of platform tracks.
    pub fn on_ended(&self, hook: impl Fn() + Send + Sync + 'static) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        self.ended_hooks.lock().push(Box::new(hook));
    }

    /// Stop the track permanently and fire ended-hooks.
    ///
    /// Idempotent: the second call changes nothing and fires nothing.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let hooks = std::mem::take(&mut *self.ended_hooks.lock());
        for hook in &hooks {
            hook();
        }
    }

    /// Write one media sample.
    ///
    /// Stopped or disabled tracks swallow the sample and return `Ok`, so
    /// feeders need no mute logic of their own.
    pub async fn write_sample(&self, sample: &Sample) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) || !self.enabled.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.rtp_track
            .write_sample(sample)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to write sample: {}", e)))?;
        self.frames_written.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    /// Underlying WebRTC track, for attaching to a peer connection
    pub fn rtp_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.rtp_track)
    }
}
