//! Local media capture and track lifecycle

pub mod capture;
pub mod controller;
pub mod track;

pub use capture::{CaptureSource, MediaConstraints, SyntheticCapture};
pub use controller::{LocalMediaState, MediaController};
pub use track::{LocalTrack, TrackKind, TrackSource};
