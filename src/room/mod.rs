//! Room participant registry

pub mod roster;

pub use roster::{diff, Participant, Roster, RosterDiff};
