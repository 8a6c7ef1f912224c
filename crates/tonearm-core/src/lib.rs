//! Tonearm Core - Single-track playback controller
//!
//! This crate provides the playback state machine and progress
//! synchronization behind Tonearm: decoding, output, the playback unit,
//! playlist navigation, and the session that ties them together.

pub mod clock;
pub mod command;
pub mod decoder;
pub mod output;
pub mod player;
pub mod playlist;
pub mod progress;
pub mod resample;
pub mod session;
pub mod track;

pub use clock::{ Clock, MonotonicClock };
#[cfg( any( test, feature = "test-util" ) )]
pub use clock::ManualClock;
pub use command::{ Command, CommandError };
pub use decoder::{ DecodeError, DecodedBuffer, SymphoniaDecoder, TrackDecoder };
pub use output::{ AudioSink, CpalSink, NullSink, VIS_BARS };
pub use player::{ PlaybackError, Player, UnitState };
pub use playlist::{ Playlist, PlaylistError, Step };
pub use progress::{ Cadence, ProgressSync, Tick };
pub use resample::{ resample, ResampleError };
pub use session::{ LoadOutcome, Session, SessionSnapshot };
pub use track::{ ByteSource, Track, TrackSource };
