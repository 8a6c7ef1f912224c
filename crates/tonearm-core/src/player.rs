//! Playback unit
//!
//! Owns the single installed buffer and the clock reference, and implements
//! the play/pause/stop/seek primitives. Every operation on an empty unit is
//! a silent no-op: having nothing loaded is the normal idle state.

use std::sync::Arc;

use thiserror::Error;

use crate::clock::Clock;
use crate::decoder::DecodedBuffer;
use crate::output::{ AudioSink, VIS_BARS };


/// Volume applied before anything is configured.
pub const DEFAULT_VOLUME: f32 = 0.5;


/// Errors that can occur during playback control.
#[derive( Debug, Clone, Copy, PartialEq, Error )]
pub enum PlaybackError {
    #[error( "Invalid seek target: {0}" )]
    InvalidSeekTarget( f64 ),
}


/// Current state of the playback unit.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum UnitState {
    /// No buffer installed.
    Empty,
    /// Buffer installed, never started.
    Loaded,
    Playing,
    Paused,
    /// Buffer installed, output halted and rewound.
    Stopped,
}


/// The playback unit.
pub struct Player {
    state: UnitState,
    buffer: Option<Arc<DecodedBuffer>>,
    sink: Box<dyn AudioSink>,
    clock: Box<dyn Clock>,
    /// Position carried across pause/resume
    offset: f64,
    /// Clock reading when output last started
    start_clock: f64,
    current_time: f64,
    duration: f64,
    /// Volume level (0.0 to 1.0), persisted across installs
    volume: f32,
}


impl Player {
    /// Creates an empty unit writing to `sink` and timed by `clock`.
    pub fn new( sink: Box<dyn AudioSink>, clock: Box<dyn Clock> ) -> Self {
        let mut player = Self {
            state: UnitState::Empty,
            buffer: None,
            sink,
            clock,
            offset: 0.0,
            start_clock: 0.0,
            current_time: 0.0,
            duration: 0.0,
            volume: DEFAULT_VOLUME,
        };
        player.sink.set_volume( player.volume );
        player
    }


    /// Installs a freshly decoded buffer, replacing any previous one.
    pub fn install( &mut self, buffer: DecodedBuffer ) {
        if self.state == UnitState::Playing {
            self.stop();
        }

        let buffer = Arc::new( buffer );
        self.duration = buffer.duration();
        self.offset = 0.0;
        self.current_time = 0.0;
        self.start_clock = self.clock.now();

        self.sink.load( Arc::clone( &buffer ) );
        self.sink.set_volume( self.volume );
        self.buffer = Some( buffer );
        self.state = UnitState::Loaded;

        tracing::debug!( "Installed buffer ({:.2}s)", self.duration );
    }


    /// Starts output from the current offset.
    ///
    /// Returns true if output actually started.
    pub fn play( &mut self ) -> bool {
        match self.state {
            UnitState::Empty | UnitState::Playing => false,
            UnitState::Loaded | UnitState::Paused | UnitState::Stopped => {
                self.start_clock = self.clock.now();
                self.sink.start( self.offset );
                self.state = UnitState::Playing;
                tracing::info!( "Playing from {:.2}s", self.offset );
                true
            }
        }
    }


    /// Freezes the position and halts output.
    pub fn pause( &mut self ) {
        if self.state != UnitState::Playing {
            return;
        }

        self.current_time = self.elapsed();
        self.offset = self.current_time;
        self.sink.halt();
        self.state = UnitState::Paused;
        tracing::info!( "Paused at {:.2}s", self.offset );
    }


    /// Halts output and rewinds to the start, keeping the buffer.
    pub fn stop( &mut self ) {
        if self.state == UnitState::Empty {
            return;
        }

        self.sink.halt();
        self.offset = 0.0;
        self.current_time = 0.0;
        self.state = UnitState::Stopped;
        tracing::info!( "Stopped" );
    }


    /// Moves the position to `target` seconds, clamped to the track.
    pub fn seek( &mut self, target: f64 ) -> Result<(), PlaybackError> {
        if !target.is_finite() {
            return Err( PlaybackError::InvalidSeekTarget( target ) );
        }
        if self.state == UnitState::Empty {
            return Ok(());
        }

        let position = target.clamp( 0.0, self.duration );

        if self.state == UnitState::Playing {
            self.sink.halt();
            self.offset = position;
            self.current_time = position;
            self.start_clock = self.clock.now();
            self.sink.start( position );
        } else {
            self.offset = position;
            self.current_time = position;
        }

        tracing::debug!( "Seeked to {:.2}s", position );
        Ok(())
    }


    /// Sets the volume, clamped to [0, 1]. Returns the applied level.
    pub fn set_volume( &mut self, volume: f32 ) -> f32 {
        if volume.is_nan() {
            return self.volume;
        }

        self.volume = volume.clamp( 0.0, 1.0 );
        self.sink.set_volume( self.volume );
        self.volume
    }


    /// Releases the buffer after the track has played out.
    pub fn finish( &mut self ) {
        if self.state == UnitState::Empty {
            return;
        }

        self.sink.halt();
        self.sink.unload();
        self.buffer = None;
        self.offset = 0.0;
        self.current_time = 0.0;
        self.duration = 0.0;
        self.state = UnitState::Empty;
        tracing::info!( "Track ended" );
    }


    /// Clears the displayed position without touching output.
    pub fn rewind_display( &mut self ) {
        self.offset = 0.0;
        self.current_time = 0.0;
    }


    /// Elapsed time reconstructed from the clock while playing, or the
    /// frozen position otherwise. Always within [0, duration].
    pub fn elapsed( &self ) -> f64 {
        if self.state == UnitState::Playing {
            ( self.clock.now() - self.start_clock + self.offset ).clamp( 0.0, self.duration )
        } else {
            self.current_time
        }
    }


    /// Records a newly computed position.
    pub fn publish_time( &mut self, time: f64 ) {
        self.current_time = time.clamp( 0.0, self.duration );
    }


    pub fn state( &self ) -> UnitState {
        self.state
    }


    pub fn is_playing( &self ) -> bool {
        self.state == UnitState::Playing
    }


    pub fn has_buffer( &self ) -> bool {
        self.buffer.is_some()
    }


    pub fn current_time( &self ) -> f64 {
        self.current_time
    }


    pub fn duration( &self ) -> f64 {
        self.duration
    }


    pub fn offset( &self ) -> f64 {
        self.offset
    }


    pub fn volume( &self ) -> f32 {
        self.volume
    }


    /// Raw spectrum sample of the rendered output.
    pub fn spectrum( &self ) -> [f32; VIS_BARS] {
        self.sink.spectrum()
    }
}


#[cfg( test )]
mod tests {
    use std::sync::{ Arc, Mutex };

    use super::*;
    use crate::clock::ManualClock;


    /// What a sink was told to do, in order.
    #[derive( Debug, Clone, PartialEq )]
    enum SinkCall {
        Load( f64 ),
        Start( f64 ),
        Halt,
        Unload,
        Volume( f32 ),
    }


    /// Sink that records its calls for inspection.
    #[derive( Clone, Default )]
    struct RecordingSink {
        calls: Arc<Mutex<Vec<SinkCall>>>,
    }


    impl RecordingSink {
        fn take( &self ) -> Vec<SinkCall> {
            std::mem::take( &mut *self.calls.lock().unwrap() )
        }
    }


    impl AudioSink for RecordingSink {
        fn load( &mut self, buffer: Arc<DecodedBuffer> ) {
            self.calls.lock().unwrap().push( SinkCall::Load( buffer.duration() ) );
        }

        fn start( &mut self, offset_secs: f64 ) {
            self.calls.lock().unwrap().push( SinkCall::Start( offset_secs ) );
        }

        fn halt( &mut self ) {
            self.calls.lock().unwrap().push( SinkCall::Halt );
        }

        fn unload( &mut self ) {
            self.calls.lock().unwrap().push( SinkCall::Unload );
        }

        fn set_volume( &mut self, volume: f32 ) {
            self.calls.lock().unwrap().push( SinkCall::Volume( volume ) );
        }

        fn spectrum( &self ) -> [f32; VIS_BARS] {
            [0.25; VIS_BARS]
        }
    }


    fn player() -> ( Player, ManualClock, RecordingSink ) {
        let clock = ManualClock::new();
        let sink = RecordingSink::default();
        let player = Player::new( Box::new( sink.clone() ), Box::new( clock.clone() ) );
        sink.take();
        ( player, clock, sink )
    }


    #[test]
    fn test_empty_unit_ignores_everything() {
        let ( mut player, _clock, sink ) = player();

        assert!( !player.play() );
        player.pause();
        player.stop();
        player.finish();
        assert!( player.seek( 5.0 ).is_ok() );

        assert_eq!( player.state(), UnitState::Empty );
        assert_eq!( player.current_time(), 0.0 );
        assert!( sink.take().is_empty() );
    }


    #[test]
    fn test_install_resets_and_applies_volume() {
        let ( mut player, _clock, sink ) = player();
        player.set_volume( 0.8 );
        sink.take();

        player.install( DecodedBuffer::silence( 30.0, 100, 1 ) );

        assert_eq!( player.state(), UnitState::Loaded );
        assert_eq!( player.duration(), 30.0 );
        assert_eq!( player.current_time(), 0.0 );
        assert_eq!( sink.take(), vec![ SinkCall::Load( 30.0 ), SinkCall::Volume( 0.8 ) ] );
    }


    #[test]
    fn test_install_while_playing_stops_first() {
        let ( mut player, clock, sink ) = player();
        player.install( DecodedBuffer::silence( 30.0, 100, 1 ) );
        player.play();
        clock.advance( 4.0 );
        sink.take();

        player.install( DecodedBuffer::silence( 10.0, 100, 1 ) );

        let calls = sink.take();
        assert_eq!( calls[ 0 ], SinkCall::Halt );
        assert_eq!( player.state(), UnitState::Loaded );
        assert_eq!( player.duration(), 10.0 );
        assert_eq!( player.elapsed(), 0.0 );
    }


    #[test]
    fn test_play_twice_is_noop() {
        let ( mut player, _clock, sink ) = player();
        player.install( DecodedBuffer::silence( 5.0, 100, 1 ) );
        sink.take();

        assert!( player.play() );
        assert!( !player.play() );
        assert_eq!( sink.take(), vec![ SinkCall::Start( 0.0 ) ] );
    }


    #[test]
    fn test_elapsed_follows_clock() {
        let ( mut player, clock, _sink ) = player();
        clock.set( 100.0 );
        player.install( DecodedBuffer::silence( 30.0, 100, 1 ) );
        player.play();

        clock.advance( 7.5 );
        assert_eq!( player.elapsed(), 7.5 );

        clock.advance( 60.0 );
        assert_eq!( player.elapsed(), 30.0 );
    }


    #[test]
    fn test_pause_resume_keeps_position() {
        let ( mut player, clock, sink ) = player();
        player.install( DecodedBuffer::silence( 30.0, 100, 1 ) );
        player.play();
        clock.advance( 12.0 );

        player.pause();
        assert_eq!( player.offset(), 12.0 );
        assert_eq!( player.current_time(), 12.0 );

        clock.advance( 100.0 );
        assert_eq!( player.elapsed(), 12.0 );

        sink.take();
        player.play();
        assert_eq!( sink.take(), vec![ SinkCall::Start( 12.0 ) ] );

        clock.advance( 3.0 );
        assert_eq!( player.elapsed(), 15.0 );
    }


    #[test]
    fn test_stop_rewinds() {
        let ( mut player, clock, _sink ) = player();
        player.install( DecodedBuffer::silence( 30.0, 100, 1 ) );
        player.play();
        clock.advance( 5.0 );

        player.stop();
        assert_eq!( player.state(), UnitState::Stopped );
        assert_eq!( player.elapsed(), 0.0 );

        assert!( player.play() );
        clock.advance( 1.0 );
        assert_eq!( player.elapsed(), 1.0 );
    }


    #[test]
    fn test_seek_clamps() {
        let ( mut player, _clock, _sink ) = player();
        player.install( DecodedBuffer::silence( 20.0, 100, 1 ) );

        player.seek( 45.0 ).unwrap();
        assert_eq!( player.current_time(), 20.0 );

        player.seek( -3.0 ).unwrap();
        assert_eq!( player.current_time(), 0.0 );
        assert_eq!( player.offset(), 0.0 );
    }


    #[test]
    fn test_seek_while_playing_restarts_output() {
        let ( mut player, clock, sink ) = player();
        player.install( DecodedBuffer::silence( 20.0, 100, 1 ) );
        player.play();
        clock.advance( 2.0 );
        sink.take();

        player.seek( 10.0 ).unwrap();
        assert_eq!( sink.take(), vec![ SinkCall::Halt, SinkCall::Start( 10.0 ) ] );
        assert_eq!( player.elapsed(), 10.0 );

        clock.advance( 1.5 );
        assert_eq!( player.elapsed(), 11.5 );
    }


    #[test]
    fn test_seek_while_paused_does_not_start() {
        let ( mut player, _clock, sink ) = player();
        player.install( DecodedBuffer::silence( 20.0, 100, 1 ) );
        player.play();
        player.pause();
        sink.take();

        player.seek( 8.0 ).unwrap();
        assert!( sink.take().is_empty() );
        assert_eq!( player.state(), UnitState::Paused );
        assert_eq!( player.current_time(), 8.0 );
    }


    #[test]
    fn test_seek_rejects_non_finite() {
        let ( mut player, _clock, _sink ) = player();
        player.install( DecodedBuffer::silence( 20.0, 100, 1 ) );

        assert!( player.seek( f64::NAN ).is_err() );
        assert_eq!(
            player.seek( f64::INFINITY ),
            Err( PlaybackError::InvalidSeekTarget( f64::INFINITY ) )
        );
    }


    #[test]
    fn test_volume_clamps() {
        let ( mut player, _clock, _sink ) = player();
        assert_eq!( player.volume(), DEFAULT_VOLUME );
        assert_eq!( player.set_volume( 1.4 ), 1.0 );
        assert_eq!( player.set_volume( -0.2 ), 0.0 );
        assert_eq!( player.set_volume( f32::NAN ), 0.0 );
    }


    #[test]
    fn test_finish_releases_buffer() {
        let ( mut player, _clock, sink ) = player();
        player.install( DecodedBuffer::silence( 3.0, 100, 1 ) );
        player.play();
        sink.take();

        player.finish();
        assert_eq!( sink.take(), vec![ SinkCall::Halt, SinkCall::Unload ] );
        assert_eq!( player.state(), UnitState::Empty );
        assert!( !player.has_buffer() );
        assert_eq!( player.duration(), 0.0 );
        assert_eq!( player.current_time(), 0.0 );
    }


    #[test]
    fn test_spectrum_comes_from_sink() {
        let ( player, _clock, _sink ) = player();
        assert_eq!( player.spectrum(), [0.25; VIS_BARS] );
    }
}
