//! Playback session
//!
//! The aggregate root the UI talks to. It resolves tracks through the
//! playlist, decodes them on the runtime, installs the result into the
//! player and keeps the published position current.
//!
//! Every state change happens on the thread that owns the session. Decodes
//! run elsewhere and come back through a channel stamped with the load token
//! they were started under; only the most recently started load may install.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{ mpsc, watch };

use crate::clock::Clock;
use crate::decoder::{ DecodeError, DecodedBuffer, TrackDecoder };
use crate::output::{ AudioSink, VIS_BARS };
use crate::player::{ PlaybackError, Player };
use crate::playlist::{ Playlist, Step };
use crate::progress::{ ProgressSync, Tick };
use crate::track::{ ByteSource, Track };


/// Observable state of the session.
#[derive( Debug, Clone, PartialEq, Default )]
pub struct SessionSnapshot {
    /// `None` when nothing is loaded.
    pub current_track: Option<Track>,
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub volume: f32,
    /// A load is in flight.
    pub loading: bool,
}


/// How a finished decode was handled.
#[derive( Debug, Clone, PartialEq )]
pub enum LoadOutcome {
    /// The track is installed and playing.
    Installed( Track ),
    /// The decode failed; state is unchanged.
    Failed( Track, DecodeError ),
    /// A newer load superseded this one; the result was dropped.
    Stale( Track ),
}


/// A decode result on its way back to the session.
struct LoadCompletion {
    token: u64,
    track: Track,
    result: Result<DecodedBuffer, DecodeError>,
}


/// The playback session.
pub struct Session {
    player: Player,
    playlist: Playlist,
    progress: ProgressSync,
    decoder: Arc<dyn TrackDecoder>,
    runtime: Handle,
    current_track: Option<Track>,
    /// Token of the most recently started load
    load_seq: u64,
    /// Token still awaiting its decode, if any
    pending: Option<u64>,
    /// Decodes spawned but not yet applied, stale ones included
    in_flight: usize,
    next_user_id: u64,
    completions_tx: mpsc::UnboundedSender<LoadCompletion>,
    completions_rx: mpsc::UnboundedReceiver<LoadCompletion>,
    state_tx: watch::Sender<SessionSnapshot>,
}


impl Session {
    /// Creates the session. Decodes are spawned on `runtime`.
    pub fn init(
        playlist: Playlist,
        sink: Box<dyn AudioSink>,
        clock: Box<dyn Clock>,
        decoder: Arc<dyn TrackDecoder>,
        runtime: Handle,
    ) -> Self {
        let ( completions_tx, completions_rx ) = mpsc::unbounded_channel();
        let player = Player::new( sink, clock );
        let ( state_tx, _ ) = watch::channel( SessionSnapshot {
            volume: player.volume(),
            ..SessionSnapshot::default()
        });

        tracing::info!( "Session started with {} catalog tracks", playlist.len() );

        Self {
            player,
            playlist,
            progress: ProgressSync::new(),
            decoder,
            runtime,
            current_track: None,
            load_seq: 0,
            pending: None,
            in_flight: 0,
            next_user_id: 1,
            completions_tx,
            completions_rx,
            state_tx,
        }
    }


    /// Shuts the session down. Decodes still in flight are discarded.
    pub fn teardown( mut self ) {
        self.progress.cancel();
        self.player.stop();
        self.player.finish();
        self.pending = None;
        self.current_track = None;
        self.publish();
        tracing::info!( "Session torn down" );
    }


    /// Starts loading `track`; it plays once decoded.
    pub fn load_track( &mut self, track: Track ) {
        if self.player.is_playing() {
            self.player.stop();
            self.progress.cancel();
        }

        self.load_seq += 1;
        let token = self.load_seq;
        self.pending = Some( token );
        self.in_flight += 1;

        tracing::info!( "Loading \"{}\" ({})", track.name(), track.source() );

        let decode = self.decoder.decode( track.source() );
        let tx = self.completions_tx.clone();
        self.runtime.spawn( async move {
            let result = decode.await;
            // The session may be gone by now
            let _ = tx.send( LoadCompletion { token, track, result } );
        });

        self.publish();
    }


    /// Loads user-supplied bytes as a transient track.
    ///
    /// @returns The track that was created for the bytes
    pub fn load_user_file( &mut self, bytes: ByteSource, display_name: &str ) -> Track {
        let track = Track::user( self.next_user_id, display_name, bytes );
        self.next_user_id += 1;

        self.playlist.set_transient( track.clone() );
        self.load_track( track.clone() );
        track
    }


    /// Loads the playlist entry at `index`. Returns false if out of range.
    pub fn load_index( &mut self, index: usize ) -> bool {
        match self.playlist.get( index ).cloned() {
            Some( track ) => {
                self.player.rewind_display();
                self.load_track( track );
                true
            }
            None => false,
        }
    }


    /// Applies every decode that has finished so far, then advances the
    /// position. Call once per display refresh.
    pub fn tick( &mut self ) {
        while let Ok( completion ) = self.completions_rx.try_recv() {
            self.complete_load( completion );
        }

        match self.progress.tick( &mut self.player ) {
            Tick::Idle => return,
            Tick::Finished => self.end_of_track(),
            Tick::Progress( _ ) | Tick::Cancelled => {}
        }
        self.publish();
    }


    /// Waits for the next decode to come back and applies it. Returns
    /// `None` right away when no decode is outstanding.
    pub async fn wait_for_load( &mut self ) -> Option<LoadOutcome> {
        if self.in_flight == 0 {
            return None;
        }
        let completion = self.completions_rx.recv().await?;
        Some( self.complete_load( completion ) )
    }


    fn complete_load( &mut self, completion: LoadCompletion ) -> LoadOutcome {
        let LoadCompletion { token, track, result } = completion;
        self.in_flight = self.in_flight.saturating_sub( 1 );

        if token != self.load_seq {
            tracing::debug!( "Discarding stale load of \"{}\" (token {}, current {})", track.name(), token, self.load_seq );
            return LoadOutcome::Stale( track );
        }
        self.pending = None;

        let outcome = match result {
            Ok( buffer ) => {
                self.progress.cancel();
                self.player.install( buffer );
                self.current_track = Some( track.clone() );
                if self.player.play() {
                    self.progress.arm();
                }
                tracing::info!( "Now playing \"{}\" ({:.2}s)", track.name(), self.player.duration() );
                LoadOutcome::Installed( track )
            }
            Err( e ) => {
                tracing::error!( "Failed to load \"{}\": {}", track.name(), e );
                LoadOutcome::Failed( track, e )
            }
        };

        self.publish();
        outcome
    }


    fn end_of_track( &mut self ) {
        self.progress.cancel();
        self.player.finish();
        if let Some( track ) = self.current_track.take() {
            tracing::info!( "Finished \"{}\"", track.name() );
        }
    }


    /// Starts or resumes output.
    pub fn play( &mut self ) {
        if self.player.play() {
            self.progress.arm();
            self.publish();
        }
    }


    /// Pauses output, freezing the position.
    pub fn pause( &mut self ) {
        if self.player.is_playing() {
            self.player.pause();
            self.progress.cancel();
            self.publish();
        }
    }


    pub fn toggle_play( &mut self ) {
        if self.player.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }


    /// Halts output and rewinds the current track.
    pub fn stop( &mut self ) {
        self.player.stop();
        self.progress.cancel();
        self.publish();
    }


    /// Moves to `seconds`, clamped to the track. Non-finite targets are
    /// rejected.
    pub fn seek( &mut self, seconds: f64 ) -> Result<(), PlaybackError> {
        self.player.seek( seconds )?;
        self.publish();
        Ok(())
    }


    /// Sets the volume, clamped to [0, 1].
    pub fn set_volume( &mut self, level: f32 ) {
        self.player.set_volume( level );
        self.publish();
    }


    /// Loads the next playlist track, wrapping around.
    pub fn next( &mut self ) {
        self.step( Step::Next );
    }


    /// Loads the previous playlist track, wrapping around.
    pub fn prev( &mut self ) {
        self.step( Step::Prev );
    }


    fn step( &mut self, step: Step ) {
        let Some( track ) = self.playlist.neighbor( self.current_track.as_ref(), step ).cloned() else {
            tracing::debug!( "Playlist is empty, nothing to step to" );
            return;
        };

        // Show 0 while the new track decodes
        self.player.rewind_display();
        self.load_track( track );
    }


    fn publish( &self ) {
        self.state_tx.send_replace( self.snapshot() );
    }


    /// Current observable state.
    pub fn snapshot( &self ) -> SessionSnapshot {
        SessionSnapshot {
            current_track: self.current_track.clone(),
            is_playing: self.player.is_playing(),
            current_time: self.player.current_time(),
            duration: self.player.duration(),
            volume: self.player.volume(),
            loading: self.pending.is_some(),
        }
    }


    /// Receives a fresh snapshot after every state change.
    pub fn subscribe( &self ) -> watch::Receiver<SessionSnapshot> {
        self.state_tx.subscribe()
    }


    pub fn current_track( &self ) -> Option<&Track> {
        self.current_track.as_ref()
    }


    pub fn is_playing( &self ) -> bool {
        self.player.is_playing()
    }


    pub fn is_loading( &self ) -> bool {
        self.pending.is_some()
    }


    pub fn current_time( &self ) -> f64 {
        self.player.current_time()
    }


    pub fn duration( &self ) -> f64 {
        self.player.duration()
    }


    pub fn volume( &self ) -> f32 {
        self.player.volume()
    }


    /// Raw spectrum sample of what is being output.
    pub fn spectrum( &self ) -> [f32; VIS_BARS] {
        self.player.spectrum()
    }


    pub fn playlist( &self ) -> &Playlist {
        &self.playlist
    }


    pub fn playlist_mut( &mut self ) -> &mut Playlist {
        &mut self.playlist
    }
}


#[cfg( test )]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use tokio::sync::oneshot;

    use super::*;
    use crate::clock::ManualClock;
    use crate::decoder::tests::wav_bytes;
    use crate::decoder::{ DecodeFuture, SymphoniaDecoder };
    use crate::output::NullSink;
    use crate::track::TrackSource;


    /// Decoder answering from a table of durations, optionally holding each
    /// answer until the test releases it.
    #[derive( Default )]
    struct ScriptedDecoder {
        durations: HashMap<String, f64>,
        gated: bool,
        gates: Mutex<HashMap<String, oneshot::Sender<()>>>,
    }


    impl ScriptedDecoder {
        fn new( entries: &[( &str, f64 )] ) -> Self {
            Self {
                durations: entries.iter().map( |( k, d )| ( k.to_string(), *d ) ).collect(),
                ..Self::default()
            }
        }


        fn gated( mut self ) -> Self {
            self.gated = true;
            self
        }


        fn release( &self, key: &str ) {
            if let Some( gate ) = self.gates.lock().unwrap().remove( key ) {
                let _ = gate.send(());
            }
        }
    }


    impl TrackDecoder for ScriptedDecoder {
        fn decode( &self, source: &TrackSource ) -> DecodeFuture {
            let key = source.to_string();
            let result = match self.durations.get( &key ) {
                Some( duration ) => Ok( DecodedBuffer::silence( *duration, 100, 1 ) ),
                None => Err( DecodeError::NotFound( key.clone() ) ),
            };

            if self.gated {
                let ( tx, rx ) = oneshot::channel();
                self.gates.lock().unwrap().insert( key, tx );
                Box::pin( async move {
                    let _ = rx.await;
                    result
                })
            } else {
                Box::pin( async move { result } )
            }
        }
    }


    fn catalog() -> Playlist {
        Playlist::from_tracks( [ "s1", "s2", "s3" ].map( Track::from_path ) )
    }


    fn scripted() -> ScriptedDecoder {
        ScriptedDecoder::new( &[ ( "s1", 30.0 ), ( "s2", 45.0 ), ( "s3", 20.0 ) ] )
    }


    fn session_with( decoder: Arc<dyn TrackDecoder> ) -> ( Session, ManualClock ) {
        let clock = ManualClock::new();
        let session = Session::init(
            catalog(),
            Box::new( NullSink ),
            Box::new( clock.clone() ),
            decoder,
            Handle::current(),
        );
        ( session, clock )
    }


    fn name_of( session: &Session ) -> Option<String> {
        session.current_track().map( |t| t.name().to_string() )
    }


    #[tokio::test]
    async fn test_initial_state() {
        let ( session, _clock ) = session_with( Arc::new( scripted() ) );
        let snapshot = session.snapshot();

        assert!( snapshot.current_track.is_none() );
        assert!( !snapshot.is_playing );
        assert_eq!( snapshot.current_time, 0.0 );
        assert_eq!( snapshot.duration, 0.0 );
        assert_eq!( snapshot.volume, 0.5 );
    }


    #[tokio::test]
    async fn test_load_installs_and_plays() {
        let ( mut session, _clock ) = session_with( Arc::new( scripted() ) );
        session.load_track( Track::from_path( "s2" ) );
        assert!( session.is_loading() );

        let outcome = session.wait_for_load().await.unwrap();
        assert_eq!( outcome, LoadOutcome::Installed( Track::from_path( "s2" ) ) );
        assert!( !session.is_loading() );
        assert!( session.is_playing() );
        assert_eq!( session.duration(), 45.0 );
        assert_eq!( session.current_time(), 0.0 );
    }


    #[tokio::test]
    async fn test_full_scenario() {
        let ( mut session, clock ) = session_with( Arc::new( scripted() ) );

        session.load_track( Track::from_path( "s1" ) );
        session.wait_for_load().await;
        session.play();

        clock.advance( 10.0 );
        session.tick();
        assert!( ( session.current_time() - 10.0 ).abs() < 1e-9 );

        session.pause();
        clock.advance( 4.0 );
        session.tick();
        assert!( ( session.current_time() - 10.0 ).abs() < 1e-9 );
        assert!( !session.is_playing() );

        session.play();
        clock.advance( 15.0 );
        session.tick();
        assert!( ( session.current_time() - 25.0 ).abs() < 1e-9 );

        clock.advance( 5.0 );
        session.tick();
        assert!( session.current_track().is_none() );
        assert_eq!( session.current_time(), 0.0 );
        assert_eq!( session.duration(), 0.0 );
        assert!( !session.is_playing() );
    }


    #[tokio::test]
    async fn test_position_never_decreases_while_playing() {
        let ( mut session, clock ) = session_with( Arc::new( scripted() ) );
        session.load_track( Track::from_path( "s3" ) );
        session.wait_for_load().await;

        let mut last = 0.0;
        for _ in 0..40 {
            clock.advance( 0.37 );
            session.tick();
            if session.current_track().is_none() {
                break;
            }
            assert!( session.current_time() >= last );
            assert!( session.current_time() <= session.duration() );
            last = session.current_time();
        }
    }


    #[tokio::test]
    async fn test_seek_clamps_and_reads_back() {
        let ( mut session, _clock ) = session_with( Arc::new( scripted() ) );
        session.load_track( Track::from_path( "s3" ) );
        session.wait_for_load().await;

        session.seek( 99.0 ).unwrap();
        assert_eq!( session.current_time(), 20.0 );

        session.seek( -5.0 ).unwrap();
        assert_eq!( session.current_time(), 0.0 );

        assert!( matches!( session.seek( f64::NAN ), Err( PlaybackError::InvalidSeekTarget( _ ) ) ) );
        assert_eq!( session.current_time(), 0.0 );
    }


    #[tokio::test]
    async fn test_seek_while_playing_continues_from_target() {
        let ( mut session, clock ) = session_with( Arc::new( scripted() ) );
        session.load_track( Track::from_path( "s2" ) );
        session.wait_for_load().await;

        clock.advance( 5.0 );
        session.tick();
        session.seek( 30.0 ).unwrap();
        assert_eq!( session.current_time(), 30.0 );

        clock.advance( 2.0 );
        session.tick();
        assert!( ( session.current_time() - 32.0 ).abs() < 1e-9 );
    }


    #[tokio::test]
    async fn test_volume_clamps() {
        let ( mut session, _clock ) = session_with( Arc::new( scripted() ) );
        let mut state = session.subscribe();

        session.set_volume( 1.4 );
        assert_eq!( session.volume(), 1.0 );
        assert_eq!( state.borrow_and_update().volume, 1.0 );

        session.set_volume( -0.2 );
        assert_eq!( session.volume(), 0.0 );
    }


    #[tokio::test]
    async fn test_volume_persists_across_loads() {
        let ( mut session, _clock ) = session_with( Arc::new( scripted() ) );
        session.set_volume( 0.8 );
        session.load_track( Track::from_path( "s1" ) );
        session.wait_for_load().await;
        assert_eq!( session.volume(), 0.8 );
    }


    #[tokio::test]
    async fn test_next_cycles_through_playlist() {
        let ( mut session, _clock ) = session_with( Arc::new( scripted() ) );

        session.next();
        session.wait_for_load().await;
        assert_eq!( name_of( &session ).as_deref(), Some( "s1" ) );

        for _ in 0..3 {
            session.next();
            session.wait_for_load().await;
        }
        assert_eq!( name_of( &session ).as_deref(), Some( "s1" ) );
    }


    #[tokio::test]
    async fn test_prev_wraps_to_last() {
        let ( mut session, _clock ) = session_with( Arc::new( scripted() ) );
        session.load_index( 0 );
        session.wait_for_load().await;

        session.prev();
        session.wait_for_load().await;
        assert_eq!( name_of( &session ).as_deref(), Some( "s3" ) );
        assert_eq!( session.duration(), 20.0 );
    }


    #[tokio::test]
    async fn test_next_resets_position_before_decode() {
        let decoder = Arc::new( scripted().gated() );
        let ( mut session, clock ) = session_with( decoder.clone() );

        session.load_index( 0 );
        decoder.release( "s1" );
        session.wait_for_load().await;
        clock.advance( 12.0 );
        session.pause();
        assert_eq!( session.current_time(), 12.0 );

        session.next();
        assert_eq!( session.current_time(), 0.0 );
        assert!( session.is_loading() );
        // Still showing the old track until the new one is installed
        assert_eq!( name_of( &session ).as_deref(), Some( "s1" ) );

        decoder.release( "s2" );
        session.wait_for_load().await;
        assert_eq!( name_of( &session ).as_deref(), Some( "s2" ) );
        assert_eq!( session.current_time(), 0.0 );
    }


    #[tokio::test]
    async fn test_later_load_wins_when_it_finishes_first() {
        let decoder = Arc::new( scripted().gated() );
        let ( mut session, _clock ) = session_with( decoder.clone() );

        session.load_track( Track::from_path( "s1" ) );
        session.load_track( Track::from_path( "s2" ) );

        decoder.release( "s2" );
        let first = session.wait_for_load().await.unwrap();
        assert_eq!( first, LoadOutcome::Installed( Track::from_path( "s2" ) ) );

        decoder.release( "s1" );
        let second = session.wait_for_load().await.unwrap();
        assert_eq!( second, LoadOutcome::Stale( Track::from_path( "s1" ) ) );

        assert_eq!( name_of( &session ).as_deref(), Some( "s2" ) );
        assert_eq!( session.duration(), 45.0 );
    }


    #[tokio::test]
    async fn test_later_load_wins_when_it_finishes_last() {
        let decoder = Arc::new( scripted().gated() );
        let ( mut session, _clock ) = session_with( decoder.clone() );

        session.load_track( Track::from_path( "s1" ) );
        session.load_track( Track::from_path( "s2" ) );

        decoder.release( "s1" );
        let first = session.wait_for_load().await.unwrap();
        assert!( matches!( first, LoadOutcome::Stale( _ ) ) );
        assert!( session.current_track().is_none() );
        assert!( session.is_loading() );

        decoder.release( "s2" );
        session.wait_for_load().await;
        assert_eq!( name_of( &session ).as_deref(), Some( "s2" ) );
    }


    #[tokio::test]
    async fn test_failed_load_keeps_prior_state() {
        let ( mut session, _clock ) = session_with( Arc::new( scripted() ) );
        session.load_track( Track::from_path( "s1" ) );
        session.wait_for_load().await;

        session.load_track( Track::from_path( "missing" ) );
        let outcome = session.wait_for_load().await.unwrap();
        assert!( matches!( outcome, LoadOutcome::Failed( _, DecodeError::NotFound( _ ) ) ) );

        assert_eq!( name_of( &session ).as_deref(), Some( "s1" ) );
        assert!( !session.is_loading() );
        assert!( !session.is_playing() );
        assert_eq!( session.duration(), 30.0 );
    }


    #[tokio::test]
    async fn test_stale_failure_is_not_reported() {
        let decoder = Arc::new( scripted().gated() );
        let ( mut session, _clock ) = session_with( decoder.clone() );

        session.load_track( Track::from_path( "missing" ) );
        session.load_track( Track::from_path( "s2" ) );

        decoder.release( "missing" );
        let first = session.wait_for_load().await.unwrap();
        assert_eq!( first, LoadOutcome::Stale( Track::from_path( "missing" ) ) );
        assert!( session.is_loading() );
        assert!( session.current_track().is_none() );

        decoder.release( "s2" );
        let second = session.wait_for_load().await.unwrap();
        assert_eq!( second, LoadOutcome::Installed( Track::from_path( "s2" ) ) );
        assert!( !session.is_loading() );
    }


    #[tokio::test]
    async fn test_unreadable_user_file_keeps_prior_track() {
        let ( mut session, _clock ) = session_with( Arc::new( SymphoniaDecoder::default() ) );

        let tone = ByteSource::Memory( Arc::from( wav_bytes( 8000, 1, 8000 ) ) );
        let first = session.load_user_file( tone, "tone.wav" );
        let outcome = session.wait_for_load().await.unwrap();
        assert_eq!( outcome, LoadOutcome::Installed( first.clone() ) );
        assert!( ( session.duration() - 1.0 ).abs() < 1e-6 );

        let gone = ByteSource::File( PathBuf::from( "/definitely/not/here/gone.wav" ) );
        session.load_user_file( gone, "gone.wav" );
        let outcome = session.wait_for_load().await.unwrap();
        assert!( matches!( outcome, LoadOutcome::Failed( _, DecodeError::UnreadableInput( _ ) ) ) );

        assert_eq!( session.current_track(), Some( &first ) );
        assert!( ( session.duration() - 1.0 ).abs() < 1e-6 );
        assert!( !session.is_loading() );
    }


    #[tokio::test]
    async fn test_wait_for_load_without_decode_returns_none() {
        let ( mut session, _clock ) = session_with( Arc::new( scripted() ) );
        assert!( session.wait_for_load().await.is_none() );

        session.load_track( Track::from_path( "s1" ) );
        assert!( session.wait_for_load().await.is_some() );
        assert!( session.wait_for_load().await.is_none() );
    }


    #[tokio::test]
    async fn test_failed_first_load_leaves_session_empty() {
        let ( mut session, _clock ) = session_with( Arc::new( scripted() ) );
        session.load_track( Track::from_path( "missing" ) );
        session.wait_for_load().await;

        let snapshot = session.snapshot();
        assert!( snapshot.current_track.is_none() );
        assert_eq!( snapshot.duration, 0.0 );
        assert!( !snapshot.is_playing );
    }


    #[tokio::test]
    async fn test_user_file_is_transient() {
        let decoder = ScriptedDecoder::new( &[ ( "user:1", 12.0 ), ( "s1", 30.0 ) ] );
        let ( mut session, _clock ) = session_with( Arc::new( decoder ) );

        let bytes = ByteSource::File( PathBuf::from( "/tmp/pick.mp3" ) );
        let track = session.load_user_file( bytes, "pick.mp3" );
        session.wait_for_load().await;

        assert_eq!( session.current_track(), Some( &track ) );
        assert_eq!( session.playlist().transient(), Some( &track ) );
        assert_eq!( session.playlist().len(), 3 );

        session.next();
        session.wait_for_load().await;
        assert_eq!( name_of( &session ).as_deref(), Some( "s1" ) );
    }


    #[tokio::test]
    async fn test_commands_without_track_are_noops() {
        let ( mut session, _clock ) = session_with( Arc::new( scripted() ) );

        session.play();
        session.pause();
        session.toggle_play();
        session.stop();
        session.seek( 10.0 ).unwrap();
        session.tick();

        assert!( !session.is_playing() );
        assert_eq!( session.current_time(), 0.0 );
    }


    #[tokio::test]
    async fn test_toggle_play() {
        let ( mut session, _clock ) = session_with( Arc::new( scripted() ) );
        session.load_track( Track::from_path( "s1" ) );
        session.wait_for_load().await;

        session.toggle_play();
        assert!( !session.is_playing() );
        session.toggle_play();
        assert!( session.is_playing() );
    }


    #[tokio::test]
    async fn test_tick_applies_finished_decodes() {
        let ( mut session, _clock ) = session_with( Arc::new( scripted() ) );
        let mut state = session.subscribe();
        session.load_track( Track::from_path( "s1" ) );

        // Let the spawned decode run
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        session.tick();

        assert!( session.is_playing() );
        let snapshot = state.borrow_and_update().clone();
        assert_eq!( snapshot.current_track, Some( Track::from_path( "s1" ) ) );
        assert!( !snapshot.loading );
    }


    #[tokio::test]
    async fn test_stop_keeps_track() {
        let ( mut session, clock ) = session_with( Arc::new( scripted() ) );
        session.load_track( Track::from_path( "s1" ) );
        session.wait_for_load().await;
        clock.advance( 3.0 );
        session.tick();

        session.stop();
        assert_eq!( name_of( &session ).as_deref(), Some( "s1" ) );
        assert_eq!( session.current_time(), 0.0 );

        clock.advance( 3.0 );
        session.tick();
        assert_eq!( session.current_time(), 0.0 );
    }


    #[tokio::test]
    async fn test_teardown_publishes_empty_state() {
        let ( mut session, _clock ) = session_with( Arc::new( scripted() ) );
        let state = session.subscribe();
        session.load_track( Track::from_path( "s1" ) );
        session.wait_for_load().await;

        session.teardown();
        let last = state.borrow().clone();
        assert!( last.current_track.is_none() );
        assert!( !last.is_playing );
    }
}
