//! Progress synchronization
//!
//! While the player is running, each tick recomputes the elapsed time from
//! the clock and publishes it. Nothing is accumulated between ticks, so a
//! late or skipped tick never causes drift.

use std::time::Duration;

use tokio::time::{ Interval, MissedTickBehavior };

use crate::player::Player;


/// Default refresh rate in Hz.
pub const DEFAULT_REFRESH_HZ: u32 = 60;

/// Shortest tick period; faster rates are capped here.
const MIN_PERIOD: Duration = Duration::from_millis( 1 );


/// Result of one synchronizer tick.
#[derive( Debug, Clone, Copy, PartialEq )]
pub enum Tick {
    /// Not armed; nothing happened.
    Idle,
    /// Published a new position.
    Progress( f64 ),
    /// The position reached the end of the track.
    Finished,
    /// The player stopped running since the last tick; disarmed.
    Cancelled,
}


/// Recomputes and publishes the player's position while it runs.
#[derive( Debug, Default )]
pub struct ProgressSync {
    armed: bool,
}


impl ProgressSync {
    pub fn new() -> Self {
        Self::default()
    }


    /// Starts publishing on subsequent ticks.
    pub fn arm( &mut self ) {
        self.armed = true;
    }


    /// Stops publishing.
    pub fn cancel( &mut self ) {
        self.armed = false;
    }


    pub fn is_armed( &self ) -> bool {
        self.armed
    }


    /// Runs one tick against the player's live state.
    pub fn tick( &mut self, player: &mut Player ) -> Tick {
        if !self.armed {
            return Tick::Idle;
        }

        // Checked every tick: pause or stop may land between ticks
        if !player.is_playing() {
            self.armed = false;
            return Tick::Cancelled;
        }

        let position = player.elapsed();
        player.publish_time( position );

        if position >= player.duration() {
            self.armed = false;
            Tick::Finished
        } else {
            Tick::Progress( position )
        }
    }
}


/// Fixed-rate timer driving synchronizer ticks.
///
/// Missed ticks are skipped, never replayed in a burst.
pub struct Cadence {
    interval: Interval,
}


impl Cadence {
    /// Creates a cadence firing `hz` times a second, at most once per
    /// millisecond. Must be called inside a tokio runtime.
    pub fn new( hz: u32 ) -> Self {
        let period = Duration::from_secs_f64( 1.0 / hz.max( 1 ) as f64 ).max( MIN_PERIOD );
        let mut interval = tokio::time::interval( period );
        interval.set_missed_tick_behavior( MissedTickBehavior::Skip );
        Self { interval }
    }


    /// Waits for the next tick.
    pub async fn tick( &mut self ) {
        self.interval.tick().await;
    }


    pub fn period( &self ) -> Duration {
        self.interval.period()
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::decoder::DecodedBuffer;
    use crate::output::NullSink;


    fn playing( duration: f64 ) -> ( Player, ManualClock ) {
        let clock = ManualClock::new();
        let mut player = Player::new( Box::new( NullSink ), Box::new( clock.clone() ) );
        player.install( DecodedBuffer::silence( duration, 100, 1 ) );
        player.play();
        ( player, clock )
    }


    #[test]
    fn test_idle_until_armed() {
        let ( mut player, clock ) = playing( 10.0 );
        let mut sync = ProgressSync::new();

        clock.advance( 2.0 );
        assert_eq!( sync.tick( &mut player ), Tick::Idle );
        assert_eq!( player.current_time(), 0.0 );
    }


    #[test]
    fn test_publishes_clock_position() {
        let ( mut player, clock ) = playing( 10.0 );
        let mut sync = ProgressSync::new();
        sync.arm();

        clock.advance( 2.0 );
        assert_eq!( sync.tick( &mut player ), Tick::Progress( 2.0 ) );
        assert_eq!( player.current_time(), 2.0 );
    }


    #[test]
    fn test_monotonic_under_jitter() {
        let ( mut player, clock ) = playing( 10.0 );
        let mut sync = ProgressSync::new();
        sync.arm();

        let mut last = 0.0;
        for step in [ 0.016, 0.05, 0.001, 0.3, 0.017, 0.0, 0.9 ] {
            clock.advance( step );
            sync.tick( &mut player );
            assert!( player.current_time() >= last );
            last = player.current_time();
        }
    }


    #[test]
    fn test_self_cancels_when_paused_between_ticks() {
        let ( mut player, clock ) = playing( 10.0 );
        let mut sync = ProgressSync::new();
        sync.arm();

        clock.advance( 3.0 );
        sync.tick( &mut player );
        player.pause();
        clock.advance( 3.0 );

        assert_eq!( sync.tick( &mut player ), Tick::Cancelled );
        assert!( !sync.is_armed() );
        assert_eq!( player.current_time(), 3.0 );

        // A late tick after cancellation changes nothing
        clock.advance( 3.0 );
        assert_eq!( sync.tick( &mut player ), Tick::Idle );
        assert_eq!( player.current_time(), 3.0 );
    }


    #[test]
    fn test_finishes_at_duration() {
        let ( mut player, clock ) = playing( 5.0 );
        let mut sync = ProgressSync::new();
        sync.arm();

        clock.advance( 7.0 );
        assert_eq!( sync.tick( &mut player ), Tick::Finished );
        assert_eq!( player.current_time(), 5.0 );
        assert!( !sync.is_armed() );
    }


    #[tokio::test]
    async fn test_cadence_period() {
        let mut cadence = Cadence::new( 50 );
        assert_eq!( cadence.period(), Duration::from_millis( 20 ) );
        cadence.tick().await;
    }


    #[tokio::test]
    async fn test_cadence_caps_extreme_rates() {
        let mut cadence = Cadence::new( u32::MAX );
        assert_eq!( cadence.period(), MIN_PERIOD );
        cadence.tick().await;

        assert_eq!( Cadence::new( 0 ).period(), Duration::from_secs( 1 ) );
    }
}
