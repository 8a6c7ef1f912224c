//! Playback clock reference
//!
//! Elapsed time is always reconstructed from a clock reading, never from
//! counting ticks, so the clock is the single source of truth for position.

#[cfg( any( test, feature = "test-util" ) )]
use std::sync::{ Arc, atomic::{ AtomicU64, Ordering } };
use std::time::Instant;


/// A monotonic time source measured in seconds.
pub trait Clock {
    /// Returns the current reading in seconds.
    fn now( &self ) -> f64;
}


/// Clock backed by `Instant`, zeroed at construction.
#[derive( Debug, Clone, Copy )]
pub struct MonotonicClock {
    origin: Instant,
}


impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}


impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}


impl Clock for MonotonicClock {
    fn now( &self ) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}


/// Clock that only moves when told to.
///
/// Clones share the same reading, so a test can keep one handle and give
/// another to the player.
#[cfg( any( test, feature = "test-util" ) )]
#[derive( Debug, Clone, Default )]
pub struct ManualClock {
    /// Reading stored as f64 bits
    secs: Arc<AtomicU64>,
}


#[cfg( any( test, feature = "test-util" ) )]
impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }


    /// Moves the clock forward by `secs`.
    pub fn advance( &self, secs: f64 ) {
        self.set( self.now() + secs );
    }


    /// Sets the reading to an absolute value.
    pub fn set( &self, secs: f64 ) {
        self.secs.store( secs.to_bits(), Ordering::Relaxed );
    }
}


#[cfg( any( test, feature = "test-util" ) )]
impl Clock for ManualClock {
    fn now( &self ) -> f64 {
        f64::from_bits( self.secs.load( Ordering::Relaxed ) )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();

        handle.advance( 2.5 );
        handle.advance( 0.5 );
        assert_eq!( clock.now(), 3.0 );

        clock.set( 1.0 );
        assert_eq!( handle.now(), 1.0 );
    }


    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!( second >= first );
    }
}
