//! Track descriptors
//!
//! A track is a display name plus a source. Identity is the source: two
//! tracks pointing at the same file or the same user handle are the same
//! track for navigation, whatever they are called.

use std::fmt;
use std::path::{ Path, PathBuf };
use std::sync::Arc;


/// Raw bytes supplied by the user.
#[derive( Clone )]
pub enum ByteSource {
    /// Bytes already held in memory.
    Memory( Arc<[u8]> ),

    /// A user-picked file, read when the track is loaded.
    File( PathBuf ),
}


impl fmt::Debug for ByteSource {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        match self {
            ByteSource::Memory( bytes ) => write!( f, "Memory({} bytes)", bytes.len() ),
            ByteSource::File( path ) => write!( f, "File({})", path.display() ),
        }
    }
}


/// Where a track's encoded audio comes from.
#[derive( Debug, Clone )]
pub enum TrackSource {
    /// Static catalog locator.
    Catalog( PathBuf ),

    /// Ephemeral handle to user-provided bytes.
    User {
        id: u64,
        bytes: ByteSource,
        /// File extension used as a format hint
        hint: Option<String>,
    },
}


impl PartialEq for TrackSource {
    fn eq( &self, other: &Self ) -> bool {
        match ( self, other ) {
            ( TrackSource::Catalog( a ), TrackSource::Catalog( b ) ) => a == b,
            ( TrackSource::User { id: a, .. }, TrackSource::User { id: b, .. } ) => a == b,
            _ => false,
        }
    }
}


impl Eq for TrackSource {}


impl fmt::Display for TrackSource {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        match self {
            TrackSource::Catalog( path ) => write!( f, "{}", path.display() ),
            TrackSource::User { id, .. } => write!( f, "user:{}", id ),
        }
    }
}


/// A playable item.
#[derive( Debug, Clone )]
pub struct Track {
    name: String,
    source: TrackSource,
}


impl Track {
    pub fn new( name: impl Into<String>, source: TrackSource ) -> Self {
        Self { name: name.into(), source }
    }


    /// Creates a catalog track, named after the file stem.
    pub fn from_path( path: impl Into<PathBuf> ) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map( |s| s.to_string_lossy().into_owned() )
            .unwrap_or_else( || path.display().to_string() );
        Self::new( name, TrackSource::Catalog( path ) )
    }


    /// Creates a user track, taking the format hint from the display name.
    pub fn user( id: u64, name: impl Into<String>, bytes: ByteSource ) -> Self {
        let name = name.into();
        let hint = Path::new( &name )
            .extension()
            .and_then( |e| e.to_str() )
            .map( str::to_lowercase );
        Self::new( name, TrackSource::User { id, bytes, hint } )
    }


    pub fn name( &self ) -> &str {
        &self.name
    }


    pub fn source( &self ) -> &TrackSource {
        &self.source
    }


    /// Returns true for tracks loaded from user bytes.
    pub fn is_user( &self ) -> bool {
        matches!( self.source, TrackSource::User { .. } )
    }
}


impl PartialEq for Track {
    fn eq( &self, other: &Self ) -> bool {
        self.source == other.source
    }
}


impl Eq for Track {}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_equality_ignores_name() {
        let a = Track::new( "Intro", TrackSource::Catalog( PathBuf::from( "/music/a.ogg" ) ) );
        let b = Track::new( "Renamed", TrackSource::Catalog( PathBuf::from( "/music/a.ogg" ) ) );
        assert_eq!( a, b );
    }


    #[test]
    fn test_user_tracks_compare_by_handle() {
        let bytes = ByteSource::Memory( Arc::from( vec![ 1u8, 2, 3 ] ) );
        let a = Track::user( 7, "song.mp3", bytes.clone() );
        let b = Track::user( 7, "other.mp3", ByteSource::File( PathBuf::from( "x" ) ) );
        let c = Track::user( 8, "song.mp3", bytes );
        assert_eq!( a, b );
        assert_ne!( a, c );
    }


    #[test]
    fn test_user_and_catalog_never_equal() {
        let catalog = Track::from_path( "7" );
        let user = Track::user( 7, "7", ByteSource::File( PathBuf::from( "7" ) ) );
        assert_ne!( catalog, user );
    }


    #[test]
    fn test_from_path_uses_stem() {
        let track = Track::from_path( "/music/Sunrise.flac" );
        assert_eq!( track.name(), "Sunrise" );
        assert!( !track.is_user() );
    }


    #[test]
    fn test_user_hint_from_name() {
        let track = Track::user( 1, "Demo.WAV", ByteSource::File( PathBuf::from( "/tmp/demo" ) ) );
        match track.source() {
            TrackSource::User { hint, .. } => assert_eq!( hint.as_deref(), Some( "wav" ) ),
            _ => panic!( "expected user source" ),
        }
    }
}
