//! Playlist navigation
//!
//! An ordered, finite list of tracks plus at most one transient user track.
//! The transient track can be played but is not part of the navigable
//! sequence until it is explicitly kept.

use std::fs::File;
use std::io::{ BufRead, BufReader };
use std::path::{ Path, PathBuf };

use thiserror::Error;

use crate::track::{ Track, TrackSource };


/// Errors that can occur with playlist operations.
#[derive( Debug, Error )]
pub enum PlaylistError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),
}


/// Navigation direction.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Step {
    Next,
    Prev,
}


/// Playlist of tracks.
#[derive( Debug, Default, Clone )]
pub struct Playlist {
    tracks: Vec<Track>,
    transient: Option<Track>,
}


impl Playlist {
    /// Creates a new empty playlist.
    pub fn new() -> Self {
        Self::default()
    }


    /// Creates a playlist from catalog tracks.
    pub fn from_tracks( tracks: impl IntoIterator<Item = Track> ) -> Self {
        Self {
            tracks: tracks.into_iter().collect(),
            transient: None,
        }
    }


    /// Reads a catalog from an M3U file.
    ///
    /// `#EXTINF` titles name the following entry; relative paths resolve
    /// against the list's own directory.
    pub fn from_m3u( path: &Path ) -> Result<Self, PlaylistError> {
        let file = File::open( path )?;
        let reader = BufReader::new( file );
        let base = path.parent().map( Path::to_path_buf ).unwrap_or_default();

        let mut playlist = Self::new();
        let mut title: Option<String> = None;

        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();

            if let Some( info ) = trimmed.strip_prefix( "#EXTINF:" ) {
                title = info
                    .split_once( ',' )
                    .map( |( _, name )| name.trim().to_string() )
                    .filter( |name| !name.is_empty() );
                continue;
            }

            // Skip empty lines and comments
            if trimmed.is_empty() || trimmed.starts_with( '#' ) {
                continue;
            }

            let entry = PathBuf::from( trimmed );
            let entry = if entry.is_relative() { base.join( entry ) } else { entry };

            let track = match title.take() {
                Some( name ) => Track::new( name, TrackSource::Catalog( entry ) ),
                None => Track::from_path( entry ),
            };
            playlist.append( track );
        }

        tracing::info!( "Loaded {} tracks from {}", playlist.len(), path.display() );
        Ok( playlist )
    }


    /// Adds a track to the end of the navigable sequence.
    pub fn append( &mut self, track: Track ) {
        self.tracks.push( track );
    }


    /// Adds multiple tracks.
    pub fn extend( &mut self, tracks: impl IntoIterator<Item = Track> ) {
        self.tracks.extend( tracks );
    }


    /// Removes the track at `index`.
    pub fn remove( &mut self, index: usize ) -> Option<Track> {
        if index < self.tracks.len() {
            Some( self.tracks.remove( index ) )
        } else {
            None
        }
    }


    /// Removes duplicate tracks, keeping the first occurrence.
    ///
    /// @returns The number of duplicates removed
    pub fn dedup( &mut self ) -> usize {
        let original_len = self.tracks.len();
        let mut kept: Vec<Track> = Vec::with_capacity( original_len );

        for track in self.tracks.drain( .. ) {
            if !kept.contains( &track ) {
                kept.push( track );
            }
        }

        self.tracks = kept;
        original_len - self.tracks.len()
    }


    /// Gets the track at `index`.
    pub fn get( &self, index: usize ) -> Option<&Track> {
        self.tracks.get( index )
    }


    /// Finds a track by source.
    pub fn position_of( &self, track: &Track ) -> Option<usize> {
        self.tracks.iter().position( |t| t == track )
    }


    /// Resolves the track one step away from `current`, wrapping around.
    ///
    /// A current track that is not in the sequence (or none at all) counts
    /// as index -1, so `Next` lands on the first track.
    pub fn neighbor( &self, current: Option<&Track>, step: Step ) -> Option<&Track> {
        if self.tracks.is_empty() {
            return None;
        }

        let len = self.tracks.len() as isize;
        let index = current
            .and_then( |t| self.position_of( t ) )
            .map_or( -1, |i| i as isize );
        let delta = match step {
            Step::Next => 1,
            Step::Prev => -1,
        };

        let target = ( index + delta + len ).rem_euclid( len ) as usize;
        self.tracks.get( target )
    }


    /// Records the most recent user-loaded track, replacing any earlier one.
    pub fn set_transient( &mut self, track: Track ) {
        self.transient = Some( track );
    }


    pub fn transient( &self ) -> Option<&Track> {
        self.transient.as_ref()
    }


    /// Moves the transient track into the navigable sequence.
    ///
    /// @returns The index it was appended at
    pub fn keep_transient( &mut self ) -> Option<usize> {
        let track = self.transient.take()?;
        if let Some( existing ) = self.position_of( &track ) {
            return Some( existing );
        }
        self.tracks.push( track );
        Some( self.tracks.len() - 1 )
    }


    /// Gets all navigable tracks.
    pub fn tracks( &self ) -> &[Track] {
        &self.tracks
    }


    /// Gets the number of navigable tracks.
    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    /// Returns true if there is nothing to navigate.
    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }
}


#[cfg( test )]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use super::*;
    use crate::track::ByteSource;


    fn catalog() -> Playlist {
        Playlist::from_tracks( [ "s1.ogg", "s2.ogg", "s3.ogg" ].map( Track::from_path ) )
    }


    #[test]
    fn test_next_from_nothing_lands_on_first() {
        let playlist = catalog();
        let next = playlist.neighbor( None, Step::Next ).unwrap();
        assert_eq!( next.name(), "s1" );
    }


    #[test]
    fn test_prev_wraps_from_first() {
        let playlist = catalog();
        let first = playlist.get( 0 ).cloned();
        let prev = playlist.neighbor( first.as_ref(), Step::Prev ).unwrap();
        assert_eq!( prev.name(), "s3" );
    }


    #[test]
    fn test_next_cycles_back() {
        let playlist = catalog();
        let start = playlist.get( 1 ).cloned().unwrap();
        let mut current = start.clone();
        for _ in 0..playlist.len() {
            current = playlist.neighbor( Some( &current ), Step::Next ).cloned().unwrap();
        }
        assert_eq!( current, start );
    }


    #[test]
    fn test_single_track_wraps_to_itself() {
        let playlist = Playlist::from_tracks( [ Track::from_path( "only.ogg" ) ] );
        let only = playlist.get( 0 ).cloned();
        assert_eq!( playlist.neighbor( only.as_ref(), Step::Next ), only.as_ref() );
        assert_eq!( playlist.neighbor( only.as_ref(), Step::Prev ), only.as_ref() );
    }


    #[test]
    fn test_empty_playlist_has_no_neighbor() {
        let playlist = Playlist::new();
        assert!( playlist.neighbor( None, Step::Next ).is_none() );
    }


    #[test]
    fn test_lookup_by_source_not_name() {
        let playlist = catalog();
        let renamed = Track::new( "Something else", TrackSource::Catalog( PathBuf::from( "s2.ogg" ) ) );
        assert_eq!( playlist.position_of( &renamed ), Some( 1 ) );
        assert_eq!( playlist.neighbor( Some( &renamed ), Step::Next ).unwrap().name(), "s3" );
    }


    #[test]
    fn test_transient_not_navigable_until_kept() {
        let mut playlist = catalog();
        let upload = Track::user( 1, "upload.mp3", ByteSource::Memory( Arc::from( vec![ 0u8; 4 ] ) ) );
        playlist.set_transient( upload.clone() );

        assert_eq!( playlist.len(), 3 );
        assert!( playlist.position_of( &upload ).is_none() );
        assert_eq!( playlist.neighbor( Some( &upload ), Step::Next ).unwrap().name(), "s1" );

        assert_eq!( playlist.keep_transient(), Some( 3 ) );
        assert!( playlist.transient().is_none() );
        assert_eq!( playlist.neighbor( Some( &upload ), Step::Next ).unwrap().name(), "s1" );
        assert_eq!( playlist.neighbor( Some( &upload ), Step::Prev ).unwrap().name(), "s3" );
    }


    #[test]
    fn test_dedup_by_source() {
        let mut playlist = catalog();
        playlist.append( Track::new( "dup", TrackSource::Catalog( PathBuf::from( "s1.ogg" ) ) ) );
        assert_eq!( playlist.dedup(), 1 );
        assert_eq!( playlist.len(), 3 );
        assert_eq!( playlist.get( 0 ).unwrap().name(), "s1" );
    }


    #[test]
    fn test_remove_out_of_range() {
        let mut playlist = catalog();
        assert!( playlist.remove( 9 ).is_none() );
        assert_eq!( playlist.remove( 0 ).unwrap().name(), "s1" );
        assert_eq!( playlist.len(), 2 );
    }


    #[test]
    fn test_from_m3u() {
        let dir = std::env::temp_dir().join( format!( "tonearm-m3u-{}", std::process::id() ) );
        fs::create_dir_all( &dir ).unwrap();
        let list = dir.join( "catalog.m3u" );
        fs::write( &list, "#EXTM3U\n#EXTINF:30,Morning Theme\nthemes/morning.ogg\n\n/abs/night.mp3\n" ).unwrap();

        let playlist = Playlist::from_m3u( &list ).unwrap();
        let _ = fs::remove_dir_all( &dir );

        assert_eq!( playlist.len(), 2 );
        assert_eq!( playlist.get( 0 ).unwrap().name(), "Morning Theme" );
        assert_eq!(
            playlist.get( 0 ).unwrap().source(),
            &TrackSource::Catalog( dir.join( "themes/morning.ogg" ) )
        );
        assert_eq!( playlist.get( 1 ).unwrap().name(), "night" );
    }
}
