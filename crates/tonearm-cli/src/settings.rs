//! Application settings
//!
//! Read-only configuration: default volume, refresh rate and the built-in
//! track catalog. Nothing is ever written back.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use tonearm_core::player::DEFAULT_VOLUME;
use tonearm_core::progress::DEFAULT_REFRESH_HZ;
use tonearm_core::{ Track, TrackSource };


/// One built-in catalog entry.
#[derive( Debug, Clone, Deserialize )]
pub struct CatalogEntry {
    /// Display name; defaults to the file stem
    pub name: Option<String>,
    pub path: PathBuf,
}


/// Application settings.
#[derive( Debug, Clone, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Initial volume (0.0 to 1.0)
    pub volume: f32,

    /// Position refresh rate in Hz
    pub refresh_hz: u32,

    /// Built-in tracks
    pub catalog: Vec<CatalogEntry>,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            refresh_hz: DEFAULT_REFRESH_HZ,
            catalog: Vec::new(),
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "tonearm" ).join( "settings.json" ) )
    }


    /// Loads settings from disk, or returns defaults if not found.
    pub fn load() -> Self {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( &path ) {
            Ok( contents ) => Self::parse( &contents ),
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    /// Parses settings JSON, falling back to defaults on error.
    pub fn parse( contents: &str ) -> Self {
        serde_json::from_str( contents ).unwrap_or_else( |e| {
            tracing::warn!( "Invalid settings file, using defaults: {}", e );
            Self::default()
        })
    }


    /// Builds tracks from the catalog entries.
    pub fn catalog_tracks( &self ) -> Vec<Track> {
        self.catalog
            .iter()
            .map( |entry| match &entry.name {
                Some( name ) => Track::new( name.clone(), TrackSource::Catalog( entry.path.clone() ) ),
                None => Track::from_path( entry.path.clone() ),
            })
            .collect()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_missing_fields_use_defaults() {
        let settings = Settings::parse( r#"{ "refresh_hz": 30 }"# );
        assert_eq!( settings.refresh_hz, 30 );
        assert_eq!( settings.volume, DEFAULT_VOLUME );
        assert!( settings.catalog.is_empty() );
    }


    #[test]
    fn test_invalid_json_falls_back() {
        let settings = Settings::parse( "not json" );
        assert_eq!( settings.refresh_hz, DEFAULT_REFRESH_HZ );
    }


    #[test]
    fn test_catalog_tracks() {
        let settings = Settings::parse( r#"{
            "catalog": [
                { "name": "Opening", "path": "/music/opening.ogg" },
                { "path": "/music/closing.ogg" }
            ]
        }"# );

        let tracks = settings.catalog_tracks();
        assert_eq!( tracks.len(), 2 );
        assert_eq!( tracks[ 0 ].name(), "Opening" );
        assert_eq!( tracks[ 1 ].name(), "closing" );
    }
}
