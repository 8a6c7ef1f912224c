//! Command-line argument parsing for Tonearm.

use std::path::PathBuf;

use clap::Parser;


/// Tonearm - a single-track playback controller driven from the terminal.
#[derive( Parser, Debug )]
#[command( name = "tonearm" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// M3U file to use as the track catalog.
    #[arg( short, long )]
    pub catalog: Option<PathBuf>,

    /// Initial volume in percent (0-100).
    #[arg( long, value_parser = clap::value_parser!( u32 ).range( 0..=100 ) )]
    pub volume: Option<u32>,

    /// Position refresh rate in Hz (1-1000).
    #[arg( long, value_parser = clap::value_parser!( u32 ).range( 1..=1000 ) )]
    pub refresh_hz: Option<u32>,

    /// Run without opening an audio device.
    #[arg( long )]
    pub headless: bool,

    /// Log debug output to stderr.
    #[arg( short, long )]
    pub verbose: bool,

    /// Files to append to the catalog. The first one starts playing.
    #[arg( trailing_var_arg = true )]
    pub files: Vec<PathBuf>,
}
