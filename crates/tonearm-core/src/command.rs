//! Text command parsing.
//!
//! Front ends read lines like `seek 1:30` or `/vol 80` and turn them into a
//! typed [`Command`] before acting on the session.

use std::path::PathBuf;

use thiserror::Error;


/// Errors that can occur during command parsing.
#[derive( Debug, Error, PartialEq )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// Parsed command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    // Playback commands
    Play,
    Pause,
    Toggle,
    Stop,
    Next,
    Prev,
    /// Target position in seconds
    Seek { position: f64 },
    /// Volume in percent; `None` reports the current level
    Volume { level: Option<u32> },

    // Playlist commands
    /// Zero-based playlist index
    Load { index: usize },
    Open { path: PathBuf },
    Keep,
    List,
    /// Zero-based playlist index
    Remove { index: usize },
    Dedup,

    // Other commands
    Status,
    Help,
    Quit,
}


impl Command {
    /// Parses a command string. A leading `/` is optional.
    ///
    /// @param input - The command string to parse
    ///
    /// @returns The parsed command or an error
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let input = input.strip_prefix( '/' ).unwrap_or( input );
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() ).filter( |s| !s.is_empty() );

        match cmd.as_str() {
            // Playback commands
            "play" | "p" => Ok( Command::Play ),
            "pause" | "pa" => Ok( Command::Pause ),
            "toggle" | "t" | "space" => Ok( Command::Toggle ),
            "stop" | "st" => Ok( Command::Stop ),
            "next" | "n" => Ok( Command::Next ),
            "prev" | "previous" | "pr" => Ok( Command::Prev ),
            "seek" | "sk" => {
                let time_str = args
                    .ok_or_else( || CommandError::MissingArgument( "time position".into() ) )?;
                let position = parse_time( time_str )?;
                Ok( Command::Seek { position } )
            }
            "vol" | "volume" => {
                let level = args
                    .map( |s| s.trim_end_matches( '%' ).parse::<u32>()
                        .map_err( |_| CommandError::InvalidArgument( format!( "Invalid volume: {}", s ) ) ) )
                    .transpose()?;
                Ok( Command::Volume { level } )
            }

            // Playlist commands
            "load" | "l" => Ok( Command::Load { index: parse_track_number( args )? } ),
            "open" | "o" => {
                let path = args
                    .ok_or_else( || CommandError::MissingArgument( "path".into() ) )?;
                Ok( Command::Open { path: PathBuf::from( path ) } )
            }
            "keep" | "k" => Ok( Command::Keep ),
            "list" | "ls" => Ok( Command::List ),
            "remove" | "rm" | "del" => Ok( Command::Remove { index: parse_track_number( args )? } ),
            "dedup" | "dedupe" | "unique" => Ok( Command::Dedup ),

            // Other commands
            "status" | "s" => Ok( Command::Status ),
            "help" | "h" | "?" => Ok( Command::Help ),
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }


    /// Returns a brief description of the command for help text.
    pub fn description( &self ) -> &'static str {
        match self {
            Command::Play => "Start or resume playback",
            Command::Pause => "Pause playback",
            Command::Toggle => "Toggle play/pause",
            Command::Stop => "Stop and rewind",
            Command::Next => "Next track",
            Command::Prev => "Previous track",
            Command::Seek { .. } => "Seek to position",
            Command::Volume { .. } => "Set volume (0-100)",
            Command::Load { .. } => "Play a playlist entry",
            Command::Open { .. } => "Play a file from disk",
            Command::Keep => "Add the opened file to the playlist",
            Command::List => "List the playlist",
            Command::Remove { .. } => "Remove a playlist entry",
            Command::Dedup => "Remove duplicate tracks",
            Command::Status => "Show what is playing",
            Command::Help => "Show help",
            Command::Quit => "Quit application",
        }
    }
}


/// Parses a 1-based track number into a playlist index.
fn parse_track_number( arg: Option<&str> ) -> Result<usize, CommandError> {
    let arg = arg.ok_or_else( || CommandError::MissingArgument( "track number".into() ) )?;
    let number: usize = arg.parse()
        .map_err( |_| CommandError::InvalidArgument( format!( "Invalid track number: {}", arg ) ) )?;
    if number == 0 {
        return Err( CommandError::InvalidArgument( "Track numbers start at 1".into() ) );
    }
    Ok( number - 1 )
}


/// Parses a time string like "1:30", "90" or "12.5" into seconds.
///
/// @param s - Time string in format "MM:SS", "M:SS.s", or just seconds
///
/// @returns Seconds or error
fn parse_time( s: &str ) -> Result<f64, CommandError> {
    let s = s.trim();

    let seconds = if let Some(( min, sec )) = s.split_once( ':' ) {
        let minutes: u64 = min.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid minutes: {}", min ) ) )?;
        let seconds: f64 = sec.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) )?;
        minutes as f64 * 60.0 + seconds
    } else {
        s.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid time: {}", s ) ) )?
    };

    if seconds.is_finite() {
        Ok( seconds )
    } else {
        Err( CommandError::InvalidArgument( format!( "Invalid time: {}", s ) ) )
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Playback Commands:
  play            Start or resume playback
  pause           Pause playback
  toggle          Toggle play/pause          [t]
  stop            Stop and rewind
  next            Next track                 [n]
  prev            Previous track             [pr]
  seek <time>     Seek to position (e.g., 1:30)
  vol [0-100]     Set or show volume

Playlist Commands:
  list            List the playlist
  load <n>        Play playlist entry n
  open <path>     Play a file from disk
  keep            Add the opened file to the playlist
  remove <n>      Remove playlist entry n    [rm]
  dedup           Remove duplicate tracks

Other Commands:
  status          Show what is playing       [s]
  help            Show this help             [?]
  quit            Exit tonearm               [q]"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_seek() {
        let cmd = Command::parse( "seek 1:30" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: 90.0 } );
    }


    #[test]
    fn test_parse_seek_fractional_seconds() {
        let cmd = Command::parse( "seek 12.5" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: 12.5 } );
    }


    #[test]
    fn test_parse_seek_rejects_nan() {
        let result = Command::parse( "seek NaN" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_slash_prefix() {
        assert_eq!( Command::parse( "/next" ).unwrap(), Command::Next );
        assert_eq!( Command::parse( "  /t " ).unwrap(), Command::Toggle );
    }


    #[test]
    fn test_parse_volume() {
        assert_eq!( Command::parse( "vol 80" ).unwrap(), Command::Volume { level: Some( 80 ) } );
        assert_eq!( Command::parse( "vol 80%" ).unwrap(), Command::Volume { level: Some( 80 ) } );
        assert_eq!( Command::parse( "volume" ).unwrap(), Command::Volume { level: None } );
        assert!( Command::parse( "vol loud" ).is_err() );
    }


    #[test]
    fn test_parse_load_is_one_based() {
        assert_eq!( Command::parse( "load 2" ).unwrap(), Command::Load { index: 1 } );
        assert!( matches!( Command::parse( "load 0" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_playlist_editing() {
        assert_eq!( Command::parse( "rm 3" ).unwrap(), Command::Remove { index: 2 } );
        assert_eq!( Command::parse( "/dedup" ).unwrap(), Command::Dedup );
        assert!( matches!( Command::parse( "remove" ), Err( CommandError::MissingArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "remove x" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_open() {
        let cmd = Command::parse( "open /tmp/my song.mp3" ).unwrap();
        assert_eq!( cmd, Command::Open { path: PathBuf::from( "/tmp/my song.mp3" ) } );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_missing_arg() {
        let result = Command::parse( "seek" );
        assert!( matches!( result, Err( CommandError::MissingArgument( _ ) ) ) );
    }
}
