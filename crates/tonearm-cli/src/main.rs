//! Tonearm CLI - line-driven playback controller

mod cli;
mod settings;

use std::io::{ self, BufRead };
use std::sync::Arc;
use std::thread;

use anyhow::{ Context, Result };
use clap::Parser;
use tokio::runtime::{ Handle, Runtime };
use tokio::sync::{ mpsc, watch };

use cli::Args;
use settings::Settings;

use tonearm_core::{
    command, AudioSink, ByteSource, Cadence, Command, CpalSink, MonotonicClock, NullSink,
    Playlist, Session, SessionSnapshot, SymphoniaDecoder, Track, VIS_BARS,
};


fn main() -> Result<()> {
    let args = Args::parse();
    init_logging( args.verbose );

    let settings = Settings::load();
    let runtime = Runtime::new().context( "failed to start async runtime" )?;
    runtime.block_on( run( args, settings ) )
}


/// Installs the stderr log subscriber.
fn init_logging( verbose: bool ) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level( level )
        .with_target( false )
        .with_writer( io::stderr )
        .init();
}


async fn run( args: Args, settings: Settings ) -> Result<()> {
    let ( playlist, autoplay ) = build_playlist( &args, &settings )?;

    let sink = open_sink( args.headless );
    let decoder = SymphoniaDecoder::new( sink.output_rate() );
    let mut session = Session::init(
        playlist,
        sink,
        Box::new( MonotonicClock::new() ),
        Arc::new( decoder ),
        Handle::current(),
    );

    let volume = args.volume.map( |v| v as f32 / 100.0 ).unwrap_or( settings.volume );
    session.set_volume( volume );

    if let Some( index ) = autoplay {
        session.load_index( index );
    }

    tokio::spawn( announce( session.subscribe() ) );

    let mut lines = spawn_stdin_reader();
    let mut cadence = Cadence::new( args.refresh_hz.unwrap_or( settings.refresh_hz ) );

    println!( "{} tracks in playlist. Type `help` for commands.", session.playlist().len() );

    loop {
        tokio::select! {
            _ = cadence.tick() => session.tick(),
            line = lines.recv() => {
                let Some( line ) = line else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse( &line ) {
                    Ok( Command::Quit ) => break,
                    Ok( cmd ) => execute( &mut session, cmd ),
                    Err( e ) => println!( "{}", e ),
                }
            }
        }
    }

    session.teardown();
    Ok(())
}


/// Builds the catalog and picks the track to start with, if any.
fn build_playlist( args: &Args, settings: &Settings ) -> Result<( Playlist, Option<usize> )> {
    let mut playlist = match &args.catalog {
        Some( path ) => Playlist::from_m3u( path )
            .with_context( || format!( "failed to read catalog {}", path.display() ) )?,
        None => Playlist::from_tracks( settings.catalog_tracks() ),
    };

    let first_file = playlist.len();
    playlist.extend( args.files.iter().cloned().map( Track::from_path ) );

    let autoplay = if args.files.is_empty() { None } else { Some( first_file ) };
    Ok(( playlist, autoplay ))
}


/// Opens the default output device, falling back to silence.
fn open_sink( headless: bool ) -> Box<dyn AudioSink> {
    if headless {
        tracing::info!( "Running headless, no audio output" );
        return Box::new( NullSink );
    }

    match CpalSink::open() {
        Ok( sink ) => Box::new( sink ),
        Err( e ) => {
            tracing::warn!( "{} - continuing without audio output", e );
            Box::new( NullSink )
        }
    }
}


/// Forwards stdin lines to the event loop.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let ( tx, rx ) = mpsc::unbounded_channel();
    thread::spawn( move || {
        for line in io::stdin().lock().lines().map_while( Result::ok ) {
            if tx.send( line ).is_err() {
                break;
            }
        }
    });
    rx
}


/// Prints a line whenever the track or play state changes.
async fn announce( mut state: watch::Receiver<SessionSnapshot> ) {
    let mut last: Option<( Option<Track>, bool )> = None;

    while state.changed().await.is_ok() {
        let snapshot = state.borrow_and_update().clone();
        let key = ( snapshot.current_track.clone(), snapshot.is_playing );
        if last.as_ref() != Some( &key ) {
            println!( "{}", status_line( &snapshot ) );
            last = Some( key );
        }
    }
}


fn execute( session: &mut Session, cmd: Command ) {
    tracing::debug!( "{}", cmd.description() );

    match cmd {
        Command::Play => session.play(),
        Command::Pause => session.pause(),
        Command::Toggle => session.toggle_play(),
        Command::Stop => session.stop(),
        Command::Next => session.next(),
        Command::Prev => session.prev(),
        Command::Seek { position } => {
            if let Err( e ) = session.seek( position ) {
                println!( "{}", e );
            }
        }
        Command::Volume { level: Some( level ) } => session.set_volume( level as f32 / 100.0 ),
        Command::Volume { level: None } => {
            println!( "Volume: {}%", ( session.volume() * 100.0 ).round() );
        }
        Command::Load { index } => {
            if !session.load_index( index ) {
                println!( "No track {}", index + 1 );
            }
        }
        Command::Open { path } => {
            let name = path
                .file_name()
                .map( |n| n.to_string_lossy().into_owned() )
                .unwrap_or_else( || path.display().to_string() );
            session.load_user_file( ByteSource::File( path ), &name );
        }
        Command::Keep => match session.playlist_mut().keep_transient() {
            Some( index ) => println!( "Added as track {}", index + 1 ),
            None => println!( "No opened file to keep" ),
        },
        Command::List => print_playlist( session ),
        Command::Remove { index } => match session.playlist_mut().remove( index ) {
            Some( track ) => println!( "Removed {}", track.name() ),
            None => println!( "No track {}", index + 1 ),
        },
        Command::Dedup => {
            let removed = session.playlist_mut().dedup();
            println!( "Removed {} duplicate tracks", removed );
        }
        Command::Status => {
            println!( "{}  {}", status_line( &session.snapshot() ), meter( &session.spectrum() ) );
        }
        Command::Help => println!( "{}", command::help_text() ),
        Command::Quit => {}
    }
}


fn print_playlist( session: &Session ) {
    if session.playlist().is_empty() {
        println!( "Playlist is empty" );
        return;
    }

    for ( i, track ) in session.playlist().tracks().iter().enumerate() {
        let marker = if session.current_track() == Some( track ) { ">" } else { " " };
        println!( "{} {:>3}. {}", marker, i + 1, track.name() );
    }
}


/// One-line summary of a snapshot.
fn status_line( snapshot: &SessionSnapshot ) -> String {
    let Some( track ) = &snapshot.current_track else {
        let suffix = if snapshot.loading { " (loading)" } else { "" };
        return format!( "■ Nothing playing{}", suffix );
    };

    let icon = if snapshot.is_playing { "▶" } else { "⏸" };
    format!(
        "{} {}  {} / {}  vol {}%",
        icon,
        track.name(),
        format_time( snapshot.current_time ),
        format_time( snapshot.duration ),
        ( snapshot.volume * 100.0 ).round()
    )
}


/// Formats seconds as m:ss.
fn format_time( secs: f64 ) -> String {
    let total = secs.max( 0.0 ).floor() as u64;
    format!( "{}:{:02}", total / 60, total % 60 )
}


/// Collapses a spectrum sample into a short level meter.
fn meter( spectrum: &[f32; VIS_BARS] ) -> String {
    const LEVELS: [char; 5] = [ ' ', '▂', '▄', '▆', '█' ];

    spectrum
        .chunks( VIS_BARS / 8 )
        .map( |band| {
            let level = band.iter().sum::<f32>() / band.len() as f32;
            let idx = ( level.clamp( 0.0, 1.0 ) * ( LEVELS.len() - 1 ) as f32 ).round() as usize;
            LEVELS[ idx ]
        })
        .collect()
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( 0.0 ), "0:00" );
        assert_eq!( format_time( 59.9 ), "0:59" );
        assert_eq!( format_time( 125.0 ), "2:05" );
    }


    #[test]
    fn test_status_line_without_track() {
        let snapshot = SessionSnapshot { loading: true, ..SessionSnapshot::default() };
        assert_eq!( status_line( &snapshot ), "■ Nothing playing (loading)" );
    }


    #[test]
    fn test_status_line_playing() {
        let snapshot = SessionSnapshot {
            current_track: Some( Track::from_path( "/music/Theme.ogg" ) ),
            is_playing: true,
            current_time: 65.0,
            duration: 180.0,
            volume: 0.5,
            loading: false,
        };
        assert_eq!( status_line( &snapshot ), "▶ Theme  1:05 / 3:00  vol 50%" );
    }


    #[test]
    fn test_meter_width() {
        assert_eq!( meter( &[0.0; VIS_BARS] ), "        " );
        assert_eq!( meter( &[1.0; VIS_BARS] ).chars().count(), 8 );
    }


    #[test]
    fn test_refresh_rate_bounds() {
        assert!( Args::try_parse_from( [ "tonearm", "--refresh-hz", "0" ] ).is_err() );
        assert!( Args::try_parse_from( [ "tonearm", "--refresh-hz", "5000" ] ).is_err() );
        let args = Args::try_parse_from( [ "tonearm", "--refresh-hz", "120" ] ).unwrap();
        assert_eq!( args.refresh_hz, Some( 120 ) );
    }


    #[test]
    fn test_files_autoplay_after_catalog() {
        let args = Args::parse_from( [ "tonearm", "a.ogg", "b.ogg" ] );
        let settings = Settings::parse( r#"{ "catalog": [ { "path": "/c.ogg" } ] }"# );

        let ( playlist, autoplay ) = build_playlist( &args, &settings ).unwrap();
        assert_eq!( playlist.len(), 3 );
        assert_eq!( autoplay, Some( 1 ) );
        assert_eq!( playlist.get( 1 ).unwrap().name(), "a" );
    }
}
