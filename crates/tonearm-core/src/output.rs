//! Audio output via cpal
//!
//! The device stream runs for the whole session and pulls frames from a
//! shared playhead. Starting, halting and swapping tracks only flips state on
//! the playhead; the stream itself is never rebuilt.

use std::sync::{ Arc, Mutex, PoisonError };
use std::sync::atomic::{ AtomicBool, AtomicU32, AtomicUsize, Ordering };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;

use crate::decoder::DecodedBuffer;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to get default stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to play stream: {0}" )]
    PlayStream( String ),
}


/// Number of bands in a spectrum sample.
pub const VIS_BARS: usize = 32;


/// The physical output channel driven by the player.
pub trait AudioSink {
    /// Makes `buffer` the track to render. Output stays halted.
    fn load( &mut self, buffer: Arc<DecodedBuffer> );

    /// Begins output at `offset_secs` into the loaded track.
    fn start( &mut self, offset_secs: f64 );

    /// Stops output, keeping the loaded track.
    fn halt( &mut self );

    /// Stops output and drops the loaded track.
    fn unload( &mut self );

    fn set_volume( &mut self, volume: f32 );

    /// Most recent RMS band levels of the rendered signal.
    fn spectrum( &self ) -> [f32; VIS_BARS];

    /// Sample rate buffers should arrive at, if the sink has one.
    fn output_rate( &self ) -> Option<u32> {
        None
    }
}


/// Sink that renders nothing. Used headless or when no device is present.
#[derive( Debug, Default, Clone, Copy )]
pub struct NullSink;


impl AudioSink for NullSink {
    fn load( &mut self, _buffer: Arc<DecodedBuffer> ) {}

    fn start( &mut self, _offset_secs: f64 ) {}

    fn halt( &mut self ) {}

    fn unload( &mut self ) {}

    fn set_volume( &mut self, _volume: f32 ) {}

    fn spectrum( &self ) -> [f32; VIS_BARS] {
        [0.0; VIS_BARS]
    }
}


/// Shared state between the owning thread and the audio callback.
/// Handles channel conversion between the track and the device.
struct Playhead {
    track: Mutex<Option<Arc<DecodedBuffer>>>,
    /// Next frame of the track to render
    cursor: AtomicUsize,
    running: AtomicBool,
    /// Volume level stored as f32 bits
    volume: AtomicU32,
    output_channels: usize,
    vis_data: Mutex<[f32; VIS_BARS]>,
}


impl Playhead {
    fn new( output_channels: u16 ) -> Self {
        Self {
            track: Mutex::new( None ),
            cursor: AtomicUsize::new( 0 ),
            running: AtomicBool::new( false ),
            volume: AtomicU32::new( 1.0_f32.to_bits() ),
            output_channels: output_channels.max( 1 ) as usize,
            vis_data: Mutex::new( [0.0; VIS_BARS] ),
        }
    }


    fn replace( &self, track: Option<Arc<DecodedBuffer>> ) {
        self.running.store( false, Ordering::Relaxed );
        *self.track.lock().unwrap_or_else( PoisonError::into_inner ) = track;
        self.cursor.store( 0, Ordering::Relaxed );
    }


    fn start_at( &self, offset_secs: f64 ) {
        let guard = self.track.lock().unwrap_or_else( PoisonError::into_inner );
        if let Some( track ) = guard.as_ref() {
            let frame = ( offset_secs.max( 0.0 ) * track.sample_rate() as f64 ) as usize;
            self.cursor.store( frame.min( track.frames() ), Ordering::Relaxed );
            self.running.store( true, Ordering::Relaxed );
        }
    }


    fn halt( &self ) {
        self.running.store( false, Ordering::Relaxed );
    }


    fn set_volume( &self, volume: f32 ) {
        self.volume.store( volume.to_bits(), Ordering::Relaxed );
    }


    fn vis_data( &self ) -> [f32; VIS_BARS] {
        *self.vis_data.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Fills `output` with the next frames. Returns the number of samples
    /// that carried track audio; the rest is silence.
    fn render( &self, output: &mut [f32] ) -> usize {
        output.fill( 0.0 );
        if !self.running.load( Ordering::Relaxed ) {
            return 0;
        }

        let guard = self.track.lock().unwrap_or_else( PoisonError::into_inner );
        let Some( track ) = guard.as_ref() else {
            return 0;
        };

        let src_ch = track.channels();
        let out_ch = self.output_channels;
        let samples = track.samples();
        let total = track.frames();
        let mut cursor = self.cursor.load( Ordering::Relaxed );
        let mut written = 0;

        for frame in output.chunks_exact_mut( out_ch ) {
            if cursor >= total {
                break;
            }
            remix( &samples[ cursor * src_ch..( cursor + 1 ) * src_ch ], frame );
            cursor += 1;
            written += out_ch;
        }
        self.cursor.store( cursor, Ordering::Relaxed );

        let volume = f32::from_bits( self.volume.load( Ordering::Relaxed ) );
        if volume != 1.0 {
            for sample in output[ ..written ].iter_mut() {
                *sample *= volume;
            }
        }

        self.update_vis( &output[ ..written ] );
        written
    }


    fn update_vis( &self, rendered: &[f32] ) {
        if rendered.len() < VIS_BARS {
            return;
        }

        let mut vis = self.vis_data.lock().unwrap_or_else( PoisonError::into_inner );
        let samples_per_bar = rendered.len() / VIS_BARS;

        for ( bar_idx, bar ) in vis.iter_mut().enumerate() {
            let start = bar_idx * samples_per_bar;
            let end = start + samples_per_bar;

            let sum_sq: f32 = rendered[ start..end ].iter().map( |s| s * s ).sum();
            let rms = ( sum_sq / samples_per_bar as f32 ).sqrt();

            // Smooth with previous value (decay)
            *bar = ( *bar * 0.7 ) + ( rms * 0.3 );
        }
    }
}


/// Writes one source frame into one output frame of a different width.
fn remix( src: &[f32], out: &mut [f32] ) {
    match ( src.len(), out.len() ) {
        ( s, o ) if s == o => out.copy_from_slice( src ),
        ( 1, _ ) => out.fill( src[ 0 ] ),
        ( _, 1 ) => out[ 0 ] = src.iter().sum::<f32>() / src.len() as f32,
        ( s, _ ) => {
            for ( ch, sample ) in out.iter_mut().enumerate() {
                // Duplicate last channel if output has more channels
                *sample = src[ ch.min( s - 1 ) ];
            }
        }
    }
}


/// Output on the system's default device.
/// Note: This struct is NOT Send/Sync due to cpal::Stream.
/// Keep it on the thread where it was created.
pub struct CpalSink {
    #[allow( dead_code )] // Kept alive for its Drop impl which stops the audio stream
    stream: cpal::Stream,
    playhead: Arc<Playhead>,
    sample_rate: u32,
    channels: u16,
}


impl CpalSink {
    /// Opens the default output device and starts its (silent) stream.
    pub fn open() -> Result<Self, OutputError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;

        tracing::info!( "Using output device: {:?}", device.name() );

        let config = device
            .default_output_config()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .config();

        tracing::info!(
            "Audio output config: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        let playhead = Arc::new( Playhead::new( config.channels ) );
        let playhead_clone = Arc::clone( &playhead );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    playhead_clone.render( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        stream
            .play()
            .map_err( |e| OutputError::PlayStream( e.to_string() ) )?;

        Ok( Self {
            stream,
            playhead,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        })
    }


    /// Gets the device channel count.
    pub fn channels( &self ) -> u16 {
        self.channels
    }
}


impl AudioSink for CpalSink {
    fn load( &mut self, buffer: Arc<DecodedBuffer> ) {
        if buffer.sample_rate() != self.sample_rate {
            tracing::warn!(
                "Track is {} Hz but the device runs at {} Hz, speed will be off",
                buffer.sample_rate(),
                self.sample_rate
            );
        }
        self.playhead.replace( Some( buffer ) );
    }


    fn output_rate( &self ) -> Option<u32> {
        Some( self.sample_rate )
    }


    fn start( &mut self, offset_secs: f64 ) {
        self.playhead.start_at( offset_secs );
    }


    fn halt( &mut self ) {
        self.playhead.halt();
    }


    fn unload( &mut self ) {
        self.playhead.replace( None );
    }


    fn set_volume( &mut self, volume: f32 ) {
        self.playhead.set_volume( volume );
    }


    fn spectrum( &self ) -> [f32; VIS_BARS] {
        self.playhead.vis_data()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn ramp( frames: usize, channels: usize ) -> Arc<DecodedBuffer> {
        let samples = ( 0..frames * channels ).map( |i| i as f32 ).collect();
        Arc::new( DecodedBuffer::new( samples, 10, channels ) )
    }


    #[test]
    fn test_halted_playhead_renders_silence() {
        let playhead = Playhead::new( 2 );
        playhead.replace( Some( ramp( 10, 2 ) ) );

        let mut out = [1.0; 8];
        assert_eq!( playhead.render( &mut out ), 0 );
        assert!( out.iter().all( |s| *s == 0.0 ) );
    }


    #[test]
    fn test_start_at_offset() {
        let playhead = Playhead::new( 1 );
        playhead.replace( Some( ramp( 10, 1 ) ) );
        playhead.start_at( 0.5 );

        let mut out = [0.0; 3];
        playhead.render( &mut out );
        assert_eq!( out, [5.0, 6.0, 7.0] );
    }


    #[test]
    fn test_mono_to_stereo() {
        let playhead = Playhead::new( 2 );
        playhead.replace( Some( ramp( 4, 1 ) ) );
        playhead.start_at( 0.0 );

        let mut out = [0.0; 4];
        assert_eq!( playhead.render( &mut out ), 4 );
        assert_eq!( out, [0.0, 0.0, 1.0, 1.0] );
    }


    #[test]
    fn test_stereo_to_mono_mixdown() {
        let mut out = [0.0];
        remix( &[1.0, 3.0], &mut out );
        assert_eq!( out, [2.0] );
    }


    #[test]
    fn test_end_of_track_pads_silence() {
        let playhead = Playhead::new( 1 );
        playhead.replace( Some( ramp( 2, 1 ) ) );
        playhead.start_at( 0.0 );

        let mut out = [9.0; 4];
        assert_eq!( playhead.render( &mut out ), 2 );
        assert_eq!( out, [0.0, 1.0, 0.0, 0.0] );
    }


    #[test]
    fn test_volume_applied() {
        let playhead = Playhead::new( 1 );
        playhead.replace( Some( ramp( 4, 1 ) ) );
        playhead.set_volume( 0.5 );
        playhead.start_at( 0.0 );

        let mut out = [0.0; 4];
        playhead.render( &mut out );
        assert_eq!( out, [0.0, 0.5, 1.0, 1.5] );
    }


    #[test]
    fn test_replace_stops_output() {
        let playhead = Playhead::new( 1 );
        playhead.replace( Some( ramp( 4, 1 ) ) );
        playhead.start_at( 0.0 );
        playhead.replace( Some( ramp( 4, 1 ) ) );

        let mut out = [0.0; 4];
        assert_eq!( playhead.render( &mut out ), 0 );
    }


    #[test]
    fn test_vis_data_tracks_signal() {
        let playhead = Playhead::new( 1 );
        let loud = Arc::new( DecodedBuffer::new( vec![ 1.0; 256 ], 10, 1 ) );
        playhead.replace( Some( loud ) );
        playhead.start_at( 0.0 );

        let mut out = [0.0; 256];
        playhead.render( &mut out );
        assert!( playhead.vis_data().iter().all( |bar| *bar > 0.0 ) );
    }
}
