//! Audio decoding via Symphonia
//!
//! Decodes a whole track up front into interleaved f32 samples. The buffer
//! is then handed to the player, which owns it until the next load.

use std::fs::{ self, File };
use std::future::Future;
use std::io::Cursor;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{ MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::resample::conform;
use crate::track::{ ByteSource, TrackSource };


/// Errors that can occur while producing a decoded buffer.
#[derive( Debug, Clone, Error, PartialEq, Eq )]
pub enum DecodeError {
    #[error( "Source not found: {0}" )]
    NotFound( String ),

    #[error( "Could not read input: {0}" )]
    UnreadableInput( String ),

    #[error( "Decode failed: {0}" )]
    DecodeFailure( String ),
}


/// Fully decoded audio, ready for output.
#[derive( Debug, Clone, PartialEq )]
pub struct DecodedBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
    duration: f64,
}


impl DecodedBuffer {
    /// Wraps interleaved samples. Duration follows from the frame count.
    pub fn new( samples: Vec<f32>, sample_rate: u32, channels: usize ) -> Self {
        let sample_rate = sample_rate.max( 1 );
        let channels = channels.max( 1 );
        let frames = samples.len() / channels;
        Self {
            samples,
            sample_rate,
            channels,
            duration: frames as f64 / sample_rate as f64,
        }
    }


    /// A silent buffer of the given length.
    pub fn silence( duration_secs: f64, sample_rate: u32, channels: usize ) -> Self {
        let frames = ( duration_secs.max( 0.0 ) * sample_rate as f64 ).round() as usize;
        Self::new( vec![ 0.0; frames * channels.max( 1 ) ], sample_rate, channels )
    }


    /// Interleaved samples.
    pub fn samples( &self ) -> &[f32] {
        &self.samples
    }


    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    pub fn channels( &self ) -> usize {
        self.channels
    }


    pub fn frames( &self ) -> usize {
        self.samples.len() / self.channels
    }


    /// Duration in seconds.
    pub fn duration( &self ) -> f64 {
        self.duration
    }
}


/// Pending result of a decode request.
pub type DecodeFuture = Pin<Box<dyn Future<Output = Result<DecodedBuffer, DecodeError>> + Send>>;


/// Produces decoded buffers from track sources.
///
/// Implementations never retry; the caller decides what to do with a failure.
pub trait TrackDecoder: Send + Sync {
    fn decode( &self, source: &TrackSource ) -> DecodeFuture;
}


/// Decoder backed by Symphonia, running on tokio's blocking pool.
///
/// With a target rate set, buffers are resampled in the same blocking task
/// so they arrive ready for the device.
#[derive( Debug, Clone, Copy, Default )]
pub struct SymphoniaDecoder {
    target_rate: Option<u32>,
}


impl SymphoniaDecoder {
    pub fn new( target_rate: Option<u32> ) -> Self {
        Self { target_rate }
    }
}


impl TrackDecoder for SymphoniaDecoder {
    fn decode( &self, source: &TrackSource ) -> DecodeFuture {
        let source = source.clone();
        let target_rate = self.target_rate;
        Box::pin( async move {
            let task = tokio::task::spawn_blocking( move || {
                decode_source( &source ).map( |buffer| conform( buffer, target_rate ) )
            });
            task.await
                .map_err( |e| DecodeError::DecodeFailure( format!( "decode task aborted: {}", e ) ) )?
        })
    }
}


/// Decodes any track source synchronously.
pub fn decode_source( source: &TrackSource ) -> Result<DecodedBuffer, DecodeError> {
    match source {
        TrackSource::Catalog( path ) => decode_file( path ),
        TrackSource::User { bytes, hint, .. } => {
            let data = read_bytes( bytes )?;
            decode_bytes( data, hint.as_deref() )
        }
    }
}


/// Opens and decodes a file from a catalog locator.
pub fn decode_file( path: &Path ) -> Result<DecodedBuffer, DecodeError> {
    let file = File::open( path )
        .map_err( |e| DecodeError::NotFound( format!( "{}: {}", path.display(), e ) ) )?;

    // Use larger buffer for network paths (SMB)
    let buffer_len = if path.starts_with( r"\\" ) {
        256 * 1024
    } else {
        64 * 1024
    };
    let mss = MediaSourceStream::new( Box::new( file ), MediaSourceStreamOptions { buffer_len } );

    let mut hint = Hint::new();
    if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
        hint.with_extension( ext );
    }

    decode_stream( mss, &hint )
}


/// Decodes in-memory bytes.
pub fn decode_bytes( data: Arc<[u8]>, extension: Option<&str> ) -> Result<DecodedBuffer, DecodeError> {
    let mss = MediaSourceStream::new( Box::new( Cursor::new( data ) ), MediaSourceStreamOptions::default() );

    let mut hint = Hint::new();
    if let Some( ext ) = extension {
        hint.with_extension( ext );
    }

    decode_stream( mss, &hint )
}


fn read_bytes( bytes: &ByteSource ) -> Result<Arc<[u8]>, DecodeError> {
    match bytes {
        ByteSource::Memory( data ) => Ok( Arc::clone( data ) ),
        ByteSource::File( path ) => fs::read( path )
            .map( Arc::from )
            .map_err( |e| DecodeError::UnreadableInput( format!( "{}: {}", path.display(), e ) ) ),
    }
}


fn decode_stream( mss: MediaSourceStream, hint: &Hint ) -> Result<DecodedBuffer, DecodeError> {
    let probed = symphonia::default::get_probe()
        .format( hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
        .map_err( |e| DecodeError::DecodeFailure( format!( "unsupported format: {}", e ) ) )?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
        .ok_or_else( || DecodeError::DecodeFailure( "no audio track found".into() ) )?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or( 44100 );
    let mut channels = track.codec_params.channels.map( |c| c.count() ).unwrap_or( 2 );

    let mut decoder = symphonia::default::get_codecs()
        .make( &track.codec_params, &DecoderOptions::default() )
        .map_err( |e| DecodeError::DecodeFailure( format!( "decoder creation failed: {}", e ) ) )?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format_reader.next_packet() {
            Ok( packet ) => packet,
            Err( SymphoniaError::IoError( ref e ) ) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err( SymphoniaError::ResetRequired ) => break,
            Err( e ) => return Err( DecodeError::DecodeFailure( e.to_string() ) ),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode( &packet ) {
            Ok( decoded ) => decoded,
            Err( SymphoniaError::DecodeError( e ) ) => {
                // Corrupt packets are recoverable
                tracing::debug!( "Skipping undecodable packet: {}", e );
                continue;
            }
            Err( e ) => return Err( DecodeError::DecodeFailure( e.to_string() ) ),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();
        if num_frames == 0 {
            continue;
        }
        sample_rate = spec.rate;
        channels = spec.channels.count();

        let needed = num_frames * channels;
        if sample_buf.as_ref().map_or( true, |b| b.capacity() < needed ) {
            sample_buf = Some( SampleBuffer::new( num_frames as u64, spec ) );
        }
        if let Some( buf ) = sample_buf.as_mut() {
            buf.copy_interleaved_ref( decoded );
            samples.extend_from_slice( buf.samples() );
        }
    }

    if channels == 0 {
        return Err( DecodeError::DecodeFailure( "stream reports zero channels".into() ) );
    }

    let buffer = DecodedBuffer::new( samples, sample_rate, channels );
    tracing::info!(
        "Decoded audio: {} Hz, {} channels, {:.2}s",
        buffer.sample_rate(),
        buffer.channels(),
        buffer.duration()
    );

    Ok( buffer )
}


#[cfg( test )]
pub( crate ) mod tests {
    use std::path::PathBuf;

    use super::*;


    /// Builds a 16-bit PCM WAV file in memory.
    pub( crate ) fn wav_bytes( sample_rate: u32, channels: u16, frames: usize ) -> Vec<u8> {
        let data_len = ( frames * channels as usize * 2 ) as u32;
        let mut out = Vec::with_capacity( 44 + data_len as usize );
        out.extend_from_slice( b"RIFF" );
        out.extend_from_slice( &( 36 + data_len ).to_le_bytes() );
        out.extend_from_slice( b"WAVE" );
        out.extend_from_slice( b"fmt " );
        out.extend_from_slice( &16u32.to_le_bytes() );
        out.extend_from_slice( &1u16.to_le_bytes() );
        out.extend_from_slice( &channels.to_le_bytes() );
        out.extend_from_slice( &sample_rate.to_le_bytes() );
        out.extend_from_slice( &( sample_rate * channels as u32 * 2 ).to_le_bytes() );
        out.extend_from_slice( &( channels * 2 ).to_le_bytes() );
        out.extend_from_slice( &16u16.to_le_bytes() );
        out.extend_from_slice( b"data" );
        out.extend_from_slice( &data_len.to_le_bytes() );
        for i in 0..frames * channels as usize {
            let sample = ( ( i % 64 ) as i16 - 32 ) * 256;
            out.extend_from_slice( &sample.to_le_bytes() );
        }
        out
    }


    #[test]
    fn test_buffer_duration_from_frames() {
        let buffer = DecodedBuffer::new( vec![ 0.0; 8000 ], 4000, 2 );
        assert_eq!( buffer.frames(), 4000 );
        assert_eq!( buffer.duration(), 1.0 );
    }


    #[test]
    fn test_silence_length() {
        let buffer = DecodedBuffer::silence( 2.5, 100, 1 );
        assert_eq!( buffer.frames(), 250 );
        assert_eq!( buffer.duration(), 2.5 );
    }


    #[test]
    fn test_decode_wav_bytes() {
        let data: Arc<[u8]> = Arc::from( wav_bytes( 8000, 1, 16000 ) );
        let buffer = decode_bytes( data, Some( "wav" ) ).unwrap();
        assert_eq!( buffer.sample_rate(), 8000 );
        assert_eq!( buffer.channels(), 1 );
        assert!( ( buffer.duration() - 2.0 ).abs() < 1e-6 );
    }


    #[test]
    fn test_decode_stereo_wav_without_hint() {
        let data: Arc<[u8]> = Arc::from( wav_bytes( 22050, 2, 22050 ) );
        let buffer = decode_bytes( data, None ).unwrap();
        assert_eq!( buffer.channels(), 2 );
        assert!( ( buffer.duration() - 1.0 ).abs() < 1e-6 );
    }


    #[test]
    fn test_garbage_is_decode_failure() {
        let data: Arc<[u8]> = Arc::from( vec![ 0x42u8; 512 ] );
        let result = decode_bytes( data, None );
        assert!( matches!( result, Err( DecodeError::DecodeFailure( _ ) ) ) );
    }


    #[test]
    fn test_missing_catalog_file_is_not_found() {
        let result = decode_file( Path::new( "/definitely/not/here/track.ogg" ) );
        assert!( matches!( result, Err( DecodeError::NotFound( _ ) ) ) );
    }


    #[test]
    fn test_unreadable_user_file() {
        let source = TrackSource::User {
            id: 1,
            bytes: ByteSource::File( PathBuf::from( "/definitely/not/here/upload.mp3" ) ),
            hint: Some( "mp3".into() ),
        };
        let result = decode_source( &source );
        assert!( matches!( result, Err( DecodeError::UnreadableInput( _ ) ) ) );
    }


    #[test]
    fn test_decode_catalog_file() {
        let path = std::env::temp_dir().join( format!( "tonearm-decoder-{}.wav", std::process::id() ) );
        fs::write( &path, wav_bytes( 8000, 2, 4000 ) ).unwrap();

        let result = decode_source( &TrackSource::Catalog( path.clone() ) );
        let _ = fs::remove_file( &path );

        let buffer = result.unwrap();
        assert!( ( buffer.duration() - 0.5 ).abs() < 1e-6 );
    }


    #[tokio::test]
    async fn test_symphonia_decoder_async() {
        let source = TrackSource::User {
            id: 3,
            bytes: ByteSource::Memory( Arc::from( wav_bytes( 8000, 1, 800 ) ) ),
            hint: Some( "wav".into() ),
        };
        let buffer = SymphoniaDecoder::default().decode( &source ).await.unwrap();
        assert_eq!( buffer.sample_rate(), 8000 );
        assert!( ( buffer.duration() - 0.1 ).abs() < 1e-6 );
    }


    #[tokio::test]
    async fn test_symphonia_decoder_resamples_to_target() {
        let source = TrackSource::User {
            id: 4,
            bytes: ByteSource::Memory( Arc::from( wav_bytes( 8000, 2, 8000 ) ) ),
            hint: Some( "wav".into() ),
        };
        let buffer = SymphoniaDecoder::new( Some( 48000 ) ).decode( &source ).await.unwrap();
        assert_eq!( buffer.sample_rate(), 48000 );
        assert_eq!( buffer.channels(), 2 );
        assert!( ( buffer.duration() - 1.0 ).abs() < 0.05 );
    }
}
