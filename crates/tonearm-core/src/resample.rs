//! Sample-rate conversion via rubato
//!
//! Whole buffers are converted once, off the event loop, so the output
//! callback only ever copies frames.

use rubato::{ FastFixedIn, PolynomialDegree, Resampler };
use thiserror::Error;

use crate::decoder::DecodedBuffer;


/// Frames per resampler chunk.
const RESAMPLE_CHUNK: usize = 1024;


/// Errors that can occur while converting sample rates.
#[derive( Debug, Error )]
pub enum ResampleError {
    #[error( "Failed to create resampler: {0}" )]
    Construction( String ),

    #[error( "Resampling failed: {0}" )]
    Process( String ),
}


/// Converts planar samples back to interleaved format.
/// [[L0, L1, ...], [R0, R1, ...]] → [L0, R0, L1, R1, ...]
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    if channels.is_empty() || channels[ 0 ].is_empty() {
        return Vec::new();
    }
    let frames = channels[ 0 ].len();
    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        for ch in channels {
            out.push( ch[ f ] );
        }
    }
    out
}


/// [L0, R0, L1, R1, ...] → [[L0, L1, ...], [R0, R1, ...]]
fn deinterleave( samples: &[f32], channels: usize ) -> Vec<Vec<f32>> {
    let mut planar: Vec<Vec<f32>> = ( 0..channels )
        .map( |_| Vec::with_capacity( samples.len() / channels ) )
        .collect();
    for frame in samples.chunks_exact( channels ) {
        for ( ch, sample ) in frame.iter().enumerate() {
            planar[ ch ].push( *sample );
        }
    }
    planar
}


/// Converts a whole buffer to `target_rate`.
pub fn resample( buffer: &DecodedBuffer, target_rate: u32 ) -> Result<DecodedBuffer, ResampleError> {
    let channels = buffer.channels();
    let frames = buffer.frames();
    let ratio = target_rate as f64 / buffer.sample_rate() as f64;

    let mut resampler = FastFixedIn::<f32>::new(
        ratio,
        1.0,
        PolynomialDegree::Cubic,
        RESAMPLE_CHUNK,
        channels,
    ).map_err( |e| ResampleError::Construction( e.to_string() ) )?;

    let planar = deinterleave( buffer.samples(), channels );
    let mut out = Vec::with_capacity( ( frames as f64 * ratio ) as usize * channels );
    let mut pos = 0;

    while frames - pos >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let chunk: Vec<&[f32]> = planar.iter().map( |ch| &ch[ pos..pos + needed ] ).collect();
        let resampled = resampler
            .process( chunk.as_slice(), None )
            .map_err( |e| ResampleError::Process( e.to_string() ) )?;
        out.extend( interleave( &resampled ) );
        pos += needed;
    }

    if pos < frames {
        let rest: Vec<&[f32]> = planar.iter().map( |ch| &ch[ pos.. ] ).collect();
        let resampled = resampler
            .process_partial( Some( rest.as_slice() ), None )
            .map_err( |e| ResampleError::Process( e.to_string() ) )?;
        out.extend( interleave( &resampled ) );
    }

    Ok( DecodedBuffer::new( out, target_rate, channels ) )
}


/// Brings `buffer` to `target_rate` if one is given and differs. A buffer
/// that fails to convert is kept at its native rate.
pub fn conform( buffer: DecodedBuffer, target_rate: Option<u32> ) -> DecodedBuffer {
    let Some( rate ) = target_rate.filter( |r| *r != buffer.sample_rate() ) else {
        return buffer;
    };

    tracing::info!( "Resampling: {} Hz → {} Hz", buffer.sample_rate(), rate );
    match resample( &buffer, rate ) {
        Ok( resampled ) => resampled,
        Err( e ) => {
            tracing::warn!( "{} - keeping source rate, speed may be incorrect", e );
            buffer
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_interleave_roundtrip_shape() {
        let planar = deinterleave( &[0.0, 1.0, 2.0, 3.0], 2 );
        assert_eq!( planar, vec![ vec![ 0.0, 2.0 ], vec![ 1.0, 3.0 ] ] );
        assert_eq!( interleave( &planar ), vec![ 0.0, 1.0, 2.0, 3.0 ] );
    }


    #[test]
    fn test_resample_doubles_rate() {
        let buffer = DecodedBuffer::silence( 1.0, 8000, 2 );
        let resampled = resample( &buffer, 16000 ).unwrap();
        assert_eq!( resampled.sample_rate(), 16000 );
        assert_eq!( resampled.channels(), 2 );
        assert!( resampled.frames() > 15000 );
    }


    #[test]
    fn test_conform_leaves_matching_rate_alone() {
        let buffer = DecodedBuffer::silence( 0.5, 8000, 1 );
        assert_eq!( conform( buffer.clone(), Some( 8000 ) ), buffer );
        assert_eq!( conform( buffer.clone(), None ), buffer );
    }


    #[test]
    fn test_conform_converts_to_target() {
        let buffer = DecodedBuffer::silence( 0.5, 8000, 1 );
        let converted = conform( buffer, Some( 24000 ) );
        assert_eq!( converted.sample_rate(), 24000 );
        assert!( ( converted.duration() - 0.5 ).abs() < 0.05 );
    }
}
