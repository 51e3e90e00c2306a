//! Glue between camera frames and the model's int8 input tensor.
use log::debug;
use thiserror::Error;

use crate::tensor::TensorViewMut;
use crate::vcopy::vcopy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame {width}x{height} is taller than it is wide")]
    NotLandscape { width: usize, height: usize },
    #[error("source holds {got} bytes, expected {want}")]
    SourceSize { want: usize, got: usize },
    #[error("destination holds {got} bytes, expected {want}")]
    DestSize { want: usize, got: usize },
}

/// Copies the horizontally centred `height x height` window of a packed
/// `width x height` frame into `dst`, one row per bulk copy.
pub fn crop_center_square(
    src: &[u8],
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
    dst: &mut [u8],
) -> Result<(), FrameError> {
    if width < height {
        return Err(FrameError::NotLandscape { width, height });
    }
    let row_bytes = width * bytes_per_pixel;
    let crop_bytes = height * bytes_per_pixel;
    if src.len() != row_bytes * height {
        return Err(FrameError::SourceSize { want: row_bytes * height, got: src.len() });
    }
    if dst.len() != crop_bytes * height {
        return Err(FrameError::DestSize { want: crop_bytes * height, got: dst.len() });
    }
    if crop_bytes == 0 {
        return Ok(());
    }
    let x0 = (width - height) / 2 * bytes_per_pixel;
    for (y, out_row) in dst.chunks_exact_mut(crop_bytes).enumerate() {
        let start = y * row_bytes + x0;
        vcopy(out_row, &src[start..start + crop_bytes], crop_bytes);
    }
    debug!("cropped {}x{} frame to {}x{}", width, height, height, height);
    Ok(())
}

/// Maps unsigned grey pixels into the signed input domain (`p - 128`).
pub fn to_signed_input(gray: &[u8], input: &mut TensorViewMut<'_, i8>) -> Result<(), FrameError> {
    if gray.len() != input.data.len() {
        return Err(FrameError::SourceSize { want: input.data.len(), got: gray.len() });
    }
    for (dst, &p) in input.data.iter_mut().zip(gray) {
        *dst = (p ^ 0x80) as i8;
    }
    Ok(())
}
