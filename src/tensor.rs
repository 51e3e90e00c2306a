use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TensorError {
    #[error("buffer holds {got} elements but shape {shape:?} needs {want}")]
    LengthMismatch { shape: [usize; 4], want: usize, got: usize },
}

/// Rank-4 NHWC shape. Filters reuse it as `[out_c, kernel_h, kernel_w, in_c]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape4 {
    pub dims: [usize; 4],
}

impl Shape4 {
    pub const fn new(batch: usize, height: usize, width: usize, channels: usize) -> Self {
        Self { dims: [batch, height, width, channels] }
    }

    #[inline]
    pub fn dim(&self, i: usize) -> usize { self.dims[i] }

    #[inline]
    pub fn batch(&self) -> usize { self.dims[0] }
    #[inline]
    pub fn height(&self) -> usize { self.dims[1] }
    #[inline]
    pub fn width(&self) -> usize { self.dims[2] }
    #[inline]
    pub fn channels(&self) -> usize { self.dims[3] }

    pub fn flat_size(&self) -> usize { self.dims.iter().product() }

    /// Row-major, channel-last element offset.
    #[inline]
    pub fn offset(&self, b: usize, y: usize, x: usize, c: usize) -> usize {
        debug_assert!(b < self.dims[0] && y < self.dims[1] && x < self.dims[2] && c < self.dims[3],
            "index ({}, {}, {}, {}) out of shape {:?}", b, y, x, c, self.dims);
        ((b * self.dims[1] + y) * self.dims[2] + x) * self.dims[3] + c
    }
}

/// Returns the dimension shared by two shapes, asserting (debug only) that they agree.
#[inline]
pub fn matching_dim(a: &Shape4, ai: usize, b: &Shape4, bi: usize) -> usize {
    debug_assert_eq!(a.dim(ai), b.dim(bi), "dimension mismatch: {:?}[{}] vs {:?}[{}]", a.dims, ai, b.dims, bi);
    a.dim(ai)
}

#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a, T> {
    pub shape: Shape4,
    pub data: &'a [T],
}

impl<'a, T> TensorView<'a, T> {
    pub fn new(shape: Shape4, data: &'a [T]) -> Result<Self, TensorError> {
        check_len(&shape, data.len())?;
        Ok(Self { shape, data })
    }

    /// Contiguous channel run starting at `(b, y, x, 0)`.
    #[inline]
    pub fn pixel(&self, b: usize, y: usize, x: usize) -> &'a [T] {
        let start = self.shape.offset(b, y, x, 0);
        &self.data[start..start + self.shape.channels()]
    }
}

#[derive(Debug)]
pub struct TensorViewMut<'a, T> {
    pub shape: Shape4,
    pub data: &'a mut [T],
}

impl<'a, T> TensorViewMut<'a, T> {
    pub fn new(shape: Shape4, data: &'a mut [T]) -> Result<Self, TensorError> {
        check_len(&shape, data.len())?;
        Ok(Self { shape, data })
    }

    pub fn as_view(&self) -> TensorView<'_, T> {
        TensorView { shape: self.shape, data: &self.data[..] }
    }
}

fn check_len(shape: &Shape4, got: usize) -> Result<(), TensorError> {
    let want = shape.flat_size();
    if want != got {
        return Err(TensorError::LengthMismatch { shape: shape.dims, want, got });
    }
    Ok(())
}
