use std::ops::AddAssign;

use crate::reduce::DotReduce;

/// Data-width specialization of the convolution kernel.
///
/// Padding, dilation, requantization and clamping live once in the kernel; a variant
/// only decides element types, accumulator width, which reduction to call, and whether
/// the zero-point offsets apply.
pub trait ConvVariant {
    type Input: Copy + Send + Sync;
    type Bias: Copy + Into<Self::Acc> + Send + Sync;
    type Acc: Copy + Default + AddAssign + Into<i64>;
    type Output: Copy + Send;

    /// Whether `input_offset` and `output_offset` take part in the computation.
    const HAS_OFFSETS: bool;
    const NAME: &'static str;
    /// Representable output range; the activation clamp must lie inside it.
    const OUT_MIN: i32;
    const OUT_MAX: i32;

    fn reduce<R: DotReduce + ?Sized>(reducer: &R, input: &[Self::Input], filter: &[i8], input_offset: i32) -> Self::Acc;

    /// Narrow an already clamped value.
    fn narrow(v: i32) -> Self::Output;
}

/// int8 activations, int8 weights, int32 bias and accumulator, asymmetric offsets.
#[derive(Debug, Clone, Copy)]
pub struct Int8Conv;

impl ConvVariant for Int8Conv {
    type Input = i8;
    type Bias = i32;
    type Acc = i32;
    type Output = i8;

    const HAS_OFFSETS: bool = true;
    const NAME: &'static str = "int8";
    const OUT_MIN: i32 = i8::MIN as i32;
    const OUT_MAX: i32 = i8::MAX as i32;

    #[inline]
    fn reduce<R: DotReduce + ?Sized>(reducer: &R, input: &[i8], filter: &[i8], input_offset: i32) -> i32 {
        reducer.dot_i8(input, filter, input_offset)
    }

    #[inline]
    fn narrow(v: i32) -> i8 { v as i8 }
}

/// int16 activations, int8 weights, int64 bias and accumulator, symmetric (no offsets).
#[derive(Debug, Clone, Copy)]
pub struct Int16Conv;

impl ConvVariant for Int16Conv {
    type Input = i16;
    type Bias = i64;
    type Acc = i64;
    type Output = i16;

    const HAS_OFFSETS: bool = false;
    const NAME: &'static str = "int16";
    const OUT_MIN: i32 = i16::MIN as i32;
    const OUT_MAX: i32 = i16::MAX as i32;

    #[inline]
    fn reduce<R: DotReduce + ?Sized>(reducer: &R, input: &[i16], filter: &[i8], _input_offset: i32) -> i64 {
        reducer.dot_i16(input, filter)
    }

    #[inline]
    fn narrow(v: i32) -> i16 { v as i16 }
}
