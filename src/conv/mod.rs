//! Per-channel quantized 2D convolution over NHWC tensors.
//!
//! Contract violations (shape mismatches, an activation range that is empty or wider than
//! the output type, rescale
//! tables of the wrong length) are checked with debug assertions only. The int8 path
//! accumulates in `i32`, which is exact as long as `kernel_h * kernel_w * in_channels`
//! stays below 2^16; that bound is the caller's responsibility.
use log::trace;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::quant::PerChannelQuant;
use crate::reduce::{self, DotReduce};
use crate::tensor::{matching_dim, Shape4, TensorView, TensorViewMut};

mod variant;
pub use variant::{ConvVariant, Int16Conv, Int8Conv};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvParams {
    pub stride_h: usize,
    pub stride_w: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub pad_h: usize,
    pub pad_w: usize,
    /// Added to every input value before the multiply (int8 only).
    pub input_offset: i32,
    /// Added after requantization (int8 only).
    pub output_offset: i32,
    pub activation_min: i32,
    pub activation_max: i32,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            stride_h: 1,
            stride_w: 1,
            dilation_h: 1,
            dilation_w: 1,
            pad_h: 0,
            pad_w: 0,
            input_offset: 0,
            output_offset: 0,
            activation_min: i32::MIN,
            activation_max: i32::MAX,
        }
    }
}

impl ConvParams {
    pub fn with_int8_range(mut self) -> Self {
        self.activation_min = i8::MIN as i32;
        self.activation_max = i8::MAX as i32;
        self
    }

    pub fn with_int16_range(mut self) -> Self {
        self.activation_min = i16::MIN as i32;
        self.activation_max = i16::MAX as i32;
        self
    }

    /// Output shape the caller must allocate for `input` convolved with `filter`.
    pub fn output_shape(&self, input: &Shape4, filter: &Shape4) -> Shape4 {
        Shape4::new(
            input.batch(),
            conv_output_size(input.height(), filter.height(), self.stride_h, self.pad_h, self.dilation_h),
            conv_output_size(input.width(), filter.width(), self.stride_w, self.pad_w, self.dilation_w),
            filter.batch(),
        )
    }
}

/// `(in + 2*pad - dilation*(kernel-1) - 1) / stride + 1`, or 0 when the dilated kernel
/// does not fit in the padded input.
pub fn conv_output_size(in_size: usize, kernel: usize, stride: usize, pad: usize, dilation: usize) -> usize {
    debug_assert!(stride > 0 && dilation > 0 && kernel > 0);
    let effective = dilation * (kernel - 1) + 1;
    let padded = in_size + 2 * pad;
    if padded < effective {
        return 0;
    }
    (padded - effective) / stride + 1
}

/// Everything one output row needs, borrowed for the duration of a call.
struct Layer<'a, V: ConvVariant, R: ?Sized> {
    reducer: &'a R,
    params: &'a ConvParams,
    quant: &'a PerChannelQuant<'a>,
    input: &'a TensorView<'a, V::Input>,
    filter: &'a TensorView<'a, i8>,
    bias: Option<&'a [V::Bias]>,
    out_shape: Shape4,
}

impl<'a, V: ConvVariant, R: DotReduce + ?Sized> Layer<'a, V, R> {
    fn check(&self, output_len: usize) {
        let p = self.params;
        debug_assert!(p.activation_min <= p.activation_max,
            "activation range [{}, {}] is empty", p.activation_min, p.activation_max);
        debug_assert!(p.activation_min >= V::OUT_MIN && p.activation_max <= V::OUT_MAX,
            "activation range [{}, {}] exceeds {} output [{}, {}]",
            p.activation_min, p.activation_max, V::NAME, V::OUT_MIN, V::OUT_MAX);
        debug_assert_eq!(self.input.data.len(), self.input.shape.flat_size(), "input buffer length");
        debug_assert_eq!(self.filter.data.len(), self.filter.shape.flat_size(), "filter buffer length");
        debug_assert_eq!(output_len, self.out_shape.flat_size(), "output buffer length");
        debug_assert!(p.stride_h > 0 && p.stride_w > 0 && p.dilation_h > 0 && p.dilation_w > 0);
        matching_dim(&self.input.shape, 0, &self.out_shape, 0);
        matching_dim(&self.input.shape, 3, &self.filter.shape, 3);
        let output_depth = matching_dim(&self.filter.shape, 0, &self.out_shape, 3);
        if let Some(bias) = self.bias {
            debug_assert_eq!(bias.len(), output_depth, "bias length");
        }
        debug_assert_eq!(self.quant.len(), output_depth, "multiplier/shift length");
        if V::HAS_OFFSETS {
            debug_assert!((-255..=255).contains(&p.input_offset), "input_offset {} out of range", p.input_offset);
        }
    }

    /// Computes output row `row` (flattened over batch and output height).
    fn row(&self, row: usize, out_row: &mut [V::Output]) {
        let p = self.params;
        let (in_h, in_w) = (self.input.shape.height() as isize, self.input.shape.width() as isize);
        let (filter_h, filter_w) = (self.filter.shape.height(), self.filter.shape.width());
        let out_h = self.out_shape.height();
        let depth = self.out_shape.channels();
        let batch = row / out_h;
        let out_y = row % out_h;

        let in_y_origin = (out_y * p.stride_h) as isize - p.pad_h as isize;
        for out_x in 0..self.out_shape.width() {
            let in_x_origin = (out_x * p.stride_w) as isize - p.pad_w as isize;
            for out_c in 0..depth {
                let mut acc = V::Acc::default();
                for filter_y in 0..filter_h {
                    let in_y = in_y_origin + (p.dilation_h * filter_y) as isize;
                    for filter_x in 0..filter_w {
                        let in_x = in_x_origin + (p.dilation_w * filter_x) as isize;
                        // Zero padding: taps outside the image are skipped, not offset.
                        if in_x < 0 || in_x >= in_w || in_y < 0 || in_y >= in_h {
                            continue;
                        }
                        let pixel = self.input.pixel(batch, in_y as usize, in_x as usize);
                        let taps = self.filter.pixel(out_c, filter_y, filter_x);
                        acc += V::reduce(self.reducer, pixel, taps, p.input_offset);
                    }
                }
                if let Some(bias) = self.bias {
                    acc += bias[out_c].into();
                }
                let mut scaled = self.quant.requantize(out_c, acc.into());
                if V::HAS_OFFSETS {
                    scaled = scaled.saturating_add(p.output_offset);
                }
                let clamped = scaled.max(p.activation_min).min(p.activation_max);
                out_row[out_x * depth + out_c] = V::narrow(clamped);
            }
        }
    }

    fn row_len(&self) -> usize { self.out_shape.width() * self.out_shape.channels() }
}

/// Quantized convolution, one output row after another.
///
/// `output` must already have the shape given by [`ConvParams::output_shape`]; every
/// element is written exactly once.
pub fn conv_per_channel<V: ConvVariant, R: DotReduce + ?Sized>(
    reducer: &R,
    params: &ConvParams,
    quant: &PerChannelQuant<'_>,
    input: &TensorView<'_, V::Input>,
    filter: &TensorView<'_, i8>,
    bias: Option<&[V::Bias]>,
    output: &mut TensorViewMut<'_, V::Output>,
) {
    let layer = Layer::<V, R> { reducer, params, quant, input, filter, bias, out_shape: output.shape };
    layer.check(output.data.len());
    trace!("conv {} {:?} * {:?} -> {:?} via {}", V::NAME, input.shape.dims, filter.shape.dims, output.shape.dims, reducer.name());
    let row_len = layer.row_len();
    if row_len == 0 {
        return;
    }
    for (row, out_row) in output.data.chunks_exact_mut(row_len).enumerate() {
        layer.row(row, out_row);
    }
}

/// Same result as [`conv_per_channel`], with output rows spread over the rayon pool.
/// Each output element is still reduced in the same order by a single thread.
pub fn conv_per_channel_par<V: ConvVariant, R: DotReduce + ?Sized>(
    reducer: &R,
    params: &ConvParams,
    quant: &PerChannelQuant<'_>,
    input: &TensorView<'_, V::Input>,
    filter: &TensorView<'_, i8>,
    bias: Option<&[V::Bias]>,
    output: &mut TensorViewMut<'_, V::Output>,
) {
    let layer = Layer::<V, R> { reducer, params, quant, input, filter, bias, out_shape: output.shape };
    layer.check(output.data.len());
    trace!("parallel conv {} {:?} * {:?} -> {:?} via {}", V::NAME, input.shape.dims, filter.shape.dims, output.shape.dims, reducer.name());
    let row_len = layer.row_len();
    if row_len == 0 {
        return;
    }
    output
        .data
        .par_chunks_exact_mut(row_len)
        .enumerate()
        .for_each(|(row, out_row)| layer.row(row, out_row));
}

/// int8 convolution on the detected backend.
pub fn conv_i8(
    params: &ConvParams,
    quant: &PerChannelQuant<'_>,
    input: &TensorView<'_, i8>,
    filter: &TensorView<'_, i8>,
    bias: Option<&[i32]>,
    output: &mut TensorViewMut<'_, i8>,
) {
    conv_per_channel::<Int8Conv, _>(reduce::detect(), params, quant, input, filter, bias, output)
}

/// int16 x int8 convolution on the detected backend.
pub fn conv_i16(
    params: &ConvParams,
    quant: &PerChannelQuant<'_>,
    input: &TensorView<'_, i16>,
    filter: &TensorView<'_, i8>,
    bias: Option<&[i64]>,
    output: &mut TensorViewMut<'_, i16>,
) {
    conv_per_channel::<Int16Conv, _>(reduce::detect(), params, quant, input, filter, bias, output)
}
