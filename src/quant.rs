/// Fixed-point requantization helpers and per-channel rescale parameters.
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum QuantError {
    #[error("rescale factor must be finite and non-negative, got {0}")]
    BadScale(f64),
    #[error("channel {channel}: {source}")]
    Channel { channel: usize, #[source] source: Box<QuantError> },
}

/// Scales `acc` by `multiplier * 2^shift / 2^31`.
///
/// `multiplier` is a Q31 value in `[0, 2^31)`; a positive `shift` is a left shift and a
/// negative one a right shift. The product is formed in `i128`, so both accumulator
/// widths go through exactly the same arithmetic, then rounded once, half away from
/// zero, and saturated to `i32`.
#[inline]
pub fn multiply_by_quantized_multiplier(acc: i64, multiplier: i32, shift: i32) -> i32 {
    debug_assert!(multiplier >= 0, "negative quantized multiplier {}", multiplier);
    debug_assert!((-31..=30).contains(&shift), "shift {} out of range", shift);
    let total_shift = (31 - shift) as u32;
    let prod = acc as i128 * multiplier as i128;
    let half = 1i128 << (total_shift - 1);
    let rounded = if prod >= 0 {
        (prod + half) >> total_shift
    } else {
        -((half - prod) >> total_shift)
    };
    rounded.clamp(i32::MIN as i128, i32::MAX as i128) as i32
}

/// Splits a real rescale factor into a Q31 multiplier and a power-of-two shift such that
/// `real ~= multiplier / 2^31 * 2^shift`.
pub fn quantize_multiplier(real: f64) -> Result<(i32, i32), QuantError> {
    if !real.is_finite() || real < 0.0 {
        return Err(QuantError::BadScale(real));
    }
    let bits = real.to_bits();
    let exp_bits = ((bits >> 52) & 0x7ff) as i32;
    // Zero and subnormals are far below the smallest representable shift.
    if exp_bits == 0 {
        return Ok((0, 0));
    }
    // frexp: mantissa in [0.5, 1)
    let mut shift = exp_bits - 1022;
    let mantissa = f64::from_bits((bits & !(0x7ffu64 << 52)) | (1022u64 << 52));
    let mut q = (mantissa * (1i64 << 31) as f64).round() as i64;
    if q == 1i64 << 31 {
        q /= 2;
        shift += 1;
    }
    if shift < -31 {
        return Ok((0, 0));
    }
    if shift > 30 {
        return Ok((i32::MAX, 30));
    }
    Ok((q as i32, shift))
}

/// Borrowed per-output-channel `(multiplier, shift)` arrays.
#[derive(Debug, Clone, Copy)]
pub struct PerChannelQuant<'a> {
    pub multiplier: &'a [i32],
    pub shift: &'a [i32],
}

impl<'a> PerChannelQuant<'a> {
    pub fn new(multiplier: &'a [i32], shift: &'a [i32]) -> Self {
        debug_assert_eq!(multiplier.len(), shift.len(), "multiplier/shift length mismatch");
        Self { multiplier, shift }
    }

    pub fn len(&self) -> usize { self.multiplier.len() }

    pub fn is_empty(&self) -> bool { self.multiplier.is_empty() }

    #[inline]
    pub fn requantize(&self, channel: usize, acc: i64) -> i32 {
        multiply_by_quantized_multiplier(acc, self.multiplier[channel], self.shift[channel])
    }
}

/// Owned rescale table, built once per layer by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRescale {
    pub multiplier: Vec<i32>,
    pub shift: Vec<i32>,
}

impl ChannelRescale {
    /// Rescale that leaves the accumulator unchanged on every channel.
    pub fn identity(channels: usize) -> Self {
        Self { multiplier: vec![1 << 30; channels], shift: vec![1; channels] }
    }

    /// Per-channel `input_scale * filter_scale[c] / output_scale`.
    pub fn from_scales(input_scale: f64, filter_scales: &[f64], output_scale: f64) -> Result<Self, QuantError> {
        let mut multiplier = Vec::with_capacity(filter_scales.len());
        let mut shift = Vec::with_capacity(filter_scales.len());
        for (channel, &fs) in filter_scales.iter().enumerate() {
            let (m, s) = quantize_multiplier(input_scale * fs / output_scale)
                .map_err(|e| QuantError::Channel { channel, source: Box::new(e) })?;
            multiplier.push(m);
            shift.push(s);
        }
        Ok(Self { multiplier, shift })
    }

    pub fn as_per_channel(&self) -> PerChannelQuant<'_> {
        PerChannelQuant::new(&self.multiplier, &self.shift)
    }
}
