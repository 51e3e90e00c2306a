//! JSON description of one convolution layer, used by the `qconv` binary and benches.
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::conv::{ConvParams, ConvVariant, Int16Conv, Int8Conv};
use crate::quant::ChannelRescale;
use crate::tensor::Shape4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Int8,
    Int16,
}

impl Precision {
    /// Values the output element type can hold.
    pub fn output_range(self) -> (i32, i32) {
        match self {
            Precision::Int8 => (Int8Conv::OUT_MIN, Int8Conv::OUT_MAX),
            Precision::Int16 => (Int16Conv::OUT_MIN, Int16Conv::OUT_MAX),
        }
    }
}

/// Real-valued scales from which the per-channel rescale table is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scales {
    pub input: f64,
    pub filter: Vec<f64>,
    pub output: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    #[serde(default = "default_precision")]
    pub precision: Precision,
    /// `[batch, height, width, in_channels]`
    pub input: [usize; 4],
    /// `[out_channels, kernel_h, kernel_w, in_channels]`
    pub filter: [usize; 4],
    #[serde(default)]
    pub params: ConvParams,
    #[serde(default = "default_bias")]
    pub bias: bool,
    /// Identity rescale on every channel when absent.
    #[serde(default)]
    pub scales: Option<Scales>,
}

fn default_precision() -> Precision { Precision::Int8 }
fn default_bias() -> bool { true }

impl Default for LayerConfig {
    /// A mid-network 3x3 layer of a 96x96 greyscale person detector.
    fn default() -> Self {
        Self {
            precision: Precision::Int8,
            input: [1, 48, 48, 16],
            filter: [32, 3, 3, 16],
            params: ConvParams { pad_h: 1, pad_w: 1, input_offset: 128, output_offset: -128, ..Default::default() }
                .with_int8_range(),
            bias: true,
            scales: Some(Scales { input: 0.02, filter: vec![0.004; 32], output: 0.05 }),
        }
    }
}

impl LayerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("read layer config: {}", path.as_ref().display()))?;
        let mut cfg: LayerConfig = serde_json::from_str(&text).context("parse layer config")?;
        cfg.narrow_activation_range();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Intersects the activation clamp with the precision's output range, so omitted
    /// bounds saturate at the output type instead of wrapping.
    pub fn narrow_activation_range(&mut self) {
        let (lo, hi) = self.precision.output_range();
        self.params.activation_min = self.params.activation_min.max(lo);
        self.params.activation_max = self.params.activation_max.min(hi);
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.params;
        if self.input[3] != self.filter[3] {
            bail!("input channels {} != filter channels {}", self.input[3], self.filter[3]);
        }
        if self.filter.iter().any(|&d| d == 0) {
            bail!("filter dims must be non-zero: {:?}", self.filter);
        }
        if p.stride_h == 0 || p.stride_w == 0 || p.dilation_h == 0 || p.dilation_w == 0 {
            bail!("stride and dilation must be positive");
        }
        if p.activation_min > p.activation_max {
            bail!("activation range [{}, {}] is empty", p.activation_min, p.activation_max);
        }
        let (lo, hi) = self.precision.output_range();
        if p.activation_min < lo || p.activation_max > hi {
            bail!("activation range [{}, {}] exceeds {:?} output [{}, {}]", p.activation_min, p.activation_max, self.precision, lo, hi);
        }
        if self.precision == Precision::Int8 && !(-255..=255).contains(&p.input_offset) {
            bail!("input_offset {} outside -255..=255", p.input_offset);
        }
        let depth = self.filter[1] * self.filter[2] * self.filter[3];
        if self.precision == Precision::Int8 && depth >= 1 << 16 {
            bail!("reduction depth {} can overflow the 32-bit accumulator", depth);
        }
        if let Some(s) = &self.scales {
            if s.filter.len() != self.filter[0] {
                bail!("{} filter scales for {} output channels", s.filter.len(), self.filter[0]);
            }
        }
        Ok(())
    }

    pub fn input_shape(&self) -> Shape4 {
        let [b, h, w, c] = self.input;
        Shape4::new(b, h, w, c)
    }

    pub fn filter_shape(&self) -> Shape4 {
        let [o, h, w, c] = self.filter;
        Shape4::new(o, h, w, c)
    }

    pub fn output_shape(&self) -> Shape4 {
        self.params.output_shape(&self.input_shape(), &self.filter_shape())
    }

    pub fn rescale(&self) -> Result<ChannelRescale> {
        match &self.scales {
            Some(s) => ChannelRescale::from_scales(s.input, &s.filter, s.output).context("derive rescale table"),
            None => Ok(ChannelRescale::identity(self.filter[0])),
        }
    }

    /// Multiply-accumulates per call, counting padded taps.
    pub fn macs(&self) -> u64 {
        let out = self.output_shape();
        (out.flat_size() * self.filter[1] * self.filter[2] * self.filter[3]) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layer_is_valid() {
        let cfg = LayerConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.output_shape(), Shape4::new(1, 48, 48, 32));
        assert_eq!(cfg.rescale().unwrap().multiplier.len(), 32);
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let mut cfg: LayerConfig = serde_json::from_str(r#"{"input":[1,4,4,1],"filter":[1,3,3,1],"params":{"pad_h":1,"pad_w":1}}"#).unwrap();
        assert_eq!(cfg.precision, Precision::Int8);
        assert!(cfg.bias);
        assert_eq!(cfg.params.stride_h, 1);
        // Omitted bounds are the full i32 range until narrowed to the output type.
        assert!(cfg.validate().is_err());
        cfg.narrow_activation_range();
        cfg.validate().unwrap();
        assert_eq!((cfg.params.activation_min, cfg.params.activation_max), (-128, 127));
        assert_eq!(cfg.output_shape(), Shape4::new(1, 4, 4, 1));
        assert_eq!(cfg.rescale().unwrap(), ChannelRescale::identity(1));
    }

    #[test]
    fn narrowing_keeps_tighter_bounds() {
        let mut cfg = LayerConfig { precision: Precision::Int16, ..LayerConfig::default() };
        cfg.params.activation_min = 0;
        cfg.params.activation_max = i32::MAX;
        cfg.narrow_activation_range();
        assert_eq!((cfg.params.activation_min, cfg.params.activation_max), (0, 32767));
    }

    #[test]
    fn channel_mismatch_is_rejected() {
        let mut cfg = LayerConfig::default();
        cfg.filter[3] = 8;
        assert!(cfg.validate().is_err());
    }
}
