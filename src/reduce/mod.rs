//! Inner-product reductions over the input-channel run of one filter tap.
//!
//! Every backend computes exactly the same integer sum; they differ only in how the
//! run is cut into vectors. The vector backends follow a request/grant loop: ask for
//! a vector length up to what remains, take whatever length the unit grants, widen the
//! lanes, reduce, advance by the granted length.
use std::str::FromStr;
use std::sync::OnceLock;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod strip;
pub use strip::{StripMined, MAX_VLEN};

#[cfg(all(target_arch = "x86_64", feature = "simd-avx2"))]
mod avx2;
#[cfg(all(target_arch = "x86_64", feature = "simd-avx2"))]
pub use avx2::Avx2Reduce;

#[cfg(all(target_arch = "aarch64", feature = "simd-neon"))]
mod neon;
#[cfg(all(target_arch = "aarch64", feature = "simd-neon"))]
pub use neon::NeonReduce;

/// Dot-product strategy used by the convolution kernel.
///
/// Implementations must agree bit-for-bit with [`ScalarReduce`] for every input the
/// kernel's contract admits (`input_offset` in `-255..=255`, `input.len() == filter.len()`).
pub trait DotReduce: Send + Sync {
    fn name(&self) -> &'static str;

    /// `sum((input[i] + input_offset) * filter[i])`
    fn dot_i8(&self, input: &[i8], filter: &[i8], input_offset: i32) -> i32;

    /// `sum(input[i] * filter[i])`, no offset.
    fn dot_i16(&self, input: &[i16], filter: &[i8]) -> i64;
}

/// Reference loop, one element at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarReduce;

impl DotReduce for ScalarReduce {
    fn name(&self) -> &'static str { "scalar" }

    fn dot_i8(&self, input: &[i8], filter: &[i8], input_offset: i32) -> i32 {
        debug_assert_eq!(input.len(), filter.len());
        let mut acc: i32 = 0;
        for i in 0..input.len() {
            acc += (input[i] as i32 + input_offset) * filter[i] as i32;
        }
        acc
    }

    fn dot_i16(&self, input: &[i16], filter: &[i8]) -> i64 {
        debug_assert_eq!(input.len(), filter.len());
        let mut acc: i64 = 0;
        for i in 0..input.len() {
            acc += (input[i] as i64) * (filter[i] as i64);
        }
        acc
    }
}

static SCALAR: ScalarReduce = ScalarReduce;
static STRIP: StripMined = StripMined::DEFAULT;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown reduction backend '{0}' (expected auto, scalar, strip, avx2 or neon)")]
pub struct UnknownBackend(pub String);

/// Backend selector for callers that pick one by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Auto,
    Scalar,
    Strip,
    Avx2,
    Neon,
}

impl Backend {
    /// `None` when the backend was not compiled in or the CPU lacks it.
    pub fn resolve(self) -> Option<&'static dyn DotReduce> {
        match self {
            Backend::Auto => Some(detect()),
            Backend::Scalar => Some(&SCALAR),
            Backend::Strip => Some(&STRIP),
            Backend::Avx2 => avx2_backend(),
            Backend::Neon => neon_backend(),
        }
    }
}

impl FromStr for Backend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Backend::Auto),
            "scalar" => Ok(Backend::Scalar),
            "strip" | "strip-mined" => Ok(Backend::Strip),
            "avx2" => Ok(Backend::Avx2),
            "neon" => Ok(Backend::Neon),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

fn avx2_backend() -> Option<&'static dyn DotReduce> {
    #[cfg(all(target_arch = "x86_64", feature = "simd-avx2"))]
    {
        if let Some(r) = Avx2Reduce::instance() {
            return Some(r);
        }
    }
    None
}

fn neon_backend() -> Option<&'static dyn DotReduce> {
    #[cfg(all(target_arch = "aarch64", feature = "simd-neon"))]
    let found: Option<&'static dyn DotReduce> = Some(NeonReduce::instance());
    #[cfg(not(all(target_arch = "aarch64", feature = "simd-neon")))]
    let found: Option<&'static dyn DotReduce> = None;
    found
}

/// Best backend for this machine: native SIMD when compiled in and supported,
/// otherwise the portable strip-mined loop. Resolved once per process.
pub fn detect() -> &'static dyn DotReduce {
    static SELECTED: OnceLock<&'static dyn DotReduce> = OnceLock::new();
    *SELECTED.get_or_init(|| {
        let chosen = avx2_backend().or_else(neon_backend).unwrap_or(&STRIP);
        debug!("reduction backend: {}", chosen.name());
        chosen
    })
}
