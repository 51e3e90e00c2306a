// Per-channel quantized convolution with vector-length-negotiated reductions
pub mod tensor;
pub mod quant;
pub mod reduce;
pub mod conv;
pub mod vcopy;
pub mod frame;
pub mod config;

pub use conv::{conv_i16, conv_i8, conv_per_channel, conv_per_channel_par, ConvParams, ConvVariant, Int16Conv, Int8Conv};
pub use quant::{ChannelRescale, PerChannelQuant};
pub use reduce::{Backend, DotReduce};
pub use tensor::{Shape4, TensorView, TensorViewMut};
