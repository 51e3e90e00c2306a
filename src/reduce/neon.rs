use std::arch::aarch64::*;

use super::DotReduce;

const LANES: usize = 8;

/// NEON reduction: 8 lanes per grant, sign-extended with `sxtl`, offset in 16-bit lanes,
/// then widening multiply-accumulate into 32-bit (int8 path) or pairwise-accumulate into
/// 64-bit (int16 path) lanes.
#[derive(Debug)]
pub struct NeonReduce;

static NEON: NeonReduce = NeonReduce;

impl NeonReduce {
    // NEON is mandatory on aarch64.
    pub fn instance() -> &'static NeonReduce { &NEON }
}

impl DotReduce for NeonReduce {
    fn name(&self) -> &'static str { "neon" }

    fn dot_i8(&self, input: &[i8], filter: &[i8], input_offset: i32) -> i32 {
        assert_eq!(input.len(), filter.len());
        debug_assert!((-255..=255).contains(&input_offset), "input_offset {} exceeds 16-bit lanes", input_offset);
        // SAFETY: NEON is part of the aarch64 baseline and both slices have equal length.
        unsafe { dot_i8_neon(input, filter, input_offset as i16) }
    }

    fn dot_i16(&self, input: &[i16], filter: &[i8]) -> i64 {
        assert_eq!(input.len(), filter.len());
        // SAFETY: see dot_i8.
        unsafe { dot_i16_neon(input, filter) }
    }
}

#[target_feature(enable = "neon")]
unsafe fn dot_i8_neon(input: &[i8], filter: &[i8], offset: i16) -> i32 {
    let voff = vdupq_n_s16(offset);
    let mut acc = vdupq_n_s32(0);
    let mut tail_in = [0i8; LANES];
    let mut tail_fl = [0i8; LANES];
    let mut pos = 0usize;
    let mut remaining = input.len();
    while remaining > 0 {
        let vl = remaining.min(LANES);
        let (pin, pfl) = if vl == LANES {
            (input.as_ptr().add(pos), filter.as_ptr().add(pos))
        } else {
            tail_in[..vl].copy_from_slice(&input[pos..pos + vl]);
            tail_fl[..vl].copy_from_slice(&filter[pos..pos + vl]);
            (tail_in.as_ptr(), tail_fl.as_ptr())
        };
        let win = vaddq_s16(vmovl_s8(vld1_s8(pin)), voff);
        let wfl = vmovl_s8(vld1_s8(pfl));
        acc = vmlal_s16(acc, vget_low_s16(win), vget_low_s16(wfl));
        acc = vmlal_s16(acc, vget_high_s16(win), vget_high_s16(wfl));
        pos += vl;
        remaining -= vl;
    }
    vaddvq_s32(acc)
}

#[target_feature(enable = "neon")]
unsafe fn dot_i16_neon(input: &[i16], filter: &[i8]) -> i64 {
    let mut acc = vdupq_n_s64(0);
    let mut tail_in = [0i16; LANES];
    let mut tail_fl = [0i8; LANES];
    let mut pos = 0usize;
    let mut remaining = input.len();
    while remaining > 0 {
        let vl = remaining.min(LANES);
        let (pin, pfl) = if vl == LANES {
            (input.as_ptr().add(pos), filter.as_ptr().add(pos))
        } else {
            tail_in[..vl].copy_from_slice(&input[pos..pos + vl]);
            tail_fl[..vl].copy_from_slice(&filter[pos..pos + vl]);
            (tail_in.as_ptr(), tail_fl.as_ptr())
        };
        let vin = vld1q_s16(pin);
        let wfl = vmovl_s8(vld1_s8(pfl));
        acc = vpadalq_s32(acc, vmull_s16(vget_low_s16(vin), vget_low_s16(wfl)));
        acc = vpadalq_s32(acc, vmull_s16(vget_high_s16(vin), vget_high_s16(wfl)));
        pos += vl;
        remaining -= vl;
    }
    vaddvq_s64(acc)
}
