use std::arch::x86_64::*;

use super::DotReduce;

const LANES: usize = 16;

/// AVX2 reduction: 16 lanes per grant, widened to 16-bit, multiplied pairwise into
/// 32-bit lanes with `vpmaddwd`. A grant shorter than 16 lanes is staged through a
/// zero-filled lane buffer; zero filter lanes add nothing whatever the input offset.
#[derive(Debug)]
pub struct Avx2Reduce {
    _detected: (),
}

static AVX2: Avx2Reduce = Avx2Reduce { _detected: () };

impl Avx2Reduce {
    /// The shared instance, handed out only on CPUs that report AVX2.
    pub fn instance() -> Option<&'static Avx2Reduce> {
        if is_x86_feature_detected!("avx2") { Some(&AVX2) } else { None }
    }
}

impl DotReduce for Avx2Reduce {
    fn name(&self) -> &'static str { "avx2" }

    fn dot_i8(&self, input: &[i8], filter: &[i8], input_offset: i32) -> i32 {
        assert_eq!(input.len(), filter.len());
        debug_assert!((-255..=255).contains(&input_offset), "input_offset {} exceeds 16-bit lanes", input_offset);
        // SAFETY: an Avx2Reduce is only reachable after AVX2 was detected, and both
        // slices have the same length.
        unsafe { dot_i8_avx2(input, filter, input_offset as i16) }
    }

    fn dot_i16(&self, input: &[i16], filter: &[i8]) -> i64 {
        assert_eq!(input.len(), filter.len());
        // SAFETY: see dot_i8.
        unsafe { dot_i16_avx2(input, filter) }
    }
}

#[target_feature(enable = "avx2")]
unsafe fn dot_i8_avx2(input: &[i8], filter: &[i8], offset: i16) -> i32 {
    let voff = _mm256_set1_epi16(offset);
    let mut acc = _mm256_setzero_si256();
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
        let win = _mm256_add_epi16(_mm256_cvtepi8_epi16(_mm_loadu_si128(pin as *const __m128i)), voff);
        let wfl = _mm256_cvtepi8_epi16(_mm_loadu_si128(pfl as *const __m128i));
        acc = _mm256_add_epi32(acc, _mm256_madd_epi16(win, wfl));
        pos += vl;
        remaining -= vl;
    }
    hsum_epi32(acc)
}

#[target_feature(enable = "avx2")]
unsafe fn dot_i16_avx2(input: &[i16], filter: &[i8]) -> i64 {
    let mut acc = _mm256_setzero_si256();
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
        let vin = _mm256_loadu_si256(pin as *const __m256i);
        let wfl = _mm256_cvtepi8_epi16(_mm_loadu_si128(pfl as *const __m128i));
        // Pair sums are bounded by 2 * 2^15 * 2^7; widen them to 64-bit before accumulating.
        let pairs = _mm256_madd_epi16(vin, wfl);
        acc = _mm256_add_epi64(acc, _mm256_cvtepi32_epi64(_mm256_castsi256_si128(pairs)));
        acc = _mm256_add_epi64(acc, _mm256_cvtepi32_epi64(_mm256_extracti128_si256(pairs, 1)));
        pos += vl;
        remaining -= vl;
    }
    let mut lanes = [0i64; 4];
    _mm256_storeu_si256(lanes.as_mut_ptr() as *mut __m256i, acc);
    lanes.iter().sum()
}

#[target_feature(enable = "avx2")]
unsafe fn hsum_epi32(v: __m256i) -> i32 {
    let s = _mm_add_epi32(_mm256_castsi256_si128(v), _mm256_extracti128_si256(v, 1));
    let s = _mm_add_epi32(s, _mm_shuffle_epi32(s, 0b01_00_11_10));
    let s = _mm_add_epi32(s, _mm_shuffle_epi32(s, 0b10_11_00_01));
    _mm_cvtsi128_si32(s)
}
