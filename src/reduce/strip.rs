use super::DotReduce;

/// Largest vector length the portable loop will grant: 8-bit elements in a
/// four-register group of a 128-bit vector unit.
pub const MAX_VLEN: usize = 64;

/// Portable request/grant vector loop.
///
/// `setvl` plays the role of the hardware length negotiation: it grants at most
/// `vlmax` lanes, and fewer on the final strip. Lane buffers live on the stack and are
/// sized for the largest grant, so nothing is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripMined {
    vlmax: usize,
}

impl StripMined {
    pub const DEFAULT: StripMined = StripMined { vlmax: MAX_VLEN };

    pub fn new(vlmax: usize) -> Self {
        assert!((1..=MAX_VLEN).contains(&vlmax), "vlmax {} outside 1..={}", vlmax, MAX_VLEN);
        Self { vlmax }
    }

    pub fn vlmax(&self) -> usize { self.vlmax }

    /// Granted vector length for a request of `requested` elements.
    #[inline]
    pub fn setvl(&self, requested: usize) -> usize { requested.min(self.vlmax) }
}

impl Default for StripMined {
    fn default() -> Self { Self::DEFAULT }
}

impl DotReduce for StripMined {
    fn name(&self) -> &'static str { "strip" }

    fn dot_i8(&self, input: &[i8], filter: &[i8], input_offset: i32) -> i32 {
        debug_assert_eq!(input.len(), filter.len());
        debug_assert!((-255..=255).contains(&input_offset), "input_offset {} exceeds 16-bit lanes", input_offset);
        let offset = input_offset as i16;
        let mut wide_in = [0i16; MAX_VLEN];
        let mut wide_fl = [0i16; MAX_VLEN];
        let mut acc: i32 = 0;
        let mut pos = 0usize;
        let mut remaining = input.len();
        while remaining > 0 {
            let vl = self.setvl(remaining);
            // Widen to 16-bit lanes, offset every input lane in one pass.
            for (w, &v) in wide_in[..vl].iter_mut().zip(&input[pos..pos + vl]) {
                *w = v as i16 + offset;
            }
            for (w, &v) in wide_fl[..vl].iter_mut().zip(&filter[pos..pos + vl]) {
                *w = v as i16;
            }
            // Widening multiply, then reduce the strip to a scalar.
            let sum: i32 = wide_in[..vl]
                .iter()
                .zip(&wide_fl[..vl])
                .map(|(&a, &b)| a as i32 * b as i32)
                .sum();
            acc += sum;
            pos += vl;
            remaining -= vl;
        }
        acc
    }

    fn dot_i16(&self, input: &[i16], filter: &[i8]) -> i64 {
        debug_assert_eq!(input.len(), filter.len());
        let mut wide_in = [0i32; MAX_VLEN];
        let mut wide_fl = [0i32; MAX_VLEN];
        let mut acc: i64 = 0;
        let mut pos = 0usize;
        let mut remaining = input.len();
        while remaining > 0 {
            let vl = self.setvl(remaining);
            for (w, &v) in wide_in[..vl].iter_mut().zip(&input[pos..pos + vl]) {
                *w = v as i32;
            }
            for (w, &v) in wide_fl[..vl].iter_mut().zip(&filter[pos..pos + vl]) {
                *w = v as i32;
            }
            // |product| <= 2^15 * 2^7, so 32-bit lanes are exact; the strip sum is widened.
            let sum: i64 = wide_in[..vl]
                .iter()
                .zip(&wide_fl[..vl])
                .map(|(&a, &b)| (a * b) as i64)
                .sum();
            acc += sum;
            pos += vl;
            remaining -= vl;
        }
        acc
    }
}
