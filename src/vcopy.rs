//! Byte copy driven by the same request/grant loop as the reductions.

/// Bytes granted per strip: 8-bit elements in an eight-register group of a 128-bit unit.
pub const COPY_VLMAX: usize = 128;

/// Copies the first `n` bytes of `src` into `dst` and returns `dst`.
///
/// The borrow checker rules out overlapping regions; use `<[u8]>::copy_within` for
/// moves inside one buffer.
pub fn vcopy<'d>(dst: &'d mut [u8], src: &[u8], n: usize) -> &'d mut [u8] {
    vcopy_with(dst, src, n, COPY_VLMAX)
}

/// [`vcopy`] with an explicit maximum grant.
pub fn vcopy_with<'d>(dst: &'d mut [u8], src: &[u8], n: usize, vlmax: usize) -> &'d mut [u8] {
    assert!(vlmax > 0, "vlmax must be positive");
    debug_assert!(n <= dst.len() && n <= src.len(), "copy of {} bytes from {} into {}", n, src.len(), dst.len());
    let mut pos = 0usize;
    let mut remaining = n;
    while remaining > 0 {
        let vl = remaining.min(vlmax);
        dst[pos..pos + vl].copy_from_slice(&src[pos..pos + vl]);
        pos += vl;
        remaining -= vl;
    }
    dst
}

/// Raw-pointer form for callers that hold frame buffers as pointers.
///
/// # Safety
///
/// When `n > 0`, `src` must be valid for `n` byte reads, `dst` valid for `n` byte
/// writes, and the two regions must not overlap. With `n == 0` neither pointer is
/// touched.
pub unsafe fn vcopy_raw(dst: *mut u8, src: *const u8, n: usize) -> *mut u8 {
    if n == 0 {
        return dst;
    }
    let d = std::slice::from_raw_parts_mut(dst, n);
    let s = std::slice::from_raw_parts(src, n);
    vcopy(d, s, n);
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_leaves_destination_alone() {
        let mut dst = [0xAAu8; 8];
        let out = vcopy(&mut dst, &[1, 2, 3], 0);
        assert_eq!(out, &[0xAA; 8]);
        let p = unsafe { vcopy_raw(std::ptr::null_mut(), std::ptr::null(), 0) };
        assert!(p.is_null());
    }

    #[test]
    fn partial_copy_stops_at_n() {
        let src: Vec<u8> = (0..10).collect();
        let mut dst = [0u8; 10];
        vcopy_with(&mut dst, &src, 7, 3);
        assert_eq!(dst, [0, 1, 2, 3, 4, 5, 6, 0, 0, 0]);
    }

    #[test]
    fn raw_copy_returns_destination() {
        let src = [9u8, 8, 7, 6, 5];
        let mut dst = [0u8; 5];
        let p = unsafe { vcopy_raw(dst.as_mut_ptr(), src.as_ptr(), src.len()) };
        assert_eq!(p, dst.as_mut_ptr());
        assert_eq!(dst, src);
    }
}
