//! Sparse submatrix maps: a screened basis-function list is described by
//! runs of consecutive global indices so packing and scattering copy whole
//! column segments.

/// Global indices `global..global + len` live at local `local..local + len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmatRange {
    pub global: usize,
    pub local: usize,
    pub len: usize,
}

/// Runs of consecutive indices of an ascending index list.
pub fn contiguous_ranges(indices: &[usize]) -> Vec<SubmatRange> {
    let mut ranges: Vec<SubmatRange> = Vec::new();

    for (local, &global) in indices.iter().enumerate() {
        match ranges.last_mut() {
            Some(r) if r.global + r.len == global => r.len += 1,
            _ => ranges.push(SubmatRange { global, local, len: 1 }),
        }
    }

    ranges
}

/// Number of local indices covered by `ranges`.
pub fn ranges_len(ranges: &[SubmatRange]) -> usize {
    ranges.iter().map(|r| r.len).sum()
}

/// dst[a, b] = src[rows(a), cols(b)]
pub fn pack(
    rows: &[SubmatRange],
    cols: &[SubmatRange],
    src: &[f64],
    ld_src: usize,
    dst: &mut [f64],
    ld_dst: usize,
) {
    for c in cols.iter() {
        for jj in 0..c.len {
            let gj = c.global + jj;
            let lj = c.local + jj;

            for r in rows.iter() {
                let s = r.global + gj * ld_src;
                let d = r.local + lj * ld_dst;
                dst[d..d + r.len].copy_from_slice(&src[s..s + r.len]);
            }
        }
    }
}

/// dst[rows(a), cols(b)] += src[a, b]
pub fn scatter_add(
    rows: &[SubmatRange],
    cols: &[SubmatRange],
    src: &[f64],
    ld_src: usize,
    dst: &mut [f64],
    ld_dst: usize,
) {
    for c in cols.iter() {
        for jj in 0..c.len {
            let gj = c.global + jj;
            let lj = c.local + jj;

            for r in rows.iter() {
                let s = r.local + lj * ld_src;
                let d = r.global + gj * ld_dst;

                for (y, x) in dst[d..d + r.len].iter_mut().zip(src[s..s + r.len].iter()) {
                    *y += x;
                }
            }
        }
    }
}

/// Lower triangle only: dst[g(a), g(b)] += src[a, b] for a >= b. With an
/// ascending index list the targets stay in the global lower triangle.
pub fn scatter_add_lower(ranges: &[SubmatRange], src: &[f64], ld_src: usize, dst: &mut [f64], ld_dst: usize) {
    for c in ranges.iter() {
        for jj in 0..c.len {
            let gj = c.global + jj;
            let lj = c.local + jj;

            for r in ranges.iter() {
                if r.local + r.len <= lj {
                    continue;
                }

                let start = lj.max(r.local) - r.local;
                let n = r.len - start;

                let s = r.local + start + lj * ld_src;
                let d = r.global + start + gj * ld_dst;

                for (y, x) in dst[d..d + n].iter_mut().zip(src[s..s + n].iter()) {
                    *y += x;
                }
            }
        }
    }
}
