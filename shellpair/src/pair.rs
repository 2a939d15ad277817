use basis::Shell;
use xwconsts::*;

/// Unordered shell pair i <= j.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShellPairDescriptor {
    pub ish: usize,
    pub jsh: usize,
    pub la: usize,
    pub lb: usize,
    pub center_a: [f64; 3],
    pub center_b: [f64; 3],
    /// A - B
    pub rab: [f64; 3],
    pub prim_offset: usize,
    pub nprim_pairs: usize,
}

impl ShellPairDescriptor {
    pub fn is_diagonal(&self) -> bool {
        self.ish == self.jsh
    }
}

/// Gaussian product data of one primitive pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimitivePair {
    pub alpha: f64,
    pub beta: f64,
    /// alpha + beta
    pub p: f64,
    pub center_p: [f64; 3],
    /// K_AB c_i c_j
    pub prefactor: f64,
}

/// Appends the screened primitive pairs of (a, b) to `prims`; returns how many were kept.
pub fn build_primitive_pairs(a: &Shell, b: &Shell, prims: &mut Vec<PrimitivePair>) -> usize {
    let ca = a.get_center().to_array();
    let cb = b.get_center().to_array();

    let rab2: f64 = (0..3).map(|k| (ca[k] - cb[k]) * (ca[k] - cb[k])).sum();

    let mut kept = 0;

    for (alpha, ci) in a.get_exponents().iter().zip(a.get_coefficients()) {
        for (beta, cj) in b.get_exponents().iter().zip(b.get_coefficients()) {
            let p = alpha + beta;
            let kab = (-alpha * beta / p * rab2).exp();
            let prefactor = kab * ci * cj;

            if prefactor.abs() < PRIMITIVE_PAIR_THRESHOLD {
                continue;
            }

            let mut center_p = [0.0; 3];
            for k in 0..3 {
                center_p[k] = (alpha * ca[k] + beta * cb[k]) / p;
            }

            prims.push(PrimitivePair {
                alpha: *alpha,
                beta: *beta,
                p,
                center_p,
                prefactor,
            });

            kept += 1;
        }
    }

    kept
}
