use itertools::multizip;
use std::hash::Hasher;
use vector3::*;
use xwconsts::*;

/// Contracted Gaussian shell
///
///   φ(r) = poly_l(r - A) Σ_k c_k exp(-a_k |r - A|²)
///
/// Coefficients are stored with primitive normalization folded in once
/// `normalize` has been called.
#[derive(Debug, Clone)]
pub struct Shell {
    l: usize,
    pure: bool,
    exponents: Vec<f64>,
    coefficients: Vec<f64>,
    center: Vector3f64,
    atom: usize,
}

impl Shell {
    pub fn new(
        l: usize,
        pure: bool,
        exponents: &[f64],
        coefficients: &[f64],
        center: Vector3f64,
        atom: usize,
    ) -> Shell {
        assert_eq!(exponents.len(), coefficients.len());

        Shell {
            l,
            pure,
            exponents: exponents.to_vec(),
            coefficients: coefficients.to_vec(),
            center,
            atom,
        }
    }

    pub fn get_l(&self) -> usize {
        self.l
    }

    pub fn is_pure(&self) -> bool {
        self.pure
    }

    pub fn get_nprim(&self) -> usize {
        self.exponents.len()
    }

    pub fn get_exponents(&self) -> &[f64] {
        &self.exponents
    }

    pub fn get_coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn get_center(&self) -> Vector3f64 {
        self.center
    }

    pub fn get_atom(&self) -> usize {
        self.atom
    }

    pub fn set_center(&mut self, center: Vector3f64) {
        self.center = center;
    }

    /// Number of basis functions.
    pub fn size(&self) -> usize {
        if self.pure {
            pure_size(self.l)
        } else {
            cartesian_size(self.l)
        }
    }

    pub fn cartesian_size(&self) -> usize {
        cartesian_size(self.l)
    }

    /// Folds primitive normalization into the coefficients and rescales the
    /// contraction so the x^l component has unit norm.
    pub fn normalize(&mut self) {
        let l = self.l as i32;
        let dfact = double_factorial(2 * self.l as i64 - 1);

        for (a, c) in multizip((self.exponents.iter(), self.coefficients.iter_mut())) {
            *c *= (2.0 * a / PI).powf(0.75) * (4.0 * a).powf(0.5 * l as f64) / dfact.sqrt();
        }

        let s = self.norm_sqr();

        for c in self.coefficients.iter_mut() {
            *c /= s.sqrt();
        }
    }

    /// <x^l φ | x^l φ> for the stored coefficients.
    pub fn norm_sqr(&self) -> f64 {
        let l = self.l as i32;
        let dfact = double_factorial(2 * self.l as i64 - 1);

        let mut s = 0.0;

        for (ai, ci) in multizip((self.exponents.iter(), self.coefficients.iter())) {
            for (aj, cj) in multizip((self.exponents.iter(), self.coefficients.iter())) {
                let p = ai + aj;
                s += ci * cj * (PI / p).powf(1.5) * dfact / (2.0 * p).powi(l);
            }
        }

        s
    }

    /// Radius beyond which every primitive is below `tol`.
    pub fn extent(&self, tol: f64) -> f64 {
        let mut r2max: f64 = 0.0;

        for (a, c) in multizip((self.exponents.iter(), self.coefficients.iter())) {
            let ratio = c.abs() / tol;
            if ratio > 1.0 {
                r2max = r2max.max(ratio.ln() / a);
            }
        }

        r2max.sqrt()
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, hasher: &mut H) {
        hasher.write_usize(self.l);
        hasher.write_u8(self.pure as u8);
        hasher.write_usize(self.atom);

        for b in self.center.to_bits() {
            hasher.write_u64(b);
        }

        for (a, c) in multizip((self.exponents.iter(), self.coefficients.iter())) {
            hasher.write_u64(a.to_bits());
            hasher.write_u64(c.to_bits());
        }
    }
}

pub fn cartesian_size(l: usize) -> usize {
    (l + 1) * (l + 2) / 2
}

pub fn pure_size(l: usize) -> usize {
    2 * l + 1
}

/// Cartesian exponents (lx, ly, lz) of a shell in canonical order:
/// xx, xy, xz, yy, yz, zz for l = 2.
pub fn cartesian_powers(l: usize) -> Vec<[usize; 3]> {
    let mut powers = Vec::with_capacity(cartesian_size(l));

    for lx in (0..=l).rev() {
        for ly in (0..=l - lx).rev() {
            powers.push([lx, ly, l - lx - ly]);
        }
    }

    powers
}

pub fn double_factorial(n: i64) -> f64 {
    let mut r = 1.0;
    let mut k = n;

    while k > 1 {
        r *= k as f64;
        k -= 2;
    }

    r
}
