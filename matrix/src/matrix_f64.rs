use crate::Matrix;

use itertools::multizip;
use std::ops::Mul;

impl Mul<f64> for Matrix<f64> {
    type Output = Matrix<f64>;

    fn mul(mut self, rhs: f64) -> Matrix<f64> {
        for v in self.data.iter_mut() {
            *v *= rhs;
        }

        self
    }
}

impl Matrix<f64> {
    pub fn identity(n: usize) -> Matrix<f64> {
        let mut mat = Matrix::<f64>::new(n, n);

        for i in 0..n {
            mat[[i, i]] = 1.0;
        }

        mat
    }

    /// Copies the lower triangle onto the upper triangle.
    pub fn symmetrize_from_lower(&mut self) {
        assert_eq!(self.nrow, self.ncol);

        for j in 0..self.ncol {
            for i in 0..j {
                self[[i, j]] = self[[j, i]];
            }
        }
    }

    /// Bitwise symmetry check.
    pub fn is_symmetric(&self) -> bool {
        if self.nrow != self.ncol {
            return false;
        }

        for j in 0..self.ncol {
            for i in j + 1..self.nrow {
                if self[[i, j]].to_bits() != self[[j, i]].to_bits() {
                    return false;
                }
            }
        }

        true
    }

    pub fn max_abs_diff(&self, other: &Matrix<f64>) -> f64 {
        assert!(self.nrow == other.nrow && self.ncol == other.ncol);

        multizip((self.data.iter(), other.data.iter()))
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    pub fn max_abs(&self) -> f64 {
        self.data.iter().map(|x| x.abs()).fold(0.0, f64::max)
    }
}
