// column-major memory layout
// [i,j] : i + j * nrow
//   0,0 0,1 0,2        0 2 4
//   1,0 1,1 1,2        1 3 5

mod matrix_f64;
pub use matrix_f64::*;

pub mod blas;

//////////////////////////////////////////

use itertools::multizip;
use std::ops::{AddAssign, Index, IndexMut, Mul};

pub trait Dot<RHS = Self> {
    type Output;

    fn dot(&self, other: &RHS) -> Self::Output;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matrix<T> {
    nrow: usize,
    ncol: usize,
    data: Vec<T>,
}

impl<T> Dot<Matrix<T>> for Matrix<T>
where
    T: num_traits::Zero + Default + Copy + AddAssign + Mul<Output = T>,
{
    type Output = Self;

    fn dot(&self, rhs: &Matrix<T>) -> Self::Output {
        assert_eq!(self.ncol(), rhs.nrow());

        let nr_lhs = self.nrow();
        let nc_lhs = self.ncol();
        let nc_rhs = rhs.ncol();

        let mut mdot = Matrix::<T>::new(nr_lhs, nc_rhs);

        for j in 0..nc_rhs {
            for k in 0..nc_lhs {
                let fac = rhs[[k, j]];
                let col = self.get_col(k);
                for (d, s) in multizip((mdot.get_mut_col(j).iter_mut(), col.iter())) {
                    *d += *s * fac;
                }
            }
        }

        mdot
    }
}

impl<T: num_traits::Zero + Default + Copy> Matrix<T> {
    pub fn new(nrow: usize, ncol: usize) -> Matrix<T> {
        Matrix {
            nrow,
            ncol,
            data: vec![T::default(); nrow * ncol],
        }
    }

    /// Takes ownership of column-major `data`.
    pub fn from_vec(nrow: usize, ncol: usize, data: Vec<T>) -> Matrix<T> {
        assert_eq!(data.len(), nrow * ncol);

        Matrix { nrow, ncol, data }
    }

    pub fn from_row_slice(nrow: usize, ncol: usize, s: &[T]) -> Matrix<T> {
        let mut data: Vec<T> = vec![T::default(); nrow * ncol];
        let mut n = 0;
        for i in 0..nrow {
            for j in 0..ncol {
                data[i + j * nrow] = s[n];
                n += 1;
            }
        }
        Matrix { nrow, ncol, data }
    }

    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn get_col(&self, icol: usize) -> &[T] {
        let n1 = icol * self.nrow;
        let n2 = n1 + self.nrow;

        &self.data[n1..n2]
    }

    pub fn get_mut_col(&mut self, icol: usize) -> &mut [T] {
        let n1 = icol * self.nrow;
        let n2 = n1 + self.nrow;

        &mut self.data[n1..n2]
    }

    pub fn transpose(&self) -> Matrix<T> {
        let mut m = Matrix::<T>::new(self.ncol, self.nrow);
        for j in 0..self.ncol {
            for i in 0..self.nrow {
                m[[j, i]] = self[[i, j]];
            }
        }
        m
    }

    /// Copies an `nrow x ncol` block out of a column-major buffer with leading dimension `ld`.
    pub fn from_ld_slice(nrow: usize, ncol: usize, s: &[T], ld: usize) -> Matrix<T> {
        assert!(ld >= nrow);
        assert!(ncol == 0 || s.len() >= ld * (ncol - 1) + nrow);

        let mut m = Matrix::<T>::new(nrow, ncol);
        for j in 0..ncol {
            m.get_mut_col(j).copy_from_slice(&s[j * ld..j * ld + nrow]);
        }
        m
    }

    /// Writes the matrix into a column-major buffer with leading dimension `ld`.
    /// Rows beyond `nrow` in each column are left untouched.
    pub fn write_to_ld_slice(&self, d: &mut [T], ld: usize) {
        assert!(ld >= self.nrow);
        assert!(self.ncol == 0 || d.len() >= ld * (self.ncol - 1) + self.nrow);

        for j in 0..self.ncol {
            d[j * ld..j * ld + self.nrow].copy_from_slice(self.get_col(j));
        }
    }
}

impl<T> Index<[usize; 2]> for Matrix<T> {
    type Output = T;

    fn index(&self, idx: [usize; 2]) -> &T {
        &self.data[idx[0] + idx[1] * self.nrow]
    }
}

impl<T> IndexMut<[usize; 2]> for Matrix<T> {
    fn index_mut(&mut self, idx: [usize; 2]) -> &mut Self::Output {
        &mut self.data[idx[0] + idx[1] * self.nrow]
    }
}
