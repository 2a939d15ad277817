//! Basis-function collocation: values, gradients and Hessians of the
//! screened shells of a task at its grid points.
//!
//! Cartesian shells of any l; spherical shells up to d. For a point r and a
//! shell centered at A with d = r - A:
//!
//!   φ = P(d) R(|d|²),  R = Σ_k c_k exp(-a_k |d|²)
//!   ∂iφ = ∂iP R + P ∂iR,  ∂iR = -2 d_i R1
//!   ∂ijφ = ∂ijP R + ∂iP ∂jR + ∂jP ∂iR + P ∂ijR,  ∂ijR = -2 δij R1 + 4 d_i d_j R2
//!
//! with R1 = Σ c a exp(..) and R2 = Σ c a² exp(..).

use basis::cartesian_powers;
use device::{DeviceError, Field, ShellView, TaskBuffers};
use itertools::multizip;

const SQRT3: f64 = 1.732_050_807_568_877_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Derivative {
    Value,
    Gradient,
    Hessian,
}

impl Derivative {
    /// Number of collocated quantities: value, 3 gradient, 6 Hessian components.
    pub fn nquantities(&self) -> usize {
        match self {
            Derivative::Value => 1,
            Derivative::Gradient => 4,
            Derivative::Hessian => 10,
        }
    }
}

/// Rows of the Cartesian → spherical transformation for l <= 2, Cartesian
/// components ordered xx, xy, xz, yy, yz, zz. None when l is out of range.
pub fn spherical_transform(l: usize) -> Option<Vec<Vec<f64>>> {
    match l {
        0 => Some(vec![vec![1.0]]),
        1 => Some(vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]]),
        2 => Some(vec![
            vec![0.0, SQRT3, 0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, SQRT3, 0.0],
            vec![-0.5, 0.0, 0.0, -0.5, 0.0, 1.0],
            vec![0.0, 0.0, SQRT3, 0.0, 0.0, 0.0],
            vec![0.5 * SQRT3, 0.0, 0.0, -0.5 * SQRT3, 0.0, 0.0],
        ]),
        _ => None,
    }
}

// k-th derivative of x^p
fn monomial(p: usize, k: usize, x: f64) -> f64 {
    match (p, k) {
        (_, 0) => x.powi(p as i32),
        (p, 1) if p >= 1 => p as f64 * x.powi(p as i32 - 1),
        (p, 2) if p >= 2 => (p * (p - 1)) as f64 * x.powi(p as i32 - 2),
        _ => 0.0,
    }
}

/// Cartesian quantities of one shell at one displacement. `out` holds
/// `deriv.nquantities()` blocks of `cartesian_size(l)` values.
pub fn eval_cartesian(shell: &ShellView<'_>, d: [f64; 3], deriv: Derivative, out: &mut [f64]) {
    let r2 = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];

    let (mut r0, mut r1, mut r2sum) = (0.0, 0.0, 0.0);

    for (a, c) in multizip((shell.exponents.iter(), shell.coefficients.iter())) {
        let e = c * (-a * r2).exp();
        r0 += e;
        r1 += a * e;
        r2sum += a * a * e;
    }

    let dr = [-2.0 * d[0] * r1, -2.0 * d[1] * r1, -2.0 * d[2] * r1];

    let powers = cartesian_powers(shell.l);
    let ncart = powers.len();

    for (k, p) in powers.iter().enumerate() {
        let poly = |kx: usize, ky: usize, kz: usize| {
            monomial(p[0], kx, d[0]) * monomial(p[1], ky, d[1]) * monomial(p[2], kz, d[2])
        };

        let pv = poly(0, 0, 0);
        out[k] = pv * r0;

        if deriv == Derivative::Value {
            continue;
        }

        let dp = [poly(1, 0, 0), poly(0, 1, 0), poly(0, 0, 1)];

        for i in 0..3 {
            out[(1 + i) * ncart + k] = dp[i] * r0 + pv * dr[i];
        }

        if deriv == Derivative::Gradient {
            continue;
        }

        let d2p = [
            poly(2, 0, 0),
            poly(1, 1, 0),
            poly(1, 0, 1),
            poly(0, 2, 0),
            poly(0, 1, 1),
            poly(0, 0, 2),
        ];

        for (ih, (i, j)) in HESSIAN_PAIRS.iter().enumerate() {
            let delta = if i == j { 1.0 } else { 0.0 };
            let d2r = -2.0 * delta * r1 + 4.0 * d[*i] * d[*j] * r2sum;

            out[(4 + ih) * ncart + k] = d2p[ih] * r0 + dp[*i] * dr[*j] + dp[*j] * dr[*i] + pv * d2r;
        }
    }
}

/// Component pairs of the packed Hessian: xx, xy, xz, yy, yz, zz.
pub const HESSIAN_PAIRS: [(usize, usize); 6] = [(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)];

/// Index into `HESSIAN_PAIRS` of the (i, j) component.
pub fn hessian_index(i: usize, j: usize) -> usize {
    let (i, j) = if i <= j { (i, j) } else { (j, i) };

    match (i, j) {
        (0, 0) => 0,
        (0, 1) => 1,
        (0, 2) => 2,
        (1, 1) => 3,
        (1, 2) => 4,
        _ => 5,
    }
}

/// Collocates one shell into columns `col_off..col_off + size` of the
/// task's basis-function buffers (column-major, ld = npts).
pub fn collocate_shell(
    shell: &ShellView<'_>,
    deriv: Derivative,
    npts: usize,
    col_off: usize,
    buf: &mut TaskBuffers<'_>,
) -> Result<(), DeviceError> {
    let transform = if shell.pure {
        Some(spherical_transform(shell.l).ok_or_else(|| {
            DeviceError::Kernel(format!("spherical collocation with l = {}", shell.l))
        })?)
    } else {
        None
    };

    let ncart = cartesian_powers(shell.l).len();
    let size = transform.as_ref().map(|t| t.len()).unwrap_or(ncart);
    let nq = deriv.nquantities();

    let fields = [
        Field::Bf,
        Field::DbfX,
        Field::DbfY,
        Field::DbfZ,
        Field::D2bfXX,
        Field::D2bfXY,
        Field::D2bfXZ,
        Field::D2bfYY,
        Field::D2bfYZ,
        Field::D2bfZZ,
    ];

    for field in fields[..nq].iter() {
        buf.require(*field, npts * (col_off + size))?;
    }
    buf.require(Field::PointsZ, npts)?;

    let xs = &*buf.points_x;
    let ys = &*buf.points_y;
    let zs = &*buf.points_z;

    let mut targets: [&mut [f64]; 10] = [
        &mut *buf.bf,
        &mut *buf.dbfx,
        &mut *buf.dbfy,
        &mut *buf.dbfz,
        &mut *buf.d2bfxx,
        &mut *buf.d2bfxy,
        &mut *buf.d2bfxz,
        &mut *buf.d2bfyy,
        &mut *buf.d2bfyz,
        &mut *buf.d2bfzz,
    ];

    let mut cart = vec![0.0; nq * ncart];

    for ipt in 0..npts {
        let d = [
            xs[ipt] - shell.center[0],
            ys[ipt] - shell.center[1],
            zs[ipt] - shell.center[2],
        ];

        eval_cartesian(shell, d, deriv, &mut cart);

        for (iq, target) in targets[..nq].iter_mut().enumerate() {
            let block = &cart[iq * ncart..(iq + 1) * ncart];

            match transform.as_ref() {
                Some(rows) => {
                    for (k, row) in rows.iter().enumerate() {
                        let v: f64 = row.iter().zip(block.iter()).map(|(t, c)| t * c).sum();
                        target[ipt + (col_off + k) * npts] = v;
                    }
                }
                None => {
                    for (k, v) in block.iter().enumerate() {
                        target[ipt + (col_off + k) * npts] = *v;
                    }
                }
            }
        }
    }

    Ok(())
}
