//! Boys function F_n(T) = ∫_0^1 t^(2n) exp(-T t²) dt.
//!
//! F_n on a uniform T grid is tabulated once; evaluation takes the nearest
//! grid point T0, builds F_nmax(T) from a Taylor expansion in T - T0 and
//! recurses downward. Beyond the table the asymptotic form is used.

use xwconsts::*;

#[derive(Debug, Clone)]
pub struct BoysTable {
    nmax: usize,
    ncol: usize,
    step: f64,
    tmax: f64,
    // [igrid * ncol + n], n up to nmax + BOYS_TAYLOR_ORDER
    table: Vec<f64>,
}

impl Default for BoysTable {
    fn default() -> Self {
        BoysTable::new(BOYS_MAX_ORDER)
    }
}

impl BoysTable {
    pub fn new(nmax: usize) -> BoysTable {
        let step = BOYS_TABLE_STEP;
        let tmax = BOYS_TABLE_TMAX;
        let ngrid = (tmax / step).round() as usize + 1;
        let ncol = nmax + BOYS_TAYLOR_ORDER + 1;

        let mut table = vec![0.0; ngrid * ncol];

        for ig in 0..ngrid {
            let t = ig as f64 * step;
            let row = &mut table[ig * ncol..(ig + 1) * ncol];

            row[ncol - 1] = boys_series(ncol - 1, t);

            let et = (-t).exp();
            for n in (0..ncol - 1).rev() {
                row[n] = (2.0 * t * row[n + 1] + et) / (2 * n + 1) as f64;
            }
        }

        BoysTable {
            nmax,
            ncol,
            step,
            tmax,
            table,
        }
    }

    pub fn get_nmax(&self) -> usize {
        self.nmax
    }

    /// Fills `f[0..=n]` with F_0(T) .. F_n(T).
    pub fn eval(&self, n: usize, t: f64, f: &mut [f64]) {
        debug_assert!(n <= self.nmax);
        debug_assert!(f.len() > n);

        if t >= self.tmax {
            // F_0 = sqrt(π/T)/2, F_(m+1) = (2m+1)/(2T) F_m
            f[0] = 0.5 * (PI / t).sqrt();
            for m in 0..n {
                f[m + 1] = f[m] * (2 * m + 1) as f64 / (2.0 * t);
            }
            return;
        }

        let ig = (t / self.step).round() as usize;
        let dt = t - ig as f64 * self.step;
        let row = &self.table[ig * self.ncol..(ig + 1) * self.ncol];

        // F_n(T0 + dt) = Σ_k F_(n+k)(T0) (-dt)^k / k!
        let mut fac = 1.0;
        let mut fnt = 0.0;
        for k in 0..=BOYS_TAYLOR_ORDER {
            fnt += row[n + k] * fac;
            fac *= -dt / (k + 1) as f64;
        }

        f[n] = fnt;

        let et = (-t).exp();
        for m in (0..n).rev() {
            f[m] = (2.0 * t * f[m + 1] + et) / (2 * m + 1) as f64;
        }
    }
}

/// F_n(T) = exp(-T) Σ_i (2T)^i / ((2n+1)(2n+3)...(2n+2i+1))
pub fn boys_series(n: usize, t: f64) -> f64 {
    let mut term = 1.0 / (2 * n + 1) as f64;
    let mut sum = term;
    let mut i = 1;

    while term > sum * EPS20 {
        term *= 2.0 * t / (2 * n + 2 * i + 1) as f64;
        sum += term;
        i += 1;
    }

    sum * (-t).exp()
}
