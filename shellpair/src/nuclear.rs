//! Three-center potential integrals V_ab(C) = ∫ χa(r) χb(r) / |r - C| dr
//! by McMurchie-Davidson Hermite expansion, for Cartesian shells up to d.

use crate::{BoysTable, PrimitivePair, ShellPairDescriptor};
use xwconsts::*;

const D: usize = 2 * MAX_EXX_L + 1;
const NR: usize = D * D * D * D;

const CART_S: [[usize; 3]; 1] = [[0, 0, 0]];
const CART_P: [[usize; 3]; 3] = [[1, 0, 0], [0, 1, 0], [0, 0, 1]];
const CART_D: [[usize; 3]; 6] = [[2, 0, 0], [1, 1, 0], [1, 0, 1], [0, 2, 0], [0, 1, 1], [0, 0, 2]];

/// Largest V block, (d, d).
pub const MAX_PAIR_BLOCK: usize = 36;

pub fn cart_powers(l: usize) -> &'static [[usize; 3]] {
    match l {
        0 => &CART_S,
        1 => &CART_P,
        _ => &CART_D,
    }
}

// E[i][j][t], one Cartesian direction
type Hermite = [[[f64; D + 1]; N_EXX_AM]; N_EXX_AM];

fn hermite_e(la: usize, lb: usize, pa: f64, pb: f64, oo2p: f64, e: &mut Hermite) {
    *e = [[[0.0; D + 1]; N_EXX_AM]; N_EXX_AM];
    e[0][0][0] = 1.0;

    for i in 0..=la {
        for j in 0..=lb {
            if i == 0 && j == 0 {
                continue;
            }

            let (prev, x) = if i > 0 { (e[i - 1][j], pa) } else { (e[i][j - 1], pb) };

            for t in 0..=i + j {
                let mut val = x * prev[t] + (t + 1) as f64 * prev[t + 1];
                if t > 0 {
                    val += oo2p * prev[t - 1];
                }
                e[i][j][t] = val;
            }
        }
    }
}

#[inline]
fn ridx(n: usize, t: usize, u: usize, v: usize) -> usize {
    ((n * D + t) * D + u) * D + v
}

fn hermite_r(lsum: usize, p: f64, pc: [f64; 3], boys: &BoysTable, r: &mut [f64; NR]) {
    let t_arg = p * (pc[0] * pc[0] + pc[1] * pc[1] + pc[2] * pc[2]);

    let mut f = [0.0; D];
    boys.eval(lsum, t_arg, &mut f);

    let mut fac = 1.0;
    for (n, fn_) in f.iter().enumerate().take(lsum + 1) {
        r[ridx(n, 0, 0, 0)] = fac * fn_;
        fac *= -2.0 * p;
    }

    for s in 1..=lsum {
        for n in 0..=lsum - s {
            for t in 0..=s {
                for u in 0..=s - t {
                    let v = s - t - u;

                    let val = if t > 0 {
                        let mut x = pc[0] * r[ridx(n + 1, t - 1, u, v)];
                        if t > 1 {
                            x += (t - 1) as f64 * r[ridx(n + 1, t - 2, u, v)];
                        }
                        x
                    } else if u > 0 {
                        let mut x = pc[1] * r[ridx(n + 1, t, u - 1, v)];
                        if u > 1 {
                            x += (u - 1) as f64 * r[ridx(n + 1, t, u - 2, v)];
                        }
                        x
                    } else {
                        let mut x = pc[2] * r[ridx(n + 1, t, u, v - 1)];
                        if v > 1 {
                            x += (v - 1) as f64 * r[ridx(n + 1, t, u, v - 2)];
                        }
                        x
                    };

                    r[ridx(n, t, u, v)] = val;
                }
            }
        }
    }
}

/// V block of one shell pair at point `c`, column-major na x nb in `v`.
pub fn pair_potential(
    pair: &ShellPairDescriptor,
    prims: &[PrimitivePair],
    boys: &BoysTable,
    c: [f64; 3],
    v: &mut [f64],
) {
    let pa = cart_powers(pair.la);
    let pb = cart_powers(pair.lb);
    let na = pa.len();

    v[..na * pb.len()].iter_mut().for_each(|x| *x = 0.0);

    let mut ex: Hermite = Default::default();
    let mut ey: Hermite = Default::default();
    let mut ez: Hermite = Default::default();
    let mut r = [0.0; NR];

    for prim in prims.iter() {
        let oo2p = 0.5 / prim.p;
        let p = prim.center_p;

        hermite_e(pair.la, pair.lb, p[0] - pair.center_a[0], p[0] - pair.center_b[0], oo2p, &mut ex);
        hermite_e(pair.la, pair.lb, p[1] - pair.center_a[1], p[1] - pair.center_b[1], oo2p, &mut ey);
        hermite_e(pair.la, pair.lb, p[2] - pair.center_a[2], p[2] - pair.center_b[2], oo2p, &mut ez);

        let pc = [p[0] - c[0], p[1] - c[1], p[2] - c[2]];
        hermite_r(pair.la + pair.lb, prim.p, pc, boys, &mut r);

        let pref = TWOPI / prim.p * prim.prefactor;

        for (ib, b) in pb.iter().enumerate() {
            for (ia, a) in pa.iter().enumerate() {
                let exab = &ex[a[0]][b[0]];
                let eyab = &ey[a[1]][b[1]];
                let ezab = &ez[a[2]][b[2]];

                let mut sum = 0.0;
                for t in 0..=a[0] + b[0] {
                    for u in 0..=a[1] + b[1] {
                        let etu = exab[t] * eyab[u];
                        for w in 0..=a[2] + b[2] {
                            sum += etu * ezab[w] * r[ridx(0, t, u, w)];
                        }
                    }
                }

                v[ia + ib * na] += pref * sum;
            }
        }
    }
}
