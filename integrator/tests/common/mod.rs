#![allow(dead_code)]

use basis::*;
use control::Control;
use gridtask::{GridTask, Screening, TaskList};
use nalgebra::DMatrix;
use rand::{rngs::StdRng, Rng, SeedableRng};
use vector3::*;
use xc::{XcFamily, XcFunctional};

// STO-3G contraction shared by all first-row shells
const STO3G_1S: [f64; 3] = [0.15432897, 0.53532814, 0.44463454];
const STO3G_2S: [f64; 3] = [-0.09996723, 0.39951283, 0.70011547];
const STO3G_2P: [f64; 3] = [0.15591627, 0.60768372, 0.39195739];

pub fn water() -> Molecule {
    Molecule::new(vec![
        Atom::new(8, Vector3f64::new(0.0, 0.0, 0.2217)),
        Atom::new(1, Vector3f64::new(0.0, 1.4309, -0.8867)),
        Atom::new(1, Vector3f64::new(0.0, -1.4309, -0.8867)),
    ])
}

/// Water in STO-3G: O 1s, 2s, 2p and one 1s per hydrogen, 7 functions.
pub fn water_sto3g(mol: &Molecule) -> BasisSet {
    let o = mol.get_atom(0).get_position();
    let h1 = mol.get_atom(1).get_position();
    let h2 = mol.get_atom(2).get_position();

    let o_1s = [130.7093200, 23.8088610, 6.4436083];
    let o_2sp = [5.0331513, 1.1695961, 0.3803890];
    let h_1s = [3.42525091, 0.62391373, 0.16885540];

    let mut basis = BasisSet::new(vec![
        Shell::new(0, false, &o_1s, &STO3G_1S, o, 0),
        Shell::new(0, false, &o_2sp, &STO3G_2S, o, 0),
        Shell::new(1, false, &o_2sp, &STO3G_2P, o, 0),
        Shell::new(0, false, &h_1s, &STO3G_1S, h1, 1),
        Shell::new(0, false, &h_1s, &STO3G_1S, h2, 2),
    ]);

    basis.normalize();
    basis
}

/// Adds a Cartesian or spherical d shell on oxygen.
pub fn with_d_shell(mol: &Molecule, basis: &BasisSet, pure: bool) -> BasisSet {
    let mut shells = basis.get_shells().to_vec();

    let mut d = Shell::new(2, pure, &[1.2, 0.35], &[0.6, 0.5], mol.get_atom(0).get_position(), 0);
    d.normalize();
    shells.push(d);

    BasisSet::new(shells)
}

/// P = 2 C Cᵀ with random C (nbf x nocc): positive semi-definite.
pub fn random_density(nbf: usize, nocc: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);

    let c = DMatrix::<f64>::from_fn(nbf, nocc, |_, _| rng.gen_range(-0.6..0.6));
    let p = (&c * c.transpose()) * 2.0;

    p.as_slice().to_vec()
}

/// `ntasks_per_atom` tasks of `npts` random points within 3 bohr of each atom.
pub fn grid_tasks(
    mol: &Molecule,
    basis: &BasisSet,
    ntasks_per_atom: usize,
    npts: usize,
    screened: bool,
    seed: u64,
) -> Vec<GridTask> {
    let map = BasisSetMap::new(basis);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tasks = Vec::new();

    for (iat, atom) in mol.get_atoms().iter().enumerate() {
        let center = atom.get_position();

        for _ in 0..ntasks_per_atom {
            let mut points = Vec::with_capacity(npts);
            let mut weights = Vec::with_capacity(npts);

            for _ in 0..npts {
                let d = Vector3f64::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                );
                let r = rng.gen_range(0.05..3.0);

                points.push(center + d * (r / d.norm2().max(1E-3)));
                weights.push(rng.gen_range(0.01..0.1));
            }

            let bfn = if screened {
                Screening::by_extent(basis, &map, &points, 1E-4)
            } else {
                Screening::all(&map)
            };

            let cou = bfn.clone();

            tasks.push(GridTask::new(iat, points, weights, bfn).with_cou_screening(cou));
        }
    }

    tasks
}

pub fn task_list(tasks: Vec<GridTask>) -> TaskList {
    TaskList::new(tasks, true)
}

pub fn control(backend: &str, n_aux: usize, xc_scheme: &str) -> Control {
    let mut control = Control::new();

    control.set_backend(backend);
    control.set_n_aux_queues(n_aux);
    control.set_xc_scheme(xc_scheme);

    control
}

fn to_pure_d(cart: &[f64]) -> Vec<f64> {
    let s3 = 3f64.sqrt();

    vec![
        s3 * cart[1],
        s3 * cart[4],
        cart[5] - 0.5 * (cart[0] + cart[3]),
        s3 * cart[2],
        0.5 * s3 * (cart[0] - cart[3]),
    ]
}

fn monomial(p: usize, x: f64) -> f64 {
    x.powi(p as i32)
}

fn monomial_deriv(p: usize, x: f64) -> f64 {
    if p == 0 {
        0.0
    } else {
        p as f64 * x.powi(p as i32 - 1)
    }
}

/// Values (k = None) or one gradient component (k = Some(0..3)) of every
/// basis function at r, written independently of the engine.
fn eval_basis_component(basis: &BasisSet, r: Vector3f64, k: Option<usize>) -> Vec<f64> {
    let mut values = Vec::with_capacity(basis.nbf());

    for shell in basis.iter() {
        let d = (r - shell.get_center()).to_array();
        let r2 = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];

        let (mut r0, mut r1) = (0.0, 0.0);
        for (a, c) in shell.get_exponents().iter().zip(shell.get_coefficients().iter()) {
            let e = c * (-a * r2).exp();
            r0 += e;
            r1 += a * e;
        }

        let cart: Vec<f64> = cartesian_powers(shell.get_l())
            .iter()
            .map(|p| {
                let poly = monomial(p[0], d[0]) * monomial(p[1], d[1]) * monomial(p[2], d[2]);

                match k {
                    None => poly * r0,
                    Some(k) => {
                        let mut dpoly = 1.0;
                        for i in 0..3 {
                            dpoly *= if i == k {
                                monomial_deriv(p[i], d[i])
                            } else {
                                monomial(p[i], d[i])
                            };
                        }
                        dpoly * r0 - 2.0 * d[k] * r1 * poly
                    }
                }
            })
            .collect();

        if shell.is_pure() && shell.get_l() == 2 {
            values.extend(to_pure_d(&cart));
        } else {
            values.extend(cart);
        }
    }

    values
}

pub fn eval_basis(basis: &BasisSet, r: Vector3f64) -> Vec<f64> {
    eval_basis_component(basis, r, None)
}

pub fn eval_basis_grad(basis: &BasisSet, r: Vector3f64) -> [Vec<f64>; 3] {
    [
        eval_basis_component(basis, r, Some(0)),
        eval_basis_component(basis, r, Some(1)),
        eval_basis_component(basis, r, Some(2)),
    ]
}

/// Rows: points of the task; columns: its screened basis functions.
pub fn task_bf_matrix(basis: &BasisSet, task: &GridTask) -> DMatrix<f64> {
    let map = BasisSetMap::new(basis);
    let bf = map.shells_to_bf(task.get_bfn_screening().get_shell_list());

    let mut b = DMatrix::<f64>::zeros(task.npts(), bf.len());

    for (ipt, p) in task.get_points().iter().enumerate() {
        let values = eval_basis(basis, *p);
        for (k, &ibf) in bf.iter().enumerate() {
            b[(ipt, k)] = values[ibf];
        }
    }

    b
}

pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}

pub fn max_abs(a: &[f64]) -> f64 {
    a.iter().map(|x| x.abs()).fold(0.0, f64::max)
}

/// Copy of `basis` with the shells of atom `iat` moved by h along axis k.
pub fn shift_atom(basis: &BasisSet, iat: usize, k: usize, h: f64) -> BasisSet {
    let mut e = [0.0; 3];
    e[k] = h;
    let e = Vector3f64::from_array(e);

    let shells = basis
        .iter()
        .map(|s| {
            let mut s = s.clone();
            if s.get_atom() == iat {
                s.set_center(s.get_center() + e);
            }
            s
        })
        .collect();

    BasisSet::new(shells)
}

/// Dense host evaluation of (EXC, NEL, VXC) over the screened functions
/// of every task.
pub fn dense_xc(basis: &BasisSet, tasks: &[GridTask], p: &[f64], func: &dyn XcFunctional) -> (f64, f64, DMatrix<f64>) {
    let nbf = basis.nbf();
    let map = BasisSetMap::new(basis);
    let pfull = DMatrix::from_column_slice(nbf, nbf, p);
    let gga = func.family() == XcFamily::Gga;

    let mut vxc = DMatrix::<f64>::zeros(nbf, nbf);
    let (mut exc, mut nel) = (0.0, 0.0);

    for task in tasks.iter() {
        let bf = map.shells_to_bf(task.get_bfn_screening().get_shell_list());
        let (n, nbe) = (task.npts(), bf.len());

        let mut b = DMatrix::<f64>::zeros(n, nbe);
        let mut db = [
            DMatrix::<f64>::zeros(n, nbe),
            DMatrix::<f64>::zeros(n, nbe),
            DMatrix::<f64>::zeros(n, nbe),
        ];

        for (g, pt) in task.get_points().iter().enumerate() {
            let values = eval_basis(basis, *pt);
            let grads = eval_basis_grad(basis, *pt);

            for (mu, &ibf) in bf.iter().enumerate() {
                b[(g, mu)] = values[ibf];
                for k in 0..3 {
                    db[k][(g, mu)] = grads[k][ibf];
                }
            }
        }

        let psub = DMatrix::from_fn(nbe, nbe, |i, j| pfull[(bf[i], bf[j])]);
        let bp = &b * &psub;

        let rho: Vec<f64> = (0..n).map(|g| bp.row(g).dot(&b.row(g))).collect();
        let drho: Vec<Vec<f64>> = (0..3)
            .map(|k| (0..n).map(|g| 2.0 * bp.row(g).dot(&db[k].row(g))).collect())
            .collect();
        let gamma: Vec<f64> = (0..n)
            .map(|g| drho[0][g] * drho[0][g] + drho[1][g] * drho[1][g] + drho[2][g] * drho[2][g])
            .collect();

        let mut eps = vec![0.0; n];
        let mut vrho = vec![0.0; n];
        let mut vgamma = vec![0.0; n];

        if gga {
            func.eval_exc_vxc_gga(&rho, &gamma, &mut eps, &mut vrho, &mut vgamma).unwrap();
        } else {
            func.eval_exc_vxc_lda(&rho, &mut eps, &mut vrho).unwrap();
        }

        let w = task.get_weights();

        for g in 0..n {
            exc += w[g] * eps[g] * rho[g];
            nel += w[g] * rho[g];
        }

        let wb = DMatrix::from_fn(n, nbe, |g, mu| w[g] * vrho[g] * b[(g, mu)]);
        let mut v = b.transpose() * wb;

        if gga {
            let wd = DMatrix::from_fn(n, nbe, |g, mu| {
                let dot = drho[0][g] * db[0][(g, mu)] + drho[1][g] * db[1][(g, mu)] + drho[2][g] * db[2][(g, mu)];
                2.0 * w[g] * vgamma[g] * dot
            });

            v += wd.transpose() * &b + b.transpose() * &wd;
        }

        for j in 0..nbe {
            for i in 0..nbe {
                vxc[(bf[i], bf[j])] += v[(i, j)];
            }
        }
    }

    (exc, nel, vxc)
}

/// Dense host evaluation of (EXC, NEL, Vα, Vβ) for separate spin densities,
/// built from ∂E/∂Pσ directly.
pub fn dense_uks(
    basis: &BasisSet,
    tasks: &[GridTask],
    pa: &[f64],
    pb: &[f64],
    func: &dyn XcFunctional,
) -> (f64, f64, DMatrix<f64>, DMatrix<f64>) {
    let nbf = basis.nbf();
    let map = BasisSetMap::new(basis);
    let pfull = [
        DMatrix::from_column_slice(nbf, nbf, pa),
        DMatrix::from_column_slice(nbf, nbf, pb),
    ];
    let gga = func.family() == XcFamily::Gga;

    let mut vxc = [DMatrix::<f64>::zeros(nbf, nbf), DMatrix::<f64>::zeros(nbf, nbf)];
    let (mut exc, mut nel) = (0.0, 0.0);

    for task in tasks.iter() {
        let bf = map.shells_to_bf(task.get_bfn_screening().get_shell_list());
        let (n, nbe) = (task.npts(), bf.len());

        let mut b = DMatrix::<f64>::zeros(n, nbe);
        let mut db = [
            DMatrix::<f64>::zeros(n, nbe),
            DMatrix::<f64>::zeros(n, nbe),
            DMatrix::<f64>::zeros(n, nbe),
        ];

        for (g, pt) in task.get_points().iter().enumerate() {
            let values = eval_basis(basis, *pt);
            let grads = eval_basis_grad(basis, *pt);

            for (mu, &ibf) in bf.iter().enumerate() {
                b[(g, mu)] = values[ibf];
                for k in 0..3 {
                    db[k][(g, mu)] = grads[k][ibf];
                }
            }
        }

        // per spin: ρσ and ∇ρσ
        let mut rho = [vec![0.0; n], vec![0.0; n]];
        let mut drho = [[vec![0.0; n], vec![0.0; n], vec![0.0; n]], [vec![0.0; n], vec![0.0; n], vec![0.0; n]]];

        for s in 0..2 {
            let psub = DMatrix::from_fn(nbe, nbe, |i, j| pfull[s][(bf[i], bf[j])]);
            let bp = &b * &psub;

            for g in 0..n {
                rho[s][g] = bp.row(g).dot(&b.row(g));
                for k in 0..3 {
                    drho[s][k][g] = 2.0 * bp.row(g).dot(&db[k].row(g));
                }
            }
        }

        let dot = |a: usize, c: usize, g: usize| (0..3).map(|k| drho[a][k][g] * drho[c][k][g]).sum::<f64>();

        let rho_in: Vec<f64> = (0..n).flat_map(|g| [rho[0][g], rho[1][g]]).collect();
        let sigma: Vec<f64> = (0..n).flat_map(|g| [dot(0, 0, g), dot(0, 1, g), dot(1, 1, g)]).collect();

        let mut eps = vec![0.0; n];
        let mut vrho = vec![0.0; 2 * n];
        let mut vsigma = vec![0.0; 3 * n];

        if gga {
            func.eval_exc_vxc_gga_polarized(&rho_in, &sigma, &mut eps, &mut vrho, &mut vsigma)
                .unwrap();
        } else {
            func.eval_exc_vxc_lda_polarized(&rho_in, &mut eps, &mut vrho).unwrap();
        }

        let w = task.get_weights();

        for g in 0..n {
            let total = rho[0][g] + rho[1][g];
            exc += w[g] * eps[g] * total;
            nel += w[g] * total;
        }

        for s in 0..2 {
            let o = 1 - s;
            let wb = DMatrix::from_fn(n, nbe, |g, mu| w[g] * vrho[2 * g + s] * b[(g, mu)]);
            let mut v = b.transpose() * wb;

            if gga {
                // ∂σ_ss/∂∇ρs = 2∇ρs, ∂σ↑↓/∂∇ρs = ∇ρo
                let wd = DMatrix::from_fn(n, nbe, |g, mu| {
                    let v_self = vsigma[3 * g + 2 * s];
                    let v_mix = vsigma[3 * g + 1];
                    (0..3)
                        .map(|k| (2.0 * v_self * drho[s][k][g] + v_mix * drho[o][k][g]) * db[k][(g, mu)])
                        .sum::<f64>()
                        * w[g]
                });

                v += wd.transpose() * &b + b.transpose() * &wd;
            }

            for j in 0..nbe {
                for i in 0..nbe {
                    vxc[s][(bf[i], bf[j])] += v[(i, j)];
                }
            }
        }
    }

    let [va, vb] = vxc;
    (exc, nel, va, vb)
}
