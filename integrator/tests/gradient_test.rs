mod common;

use common::*;
use integrator::*;
use xc::{PbeExchange, SlaterExchange, XcFunctional};

fn engine_gradient(backend: &str, xc_scheme: &str) -> Result<Vec<f64>, EngineError> {
    let mol = water();
    let basis = water_sto3g(&mol);
    let nbf = basis.nbf();

    let tasks = grid_tasks(&mol, &basis, 2, 20, false, 21);
    let p = random_density(nbf, 4, 5);

    let mut xcint = XcIntegrator::new(&control(backend, 3, xc_scheme), mol.clone(), basis, task_list(tasks))?;

    let mut grad = vec![0.0; 3 * mol.natoms()];
    xcint.eval_exc_grad(nbf, nbf, &p, nbf, &mut grad)?;

    Ok(grad)
}

// dE/dR with the grid, weights and density matrix held fixed
fn finite_difference_gradient(func: &dyn XcFunctional) -> Vec<f64> {
    let mol = water();
    let basis = water_sto3g(&mol);
    let nbf = basis.nbf();

    let tasks = grid_tasks(&mol, &basis, 2, 20, false, 21);
    let p = random_density(nbf, 4, 5);

    let h = 1E-5;
    let mut grad = vec![0.0; 3 * mol.natoms()];

    for iat in 0..mol.natoms() {
        for k in 0..3 {
            let (ep, _, _) = dense_xc(&shift_atom(&basis, iat, k, h), &tasks, &p, func);
            let (em, _, _) = dense_xc(&shift_atom(&basis, iat, k, -h), &tasks, &p, func);

            grad[3 * iat + k] = (ep - em) / (2.0 * h);
        }
    }

    grad
}

#[test]
fn test_lda_gradient_matches_dense_energy_derivative() {
    let grad = engine_gradient("vendor_a", "slater").unwrap();
    let reference = finite_difference_gradient(&SlaterExchange::new());

    assert!(max_abs(&reference) > 1E-3);
    assert!(max_abs_diff(&grad, &reference) <= 1E-6 * max_abs(&reference).max(1.0));
}

#[test]
fn test_gga_gradient_matches_dense_energy_derivative() {
    let grad = engine_gradient("host", "pbe").unwrap();
    let reference = finite_difference_gradient(&PbeExchange::new());

    assert!(max_abs_diff(&grad, &reference) <= 1E-6 * max_abs(&reference).max(1.0));
}

#[test]
fn test_gradient_independent_of_backend_dispatch() {
    let a = engine_gradient("vendor_a", "pbe").unwrap();
    let h = engine_gradient("host", "pbe").unwrap();

    assert_eq!(a, h);
}

#[test]
fn test_gradient_not_supported_on_vendor_b() {
    for scheme in ["slater", "pbe"] {
        let err = engine_gradient("vendor_b", scheme).unwrap_err();

        assert!(err.is_capability(), "{}", err);
    }
}

#[test]
fn test_gradient_output_too_short() {
    let mol = water();
    let basis = water_sto3g(&mol);
    let nbf = basis.nbf();

    let tasks = grid_tasks(&mol, &basis, 1, 8, false, 2);
    let p = random_density(nbf, 4, 5);

    let mut xcint = XcIntegrator::new(&control("vendor_a", 1, "slater"), mol, basis, task_list(tasks)).unwrap();

    let mut grad = vec![0.0; 5];
    let err = xcint.eval_exc_grad(nbf, nbf, &p, nbf, &mut grad).unwrap_err();

    assert!(matches!(err, EngineError::Precondition(_)));
}
