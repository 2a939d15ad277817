mod common;

use basis::{BasisSet, BasisSetMap, Shell};
use common::*;
use device::{Backend, BackendKind, ConcurrencyManager, DeviceArena, DeviceError, Requirements};
use gridtask::{GridTask, Screening};
use integrator::*;
use std::sync::Arc;
use xc::{XcError, XcFamily, XcFunctional};

struct NanFunctional;

impl XcFunctional for NanFunctional {
    fn family(&self) -> XcFamily {
        XcFamily::Lda
    }

    fn name(&self) -> &str {
        "nan"
    }

    fn eval_exc_vxc_lda(&self, _rho: &[f64], eps: &mut [f64], vrho: &mut [f64]) -> Result<(), XcError> {
        eps.iter_mut().for_each(|v| *v = 0.0);
        vrho.iter_mut().for_each(|v| *v = f64::NAN);
        Ok(())
    }
}

struct MetaFunctional;

impl XcFunctional for MetaFunctional {
    fn family(&self) -> XcFamily {
        XcFamily::MetaGga
    }

    fn name(&self) -> &str {
        "meta"
    }
}

fn water_integrator(backend: &str, xc_scheme: &str) -> (XcIntegrator, Vec<f64>, usize) {
    let mol = water();
    let basis = water_sto3g(&mol);
    let nbf = basis.nbf();

    let tasks = grid_tasks(&mol, &basis, 2, 10, true, 4);
    let xcint = XcIntegrator::new(&control(backend, 2, xc_scheme), mol, basis, task_list(tasks)).unwrap();

    (xcint, random_density(nbf, 4, 1), nbf)
}

#[test]
fn test_unpartitioned_weights_are_rejected() {
    let (mut xcint, p, nbf) = water_integrator("vendor_a", "slater");

    let mut tasks = xcint.get_tasks().clone();
    tasks.set_modified_weights_are_stored(false);
    xcint.set_tasks(tasks);

    let err = xcint.integrate_den(nbf, nbf, &p, nbf).unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));

    // nothing was enqueued
    assert_eq!(xcint.get_driver().get_queues().pending_commands(), 0);
}

#[test]
fn test_malformed_dimensions_are_rejected() {
    let (mut xcint, p, nbf) = water_integrator("vendor_a", "slater");
    let mut vxc = vec![0.0; nbf * nbf];

    let cases = [
        xcint.integrate_den(nbf - 1, nbf, &p, nbf),
        xcint.integrate_den(nbf, nbf, &p, nbf - 1),
        xcint.integrate_den(nbf, nbf, &p[..nbf * nbf - 1], nbf),
    ];

    for err in cases {
        assert!(matches!(err, Err(EngineError::Precondition(_))));
    }

    let err = xcint.eval_exc_vxc(nbf, nbf, &p, nbf, &mut vxc[..nbf], nbf).unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));
}

#[test]
fn test_meta_gga_is_a_capability_error() {
    let (mut xcint, p, nbf) = water_integrator("vendor_a", "slater");
    xcint.set_functional(Arc::new(MetaFunctional));

    let mut vxc = vec![0.0; nbf * nbf];
    let err = xcint.eval_exc_vxc(nbf, nbf, &p, nbf, &mut vxc, nbf).unwrap_err();

    assert!(matches!(err, EngineError::Capability(_)));
}

#[test]
fn test_vendor_b_supports_energy_and_potential() {
    let (mut xcint, p, nbf) = water_integrator("vendor_b", "pbe");

    let mut vxc = vec![0.0; nbf * nbf];
    let (exc, nel) = xcint.eval_exc_vxc(nbf, nbf, &p, nbf, &mut vxc, nbf).unwrap();

    assert!(exc < 0.0);
    assert!(nel > 0.0);
}

#[test]
fn test_spherical_f_collocation_is_a_capability_error() {
    let mol = water();
    let mut shells = water_sto3g(&mol).get_shells().to_vec();

    let mut f = Shell::new(3, true, &[0.8], &[1.0], mol.get_atom(0).get_position(), 0);
    f.normalize();
    shells.push(f);

    let basis = BasisSet::new(shells);
    let nbf = basis.nbf();
    let tasks = grid_tasks(&mol, &basis, 1, 8, false, 4);

    let mut xcint = XcIntegrator::new(&control("host", 1, "slater"), mol, basis, task_list(tasks)).unwrap();

    let err = xcint
        .integrate_den(nbf, nbf, &random_density(nbf, 3, 2), nbf)
        .unwrap_err();

    assert!(err.is_capability(), "{}", err);
}

#[test]
fn test_non_finite_functional_output_fails_the_call() {
    let (mut xcint, p, nbf) = water_integrator("vendor_a", "slater");
    let mut vxc = vec![0.0; nbf * nbf];

    xcint.set_functional(Arc::new(NanFunctional));
    let err = xcint.eval_exc_vxc(nbf, nbf, &p, nbf, &mut vxc, nbf).unwrap_err();

    assert!(matches!(err, EngineError::Device(DeviceError::Kernel(_))));
    assert!(xcint.get_driver().get_queues().has_error());

    // the next call starts clean
    xcint.set_functional(Arc::from(xc::new("slater").unwrap()));
    assert!(xcint.eval_exc_vxc(nbf, nbf, &p, nbf, &mut vxc, nbf).is_ok());
}

#[test]
fn test_asynchronous_errors_surface_at_the_next_sync() {
    let mol = water();
    let basis = water_sto3g(&mol);
    let map = BasisSetMap::new(&basis);
    let tasks = grid_tasks(&mol, &basis, 1, 6, true, 3);

    let backend = Backend::new("vendor_a", 1 << 20, 2).unwrap();
    let stages = PipelineStages::new(backend, DensityKind::ClosedShell);

    let mut arena = DeviceArena::new(backend.memory_words());
    let mut cm = ConcurrencyManager::for_backend(&backend);

    arena.ensure_static(&mol, &basis).unwrap();
    let layout = arena.allocate_for(&tasks, Requirements::exc_vxc(false)).unwrap();
    let data = TaskUpload::prepare(BackendKind::VendorA, &tasks, &basis, &map, layout).unwrap();

    let func: Arc<dyn XcFunctional> = Arc::new(NanFunctional);

    // enqueueing never reports the failure
    stages.eval_functional(&data, &func, &mut cm).unwrap();
    assert!(!cm.has_error());
    assert_eq!(cm.pending_commands(), tasks.len());

    let first = cm.synchronize(&mut arena).unwrap_err();
    assert!(matches!(first, DeviceError::Kernel(_)));

    // sticky until reset
    stages.inc_nel(&data, &mut cm).unwrap();
    assert_eq!(cm.pending_commands(), 0);
    assert_eq!(cm.synchronize(&mut arena).unwrap_err(), first);

    cm.reset();
    assert!(cm.synchronize(&mut arena).is_ok());
}

#[test]
fn test_local_work_data_is_bound_to_its_backend() {
    let mol = water();
    let basis = water_sto3g(&mol);
    let map = BasisSetMap::new(&basis);
    let tasks = grid_tasks(&mol, &basis, 1, 6, true, 3);

    let backend = Backend::new("vendor_a", 1 << 20, 2).unwrap();
    let stages = PipelineStages::new(backend, DensityKind::ClosedShell);

    let mut arena = DeviceArena::new(backend.memory_words());
    let mut cm = ConcurrencyManager::for_backend(&backend);

    arena.ensure_static(&mol, &basis).unwrap();
    let layout = arena.allocate_for(&tasks, Requirements::integrate_den()).unwrap();
    let data = TaskUpload::prepare(BackendKind::VendorB, &tasks, &basis, &map, layout).unwrap();

    let err = stages
        .eval_collocation(&data, collocation::Derivative::Value, &mut cm)
        .unwrap_err();

    assert_eq!(
        err,
        EngineError::Binding {
            expected: "vendor_a",
            found: "vendor_b"
        }
    );
    assert_eq!(cm.pending_commands(), 0);
}

#[test]
fn test_out_of_range_shells_are_rejected() {
    let mol = water();
    let basis = water_sto3g(&mol);
    let map = BasisSetMap::new(&basis);
    let nbf = basis.nbf();
    let nshells = basis.nshells();

    let mut tasks = grid_tasks(&mol, &basis, 1, 6, true, 3);
    let bad = Screening::new(&[0, nshells + 2], &map);
    assert_eq!(bad.nbe(), map.shell_size(0));

    let t = &tasks[1];
    tasks[1] = GridTask::new(t.get_iparent(), t.get_points().to_vec(), t.get_weights().to_vec(), bad);

    let mut arena = DeviceArena::new(1 << 20);
    arena.ensure_static(&mol, &basis).unwrap();
    let layout = arena.allocate_for(&tasks, Requirements::integrate_den()).unwrap();

    let err = TaskUpload::prepare(BackendKind::HostReference, &tasks, &basis, &map, layout).unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));

    // also through the entry points, for both screening lists
    let good = grid_tasks(&mol, &basis, 1, 6, true, 3);
    let cou_bad: Vec<GridTask> = good
        .iter()
        .cloned()
        .map(|t| t.with_cou_screening(Screening::new(&[nshells], &map)))
        .collect();

    let p = random_density(nbf, 4, 1);
    let mut vxc = vec![0.0; nbf * nbf];
    let mut k = vec![0.0; nbf * nbf];

    let mut xcint = XcIntegrator::new(&control("host", 1, "slater"), mol, basis, task_list(tasks)).unwrap();
    let err = xcint.eval_exc_vxc(nbf, nbf, &p, nbf, &mut vxc, nbf).unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));

    xcint.set_tasks(task_list(cou_bad));
    let err = xcint.integrate_den(nbf, nbf, &p, nbf).unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));
    assert!(xcint.eval_exx(nbf, nbf, &p, nbf, &mut k, nbf, &ExxSettings::default()).is_err());
}

#[test]
fn test_device_out_of_memory() {
    let mol = water();
    let basis = water_sto3g(&mol);
    let nbf = basis.nbf();
    let tasks = grid_tasks(&mol, &basis, 2, 40, false, 4);

    let mut control = control("vendor_a", 2, "slater");
    control.set_device_memory_mb(0.004);

    let mut xcint = XcIntegrator::new(&control, mol, basis, task_list(tasks)).unwrap();
    let err = xcint
        .integrate_den(nbf, nbf, &random_density(nbf, 3, 2), nbf)
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Device(DeviceError::OutOfMemory { .. })
    ));
}

#[test]
fn test_unknown_backend_is_reported() {
    let mol = water();
    let basis = water_sto3g(&mol);
    let tasks = grid_tasks(&mol, &basis, 1, 4, false, 4);

    let result = XcIntegrator::new(&control("vendor_c", 1, "slater"), mol, basis, task_list(tasks));

    assert!(matches!(
        result,
        Err(EngineError::Device(DeviceError::UnknownBackend(_)))
    ));
}
