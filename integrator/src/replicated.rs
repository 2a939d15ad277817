//! Replicated integrator: every worker holds full matrices and processes
//! its share of the tasks; the reduction driver combines the partial sums.

use crate::driver::LocalWorkDriver;
use crate::reduction::{LocalReduction, ReductionDriver};
use crate::stages::{functional_is_gga, DensityKind};
use crate::EngineError;

use basis::{BasisSet, BasisSetMap, Molecule};
use control::Control;
use device::{Backend, StaticField};
use gridtask::TaskList;
use matrix::Matrix;
use std::sync::Arc;
use xc::XcFunctional;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExxSettings {
    /// Request a symmetrized K.
    pub symmetrize: bool,
    /// Cou shells with an energy estimate below this are dropped before
    /// the G build; 0 disables the pre-pass.
    pub ek_tolerance: f64,
}

impl ExxSettings {
    pub fn from_control(control: &Control) -> ExxSettings {
        ExxSettings {
            symmetrize: control.get_exx_symmetrize(),
            ek_tolerance: control.get_exx_ek_tolerance(),
        }
    }
}

/// Cou shell counts of the last exchange call, summed over tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExxScreeningStats {
    pub cou_shells: usize,
    pub kept_shells: usize,
}

impl ExxScreeningStats {
    pub fn pruned_shells(&self) -> usize {
        self.cou_shells - self.kept_shells
    }
}

pub struct XcIntegrator {
    mol: Molecule,
    basis: BasisSet,
    map: BasisSetMap,
    tasks: TaskList,
    max_tasks_per_batch: usize,
    driver: LocalWorkDriver,
    reduction: Box<dyn ReductionDriver>,
    exx_stats: ExxScreeningStats,
}

impl XcIntegrator {
    pub fn new(control: &Control, mol: Molecule, basis: BasisSet, tasks: TaskList) -> Result<XcIntegrator, EngineError> {
        let backend = Backend::new(
            control.get_backend(),
            control.get_device_memory_words(),
            control.get_n_aux_queues(),
        )?;

        let functional: Arc<dyn XcFunctional> = Arc::from(xc::new(control.get_xc_scheme())?);

        let dispatch = shellpair::dispatch::new(control.get_exx_batching()).ok_or_else(|| {
            EngineError::Precondition(format!("unknown exx_batching '{}'", control.get_exx_batching()))
        })?;

        log::info!(
            "xc integrator: backend {}, {} auxiliary queues, functional {}, {} exx batching",
            backend.name(),
            backend.n_aux_queues(),
            functional.name(),
            dispatch.name()
        );

        let map = BasisSetMap::new(&basis);

        Ok(XcIntegrator {
            mol,
            basis,
            map,
            tasks,
            max_tasks_per_batch: control.get_max_tasks_per_batch(),
            driver: LocalWorkDriver::new(backend, DensityKind::ClosedShell, functional, dispatch),
            reduction: Box::new(LocalReduction),
            exx_stats: ExxScreeningStats::default(),
        })
    }

    pub fn get_backend(&self) -> &Backend {
        self.driver.get_stages().get_backend()
    }

    pub fn get_driver(&self) -> &LocalWorkDriver {
        &self.driver
    }

    pub fn get_driver_mut(&mut self) -> &mut LocalWorkDriver {
        &mut self.driver
    }

    pub fn get_basis_map(&self) -> &BasisSetMap {
        &self.map
    }

    pub fn get_tasks(&self) -> &TaskList {
        &self.tasks
    }

    pub fn set_tasks(&mut self, tasks: TaskList) {
        self.tasks = tasks;
    }

    pub fn set_max_tasks_per_batch(&mut self, n: usize) {
        self.max_tasks_per_batch = n;
    }

    pub fn set_functional(&mut self, functional: Arc<dyn XcFunctional>) {
        self.driver.set_functional(functional);
    }

    pub fn set_density_kind(&mut self, density: DensityKind) {
        self.driver.get_stages_mut().set_density_kind(density);
    }

    pub fn set_reduction(&mut self, reduction: Box<dyn ReductionDriver>) {
        self.reduction = reduction;
    }

    pub fn get_exx_screening_stats(&self) -> &ExxScreeningStats {
        &self.exx_stats
    }

    /// NEL = ∫ ρ
    pub fn integrate_den(&mut self, m: usize, n: usize, p: &[f64], ldp: usize) -> Result<f64, EngineError> {
        log::info!("integrate_den: {} tasks, {} points", self.tasks.len(), self.tasks.total_points());

        self.begin_call(m, n, p, ldp)?;

        for batch in self.tasks.batches(self.max_tasks_per_batch) {
            self.driver.eval_den(batch, &self.basis, &self.map)?;
        }

        let mut nel = [self.driver.read_scalar(StaticField::Nel)?];
        self.reduction.allreduce_inplace(&mut nel);

        Ok(nel[0])
    }

    /// Returns (EXC, NEL) and writes the symmetric VXC.
    pub fn eval_exc_vxc(
        &mut self,
        m: usize,
        n: usize,
        p: &[f64],
        ldp: usize,
        vxc: &mut [f64],
        ldvxc: usize,
    ) -> Result<(f64, f64), EngineError> {
        log::info!("eval_exc_vxc: {} tasks, {} points", self.tasks.len(), self.tasks.total_points());

        check_matrix("VXC", self.basis.nbf(), vxc.len(), ldvxc)?;
        functional_is_gga(self.driver.get_functional().as_ref())?;

        self.begin_call(m, n, p, ldp)?;

        for batch in self.tasks.batches(self.max_tasks_per_batch) {
            self.driver.eval_exc_vxc(batch, &self.basis, &self.map)?;
        }

        self.driver.symmetrize_vxc()?;

        let mut scalars = [
            self.driver.read_scalar(StaticField::Exc)?,
            self.driver.read_scalar(StaticField::Nel)?,
        ];
        self.reduction.allreduce_inplace(&mut scalars);

        self.write_matrix(StaticField::Vxc, vxc, ldvxc)?;

        Ok((scalars[0], scalars[1]))
    }

    /// Spin-polarized EXC and NEL from Ps = Pα + Pβ and Pz = Pα - Pβ.
    /// Writes VXCs = ½(Vα + Vβ) and VXCz = ½(Vα - Vβ), both symmetric.
    #[allow(clippy::too_many_arguments)]
    pub fn eval_exc_vxc_polarized(
        &mut self,
        m: usize,
        n: usize,
        ps: &[f64],
        ldps: usize,
        pz: &[f64],
        ldpz: usize,
        vxcs: &mut [f64],
        ldvxcs: usize,
        vxcz: &mut [f64],
        ldvxcz: usize,
    ) -> Result<(f64, f64), EngineError> {
        log::info!(
            "eval_exc_vxc_polarized: {} tasks, {} points",
            self.tasks.len(),
            self.tasks.total_points()
        );

        let nbf = self.basis.nbf();
        check_matrix("VXCs", nbf, vxcs.len(), ldvxcs)?;
        check_matrix("VXCz", nbf, vxcz.len(), ldvxcz)?;
        functional_is_gga(self.driver.get_functional().as_ref())?;

        let dmat = self.load_density("Ps", m, n, ps, ldps)?;
        let dmat_z = self.load_density("Pz", m, n, pz, ldpz)?;

        self.driver.begin_call(&self.mol, &self.basis, dmat, Some(dmat_z))?;

        for batch in self.tasks.batches(self.max_tasks_per_batch) {
            self.driver.eval_exc_vxc_polarized(batch, &self.basis, &self.map)?;
        }

        self.driver.symmetrize_vxc()?;

        let mut scalars = [
            self.driver.read_scalar(StaticField::Exc)?,
            self.driver.read_scalar(StaticField::Nel)?,
        ];
        self.reduction.allreduce_inplace(&mut scalars);

        self.write_matrix(StaticField::Vxc, vxcs, ldvxcs)?;
        self.write_matrix(StaticField::VxcZ, vxcz, ldvxcz)?;

        Ok((scalars[0], scalars[1]))
    }

    /// Writes dEXC/dR, three components per atom.
    pub fn eval_exc_grad(
        &mut self,
        m: usize,
        n: usize,
        p: &[f64],
        ldp: usize,
        exc_grad: &mut [f64],
    ) -> Result<(), EngineError> {
        log::info!("eval_exc_grad: {} tasks, {} atoms", self.tasks.len(), self.mol.natoms());

        let ngrad = 3 * self.mol.natoms();

        if exc_grad.len() < ngrad {
            return Err(EngineError::Precondition(format!(
                "EXC_GRAD holds {} values, {} required",
                exc_grad.len(),
                ngrad
            )));
        }

        let gga = functional_is_gga(self.driver.get_functional().as_ref())?;

        let backend = self.get_backend();
        backend.require_exc_gradient()?;
        if gga {
            backend.require_hessian()?;
        }

        self.begin_call(m, n, p, ldp)?;

        for batch in self.tasks.batches(self.max_tasks_per_batch) {
            self.driver.eval_exc_grad(batch, &self.basis, &self.map)?;
        }

        let mut grad = self.driver.read_static(StaticField::ExcGrad)?;
        self.reduction.allreduce_inplace(&mut grad);

        exc_grad[..ngrad].copy_from_slice(&grad[..ngrad]);

        Ok(())
    }

    /// Writes the exchange matrix K (not symmetrized).
    #[allow(clippy::too_many_arguments)]
    pub fn eval_exx(
        &mut self,
        m: usize,
        n: usize,
        p: &[f64],
        ldp: usize,
        k: &mut [f64],
        ldk: usize,
        settings: &ExxSettings,
    ) -> Result<(), EngineError> {
        log::info!("eval_exx: {} tasks, {} points", self.tasks.len(), self.tasks.total_points());

        check_matrix("K", self.basis.nbf(), k.len(), ldk)?;

        if settings.symmetrize {
            self.driver.get_stages().symmetrize_exx_k()?;
        }

        shellpair::ShellPairBatcher::validate_basis(&self.basis)?;

        if !(settings.ek_tolerance >= 0.0) {
            return Err(EngineError::Precondition(format!(
                "EK tolerance {} is negative",
                settings.ek_tolerance
            )));
        }

        self.begin_call(m, n, p, ldp)?;

        let mut stats = ExxScreeningStats::default();

        for batch in self.tasks.batches(self.max_tasks_per_batch) {
            stats.cou_shells += batch.iter().map(|t| t.get_cou_screening().nshells()).sum::<usize>();

            if settings.ek_tolerance > 0.0 {
                let screened = self
                    .driver
                    .eval_exx_ek_screening(batch, &self.basis, &self.map, settings.ek_tolerance)?;

                stats.kept_shells += screened.iter().map(|t| t.get_cou_screening().nshells()).sum::<usize>();

                self.driver.eval_exx(&screened, &self.basis, &self.map)?;
            } else {
                stats.kept_shells = stats.cou_shells;

                self.driver.eval_exx(batch, &self.basis, &self.map)?;
            }
        }

        if settings.ek_tolerance > 0.0 {
            log::info!(
                "EK screening (tol {:e}): kept {} of {} cou shells",
                settings.ek_tolerance,
                stats.kept_shells,
                stats.cou_shells
            );
        }

        self.exx_stats = stats;

        self.write_matrix(StaticField::ExxK, k, ldk)?;

        Ok(())
    }

    fn begin_call(&mut self, m: usize, n: usize, p: &[f64], ldp: usize) -> Result<(), EngineError> {
        let dmat = self.load_density("P", m, n, p, ldp)?;

        self.driver.begin_call(&self.mol, &self.basis, dmat, None)
    }

    fn load_density(&self, name: &str, m: usize, n: usize, p: &[f64], ldp: usize) -> Result<Vec<f64>, EngineError> {
        let nbf = self.basis.nbf();

        if m != nbf || n != nbf {
            return Err(EngineError::Precondition(format!(
                "density matrix is {} x {}, basis has {} functions",
                m, n, nbf
            )));
        }

        check_matrix(name, nbf, p.len(), ldp)?;

        if !self.tasks.modified_weights_are_stored() {
            return Err(EngineError::Precondition(
                "quadrature weights have not been partitioned".to_string(),
            ));
        }

        Ok(Matrix::from_ld_slice(nbf, nbf, p, ldp).into_vec())
    }

    fn write_matrix(&mut self, field: StaticField, out: &mut [f64], ld: usize) -> Result<(), EngineError> {
        let nbf = self.basis.nbf();

        let mut data = self.driver.read_static(field)?;
        self.reduction.allreduce_inplace(&mut data);

        Matrix::from_vec(nbf, nbf, data).write_to_ld_slice(out, ld);

        Ok(())
    }
}

fn check_matrix(name: &str, nbf: usize, len: usize, ld: usize) -> Result<(), EngineError> {
    if ld < nbf {
        return Err(EngineError::Precondition(format!(
            "leading dimension of {} is {}, must be at least {}",
            name, ld, nbf
        )));
    }

    let required = if nbf == 0 { 0 } else { ld * (nbf - 1) + nbf };

    if len < required {
        return Err(EngineError::Precondition(format!(
            "{} holds {} values, {} required",
            name, len, required
        )));
    }

    Ok(())
}
