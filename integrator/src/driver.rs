//! Local work driver: runs the stage sequence of one entry point over one
//! batch of tasks and owns the device state that persists across batches.

use crate::collocation::Derivative;
use crate::stages::{functional_is_gga, DensityKind, PipelineStages};
use crate::upload::{LocalWorkData, TaskUpload};
use crate::EngineError;

use basis::{BasisSet, BasisSetMap, Molecule};
use device::{Backend, ConcurrencyManager, DeviceArena, Requirements, StaticField};
use gridtask::{GridTask, Screening};
use shellpair::{BoysTable, GmatDispatch, ShellPairBatcher};
use std::sync::Arc;
use xc::XcFunctional;

pub struct LocalWorkDriver {
    stages: PipelineStages,
    arena: DeviceArena,
    cm: ConcurrencyManager,
    functional: Arc<dyn XcFunctional>,
    dispatch: Box<dyn GmatDispatch>,
    boys: Arc<BoysTable>,
}

impl LocalWorkDriver {
    pub fn new(
        backend: Backend,
        density: DensityKind,
        functional: Arc<dyn XcFunctional>,
        dispatch: Box<dyn GmatDispatch>,
    ) -> LocalWorkDriver {
        LocalWorkDriver {
            arena: DeviceArena::new(backend.memory_words()),
            cm: ConcurrencyManager::for_backend(&backend),
            stages: PipelineStages::new(backend, density),
            functional,
            dispatch,
            boys: Arc::new(BoysTable::default()),
        }
    }

    pub fn get_stages(&self) -> &PipelineStages {
        &self.stages
    }

    pub fn get_stages_mut(&mut self) -> &mut PipelineStages {
        &mut self.stages
    }

    pub fn get_arena(&self) -> &DeviceArena {
        &self.arena
    }

    pub fn get_queues(&self) -> &ConcurrencyManager {
        &self.cm
    }

    pub fn get_functional(&self) -> &Arc<dyn XcFunctional> {
        &self.functional
    }

    pub fn set_functional(&mut self, functional: Arc<dyn XcFunctional>) {
        self.functional = functional;
    }

    pub fn get_dispatch(&self) -> &dyn GmatDispatch {
        self.dispatch.as_ref()
    }

    pub fn set_dispatch(&mut self, dispatch: Box<dyn GmatDispatch>) {
        self.dispatch = dispatch;
    }

    /// Clears the queues, makes the static region resident and enqueues the
    /// density upload plus the zeroing of every accumulator. `dmat_z` is the
    /// magnetization density of a spin-polarized call.
    pub fn begin_call(
        &mut self,
        mol: &Molecule,
        basis: &BasisSet,
        dmat: Vec<f64>,
        dmat_z: Option<Vec<f64>>,
    ) -> Result<(), EngineError> {
        self.cm.reset();

        if self.arena.ensure_static(mol, basis)? {
            log::debug!("new (molecule, basis) lifetime, generation {}", self.arena.generation());
        }

        self.cm.enqueue_master(move |arena| {
            arena.zero_accumulators()?;
            arena.static_slice_mut(StaticField::Dmat)?.copy_from_slice(&dmat);

            if let Some(dmat_z) = dmat_z {
                arena.static_slice_mut(StaticField::DmatZ)?.copy_from_slice(&dmat_z);
            }

            Ok(())
        });

        Ok(())
    }

    fn prepare(
        &mut self,
        tasks: &[GridTask],
        basis: &BasisSet,
        map: &BasisSetMap,
        requirements: Requirements,
    ) -> Result<LocalWorkData, EngineError> {
        self.arena.reset_for_next_call();

        let kind = self.stages.get_backend().kind();
        let layout = self.arena.allocate_for(tasks, requirements)?;
        let data = TaskUpload::prepare(kind, tasks, basis, map, layout)?;

        TaskUpload::enqueue_points(tasks, &mut self.cm);

        Ok(data)
    }

    /// Density integration over one batch.
    pub fn eval_den(&mut self, tasks: &[GridTask], basis: &BasisSet, map: &BasisSetMap) -> Result<(), EngineError> {
        let data = self.prepare(tasks, basis, map, Requirements::integrate_den())?;

        let (s, cm, arena) = (&self.stages, &mut self.cm, &mut self.arena);

        s.eval_collocation(&data, Derivative::Value, cm)?;
        s.pack_density(&data, cm)?;
        cm.sync_aux_with_master(arena)?;

        s.eval_xmat(&data, false, cm)?;
        s.eval_uvvars(&data, false, cm)?;
        cm.sync_master_with_aux(arena)?;

        s.inc_nel(&data, cm)?;
        cm.synchronize(arena)?;

        Ok(())
    }

    /// EXC, NEL and the lower triangle of VXC over one batch.
    pub fn eval_exc_vxc(&mut self, tasks: &[GridTask], basis: &BasisSet, map: &BasisSetMap) -> Result<(), EngineError> {
        let gga = functional_is_gga(self.functional.as_ref())?;
        self.exc_vxc_batch(tasks, basis, map, Requirements::exc_vxc(gga))
    }

    /// Spin-polarized EXC, NEL and the lower triangles of VXCs and VXCz
    /// over one batch.
    pub fn eval_exc_vxc_polarized(
        &mut self,
        tasks: &[GridTask],
        basis: &BasisSet,
        map: &BasisSetMap,
    ) -> Result<(), EngineError> {
        let gga = functional_is_gga(self.functional.as_ref())?;
        self.exc_vxc_batch(tasks, basis, map, Requirements::exc_vxc_polarized(gga))
    }

    fn exc_vxc_batch(
        &mut self,
        tasks: &[GridTask],
        basis: &BasisSet,
        map: &BasisSetMap,
        requirements: Requirements,
    ) -> Result<(), EngineError> {
        let gga = requirements.den_grad;
        let data = self.prepare(tasks, basis, map, requirements)?;

        let (s, cm, arena) = (&self.stages, &mut self.cm, &mut self.arena);
        let deriv = if gga { Derivative::Gradient } else { Derivative::Value };

        s.eval_collocation(&data, deriv, cm)?;
        s.pack_density(&data, cm)?;
        cm.sync_aux_with_master(arena)?;

        s.eval_xmat(&data, false, cm)?;
        s.eval_uvvars(&data, gga, cm)?;
        s.eval_functional(&data, &self.functional, cm)?;
        s.eval_weights(&data, gga, cm)?;
        s.eval_zmat(&data, gga, cm)?;
        s.inc_vxc(&data, arena, cm)?;

        s.inc_exc(&data, cm)?;
        s.inc_nel(&data, cm)?;
        cm.synchronize(arena)?;

        Ok(())
    }

    /// EXC nuclear gradient (plus EXC and NEL) over one batch.
    pub fn eval_exc_grad(&mut self, tasks: &[GridTask], basis: &BasisSet, map: &BasisSetMap) -> Result<(), EngineError> {
        let gga = functional_is_gga(self.functional.as_ref())?;

        let backend = self.stages.get_backend();
        backend.require_exc_gradient()?;
        if gga {
            backend.require_hessian()?;
        }

        let data = self.prepare(tasks, basis, map, Requirements::exc_grad(gga))?;

        let (s, cm, arena) = (&self.stages, &mut self.cm, &mut self.arena);
        let deriv = if gga { Derivative::Hessian } else { Derivative::Gradient };

        s.eval_collocation(&data, deriv, cm)?;
        s.pack_density(&data, cm)?;
        cm.sync_aux_with_master(arena)?;

        s.eval_xmat(&data, gga, cm)?;
        s.eval_uvvars(&data, gga, cm)?;
        s.eval_functional(&data, &self.functional, cm)?;
        s.eval_weights(&data, gga, cm)?;
        cm.sync_master_with_aux(arena)?;

        s.inc_exc_grad(&data, gga, cm)?;
        s.inc_exc(&data, cm)?;
        s.inc_nel(&data, cm)?;
        cm.synchronize(arena)?;

        Ok(())
    }

    /// Energy-based pre-pass for the exchange build: returns `tasks` with
    /// every cou shell whose estimate falls below `tolerance` removed.
    pub fn eval_exx_ek_screening(
        &mut self,
        tasks: &[GridTask],
        basis: &BasisSet,
        map: &BasisSetMap,
        tolerance: f64,
    ) -> Result<Vec<GridTask>, EngineError> {
        let data = self.prepare(tasks, basis, map, Requirements::exx())?;

        let (s, cm, arena) = (&self.stages, &mut self.cm, &mut self.arena);

        s.eval_collocation(&data, Derivative::Value, cm)?;
        s.pack_exx_density(&data, cm)?;
        cm.sync_aux_with_master(arena)?;

        s.eval_exx_fmat(&data, cm)?;
        s.eval_exx_ek_bounds(&data, cm)?;
        cm.synchronize(arena)?;

        let mut screened = Vec::with_capacity(tasks.len());

        for (itask, task) in tasks.iter().enumerate() {
            let cou = task.get_cou_screening().get_shell_list();

            let kept: Vec<usize> = if task.npts() == 0 {
                Vec::new()
            } else {
                let buf = self.arena.task_buffers_mut(itask)?;

                cou.iter()
                    .zip(buf.gmat[..cou.len()].iter())
                    .filter(|(_, e)| **e >= tolerance)
                    .map(|(ish, _)| *ish)
                    .collect()
            };

            screened.push(task.clone().with_cou_screening(Screening::new(&kept, map)));
        }

        Ok(screened)
    }

    /// Exchange matrix contribution of one batch.
    pub fn eval_exx(&mut self, tasks: &[GridTask], basis: &BasisSet, map: &BasisSetMap) -> Result<(), EngineError> {
        let batcher = Arc::new(ShellPairBatcher::new(basis, map, tasks)?);
        let data = self.prepare(tasks, basis, map, Requirements::exx())?;

        let (s, cm, arena) = (&self.stages, &mut self.cm, &mut self.arena);

        s.eval_collocation(&data, Derivative::Value, cm)?;
        s.pack_exx_density(&data, cm)?;
        cm.sync_aux_with_master(arena)?;

        s.eval_exx_fmat(&data, cm)?;
        cm.sync_master_with_aux(arena)?;

        s.eval_exx_gmat(&data, &batcher, &self.boys, self.dispatch.as_ref(), cm)?;
        cm.sync_aux_with_master(arena)?;

        s.inc_exx_k(&data, arena, cm)?;
        cm.synchronize(arena)?;

        Ok(())
    }

    pub fn symmetrize_vxc(&mut self) -> Result<(), EngineError> {
        self.stages.symmetrize_vxc(&mut self.cm);
        self.cm.synchronize(&mut self.arena)?;

        Ok(())
    }

    pub fn read_scalar(&mut self, field: StaticField) -> Result<f64, EngineError> {
        Ok(self.cm.read_scalar(&mut self.arena, field)?)
    }

    /// Drains the queues and copies a static field out.
    pub fn read_static(&mut self, field: StaticField) -> Result<Vec<f64>, EngineError> {
        self.cm.synchronize(&mut self.arena)?;

        Ok(self.arena.static_slice(field)?.to_vec())
    }
}
