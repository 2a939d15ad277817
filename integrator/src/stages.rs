//! Stages of one local-work call.
//!
//! Every stage enqueues its work on the concurrency manager and returns;
//! nothing runs until the next barrier. Stages that hand results from the
//! auxiliary queues to the master queue issue that barrier themselves.
//! Matrices in the task slabs are column-major with ld = npts (basis
//! function blocks) or ld = nbe (packed submatrices).

use crate::collocation::{collocate_shell, hessian_index, Derivative};
use crate::submat::{pack, scatter_add, scatter_add_lower};
use crate::upload::{LocalWorkData, ShellSlot, TaskMeta};
use crate::EngineError;

use device::{
    AuxContext, Backend, CollocationOrder, ConcurrencyManager, DeviceArena, DeviceError, Field, StaticField,
    TaskBuffers,
};
use matrix::blas;
use rayon::prelude::*;
use shellpair::{BoysTable, GmatDispatch, ShellPairBatcher};
use std::sync::Arc;
use xc::{XcFamily, XcFunctional};
use xwconsts::*;

/// Which density the packed matrix represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DensityKind {
    /// Total density of a closed-shell system.
    ClosedShell,
    /// One spin component.
    SpinComponent,
}

impl DensityKind {
    /// fac in X = fac B P.
    pub fn xmat_factor(&self) -> f64 {
        match self {
            DensityKind::ClosedShell => XMAT_FACTOR_CLOSED_SHELL,
            DensityKind::SpinComponent => XMAT_FACTOR_SPIN_COMPONENT,
        }
    }
}

/// Resolves the evaluation path of a functional; meta-GGA has none.
pub fn functional_is_gga(functional: &dyn XcFunctional) -> Result<bool, EngineError> {
    match functional.family() {
        XcFamily::Lda => Ok(false),
        XcFamily::Gga => Ok(true),
        XcFamily::MetaGga => Err(EngineError::Capability(format!(
            "meta-GGA functional '{}'",
            functional.name()
        ))),
    }
}

fn for_each_task<F>(data: &LocalWorkData, cm: &mut ConcurrencyManager, f: F)
where
    F: Fn(&TaskMeta, &mut AuxContext<'_>) -> Result<(), DeviceError> + Send + Sync + 'static,
{
    let f = Arc::new(f);

    for itask in 0..data.ntasks() {
        let metas = Arc::clone(data.metas());
        let f = Arc::clone(&f);
        let queue = cm.aux_queue_for(itask);

        cm.enqueue_aux(queue, itask, move |ctx| f(&metas[ctx.task], ctx));
    }
}

// out[g] = scale Σ_μ a[g, μ] x[g, μ]
fn hadamard_row_sum(npts: usize, nbe: usize, scale: f64, a: &[f64], x: &[f64], out: &mut [f64]) {
    let out = &mut out[..npts];
    out.iter_mut().for_each(|v| *v = 0.0);

    for mu in 0..nbe {
        let acol = &a[mu * npts..(mu + 1) * npts];
        let xcol = &x[mu * npts..(mu + 1) * npts];

        for (o, (av, xv)) in out.iter_mut().zip(acol.iter().zip(xcol.iter())) {
            *o += av * xv;
        }
    }

    out.iter_mut().for_each(|v| *v *= scale);
}

// Spin channels from (ρs, ρz) = (ρ↑ + ρ↓, ρ↑ - ρ↓), with ρs and ∇ρs already
// in den and den_x/y/z.
fn spin_uvvars(n: usize, nbe: usize, gga: bool, b: &mut TaskBuffers<'_>) -> Result<(), DeviceError> {
    b.require(Field::ZmatMag, n * nbe)?;
    b.require(Field::DenMag, n)?;
    b.require(Field::RhoSpin, 2 * n)?;

    hadamard_row_sum(n, nbe, 1.0, &*b.bf, &*b.zmat_mag, &mut *b.den_mag);

    for g in 0..n {
        b.rho_spin[2 * g] = 0.5 * (b.den[g] + b.den_mag[g]);
        b.rho_spin[2 * g + 1] = 0.5 * (b.den[g] - b.den_mag[g]);
    }

    if !gga {
        return Ok(());
    }

    b.require(Field::DenMagZ, n)?;
    b.require(Field::GammaSpin, 3 * n)?;

    hadamard_row_sum(n, nbe, 2.0, &*b.dbfx, &*b.zmat_mag, &mut *b.den_mag_x);
    hadamard_row_sum(n, nbe, 2.0, &*b.dbfy, &*b.zmat_mag, &mut *b.den_mag_y);
    hadamard_row_sum(n, nbe, 2.0, &*b.dbfz, &*b.zmat_mag, &mut *b.den_mag_z);

    for g in 0..n {
        let ds = [b.den_x[g], b.den_y[g], b.den_z[g]];
        let dz = [b.den_mag_x[g], b.den_mag_y[g], b.den_mag_z[g]];

        let (mut pp, mut pm, mut mm) = (0.0, 0.0, 0.0);

        for k in 0..3 {
            let up = 0.5 * (ds[k] + dz[k]);
            let dn = 0.5 * (ds[k] - dz[k]);
            pp += up * up;
            pm += up * dn;
            mm += dn * dn;
        }

        b.gamma_spin[3 * g] = pp;
        b.gamma_spin[3 * g + 1] = pm;
        b.gamma_spin[3 * g + 2] = mm;
    }

    Ok(())
}

fn spin_functional(func: &dyn XcFunctional, n: usize, gga: bool, ctx: &mut AuxContext<'_>) -> Result<(), DeviceError> {
    let b = &mut ctx.buffers;

    b.require(Field::RhoSpin, 2 * n)?;
    b.require(Field::VrhoSpin, 2 * n)?;

    let result = if gga {
        b.require(Field::GammaSpin, 3 * n)?;
        b.require(Field::VgammaSpin, 3 * n)?;

        func.eval_exc_vxc_gga_polarized(
            &b.rho_spin[..2 * n],
            &b.gamma_spin[..3 * n],
            &mut b.eps[..n],
            &mut b.vrho_spin[..2 * n],
            &mut b.vgamma_spin[..3 * n],
        )
    } else {
        func.eval_exc_vxc_lda_polarized(&b.rho_spin[..2 * n], &mut b.eps[..n], &mut b.vrho_spin[..2 * n])
    };

    result.map_err(|e| DeviceError::Kernel(e.to_string()))?;

    let nvg = if gga { 3 * n } else { 0 };

    let finite = b.eps[..n]
        .iter()
        .chain(b.vrho_spin[..2 * n].iter())
        .chain(b.vgamma_spin[..nvg].iter())
        .all(|v| v.is_finite());

    if !finite {
        return Err(DeviceError::Kernel(format!(
            "non-finite functional output in task {}",
            ctx.task
        )));
    }

    Ok(())
}

// Zs = ¼(v↑ + v↓) B + Gs·∇B and Zz = ¼(v↑ - v↓) B + Gz·∇B, so that
// lower(BᵀZ + ZᵀB) yields ½(Vα + Vβ) and ½(Vα - Vβ).
fn spin_zmat(n: usize, nbe: usize, gga: bool, b: &mut TaskBuffers<'_>) -> Result<(), DeviceError> {
    b.require(Field::Zmat, n * nbe)?;
    b.require(Field::ZmatMag, n * nbe)?;

    for mu in 0..nbe {
        for g in 0..n {
            let idx = g + mu * n;
            let (va, vb) = (b.vrho_spin[2 * g], b.vrho_spin[2 * g + 1]);

            let mut zs = 0.25 * (va + vb) * b.bf[idx];
            let mut zz = 0.25 * (va - vb) * b.bf[idx];

            if gga {
                let vpp = b.vgamma_spin[3 * g];
                let vpm = b.vgamma_spin[3 * g + 1];
                let vmm = b.vgamma_spin[3 * g + 2];

                let ds = b.den_x[g] * b.dbfx[idx] + b.den_y[g] * b.dbfy[idx] + b.den_z[g] * b.dbfz[idx];
                let dz = b.den_mag_x[g] * b.dbfx[idx] + b.den_mag_y[g] * b.dbfy[idx] + b.den_mag_z[g] * b.dbfz[idx];

                zs += 0.5 * (vpp + vpm + vmm) * ds + 0.5 * (vpp - vmm) * dz;
                zz += 0.5 * (vpp - vmm) * ds + 0.5 * (vpp - vpm + vmm) * dz;
            }

            b.zmat[idx] = zs;
            b.zmat_mag[idx] = zz;
        }
    }

    Ok(())
}

pub struct PipelineStages {
    backend: Backend,
    density: DensityKind,
}

impl PipelineStages {
    pub fn new(backend: Backend, density: DensityKind) -> PipelineStages {
        PipelineStages { backend, density }
    }

    pub fn get_backend(&self) -> &Backend {
        &self.backend
    }

    pub fn get_density_kind(&self) -> DensityKind {
        self.density
    }

    pub fn set_density_kind(&mut self, density: DensityKind) {
        self.density = density;
    }

    fn xmat_factor(&self, data: &LocalWorkData) -> f64 {
        if data.is_polarized() {
            XMAT_FACTOR_SPIN_COMPONENT
        } else {
            self.density.xmat_factor()
        }
    }

    pub fn check_binding(&self, data: &LocalWorkData) -> Result<(), EngineError> {
        if data.backend() != self.backend.kind() {
            return Err(EngineError::Binding {
                expected: self.backend.name(),
                found: data.backend().name(),
            });
        }

        Ok(())
    }

    /// Basis-function values (and derivatives) over every task's screened
    /// shells, in the dispatch order of the backend.
    pub fn eval_collocation(
        &self,
        data: &LocalWorkData,
        deriv: Derivative,
        cm: &mut ConcurrencyManager,
    ) -> Result<(), EngineError> {
        self.check_binding(data)?;

        let caps = self.backend.capabilities();

        if deriv == Derivative::Hessian {
            self.backend.require_hessian()?;
        }

        let unsupported = data
            .metas()
            .iter()
            .flat_map(|m| m.bfn_shells.iter())
            .find(|s| s.pure && s.l > caps.max_pure_l);

        if let Some(s) = unsupported {
            return Err(EngineError::Capability(format!(
                "spherical collocation of shell {} with l = {}",
                s.shell, s.l
            )));
        }

        log::debug!("collocation {:?} ({:?})", deriv, caps.collocation_order);

        match caps.collocation_order {
            CollocationOrder::MaskedCombined => {
                for_each_task(data, cm, move |m, ctx| {
                    for slot in m.bfn_shells.iter() {
                        let shell = ctx.statics.shell(slot.shell)?;
                        collocate_shell(&shell, deriv, m.npts, slot.col_off, &mut ctx.buffers)?;
                    }

                    Ok(())
                });
            }

            CollocationOrder::ShellToTask => {
                for (ish, slots) in data.shell_to_task().iter().enumerate() {
                    if slots.is_empty() {
                        continue;
                    }

                    let map = Arc::clone(data.shell_to_task());
                    let metas = Arc::clone(data.metas());

                    cm.enqueue_master(move |arena| {
                        let (statics, mut buffers) = arena.tasks_mut()?;
                        let shell = statics.shell(ish)?;
                        let ntasks = buffers.len();

                        for slot in map[ish].iter() {
                            let buf = buffers.get_mut(slot.task).ok_or(DeviceError::TaskOutOfRange {
                                task: slot.task,
                                ntasks,
                            })?;

                            collocate_shell(&shell, deriv, metas[slot.task].npts, slot.col_off, buf)?;
                        }

                        Ok(())
                    });
                }
            }
        }

        Ok(())
    }

    /// Packs P_sub (bfn x bfn) of every task from the resident density matrix.
    /// A polarized call packs the magnetization block right behind it.
    pub fn pack_density(&self, data: &LocalWorkData, cm: &mut ConcurrencyManager) -> Result<(), EngineError> {
        self.check_binding(data)?;

        let metas = Arc::clone(data.metas());
        let polarized = data.is_polarized();

        cm.enqueue_master(move |arena| {
            let (statics, mut buffers) = arena.tasks_mut()?;
            let nbf = statics.nbf();
            let dmat = statics.field(StaticField::Dmat)?;
            let dmat_z = statics.field(StaticField::DmatZ)?;

            for (m, buf) in metas.iter().zip(buffers.iter_mut()) {
                let nb2 = m.nbe * m.nbe;

                if polarized {
                    buf.require(Field::NbeScr, 2 * nb2)?;
                    pack(&m.bfn_ranges, &m.bfn_ranges, dmat_z, nbf, &mut buf.nbe_scr[nb2..], m.nbe);
                } else {
                    buf.require(Field::NbeScr, nb2)?;
                }

                pack(&m.bfn_ranges, &m.bfn_ranges, dmat, nbf, &mut *buf.nbe_scr, m.nbe);
            }

            Ok(())
        });

        Ok(())
    }

    /// X = fac B P_sub into the Z-matrix field; Xk = fac ∂kB P_sub when asked.
    /// A polarized call builds Xs = B Ps and Xz = B Pz with fac = 1.
    pub fn eval_xmat(&self, data: &LocalWorkData, with_grad: bool, cm: &mut ConcurrencyManager) -> Result<(), EngineError> {
        self.check_binding(data)?;

        let polarized = data.is_polarized();

        if polarized && with_grad {
            return Err(EngineError::NotSupported(
                "X-matrix gradients of a spin-polarized density".to_string(),
            ));
        }

        let fac = self.xmat_factor(data);
        log::debug!("X matrix (fac = {}, gradients: {}, polarized: {})", fac, with_grad, polarized);

        for_each_task(data, cm, move |m, ctx| {
            let b = &mut ctx.buffers;
            let (n, nbe) = (m.npts, m.nbe);
            let nb2 = nbe * nbe;

            b.require(Field::Zmat, n * nbe)?;
            b.require(Field::NbeScr, nb2)?;

            blas::gemm_nn(n, nbe, nbe, fac, &*b.bf, n, &b.nbe_scr[..nb2], nbe, 0.0, &mut *b.zmat, n);

            if polarized {
                b.require(Field::ZmatMag, n * nbe)?;
                b.require(Field::NbeScr, 2 * nb2)?;

                blas::gemm_nn(n, nbe, nbe, fac, &*b.bf, n, &b.nbe_scr[nb2..], nbe, 0.0, &mut *b.zmat_mag, n);
            }

            if with_grad {
                b.require(Field::XmatZ, n * nbe)?;

                blas::gemm_nn(n, nbe, nbe, fac, &*b.dbfx, n, &*b.nbe_scr, nbe, 0.0, &mut *b.xmat_x, n);
                blas::gemm_nn(n, nbe, nbe, fac, &*b.dbfy, n, &*b.nbe_scr, nbe, 0.0, &mut *b.xmat_y, n);
                blas::gemm_nn(n, nbe, nbe, fac, &*b.dbfz, n, &*b.nbe_scr, nbe, 0.0, &mut *b.xmat_z, n);
            }

            Ok(())
        });

        Ok(())
    }

    /// ρ = (1/fac) Σ B∘X; for GGA also ∂kρ = (2/fac) Σ ∂kB∘X and γ = |∇ρ|².
    /// A polarized call resolves (ρs, ρz) into spin channels instead of γ.
    pub fn eval_uvvars(&self, data: &LocalWorkData, gga: bool, cm: &mut ConcurrencyManager) -> Result<(), EngineError> {
        self.check_binding(data)?;

        let fac = self.xmat_factor(data);
        let polarized = data.is_polarized();

        for_each_task(data, cm, move |m, ctx| {
            let b = &mut ctx.buffers;
            let (n, nbe) = (m.npts, m.nbe);

            b.require(Field::Den, n)?;
            b.require(Field::Zmat, n * nbe)?;

            hadamard_row_sum(n, nbe, 1.0 / fac, &*b.bf, &*b.zmat, &mut *b.den);

            if gga {
                b.require(Field::DenZ, n)?;
                b.require(Field::DbfZ, n * nbe)?;

                hadamard_row_sum(n, nbe, 2.0 / fac, &*b.dbfx, &*b.zmat, &mut *b.den_x);
                hadamard_row_sum(n, nbe, 2.0 / fac, &*b.dbfy, &*b.zmat, &mut *b.den_y);
                hadamard_row_sum(n, nbe, 2.0 / fac, &*b.dbfz, &*b.zmat, &mut *b.den_z);
            }

            if polarized {
                return spin_uvvars(n, nbe, gga, b);
            }

            if gga {
                b.require(Field::Gamma, n)?;

                for g in 0..n {
                    b.gamma[g] = b.den_x[g] * b.den_x[g] + b.den_y[g] * b.den_y[g] + b.den_z[g] * b.den_z[g];
                }
            }

            Ok(())
        });

        Ok(())
    }

    /// ε, vρ (and vγ) from the external functional.
    pub fn eval_functional(
        &self,
        data: &LocalWorkData,
        functional: &Arc<dyn XcFunctional>,
        cm: &mut ConcurrencyManager,
    ) -> Result<(), EngineError> {
        self.check_binding(data)?;

        let gga = functional_is_gga(functional.as_ref())?;
        let func = Arc::clone(functional);

        log::debug!("functional '{}'", func.name());

        if data.is_polarized() {
            for_each_task(data, cm, move |m, ctx| spin_functional(func.as_ref(), m.npts, gga, ctx));
            return Ok(());
        }

        for_each_task(data, cm, move |m, ctx| {
            let b = &mut ctx.buffers;
            let n = m.npts;

            b.require(Field::Vrho, n)?;

            let result = if gga {
                b.require(Field::Vgamma, n)?;
                b.require(Field::Gamma, n)?;

                func.eval_exc_vxc_gga(
                    &b.den[..n],
                    &b.gamma[..n],
                    &mut b.eps[..n],
                    &mut b.vrho[..n],
                    &mut b.vgamma[..n],
                )
            } else {
                func.eval_exc_vxc_lda(&b.den[..n], &mut b.eps[..n], &mut b.vrho[..n])
            };

            result.map_err(|e| DeviceError::Kernel(e.to_string()))?;

            let nvg = if gga { n } else { 0 };

            let finite = b.eps[..n]
                .iter()
                .chain(b.vrho[..n].iter())
                .chain(b.vgamma[..nvg].iter())
                .all(|v| v.is_finite());

            if !finite {
                return Err(DeviceError::Kernel(format!(
                    "non-finite functional output in task {}",
                    ctx.task
                )));
            }

            Ok(())
        });

        Ok(())
    }

    /// Multiplies ε, vρ (and vγ) by the quadrature weights.
    pub fn eval_weights(&self, data: &LocalWorkData, gga: bool, cm: &mut ConcurrencyManager) -> Result<(), EngineError> {
        self.check_binding(data)?;

        let polarized = data.is_polarized();

        for_each_task(data, cm, move |m, ctx| {
            let b = &mut ctx.buffers;
            let n = m.npts;

            for g in 0..n {
                let w = b.weights[g];
                b.eps[g] *= w;

                if polarized {
                    b.vrho_spin[2 * g] *= w;
                    b.vrho_spin[2 * g + 1] *= w;

                    if gga {
                        b.vgamma_spin[3 * g..3 * g + 3].iter_mut().for_each(|v| *v *= w);
                    }

                    continue;
                }

                b.vrho[g] *= w;

                if gga {
                    b.vgamma[g] *= w;
                }
            }

            Ok(())
        });

        Ok(())
    }

    /// Z = ½ vρ B, plus 2 vγ ∇ρ·∇B for GGA. Overwrites X.
    pub fn eval_zmat(&self, data: &LocalWorkData, gga: bool, cm: &mut ConcurrencyManager) -> Result<(), EngineError> {
        self.check_binding(data)?;

        if data.is_polarized() {
            for_each_task(data, cm, move |m, ctx| spin_zmat(m.npts, m.nbe, gga, &mut ctx.buffers));
            return Ok(());
        }

        for_each_task(data, cm, move |m, ctx| {
            let b = &mut ctx.buffers;
            let (n, nbe) = (m.npts, m.nbe);

            b.require(Field::Zmat, n * nbe)?;

            for mu in 0..nbe {
                for g in 0..n {
                    let idx = g + mu * n;
                    let mut z = 0.5 * b.vrho[g] * b.bf[idx];

                    if gga {
                        let dot = b.den_x[g] * b.dbfx[idx] + b.den_y[g] * b.dbfy[idx] + b.den_z[g] * b.dbfz[idx];
                        z += 2.0 * b.vgamma[g] * dot;
                    }

                    b.zmat[idx] = z;
                }
            }

            Ok(())
        });

        Ok(())
    }

    /// Per task lower(Bᵀ Z + Zᵀ B), then scatter-add into the lower
    /// triangle of the resident VXC in task order.
    pub fn inc_vxc(
        &self,
        data: &LocalWorkData,
        arena: &mut DeviceArena,
        cm: &mut ConcurrencyManager,
    ) -> Result<(), EngineError> {
        self.check_binding(data)?;

        let polarized = data.is_polarized();

        for_each_task(data, cm, move |m, ctx| {
            let b = &mut ctx.buffers;
            let (n, nbe) = (m.npts, m.nbe);
            let nb2 = nbe * nbe;

            b.require(Field::NbeScr, nb2)?;

            blas::syr2k_lower_tn(nbe, n, 1.0, &*b.bf, n, &*b.zmat, n, 0.0, &mut b.nbe_scr[..nb2], nbe);

            if polarized {
                b.require(Field::NbeScr, 2 * nb2)?;

                blas::syr2k_lower_tn(nbe, n, 1.0, &*b.bf, n, &*b.zmat_mag, n, 0.0, &mut b.nbe_scr[nb2..], nbe);
            }

            Ok(())
        });

        cm.sync_master_with_aux(arena)?;

        let metas = Arc::clone(data.metas());

        cm.enqueue_master(move |arena| {
            let (mut statics, buffers) = arena.accumulate_mut()?;
            let nbf = statics.nbf();

            let vxc = statics.field_mut(StaticField::Vxc)?;
            for (m, buf) in metas.iter().zip(buffers.iter()) {
                scatter_add_lower(&m.bfn_ranges, &buf.nbe_scr[..], m.nbe, vxc, nbf);
            }

            if polarized {
                let vxc_z = statics.field_mut(StaticField::VxcZ)?;
                for (m, buf) in metas.iter().zip(buffers.iter()) {
                    scatter_add_lower(&m.bfn_ranges, &buf.nbe_scr[m.nbe * m.nbe..], m.nbe, vxc_z, nbf);
                }
            }

            Ok(())
        });

        Ok(())
    }

    /// Mirrors the lower triangle of the resident VXC (and VXCz) into the
    /// upper one.
    pub fn symmetrize_vxc(&self, cm: &mut ConcurrencyManager) {
        cm.enqueue_master(|arena| {
            let nbf = arena.static_layout().nbf();

            for field in [StaticField::Vxc, StaticField::VxcZ] {
                let vxc = arena.static_slice_mut(field)?;

                for j in 0..nbf {
                    for i in 0..j {
                        vxc[i + j * nbf] = vxc[j + i * nbf];
                    }
                }
            }

            Ok(())
        });
    }

    /// EXC += Σ ε ρ with ε already weighted.
    pub fn inc_exc(&self, data: &LocalWorkData, cm: &mut ConcurrencyManager) -> Result<(), EngineError> {
        self.check_binding(data)?;

        let metas = Arc::clone(data.metas());

        cm.enqueue_master(move |arena| {
            let (mut statics, buffers) = arena.accumulate_mut()?;

            let mut sum = 0.0;
            for (m, buf) in metas.iter().zip(buffers.iter()) {
                let n = m.npts;
                sum += buf.eps[..n].iter().zip(buf.den[..n].iter()).map(|(e, r)| e * r).sum::<f64>();
            }

            statics.field_mut(StaticField::Exc)?[0] += sum;

            Ok(())
        });

        Ok(())
    }

    /// NEL += Σ w ρ
    pub fn inc_nel(&self, data: &LocalWorkData, cm: &mut ConcurrencyManager) -> Result<(), EngineError> {
        self.check_binding(data)?;

        let metas = Arc::clone(data.metas());

        cm.enqueue_master(move |arena| {
            let (mut statics, buffers) = arena.accumulate_mut()?;

            let mut sum = 0.0;
            for (m, buf) in metas.iter().zip(buffers.iter()) {
                let n = m.npts;
                sum += buf.weights[..n].iter().zip(buf.den[..n].iter()).map(|(w, r)| w * r).sum::<f64>();
            }

            statics.field_mut(StaticField::Nel)?[0] += sum;

            Ok(())
        });

        Ok(())
    }

    /// Nuclear gradient of EXC, walking the reverse shell→task map. Shells
    /// are reduced in parallel and added to their atoms in shell order.
    pub fn inc_exc_grad(&self, data: &LocalWorkData, gga: bool, cm: &mut ConcurrencyManager) -> Result<(), EngineError> {
        self.check_binding(data)?;
        self.backend.require_exc_gradient()?;

        if gga {
            self.backend.require_hessian()?;
        }

        let fac = self.density.xmat_factor();
        let map = Arc::clone(data.shell_to_task());
        let metas = Arc::clone(data.metas());

        cm.enqueue_master(move |arena| {
            let (mut statics, buffers) = arena.accumulate_mut()?;

            let contributions: Vec<Result<[f64; 3], DeviceError>> = map
                .par_iter()
                .map(|slots| shell_gradient(slots, &metas, &buffers, gga))
                .collect();

            let grad = statics.field_mut(StaticField::ExcGrad)?;

            for (slots, c) in map.iter().zip(contributions) {
                let c = c?;

                if let Some(slot) = slots.first() {
                    for a in 0..3 {
                        grad[3 * slot.atom + a] -= 2.0 / fac * c[a];
                    }
                }
            }

            Ok(())
        });

        Ok(())
    }

    /// P_sub (bfn x cou) of every task for the exchange build.
    pub fn pack_exx_density(&self, data: &LocalWorkData, cm: &mut ConcurrencyManager) -> Result<(), EngineError> {
        self.check_binding(data)?;

        let metas = Arc::clone(data.metas());

        cm.enqueue_master(move |arena| {
            let (statics, mut buffers) = arena.tasks_mut()?;
            let nbf = statics.nbf();
            let dmat = statics.field(StaticField::Dmat)?;

            for (m, buf) in metas.iter().zip(buffers.iter_mut()) {
                buf.require(Field::NbeScr, m.nbe * m.nbe_cou)?;
                pack(&m.bfn_ranges, &m.cou_ranges, dmat, nbf, &mut *buf.nbe_scr, m.nbe);
            }

            Ok(())
        });

        Ok(())
    }

    /// F = B P_sub
    pub fn eval_exx_fmat(&self, data: &LocalWorkData, cm: &mut ConcurrencyManager) -> Result<(), EngineError> {
        self.check_binding(data)?;

        for_each_task(data, cm, move |m, ctx| {
            let b = &mut ctx.buffers;
            let (n, nbe, nbe_cou) = (m.npts, m.nbe, m.nbe_cou);

            b.require(Field::Fmat, n * nbe_cou)?;

            blas::gemm_nn(n, nbe_cou, nbe, 1.0, &*b.bf, n, &*b.nbe_scr, nbe, 0.0, &mut *b.fmat, n);

            Ok(())
        });

        Ok(())
    }

    /// Energy estimate of every cou shell σ of a task,
    /// max_g w_g f_gσ Σ_τ f_gτ with f_gσ = max_{ν∈σ} |F_gν|, written to the
    /// head of the G field in screening order.
    pub fn eval_exx_ek_bounds(&self, data: &LocalWorkData, cm: &mut ConcurrencyManager) -> Result<(), EngineError> {
        self.check_binding(data)?;

        for_each_task(data, cm, move |m, ctx| {
            let b = &mut ctx.buffers;
            let (n, nsh) = (m.npts, m.cou_shell_sizes.len());

            if n == 0 {
                return Ok(());
            }

            b.require(Field::Fmat, n * m.nbe_cou)?;
            b.require(Field::Gmat, nsh)?;

            let mut bounds = vec![0.0; nsh];
            let mut f_shell = vec![0.0; nsh];

            for g in 0..n {
                let mut col = 0;

                for (ish, &size) in m.cou_shell_sizes.iter().enumerate() {
                    f_shell[ish] = (col..col + size).map(|nu| b.fmat[g + nu * n].abs()).fold(0.0, f64::max);
                    col += size;
                }

                let f_total: f64 = f_shell.iter().sum();
                let w = b.weights[g];

                for (e, f) in bounds.iter_mut().zip(f_shell.iter()) {
                    *e = f64::max(*e, w * f * f_total);
                }
            }

            b.gmat[..nsh].copy_from_slice(&bounds);

            Ok(())
        });

        Ok(())
    }

    /// Zeroes G and enqueues the shell-pair kernels through `dispatch`.
    pub fn eval_exx_gmat(
        &self,
        data: &LocalWorkData,
        batcher: &Arc<ShellPairBatcher>,
        boys: &Arc<BoysTable>,
        dispatch: &dyn GmatDispatch,
        cm: &mut ConcurrencyManager,
    ) -> Result<(), EngineError> {
        self.check_binding(data)?;

        log::debug!(
            "G matrix: {} pairs, {} links, {} batching",
            batcher.npairs(),
            batcher.nlinks(),
            dispatch.name()
        );

        cm.enqueue_master(|arena| {
            let (_, mut buffers) = arena.tasks_mut()?;

            for buf in buffers.iter_mut() {
                buf.gmat.iter_mut().for_each(|v| *v = 0.0);
            }

            Ok(())
        });

        dispatch.enqueue(batcher, boys, cm);

        Ok(())
    }

    /// K_loc = Bᵀ G per task, then scatter-add into the resident K.
    pub fn inc_exx_k(
        &self,
        data: &LocalWorkData,
        arena: &mut DeviceArena,
        cm: &mut ConcurrencyManager,
    ) -> Result<(), EngineError> {
        self.check_binding(data)?;

        for_each_task(data, cm, move |m, ctx| {
            let b = &mut ctx.buffers;
            let (n, nbe, nbe_cou) = (m.npts, m.nbe, m.nbe_cou);

            b.require(Field::NbeScr, nbe * nbe_cou)?;
            b.require(Field::Gmat, n * nbe_cou)?;

            blas::gemm_tn(nbe, nbe_cou, n, 1.0, &*b.bf, n, &*b.gmat, n, 0.0, &mut *b.nbe_scr, nbe);

            Ok(())
        });

        cm.sync_master_with_aux(arena)?;

        let metas = Arc::clone(data.metas());

        cm.enqueue_master(move |arena| {
            let (mut statics, buffers) = arena.accumulate_mut()?;
            let nbf = statics.nbf();
            let exx_k = statics.field_mut(StaticField::ExxK)?;

            for (m, buf) in metas.iter().zip(buffers.iter()) {
                scatter_add(&m.bfn_ranges, &m.cou_ranges, &buf.nbe_scr[..], m.nbe, exx_k, nbf);
            }

            Ok(())
        });

        Ok(())
    }

    /// The exchange matrix is accumulated without symmetrization.
    pub fn symmetrize_exx_k(&self) -> Result<(), EngineError> {
        Err(EngineError::NotSupported("EXX-K symmetrization".to_string()))
    }
}

// Σ over the shell's functions and the tasks screening it in of
//   vρ ∂aB X + 2 vγ Σ_k ∂kρ (∂a∂kB X + ∂aB Xk)
fn shell_gradient(
    slots: &[ShellSlot],
    metas: &[TaskMeta],
    buffers: &[TaskBuffers<'_>],
    gga: bool,
) -> Result<[f64; 3], DeviceError> {
    let mut g = [0.0; 3];

    for slot in slots.iter() {
        let m = &metas[slot.task];
        let b = buffers.get(slot.task).ok_or(DeviceError::TaskOutOfRange {
            task: slot.task,
            ntasks: buffers.len(),
        })?;

        let n = m.npts;
        let ncol = n * (slot.col_off + slot.size);

        b.require(Field::DbfZ, ncol)?;
        b.require(Field::Zmat, ncol)?;
        b.require(Field::Vrho, n)?;

        let x = b.field(Field::Zmat);
        let vrho = b.field(Field::Vrho);
        let dbf = [b.field(Field::DbfX), b.field(Field::DbfY), b.field(Field::DbfZ)];

        let hess = [
            b.field(Field::D2bfXX),
            b.field(Field::D2bfXY),
            b.field(Field::D2bfXZ),
            b.field(Field::D2bfYY),
            b.field(Field::D2bfYZ),
            b.field(Field::D2bfZZ),
        ];
        let xk = [b.field(Field::XmatX), b.field(Field::XmatY), b.field(Field::XmatZ)];
        let dden = [b.field(Field::DenX), b.field(Field::DenY), b.field(Field::DenZ)];
        let vgamma = b.field(Field::Vgamma);

        if gga {
            b.require(Field::D2bfZZ, ncol)?;
            b.require(Field::XmatZ, ncol)?;
            b.require(Field::Vgamma, n)?;
        }

        for mu in slot.col_off..slot.col_off + slot.size {
            for ipt in 0..n {
                let idx = ipt + mu * n;
                let xv = x[idx];

                for a in 0..3 {
                    g[a] += vrho[ipt] * dbf[a][idx] * xv;
                }

                if gga {
                    let vg = 2.0 * vgamma[ipt];

                    for a in 0..3 {
                        let mut t = 0.0;
                        for k in 0..3 {
                            t += dden[k][ipt] * (hess[hessian_index(a, k)][idx] * xv + dbf[a][idx] * xk[k][idx]);
                        }
                        g[a] += vg * t;
                    }
                }
            }
        }
    }

    Ok(g)
}
