//! Host-side preparation of one local-work call: per-task metadata, the
//! reverse shell→task map and the packing of points and weights into the
//! task slabs.

use crate::submat::{contiguous_ranges, SubmatRange};
use crate::EngineError;

use basis::{BasisSet, BasisSetMap};
use device::{BackendKind, ConcurrencyManager, SlabLayout};
use gridtask::GridTask;
use std::sync::Arc;

/// One screened shell of one task, with its column block in the task's
/// basis-function buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellSlot {
    pub task: usize,
    pub shell: usize,
    pub atom: usize,
    pub l: usize,
    pub pure: bool,
    pub col_off: usize,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskMeta {
    pub iparent: usize,
    pub npts: usize,
    pub nbe: usize,
    pub nbe_cou: usize,
    pub bfn_shells: Vec<ShellSlot>,
    pub bfn_indices: Vec<usize>,
    pub bfn_ranges: Vec<SubmatRange>,
    pub cou_indices: Vec<usize>,
    pub cou_ranges: Vec<SubmatRange>,
    /// Function count of every cou shell, in screening order.
    pub cou_shell_sizes: Vec<usize>,
    /// Slab words the task leaves unused.
    pub padding_words: usize,
}

/// Everything a pipeline stage needs to know about the tasks of a call.
/// Bound to the backend it was prepared for.
#[derive(Debug, Clone)]
pub struct LocalWorkData {
    backend: BackendKind,
    metas: Arc<Vec<TaskMeta>>,
    shell_to_task: Arc<Vec<Vec<ShellSlot>>>,
    polarized: bool,
}

impl LocalWorkData {
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// True when the slabs carry the magnetization channel.
    pub fn is_polarized(&self) -> bool {
        self.polarized
    }

    pub fn ntasks(&self) -> usize {
        self.metas.len()
    }

    pub fn get_meta(&self, itask: usize) -> &TaskMeta {
        &self.metas[itask]
    }

    pub fn metas(&self) -> &Arc<Vec<TaskMeta>> {
        &self.metas
    }

    /// For every shell, the tasks that screen it in, in task order.
    pub fn shell_to_task(&self) -> &Arc<Vec<Vec<ShellSlot>>> {
        &self.shell_to_task
    }

    pub fn total_padding_words(&self) -> usize {
        self.metas.iter().map(|m| m.padding_words).sum()
    }
}

pub struct TaskUpload;

impl TaskUpload {
    /// Builds the per-task maps for `tasks` laid out by `layout`. Fails
    /// when a task screens in a shell the basis does not have.
    pub fn prepare(
        backend: BackendKind,
        tasks: &[GridTask],
        basis: &BasisSet,
        map: &BasisSetMap,
        layout: &SlabLayout,
    ) -> Result<LocalWorkData, EngineError> {
        let nshells = map.nshells().min(basis.nshells());

        let mut metas = Vec::with_capacity(tasks.len());
        let mut shell_to_task = vec![Vec::new(); map.nshells()];

        for (itask, task) in tasks.iter().enumerate() {
            let bfn_list = task.get_bfn_screening().get_shell_list();
            let cou_list = task.get_cou_screening().get_shell_list();

            if let Some(ish) = bfn_list.iter().chain(cou_list.iter()).find(|&&ish| ish >= nshells) {
                return Err(EngineError::Precondition(format!(
                    "task {} screens in shell {} of a basis with {} shells",
                    itask, ish, nshells
                )));
            }

            let mut bfn_shells = Vec::with_capacity(bfn_list.len());
            let mut col_off = 0;

            for &ish in bfn_list.iter() {
                let shell = basis.get_shell(ish);

                let slot = ShellSlot {
                    task: itask,
                    shell: ish,
                    atom: map.shell_to_atom(ish),
                    l: shell.get_l(),
                    pure: shell.is_pure(),
                    col_off,
                    size: map.shell_size(ish),
                };

                shell_to_task[ish].push(slot);
                bfn_shells.push(slot);

                col_off += slot.size;
            }

            let bfn_indices = map.shells_to_bf(bfn_list);
            let cou_indices = map.shells_to_bf(cou_list);

            let (npts, nbe, nbe_cou) = (task.npts(), bfn_indices.len(), cou_indices.len());

            metas.push(TaskMeta {
                iparent: task.get_iparent(),
                npts,
                nbe,
                nbe_cou,
                bfn_shells,
                bfn_ranges: contiguous_ranges(&bfn_indices),
                bfn_indices,
                cou_ranges: contiguous_ranges(&cou_indices),
                cou_indices,
                cou_shell_sizes: cou_list.iter().map(|&ish| map.shell_size(ish)).collect(),
                padding_words: layout.stride().saturating_sub(layout.used_words(npts, nbe, nbe_cou)),
            });
        }

        let data = LocalWorkData {
            backend,
            metas: Arc::new(metas),
            shell_to_task: Arc::new(shell_to_task),
            polarized: layout.requirements().polarized,
        };

        log::debug!(
            "upload: {} tasks, stride {} words, padding {} words",
            data.ntasks(),
            layout.stride(),
            data.total_padding_words()
        );

        Ok(data)
    }

    /// Enqueues the copy of points and weights into the task slabs.
    pub fn enqueue_points(tasks: &[GridTask], cm: &mut ConcurrencyManager) {
        let packed: Vec<Vec<f64>> = tasks
            .iter()
            .map(|t| {
                let npts = t.npts();
                let mut v = Vec::with_capacity(4 * npts);
                v.extend(t.get_points().iter().map(|p| p.x));
                v.extend(t.get_points().iter().map(|p| p.y));
                v.extend(t.get_points().iter().map(|p| p.z));
                v.extend_from_slice(t.get_weights());
                v
            })
            .collect();

        cm.enqueue_master(move |arena| {
            let (_, mut buffers) = arena.tasks_mut()?;

            for (buf, v) in buffers.iter_mut().zip(packed.iter()) {
                let npts = v.len() / 4;

                buf.points_x[..npts].copy_from_slice(&v[..npts]);
                buf.points_y[..npts].copy_from_slice(&v[npts..2 * npts]);
                buf.points_z[..npts].copy_from_slice(&v[2 * npts..3 * npts]);
                buf.weights[..npts].copy_from_slice(&v[3 * npts..]);
            }

            Ok(())
        });
    }
}
