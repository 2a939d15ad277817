use crate::nuclear::{cart_powers, pair_potential, MAX_PAIR_BLOCK};
use crate::{BoysTable, ShellPairBatcher, TaskShellPairLink};

use device::{ConcurrencyManager, DeviceError, Field, TaskBuffers};
use rayon::prelude::*;
use std::sync::Arc;

/// Applies one shell pair to one task:
///
///   G[:, i_off+a] += w Σ_b V_ab F[:, j_off+b]
///   G[:, j_off+b] += w Σ_a V_ab F[:, i_off+a]   (i != j)
pub fn accumulate_link(
    batcher: &ShellPairBatcher,
    boys: &BoysTable,
    link: &TaskShellPairLink,
    buf: &mut TaskBuffers<'_>,
) -> Result<(), DeviceError> {
    let pair = batcher.get_pair(link.pair);
    let prims = batcher.pair_prims(link.pair);
    let npts = batcher.task_npts(link.task);

    let na = cart_powers(pair.la).len();
    let nb = cart_powers(pair.lb).len();

    let ncol = (link.i_off + na).max(link.j_off + nb);
    buf.require(Field::Fmat, ncol * npts)?;
    buf.require(Field::Gmat, ncol * npts)?;
    buf.require(Field::PointsZ, npts)?;

    let fmat = &*buf.fmat;
    let gmat = &mut *buf.gmat;

    let mut v = [0.0; MAX_PAIR_BLOCK];

    for ipt in 0..npts {
        let c = [buf.points_x[ipt], buf.points_y[ipt], buf.points_z[ipt]];
        let w = buf.weights[ipt];

        pair_potential(pair, prims, boys, c, &mut v);

        for a in 0..na {
            let mut sum = 0.0;
            for b in 0..nb {
                sum += v[a + b * na] * fmat[ipt + (link.j_off + b) * npts];
            }
            gmat[ipt + (link.i_off + a) * npts] += w * sum;
        }

        if !pair.is_diagonal() {
            for b in 0..nb {
                let mut sum = 0.0;
                for a in 0..na {
                    sum += v[a + b * na] * fmat[ipt + (link.i_off + a) * npts];
                }
                gmat[ipt + (link.j_off + b) * npts] += w * sum;
            }
        }
    }

    Ok(())
}

/// Enqueues the G-matrix build on the master queue. Implementations must
/// visit the class batches in launch order and, within a task, the pairs in
/// ascending order, so every strategy yields bit-identical G.
pub trait GmatDispatch: Send + Sync {
    fn name(&self) -> &'static str;

    fn enqueue(&self, batcher: &Arc<ShellPairBatcher>, boys: &Arc<BoysTable>, cm: &mut ConcurrencyManager);
}

/// One launch per class covering all tasks; tasks run in parallel.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskMapped;

impl GmatDispatch for TaskMapped {
    fn name(&self) -> &'static str {
        "task"
    }

    fn enqueue(&self, batcher: &Arc<ShellPairBatcher>, boys: &Arc<BoysTable>, cm: &mut ConcurrencyManager) {
        for (ibatch, batch) in batcher.get_batches().iter().enumerate() {
            if batch.is_empty() {
                continue;
            }

            let batcher = Arc::clone(batcher);
            let boys = Arc::clone(boys);

            cm.enqueue_master(move |arena| {
                let (_, mut buffers) = arena.tasks_mut()?;
                let batch = &batcher.get_batches()[ibatch];

                buffers
                    .par_iter_mut()
                    .enumerate()
                    .try_for_each(|(itask, buf)| -> Result<(), DeviceError> {
                        let range = batch.task_ranges.get(itask).cloned().unwrap_or(0..0);

                        for link in batch.links[range].iter() {
                            accumulate_link(&batcher, &boys, link, buf)?;
                        }

                        Ok(())
                    })?;

                Ok(())
            });
        }
    }
}

/// One launch per shell pair, covering the tasks that screen it in.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellMapped;

impl GmatDispatch for ShellMapped {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn enqueue(&self, batcher: &Arc<ShellPairBatcher>, boys: &Arc<BoysTable>, cm: &mut ConcurrencyManager) {
        for batch in batcher.get_batches().iter() {
            for (_, links) in batch.pair_groups() {
                let batcher = Arc::clone(batcher);
                let boys = Arc::clone(boys);

                cm.enqueue_master(move |arena| {
                    for link in links.iter() {
                        let mut buf = arena.task_buffers_mut(link.task)?;
                        accumulate_link(&batcher, &boys, link, &mut buf)?;
                    }

                    Ok(())
                });
            }
        }
    }
}

pub fn new(scheme: &str) -> Option<Box<dyn GmatDispatch>> {
    match scheme {
        "task" => Some(Box::new(TaskMapped)),
        "shell" => Some(Box::new(ShellMapped)),
        _ => None,
    }
}
