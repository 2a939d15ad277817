use crate::{Backend, DeviceArena, DeviceError, StaticField, StaticRegion, TaskBuffers};

use rayon::prelude::*;
use std::collections::HashMap;

/// What an auxiliary-queue command sees: its own task slab and the static
/// region, read-only.
pub struct AuxContext<'a> {
    pub task: usize,
    pub buffers: TaskBuffers<'a>,
    pub statics: StaticRegion<'a>,
}

type MasterCommand = Box<dyn FnOnce(&mut DeviceArena) -> Result<(), DeviceError> + Send>;
type AuxCommand = Box<dyn FnOnce(&mut AuxContext<'_>) -> Result<(), DeviceError> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueHandle(usize);

impl QueueHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchCounts {
    pub master: usize,
    pub aux: Vec<usize>,
}

impl LaunchCounts {
    pub fn total_aux(&self) -> usize {
        self.aux.iter().sum()
    }
}

enum Segment {
    Master(Vec<MasterCommand>),
    Aux(Vec<Vec<(usize, AuxCommand)>>),
}

/// One master queue plus K auxiliary queues.
///
/// Enqueued commands are deferred until a barrier, `synchronize` or
/// `read_scalar`. The first failing command poisons the manager: every
/// later command is skipped and every later sync returns the same error
/// until `reset`.
pub struct ConcurrencyManager {
    n_aux: usize,
    pending: Vec<Segment>,
    epoch_owner: HashMap<usize, usize>,
    error: Option<DeviceError>,
    launches: LaunchCounts,
}

impl ConcurrencyManager {
    pub fn new(n_aux: usize) -> ConcurrencyManager {
        let n_aux = n_aux.max(1);

        ConcurrencyManager {
            n_aux,
            pending: Vec::new(),
            epoch_owner: HashMap::new(),
            error: None,
            launches: LaunchCounts {
                master: 0,
                aux: vec![0; n_aux],
            },
        }
    }

    pub fn for_backend(backend: &Backend) -> ConcurrencyManager {
        ConcurrencyManager::new(backend.n_aux_queues())
    }

    pub fn n_aux_queues(&self) -> usize {
        self.n_aux
    }

    /// Round-robin queue assignment: task i runs on queue i mod K.
    pub fn aux_queue_for(&self, task: usize) -> QueueHandle {
        QueueHandle(task % self.n_aux)
    }

    pub fn aux_queue(&self, index: usize) -> Result<QueueHandle, DeviceError> {
        if index >= self.n_aux {
            return Err(DeviceError::InvalidQueue {
                queue: index,
                nqueues: self.n_aux,
            });
        }

        Ok(QueueHandle(index))
    }

    pub fn launches(&self) -> &LaunchCounts {
        &self.launches
    }

    pub fn pending_commands(&self) -> usize {
        self.pending
            .iter()
            .map(|s| match s {
                Segment::Master(cmds) => cmds.len(),
                Segment::Aux(buckets) => buckets.iter().map(|b| b.len()).sum(),
            })
            .sum()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Drops pending work, clears the error state and counters.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.epoch_owner.clear();
        self.error = None;
        self.launches = LaunchCounts {
            master: 0,
            aux: vec![0; self.n_aux],
        };
    }

    pub fn enqueue_master<F>(&mut self, f: F)
    where
        F: FnOnce(&mut DeviceArena) -> Result<(), DeviceError> + Send + 'static,
    {
        if self.error.is_some() {
            return;
        }

        self.launches.master += 1;

        if let Some(Segment::Master(cmds)) = self.pending.last_mut() {
            cmds.push(Box::new(f));
        } else {
            self.pending.push(Segment::Master(vec![Box::new(f)]));
        }
    }

    pub fn enqueue_aux<F>(&mut self, queue: QueueHandle, task: usize, f: F)
    where
        F: FnOnce(&mut AuxContext<'_>) -> Result<(), DeviceError> + Send + 'static,
    {
        if self.error.is_some() {
            return;
        }

        let q = queue.index();

        if q >= self.n_aux {
            self.error = Some(DeviceError::InvalidQueue {
                queue: q,
                nqueues: self.n_aux,
            });
            return;
        }

        let owner = *self.epoch_owner.entry(task).or_insert(q);

        if owner != q {
            self.error = Some(DeviceError::QueueRace {
                task,
                first: owner,
                second: q,
            });
            return;
        }

        self.launches.aux[q] += 1;

        if !matches!(self.pending.last(), Some(Segment::Aux(_))) {
            self.pending
                .push(Segment::Aux((0..self.n_aux).map(|_| Vec::new()).collect()));
        }

        if let Some(Segment::Aux(buckets)) = self.pending.last_mut() {
            buckets[q].push((task, Box::new(f)));
        }
    }

    /// Auxiliary work enqueued after this point observes all master work
    /// enqueued before it.
    pub fn sync_aux_with_master(&mut self, arena: &mut DeviceArena) -> Result<(), DeviceError> {
        self.drain(arena)
    }

    /// Master work enqueued after this point observes all auxiliary work
    /// enqueued before it.
    pub fn sync_master_with_aux(&mut self, arena: &mut DeviceArena) -> Result<(), DeviceError> {
        self.drain(arena)
    }

    pub fn synchronize(&mut self, arena: &mut DeviceArena) -> Result<(), DeviceError> {
        self.drain(arena)
    }

    /// Drains all queues, then reads a one-word static field.
    pub fn read_scalar(&mut self, arena: &mut DeviceArena, field: StaticField) -> Result<f64, DeviceError> {
        self.drain(arena)?;

        let s = arena.static_slice(field)?;

        s.first().copied().ok_or(DeviceError::ViewOutOfBounds {
            offset: 0,
            len: 1,
            size: s.len(),
        })
    }

    fn drain(&mut self, arena: &mut DeviceArena) -> Result<(), DeviceError> {
        let pending = std::mem::take(&mut self.pending);
        self.epoch_owner.clear();

        if self.error.is_none() {
            for segment in pending {
                let result = match segment {
                    Segment::Master(cmds) => run_master(cmds, arena),
                    Segment::Aux(buckets) => run_aux(buckets, arena),
                };

                if let Err(e) = result {
                    log::debug!("queue error surfaced at sync: {}", e);
                    self.error = Some(e);
                    break;
                }
            }
        }

        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

fn run_master(cmds: Vec<MasterCommand>, arena: &mut DeviceArena) -> Result<(), DeviceError> {
    for cmd in cmds {
        cmd(arena)?;
    }

    Ok(())
}

fn run_aux(buckets: Vec<Vec<(usize, AuxCommand)>>, arena: &mut DeviceArena) -> Result<(), DeviceError> {
    let (statics, layout, slabs) = arena.split_tasks()?;
    let ntasks = slabs.len();

    let mut slabs: Vec<Option<&mut [f64]>> = slabs.into_iter().map(Some).collect();
    let mut owner: Vec<Option<usize>> = vec![None; ntasks];

    // hand every queue the slabs of the tasks it touches
    let mut work = Vec::with_capacity(buckets.len());

    for (q, cmds) in buckets.into_iter().enumerate() {
        let mut owned: Vec<(usize, &mut [f64])> = Vec::new();

        for (task, _) in cmds.iter() {
            let task = *task;

            if owned.iter().any(|(t, _)| *t == task) {
                continue;
            }

            let slab = slabs
                .get_mut(task)
                .ok_or(DeviceError::TaskOutOfRange { task, ntasks })?
                .take()
                .ok_or(DeviceError::QueueRace {
                    task,
                    first: owner[task].unwrap_or(q),
                    second: q,
                })?;

            owner[task] = Some(q);
            owned.push((task, slab));
        }

        work.push((cmds, owned));
    }

    let results: Vec<Result<(), DeviceError>> = work
        .into_par_iter()
        .map(|(cmds, mut owned)| {
            for (task, cmd) in cmds {
                let slab = owned
                    .iter_mut()
                    .find(|(t, _)| *t == task)
                    .map(|(_, s)| &mut **s)
                    .ok_or(DeviceError::TaskOutOfRange { task, ntasks })?;

                let mut ctx = AuxContext {
                    task,
                    buffers: layout.split(slab)?,
                    statics,
                };

                cmd(&mut ctx)?;
            }

            Ok(())
        })
        .collect();

    results.into_iter().collect()
}
