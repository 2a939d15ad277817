use crate::{build_primitive_pairs, BatchError, PrimitivePair, ShellPairDescriptor};

use basis::{BasisSet, BasisSetMap};
use gridtask::GridTask;
use std::collections::BTreeMap;
use std::ops::Range;
use xwconsts::*;

/// (lA, lB) class; `diagonal` selects the i == j sub-batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AngularMomentumClass {
    pub la: usize,
    pub lb: usize,
    pub diagonal: bool,
}

const fn class(la: usize, lb: usize, diagonal: bool) -> AngularMomentumClass {
    AngularMomentumClass { la, lb, diagonal }
}

/// Launch order of the G-matrix classes. Never interleaved.
pub const CLASS_ORDER: [AngularMomentumClass; N_EXX_AM + N_AM_CLASSES] = [
    class(0, 0, true),
    class(1, 1, true),
    class(2, 2, true),
    class(0, 0, false),
    class(1, 1, false),
    class(2, 2, false),
    class(0, 1, false),
    class(1, 0, false),
    class(0, 2, false),
    class(2, 0, false),
    class(1, 2, false),
    class(2, 1, false),
];

/// Places a shell pair inside one task's F/G buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskShellPairLink {
    pub pair: usize,
    pub task: usize,
    /// column offset of shell i in the task's cou block
    pub i_off: usize,
    /// column offset of shell j in the task's cou block
    pub j_off: usize,
}

/// All links of one class, ordered by (task, pair).
#[derive(Debug, Clone)]
pub struct ClassBatch {
    pub class: AngularMomentumClass,
    pub links: Vec<TaskShellPairLink>,
    /// links[task_ranges[t]] are the links of task t
    pub task_ranges: Vec<Range<usize>>,
}

impl ClassBatch {
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Links grouped by shell pair, each group ordered by task.
    pub fn pair_groups(&self) -> Vec<(usize, Vec<TaskShellPairLink>)> {
        let mut groups: BTreeMap<usize, Vec<TaskShellPairLink>> = BTreeMap::new();

        for link in self.links.iter() {
            groups.entry(link.pair).or_default().push(*link);
        }

        groups.into_iter().collect()
    }
}

/// Shell-pair work for the EXX G-matrix of one local-work call.
#[derive(Debug, Clone)]
pub struct ShellPairBatcher {
    pairs: Vec<ShellPairDescriptor>,
    prims: Vec<PrimitivePair>,
    batches: Vec<ClassBatch>,
    task_npts: Vec<usize>,
    task_nbe_cou: Vec<usize>,
}

impl ShellPairBatcher {
    /// Rejects spherical shells and l > 2 anywhere in the basis.
    pub fn validate_basis(basis: &BasisSet) -> Result<(), BatchError> {
        for (ish, s) in basis.iter().enumerate() {
            if s.get_l() > MAX_EXX_L || s.is_pure() {
                return Err(BatchError::Capability {
                    shell: ish,
                    l: s.get_l(),
                    pure: s.is_pure(),
                });
            }
        }

        Ok(())
    }

    pub fn new(basis: &BasisSet, map: &BasisSetMap, tasks: &[GridTask]) -> Result<ShellPairBatcher, BatchError> {
        ShellPairBatcher::validate_basis(basis)?;

        let nshells = basis.nshells();

        // global pair list: sorted union of every task's (i <= j) pairs
        let mut pair_index: BTreeMap<(usize, usize), usize> = BTreeMap::new();

        for task in tasks.iter() {
            let shells = task.get_cou_screening().get_shell_list();

            for (k, &i) in shells.iter().enumerate() {
                if i >= nshells {
                    return Err(BatchError::ShellOutOfRange { shell: i, nshells });
                }

                for &j in shells[k..].iter() {
                    pair_index.insert((i.min(j), i.max(j)), 0);
                }
            }
        }

        let mut pairs = Vec::with_capacity(pair_index.len());
        let mut prims = Vec::new();

        for (ipair, ((i, j), idx)) in pair_index.iter_mut().enumerate() {
            *idx = ipair;

            let a = basis.get_shell(*i);
            let b = basis.get_shell(*j);

            let prim_offset = prims.len();
            let nprim_pairs = build_primitive_pairs(a, b, &mut prims);

            let ca = a.get_center().to_array();
            let cb = b.get_center().to_array();

            pairs.push(ShellPairDescriptor {
                ish: *i,
                jsh: *j,
                la: a.get_l(),
                lb: b.get_l(),
                center_a: ca,
                center_b: cb,
                rab: [ca[0] - cb[0], ca[1] - cb[1], ca[2] - cb[2]],
                prim_offset,
                nprim_pairs,
            });
        }

        // links, per task in pair order
        let mut per_class: BTreeMap<usize, Vec<TaskShellPairLink>> = BTreeMap::new();

        for (itask, task) in tasks.iter().enumerate() {
            let shells = task.get_cou_screening().get_shell_list();

            let mut offsets = Vec::with_capacity(shells.len());
            let mut off = 0;
            for &ish in shells.iter() {
                offsets.push(off);
                off += map.shell_size(ish);
            }

            let mut links = Vec::new();

            for (ki, &i) in shells.iter().enumerate() {
                for (kj, &j) in shells.iter().enumerate().skip(ki) {
                    // shell lists are sorted, so i <= j
                    let pair = pair_index[&(i, j)];
                    links.push(TaskShellPairLink {
                        pair,
                        task: itask,
                        i_off: offsets[ki],
                        j_off: offsets[kj],
                    });
                }
            }

            links.sort_by_key(|l| l.pair);

            for link in links {
                let p = &pairs[link.pair];
                let key = class_index(&class(p.la, p.lb, p.is_diagonal()));
                per_class.entry(key).or_default().push(link);
            }
        }

        let batches = CLASS_ORDER
            .iter()
            .enumerate()
            .map(|(k, c)| {
                let links = per_class.remove(&k).unwrap_or_default();
                let task_ranges = task_ranges(&links, tasks.len());

                ClassBatch {
                    class: *c,
                    links,
                    task_ranges,
                }
            })
            .collect();

        let batcher = ShellPairBatcher {
            pairs,
            prims,
            batches,
            task_npts: tasks.iter().map(|t| t.npts()).collect(),
            task_nbe_cou: tasks.iter().map(|t| t.nbe_cou()).collect(),
        };

        log::debug!(
            "shell-pair batcher: {} pairs, {} primitive pairs, {} links",
            batcher.npairs(),
            batcher.prims.len(),
            batcher.nlinks()
        );

        Ok(batcher)
    }

    pub fn npairs(&self) -> usize {
        self.pairs.len()
    }

    pub fn get_pairs(&self) -> &[ShellPairDescriptor] {
        &self.pairs
    }

    pub fn get_pair(&self, ipair: usize) -> &ShellPairDescriptor {
        &self.pairs[ipair]
    }

    pub fn pair_prims(&self, ipair: usize) -> &[PrimitivePair] {
        let p = &self.pairs[ipair];
        &self.prims[p.prim_offset..p.prim_offset + p.nprim_pairs]
    }

    pub fn nprims(&self) -> usize {
        self.prims.len()
    }

    /// Class batches in launch order.
    pub fn get_batches(&self) -> &[ClassBatch] {
        &self.batches
    }

    pub fn nlinks(&self) -> usize {
        self.batches.iter().map(|b| b.links.len()).sum()
    }

    pub fn ntasks(&self) -> usize {
        self.task_npts.len()
    }

    pub fn task_npts(&self, itask: usize) -> usize {
        self.task_npts[itask]
    }

    pub fn task_nbe_cou(&self, itask: usize) -> usize {
        self.task_nbe_cou[itask]
    }
}

fn class_index(c: &AngularMomentumClass) -> usize {
    CLASS_ORDER.iter().position(|x| x == c).unwrap_or(0)
}

fn task_ranges(links: &[TaskShellPairLink], ntasks: usize) -> Vec<Range<usize>> {
    let mut ranges = vec![0..0; ntasks];
    let mut start = 0;

    while start < links.len() {
        let task = links[start].task;
        let mut end = start;
        while end < links.len() && links[end].task == task {
            end += 1;
        }
        ranges[task] = start..end;
        start = end;
    }

    ranges
}
