//! Quadrature tasks handed over by the load balancer.

use basis::{BasisSet, BasisSetMap};
use itertools::multizip;
use vector3::*;

/// Screened shell list of one task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Screening {
    shell_list: Vec<usize>,
    nbe: usize,
}

impl Screening {
    /// `shells` is sorted and deduplicated.
    pub fn new(shells: &[usize], map: &BasisSetMap) -> Screening {
        let mut shell_list = shells.to_vec();
        shell_list.sort_unstable();
        shell_list.dedup();

        let nbe = map.count_bf(&shell_list);

        Screening { shell_list, nbe }
    }

    pub fn all(map: &BasisSetMap) -> Screening {
        Screening {
            shell_list: (0..map.nshells()).collect(),
            nbe: map.nbf(),
        }
    }

    /// Keeps shells whose primitive envelope reaches at least one point above `tol`.
    pub fn by_extent(basis: &BasisSet, map: &BasisSetMap, points: &[Vector3f64], tol: f64) -> Screening {
        let shells: Vec<usize> = basis
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                let r = s.extent(tol);
                let center = s.get_center();
                points.iter().any(|p| p.distance(&center) <= r)
            })
            .map(|(ish, _)| ish)
            .collect();

        Screening::new(&shells, map)
    }

    pub fn get_shell_list(&self) -> &[usize] {
        &self.shell_list
    }

    pub fn nshells(&self) -> usize {
        self.shell_list.len()
    }

    /// Number of basis functions behind the screened shells.
    pub fn nbe(&self) -> usize {
        self.nbe
    }

    pub fn is_empty(&self) -> bool {
        self.shell_list.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct GridTask {
    iparent: usize,
    points: Vec<Vector3f64>,
    weights: Vec<f64>,
    bfn_screening: Screening,
    cou_screening: Screening,
}

impl GridTask {
    pub fn new(iparent: usize, points: Vec<Vector3f64>, weights: Vec<f64>, bfn_screening: Screening) -> GridTask {
        assert_eq!(points.len(), weights.len());

        GridTask {
            iparent,
            points,
            weights,
            bfn_screening,
            cou_screening: Screening::default(),
        }
    }

    pub fn with_cou_screening(mut self, cou_screening: Screening) -> GridTask {
        self.cou_screening = cou_screening;
        self
    }

    pub fn get_iparent(&self) -> usize {
        self.iparent
    }

    pub fn npts(&self) -> usize {
        self.points.len()
    }

    pub fn get_points(&self) -> &[Vector3f64] {
        &self.points
    }

    pub fn get_weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn get_bfn_screening(&self) -> &Screening {
        &self.bfn_screening
    }

    pub fn get_cou_screening(&self) -> &Screening {
        &self.cou_screening
    }

    pub fn nbe(&self) -> usize {
        self.bfn_screening.nbe()
    }

    pub fn nbe_cou(&self) -> usize {
        self.cou_screening.nbe()
    }

    pub fn sum_weights(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Scales every weight, as done by a partition-weight scheme.
    pub fn scale_weights(&mut self, factors: &[f64]) {
        assert_eq!(factors.len(), self.weights.len());

        for (w, f) in multizip((self.weights.iter_mut(), factors.iter())) {
            *w *= f;
        }
    }
}

/// Ordered task list as produced by the load balancer.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    tasks: Vec<GridTask>,
    modified_weights_are_stored: bool,
}

impl TaskList {
    pub fn new(tasks: Vec<GridTask>, modified_weights_are_stored: bool) -> TaskList {
        TaskList {
            tasks,
            modified_weights_are_stored,
        }
    }

    pub fn modified_weights_are_stored(&self) -> bool {
        self.modified_weights_are_stored
    }

    pub fn set_modified_weights_are_stored(&mut self, flag: bool) {
        self.modified_weights_are_stored = flag;
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get_tasks(&self) -> &[GridTask] {
        &self.tasks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GridTask> {
        self.tasks.iter()
    }

    pub fn total_points(&self) -> usize {
        self.tasks.iter().map(|t| t.npts()).sum()
    }

    /// Consecutive batches of at most `n` tasks; `n == 0` yields the whole list.
    pub fn batches(&self, n: usize) -> std::slice::Chunks<'_, GridTask> {
        let n = if n == 0 { self.tasks.len().max(1) } else { n };
        self.tasks.chunks(n)
    }
}
