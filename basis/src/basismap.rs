use crate::BasisSet;
use std::ops::Range;

/// Shell → basis-function offset bookkeeping.
#[derive(Debug, Clone)]
pub struct BasisSetMap {
    nbf: usize,
    shell_to_first_bf: Vec<usize>,
    shell_size: Vec<usize>,
    shell_to_atom: Vec<usize>,
    bf_to_shell: Vec<usize>,
}

impl BasisSetMap {
    pub fn new(basis: &BasisSet) -> BasisSetMap {
        let nshells = basis.nshells();

        let mut shell_to_first_bf = Vec::with_capacity(nshells);
        let mut shell_size = Vec::with_capacity(nshells);
        let mut shell_to_atom = Vec::with_capacity(nshells);
        let mut bf_to_shell = Vec::new();

        let mut ibf = 0;

        for (ish, s) in basis.iter().enumerate() {
            shell_to_first_bf.push(ibf);
            shell_size.push(s.size());
            shell_to_atom.push(s.get_atom());

            bf_to_shell.extend(std::iter::repeat(ish).take(s.size()));

            ibf += s.size();
        }

        BasisSetMap {
            nbf: ibf,
            shell_to_first_bf,
            shell_size,
            shell_to_atom,
            bf_to_shell,
        }
    }

    pub fn nbf(&self) -> usize {
        self.nbf
    }

    pub fn nshells(&self) -> usize {
        self.shell_size.len()
    }

    pub fn shell_to_first_bf(&self, ish: usize) -> usize {
        self.shell_to_first_bf[ish]
    }

    pub fn shell_size(&self, ish: usize) -> usize {
        self.shell_size[ish]
    }

    pub fn shell_range(&self, ish: usize) -> Range<usize> {
        let first = self.shell_to_first_bf[ish];
        first..first + self.shell_size[ish]
    }

    pub fn shell_to_atom(&self, ish: usize) -> usize {
        self.shell_to_atom[ish]
    }

    pub fn bf_to_shell(&self, ibf: usize) -> usize {
        self.bf_to_shell[ibf]
    }

    /// Total number of basis functions carried by `shells`. Indices past
    /// the last shell carry none.
    pub fn count_bf(&self, shells: &[usize]) -> usize {
        shells.iter().filter_map(|&ish| self.shell_size.get(ish)).sum()
    }

    /// Expands a shell list into its basis-function indices, in shell order.
    pub fn shells_to_bf(&self, shells: &[usize]) -> Vec<usize> {
        let mut bf = Vec::with_capacity(self.count_bf(shells));

        for &ish in shells.iter() {
            bf.extend(self.shell_range(ish));
        }

        bf
    }
}
