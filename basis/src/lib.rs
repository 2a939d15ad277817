//! Gaussian basis model: shells, atoms, and the shell → basis-function map.

mod shell;
pub use shell::*;

mod molecule;
pub use molecule::*;

mod basismap;
pub use basismap::*;

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

#[derive(Debug, Clone, Default)]
pub struct BasisSet {
    shells: Vec<Shell>,
}

impl BasisSet {
    pub fn new(shells: Vec<Shell>) -> BasisSet {
        BasisSet { shells }
    }

    pub fn nshells(&self) -> usize {
        self.shells.len()
    }

    pub fn nbf(&self) -> usize {
        self.shells.iter().map(|s| s.size()).sum()
    }

    pub fn max_l(&self) -> usize {
        self.shells.iter().map(|s| s.get_l()).max().unwrap_or(0)
    }

    pub fn max_nprim(&self) -> usize {
        self.shells.iter().map(|s| s.get_nprim()).max().unwrap_or(0)
    }

    pub fn has_pure(&self) -> bool {
        self.shells.iter().any(|s| s.is_pure())
    }

    pub fn get_shell(&self, ish: usize) -> &Shell {
        &self.shells[ish]
    }

    pub fn get_shells(&self) -> &[Shell] {
        &self.shells
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Shell> {
        self.shells.iter()
    }

    pub fn normalize(&mut self) {
        for s in self.shells.iter_mut() {
            s.normalize();
        }
    }

    /// Hash over every bit of shell data. Two basis sets with the same
    /// fingerprint produce identical static uploads.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        hasher.write_usize(self.shells.len());

        for s in self.shells.iter() {
            s.hash_bits(&mut hasher);
        }

        hasher.finish()
    }
}

#[cfg(test)]
mod tests;
