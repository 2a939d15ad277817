use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use vector3::*;

#[derive(Debug, Clone, Copy)]
pub struct Atom {
    z: usize,
    position: Vector3f64,
}

impl Atom {
    pub fn new(z: usize, position: Vector3f64) -> Atom {
        Atom { z, position }
    }

    pub fn get_z(&self) -> usize {
        self.z
    }

    pub fn get_position(&self) -> Vector3f64 {
        self.position
    }
}

#[derive(Debug, Clone, Default)]
pub struct Molecule {
    atoms: Vec<Atom>,
}

impl Molecule {
    pub fn new(atoms: Vec<Atom>) -> Molecule {
        Molecule { atoms }
    }

    pub fn natoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn get_atom(&self, iat: usize) -> &Atom {
        &self.atoms[iat]
    }

    pub fn get_atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Flattened (x, y, z) per atom.
    pub fn get_coords(&self) -> Vec<f64> {
        self.atoms
            .iter()
            .flat_map(|a| a.position.to_array())
            .collect()
    }

    /// Inter-atomic distances, natoms x natoms column-major.
    pub fn get_rab(&self) -> Vec<f64> {
        let n = self.natoms();
        let mut rab = vec![0.0; n * n];

        for j in 0..n {
            for i in 0..n {
                rab[i + j * n] = self.atoms[i].position.distance(&self.atoms[j].position);
            }
        }

        rab
    }

    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        hasher.write_usize(self.atoms.len());

        for a in self.atoms.iter() {
            hasher.write_usize(a.z);
            for b in a.position.to_bits() {
                hasher.write_u64(b);
            }
        }

        hasher.finish()
    }
}
