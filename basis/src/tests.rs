use super::*;
use vector3::Vector3f64;

fn water_like() -> (Molecule, BasisSet) {
    let o = Vector3f64::new(0.0, 0.0, 0.0);
    let h = Vector3f64::new(0.0, 1.43, 1.1);

    let mol = Molecule::new(vec![Atom::new(8, o), Atom::new(1, h)]);

    let mut basis = BasisSet::new(vec![
        Shell::new(0, false, &[5.0, 1.0], &[0.4, 0.7], o, 0),
        Shell::new(1, false, &[1.2], &[1.0], o, 0),
        Shell::new(2, true, &[0.8], &[1.0], o, 0),
        Shell::new(0, false, &[0.5], &[1.0], h, 1),
    ]);
    basis.normalize();

    (mol, basis)
}

#[test]
fn test_cartesian_powers() {
    assert_eq!(cartesian_powers(0), vec![[0, 0, 0]]);
    assert_eq!(cartesian_powers(1), vec![[1, 0, 0], [0, 1, 0], [0, 0, 1]]);
    assert_eq!(
        cartesian_powers(2),
        vec![[2, 0, 0], [1, 1, 0], [1, 0, 1], [0, 2, 0], [0, 1, 1], [0, 0, 2]]
    );
    assert_eq!(cartesian_powers(3).len(), cartesian_size(3));
}

#[test]
fn test_shell_normalize() {
    let (_, basis) = water_like();

    for s in basis.iter() {
        assert!((s.norm_sqr() - 1.0).abs() < 1E-12, "l = {}", s.get_l());
    }

    // single s primitive: (2a/π)^(3/4)
    let mut s = Shell::new(0, false, &[0.5], &[3.0], Vector3f64::zeros(), 0);
    s.normalize();
    assert!((s.get_coefficients()[0] - (1.0 / std::f64::consts::PI).powf(0.75)).abs() < 1E-14);
}

#[test]
fn test_basis_set_map() {
    let (_, basis) = water_like();
    let map = BasisSetMap::new(&basis);

    assert_eq!(basis.nbf(), 1 + 3 + 5 + 1);
    assert_eq!(map.nbf(), basis.nbf());
    assert_eq!(basis.max_l(), 2);
    assert!(basis.has_pure());

    assert_eq!(map.shell_to_first_bf(2), 4);
    assert_eq!(map.shell_range(3), 9..10);
    assert_eq!(map.shell_to_atom(3), 1);
    assert_eq!(map.bf_to_shell(5), 2);
    assert_eq!(map.shells_to_bf(&[1, 3]), vec![1, 2, 3, 9]);
    assert_eq!(map.count_bf(&[0, 2]), 6);
}

#[test]
fn test_molecule_rab() {
    let (mol, _) = water_like();
    let rab = mol.get_rab();

    let d = (1.43f64 * 1.43 + 1.1 * 1.1).sqrt();

    assert_eq!(rab[0], 0.0);
    assert!((rab[1] - d).abs() < 1E-14);
    assert_eq!(rab[1], rab[2]);
    assert_eq!(mol.get_coords().len(), 6);
}

#[test]
fn test_fingerprints() {
    let (mol, basis) = water_like();
    let (mol2, basis2) = water_like();

    assert_eq!(mol.fingerprint(), mol2.fingerprint());
    assert_eq!(basis.fingerprint(), basis2.fingerprint());

    let mut moved = basis2.clone();
    let mut shells = moved.get_shells().to_vec();
    shells[3].set_center(Vector3f64::new(0.0, 1.43, 1.2));
    moved = BasisSet::new(shells);

    assert_ne!(basis.fingerprint(), moved.fingerprint());
}

#[test]
fn test_shell_extent() {
    let s = Shell::new(0, false, &[1.0], &[1.0], Vector3f64::zeros(), 0);

    let r = s.extent(1E-10);
    assert!(((-r * r).exp() - 1E-10).abs() < 1E-20);
    assert_eq!(s.extent(2.0), 0.0);
}
