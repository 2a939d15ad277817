use super::*;

#[test]
fn test_vector3f64_basic() {
    let v = Vector3f64::new(1.0, 2.0, 3.0);
    assert_eq!(v.x, 1.0);
    assert_eq!(v.y, 2.0);
    assert_eq!(v.z, 3.0);
    assert_eq!(v.to_array(), [1.0, 2.0, 3.0]);
    assert_eq!(Vector3f64::from_array([1.0, 2.0, 3.0]), v);
}

#[test]
fn test_vector3f64_zeros() {
    let v = Vector3f64::zeros();
    assert_eq!(v.norm_sqr(), 0.0);
}

#[test]
fn test_vector3f64_component() {
    let v = Vector3f64::new(4.0, 5.0, 6.0);
    assert_eq!(v.component(0), 4.0);
    assert_eq!(v.component(1), 5.0);
    assert_eq!(v.component(2), 6.0);
}

#[test]
fn test_vector3f64_arithmetic() {
    let a = Vector3f64::new(1.0, 2.0, 2.0);
    let b = Vector3f64::new(0.0, 0.0, 0.0);

    assert_eq!(a.norm2(), 3.0);
    assert_eq!(a.distance(&b), 3.0);
    assert_eq!((a - a).norm_sqr(), 0.0);
    assert_eq!((a + a).x, 2.0);
    assert_eq!((2.0 * a).y, 4.0);
    assert_eq!((a * 0.5).z, 1.0);
    assert_eq!(a.dot_product(&a), 9.0);
}

#[test]
fn test_vector3f64_bits_distinguish_geometries() {
    let a = Vector3f64::new(0.0, 0.0, 1.0);
    let b = Vector3f64::new(0.0, 0.0, 1.0 + 1.0E-15);
    assert_ne!(a.to_bits(), b.to_bits());
    assert_eq!(a.to_bits(), a.to_bits());
}
