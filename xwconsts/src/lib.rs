use std::f64;

// pi

pub const PI: f64 = f64::consts::PI;
pub const TWOPI: f64 = 2.0 * f64::consts::PI;
pub const FOURPI: f64 = 4.0 * f64::consts::PI;

// numerical thresholds

pub const EPS6: f64 = 1E-6;
pub const EPS10: f64 = 1E-10;
pub const EPS12: f64 = 1E-12;
pub const EPS14: f64 = 1E-14;
pub const EPS15: f64 = 1E-15;
pub const EPS20: f64 = 1E-20;

// densities below this are treated as vacuum by the reference functionals

pub const RHO_THRESHOLD: f64 = 1E-15;

// primitive pairs with a smaller prefactor are dropped from the EXX kernels

pub const PRIMITIVE_PAIR_THRESHOLD: f64 = 1E-16;

// angular momentum limits

pub const MAX_EXX_L: usize = 2;
pub const MAX_PURE_L: usize = 2;
pub const N_EXX_AM: usize = MAX_EXX_L + 1;
pub const N_AM_CLASSES: usize = N_EXX_AM * N_EXX_AM;

// X matrix prefactor: closed-shell total density / single spin component

pub const XMAT_FACTOR_CLOSED_SHELL: f64 = 2.0;
pub const XMAT_FACTOR_SPIN_COMPONENT: f64 = 1.0;

// device defaults

pub const DEFAULT_AUX_QUEUES: usize = 4;
pub const DEFAULT_DEVICE_MEMORY_MB: f64 = 1024.0;
pub const WORDS_PER_MB: f64 = 1024.0 * 1024.0 / 8.0;

// Boys function table

pub const BOYS_MAX_ORDER: usize = 16;
pub const BOYS_TABLE_TMAX: f64 = 40.0;
pub const BOYS_TABLE_STEP: f64 = 0.05;
pub const BOYS_TAYLOR_ORDER: usize = 6;
