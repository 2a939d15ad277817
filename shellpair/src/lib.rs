//! Shell-pair batching for the EXX G-matrix: primitive-pair data,
//! angular-momentum classes, the Boys table and the point kernels.

mod error;
pub use error::BatchError;

mod boys;
pub use boys::*;

mod pair;
pub use pair::*;

mod batcher;
pub use batcher::*;

pub mod nuclear;

pub mod dispatch;
pub use dispatch::{accumulate_link, GmatDispatch, ShellMapped, TaskMapped};
