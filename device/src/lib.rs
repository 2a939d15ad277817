//! Emulated accelerator: backend selection, the device memory arena and
//! the master/auxiliary queue model.

mod error;
pub use error::DeviceError;

mod backend;
pub use backend::*;

mod layout;
pub use layout::*;

mod arena;
pub use arena::*;

mod queue;
pub use queue::*;

#[cfg(test)]
mod tests;
