//! Task-batched XC / EXX local-work engine.
//!
//! `XcIntegrator` is the entry point: it splits the load balancer's task
//! list into batches and drives the pipeline stages of `LocalWorkDriver`
//! over the device arena and queues of the configured backend.

mod error;
pub use error::EngineError;

pub mod submat;

pub mod collocation;

mod upload;
pub use upload::*;

mod stages;
pub use stages::*;

mod driver;
pub use driver::*;

mod reduction;
pub use reduction::*;

mod replicated;
pub use replicated::*;
