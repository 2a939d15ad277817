use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceError {
    UnknownBackend(String),
    /// Arena request over backend capacity, in f64 words.
    OutOfMemory { requested: usize, available: usize },
    ViewOutOfBounds { offset: usize, len: usize, size: usize },
    /// Two auxiliary queues touched one task slab inside a barrier epoch.
    QueueRace { task: usize, first: usize, second: usize },
    InvalidQueue { queue: usize, nqueues: usize },
    TaskOutOfRange { task: usize, ntasks: usize },
    NotAllocated(&'static str),
    Capability { backend: &'static str, feature: String },
    Kernel(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::UnknownBackend(name) => {
                write!(f, "unknown backend '{}'. Supported backends: host, vendor_a, vendor_b", name)
            }
            DeviceError::OutOfMemory { requested, available } => {
                write!(
                    f,
                    "device out of memory: requested {} words, {} available",
                    requested, available
                )
            }
            DeviceError::ViewOutOfBounds { offset, len, size } => {
                write!(f, "view [{}, {}) outside buffer of {} words", offset, offset + len, size)
            }
            DeviceError::QueueRace { task, first, second } => {
                write!(
                    f,
                    "task {} used by auxiliary queues {} and {} in one epoch",
                    task, first, second
                )
            }
            DeviceError::InvalidQueue { queue, nqueues } => {
                write!(f, "auxiliary queue {} out of range ({} queues)", queue, nqueues)
            }
            DeviceError::TaskOutOfRange { task, ntasks } => {
                write!(f, "task {} out of range ({} tasks allocated)", task, ntasks)
            }
            DeviceError::NotAllocated(what) => {
                write!(f, "{} has not been allocated", what)
            }
            DeviceError::Capability { backend, feature } => {
                write!(f, "{} is not supported by the {} backend", feature, backend)
            }
            DeviceError::Kernel(msg) => {
                write!(f, "kernel failure: {}", msg)
            }
        }
    }
}

impl std::error::Error for DeviceError {}
