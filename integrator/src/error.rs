//! Error type of the replicated integrator

use control::ControlError;
use device::DeviceError;
use shellpair::BatchError;
use std::fmt;
use xc::XcError;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Device(DeviceError),
    Xc(XcError),
    Batch(BatchError),
    Control(ControlError),
    /// Feature not provided by the engine for this input.
    Capability(String),
    /// Caller-side contract violated; nothing was executed.
    Precondition(String),
    /// Local-work data was prepared for another backend.
    Binding {
        expected: &'static str,
        found: &'static str,
    },
    NotSupported(String),
}

impl EngineError {
    /// True for every "not supported on this backend / input" failure,
    /// whichever layer detected it.
    pub fn is_capability(&self) -> bool {
        matches!(
            self,
            EngineError::Capability(_)
                | EngineError::NotSupported(_)
                | EngineError::Device(DeviceError::Capability { .. })
                | EngineError::Batch(BatchError::Capability { .. })
        )
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Device(e) => write!(f, "device: {}", e),
            EngineError::Xc(e) => write!(f, "xc: {}", e),
            EngineError::Batch(e) => write!(f, "shell-pair batching: {}", e),
            EngineError::Control(e) => write!(f, "control: {}", e),
            EngineError::Capability(what) => write!(f, "{} is not supported", what),
            EngineError::Precondition(what) => write!(f, "precondition violated: {}", what),
            EngineError::Binding { expected, found } => {
                write!(
                    f,
                    "local-work data bound to backend '{}' used with backend '{}'",
                    found, expected
                )
            }
            EngineError::NotSupported(what) => write!(f, "{}: not supported", what),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<DeviceError> for EngineError {
    fn from(e: DeviceError) -> Self {
        EngineError::Device(e)
    }
}

impl From<XcError> for EngineError {
    fn from(e: XcError) -> Self {
        EngineError::Xc(e)
    }
}

impl From<BatchError> for EngineError {
    fn from(e: BatchError) -> Self {
        EngineError::Batch(e)
    }
}

impl From<ControlError> for EngineError {
    fn from(e: ControlError) -> Self {
        EngineError::Control(e)
    }
}
