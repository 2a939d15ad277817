use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    Io { path: String, message: String },
    UnknownParameter { line: String },
    InvalidValue { key: String, value: String },
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::Io { path, message } => {
                write!(f, "cannot read control file '{}': {}", path, message)
            }
            ControlError::UnknownParameter { line } => {
                write!(f, "unknown parameter : {}", line)
            }
            ControlError::InvalidValue { key, value } => {
                write!(f, "invalid value '{}' for parameter '{}'", value, key)
            }
        }
    }
}

impl std::error::Error for ControlError {}
