use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum BatchError {
    /// Two-electron kernels cover Cartesian shells with l <= 2 only.
    Capability { shell: usize, l: usize, pure: bool },
    ShellOutOfRange { shell: usize, nshells: usize },
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::Capability { shell, l, pure } => {
                write!(
                    f,
                    "EXX kernels do not support shell {} (l = {}, {})",
                    shell,
                    l,
                    if *pure { "spherical" } else { "cartesian" }
                )
            }
            BatchError::ShellOutOfRange { shell, nshells } => {
                write!(f, "screened shell {} out of range ({} shells)", shell, nshells)
            }
        }
    }
}

impl std::error::Error for BatchError {}
