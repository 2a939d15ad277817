//! Error types for the XC module

use crate::XcFamily;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum XcError {
    /// Unknown or unsupported XC scheme
    UnknownScheme(String),
    /// The functional was called through an entry point of another family
    FamilyMismatch {
        name: String,
        family: XcFamily,
        requested: XcFamily,
    },
    /// Input and output batches disagree in length
    LengthMismatch { expected: usize, found: usize },
    /// The functional has no spin-polarized form
    Unpolarized(String),
}

impl fmt::Display for XcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XcError::UnknownScheme(scheme) => {
                write!(f, "Unknown XC scheme: '{}'. Supported schemes: slater, pbe", scheme)
            }
            XcError::FamilyMismatch {
                name,
                family,
                requested,
            } => {
                write!(
                    f,
                    "functional '{}' is {:?} but was evaluated as {:?}",
                    name, family, requested
                )
            }
            XcError::LengthMismatch { expected, found } => {
                write!(f, "batch length mismatch: expected {}, found {}", expected, found)
            }
            XcError::Unpolarized(name) => {
                write!(f, "functional '{}' has no spin-polarized form", name)
            }
        }
    }
}

impl std::error::Error for XcError {}
