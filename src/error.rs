//! Error types for probe installation and teardown.

use alloc::string::String;
use axerrno::AxError;

/// Lifecycle state names used in [`Error::InvalidState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninstalled,
    Installed,
}

impl core::fmt::Display for State {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Uninstalled => write!(f, "uninstalled"),
            Self::Installed => write!(f, "installed"),
        }
    }
}

/// Error types for the return probe core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The target symbol could not be located.
    SymbolNotFound(String),
    /// Install/uninstall called from the wrong lifecycle state.
    InvalidState {
        expected: State,
        found: State,
    },
    /// A probe is already armed at this address.
    AlreadyRegistered(usize),
    /// No probe is armed at this address.
    NotRegistered(usize),
    /// The probe descriptor violates an invariant (null address, zero bound).
    InvalidDescriptor(&'static str),
    /// The configuration was rejected.
    InvalidConfig(&'static str),
    /// The kallsyms blob could not be parsed.
    SymbolTable(&'static str),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SymbolNotFound(name) => write!(f, "Symbol not found: {}", name),
            Self::InvalidState { expected, found } => {
                write!(f, "Invalid state: expected {}, found {}", expected, found)
            }
            Self::AlreadyRegistered(addr) => {
                write!(f, "Probe already registered at {:#x}", addr)
            }
            Self::NotRegistered(addr) => write!(f, "No probe registered at {:#x}", addr),
            Self::InvalidDescriptor(e) => write!(f, "Invalid probe descriptor: {}", e),
            Self::InvalidConfig(e) => write!(f, "Invalid configuration: {}", e),
            Self::SymbolTable(e) => write!(f, "Failed to parse symbol table: {}", e),
        }
    }
}

impl core::error::Error for Error {}

impl From<Error> for AxError {
    fn from(err: Error) -> Self {
        match err {
            Error::SymbolNotFound(_) | Error::NotRegistered(_) => AxError::NotFound,
            Error::InvalidState { .. } => AxError::BadState,
            Error::AlreadyRegistered(_) => AxError::AlreadyExists,
            Error::InvalidDescriptor(_) | Error::InvalidConfig(_) | Error::SymbolTable(_) => {
                AxError::InvalidInput
            }
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
