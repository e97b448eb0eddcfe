//! AxVisor return-value override probe.
//!
//! Plants a return probe (kretprobe) on one kernel function, found by
//! symbol name, and forces the value it returns to a constant for every
//! call the probe intercepts. The default configuration targets
//! `devmem_is_allowed` and forces `1`, which lifts the `/dev/mem` access
//! restriction while installed.
//!
//! # Features
//!
//! - `kallsyms` - Resolve symbols from the kernel's kallsyms blob (default)
//! - `axhal` - Real time/CPU sources for probe instances
//!
//! # Quick Start
//!
//! ```ignore
//! use axretprobe::{OverrideConfig, ReturnOverride};
//! use axretprobe::symbols::KallsymsResolver;
//!
//! let resolver = KallsymsResolver::from_blob(KALLSYMS, stext, etext)?;
//! let mut ovr = ReturnOverride::new(OverrideConfig::default(), resolver, host_backend);
//!
//! // module init
//! let report = ovr.install()?;
//! println!("{}", report); // "Planted return probe at 0x..."
//!
//! // module exit
//! let report = ovr.uninstall()?;
//! println!("{}", report); // "Missed probing N instances of devmem_is_allowed"
//! ```

#![no_std]

extern crate alloc;

#[macro_use]
extern crate log;

// =============================================================================
// Platform Abstraction (for testing support)
// =============================================================================

pub mod platform;

// =============================================================================
// Core
// =============================================================================

pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod probe;
pub mod symbols;

// Re-export key types for convenience
pub use config::OverrideConfig;
pub use context::{ExecContext, HostWidth, ReturnSlot};
pub use error::{Error, Result};
pub use lifecycle::{InstallReport, ReturnOverride, UninstallReport};
pub use probe::{ProbeBackend, SoftBackend};
pub use symbols::{SymbolResolver, SymbolTable};

#[cfg(feature = "kallsyms")]
pub use symbols::KallsymsResolver;
