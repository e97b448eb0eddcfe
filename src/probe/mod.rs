//! Return probe framework.
//!
//! - `descriptor`: what to probe and what to force
//! - `retprobe`: the armed probe, its instance pool and `nmissed`
//! - `handler`: the return handler that rewrites the return slot
//! - `backend`: how a probe is hooked into the target
//! - `registry`: register/unregister on a backend

pub mod backend;
pub mod descriptor;
pub mod handler;
pub mod registry;
pub mod retprobe;

pub use backend::{ProbeBackend, SoftBackend};
pub use descriptor::{ProbeDescriptor, ReturnOverridePolicy};
pub use handler::{HandlerAction, on_return};
pub use registry::{ProbeHandle, ProbeRegistry, Unregistered};
pub use retprobe::{EntryState, ProbeInstance, RetProbe};
