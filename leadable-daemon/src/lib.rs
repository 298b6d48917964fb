//! Leadable daemon: the sync engine plus its Unix-socket control surface.
//!
//! - [`registry`]: the named set of syncs and their lifecycle operations
//! - [`task`]: one sync's execution unit and poll loop
//! - [`status`]: the broadcast status channel
//! - [`protocol`]: request/response types and the blocking client

mod error;
pub mod paths;
pub mod protocol;
pub mod registry;
mod runtime;
pub mod status;
pub mod task;

pub use error::{DaemonError, EngineError};
pub use protocol::{
    request_create, request_delete, request_list, request_set_frequency, request_shutdown,
    request_start, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
};
pub use registry::SyncRegistry;
pub use runtime::{build_registry, dispatch, run, serve, start_blocking};
pub use status::{StatusEvent, StatusLevel, StatusSink};
pub use task::{EngineTiming, SyncSnapshot, TaskState};
