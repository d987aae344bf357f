//! Hook entry points for the triadic runtime.
//!
//! Every hook is a short-lived process following the same envelope: read
//! stdin as tolerant JSON, look up the active workspace exactly once, do
//! the hook's work inside a failure boundary, record an execution (or
//! failure) event, and exit 0. Hooks must never crash the host. The one
//! exception is the pre-tool experience hook, which exits 2 on its
//! blocking path with a user-style interjection on stderr.

pub mod envelope;
pub mod hooks;
pub mod paths;
pub mod protocol;
pub mod registry;

pub use envelope::{HookOutcome, run_hook};
pub use paths::ProjectPaths;
pub use protocol::{HookInput, hook_output_json};
pub use registry::{HookEvent, render_settings, validate_settings};
