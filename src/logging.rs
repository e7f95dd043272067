//! Structured logging (C0, ambient): an `EnvFilter`-driven
//! `tracing-subscriber` initializer, mirroring the teacher's own
//! `tracing` + `tracing-subscriber` wiring.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber. Reads `RUST_LOG` via
/// `EnvFilter`, defaulting to `info` when unset. Safe to call once per
/// process; a second call is a no-op (the underlying `set_global_default`
/// error is swallowed, matching the teacher's "best effort" init style).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
