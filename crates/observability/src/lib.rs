//! Process-wide tracing setup shared by every binary and test harness.

/// Initialize tracing with JSON output and the `RUST_LOG` filter.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    self::tracing::init();
}

/// Subscriber construction (filters, formats).
pub mod tracing;

pub use self::tracing::{init_with, LogFormat};
