//! Logging abstraction layer for arbor-pages
//!
//! Every failure path in the runtime reports through these macros instead of
//! returning an error to the caller. They forward to `tracing` events under the
//! `arbor` target, so the embedding application decides where logs go by
//! installing a subscriber.
//!
//! ## Macro Overview
//!
//! | Macro | Feature Required | Level |
//! |-------|------------------|-------|
//! | `debug_log!` | `debug-hooks` | `DEBUG` |
//! | `info_log!` | None | `INFO` |
//! | `warn_log!` | None | `WARN` |
//! | `error_log!` | None | `ERROR` |
//!
//! ## Example
//!
//! ```ignore
//! use arbor_pages::{debug_log, info_log, warn_log, error_log};
//!
//! // Only emitted when the `debug-hooks` feature is enabled
//! debug_log!("cache miss for {}", key);
//!
//! info_log!("Component registered: {}", identity);
//! warn_log!("destroy: unknown identity {}", identity);
//! error_log!("subscriber failed: {}", error);
//! ```

/// Logs a debug message (requires `debug-hooks` feature)
///
/// Used for graph and cache tracing that is too chatty for normal builds.
#[macro_export]
#[cfg(feature = "debug-hooks")]
macro_rules! debug_log {
	($($arg:tt)*) => {{
		::tracing::debug!(target: "arbor", $($arg)*);
	}};
}

/// No-op debug_log when the `debug-hooks` feature is disabled
///
/// Arguments are still type-checked and borrowed, so values that only feed a
/// debug line do not trip unused-variable lints.
#[macro_export]
#[cfg(not(feature = "debug-hooks"))]
macro_rules! debug_log {
	($($arg:tt)*) => {{
		let _ = ::core::format_args!($($arg)*);
	}};
}

/// Logs an info message
///
/// # Example
///
/// ```ignore
/// info_log!("Navigated to {}", path);
/// ```
#[macro_export]
macro_rules! info_log {
	($($arg:tt)*) => {{
		::tracing::info!(target: "arbor", $($arg)*);
	}};
}

/// Logs a warning message
///
/// Non-fatal conditions such as unknown identities or missing routes.
#[macro_export]
macro_rules! warn_log {
	($($arg:tt)*) => {{
		::tracing::warn!(target: "arbor", $($arg)*);
	}};
}

/// Logs an error message
///
/// Swallowed failures: hooks, subscribers and builds that failed but did not
/// abort the surrounding operation.
#[macro_export]
macro_rules! error_log {
	($($arg:tt)*) => {{
		::tracing::error!(target: "arbor", $($arg)*);
	}};
}
