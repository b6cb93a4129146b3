//! Close codes and canonical close reasons.
//!
//! The dispatcher only ever issues two codes: `NORMAL` after a clean
//! client- or server-initiated close, and `INTERNAL_ERROR` for setup
//! failures and error-triggered teardown.

/// Normal closure.
pub const NORMAL: u16 = 1000;

/// Internal error (setup failure or errored session).
pub const INTERNAL_ERROR: u16 = 1011;

/// Reason attached to the terminal close after a clean shutdown.
pub const NORMAL_CLOSURE_REASON: &str = "Normal closure";

/// Reason used when session setup fails after the upgrade is committed.
pub const SETUP_FAILURE_REASON: &str = "Uncaught exception during session setup.";

/// Reason used when an errored connection has no registered session.
pub const SETUP_ERROR_REASON: &str = "Error during session setup.";

/// Reason used when an errored connection has a registered session.
pub const SESSION_ERROR_REASON: &str = "Error during session.";
