/**
 * Helper functions for creating common error types
 */
use crate::error::Error;

/// Create an `AlreadyInitialized` error for process-wide `component`s
#[must_use]
pub fn already_initialized_error(component: &str) -> Error {
    Error::AlreadyInitialized(component.to_string())
}

/// Create an `EventStreamClosed` error for a change event source that ended
#[must_use]
pub fn stream_closed_error(reason: &str) -> Error {
    Error::EventStreamClosed(reason.to_string())
}

/// Create an `InvalidConfig` error for the named `field`
#[must_use]
pub fn invalid_config_error(field: &str, message: &str) -> Error {
    Error::InvalidConfig(format!("{field}: {message}"))
}

/// Create an error for an `operation` refused because the service is in `state`
#[must_use]
pub fn terminal_state_error(state: &str, operation: &str) -> Error {
    Error::Custom(format!("cannot {operation}: enrichment service is {state}"))
}
