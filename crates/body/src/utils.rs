//! Utility macros and functions shared by the body engine.
//!
//! This module provides helper macros and functions that are used internally
//! by the crate implementation.

use std::any::Any;

/// A macro for early returns with an error if a condition is not met.
///
/// This is similar to the `assert!` macro, but returns an error instead of panicking.
/// It's useful for validation checks where you want to return early with an error
/// if some condition is not satisfied.
///
/// # Example
///
/// ```ignore
/// ensure!(len <= MAX_TRAILER_BYTES, BodyError::invalid_header("trailer too large"));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// Rounds `n` up to the next power of two.
///
/// Values that cannot be rounded without overflowing are returned unchanged.
pub(crate) fn round2(n: usize) -> usize {
    n.checked_next_power_of_two().unwrap_or(n)
}

/// Extracts the message of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Clamps a wire length to the addressable range of this platform.
pub(crate) fn clamp_len(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(0), 1);
        assert_eq!(round2(1), 1);
        assert_eq!(round2(3), 4);
        assert_eq!(round2(1024), 1024);
        assert_eq!(round2(1025), 2048);
        assert_eq!(round2(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");

        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(&*payload), "unknown panic payload");
    }

    #[test]
    fn test_clamp_len() {
        assert_eq!(clamp_len(42), 42);
    }
}
