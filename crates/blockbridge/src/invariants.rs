//! Debug assertion macros for the bridge's terminal protocol.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so release
//! builds pay nothing for them.

// =============================================================================
// Single terminal owner
// =============================================================================

/// Assert that the CAS winner is the one that closed the terminal signal.
///
/// **Invariant**: `cas_won → terminal.close() == true`
///
/// Used in: `Inner::complete()`, `Inner::fail()`
macro_rules! debug_assert_sole_closer {
    ($closed:expr) => {
        debug_assert!(
            $closed,
            "terminal signal was already closed when the CAS winner tried to close it"
        )
    };
}

// =============================================================================
// Error before signal
// =============================================================================

/// Assert that the error slot is written while the terminal signal is open.
///
/// **Invariant**: `error_slot.send(err)` happens-before `terminal.close()`
///
/// Used in: `Inner::fail()` right after the slot write
macro_rules! debug_assert_error_before_signal {
    ($signal_closed:expr) => {
        debug_assert!(
            !$signal_closed,
            "error slot written after the terminal signal was closed"
        )
    };
}

// =============================================================================
// Forward only while active
// =============================================================================

/// Assert that an item reaches the send only if the guard saw `Active`.
///
/// **Invariant**: `items.send(item) → terminated == false at the guard`
///
/// Used in: `BlockSubscriber::on_next()` between the increment and the send
macro_rules! debug_assert_active_forward {
    ($terminated_at_guard:expr) => {
        debug_assert!(
            !$terminated_at_guard,
            "item forwarded although the bridge was terminated at the guard"
        )
    };
}

pub(crate) use debug_assert_active_forward;
pub(crate) use debug_assert_error_before_signal;
pub(crate) use debug_assert_sole_closer;
