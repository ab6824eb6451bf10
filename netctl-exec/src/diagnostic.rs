//! Classification of failed commands.
//!
//! iproute2 reports most failures as free text on stderr, so each error class is recognized by
//! matching known signatures. Every class has exactly one function here. Callers never look at
//! the raw text themselves.

use crate::Error;

const NAMESPACE_NOT_FOUND: &[&str] = &["Cannot open network namespace"];

const DEVICE_NOT_FOUND: &[&str] = &["Cannot find device", "does not exist", "No such device"];

const ENTRY_NOT_FOUND: &[&str] = &["No such file or directory"];

fn stderr_contains(err: &Error, signatures: &[&str]) -> bool {
    err.stderr().is_some_and(|stderr| signatures.iter().any(|s| stderr.contains(s)))
}

/// The target namespace could not be entered.
pub fn is_namespace_not_found(err: &Error) -> bool {
    stderr_contains(err, NAMESPACE_NOT_FOUND)
}

/// The target device does not exist.
///
/// Namespace failures also mention missing files, so they are never classified as a missing
/// device.
pub fn is_device_not_found(err: &Error) -> bool {
    !is_namespace_not_found(err) && stderr_contains(err, DEVICE_NOT_FOUND)
}

/// The kernel object being removed (neighbor, route, rule, address) is not there.
pub fn is_entry_not_found(err: &Error) -> bool {
    !is_namespace_not_found(err) && stderr_contains(err, ENTRY_NOT_FOUND)
}
