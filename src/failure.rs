//! Failure signatures and the values test functions return.
//!
//! A [`Signature`] is the coarse key used to tell distinct bugs apart: a
//! category (what kind of failure) plus the source location it was raised
//! from. It plays no part in deciding whether a shrink is valid beyond
//! "same signature or not".

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::DrawError;

/// Category used for failures raised through [`ensure`] / [`Failure::assertion`].
pub const ASSERTION: &str = "assertion";

/// Category used for panics escaping a test body.
pub const PANIC: &str = "panic";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature {
    pub category: String,
    pub location: String,
}

impl Signature {
    pub fn new(category: impl Into<String>, location: impl Into<String>) -> Self {
        Signature {
            category: category.into(),
            location: location.into(),
        }
    }

    /// Signature for `category` raised at the caller's source location.
    #[track_caller]
    pub fn here(category: impl Into<String>) -> Self {
        Signature::new(category, format_location(Location::caller()))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.category, self.location)
    }
}

fn format_location(location: &Location<'_>) -> String {
    format!("{}:{}", location.file(), location.line())
}

/// A failed test: the signal that drives shrinking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub signature: Signature,
    pub message: String,
}

impl Failure {
    #[track_caller]
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Failure {
            signature: Signature::here(category),
            message: message.into(),
        }
    }

    #[track_caller]
    pub fn assertion(message: impl Into<String>) -> Self {
        Failure::new(ASSERTION, message)
    }

    pub fn with_signature(signature: Signature, message: impl Into<String>) -> Self {
        Failure {
            signature,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.signature)
        } else {
            write!(f, "{}: {}", self.signature, self.message)
        }
    }
}

/// What a test function returns when it does not pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestError {
    /// A draw made from inside the test stopped the execution.
    Draw(DrawError),
    /// The property did not hold.
    Failed(Failure),
}

impl From<DrawError> for TestError {
    fn from(e: DrawError) -> Self {
        TestError::Draw(e)
    }
}

impl From<Failure> for TestError {
    fn from(f: Failure) -> Self {
        TestError::Failed(f)
    }
}

/// Fails with an assertion signature located at the caller unless `condition` holds.
#[track_caller]
pub fn ensure(condition: bool, message: impl Into<String>) -> Result<(), TestError> {
    if condition {
        Ok(())
    } else {
        Err(TestError::Failed(Failure::assertion(message)))
    }
}

/// Rejects the current execution unless `condition` holds.
pub fn assume(condition: bool) -> Result<(), TestError> {
    if condition {
        Ok(())
    } else {
        Err(TestError::Draw(DrawError::Invalid("assumption failed".to_string())))
    }
}

thread_local! {
    static CAPTURING: Cell<bool> = Cell::new(false);
    static PANIC_SITE: RefCell<Option<String>> = RefCell::new(None);
}

// Chains onto whatever hook was installed first; only silences panics raised
// inside `catch_test` on the current thread.
static PANIC_HOOK: Lazy<()> = Lazy::new(|| {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if CAPTURING.with(Cell::get) {
            let site = info.location().map(format_location);
            PANIC_SITE.with(|s| *s.borrow_mut() = site);
        } else {
            previous(info);
        }
    }));
});

/// Runs `body`, turning a panic into a [`Failure`] located at the panic site.
pub(crate) fn catch_test<F>(body: F) -> Result<(), TestError>
where
    F: FnOnce() -> Result<(), TestError>,
{
    Lazy::force(&PANIC_HOOK);
    let was_capturing = CAPTURING.with(|c| c.replace(true));
    let outcome = panic::catch_unwind(AssertUnwindSafe(body));
    CAPTURING.with(|c| c.set(was_capturing));

    match outcome {
        Ok(result) => result,
        Err(payload) => {
            let location = PANIC_SITE
                .with(|s| s.borrow_mut().take())
                .unwrap_or_else(|| "<unknown>".to_string());
            let message = if let Some(msg) = payload.downcast_ref::<&str>() {
                (*msg).to_string()
            } else if let Some(msg) = payload.downcast_ref::<String>() {
                msg.clone()
            } else {
                String::new()
            };
            Err(TestError::Failed(Failure::with_signature(
                Signature::new(PANIC, location),
                message,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_records_call_site() {
        let first = ensure(false, "a").unwrap_err();
        let second = ensure(false, "b").unwrap_err();
        match (first, second) {
            (TestError::Failed(a), TestError::Failed(b)) => {
                assert_eq!(a.signature.category, ASSERTION);
                assert_ne!(a.signature.location, b.signature.location);
                assert!(a.signature.location.contains("failure.rs"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn panics_become_failures_with_location() {
        let result = catch_test(|| panic!("boom"));
        match result {
            Err(TestError::Failed(f)) => {
                assert_eq!(f.signature.category, PANIC);
                assert_eq!(f.message, "boom");
                assert!(f.signature.location.contains("failure.rs"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn distinct_panic_sites_have_distinct_signatures() {
        let a = catch_test(|| panic!("one")).unwrap_err();
        let b = catch_test(|| {
            let v: Vec<u8> = Vec::new();
            let _ = v[3];
            Ok(())
        })
        .unwrap_err();
        assert_ne!(a, b);
    }

    #[test]
    fn assume_rejects() {
        assert_eq!(
            assume(false),
            Err(TestError::Draw(DrawError::Invalid("assumption failed".to_string())))
        );
        assert_eq!(assume(true), Ok(()));
    }
}
