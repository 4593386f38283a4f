//! Structural self-checks for mesh views.
//!
//! Checks are cheap enough for tests but not for the transfer hot path, so
//! they only run in debug builds or with the `check-invariants` feature.

use crate::mesh_error::MeshUnzipError;

/// A structure that can verify its own consistency.
pub trait DebugInvariants {
    /// Panic on the first violation when invariant checking is enabled;
    /// no-op otherwise.
    fn debug_assert_invariants(&self);
    /// Run every check and report the first violation.
    fn validate_invariants(&self) -> Result<(), MeshUnzipError>;
}

/// Whether this build runs invariant checks.
pub const fn invariants_enabled() -> bool {
    cfg!(any(debug_assertions, feature = "check-invariants"))
}

/// Evaluate a `Result`-returning check and panic with `context` on error, only
/// when invariant checking is compiled in.
#[macro_export]
macro_rules! debug_invariants {
    ($check:expr, $($context:tt)*) => {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(err) = $check {
            panic!(concat!("[mesh-unzip invariants] ", $($context)*, ": {}"), err);
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::mesh_error::MeshUnzipError;

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "[mesh-unzip invariants] halo")]
    fn macro_panics_on_violation() {
        crate::debug_invariants!(Err::<(), _>(MeshUnzipError::InvalidConfig("ghost list".into())), "halo");
    }

    #[test]
    fn macro_accepts_ok() {
        crate::debug_invariants!(Ok::<(), MeshUnzipError>(()), "never");
        assert_eq!(super::invariants_enabled(), cfg!(debug_assertions) || cfg!(feature = "check-invariants"));
    }
}
