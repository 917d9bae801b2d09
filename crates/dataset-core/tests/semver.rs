// crates/dataset-core/tests/semver.rs
// ============================================================================
// Module: Version Ordering Tests
// Description: Strict SemVer 2 parsing and advancement checks.
// Purpose: Ensure version strings strictly increase per dataset.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use dataset_core::DatasetError;
use dataset_core::core::version::ensure_version_advances;
use dataset_core::core::version::parse_semver;
use proptest::prelude::*;

/// Verifies loose version strings are rejected.
#[test]
fn parse_rejects_non_strict_versions() {
    for raw in ["1", "1.0", "v1.0.0", "01.0.0", "1.0.0-", ""] {
        assert!(matches!(parse_semver(raw), Err(DatasetError::InvalidParam(_))), "{raw}");
    }
    parse_semver("1.0.0-rc.1+build.5").unwrap();
}

/// Verifies gaps are allowed but equal or lower versions are not.
#[test]
fn ensure_version_advances_requires_strict_increase() {
    ensure_version_advances(None, "0.1.0").unwrap();
    ensure_version_advances(Some("1.0.0"), "3.0.0").unwrap();
    ensure_version_advances(Some("1.0.0-rc.1"), "1.0.0").unwrap();
    assert!(ensure_version_advances(Some("1.0.0"), "1.0.0").is_err());
    assert!(ensure_version_advances(Some("1.0.0"), "1.0.0-rc.1").is_err());
    assert!(ensure_version_advances(Some("1.0.0+a"), "1.0.0+b").is_err());
}

proptest! {
    /// Verifies advancement matches numeric triple ordering for release versions.
    #[test]
    fn advancement_matches_triple_order(
        left in (0_u64 .. 20, 0_u64 .. 20, 0_u64 .. 20),
        right in (0_u64 .. 20, 0_u64 .. 20, 0_u64 .. 20),
    ) {
        let latest = format!("{}.{}.{}", left.0, left.1, left.2);
        let next = format!("{}.{}.{}", right.0, right.1, right.2);
        prop_assert_eq!(ensure_version_advances(Some(&latest), &next).is_ok(), right > left);
    }
}
