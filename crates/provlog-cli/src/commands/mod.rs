pub mod export;
pub mod info;
pub mod replay;
pub mod verify;

/// Exit code for failures before verification could start (missing file,
/// malformed JSON, I/O error). Identical to FAIL by contract.
pub const EXIT_PRECONDITION: i32 = 2;

/// Default trusted authorities when the caller supplies none. The two
/// identifiers are opaque peers; the library itself defaults to an empty,
/// reject-everything set.
pub const DEFAULT_AUTHORITIES: [&str; 2] = ["provlog-ingest-v1", "provlog-ingest-v2"];
