//! Shared constants for graph validation and limits.
//!
//! These limits are enforced at batch apply time so every replica accepts
//! the same set of entities regardless of where a mutation originated.

// =============================================================================
// Content Size Limits
// =============================================================================

/// Maximum post title size (512 bytes).
pub const MAX_TITLE_SIZE: usize = 512;

/// Maximum post body size (100KB).
pub const MAX_POST_BODY_SIZE: usize = 100 * 1024;

/// Maximum comment body size (100KB).
pub const MAX_COMMENT_BODY_SIZE: usize = 100 * 1024;

/// Maximum author identity size (128 bytes).
pub const MAX_AUTHOR_ID_SIZE: usize = 128;

// =============================================================================
// Batch Limits
// =============================================================================

/// Maximum number of operations in a single mutation batch.
pub const MAX_BATCH_OPS: usize = 128;

/// Maximum number of remote envelopes parked while waiting for their
/// referenced entities to arrive.
pub const MAX_PENDING_ENVELOPES: usize = 1024;

// =============================================================================
// Timestamp Validation
// =============================================================================

/// Maximum allowed clock skew for timestamps (5 minutes in milliseconds).
pub const MAX_CLOCK_SKEW_MS: u64 = 5 * 60 * 1000;

/// Minimum valid timestamp (2024-01-01 00:00:00 UTC in milliseconds).
/// Prevents entities with unreasonably old or zero timestamps.
pub const MIN_VALID_TIMESTAMP_MS: u64 = 1704067200000;
