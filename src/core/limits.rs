//! Security ceilings
//!
//! Process-wide constants bounding the worst-case work any single call can
//! perform. On the read path a breached ceiling truncates or stops
//! collection; on the write path document/value size breaches surface as
//! typed errors. None of these are tunable at runtime.

/// Maximum document size accepted by any operation (10 MiB).
pub const MAX_DOCUMENT_SIZE: usize = 10 * 1024 * 1024;

/// Maximum size of a single value written into a document (1 MiB).
pub const MAX_VALUE_SIZE: usize = 1024 * 1024;

/// Maximum element nesting depth during content extraction.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Maximum attributes retained per element; extras are parsed but dropped.
pub const MAX_ATTRIBUTES: usize = 100;

/// Maximum length of a single token (name, attribute value, text run).
pub const MAX_TOKEN_SIZE: usize = 1024 * 1024;

/// Maximum results collected by `*`, `**`, `#(expr)#` and `#.field`.
pub const MAX_WILDCARD_RESULTS: usize = 10_000;

/// Total node-visit budget for recursive traversal in one call.
pub const RECURSIVE_OP_BUDGET: usize = 100_000;

/// Maximum length of a filter expression between `#(` and `)`.
pub const MAX_FILTER_EXPR_LEN: usize = 1024;

/// Maximum length of a `#.field` extraction name.
pub const MAX_FIELD_NAME_LEN: usize = 256;

/// Maximum length of a namespace prefix in a path segment.
pub const MAX_NS_PREFIX_LEN: usize = 64;

/// Iteration budget for one glob pattern match (`%` / `!%`).
pub const PATTERN_ITERATION_BUDGET: usize = 10_000;

/// Cap on the cumulative base offset carried through recursive location,
/// guarding offset arithmetic on pathologically deep documents.
pub const MAX_BASE_OFFSET: usize = 1 << 30;

/// Number of compiled paths kept in the process-wide LRU cache.
pub const PATH_CACHE_CAPACITY: usize = 128;
