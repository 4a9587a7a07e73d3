//! Path expression language: compiler, filter expressions, and the
//! process-wide compiled-path cache.

pub mod cache;
pub mod filter;
pub mod parser;
pub mod segment;

pub use cache::compile_cached;
pub use filter::{FilterExpr, FilterOp};
pub use segment::{CompiledPath, ModifierCall, PathSegment, SegmentKind, APPEND_INDEX};
