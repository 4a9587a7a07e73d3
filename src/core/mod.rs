//! Low-level document machinery: byte cursor, element scanning,
//! predefined-entity escaping, and the process-wide security ceilings.

pub mod element;
pub mod entities;
pub mod limits;
pub mod scanner;

pub use element::{names_equal, ElementLocation};
pub use scanner::Scanner;
