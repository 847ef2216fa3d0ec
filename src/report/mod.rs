//! Report rendering
//!
//! - [`table`]: interchange table, the persisted form of a matrix
//! - [`document`]: browsable HTML document rendered from that table

pub mod document;
pub mod table;

pub use document::DocumentRenderer;
pub use table::{TableError, parse_table, read_table, table_to_string, write_table};
