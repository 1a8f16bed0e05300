//! Database query modules for the local mirror tables.
//!
//! Each module provides async functions that operate on the database.

pub mod addresses;
pub mod folders;
pub mod messages;
pub mod origins;
pub mod records;

/// Builds a `?, ?, ...` placeholder list for dynamic IN clauses.
pub(crate) fn placeholders(count: usize) -> String {
    let mut out = String::with_capacity(count * 3);
    for i in 0..count {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out
}
