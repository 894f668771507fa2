//! Convenience macros.
//!
//! - [`breakwater_go!`](crate::breakwater_go) runs a unit-of-work closure on
//!   a `may` coroutine and joins it.
//! - [`breakwater_txn!`](crate::breakwater_txn) wraps a block in a
//!   begin/commit scope with rollback on error.

pub mod go;
pub mod txn;
