//! Ledger-backed repositories for ledgertail.
//!
//! Maps JSON documents onto the two primitive shapes a versioned ledger
//! offers: a raw key-value space with derived index keys ([`KvRepository`])
//! and dynamically generated SQL over typed columns ([`SqlRepository`]).
//! Both expose identical write/read/history semantics through
//! [`ledgertail_core::repository::DocumentRepository`].

mod kv;
mod sql;

pub mod error;

pub use error::{Error, Result};
pub use kv::KvRepository;
pub use sql::SqlRepository;
