//! Core types and trait definitions for the ledgertail document store.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The backend crates (`ledgertail-ledger`, `ledgertail-vault`) implement the
//! repository contract defined here on top of the collaborator traits in
//! [`ledger`]; the ingestion and CLI crates depend only on the abstractions.

// Trait impls use native `async fn`; the trait declarations spell out the
// `Send` bound on the returned futures themselves.
#![allow(async_fn_in_trait)]

pub mod collection;
pub mod document;
pub mod error;
pub mod ledger;
pub mod parser;
pub mod repository;
pub mod schema;

pub use error::{Error, Result};
