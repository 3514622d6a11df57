//! Remote document-vault backend for ledgertail.
//!
//! The vault owns collection schemas, document identity and revision history
//! server-side, so this backend is a thin mapping: an HTTP [`api`] contract,
//! a [`client`] implementing it over reqwest, and a [`VaultRepository`]
//! translating repository semantics (batched writes, full-result reads,
//! revision audits) into vault calls.

#![allow(async_fn_in_trait)]

pub mod api;
pub mod client;
pub mod error;

mod repository;

pub use client::{VaultClient, VaultConfig};
pub use error::{Error, Result};
pub use repository::{VaultRepository, setup_collection};

#[cfg(test)]
mod tests;
