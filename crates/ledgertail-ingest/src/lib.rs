//! Ingestion pipeline for ledgertail.
//!
//! [`IngestService`] drives the loop: pull lines from a [`LineSource`], parse
//! each into a JSON document, buffer, and flush batches into a
//! [`DocumentRepository`](ledgertail_core::repository::DocumentRepository).
//! [`FileSource`] is the file-based source with a persistent resume
//! checkpoint registry.

#![allow(async_fn_in_trait)]

pub mod error;
pub mod file;
pub mod service;

pub use error::{Error, Result};
pub use file::{FileSource, FileSourceConfig};
pub use service::{IngestService, LineSource};

#[cfg(test)]
mod tests;
