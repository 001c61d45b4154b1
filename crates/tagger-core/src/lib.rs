//! Core types and the rotation engine for the bias tagger.
//!
//! This crate is deliberately free of HTTP and database dependencies. Storage
//! backends implement [`store::TaggerStore`]; the [`rotation::RotationEngine`]
//! drives selection, exposure accounting and retirement on top of it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod image;
pub mod ingest;
pub mod ledger;
pub mod rotation;
pub mod session;
pub mod stats;
pub mod store;

pub use error::{Error, Result, ValidationError};
