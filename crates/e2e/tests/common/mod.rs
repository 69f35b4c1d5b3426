//! Common test infrastructure
//!
//! An in-process fake of the nursery REST API, served by axum on a random
//! port. Tests seed it, point an `ApiClient` at it, and inspect the request
//! log afterwards.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::FakeNursery;
//!
//! #[tokio::test]
//! async fn test_login() {
//!     let server = FakeNursery::spawn().await;
//!     let api = server.api();
//!     // ...
//!     assert_eq!(server.login_count(), 1);
//! }
//! ```

#![allow(dead_code)]

mod backend;
mod server;

pub use backend::{Backend, ListShape};
pub use server::FakeNursery;
