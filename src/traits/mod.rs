//! Trait abstractions for dependency injection and testability.
//!
//! The vendor cloud transport is the only seam the agent needs: everything
//! else in the crate is plain owned state. See [`HttpClient`].

pub mod http;

pub use http::{Headers, HttpClient, HttpError, Response};
