//! # Data Retrieval Module
//!
//! This module provides the outbound HTTP plumbing shared by every feed adapter
//! and by the AI relay.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: A uniform `ApiClient` built on `reqwest`. Every call returns a
//!   `RequestResult` instead of an error, with per-call TLS verification and
//!   default header injection.
//! - **`retry`**: Bounded retry with linear backoff around one `ApiClient` call.
//! - **`parse`**: Tolerant decoding of a response body (JSON, markup, raw text)
//!   and normalization of `data` envelopes into item lists.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Uniform HTTP client returning `RequestResult` records.
pub mod ky_http;
/// Tolerant response decoding.
pub mod parse;
/// Linear-backoff retry wrapper.
pub mod retry;

pub use ky_http::{header_map, ApiClient, ClientError, Payload, RequestResult, DEFAULT_TIMEOUT};
pub use parse::{parse, Item, ParsedForm};
pub use retry::{retry_with_backoff, RetryPolicy};
