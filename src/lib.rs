//! Core runtime shared by generated AWS service clients: SigV4 signing,
//! credential resolution, the four wire dialects, streaming bodies, the
//! middleware/dispatch pipeline, and pagination.
//!
//! Per-service shape definitions and facade traits are generated code and
//! live outside this crate; this crate is the part every generated client
//! depends on.

pub mod arn;
pub mod credential;
pub mod encoding;
pub mod error;
pub mod middleware;
pub mod orchestrator;
pub mod paginator;
pub mod proto;
pub mod region;
pub mod request_builder;
pub mod response;
pub mod semaphore;
pub mod signature;
pub mod streaming;
pub mod transport;

pub use crate::error::SdkError;
pub use crate::orchestrator::{Client, RetryPolicy};
pub use crate::region::Region;
pub use crate::signature::SignedRequest;
