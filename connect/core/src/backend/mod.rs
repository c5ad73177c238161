//! Completion Backend Integration
//!
//! Access to the streaming completion service through a common trait.
//!
//! # Available Backends
//!
//! - **HTTP**: the hosted chat function (default)
//!
//! # Usage
//!
//! ```ignore
//! use connect_core::backend::{CompletionBackend, ExchangeRequest, HttpCompletionBackend};
//!
//! let backend = HttpCompletionBackend::new("https://abc.supabase.co", api_key)?;
//! let body = backend.open_exchange(&ExchangeRequest::new(turns)).await?;
//! ```

mod http;
mod traits;

pub use http::HttpCompletionBackend;
pub use traits::{ByteStream, CompletionBackend, ExchangeRequest, TransportError};
