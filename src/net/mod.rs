//! Network side of the agent: request/response values and the fetcher seam.

mod fetcher;
mod types;

pub use fetcher::{FetchFuture, Fetcher, HttpFetcher, SharedFetcher};
pub use types::{HttpRequest, HttpResponse, ResponseKind};
