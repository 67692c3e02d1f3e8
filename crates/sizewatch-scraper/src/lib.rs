pub mod error;
pub mod extract;
mod facet;
pub mod fetcher;
pub mod normalize;
pub mod orchestrator;
mod page;
pub mod reduce;
pub mod resolve;
pub mod retry;

pub use error::FetchError;
pub use extract::{dedupe_and_sort, extract_candidates};
pub use fetcher::{
    CapturedResponse, HttpPageFetcher, PageFetcher, ResponseCollector, ResponseSink,
    SearchEndpointMatcher,
};
pub use normalize::normalize_size;
pub use orchestrator::{FetchOrchestrator, FetchSettings, KeywordOutcome};
pub use reduce::CheapestPerSize;
pub use resolve::{Resolution, SizeResolver};
pub use retry::{retry_with_backoff, RetryPolicy};
