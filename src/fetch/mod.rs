pub mod fetcher;
pub mod page_counter;

pub use fetcher::{merge_pages, ConcurrentFetcher, FetchOutcome, PageFailure};
pub use page_counter::{page_count, PageCount, PageCounter};
