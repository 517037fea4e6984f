pub mod bulkhead;

pub use bulkhead::bulkhead_middleware;
