/// Orchestration of the full tenant walk.
pub mod extractor;
/// `@odata.nextLink` pagination with retry and backoff.
pub mod fetcher;
/// Record shaping: hoists, drops and column sanitation.
pub mod flatten;
/// Typed cells and in-memory tables.
pub mod table;
/// Shape declarations for every output table.
pub mod tables;
