//! Request pipeline - validation, transfer, bounded execution

pub mod fetch;
pub mod probe;
pub mod worker;

pub use fetch::{ImageFetcher, TempImage};
pub use worker::GenerationWorker;
