pub mod aggregate;
pub mod backoff;
pub mod error;
pub mod extraction;
pub mod matching;
pub mod registry;
pub mod report;
pub mod types;
pub mod window;
