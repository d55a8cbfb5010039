//! Job persistence for the StoryReel pipeline.
//!
//! The pipeline depends only on [`JobRepository`]; two implementations ship
//! with the crate:
//! - [`InMemoryJobRepository`] for tests and ephemeral runs
//! - [`FileJobRepository`], one JSON document per job with atomic replace

pub mod error;
pub mod file;
pub mod memory;
pub mod repository;

pub use error::{StoreError, StoreResult};
pub use file::FileJobRepository;
pub use memory::InMemoryJobRepository;
pub use repository::JobRepository;
