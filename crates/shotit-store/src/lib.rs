//! Vector store surface consumed by the shotit load worker.
//!
//! The worker never owns the similarity index; it talks to it through
//! [`VectorStore`]. [`MilvusRestStore`] is the production implementation.

pub mod config;
pub mod error;
pub mod milvus;
pub mod schema;
pub mod store;

pub use config::*;
pub use error::{StoreError, StoreResult};
pub use milvus::MilvusRestStore;
pub use schema::*;
pub use store::{StoreConnector, VectorStore};
