//! Downloadable service managers.

pub mod config_file;
mod managed;
pub mod retrieval;
pub mod vector_db;

pub use managed::{ManagedService, ServiceProfile};
pub use retrieval::{RetrievalProfile, RetrievalServer};
pub use vector_db::{VectorDb, VectorDbProfile};
