//! Persistent, queryable embedding store backed by LanceDB.

mod error;
mod schema;
mod store;

pub use error::VectorError;
pub use store::LanceVectorStore;
