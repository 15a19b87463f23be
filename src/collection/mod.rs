pub mod loader;
pub mod types;

pub use loader::{CollectionLoader, JsonCollectionLoader, JsonRowLoader, RowLoader};
pub use types::{BodySpec, DataRow, KeyValue, RequestCollection, RequestTemplate};
