mod repository;
mod schema;

pub use repository::{CatalogStats, Repository};
pub use schema::SCHEMA;
