mod models;
mod schema;
mod store;
mod trait_def;
mod validation;

pub use models::*;
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use store::SqliteCatalogStore;
pub use trait_def::CatalogStore;
pub use validation::{
    validate_category, validate_collection, validate_lecture, validate_speaker, ValidationError,
};
