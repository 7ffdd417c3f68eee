mod catalog;
mod meta;
mod schema;
mod settings;
mod types;

pub use schema::Database;
pub use types::{DatabaseError, ImportReport};
