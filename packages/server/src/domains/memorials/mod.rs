pub mod models;
pub mod store;

pub use models::memorial::{Memorial, NewMemorial, Provenance};
pub use store::{MemorialStore, PgMemorialStore};
