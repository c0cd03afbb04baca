pub mod gcp;
pub mod sql;
pub mod store;
pub mod warehouse;
