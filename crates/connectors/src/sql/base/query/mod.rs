pub mod dialect;
pub mod generator;
