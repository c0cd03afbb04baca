pub mod decider;
pub mod loader;
pub mod mapper;
