pub mod cache;
pub mod error;
pub mod export;
pub mod inspector;
pub mod planner;
pub mod retry;
pub mod warehouse;
