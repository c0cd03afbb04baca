pub mod core;
pub mod events;
pub mod records;
pub mod results;
pub mod split;
