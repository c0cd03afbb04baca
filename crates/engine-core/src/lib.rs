pub mod layout;
pub mod observer;
pub mod retry;
