pub mod config;
pub mod likes;
pub mod platform;
pub mod protocol;
