pub mod auth;
pub mod config;
pub mod progression;
pub mod shared;
