pub mod config;
pub mod constants;
pub mod message;
pub mod persona;
pub mod session;
