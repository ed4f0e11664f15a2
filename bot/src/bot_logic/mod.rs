pub mod config;
pub mod console;
pub mod handler;
pub mod logger;
