//! Server module for the USSD service
//!
//! # Module Structure
//!
//! - `config`: Configuration structures
//! - `loader`: Configuration loading from files and environment
//! - `init`: Service assembly and the run loop
//! - `at`: Africa's Talking HTTP endpoint

mod at;
pub mod config;
mod init;
mod loader;

// Re-export public API
pub use init::{build_services, run};
pub use loader::load_config;
