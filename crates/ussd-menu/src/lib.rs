//! USSD Menu - menu definitions and the interpreter
//!
//! This crate provides:
//! - The TOML menu definition format and its validation
//! - The handler interface menu nodes call into
//! - [`MenuEngine`], the interpreter the request pipeline drives

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod definition;
pub mod engine;
pub mod error;
pub mod handler;

pub use definition::MenuDefinition;
pub use engine::{MenuEngine, DEFAULT_MAX_OUTPUT};
pub use error::{MenuError, Result};
pub use handler::{HandlerContext, HandlerResult, MenuHandler, FLAG_LANG, FLAG_TERMINATE, FLAG_USERSTART};
