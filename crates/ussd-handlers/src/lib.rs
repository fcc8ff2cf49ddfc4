//! USSD Handlers - application logic behind the menu
//!
//! This crate provides:
//! - [`Handlers`], the [`ussd_menu::MenuHandler`] for registration, PINs,
//!   profile, transfers and vouchers
//! - The custodial [`AccountService`] client
//! - Recipient and identifier helpers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod account_service;
pub mod error;
pub mod flags;
pub mod handlers;
pub mod identifiers;

pub use account_service::{AccountCreated, AccountService, Balance, HttpAccountService, VoucherHolding};
pub use error::{AccountServiceError, Result};
pub use flags::HandlerFlags;
pub use handlers::{Handlers, SYMBOLS};
