//! Flag bits the handlers raise and clear

use ussd_core::{FlagTable, Result};

macro_rules! handler_flags {
    ($($field:ident),* $(,)?) => {
        /// Bit numbers of every flag the handlers use, resolved once at startup
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[allow(missing_docs)]
        pub struct HandlerFlags {
            $(pub $field: u32,)*
        }

        impl HandlerFlags {
            /// Resolve each flag as `flag_<field>`; any missing name fails
            pub fn resolve(table: &FlagTable) -> Result<Self> {
                Ok(Self {
                    $($field: table.resolve(concat!("flag_", stringify!($field)))?,)*
                })
            }

            /// Flag names this set requires
            pub fn names() -> &'static [&'static str] {
                &[$(concat!("flag_", stringify!($field)),)*]
            }
        }
    };
}

handler_flags!(
    language_set,
    account_created,
    account_pending,
    account_success,
    account_authorized,
    invalid_recipient,
    invalid_recipient_with_invite,
    incorrect_pin,
    allow_update,
    invalid_amount,
    valid_pin,
    pin_mismatch,
    pin_set,
    incorrect_date_format,
    api_call_error,
    no_active_voucher,
    incorrect_voucher,
);
