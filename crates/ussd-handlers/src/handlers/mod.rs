//! Application handlers
//!
//! [`Handlers`] is the single [`MenuHandler`] registered with the engine. It
//! dispatches on the symbol name to one method per handler; the methods live
//! in submodules grouped by menu area.

mod account;
mod pin;
mod profile;
mod transfer;
mod voucher;


use crate::account_service::AccountService;
use crate::flags::HandlerFlags;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};
use ussd_core::{FieldType, FlagTable, IndexedListStore, Result, UserDataStore};
use ussd_menu::{HandlerContext, HandlerResult, MenuHandler};

/// Every symbol [`Handlers`] answers to
pub const SYMBOLS: &[&str] = &[
    "set_eng",
    "set_swa",
    "create_account",
    "check_identifier",
    "check_account_status",
    "save_temporary_pin",
    "verify_create_pin",
    "verify_new_pin",
    "confirm_pin_change",
    "authorize_account",
    "reset_account_authorized",
    "reset_allow_update",
    "reset_incorrect_pin",
    "save_firstname",
    "save_familyname",
    "save_yob",
    "verify_yob",
    "reset_incorrect_date_format",
    "save_location",
    "save_gender",
    "save_offerings",
    "get_profile_info",
    "check_balance",
    "fetch_custodial_balances",
    "validate_recipient",
    "transaction_reset",
    "reset_transaction_amount",
    "validate_amount",
    "get_recipient",
    "get_amount",
    "get_sender",
    "initiate_transaction",
    "quit",
    "set_default_voucher",
    "check_vouchers",
    "get_voucher_list",
    "view_voucher",
    "set_voucher",
];

/// Menu handlers backed by the keyed user-data store and the account service
pub struct Handlers {
    store: Arc<dyn UserDataStore>,
    lists: IndexedListStore,
    accounts: Arc<dyn AccountService>,
    flags: HandlerFlags,
}

impl Handlers {
    /// Assemble handlers from already-resolved flags
    pub fn new(
        store: Arc<dyn UserDataStore>,
        lists: IndexedListStore,
        accounts: Arc<dyn AccountService>,
        flags: HandlerFlags,
    ) -> Self {
        Self {
            store,
            lists,
            accounts,
            flags,
        }
    }

    /// Assemble handlers, resolving every flag they use from `table`
    pub fn with_flag_table(
        store: Arc<dyn UserDataStore>,
        lists: IndexedListStore,
        accounts: Arc<dyn AccountService>,
        table: &FlagTable,
    ) -> Result<Self> {
        Ok(Self::new(store, lists, accounts, HandlerFlags::resolve(table)?))
    }

    /// Resolved flag bits
    pub fn flags(&self) -> &HandlerFlags {
        &self.flags
    }

    /// Field as text, `None` when it was never written
    async fn read_text(&self, session_id: &str, typ: FieldType) -> Result<Option<String>> {
        match self.store.read_entry(session_id, typ).await {
            Ok(value) => Ok(Some(String::from_utf8_lossy(&value).into_owned())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write_text(&self, session_id: &str, typ: FieldType, value: &str) -> Result<()> {
        self.store.write_entry(session_id, typ, value.as_bytes()).await
    }

    fn set_language(&self, symbol: &str) -> HandlerResult {
        let code = symbol.trim_start_matches("set_");
        let mut result = HandlerResult::with_content(code);
        result.set(ussd_menu::FLAG_LANG).set(self.flags.language_set);
        result
    }
}

fn is_swahili(ctx: &HandlerContext<'_>) -> bool {
    ctx.language == Some("swa")
}

#[async_trait]
impl MenuHandler for Handlers {
    #[instrument(skip(self, ctx, input), fields(session_id = %ctx.session_id))]
    async fn call(&self, ctx: &HandlerContext<'_>, symbol: &str, input: &[u8]) -> Result<HandlerResult> {
        let input = String::from_utf8_lossy(input);
        let input = input.trim();
        debug!(symbol = %symbol, "Running handler");

        match symbol {
            "set_eng" | "set_swa" => Ok(self.set_language(symbol)),
            "create_account" => self.create_account(ctx).await,
            "check_identifier" => self.check_identifier(ctx).await,
            "check_account_status" => self.check_account_status(ctx).await,
            "save_temporary_pin" => self.save_temporary_pin(ctx, input).await,
            "verify_create_pin" => self.verify_create_pin(ctx, input).await,
            "verify_new_pin" => self.verify_new_pin(ctx, input).await,
            "confirm_pin_change" => self.confirm_pin_change(ctx, input).await,
            "authorize_account" => self.authorize_account(ctx, input).await,
            "reset_account_authorized" => Ok(self.reset_only(self.flags.account_authorized)),
            "reset_allow_update" => Ok(self.reset_only(self.flags.allow_update)),
            "reset_incorrect_pin" => Ok(self.reset_only(self.flags.incorrect_pin)),
            "save_firstname" => self.save_field(ctx, FieldType::FirstName, input).await,
            "save_familyname" => self.save_field(ctx, FieldType::FamilyName, input).await,
            "save_yob" => self.save_yob(ctx, input).await,
            "verify_yob" => Ok(self.verify_yob(input)),
            "reset_incorrect_date_format" => Ok(self.reset_only(self.flags.incorrect_date_format)),
            "save_location" => self.save_field(ctx, FieldType::Location, input).await,
            "save_gender" => self.save_gender(ctx, input).await,
            "save_offerings" => self.save_field(ctx, FieldType::Offerings, input).await,
            "get_profile_info" => self.get_profile_info(ctx).await,
            "check_balance" => self.check_balance(ctx).await,
            "fetch_custodial_balances" => self.fetch_custodial_balances(ctx).await,
            "validate_recipient" => self.validate_recipient(ctx, input).await,
            "transaction_reset" => self.transaction_reset(ctx).await,
            "reset_transaction_amount" => self.reset_transaction_amount(ctx).await,
            "validate_amount" => self.validate_amount(ctx, input).await,
            "get_recipient" => self.get_recipient(ctx).await,
            "get_amount" => self.get_amount(ctx).await,
            "get_sender" => Ok(HandlerResult::with_content(ctx.session_id)),
            "initiate_transaction" => self.initiate_transaction(ctx).await,
            "quit" => Ok(self.quit(ctx)),
            "set_default_voucher" => self.set_default_voucher(ctx).await,
            "check_vouchers" => self.check_vouchers(ctx).await,
            "get_voucher_list" => self.get_voucher_list(ctx).await,
            "view_voucher" => self.view_voucher(ctx, input).await,
            "set_voucher" => self.set_voucher(ctx).await,
            other => Err(ussd_core::Error::Interpreter(format!("no handler for symbol '{}'", other))),
        }
    }

    fn symbols(&self) -> Vec<&'static str> {
        SYMBOLS.to_vec()
    }
}

impl Handlers {
    fn reset_only(&self, bit: u32) -> HandlerResult {
        let mut result = HandlerResult::default();
        result.reset(bit);
        result
    }
}
