//! Voucher listing and selection

use super::Handlers;
use crate::account_service::VoucherHolding;
use tracing::{debug, warn};
use ussd_core::indexed_list::{LABEL_ADDRESS, LABEL_BAL, LABEL_DECIMAL, LABEL_SYM};
use ussd_core::{FieldType, Result};
use ussd_menu::{HandlerContext, HandlerResult};

/// One voucher as resolved from the indexed lists
struct VoucherEntry {
    symbol: String,
    balance: String,
    decimals: String,
    address: String,
}

impl Handlers {
    /// Holdings from the account service, `None` when they cannot be fetched
    async fn holdings(&self, session_id: &str) -> Result<Option<Vec<VoucherHolding>>> {
        let Some(public_key) = self.read_text(session_id, FieldType::PublicKey).await? else {
            return Ok(None);
        };
        match self.accounts.fetch_vouchers(&public_key).await {
            Ok(holdings) => Ok(Some(holdings)),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Voucher fetch failed");
                Ok(None)
            }
        }
    }

    /// Make the first held voucher active when none is
    pub(super) async fn set_default_voucher(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        let session_id = ctx.session_id;
        let mut result = HandlerResult::default();

        if self.read_text(session_id, FieldType::ActiveSym).await?.is_some() {
            result.reset(self.flags.no_active_voucher);
            return Ok(result);
        }

        let Some(holdings) = self.holdings(session_id).await? else {
            result.set(self.flags.api_call_error);
            return Ok(result);
        };

        let Some(first) = holdings.first() else {
            result.set(self.flags.no_active_voucher);
            return Ok(result);
        };

        self.write_text(session_id, FieldType::ActiveSym, &first.token_symbol).await?;
        self.write_text(session_id, FieldType::ActiveBal, &first.balance).await?;
        self.write_text(session_id, FieldType::ActiveDecimal, &first.token_decimals).await?;
        self.write_text(session_id, FieldType::ActiveAddress, &first.contract_address).await?;
        debug!(session_id = %session_id, symbol = %first.token_symbol, "Default voucher set");

        result.reset(self.flags.no_active_voucher).reset(self.flags.api_call_error);
        Ok(result)
    }

    /// Refresh the four voucher lists from the account service
    pub(super) async fn check_vouchers(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        let session_id = ctx.session_id;
        let mut result = HandlerResult::default();

        let Some(holdings) = self.holdings(session_id).await? else {
            result.set(self.flags.api_call_error);
            return Ok(result);
        };

        let symbols: Vec<&str> = holdings.iter().map(|h| h.token_symbol.as_str()).collect();
        let balances: Vec<&str> = holdings.iter().map(|h| h.balance.as_str()).collect();
        let decimals: Vec<&str> = holdings.iter().map(|h| h.token_decimals.as_str()).collect();
        let addresses: Vec<&str> = holdings.iter().map(|h| h.contract_address.as_str()).collect();

        self.lists.put(session_id, LABEL_SYM, &symbols).await?;
        self.lists.put(session_id, LABEL_BAL, &balances).await?;
        self.lists.put(session_id, LABEL_DECIMAL, &decimals).await?;
        self.lists.put(session_id, LABEL_ADDRESS, &addresses).await?;

        result.reset(self.flags.api_call_error);
        Ok(result)
    }

    /// Numbered symbol list for display
    pub(super) async fn get_voucher_list(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        let blob = match self.lists.get_raw(ctx.session_id, LABEL_SYM).await {
            Ok(blob) => blob,
            Err(e) if e.is_not_found() => String::new(),
            Err(e) => return Err(e),
        };
        Ok(HandlerResult::with_content(blob))
    }

    async fn lookup_voucher(&self, session_id: &str, input: &str) -> Result<Option<VoucherEntry>> {
        let position = match input.parse::<usize>() {
            Ok(position) => Some(position),
            Err(_) => match self.lists.position_of(session_id, LABEL_SYM, input).await {
                Ok(position) => position,
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            },
        };
        let Some(position) = position else {
            return Ok(None);
        };

        let mut fields = Vec::with_capacity(4);
        for label in [LABEL_SYM, LABEL_BAL, LABEL_DECIMAL, LABEL_ADDRESS] {
            match self.lists.resolve(session_id, label, position).await {
                Ok(value) => fields.push(value),
                Err(ussd_core::Error::IndexOutOfRange { .. }) => return Ok(None),
                Err(e) if e.is_not_found() => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        let [symbol, balance, decimals, address]: [String; 4] = match fields.try_into() {
            Ok(fields) => fields,
            Err(_) => return Ok(None),
        };
        Ok(Some(VoucherEntry {
            symbol,
            balance,
            decimals,
            address,
        }))
    }

    /// Stage the voucher picked by position or symbol
    pub(super) async fn view_voucher(&self, ctx: &HandlerContext<'_>, input: &str) -> Result<HandlerResult> {
        let session_id = ctx.session_id;
        let mut result = HandlerResult::default();
        if input == "0" {
            result.reset(self.flags.incorrect_voucher);
            return Ok(result);
        }

        let Some(entry) = self.lookup_voucher(session_id, input).await? else {
            result.set(self.flags.incorrect_voucher);
            return Ok(result);
        };

        self.write_text(session_id, FieldType::TemporarySym, &entry.symbol).await?;
        self.write_text(session_id, FieldType::TemporaryBal, &entry.balance).await?;
        self.write_text(session_id, FieldType::TemporaryDecimal, &entry.decimals).await?;
        self.write_text(session_id, FieldType::TemporaryAddress, &entry.address).await?;

        result.content = format!("{}\n{}", entry.symbol, entry.balance);
        result.reset(self.flags.incorrect_voucher);
        Ok(result)
    }

    /// Promote the staged voucher to active and clear the stage
    pub(super) async fn set_voucher(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        let session_id = ctx.session_id;
        let staged = [
            (FieldType::TemporarySym, FieldType::ActiveSym),
            (FieldType::TemporaryBal, FieldType::ActiveBal),
            (FieldType::TemporaryDecimal, FieldType::ActiveDecimal),
            (FieldType::TemporaryAddress, FieldType::ActiveAddress),
        ];

        // Nothing staged: a redisplay reruns this load after the commit
        let staged_sym = self.read_text(session_id, FieldType::TemporarySym).await?;
        if staged_sym.as_deref().map_or(true, str::is_empty) {
            let active = self.read_text(session_id, FieldType::ActiveSym).await?;
            return Ok(HandlerResult::with_content(active.unwrap_or_default()));
        }

        let mut symbol = String::new();
        for (temporary, active) in staged {
            let value = self.read_text(session_id, temporary).await?.unwrap_or_default();
            self.write_text(session_id, active, &value).await?;
            self.write_text(session_id, temporary, "").await?;
            if temporary == FieldType::TemporarySym {
                symbol = value;
            }
        }
        Ok(HandlerResult::with_content(symbol))
    }
}
