//! Balance and send flow

use super::{is_swahili, Handlers};
use crate::identifiers::{check_recipient, normalize_hex, normalize_phone, parse_amount, RecipientKind};
use tracing::{info, warn};
use ussd_core::{FieldType, Result};
use ussd_menu::{HandlerContext, HandlerResult};

impl Handlers {
    /// Balance of the active voucher
    pub(super) async fn check_balance(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        let label = if is_swahili(ctx) { "Salio" } else { "Balance" };
        let symbol = self.read_text(ctx.session_id, FieldType::ActiveSym).await?;
        let balance = self.read_text(ctx.session_id, FieldType::ActiveBal).await?;

        let content = match (balance, symbol) {
            (Some(balance), Some(symbol)) => format!("{}: {} {}\n", label, balance, symbol),
            _ => format!("{}: 0.00\n", label),
        };
        Ok(HandlerResult::with_content(content))
    }

    /// Balance as reported by the custodial service
    pub(super) async fn fetch_custodial_balances(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        let mut result = HandlerResult::default();
        let Some(public_key) = self.read_text(ctx.session_id, FieldType::PublicKey).await? else {
            result.set(self.flags.api_call_error);
            return Ok(result);
        };

        match self.accounts.check_balance(&public_key).await {
            Ok(balance) => {
                result.content = balance.balance;
                result.reset(self.flags.api_call_error);
            }
            Err(e) => {
                warn!(session_id = %ctx.session_id, error = %e, "Balance fetch failed");
                result.set(self.flags.api_call_error);
            }
        }
        Ok(result)
    }

    /// Accept a phone number, address or alias as the transfer recipient.
    ///
    /// A phone number only counts when it belongs to a registered account;
    /// otherwise the invite flag is raised so the menu can offer an invite.
    pub(super) async fn validate_recipient(&self, ctx: &HandlerContext<'_>, input: &str) -> Result<HandlerResult> {
        let mut result = HandlerResult::default();
        if input == "0" {
            return Ok(result);
        }

        let recipient = match check_recipient(input) {
            None => {
                result.content = input.to_string();
                result.set(self.flags.invalid_recipient);
                return Ok(result);
            }
            Some(RecipientKind::PhoneNumber) => {
                let phone = normalize_phone(input).unwrap_or_else(|| input.to_string());
                if self.read_text(&phone, FieldType::PublicKey).await?.is_none() {
                    result.content = input.to_string();
                    result
                        .set(self.flags.invalid_recipient_with_invite)
                        .reset(self.flags.invalid_recipient);
                    return Ok(result);
                }
                phone
            }
            Some(RecipientKind::Address) => normalize_hex(input).unwrap_or_else(|| input.to_string()),
            Some(RecipientKind::Alias) => input.to_string(),
        };

        self.write_text(ctx.session_id, FieldType::Recipient, &recipient).await?;
        result
            .reset(self.flags.invalid_recipient)
            .reset(self.flags.invalid_recipient_with_invite);
        Ok(result)
    }

    pub(super) async fn transaction_reset(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        self.write_text(ctx.session_id, FieldType::Amount, "").await?;
        self.write_text(ctx.session_id, FieldType::Recipient, "").await?;
        let mut result = HandlerResult::default();
        result
            .reset(self.flags.invalid_recipient)
            .reset(self.flags.invalid_recipient_with_invite);
        Ok(result)
    }

    pub(super) async fn reset_transaction_amount(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        self.write_text(ctx.session_id, FieldType::Amount, "").await?;
        let mut result = HandlerResult::default();
        result.reset(self.flags.invalid_amount);
        Ok(result)
    }

    /// Accept a positive amount no greater than the active balance
    pub(super) async fn validate_amount(&self, ctx: &HandlerContext<'_>, input: &str) -> Result<HandlerResult> {
        if input == "0" {
            return Ok(HandlerResult::default());
        }
        let mut result = HandlerResult::with_content(input);
        let balance = self
            .read_text(ctx.session_id, FieldType::ActiveBal)
            .await?
            .and_then(|b| b.trim().parse::<f64>().ok())
            .unwrap_or(0.0);

        match parse_amount(input) {
            Some(amount) if amount <= balance => {
                self.write_text(ctx.session_id, FieldType::Amount, input).await?;
                result.reset(self.flags.invalid_amount);
            }
            _ => {
                result.set(self.flags.invalid_amount);
            }
        }
        Ok(result)
    }

    pub(super) async fn get_recipient(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        let recipient = self.read_text(ctx.session_id, FieldType::Recipient).await?;
        Ok(HandlerResult::with_content(recipient.unwrap_or_default()))
    }

    pub(super) async fn get_amount(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        let amount = self.read_text(ctx.session_id, FieldType::Amount).await?.unwrap_or_default();
        let symbol = self.read_text(ctx.session_id, FieldType::ActiveSym).await?.unwrap_or_default();
        Ok(HandlerResult::with_content(format!("{} {}", amount, symbol)))
    }

    /// Confirm the transfer request and drop the authorization
    pub(super) async fn initiate_transaction(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        let session_id = ctx.session_id;
        let amount = self.read_text(session_id, FieldType::Amount).await?.unwrap_or_default();
        let recipient = self.read_text(session_id, FieldType::Recipient).await?.unwrap_or_default();
        let symbol = self.read_text(session_id, FieldType::ActiveSym).await?.unwrap_or_default();

        info!(session_id = %session_id, recipient = %recipient, amount = %amount, symbol = %symbol, "Transfer requested");

        let content = if is_swahili(ctx) {
            format!(
                "Ombi lako limetumwa. {} atapokea {} {} kutoka kwa {}.",
                recipient, amount, symbol, session_id
            )
        } else {
            format!(
                "Your request has been sent. {} will receive {} {} from {}.",
                recipient, amount, symbol, session_id
            )
        };
        let mut result = HandlerResult::with_content(content);
        result.reset(self.flags.account_authorized);
        Ok(result)
    }
}
