//! PIN creation, change and authorization

use super::Handlers;
use crate::identifiers::is_valid_pin;
use tracing::debug;
use ussd_core::{FieldType, Result};
use ussd_menu::{HandlerContext, HandlerResult};

impl Handlers {
    pub(super) async fn save_temporary_pin(&self, ctx: &HandlerContext<'_>, input: &str) -> Result<HandlerResult> {
        let mut result = HandlerResult::default();
        if !is_valid_pin(input) {
            result.set(self.flags.incorrect_pin);
            return Ok(result);
        }
        self.write_text(ctx.session_id, FieldType::TemporaryPin, input).await?;
        result.reset(self.flags.incorrect_pin);
        Ok(result)
    }

    /// Second entry of a new PIN; on match it becomes the account PIN
    pub(super) async fn verify_create_pin(&self, ctx: &HandlerContext<'_>, input: &str) -> Result<HandlerResult> {
        let mut result = HandlerResult::default();
        let temporary = self.read_text(ctx.session_id, FieldType::TemporaryPin).await?;

        if temporary.as_deref() == Some(input) && is_valid_pin(input) {
            self.write_text(ctx.session_id, FieldType::AccountPin, input).await?;
            result
                .set(self.flags.valid_pin)
                .set(self.flags.pin_set)
                .reset(self.flags.pin_mismatch);
        } else {
            result.set(self.flags.pin_mismatch);
        }
        Ok(result)
    }

    /// First entry of a replacement PIN
    pub(super) async fn verify_new_pin(&self, ctx: &HandlerContext<'_>, input: &str) -> Result<HandlerResult> {
        let mut result = HandlerResult::default();
        if is_valid_pin(input) {
            self.write_text(ctx.session_id, FieldType::TemporaryPin, input).await?;
            result.set(self.flags.valid_pin);
        } else {
            result.reset(self.flags.valid_pin);
        }
        Ok(result)
    }

    pub(super) async fn confirm_pin_change(&self, ctx: &HandlerContext<'_>, input: &str) -> Result<HandlerResult> {
        let mut result = HandlerResult::default();
        let temporary = self.read_text(ctx.session_id, FieldType::TemporaryPin).await?;

        if temporary.as_deref() == Some(input) && is_valid_pin(input) {
            self.write_text(ctx.session_id, FieldType::AccountPin, input).await?;
            result.reset(self.flags.pin_mismatch);
        } else {
            result.set(self.flags.pin_mismatch);
        }
        Ok(result)
    }

    /// Check `input` against the stored account PIN.
    ///
    /// Anything that is not the stored PIN counts as incorrect, including
    /// input that is not four digits and accounts without a PIN.
    pub(super) async fn authorize_account(&self, ctx: &HandlerContext<'_>, input: &str) -> Result<HandlerResult> {
        let mut result = HandlerResult::default();
        let stored = self.read_text(ctx.session_id, FieldType::AccountPin).await?;

        let authorized = is_valid_pin(input) && stored.as_deref() == Some(input);
        if authorized {
            result
                .reset(self.flags.incorrect_pin)
                .set(self.flags.allow_update)
                .set(self.flags.account_authorized);
        } else {
            result
                .set(self.flags.incorrect_pin)
                .reset(self.flags.account_authorized);
        }
        debug!(session_id = %ctx.session_id, authorized, "PIN checked");
        Ok(result)
    }
}
