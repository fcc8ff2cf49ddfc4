//! Registration and account status

use super::{is_swahili, Handlers};
use crate::identifiers::normalize_hex;
use tracing::{info, warn};
use ussd_core::keyed_store::register_owner;
use ussd_core::{FieldType, Result};
use ussd_menu::{HandlerContext, HandlerResult};

const STATUS_SUCCESS: &str = "SUCCESS";
const STATUS_PENDING: &str = "PENDING";

impl Handlers {
    /// Create the custodial account once per session id and record its
    /// identifiers, including the public key → session reverse entry.
    pub(super) async fn create_account(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        let session_id = ctx.session_id;
        let mut result = HandlerResult::default();

        if self.read_text(session_id, FieldType::AccountCreated).await?.is_some() {
            result.set(self.flags.account_created);
            return Ok(result);
        }

        let account = match self.accounts.create_account().await {
            Ok(account) => account,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Account creation failed");
                result.set(self.flags.api_call_error);
                return Ok(result);
            }
        };

        self.write_text(session_id, FieldType::TrackingId, &account.tracking_id).await?;
        self.write_text(session_id, FieldType::PublicKey, &account.public_key).await?;
        if !account.custodial_id.is_empty() {
            self.write_text(session_id, FieldType::CustodialId, &account.custodial_id).await?;
        }
        let owner_key = normalize_hex(&account.public_key).unwrap_or_else(|| account.public_key.clone());
        register_owner(self.store.as_ref(), &owner_key, session_id).await?;
        self.write_text(session_id, FieldType::AccountCreated, "1").await?;

        info!(session_id = %session_id, tracking_id = %account.tracking_id, "Account created");
        result.set(self.flags.account_created).reset(self.flags.api_call_error);
        Ok(result)
    }

    /// The account public key, empty before registration
    pub(super) async fn check_identifier(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        let public_key = self.read_text(ctx.session_id, FieldType::PublicKey).await?;
        Ok(HandlerResult::with_content(public_key.unwrap_or_default()))
    }

    pub(super) async fn check_account_status(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        let mut result = HandlerResult::default();
        let Some(public_key) = self.read_text(ctx.session_id, FieldType::PublicKey).await? else {
            result.set(self.flags.api_call_error);
            return Ok(result);
        };

        let active = match self.accounts.track_account_status(&public_key).await {
            Ok(active) => active,
            Err(e) => {
                warn!(session_id = %ctx.session_id, error = %e, "Account status check failed");
                result.set(self.flags.api_call_error);
                return Ok(result);
            }
        };

        result.reset(self.flags.api_call_error);
        let status = if active {
            result.set(self.flags.account_success).reset(self.flags.account_pending);
            STATUS_SUCCESS
        } else {
            result.set(self.flags.account_pending).reset(self.flags.account_success);
            STATUS_PENDING
        };
        self.write_text(ctx.session_id, FieldType::AccountStatus, status).await?;
        Ok(result)
    }

    pub(super) fn quit(&self, ctx: &HandlerContext<'_>) -> HandlerResult {
        let content = if is_swahili(ctx) {
            "Asante kwa kutumia huduma ya Sarafu. Kwaheri!"
        } else {
            "Thank you for using Sarafu. Goodbye!"
        };
        let mut result = HandlerResult::with_content(content);
        result.reset(self.flags.account_authorized);
        result
    }
}
