//! Profile fields

use super::{is_swahili, Handlers};
use crate::identifiers::is_valid_year;
use chrono::{Datelike, Utc};
use ussd_core::{FieldType, Result};
use ussd_menu::{HandlerContext, HandlerResult};

impl Handlers {
    /// Store a free-text profile field; empty input is ignored
    pub(super) async fn save_field(&self, ctx: &HandlerContext<'_>, typ: FieldType, input: &str) -> Result<HandlerResult> {
        if !input.is_empty() {
            self.write_text(ctx.session_id, typ, input).await?;
        }
        Ok(HandlerResult::default())
    }

    pub(super) async fn save_yob(&self, ctx: &HandlerContext<'_>, input: &str) -> Result<HandlerResult> {
        if is_valid_year(input) {
            self.write_text(ctx.session_id, FieldType::Yob, input).await?;
        }
        Ok(HandlerResult::default())
    }

    pub(super) fn verify_yob(&self, input: &str) -> HandlerResult {
        let mut result = HandlerResult::default();
        if is_valid_year(input) {
            result.reset(self.flags.incorrect_date_format);
        } else {
            result.set(self.flags.incorrect_date_format);
        }
        result
    }

    /// `1` male, `2` female, `3` unspecified
    pub(super) async fn save_gender(&self, ctx: &HandlerContext<'_>, input: &str) -> Result<HandlerResult> {
        let gender = match input {
            "1" => "male",
            "2" => "female",
            "3" => "unspecified",
            _ => return Ok(HandlerResult::default()),
        };
        self.write_text(ctx.session_id, FieldType::Gender, gender).await?;
        Ok(HandlerResult::default())
    }

    pub(super) async fn get_profile_info(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResult> {
        let session_id = ctx.session_id;
        let swahili = is_swahili(ctx);
        let missing = if swahili { "Haipo" } else { "Not provided" };

        let first = self.read_text(session_id, FieldType::FirstName).await?;
        let family = self.read_text(session_id, FieldType::FamilyName).await?;
        let name = match (first, family) {
            (Some(first), Some(family)) => format!("{} {}", first, family),
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => missing.to_string(),
        };

        let gender = self.read_text(session_id, FieldType::Gender).await?;
        let age = self
            .read_text(session_id, FieldType::Yob)
            .await?
            .and_then(|yob| yob.parse::<i32>().ok())
            .map(|yob| (Utc::now().year() - yob).to_string());
        let location = self.read_text(session_id, FieldType::Location).await?;
        let offerings = self.read_text(session_id, FieldType::Offerings).await?;

        let or_missing = |value: Option<String>| value.filter(|v| !v.is_empty()).unwrap_or_else(|| missing.to_string());
        let (gender, age, location, offerings) = (
            or_missing(gender),
            or_missing(age),
            or_missing(location),
            or_missing(offerings),
        );

        let content = if swahili {
            format!(
                "Jina: {}\nJinsia: {}\nUmri: {}\nEneo: {}\nUnauza: {}\n",
                name, gender, age, location, offerings
            )
        } else {
            format!(
                "Name: {}\nGender: {}\nAge: {}\nLocation: {}\nYou provide: {}\n",
                name, gender, age, location, offerings
            )
        };
        Ok(HandlerResult::with_content(content))
    }
}
