//! Handler interface
//!
//! Menu nodes name handler symbols; the engine calls the registered
//! [`MenuHandler`] with that symbol whenever a node is entered (`load`) or
//! receives input (`input`).

use async_trait::async_trait;

// Bits below FLAG_USERSTART belong to the engine.

/// Set by the engine once the session has reached a terminal node
pub const FLAG_TERMINATE: u32 = 2;
/// Handler result content is a language code to switch to
pub const FLAG_LANG: u32 = 6;
/// First bit available to application flags
pub const FLAG_USERSTART: u32 = 8;

/// What a handler may see of the session
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    /// Session id
    pub session_id: &'a str,
    /// Language selected for the session, if any
    pub language: Option<&'a str>,
}

/// Outcome of one handler call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerResult {
    /// Text substituted for the symbol's placeholder
    pub content: String,
    /// Flag bits to set
    pub flag_set: Vec<u32>,
    /// Flag bits to clear
    pub flag_reset: Vec<u32>,
}

impl HandlerResult {
    /// Result carrying only content
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Add a bit to set
    pub fn set(&mut self, bit: u32) -> &mut Self {
        self.flag_reset.retain(|b| *b != bit);
        if !self.flag_set.contains(&bit) {
            self.flag_set.push(bit);
        }
        self
    }

    /// Add a bit to clear
    pub fn reset(&mut self, bit: u32) -> &mut Self {
        self.flag_set.retain(|b| *b != bit);
        if !self.flag_reset.contains(&bit) {
            self.flag_reset.push(bit);
        }
        self
    }
}

/// Dispatches handler symbols
#[async_trait]
pub trait MenuHandler: Send + Sync {
    /// Run the handler registered under `symbol`
    async fn call(&self, ctx: &HandlerContext<'_>, symbol: &str, input: &[u8]) -> ussd_core::Result<HandlerResult>;

    /// Every symbol [`call`](Self::call) accepts
    fn symbols(&self) -> Vec<&'static str>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_reset_are_exclusive() {
        let mut result = HandlerResult::default();
        result.set(9).set(9).reset(10);
        assert_eq!(result.flag_set, vec![9]);
        assert_eq!(result.flag_reset, vec![10]);

        result.reset(9);
        assert!(result.flag_set.is_empty());
        assert_eq!(result.flag_reset, vec![10, 9]);
    }
}
