//! Menu interpreter
//!
//! Walks a [`MenuDefinition`] one reply at a time. The durable position
//! (cursor, path from the root, flag bits, language) lives in the session
//! state; rendered text and handler results live in the per-turn cache.
//!
//! A step either starts the session at the root (no cursor yet, or an empty
//! reply) or feeds the reply to the current node:
//!
//! 1. the node's `input` handler runs
//! 2. `catch` rules for the input phase are checked
//! 3. otherwise the reply is routed through the node's choices
//! 4. the target is entered: its `load` handlers run, then its enter-phase
//!    `catch` rules
//!
//! A reply no choice accepts redisplays the current node.

use crate::definition::{CatchPhase, MenuDefinition, TARGET_BACK, TARGET_ROOT};
use crate::error::{MenuError, Result};
use crate::handler::{HandlerContext, MenuHandler, FLAG_LANG, FLAG_TERMINATE};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use ussd_core::{FlagTable, Interpreter, SessionBundle, StepOutcome, TurnCache};

/// Default screen size in bytes
pub const DEFAULT_MAX_OUTPUT: usize = 160;

/// Catch jumps allowed within one step
const MAX_HOPS: usize = 16;

/// Menu interpreter over a validated definition
pub struct MenuEngine {
    menu: MenuDefinition,
    handler: Arc<dyn MenuHandler>,
    max_output: usize,
    default_language: Option<String>,
}

impl MenuEngine {
    /// Validate `menu` against `flags` and the handler's symbols
    ///
    /// # Errors
    ///
    /// Returns [`MenuError::Definition`] listing every problem found.
    pub fn new(mut menu: MenuDefinition, flags: &FlagTable, handler: Arc<dyn MenuHandler>) -> Result<Self> {
        let symbols = handler.symbols();
        menu.validate(flags, &symbols)?;
        info!(nodes = menu.nodes.len(), root = %menu.root, "Menu engine ready");

        Ok(Self {
            menu,
            handler,
            max_output: DEFAULT_MAX_OUTPUT,
            default_language: None,
        })
    }

    /// Cap rendered screens at `bytes`
    #[must_use]
    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output = bytes;
        self
    }

    /// Language used until a session picks one
    #[must_use]
    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = Some(language.into());
        self
    }

    /// Run one step
    pub async fn advance(&self, session_id: &str, bundle: &mut SessionBundle, input: &[u8]) -> Result<bool> {
        bundle.cache = TurnCache::default();
        bundle.state.turns += 1;
        let reply = String::from_utf8_lossy(input).trim().to_string();

        let target = match bundle.state.cursor.clone() {
            Some(cursor) if !reply.is_empty() => {
                let node = self.menu.node(&cursor)?;
                if let Some(symbol) = &node.input {
                    self.invoke(session_id, bundle, symbol, input).await?;
                }
                match node.caught(CatchPhase::Input, &bundle.state.flags) {
                    Some(target) => Some(target.to_string()),
                    None => node.route(&reply).map(str::to_string),
                }
            }
            _ => {
                debug!(session_id = %session_id, "Starting at root");
                bundle.state.restart();
                bundle.state.flags.reset(FLAG_TERMINATE);
                Some(self.menu.root.clone())
            }
        };

        let node_name = match target {
            Some(target) => self.enter(session_id, bundle, &target, input).await?,
            None => {
                // Redisplay: rerun the node's loads without moving
                let cursor = bundle.state.cursor.clone().unwrap_or_else(|| self.menu.root.clone());
                debug!(session_id = %session_id, node = %cursor, reply = %reply, "Reply not accepted");
                self.run_loads(session_id, bundle, &cursor, input).await?;
                cursor
            }
        };

        let node = self.menu.node(&node_name)?;
        let language = bundle.state.language.as_deref().or(self.default_language.as_deref());
        bundle.cache.output = truncate(render(node.text_for(language), &bundle.cache), self.max_output);

        if node.terminal {
            bundle.state.flags.set(FLAG_TERMINATE);
            bundle.state.restart();
            debug!(session_id = %session_id, node = %node_name, "Session terminated");
            return Ok(false);
        }
        Ok(true)
    }

    /// Enter `target` and follow enter-phase catches; returns the node landed on
    async fn enter(&self, session_id: &str, bundle: &mut SessionBundle, target: &str, input: &[u8]) -> Result<String> {
        let mut target = target.to_string();

        for _ in 0..MAX_HOPS {
            let name = self.resolve_target(bundle, &target);
            self.menu.node(&name)?;
            bundle.state.exec_path.push(name.clone());
            bundle.state.cursor = Some(name.clone());

            self.run_loads(session_id, bundle, &name, input).await?;

            let node = self.menu.node(&name)?;
            match node.caught(CatchPhase::Enter, &bundle.state.flags) {
                Some(next) => {
                    debug!(session_id = %session_id, from = %name, to = %next, "Caught on enter");
                    target = next.to_string();
                }
                None => return Ok(name),
            }
        }

        Err(MenuError::Definition(format!("catch loop entering '{}'", target)))
    }

    /// Map `_`/`^` to a concrete node, adjusting the path
    fn resolve_target(&self, bundle: &mut SessionBundle, target: &str) -> String {
        let path = &mut bundle.state.exec_path;
        match target {
            TARGET_ROOT => {
                path.clear();
                self.menu.root.clone()
            }
            TARGET_BACK => {
                path.pop();
                path.pop().unwrap_or_else(|| self.menu.root.clone())
            }
            name => name.to_string(),
        }
    }

    async fn run_loads(&self, session_id: &str, bundle: &mut SessionBundle, node: &str, input: &[u8]) -> Result<()> {
        let node = self.menu.node(node)?;
        for symbol in &node.load {
            self.invoke(session_id, bundle, symbol, input).await?;
        }
        Ok(())
    }

    async fn invoke(&self, session_id: &str, bundle: &mut SessionBundle, symbol: &str, input: &[u8]) -> Result<()> {
        let ctx = HandlerContext {
            session_id,
            language: bundle.state.language.as_deref(),
        };
        let result = self.handler.call(&ctx, symbol, input).await?;

        let flags = &mut bundle.state.flags;
        for bit in &result.flag_reset {
            flags.reset(*bit);
        }
        for bit in &result.flag_set {
            if *bit == FLAG_LANG {
                debug!(session_id = %session_id, language = %result.content, "Language changed");
                bundle.state.language = Some(result.content.clone());
            } else {
                flags.set(*bit);
            }
        }

        bundle.cache.symbols.insert(symbol.to_string(), result.content);
        Ok(())
    }
}

/// Substitute `{symbol}` placeholders with this turn's handler results
fn render(template: &str, cache: &TurnCache) -> String {
    let mut out = template.to_string();
    for (symbol, content) in &cache.symbols {
        out = out.replace(&format!("{{{}}}", symbol), content);
    }
    out
}

/// Cut `text` to at most `max` bytes on a character boundary
fn truncate(mut text: String, max: usize) -> String {
    if max == 0 || text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text
}

#[async_trait]
impl Interpreter for MenuEngine {
    async fn step(&self, session_id: &str, bundle: &mut SessionBundle, input: &[u8]) -> ussd_core::Result<StepOutcome> {
        let continues = self.advance(session_id, bundle, input).await?;
        Ok(StepOutcome::screen(continues))
    }

    async fn flush(
        &self,
        bundle: &SessionBundle,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> ussd_core::Result<usize> {
        let output = bundle.cache.output.as_bytes();
        sink.write_all(output).await?;
        Ok(output.len())
    }
}
