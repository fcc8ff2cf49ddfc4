//! Menu definition TOML loader
//!
//! A definition is a set of named nodes:
//!
//! ```toml
//! root = "root"
//!
//! [nodes.root]
//! load = ["check_account_status"]
//! text = "Balance: {check_balance}\n1:Send\n9:Quit"
//! translations = { swa = "Salio: {check_balance}\n1:Tuma\n9:Ondoka" }
//! choices = [{ key = "1", target = "send" }, { key = "9", target = "quit" }]
//!
//! [nodes.pin]
//! input = "authorize_account"
//! catch = [{ flag = "flag_incorrect_pin", target = "incorrect_pin" }]
//! choices = [{ key = "*", target = "done" }]
//! ```
//!
//! Targets are node names, or `_` (previous node) and `^` (root).
//! A definition is validated against the flag table and the handler's
//! symbols before the engine accepts it.

use crate::error::{MenuError, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};
use ussd_core::FlagTable;

/// Go back to the previous node
pub const TARGET_BACK: &str = "_";
/// Go to the root node
pub const TARGET_ROOT: &str = "^";
/// Choice key matching any input
pub const KEY_ANY: &str = "*";

fn default_root() -> String {
    "root".to_string()
}

/// Whole menu
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MenuDefinition {
    /// Node a session starts at
    #[serde(default = "default_root")]
    pub root: String,
    /// Nodes by name
    pub nodes: HashMap<String, Node>,
}

/// One screen
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Node {
    /// Display text with `{symbol}` placeholders
    #[serde(default)]
    pub text: String,
    /// Display text by language code
    #[serde(default)]
    pub translations: HashMap<String, String>,
    /// Symbols run when the node is entered
    #[serde(default)]
    pub load: Vec<String>,
    /// Symbol run on the user's reply
    #[serde(default)]
    pub input: Option<String>,
    /// Reply routing
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Flag-driven routing
    #[serde(default)]
    pub catch: Vec<CatchRule>,
    /// Target when no choice matches
    #[serde(default)]
    pub next: Option<String>,
    /// Whether the session ends here
    #[serde(default)]
    pub terminal: bool,
}

/// Routes a reply to a target
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Choice {
    /// Exact reply, or `*`
    pub key: String,
    /// Node name, `_` or `^`
    pub target: String,
}

/// When a catch rule is evaluated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatchPhase {
    /// After the node's input handler
    #[default]
    Input,
    /// After the node's load handlers, on entry
    Enter,
}

/// Required flag state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagCondition {
    /// Bit is set
    #[default]
    Set,
    /// Bit is clear
    Unset,
}

/// Jump to `target` when `flag` is in the `when` state
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatchRule {
    /// Flag name from the flag table
    pub flag: String,
    /// Required state
    #[serde(default)]
    pub when: FlagCondition,
    /// Evaluation point
    #[serde(default)]
    pub on: CatchPhase,
    /// Node name, `_` or `^`
    pub target: String,
    /// Resolved bit, filled in by validation
    #[serde(skip)]
    pub bit: u32,
}

impl CatchRule {
    /// Whether the rule fires for `flags`
    pub fn matches(&self, flags: &ussd_core::FlagBits) -> bool {
        match self.when {
            FlagCondition::Set => flags.is_set(self.bit),
            FlagCondition::Unset => !flags.is_set(self.bit),
        }
    }
}

impl Node {
    /// Text for `language`, falling back to the default text
    pub fn text_for(&self, language: Option<&str>) -> &str {
        language
            .and_then(|lang| self.translations.get(lang))
            .map_or(self.text.as_str(), String::as_str)
    }

    /// Target for a reply, if any choice accepts it
    pub fn route(&self, reply: &str) -> Option<&str> {
        self.choices
            .iter()
            .find(|c| c.key == reply)
            .or_else(|| self.choices.iter().find(|c| c.key == KEY_ANY))
            .map(|c| c.target.as_str())
            .or(self.next.as_deref())
    }

    /// First catch rule of `phase` that fires
    pub fn caught(&self, phase: CatchPhase, flags: &ussd_core::FlagBits) -> Option<&str> {
        self.catch
            .iter()
            .find(|rule| rule.on == phase && rule.matches(flags))
            .map(|rule| rule.target.as_str())
    }
}

impl MenuDefinition {
    /// Parse TOML text
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let menu = Self::parse(&text)?;
        info!(path = %path.display(), nodes = menu.nodes.len(), "Menu definition loaded");
        Ok(menu)
    }

    /// Node by name
    pub fn node(&self, name: &str) -> Result<&Node> {
        self.nodes
            .get(name)
            .ok_or_else(|| MenuError::UnknownNode(name.to_string()))
    }

    /// Every handler symbol the definition references
    pub fn symbols(&self) -> BTreeSet<&str> {
        self.nodes
            .values()
            .flat_map(|node| node.load.iter().chain(node.input.iter()))
            .map(String::as_str)
            .collect()
    }

    /// Check targets, symbols and flags; resolves catch flag bits.
    ///
    /// All problems are reported together.
    pub fn validate(&mut self, flags: &FlagTable, known_symbols: &[&str]) -> Result<()> {
        let mut problems = Vec::new();

        if !self.nodes.contains_key(&self.root) {
            problems.push(format!("root node '{}' is not defined", self.root));
        }

        for symbol in self.symbols() {
            if !known_symbols.contains(&symbol) {
                problems.push(format!("no handler for symbol '{}'", symbol));
            }
        }

        let names: BTreeSet<String> = self.nodes.keys().cloned().collect();
        let target_ok = |target: &str| target == TARGET_BACK || target == TARGET_ROOT || names.contains(target);

        for (name, node) in &mut self.nodes {
            let targets = node
                .choices
                .iter()
                .map(|c| c.target.as_str())
                .chain(node.next.as_deref())
                .chain(node.catch.iter().map(|r| r.target.as_str()));
            for target in targets {
                if !target_ok(target) {
                    problems.push(format!("node '{}' targets unknown node '{}'", name, target));
                }
            }

            for rule in &mut node.catch {
                match flags.resolve(&rule.flag) {
                    Ok(bit) => rule.bit = bit,
                    Err(_) => problems.push(format!("node '{}' catches unknown flag '{}'", name, rule.flag)),
                }
            }
        }

        if problems.is_empty() {
            debug!(nodes = self.nodes.len(), "Menu definition validated");
            Ok(())
        } else {
            problems.sort();
            Err(MenuError::Definition(problems.join("; ")))
        }
    }
}
