//! Firewall rule records.
//!
//! A [`Rule`] pairs a process selector with a remote endpoint (address and
//! port) and an [`RuleAction`]. Any of the three selectors can be the
//! [`ANY`] sentinel; the address can also be a regular expression
//! (`is_regex`), and `is_global` makes the rule apply to every process.
//!
//! Rules are persisted as field-tagged JSON objects:
//!
//! ```json
//! {
//!   "id": "5b0c2a8e-...",
//!   "process": "com.example.browser",
//!   "endpoint_addr": "^.*\\.tracker\\.net$",
//!   "endpoint_port": "ANY",
//!   "action": "block",
//!   "is_regex": true,
//!   "is_global": false
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{FlowGuardError, Result};

/// Wildcard sentinel accepted by the process, address and port selectors.
pub const ANY: &str = "ANY";

/// The verdict a rule hands down when it governs a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Let the connection through.
    Allow,
    /// Drop the connection.
    Block,
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAction::Allow => f.write_str("allow"),
            RuleAction::Block => f.write_str("block"),
        }
    }
}

impl std::str::FromStr for RuleAction {
    type Err = FlowGuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "allow" => Ok(RuleAction::Allow),
            "block" | "deny" => Ok(RuleAction::Block),
            other => Err(FlowGuardError::InvalidRule(format!(
                "unknown action '{}' (expected allow or block)",
                other
            ))),
        }
    }
}

/// A stored policy entry. Rules are never edited in place; replace them by
/// removing and adding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier (UUID v4), assigned at creation.
    pub id: String,
    /// Process identifier, or [`ANY`].
    pub process: String,
    /// Exact host/IP, [`ANY`], or a pattern when `is_regex` is set.
    pub endpoint_addr: String,
    /// Exact port, or [`ANY`].
    pub endpoint_port: String,
    pub action: RuleAction,
    #[serde(default)]
    pub is_regex: bool,
    /// Applies to every process regardless of `process`.
    #[serde(default)]
    pub is_global: bool,
    /// Code-signing identity hint. Stored, not matched on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_id: Option<String>,
}

/// The caller-supplied shape of a rule before it gets an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRule {
    pub process: String,
    pub endpoint_addr: String,
    pub endpoint_port: String,
    pub action: RuleAction,
    pub is_regex: bool,
    pub is_global: bool,
    pub signing_id: Option<String>,
}

impl NewRule {
    /// An exact rule for one process/address/port triple.
    pub fn exact(
        process: impl Into<String>,
        endpoint_addr: impl Into<String>,
        endpoint_port: impl Into<String>,
        action: RuleAction,
    ) -> Self {
        Self {
            process: process.into(),
            endpoint_addr: endpoint_addr.into(),
            endpoint_port: endpoint_port.into(),
            action,
            is_regex: false,
            is_global: false,
            signing_id: None,
        }
    }

    /// Interpret the address as a regular expression.
    pub fn regex(mut self) -> Self {
        self.is_regex = true;
        self
    }

    /// Apply to every process.
    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    pub fn with_signing_id(mut self, signing_id: impl Into<String>) -> Self {
        self.signing_id = Some(signing_id.into());
        self
    }

    /// Check the rule can ever match: selectors must be non-empty and a
    /// regex address must compile.
    pub fn validate(&self) -> Result<()> {
        if self.process.trim().is_empty() && !self.is_global {
            return Err(FlowGuardError::InvalidRule(
                "process selector is empty".to_string(),
            ));
        }
        if self.endpoint_addr.trim().is_empty() {
            return Err(FlowGuardError::InvalidRule(
                "endpoint address is empty".to_string(),
            ));
        }
        if self.endpoint_port != ANY && self.endpoint_port.parse::<u16>().is_err() {
            return Err(FlowGuardError::InvalidRule(format!(
                "port '{}' is neither a number nor {}",
                self.endpoint_port, ANY
            )));
        }
        if self.is_regex && self.endpoint_addr != ANY {
            regex::Regex::new(&self.endpoint_addr)?;
        }
        Ok(())
    }

    /// Assign a fresh id.
    pub fn into_rule(self) -> Rule {
        Rule {
            id: uuid::Uuid::new_v4().to_string(),
            process: self.process,
            endpoint_addr: self.endpoint_addr,
            endpoint_port: self.endpoint_port,
            action: self.action,
            is_regex: self.is_regex,
            is_global: self.is_global,
            signing_id: self.signing_id,
        }
    }
}
