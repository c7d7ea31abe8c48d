//! # FlowGuard
//!
//! **Per-process outbound connection firewall.**
//!
//! FlowGuard decides whether an outbound connection attempt, identified by
//! the initiating process and the remote endpoint, is allowed or blocked. It
//! consults a user-maintained rule set and records connections no rule
//! covers so a human can classify them later.
//!
//! Two processes share the state: an inspection process answering flows at
//! network speed and a management process editing rules at human speed.
//! They share nothing but a storage directory; each keeps its own in-memory
//! copy and re-reads the stored rules only when their modification time moves.
//!
//! ## Architecture
//!
//! - **[`store`]**: shared record persistence with atomic replace and a modification-time probe
//! - **[`policy`]**: rule records, specificity-scored matching and the throttled rule table
//! - **[`pending`]**: bounded, deduplicated queue of unclassified connections
//! - **[`engine`]**: the decision facade used by the hook and the management front end
//! - **[`inspect`]**: line-protocol loop standing in for the OS interception hook
//! - **[`notification`]**: fire-and-forget alerts for newly queued connections
//! - **[`config`]**: TOML configuration with environment substitution
//! - **[`cli`]**: command-line interface (clap) and interactive review prompt
//! - **[`error`]**: unified error types using `thiserror`
//!
//! ## Quick Start
//!
//! ```bash
//! # Create config and storage directory
//! flowguard init
//!
//! # Block a tracker for every process
//! flowguard rules add ANY '^.*\.tracker\.net$' ANY block --regex
//!
//! # Answer flows from the interception hook
//! my-hook | flowguard inspect
//!
//! # Classify what the hook has seen
//! flowguard pending review
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod inspect;
pub mod notification;
pub mod pending;
pub mod policy;
pub mod store;
