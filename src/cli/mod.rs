pub mod prompt;

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Result;
use crate::pending::PendingConnection;
use crate::policy::{Rule, RuleAction};

#[derive(Parser)]
#[command(name = "flowguard")]
#[command(about = "Per-process outbound connection firewall")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "flowguard.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the storage directory and a default config file
    Init,
    /// Classify a single flow and print the verdict
    Classify {
        /// Process identifier (bundle id, executable path, ...)
        process: String,
        /// Remote host or IP address
        host: String,
        /// Remote port
        port: String,
    },
    /// Answer flows read from stdin, one `<process> <host> <port>` per line
    Inspect,
    /// Reload rules and pending connections from storage and print both
    Refresh,
    /// Rule management
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
    /// Unclassified connection management
    Pending {
        #[command(subcommand)]
        action: PendingAction,
    },
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// List rules in evaluation order
    List,
    /// Add a rule
    Add {
        /// Process identifier or ANY
        process: String,
        /// Remote host, IP, pattern (with --regex) or ANY
        addr: String,
        /// Remote port or ANY
        port: String,
        /// allow or block
        action: RuleAction,
        /// Treat the address as a regular expression
        #[arg(long)]
        regex: bool,
        /// Apply to every process
        #[arg(long)]
        global: bool,
        /// Code-signing identity to record with the rule
        #[arg(long)]
        signing_id: Option<String>,
    },
    /// Remove a rule by id
    Remove { id: String },
}

#[derive(Subcommand)]
pub enum PendingAction {
    /// List unclassified connections, most recent first
    List,
    /// Turn an unclassified connection into a rule
    Approve {
        id: String,
        /// allow or block
        action: RuleAction,
    },
    /// Dismiss an unclassified connection without adding a rule
    Remove { id: String },
    /// Dismiss every unclassified connection
    Clear,
    /// Step through unclassified connections interactively
    Review,
}

/// Print rules as a table.
pub fn print_rules<W: Write>(rules: &[Rule], writer: &mut W) -> Result<()> {
    if rules.is_empty() {
        writeln!(writer, "No rules.")?;
        return Ok(());
    }
    writeln!(
        writer,
        "{:<36} {:<30} {:<30} {:<6} {:<6} {}",
        "ID", "PROCESS", "ADDRESS", "PORT", "ACTION", "FLAGS"
    )?;
    writeln!(writer, "{}", "─".repeat(120))?;
    for rule in rules {
        let mut flags = Vec::new();
        if rule.is_regex {
            flags.push("regex".to_string());
        }
        if rule.is_global {
            flags.push("global".to_string());
        }
        if let Some(signing_id) = &rule.signing_id {
            flags.push(format!("signed:{}", signing_id));
        }
        writeln!(
            writer,
            "{:<36} {:<30} {:<30} {:<6} {:<6} {}",
            rule.id,
            rule.process,
            rule.endpoint_addr,
            rule.endpoint_port,
            rule.action,
            flags.join(",")
        )?;
    }
    Ok(())
}

/// Print pending connections as a table.
pub fn print_pending<W: Write>(pending: &[PendingConnection], writer: &mut W) -> Result<()> {
    if pending.is_empty() {
        writeln!(writer, "No unclassified connections.")?;
        return Ok(());
    }
    writeln!(
        writer,
        "{:<36} {:<20} {:<30} {:<30} {}",
        "ID", "OBSERVED", "PROCESS", "ADDRESS", "PORT"
    )?;
    writeln!(writer, "{}", "─".repeat(120))?;
    for entry in pending {
        writeln!(
            writer,
            "{:<36} {:<20} {:<30} {:<30} {}",
            entry.id,
            entry.observed_at.format("%Y-%m-%d %H:%M:%S"),
            entry.process,
            entry.endpoint_addr,
            entry.endpoint_port
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{FlowInfo, NewRule, ANY};

    #[test]
    fn cli_parses_rule_add() {
        let cli = Cli::try_parse_from([
            "flowguard",
            "rules",
            "add",
            "ANY",
            r"^.*\.evil\.com$",
            "ANY",
            "block",
            "--regex",
        ])
        .unwrap();
        match cli.command {
            Commands::Rules {
                action:
                    RulesAction::Add {
                        process,
                        action,
                        regex,
                        global,
                        ..
                    },
            } => {
                assert_eq!(process, "ANY");
                assert_eq!(action, RuleAction::Block);
                assert!(regex);
                assert!(!global);
            }
            _ => panic!("expected rules add"),
        }
    }

    #[test]
    fn cli_rejects_unknown_action() {
        let result = Cli::try_parse_from(["flowguard", "pending", "approve", "some-id", "maybe"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_default_config_path() {
        let cli = Cli::try_parse_from(["flowguard", "refresh"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("flowguard.toml"));
    }

    #[test]
    fn print_rules_shows_flags() {
        let rule = NewRule::exact(ANY, r"\.ads\.", ANY, RuleAction::Block)
            .regex()
            .global()
            .into_rule();
        let mut out = Vec::new();
        print_rules(&[rule.clone()], &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains(&rule.id));
        assert!(out.contains("regex,global"));
        assert!(out.contains("block"));
    }

    #[test]
    fn print_empty_lists() {
        let mut out = Vec::new();
        print_rules(&[], &mut out).unwrap();
        print_pending(&[], &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("No rules."));
        assert!(out.contains("No unclassified connections."));
    }

    #[test]
    fn print_pending_shows_endpoint() {
        let entry = PendingConnection::observe(&FlowInfo::new("app", "example.com", "8443"));
        let mut out = Vec::new();
        print_pending(&[entry], &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("example.com"));
        assert!(out.contains("8443"));
    }
}
