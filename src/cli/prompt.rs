use std::io::{BufRead, Write};

use crate::engine::FirewallEngine;
use crate::error::Result;
use crate::pending::PendingConnection;
use crate::policy::RuleAction;

/// User's decision for one unclassified connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Allow,
    Block,
    Dismiss,
    Skip,
    Quit,
}

/// What a review session did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewSummary {
    pub allowed: usize,
    pub blocked: usize,
    pub dismissed: usize,
    pub skipped: usize,
}

/// Display the review prompt for one entry and return the user's decision.
/// Uses the provided reader/writer for testability.
pub fn prompt_decision<R: BufRead, W: Write>(
    entry: &PendingConnection,
    reader: &mut R,
    writer: &mut W,
) -> Result<ReviewDecision> {
    writeln!(writer)?;
    writeln!(writer, "┌────────────────────────────────────────────────┐")?;
    writeln!(writer, "│  FlowGuard: Unclassified connection            │")?;
    writeln!(writer, "├────────────────────────────────────────────────┤")?;
    writeln!(writer, "│  {}", entry.process)?;
    writeln!(writer, "│  → {}:{}", entry.endpoint_addr, entry.endpoint_port)?;
    writeln!(
        writer,
        "│  first seen {}",
        entry.observed_at.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(writer, "│                                                │")?;
    writeln!(writer, "│  [a] Always allow                              │")?;
    writeln!(writer, "│  [b] Always block                              │")?;
    writeln!(writer, "│  [d] Dismiss                                   │")?;
    writeln!(writer, "│  [s] Skip        [q] Quit                      │")?;
    writeln!(writer, "└────────────────────────────────────────────────┘")?;
    write!(writer, "Choice: ")?;
    writer.flush()?;

    let mut input = String::new();
    if reader.read_line(&mut input)? == 0 {
        return Ok(ReviewDecision::Quit);
    }

    match input.trim().to_lowercase().as_str() {
        "a" => Ok(ReviewDecision::Allow),
        "b" => Ok(ReviewDecision::Block),
        "d" => Ok(ReviewDecision::Dismiss),
        "q" => Ok(ReviewDecision::Quit),
        // anything else leaves the entry queued
        _ => Ok(ReviewDecision::Skip),
    }
}

/// Walk the pending queue, most recent first, applying each decision
/// through the engine.
pub fn review_pending<R: BufRead, W: Write>(
    engine: &FirewallEngine,
    reader: &mut R,
    writer: &mut W,
) -> Result<ReviewSummary> {
    let mut summary = ReviewSummary::default();
    let pending = engine.refresh().pending;

    if pending.is_empty() {
        writeln!(writer, "No unclassified connections.")?;
        return Ok(summary);
    }

    for entry in &pending {
        match prompt_decision(entry, reader, writer)? {
            ReviewDecision::Allow => {
                if engine.add_rule_from_pending(&entry.id, RuleAction::Allow).is_some() {
                    summary.allowed += 1;
                }
            }
            ReviewDecision::Block => {
                if engine.add_rule_from_pending(&entry.id, RuleAction::Block).is_some() {
                    summary.blocked += 1;
                }
            }
            ReviewDecision::Dismiss => {
                if engine.remove_pending(&entry.id) {
                    summary.dismissed += 1;
                }
            }
            ReviewDecision::Skip => summary.skipped += 1,
            ReviewDecision::Quit => break,
        }
    }

    writeln!(
        writer,
        "\n{} allowed, {} blocked, {} dismissed, {} skipped",
        summary.allowed, summary.blocked, summary.dismissed, summary.skipped
    )?;
    Ok(summary)
}
