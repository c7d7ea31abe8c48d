//! Line-protocol front end for the interception hook.
//!
//! The OS-level hook that actually intercepts outbound flows lives outside
//! this crate. It talks to FlowGuard over a simple text stream: one flow per
//! line, one verdict per line back.
//!
//! ```text
//! -> com.example.browser tracker.net 443
//! <- block
//! -> com.example.browser example.org 443
//! <- allow new
//! -> 10.0.0.5 53
//! <- allow new
//! ```
//!
//! A request line is `<process> <host> <port>`, or `<host> <port>` when the
//! process is unknown. The answer is `allow` or `block`, with ` new`
//! appended when the flow was queued for review for the first time. Lines
//! that cannot be parsed are answered `allow`: the firewall fails open.
//!
//! Each novel pending connection is announced to the configured notifiers as
//! a background task, so a slow notifier never delays a verdict.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::engine::{Classification, FirewallEngine, Verdict};
use crate::error::Result;
use crate::notification::{NotificationEvent, Notifier};
use crate::policy::FlowInfo;

/// Counters for one inspection session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectStats {
    pub flows: usize,
    pub blocked: usize,
    pub queued: usize,
    pub malformed: usize,
}

pub struct Inspector {
    engine: Arc<FirewallEngine>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl Inspector {
    pub fn new(engine: Arc<FirewallEngine>) -> Self {
        Self {
            engine,
            notifiers: Vec::new(),
        }
    }

    pub fn with_notifiers(mut self, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        self.notifiers = notifiers;
        self
    }

    /// Answer flows from `reader` until end of input.
    ///
    /// Outstanding notifications are awaited before returning.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> Result<InspectStats>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut stats = InspectStats::default();
        let mut notifications = JoinSet::new();
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            stats.flows += 1;

            let response = match parse_flow_line(line) {
                Some(flow) => {
                    let result = self.engine.classify(&flow);
                    if result.verdict == Verdict::Block {
                        stats.blocked += 1;
                    }
                    if result.is_novel_pending {
                        stats.queued += 1;
                        self.spawn_notifications(&mut notifications, &flow);
                    }
                    format_response(&result)
                }
                None => {
                    warn!("Malformed flow line {:?}, allowing", line);
                    stats.malformed += 1;
                    Verdict::Allow.to_string()
                }
            };

            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        while let Some(joined) = notifications.join_next().await {
            if let Err(e) = joined {
                warn!("Notification task failed: {}", e);
            }
        }

        info!(
            "Inspection finished: {} flows, {} blocked, {} queued, {} malformed",
            stats.flows, stats.blocked, stats.queued, stats.malformed
        );
        Ok(stats)
    }

    fn spawn_notifications(&self, tasks: &mut JoinSet<()>, flow: &FlowInfo) {
        let event = NotificationEvent::NewPendingConnection {
            process: flow.process.clone(),
            endpoint_addr: flow.endpoint_addr.clone(),
            endpoint_port: flow.endpoint_port.clone(),
        };
        for notifier in &self.notifiers {
            let notifier = notifier.clone();
            let event = event.clone();
            tasks.spawn(async move {
                if let Err(e) = notifier.notify(&event).await {
                    warn!("Notifier {} failed: {}", notifier.name(), e);
                }
            });
        }
    }
}

/// Parse `<process> <host> <port>` or `<host> <port>`.
///
/// A missing process yields an empty selector, which the engine maps to its
/// configured unknown-process name.
pub fn parse_flow_line(line: &str) -> Option<FlowInfo> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let (process, host, port) = match parts.as_slice() {
        [process, host, port] => (*process, *host, *port),
        [host, port] => ("", *host, *port),
        _ => return None,
    };
    if port.parse::<u16>().is_err() {
        return None;
    }
    Some(FlowInfo::new(process, host, port))
}

fn format_response(result: &Classification) -> String {
    if result.is_novel_pending {
        format!("{} new", result.verdict)
    } else {
        result.verdict.to_string()
    }
}

/// Start a SIGHUP handler that force-reloads the engine's rules and
/// pending queue on signal.
#[cfg(unix)]
pub fn start_sighup_handler(engine: Arc<FirewallEngine>) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sig = match signal(SignalKind::hangup()) {
            Ok(sig) => sig,
            Err(e) => {
                warn!("Failed to register SIGHUP handler: {}", e);
                return;
            }
        };
        while sig.recv().await.is_some() {
            let snapshot = engine.refresh();
            info!(
                "SIGHUP received, reloaded {} rules and {} pending",
                snapshot.rules.len(),
                snapshot.pending.len()
            );
        }
        debug!("SIGHUP stream closed");
    });
}

/// No-op SIGHUP handler for non-Unix platforms.
#[cfg(not(unix))]
pub fn start_sighup_handler(_engine: Arc<FirewallEngine>) {
    // SIGHUP is not available on this platform
}
