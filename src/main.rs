use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use flowguard::cli::{self, Cli, Commands, PendingAction, RulesAction};
use flowguard::config::{AppConfig, DEFAULT_TEMPLATE};
use flowguard::engine::FirewallEngine;
use flowguard::inspect::{self, Inspector};
use flowguard::notification::{self, NotificationEvent};
use flowguard::policy::{FlowInfo, NewRule, RuleAction};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cmd_init(&cli.config)?,
        Commands::Classify {
            process,
            host,
            port,
        } => cmd_classify(&cli.config, FlowInfo::new(process, host, port))?,
        Commands::Inspect => cmd_inspect(&cli.config).await?,
        Commands::Refresh => cmd_refresh(&cli.config)?,
        Commands::Rules { action } => match action {
            RulesAction::List => cmd_rules_list(&cli.config)?,
            RulesAction::Add {
                process,
                addr,
                port,
                action,
                regex,
                global,
                signing_id,
            } => {
                let mut new_rule = NewRule::exact(process, addr, port, action);
                new_rule.is_regex = regex;
                new_rule.is_global = global;
                new_rule.signing_id = signing_id;
                cmd_rules_add(&cli.config, new_rule)?
            }
            RulesAction::Remove { id } => cmd_rules_remove(&cli.config, &id)?,
        },
        Commands::Pending { action } => match action {
            PendingAction::List => cmd_pending_list(&cli.config)?,
            PendingAction::Approve { id, action } => cmd_pending_approve(&cli.config, &id, action)?,
            PendingAction::Remove { id } => cmd_pending_remove(&cli.config, &id)?,
            PendingAction::Clear => cmd_pending_clear(&cli.config)?,
            PendingAction::Review => cmd_pending_review(&cli.config)?,
        },
    }

    Ok(())
}

fn open_engine(config_path: &Path) -> anyhow::Result<(AppConfig, FirewallEngine)> {
    let config = AppConfig::load_or_default(config_path)?;
    let engine = FirewallEngine::from_config(&config);
    Ok((config, engine))
}

fn cmd_init(config_path: &Path) -> anyhow::Result<()> {
    println!("Initializing FlowGuard...");

    if !config_path.exists() {
        std::fs::write(config_path, DEFAULT_TEMPLATE)?;
        println!("  Created config: {}", config_path.display());
    } else {
        println!("  Config already exists: {}", config_path.display());
    }

    let config = AppConfig::load_from_path(config_path)?;
    std::fs::create_dir_all(&config.storage.dir)?;
    println!("  Storage dir: {}", config.storage.dir.display());

    println!("\nDone! Next steps:");
    println!("  1. Add a rule:       flowguard rules add ANY ANY ANY allow");
    println!("  2. Feed flows:       <hook> | flowguard inspect");
    println!("  3. Review unknowns:  flowguard pending review");
    Ok(())
}

fn cmd_classify(config_path: &Path, flow: FlowInfo) -> anyhow::Result<()> {
    let (_config, engine) = open_engine(config_path)?;
    let result = engine.classify(&flow);
    println!("{}", result.verdict);
    if result.is_novel_pending {
        println!("Queued {} -> {}:{} for review", flow.process, flow.endpoint_addr, flow.endpoint_port);
    } else {
        println!("{}", result.reason);
    }
    Ok(())
}

async fn cmd_inspect(config_path: &Path) -> anyhow::Result<()> {
    let (config, engine) = open_engine(config_path)?;
    let engine = Arc::new(engine);
    let notifiers = notification::from_config(&config.notification);

    notification::notify_all(
        &notifiers,
        &NotificationEvent::InspectorStarted {
            storage_dir: config.storage.dir.display().to_string(),
        },
    )
    .await;
    inspect::start_sighup_handler(engine.clone());

    let inspector = Inspector::new(engine).with_notifiers(notifiers.clone());
    let stats = inspector
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    notification::notify_all(&notifiers, &NotificationEvent::InspectorStopped).await;
    eprintln!(
        "{} flows, {} blocked, {} newly queued",
        stats.flows, stats.blocked, stats.queued
    );
    Ok(())
}

fn cmd_refresh(config_path: &Path) -> anyhow::Result<()> {
    let (_config, engine) = open_engine(config_path)?;
    let snapshot = engine.refresh();
    let mut out = std::io::stdout().lock();
    writeln!(out, "Rules ({}):", snapshot.rules.len())?;
    cli::print_rules(&snapshot.rules, &mut out)?;
    writeln!(out, "\nUnclassified ({}):", snapshot.pending.len())?;
    cli::print_pending(&snapshot.pending, &mut out)?;
    Ok(())
}

fn cmd_rules_list(config_path: &Path) -> anyhow::Result<()> {
    let (_config, engine) = open_engine(config_path)?;
    cli::print_rules(&engine.rules(), &mut std::io::stdout().lock())?;
    Ok(())
}

fn cmd_rules_add(config_path: &Path, new_rule: NewRule) -> anyhow::Result<()> {
    new_rule.validate()?;
    let (_config, engine) = open_engine(config_path)?;
    let rule = engine.add_rule(new_rule, None);
    println!("Added rule {}", rule.id);
    Ok(())
}

fn cmd_rules_remove(config_path: &Path, id: &str) -> anyhow::Result<()> {
    let (_config, engine) = open_engine(config_path)?;
    if engine.remove_rule(id) {
        println!("Removed rule {}", id);
    } else {
        println!("No rule with id {}", id);
    }
    Ok(())
}

fn cmd_pending_list(config_path: &Path) -> anyhow::Result<()> {
    let (_config, engine) = open_engine(config_path)?;
    cli::print_pending(&engine.pending(), &mut std::io::stdout().lock())?;
    Ok(())
}

fn cmd_pending_approve(config_path: &Path, id: &str, action: RuleAction) -> anyhow::Result<()> {
    let (_config, engine) = open_engine(config_path)?;
    match engine.add_rule_from_pending(id, action) {
        Some(rule) => println!(
            "Added rule {}: {} -> {}:{} = {}",
            rule.id, rule.process, rule.endpoint_addr, rule.endpoint_port, rule.action
        ),
        None => println!("No unclassified connection with id {}", id),
    }
    Ok(())
}

fn cmd_pending_remove(config_path: &Path, id: &str) -> anyhow::Result<()> {
    let (_config, engine) = open_engine(config_path)?;
    if engine.remove_pending(id) {
        println!("Dismissed {}", id);
    } else {
        println!("No unclassified connection with id {}", id);
    }
    Ok(())
}

fn cmd_pending_clear(config_path: &Path) -> anyhow::Result<()> {
    let (_config, engine) = open_engine(config_path)?;
    engine.clear_pending();
    println!("Cleared unclassified connections.");
    Ok(())
}

fn cmd_pending_review(config_path: &Path) -> anyhow::Result<()> {
    let (_config, engine) = open_engine(config_path)?;
    let stdin = std::io::stdin();
    cli::prompt::review_pending(&engine, &mut stdin.lock(), &mut std::io::stdout().lock())?;
    Ok(())
}
