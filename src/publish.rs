//! One-shot publication commands: `relay publish`, `relay split`,
//! `relay pull`.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::chunk::split_document;
use crate::config::{Config, MIN_CHUNK_LENGTH};
use crate::connector_fs::{read_documents, scan_documents, DocumentFilter};
use crate::connector_git::pull_changes;
use crate::deliver::{plan, BatchSummary, DeliveryOptions, DeliveryReport};
use crate::discord::DiscordPlatform;
use crate::relay::{build_resolver, Relay};

/// Publish every document under the root, or only `paths` when given.
pub async fn run_publish(config: &Config, paths: &[PathBuf], dry_run: bool) -> Result<()> {
    if dry_run {
        return run_dry_run(config, paths);
    }

    let platform = Arc::new(DiscordPlatform::from_config(&config.platform)?);
    let relay = Relay::from_config(config, platform)?;

    let (reports, summary) = if paths.is_empty() {
        relay.publish_all().await?
    } else {
        relay.publish_paths(paths).await
    };

    print_reports("publish", &reports, &summary);
    finish(&summary)
}

fn run_dry_run(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let docs = if paths.is_empty() {
        scan_documents(&config.docs)?
    } else {
        read_documents(&DocumentFilter::new(&config.docs)?, paths)
    };
    let resolver = build_resolver(config);
    let options = DeliveryOptions::from_config(&config.delivery);

    println!("publish (dry-run, {} mode)", options.mode);
    println!("  documents found: {}", docs.len());

    let mut total_messages = 0;
    for doc in &docs {
        let plan = plan(&resolver, &options, doc);
        total_messages += plan.messages;
        let target = match plan.channel.as_deref() {
            Some("") => "(invalid channel name)".to_string(),
            Some(channel) => format!("#{}", channel),
            None => "(no channel mapping)".to_string(),
        };
        println!("  {} → {} ({} messages)", plan.document, target, plan.messages);
    }
    println!("  estimated messages: {}", total_messages);
    Ok(())
}

/// Print the chunk sequence of one file.
pub fn run_split(file: &Path, max: usize) -> Result<()> {
    if max < MIN_CHUNK_LENGTH {
        bail!("--max must be >= {}", MIN_CHUNK_LENGTH);
    }
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let chunks = split_document(&name, &text, max);
    for chunk in &chunks {
        println!(
            "--- {} part {}/{} ({} chars) ---",
            chunk.source_name,
            chunk.index,
            chunk.total,
            chunk.content.chars().count()
        );
        println!("{}", chunk.content);
    }
    println!("--- {} chunks ---", chunks.len());
    Ok(())
}

/// Fetch the tracked branch, pull, and publish the documents the pull
/// changed.
pub async fn run_pull(config: &Config) -> Result<()> {
    let repo_dir = config.repo_dir();
    let changed = pull_changes(
        &repo_dir,
        &config.webhook.branch,
        &config.webhook.docs_prefix,
        &config.docs.extension,
    )
    .await?;

    if changed.is_empty() {
        println!("pull");
        println!("  no document changes");
        return Ok(());
    }

    let platform = Arc::new(DiscordPlatform::from_config(&config.platform)?);
    let relay = Relay::from_config(config, platform)?;
    let (reports, summary) = relay.publish_paths(&changed).await;

    print_reports("pull", &reports, &summary);
    finish(&summary)
}

fn print_reports(command: &str, reports: &[DeliveryReport], summary: &BatchSummary) {
    println!("{}", command);
    for report in reports {
        println!("  {}", report);
    }
    println!("  {}", summary);
}

fn finish(summary: &BatchSummary) -> Result<()> {
    if summary.has_failures() {
        bail!(
            "{} document(s) not fully delivered",
            summary.partial + summary.failed
        );
    }
    println!("ok");
    Ok(())
}
