//! Local watch mode.
//!
//! A `notify` watcher on the document root turns file-system events for
//! tracked documents into [`RelayEvent`]s. Creates and modifications are
//! published; removals are only reported. Events are forwarded as they
//! arrive; bursts of saves produce one publication each.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::{Config, DocsConfig};
use crate::connector_fs::DocumentFilter;
use crate::discord::DiscordPlatform;
use crate::relay::{spawn_refresh_timer, Relay, RelayEvent};

/// Map a file-system event to a relay event, keeping only tracked
/// documents. `None` when nothing relevant happened.
pub fn classify(event: &Event, filter: &DocumentFilter) -> Option<RelayEvent> {
    let tracked = || -> Vec<PathBuf> {
        event
            .paths
            .iter()
            .filter(|path| {
                let hidden = path
                    .file_name()
                    .map(|n| n.to_string_lossy().starts_with('.'))
                    .unwrap_or(true);
                !hidden
            })
            .filter_map(|path| filter.relative_to_root(path))
            .filter(|rel| filter.is_tracked(rel))
            .collect()
    };

    let event = match &event.kind {
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            RelayEvent::FilesChanged(tracked())
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            RelayEvent::FilesRemoved(tracked())
        }
        _ => return None,
    };

    match &event {
        RelayEvent::FilesChanged(paths) | RelayEvent::FilesRemoved(paths) if paths.is_empty() => {
            None
        }
        _ => Some(event),
    }
}

/// Watch the document root recursively, forwarding tracked changes to
/// `events`. The watcher stops when the returned handle is dropped.
pub fn start_watcher(
    docs: &DocsConfig,
    events: mpsc::Sender<RelayEvent>,
) -> Result<RecommendedWatcher> {
    let root = docs
        .root
        .canonicalize()
        .with_context(|| format!("Document root does not exist: {}", docs.root.display()))?;
    let filter = DocumentFilter::new(&DocsConfig {
        root: root.clone(),
        ..docs.clone()
    })?;

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if let Some(relay_event) = classify(&event, &filter) {
                debug!(?relay_event, "file-system change");
                // notify delivers on its own thread, outside the runtime.
                if events.blocking_send(relay_event).is_err() {
                    debug!("relay gone, dropping file-system event");
                }
            }
        }
        Err(e) => error!(error = %e, "watch error"),
    })
    .context("Failed to create file watcher")?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", root.display()))?;
    info!(root = %root.display(), "watching for document changes");

    Ok(watcher)
}

/// `relay watch`: publish local changes until Ctrl-C.
pub async fn run_watch(config: &Config) -> Result<()> {
    let platform = Arc::new(DiscordPlatform::from_config(&config.platform)?);
    let relay = Relay::from_config(config, platform)?;

    let (tx, rx) = mpsc::channel(256);
    let _watcher = start_watcher(&config.docs, tx.clone())?;
    let timer = spawn_refresh_timer(
        tx,
        Duration::from_secs(config.channels.refresh_interval_secs),
    );

    println!("Watching {} (Ctrl-C to stop)", config.docs.root.display());
    tokio::select! {
        _ = relay.run(rx) => {}
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    if let Some(timer) = timer {
        timer.abort();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, RemoveKind};
    use std::path::Path;

    fn filter() -> DocumentFilter {
        DocumentFilter::new(&DocsConfig {
            root: PathBuf::from("/srv/docs"),
            extension: "md".to_string(),
            include_globs: vec!["**/*.md".to_string()],
            exclude_globs: vec![],
        })
        .unwrap()
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn test_create_of_tracked_file() {
        let e = event(
            EventKind::Create(CreateKind::File),
            &["/srv/docs/specs/api.md", "/srv/docs/specs/api.txt"],
        );
        assert_eq!(
            classify(&e, &filter()),
            Some(RelayEvent::FilesChanged(vec![PathBuf::from("specs/api.md")]))
        );
    }

    #[test]
    fn test_remove_is_reported_separately() {
        let e = event(EventKind::Remove(RemoveKind::File), &["/srv/docs/old.md"]);
        assert_eq!(
            classify(&e, &filter()),
            Some(RelayEvent::FilesRemoved(vec![Path::new("old.md").to_path_buf()]))
        );
    }

    #[test]
    fn test_untracked_and_hidden_files_are_ignored() {
        let e = event(
            EventKind::Modify(ModifyKind::Any),
            &["/srv/docs/.api.md.swp", "/srv/docs/.draft.md", "/srv/docs/image.png"],
        );
        assert_eq!(classify(&e, &filter()), None);
    }

    #[test]
    fn test_access_events_are_ignored() {
        let e = event(
            EventKind::Access(notify::event::AccessKind::Any),
            &["/srv/docs/api.md"],
        );
        assert_eq!(classify(&e, &filter()), None);
    }
}
