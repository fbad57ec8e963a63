//! Resumable bulk transfers behind `cp` and `mirror`.
//!
//! A transfer is planned up front, then executed by a bounded pool of
//! workers. Every finished object is checkpointed into the shared session,
//! and the coordinating loop saves the session every `save_every` objects.
//! Sources already recorded in the session's progress are skipped, which is
//! what makes a resumed session continue where it left off.

use crate::cli::{CopyArgs, MirrorArgs};
use crate::commands::TransferSettings;
use crate::session::{ProgressDelta, Session, SessionManager};
use crate::storage::{
    ListOptions, ObjectKind, StorageClient, StorageError, client_for_url, human_size,
    is_recursive_url,
};
use anyhow::{Context, Result, bail};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// One object to move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    /// Index into [`TransferPlan::sources`]
    pub source_index: usize,
    pub source_key: String,
    /// Identity recorded in the session's progress
    pub source_url: String,
    pub target_key: String,
    pub target_url: String,
    pub size: u64,
}

/// Everything a transfer will copy
pub struct TransferPlan {
    pub sources: Vec<Arc<dyn StorageClient>>,
    pub target: Arc<dyn StorageClient>,
    pub items: Vec<TransferItem>,
    /// Objects left out because the target already has them
    pub skipped: u64,
}

/// What a transfer run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub copied_objects: u64,
    pub copied_bytes: u64,
    /// Objects skipped because an earlier run already copied them
    pub resumed_objects: u64,
    pub skipped_objects: u64,
}

/// Join a client URL and an object key for display and progress tracking
pub fn object_url(base: &str, key: &str) -> String {
    if key.is_empty() {
        base.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, key)
    } else {
        format!("{}/{}", base, key)
    }
}

fn file_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    Path::new(trimmed)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| trimmed.to_string())
}

async fn target_is_dir(target: &dyn StorageClient) -> Result<bool, StorageError> {
    match target.stat().await {
        Ok(info) => Ok(info.kind == ObjectKind::Directory),
        Err(StorageError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Plan a `cp`: every source object and where it lands under the target
pub async fn plan_copy(args: &CopyArgs, base_dir: &Path) -> Result<TransferPlan> {
    let sources_urls = args.sources();
    if sources_urls.is_empty() {
        bail!("cp needs at least one source and a target");
    }

    let target: Arc<dyn StorageClient> = Arc::from(
        client_for_url(args.target(), base_dir)
            .with_context(|| format!("Unable to initialize target '{}'", args.target()))?,
    );

    let any_recursive = args.recursive || sources_urls.iter().any(|s| is_recursive_url(s));
    let into_dir = sources_urls.len() > 1
        || any_recursive
        || args.target().ends_with('/')
        || target_is_dir(target.as_ref()).await?;

    let mut sources = Vec::new();
    let mut items = Vec::new();

    for source_url in sources_urls {
        let recursive = args.recursive || is_recursive_url(source_url);
        let client: Arc<dyn StorageClient> = Arc::from(
            client_for_url(source_url, base_dir)
                .with_context(|| format!("Unable to initialize source '{}'", source_url))?,
        );
        let info = client
            .stat()
            .await
            .with_context(|| format!("Unable to read source '{}'", source_url))?;

        let source_index = sources.len();
        match info.kind {
            ObjectKind::File => {
                let target_key = if into_dir {
                    file_name(client.url())
                } else {
                    String::new()
                };
                items.push(TransferItem {
                    source_index,
                    source_key: String::new(),
                    source_url: client.url().to_string(),
                    target_url: object_url(target.url(), &target_key),
                    target_key,
                    size: info.size,
                });
            }
            ObjectKind::Directory if recursive => {
                let objects = client
                    .list(ListOptions {
                        recursive: true,
                        incomplete: false,
                    })
                    .await
                    .with_context(|| format!("Unable to list source '{}'", source_url))?;
                for object in objects {
                    items.push(TransferItem {
                        source_index,
                        source_url: object_url(client.url(), &object.key),
                        target_url: object_url(target.url(), &object.key),
                        target_key: object.key.clone(),
                        source_key: object.key,
                        size: object.size,
                    });
                }
            }
            ObjectKind::Directory => {
                return Err(StorageError::IsDirectory(source_url.clone()).into());
            }
        }
        sources.push(client);
    }

    Ok(TransferPlan {
        sources,
        target,
        items,
        skipped: 0,
    })
}

/// Plan a `mirror`: the whole source tree, minus objects the target already
/// holds with the same size
pub async fn plan_mirror(args: &MirrorArgs, base_dir: &Path) -> Result<TransferPlan> {
    let source: Arc<dyn StorageClient> = Arc::from(
        client_for_url(&args.source, base_dir)
            .with_context(|| format!("Unable to initialize source '{}'", args.source))?,
    );
    let target: Arc<dyn StorageClient> = Arc::from(
        client_for_url(&args.target, base_dir)
            .with_context(|| format!("Unable to initialize target '{}'", args.target))?,
    );

    let options = ListOptions {
        recursive: true,
        incomplete: false,
    };
    let source_objects = source
        .list(options)
        .await
        .with_context(|| format!("Unable to list source '{}'", args.source))?;
    let existing: HashMap<String, u64> = match target.list(options).await {
        Ok(objects) => objects.into_iter().map(|o| (o.key, o.size)).collect(),
        Err(StorageError::NotFound(_)) => HashMap::new(),
        Err(e) => {
            return Err(e).with_context(|| format!("Unable to list target '{}'", args.target));
        }
    };

    let mut items = Vec::new();
    let mut skipped = 0;
    for object in source_objects {
        if existing.get(&object.key) == Some(&object.size) {
            skipped += 1;
            continue;
        }
        items.push(TransferItem {
            source_index: 0,
            source_url: object_url(source.url(), &object.key),
            target_url: object_url(target.url(), &object.key),
            target_key: object.key.clone(),
            source_key: object.key,
            size: object.size,
        });
    }

    Ok(TransferPlan {
        sources: vec![source],
        target,
        items,
        skipped,
    })
}

/// Execute a plan against a session
pub async fn execute_plan(
    manager: &SessionManager,
    session: &Session,
    plan: TransferPlan,
    settings: TransferSettings,
) -> Result<TransferSummary> {
    let mut summary = TransferSummary {
        skipped_objects: plan.skipped,
        ..Default::default()
    };

    let mut pending = Vec::new();
    for item in plan.items {
        if session.is_completed(&item.source_url).await {
            debug!("Already copied: {}", item.source_url);
            summary.resumed_objects += 1;
        } else {
            pending.push(item);
        }
    }

    // Objects finished by earlier runs may no longer be in the plan, e.g. a
    // resumed mirror sees them as up to date. Count them from the record.
    let done = session.progress().await;
    session
        .checkpoint(ProgressDelta::Planned {
            objects: pending.len() as u64 + done.transferred_objects,
            bytes: pending.iter().map(|item| item.size).sum::<u64>() + done.transferred_bytes,
        })
        .await;

    info!(
        "Session {}: {} objects to copy, {} already done",
        session.id(),
        pending.len(),
        summary.resumed_objects
    );

    let sources = plan.sources;
    let target = plan.target;
    let mut transfers = stream::iter(pending.into_iter().map(|item| {
        let source = Arc::clone(&sources[item.source_index]);
        let target = Arc::clone(&target);
        let session = session.clone();
        async move {
            let (reader, size) = source.get(&item.source_key).await?;
            let bytes = target.put(&item.target_key, reader, size).await?;
            session
                .checkpoint(ProgressDelta::Completed {
                    source: item.source_url.clone(),
                    target: item.target_url.clone(),
                    bytes,
                })
                .await;
            Ok::<_, StorageError>((item, bytes))
        }
    }))
    .buffer_unordered(settings.parallel.max(1));

    let mut since_save = 0;
    while let Some(result) = transfers.next().await {
        let (item, bytes) = result.context("Transfer failed")?;
        println!("`{}` -> `{}`", item.source_url, item.target_url);
        summary.copied_objects += 1;
        summary.copied_bytes += bytes;

        since_save += 1;
        if since_save >= settings.save_every {
            manager.save(session).await?;
            since_save = 0;
        }
    }

    Ok(summary)
}

fn report(summary: &TransferSummary) {
    let mut line = format!(
        "Copied {} objects ({})",
        summary.copied_objects,
        human_size(summary.copied_bytes)
    );
    if summary.resumed_objects > 0 {
        line.push_str(&format!(", {} done in an earlier run", summary.resumed_objects));
    }
    if summary.skipped_objects > 0 {
        line.push_str(&format!(", {} already up to date", summary.skipped_objects));
    }
    println!("{}", line);
}

pub async fn run_copy(
    manager: &SessionManager,
    session: &Session,
    args: &CopyArgs,
    base_dir: &Path,
    settings: TransferSettings,
) -> Result<TransferSummary> {
    let plan = plan_copy(args, base_dir).await?;
    let summary = execute_plan(manager, session, plan, settings).await?;
    report(&summary);
    Ok(summary)
}

pub async fn run_mirror(
    manager: &SessionManager,
    session: &Session,
    args: &MirrorArgs,
    base_dir: &Path,
    settings: TransferSettings,
) -> Result<TransferSummary> {
    let plan = plan_mirror(args, base_dir).await?;
    let summary = execute_plan(manager, session, plan, settings).await?;
    report(&summary);
    Ok(summary)
}
