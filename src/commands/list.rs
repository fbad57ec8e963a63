//! `ls`: list objects and folders under one or more targets

use crate::cli::ListArgs;
use crate::storage::{
    ListOptions, ObjectInfo, ObjectKind, client_for_url, human_size, is_recursive_url,
};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Problems with the arguments themselves, reported as usage errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListUsageError {
    #[error("Unable to validate empty argument.")]
    EmptyArgument,

    #[error("ls needs at least one target, or --mimic to list the current folder")]
    MissingTarget,
}

/// Targets to list after defaults are applied
pub fn resolve_targets(args: &ListArgs, mimic: bool) -> Result<Vec<String>, ListUsageError> {
    if args.targets.iter().any(|t| t.trim().is_empty()) {
        return Err(ListUsageError::EmptyArgument);
    }
    if args.targets.is_empty() {
        if mimic {
            return Ok(vec![".".to_string()]);
        }
        return Err(ListUsageError::MissingTarget);
    }
    Ok(args.targets.clone())
}

/// Render one listing line: `[time] size key`
pub fn format_entry(object: &ObjectInfo, fallback_name: &str) -> String {
    let key = if object.key.is_empty() {
        fallback_name
    } else {
        object.key.as_str()
    };
    let size = match object.kind {
        ObjectKind::Directory => "0B".to_string(),
        ObjectKind::File => human_size(object.size),
    };
    format!(
        "[{}] {:>9} {}",
        object.modified.format("%Y-%m-%d %H:%M:%S UTC"),
        size,
        key
    )
}

fn display_name(target: &str) -> String {
    let trimmed = target.trim_end_matches('/');
    Path::new(trimmed)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| trimmed.to_string())
}

/// List every target into `out`, resolving relative paths against `base_dir`
pub async fn run_list(
    args: &ListArgs,
    mimic: bool,
    base_dir: &Path,
    out: &mut impl Write,
) -> Result<()> {
    let targets = resolve_targets(args, mimic)?;

    for target in &targets {
        let client = client_for_url(target, base_dir)
            .with_context(|| format!("Unable to initialize target '{}'", target))?;
        let options = ListOptions {
            recursive: is_recursive_url(target),
            incomplete: args.incomplete,
        };
        debug!("Listing {} ({:?})", client.url(), options);

        let objects = client
            .list(options)
            .await
            .with_context(|| format!("Unable to list folder '{}'", target))?;
        let fallback = display_name(client.url());
        for object in &objects {
            writeln!(out, "{}", format_entry(object, &fallback))?;
        }
    }
    Ok(())
}

/// Base directory for relative targets
pub fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
