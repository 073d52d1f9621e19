//! CLI command implementations.

pub mod build;
pub mod layout;
pub mod lookup;

use std::path::Path;

use anyhow::{Context, Result};
use parambank_index::IndexCache;
use serde::Serialize;

use crate::manifest::SystemManifest;

/// Load a manifest and plan its layout.
pub(crate) fn plan(path: &Path) -> Result<(SystemManifest, IndexCache)> {
    let manifest = SystemManifest::load(path)?;
    let universe = manifest.universe()?;
    let cache = IndexCache::plan(&universe)
        .with_context(|| format!("planning layout for system `{}`", manifest.system.name))?;
    Ok((manifest, cache))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{json}");
    Ok(())
}
