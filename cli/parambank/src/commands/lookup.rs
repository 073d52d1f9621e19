//! `parambank lookup`: resolve a name to its canonical slot and report how it is stored.

use std::path::Path;

use anyhow::{anyhow, Result};
use parambank_core::{Expr, ParameterClass};
use parambank_index::{IndexCache, ParameterIndex, TimeseriesIndex};
use serde::Serialize;

use super::{plan, print_json};
use crate::OutputFormat;

#[derive(Debug, Serialize)]
struct LookupReport {
    query: String,
    canonical: String,
    class: ParameterClass,
    aliases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<ParameterIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeseries: Option<TimeseriesIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dependency: Option<Expr>,
}

pub fn run(manifest_path: &Path, name: &str, format: OutputFormat) -> Result<()> {
    let (_, cache) = plan(manifest_path)?;
    let report = lookup(&cache, name)?;
    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Human => {
            print!("{}", render(&report));
            Ok(())
        }
    }
}

fn lookup(cache: &IndexCache, name: &str) -> Result<LookupReport> {
    let resolved = cache
        .resolve(name)
        .ok_or_else(|| anyhow!("`{name}` is not a value of system `{}`", cache.system()))?;
    let entry = resolved.entry();
    Ok(LookupReport {
        query: name.to_string(),
        canonical: resolved.canonical_name(),
        class: entry.class,
        aliases: entry.aliases.clone(),
        index: resolved.index(),
        timeseries: cache.timeseries_index(name),
        dependency: entry.dependency.clone(),
    })
}

fn render(report: &LookupReport) -> String {
    let mut out = format!("{} -> {} ({})\n", report.query, report.canonical, report.class);
    if !report.aliases.is_empty() {
        out.push_str(&format!("  aliases:    {}\n", report.aliases.join(", ")));
    }
    if let Some(index) = &report.index {
        let coord = index.coord();
        let range = index.range();
        out.push_str(&format!(
            "  slot:       {} group {} buffer {} [{}..{}]\n",
            coord.class, coord.group, coord.buffer, range.start, range.end
        ));
        out.push_str(&format!(
            "  type:       {} {}\n",
            index.elem_type(),
            index.shape()
        ));
    }
    if let Some(ts) = &report.timeseries {
        out.push_str(&format!("  timeseries: {} (clock {})\n", ts.timeseries, ts.clock));
    }
    if let Some(rhs) = &report.dependency {
        out.push_str(&format!("  equation:   {} = {rhs}\n", report.canonical));
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::manifest::SystemManifest;

    use super::*;

    const MANIFEST: &str = r#"
[system]
name = "plant"

[[parameter]]
name = "p"
shape = [3]
tunable = true
aliases = ["gains"]

[[parameter]]
name = "x"
clock = "fast"

[[parameter]]
name = "y"

[[dependency]]
name = "y"
rhs = { ref = "x" }
"#;

    fn cache() -> IndexCache {
        let manifest = SystemManifest::parse(MANIFEST).unwrap();
        IndexCache::plan(&manifest.universe().unwrap()).unwrap()
    }

    #[test]
    fn alias_element_resolves_to_canonical_slot() {
        let cache = cache();
        let report = lookup(&cache, "plant.gains[2]").unwrap();
        assert_eq!(report.canonical, "p[2]");
        assert_eq!(report.class, ParameterClass::Tunable);
        assert_eq!(report.index.as_ref().unwrap().offset(), 1);
        assert!(report.timeseries.is_none());
    }

    #[test]
    fn discrete_value_reports_timeseries() {
        let cache = cache();
        let report = lookup(&cache, "x").unwrap();
        let ts = report.timeseries.as_ref().unwrap();
        assert_eq!(ts.timeseries, 0);
        assert!(render(&report).contains("clock fast"));
    }

    #[test]
    fn derived_value_has_no_slot() {
        let cache = cache();
        let report = lookup(&cache, "y").unwrap();
        assert!(report.index.is_none());
        assert_eq!(report.dependency, Some(Expr::var("x")));
        assert!(render(&report).contains("equation:   y = x"));
    }

    #[test]
    fn unknown_name_fails() {
        let err = lookup(&cache(), "nope").unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
