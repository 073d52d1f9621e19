//! `parambank build`: build a store from a manifest and report its buffers and values.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use parambank_core::{Binding, Scalar, Value};
use parambank_index::IndexCache;
use parambank_store::{ArithmeticEvaluator, ParameterStore, StoreBuilder};
use serde::Serialize;
use tracing::info;

use super::{plan, print_json};
use crate::manifest::SystemManifest;
use crate::OutputFormat;

#[derive(Serialize)]
struct BufferReport {
    class: String,
    group: usize,
    buffer: usize,
    data: Vec<Scalar>,
}

#[derive(Serialize)]
struct ValueReport {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unresolved: Option<String>,
}

#[derive(Serialize)]
struct BuildReport {
    system: String,
    layout: String,
    buffers: Vec<BufferReport>,
    values: Vec<ValueReport>,
}

pub fn run(manifest_path: &Path, overrides: &[String], format: OutputFormat) -> Result<()> {
    let (manifest, cache) = plan(manifest_path)?;
    let overrides = overrides
        .iter()
        .map(|arg| parse_override(arg))
        .collect::<Result<Vec<_>>>()?;
    let store = build_store(&manifest, &cache, overrides)?;
    info!(
        system = %manifest.system.name,
        buffers = store.buffer_count(),
        "built parameter store"
    );

    let report = report(&cache, &store)?;
    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Human => {
            print!("{}", render(&report));
            Ok(())
        }
    }
}

/// Parse `name=value`. The value is read as JSON (numbers, booleans, arrays
/// as `{"shape": .., "data": ..}`, expressions) and falls back to bare text.
fn parse_override(arg: &str) -> Result<(String, Binding)> {
    let (name, raw) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("invalid --set `{arg}`: expected NAME=VALUE"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("invalid --set `{arg}`: empty name"));
    }
    let binding = serde_json::from_str::<Binding>(raw.trim())
        .unwrap_or_else(|_| Binding::Value(Value::from(raw)));
    Ok((name.to_string(), binding))
}

fn build_store(
    manifest: &SystemManifest,
    cache: &IndexCache,
    overrides: Vec<(String, Binding)>,
) -> Result<ParameterStore> {
    let mut builder = StoreBuilder::new(cache)
        .unknowns(manifest.unknowns.clone())
        .values(manifest.values.clone())
        .values(overrides);
    if let Some(name) = &manifest.system.independent_variable {
        builder = builder.independent_variable(name);
    }
    if let Some(t) = manifest.system.initial_time {
        builder = builder.initial_time(t);
    }
    builder
        .build()
        .with_context(|| format!("building store for system `{}`", manifest.system.name))
}

fn report(cache: &IndexCache, store: &ParameterStore) -> Result<BuildReport> {
    let mut buffers = Vec::with_capacity(store.buffer_count());
    for (coord, buffer) in cache.buffer_table().iter().zip(store.buffers()) {
        buffers.push(BufferReport {
            class: coord.class.to_string(),
            group: coord.group,
            buffer: coord.buffer,
            data: buffer.to_scalars(),
        });
    }

    let mut values = Vec::new();
    for entry in cache.entries() {
        let (value, unresolved) = match &entry.index {
            Some(index) => (Some(store.get_value(index)?), None),
            None => match store.evaluate(cache, &entry.name, &ArithmeticEvaluator) {
                Ok(value) => (Some(value), None),
                Err(e) => (None, Some(e.to_string())),
            },
        };
        values.push(ValueReport {
            name: entry.name.clone(),
            value,
            unresolved,
        });
    }

    Ok(BuildReport {
        system: cache.system().to_string(),
        layout: store.layout().short(),
        buffers,
        values,
    })
}

fn render(report: &BuildReport) -> String {
    let mut out = format!("store {} (layout {})\n", report.system, report.layout);
    out.push_str("buffers:\n");
    for (i, b) in report.buffers.iter().enumerate() {
        let data: Vec<String> = b.data.iter().map(|s| s.to_string()).collect();
        out.push_str(&format!(
            "  #{i} {} {}/{}: [{}]\n",
            b.class,
            b.group,
            b.buffer,
            data.join(", ")
        ));
    }
    out.push_str("values:\n");
    for v in &report.values {
        match (&v.value, &v.unresolved) {
            (Some(value), _) => out.push_str(&format!("  {} = {value}\n", v.name)),
            (None, Some(reason)) => out.push_str(&format!("  {} unresolved: {reason}\n", v.name)),
            (None, None) => out.push_str(&format!("  {}\n", v.name)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use parambank_core::Expr;

    use super::*;

    const MANIFEST: &str = r#"
[system]
name = "plant"
initial_time = 0.0

[[parameter]]
name = "k"
tunable = true
default = 2.0

[[parameter]]
name = "c"
type = "int"

[[parameter]]
name = "y"

[[dependency]]
name = "y"
rhs = { mul = [{ ref = "k" }, { ref = "c" }] }

[values]
c = 3
"#;

    fn setup() -> (SystemManifest, IndexCache) {
        let manifest = SystemManifest::parse(MANIFEST).unwrap();
        let cache = IndexCache::plan(&manifest.universe().unwrap()).unwrap();
        (manifest, cache)
    }

    #[test]
    fn override_parsing() {
        assert_eq!(
            parse_override("k=4.5").unwrap(),
            ("k".to_string(), Binding::from(4.5))
        );
        assert_eq!(
            parse_override("label=hello").unwrap().1,
            Binding::Value(Value::from("hello"))
        );
        assert_eq!(
            parse_override(r#"y={"ref":"k"}"#).unwrap().1,
            Binding::Expr(Expr::var("k"))
        );
        assert!(parse_override("novalue").is_err());
        assert!(parse_override("=1").is_err());
    }

    #[test]
    fn builds_and_reports_derived_values() {
        let (manifest, cache) = setup();
        let store = build_store(&manifest, &cache, vec![]).unwrap();
        let report = report(&cache, &store).unwrap();

        assert_eq!(report.buffers.len(), 2);
        assert_eq!(report.buffers[0].data, vec![Scalar::Float(2.0)]);
        let y = report.values.iter().find(|v| v.name == "y").unwrap();
        assert_eq!(y.value, Some(Value::from(6.0)));

        let text = render(&report);
        assert!(text.contains("y = 6"));
    }

    #[test]
    fn command_line_overrides_win() {
        let (manifest, cache) = setup();
        let overrides = vec![parse_override("plant.k=5.0").unwrap()];
        let store = build_store(&manifest, &cache, overrides).unwrap();
        let k = cache.index("k").unwrap();
        assert_eq!(store.get_value(&k).unwrap(), Value::from(5.0));
    }

    #[test]
    fn unknown_override_is_an_error() {
        let (manifest, cache) = setup();
        let overrides = vec![parse_override("nope=1").unwrap()];
        let err = build_store(&manifest, &cache, overrides).unwrap_err();
        assert!(format!("{err:#}").contains("nope"));
    }
}
