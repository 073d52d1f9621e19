//! `parambank layout`: plan a manifest's buffer layout and print it.

use std::path::Path;

use anyhow::Result;
use parambank_core::{BufferTemplate, ElemType, ParameterClass};
use parambank_index::{BufferCoord, ClockId, IndexCache, ValueEntry};
use serde::Serialize;

use super::{plan, print_json};
use crate::OutputFormat;

#[derive(Serialize)]
struct LayoutReport<'a> {
    system: &'a str,
    fingerprint: String,
    tunable: &'a BufferTemplate,
    clocks: &'a [ClockId],
    discrete_types: &'a [ElemType],
    discrete: &'a [Vec<BufferTemplate>],
    constant: &'a [BufferTemplate],
    nonnumeric: &'a [BufferTemplate],
    buffer_table: &'a [BufferCoord],
    values: Vec<&'a ValueEntry>,
}

impl<'a> LayoutReport<'a> {
    fn new(cache: &'a IndexCache) -> Self {
        LayoutReport {
            system: cache.system(),
            fingerprint: cache.fingerprint().to_string(),
            tunable: cache.tunable_template(),
            clocks: cache.clocks(),
            discrete_types: cache.discrete_types(),
            discrete: cache.discrete_templates(),
            constant: cache.constant_templates(),
            nonnumeric: cache.nonnumeric_templates(),
            buffer_table: cache.buffer_table(),
            values: cache.entries().collect(),
        }
    }
}

pub fn run(manifest_path: &Path, format: OutputFormat) -> Result<()> {
    let (_, cache) = plan(manifest_path)?;
    match format {
        OutputFormat::Json => print_json(&LayoutReport::new(&cache)),
        OutputFormat::Human => {
            print!("{}", render(&cache));
            Ok(())
        }
    }
}

fn template(t: &BufferTemplate) -> String {
    format!("{}[{}]", t.elem_type, t.length)
}

fn render(cache: &IndexCache) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "system {} (layout {})\n",
        cache.system(),
        cache.fingerprint().short()
    ));

    out.push_str(&format!("  tunable:    {}\n", template(cache.tunable_template())));
    for (clock, group) in cache.clocks().iter().zip(cache.discrete_templates()) {
        let buffers: Vec<String> = group.iter().map(template).collect();
        out.push_str(&format!("  discrete {clock}: {}\n", buffers.join(", ")));
    }
    for (label, templates) in [
        ("constant:  ", cache.constant_templates()),
        ("nonnumeric:", cache.nonnumeric_templates()),
    ] {
        let buffers: Vec<String> = templates.iter().map(template).collect();
        out.push_str(&format!("  {label} {}\n", buffers.join(", ")));
    }

    out.push_str("buffers:\n");
    for (i, coord) in cache.buffer_table().iter().enumerate() {
        out.push_str(&format!("  #{i}: {} {}/{}\n", coord.class, coord.group, coord.buffer));
    }

    out.push_str("values:\n");
    for entry in cache.entries() {
        let slot = match &entry.index {
            Some(index) => {
                let range = index.range();
                format!("{}[{}..{}]", slot_label(index.coord()), range.start, range.end)
            }
            None => match &entry.dependency {
                Some(rhs) => format!("= {rhs}"),
                None => "derived".to_string(),
            },
        };
        out.push_str(&format!(
            "  {:<16} {:<8} {:<10} {slot}\n",
            entry.name, entry.elem_type, entry.shape
        ));
    }
    out
}

fn slot_label(coord: BufferCoord) -> String {
    match coord.class {
        ParameterClass::Tunable => "tunable".to_string(),
        class => format!("{class}/{}/{}", coord.group, coord.buffer),
    }
}

#[cfg(test)]
mod tests {
    use crate::manifest::SystemManifest;

    use super::*;

    const MANIFEST: &str = r#"
[system]
name = "plant"

[[parameter]]
name = "k"
tunable = true

[[parameter]]
name = "x"
clock = "fast"

[[parameter]]
name = "label"
type = "text"

[[parameter]]
name = "y"

[[dependency]]
name = "y"
rhs = { neg = { ref = "k" } }
"#;

    fn cache() -> IndexCache {
        let manifest = SystemManifest::parse(MANIFEST).unwrap();
        IndexCache::plan(&manifest.universe().unwrap()).unwrap()
    }

    #[test]
    fn human_report_lists_every_value() {
        let text = render(&cache());
        assert!(text.starts_with("system plant"));
        assert!(text.contains("tunable:    float[1]"));
        assert!(text.contains("discrete fast: float[1]"));
        assert!(text.contains("= -(k)"));
        for name in ["k", "x", "label", "y"] {
            assert!(text.lines().any(|l| l.trim_start().starts_with(name)), "{name}");
        }
    }

    #[test]
    fn json_report_serializes() {
        let cache = cache();
        let json = serde_json::to_value(LayoutReport::new(&cache)).unwrap();
        assert_eq!(json["system"], "plant");
        assert_eq!(json["values"].as_array().unwrap().len(), 4);
        assert_eq!(json["buffer_table"].as_array().unwrap().len(), 3);
    }
}
