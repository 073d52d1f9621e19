//! `parambank.toml` system manifest parsing.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use parambank_core::{Binding, ElemType, Expr, Shape, Value};
use parambank_index::{ClockId, Universe, ValueDecl};
use serde::{Deserialize, Serialize};

/// The top-level manifest describing one system's value universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemManifest {
    pub system: SystemConfig,
    #[serde(default, rename = "parameter")]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default, rename = "dependency")]
    pub dependencies: Vec<DependencySpec>,
    /// Explicit bindings, highest precedence below dependency equations.
    #[serde(default)]
    pub values: BTreeMap<String, Binding>,
    /// Values of names outside the universe (states) that expressions use.
    #[serde(default)]
    pub unknowns: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub name: String,
    /// Name of the independent variable, `t` when omitted.
    #[serde(default)]
    pub independent_variable: Option<String>,
    #[serde(default)]
    pub initial_time: Option<f64>,
}

/// One `[[parameter]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type", default = "default_type")]
    pub elem_type: ElemType,
    #[serde(default)]
    pub shape: ShapeSpec,
    #[serde(default)]
    pub tunable: bool,
    #[serde(default)]
    pub clock: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub default: Option<Binding>,
}

fn default_type() -> ElemType {
    ElemType::Float
}

/// `[]` for a scalar, `[n, ...]` for an array, or `"scalar"` / `"unknown"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShapeSpec {
    Dims(Vec<usize>),
    Named(String),
}

impl Default for ShapeSpec {
    fn default() -> Self {
        ShapeSpec::Dims(Vec::new())
    }
}

impl ShapeSpec {
    pub fn to_shape(&self) -> Result<Shape> {
        Ok(match self {
            ShapeSpec::Dims(dims) if dims.is_empty() => Shape::Scalar,
            ShapeSpec::Dims(dims) => Shape::Array(dims.clone()),
            ShapeSpec::Named(name) => match name.as_str() {
                "scalar" => Shape::Scalar,
                "unknown" => Shape::Unknown,
                other => bail!("unrecognized shape `{other}` (expected a list, \"scalar\" or \"unknown\")"),
            },
        })
    }
}

/// One `[[dependency]]` equation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySpec {
    pub name: String,
    pub rhs: Expr,
}

impl SystemManifest {
    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// The value universe the manifest declares.
    pub fn universe(&self) -> Result<Universe> {
        let mut universe = Universe::new(&self.system.name);
        for param in &self.parameters {
            let shape = param
                .shape
                .to_shape()
                .with_context(|| format!("parameter `{}`", param.name))?;
            let mut decl = ValueDecl::new(&param.name, param.elem_type).with_shape(shape);
            decl.tunable = param.tunable;
            decl.clock = param.clock.as_deref().map(ClockId::from);
            decl.aliases = param.aliases.clone();
            decl.default = param.default.clone();
            universe.push_value(decl);
        }
        for dep in &self.dependencies {
            universe.push_dependency(&dep.name, dep.rhs.clone());
        }
        Ok(universe)
    }
}

#[cfg(test)]
mod tests {
    use parambank_core::{ParameterClass, Scalar};
    use parambank_index::IndexCache;

    use super::*;

    const PLANT: &str = r#"
[system]
name = "plant"
initial_time = 0.0

[[parameter]]
name = "k"
type = "float"
tunable = true
aliases = ["gain"]
default = 2.0

[[parameter]]
name = "p"
shape = [3]
tunable = true
default = { shape = [3], data = [1.0, 2.0, 3.0] }

[[parameter]]
name = "c"
type = "int"

[[parameter]]
name = "x"
clock = "c1"

[[parameter]]
name = "y"

[[dependency]]
name = "y"
rhs = { mul = [{ literal = 2.0 }, { ref = "k" }] }

[values]
c = 5
x = { add = [{ ref = "t" }, { literal = 1.0 }] }
"#;

    #[test]
    fn parse_full_manifest() {
        let manifest = SystemManifest::parse(PLANT).unwrap();
        assert_eq!(manifest.system.name, "plant");
        assert_eq!(manifest.parameters.len(), 5);
        assert_eq!(manifest.parameters[2].elem_type, ElemType::Int);
        assert_eq!(manifest.parameters[1].shape, ShapeSpec::Dims(vec![3]));
        assert_eq!(
            manifest.values.get("c"),
            Some(&Binding::Value(Value::Scalar(Scalar::Int(5))))
        );
        assert!(matches!(manifest.values.get("x"), Some(Binding::Expr(_))));
        assert_eq!(
            manifest.dependencies[0].rhs,
            Expr::lit(2.0) * Expr::var("k")
        );
    }

    #[test]
    fn universe_plans() {
        let manifest = SystemManifest::parse(PLANT).unwrap();
        let cache = IndexCache::plan(&manifest.universe().unwrap()).unwrap();
        assert_eq!(cache.class_of("gain"), Some(ParameterClass::Tunable));
        assert_eq!(cache.class_of("x"), Some(ParameterClass::Discrete));
        assert_eq!(cache.class_of("y"), Some(ParameterClass::Dependent));
        assert_eq!(cache.tunable_template().length, 4);
    }

    #[test]
    fn shape_keywords() {
        assert_eq!(ShapeSpec::default().to_shape().unwrap(), Shape::Scalar);
        assert_eq!(
            ShapeSpec::Named("unknown".into()).to_shape().unwrap(),
            Shape::Unknown
        );
        assert!(ShapeSpec::Named("cube".into()).to_shape().is_err());
    }

    #[test]
    fn reject_invalid_toml() {
        assert!(SystemManifest::parse("this is not valid toml [[[").is_err());
        assert!(SystemManifest::parse("[[parameter]]\nname = \"k\"\n").is_err());
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parambank.toml");
        std::fs::write(&path, PLANT).unwrap();
        let manifest = SystemManifest::load(&path).unwrap();
        assert_eq!(manifest.system.name, "plant");

        let missing = dir.path().join("absent.toml");
        let err = SystemManifest::load(&missing).unwrap_err();
        assert!(format!("{err:#}").contains("reading"));
    }
}
