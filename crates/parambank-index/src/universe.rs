//! Declaration of the value universe a layout is planned for.

use std::fmt;

use parambank_core::{Binding, ElemType, Expr, Shape};
use serde::{Deserialize, Serialize};

/// Identifier of a clock (or event-driven subsystem) owning discrete values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClockId(pub String);

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClockId {
    fn from(s: &str) -> Self {
        ClockId(s.to_string())
    }
}

impl From<u32> for ClockId {
    fn from(n: u32) -> Self {
        ClockId(n.to_string())
    }
}

/// One declared parameter or unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDecl {
    /// Bare name; also the canonical identity.
    pub name: String,
    pub elem_type: ElemType,
    pub shape: Shape,
    /// Eligible for continuous adjustment (differentiation/optimization).
    pub tunable: bool,
    /// Owning clock for discrete values.
    pub clock: Option<ClockId>,
    /// Alternate terms that resolve to the same value.
    pub aliases: Vec<String>,
    pub default: Option<Binding>,
}

impl ValueDecl {
    /// A non-tunable scalar with no clock, aliases, or default.
    pub fn new(name: &str, elem_type: ElemType) -> Self {
        Self {
            name: name.to_string(),
            elem_type,
            shape: Shape::Scalar,
            tunable: false,
            clock: None,
            aliases: Vec::new(),
            default: None,
        }
    }

    /// A tunable float scalar.
    pub fn tunable_real(name: &str) -> Self {
        Self::new(name, ElemType::Float).tunable()
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    pub fn tunable(mut self) -> Self {
        self.tunable = true;
        self
    }

    pub fn on_clock(mut self, clock: impl Into<ClockId>) -> Self {
        self.clock = Some(clock.into());
        self
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn with_default(mut self, default: impl Into<Binding>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// A dependency equation `name = rhs`. The left-hand side gets no slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub rhs: Expr,
}

/// The complete set of values a layout is planned for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    /// System name used for namespaced aliases (`system.name`).
    pub system: String,
    pub values: Vec<ValueDecl>,
    pub dependencies: Vec<Dependency>,
}

impl Universe {
    pub fn new(system: &str) -> Self {
        Self {
            system: system.to_string(),
            values: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_value(mut self, decl: ValueDecl) -> Self {
        self.values.push(decl);
        self
    }

    pub fn with_dependency(mut self, name: &str, rhs: Expr) -> Self {
        self.dependencies.push(Dependency {
            name: name.to_string(),
            rhs,
        });
        self
    }

    pub fn push_value(&mut self, decl: ValueDecl) {
        self.values.push(decl);
    }

    pub fn push_dependency(&mut self, name: &str, rhs: Expr) {
        self.dependencies.push(Dependency {
            name: name.to_string(),
            rhs,
        });
    }
}
