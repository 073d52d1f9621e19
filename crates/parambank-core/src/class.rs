//! Mutability classes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The mutability class a universe value belongs to.
///
/// The four stored classes own buffers in a parameter store. `Dependent`
/// tags values computed from others through a dependency equation; they
/// have no storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterClass {
    /// Differentiable reals in one flat buffer.
    Tunable,
    /// Values updated at clock ticks, grouped by clock then element type.
    Discrete,
    /// Fixed numeric values grouped by element type.
    Constant,
    /// Arbitrary payloads grouped by element type, never narrowed.
    Nonnumeric,
    Dependent,
}

impl ParameterClass {
    /// Classes that own storage, in linear buffer-numbering order.
    pub const STORED: [ParameterClass; 4] = [
        ParameterClass::Tunable,
        ParameterClass::Discrete,
        ParameterClass::Constant,
        ParameterClass::Nonnumeric,
    ];

    pub fn is_stored(self) -> bool {
        !matches!(self, ParameterClass::Dependent)
    }
}

impl fmt::Display for ParameterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterClass::Tunable => "tunable",
            ParameterClass::Discrete => "discrete",
            ParameterClass::Constant => "constant",
            ParameterClass::Nonnumeric => "nonnumeric",
            ParameterClass::Dependent => "dependent",
        };
        f.write_str(name)
    }
}
