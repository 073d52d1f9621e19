//! Store construction.
//!
//! `StoreBuilder` merges every source of bindings into one working map,
//! resolves dependency equations by fixpoint substitution, checks that every
//! stored value is present, and only then allocates and narrows buffers.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use parambank_core::{
    Binding, Bindings, Buffer, BufferTemplate, ElemType, Evaluation, Evaluator, Expr,
    ParameterClass, Scalar, StoreError, Value,
};
use parambank_index::{BufferCoord, IndexCache, Resolved, ValueEntry};
use tracing::{debug, warn};

use crate::eval::ArithmeticEvaluator;
use crate::fixpoint::substitute;
use crate::store::ParameterStore;
use crate::validate::{check_scalar, check_value};

/// Name of the independent variable bound by [`StoreBuilder::initial_time`].
pub const DEFAULT_TIME_NAME: &str = "t";

/// Where a binding came from, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Source {
    Declared,
    Default,
    Context,
    Explicit,
    Equation,
}

type Working = IndexMap<String, (Source, Binding)>;

/// Builds a [`ParameterStore`] from an [`IndexCache`] and bindings.
///
/// Later sources win: declared defaults, then builder defaults, then bound
/// unknowns and the initial time, then explicit values. Dependency equations
/// override all of them.
///
/// An element binding (`p[2]`) patches its array only when it comes from a
/// source ranked at or above the whole-array binding; a whole-array binding
/// from a higher source discards it.
#[derive(Debug)]
pub struct StoreBuilder<'a> {
    cache: &'a IndexCache,
    defaults: Vec<(String, Binding)>,
    unknowns: Vec<(String, Value)>,
    time_name: String,
    initial_time: Option<Value>,
    values: Vec<(String, Binding)>,
    evaluator: &'a dyn Evaluator,
}

impl<'a> StoreBuilder<'a> {
    pub fn new(cache: &'a IndexCache) -> Self {
        Self {
            cache,
            defaults: Vec::new(),
            unknowns: Vec::new(),
            time_name: DEFAULT_TIME_NAME.to_string(),
            initial_time: None,
            values: Vec::new(),
            evaluator: &ArithmeticEvaluator,
        }
    }

    /// A default binding, overridden by anything set explicitly.
    pub fn default(mut self, name: &str, binding: impl Into<Binding>) -> Self {
        self.defaults.push((name.to_string(), binding.into()));
        self
    }

    pub fn defaults<S: AsRef<str>>(
        mut self,
        bindings: impl IntoIterator<Item = (S, Binding)>,
    ) -> Self {
        for (name, binding) in bindings {
            self.defaults.push((name.as_ref().to_string(), binding));
        }
        self
    }

    /// Bind a name outside the universe (a state or other unknown) that
    /// expressions may reference.
    pub fn unknown(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.unknowns.push((name.to_string(), value.into()));
        self
    }

    pub fn unknowns<S: AsRef<str>>(mut self, values: impl IntoIterator<Item = (S, Value)>) -> Self {
        for (name, value) in values {
            self.unknowns.push((name.as_ref().to_string(), value));
        }
        self
    }

    /// Name of the independent variable; `t` unless changed.
    pub fn independent_variable(mut self, name: &str) -> Self {
        self.time_name = name.to_string();
        self
    }

    pub fn initial_time(mut self, t: f64) -> Self {
        self.initial_time = Some(Value::from(t));
        self
    }

    /// An explicit binding.
    pub fn set(mut self, name: &str, binding: impl Into<Binding>) -> Self {
        self.values.push((name.to_string(), binding.into()));
        self
    }

    pub fn values<S: AsRef<str>>(mut self, bindings: impl IntoIterator<Item = (S, Binding)>) -> Self {
        for (name, binding) in bindings {
            self.values.push((name.as_ref().to_string(), binding));
        }
        self
    }

    pub fn evaluator(mut self, evaluator: &'a dyn Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Key under which a universe name is merged: its canonical name.
    fn key(&self, name: &str) -> Result<String, StoreError> {
        self.cache
            .canonical_name(name)
            .ok_or_else(|| StoreError::UnknownValue {
                name: name.to_string(),
            })
    }

    fn canonical(&self, binding: Binding) -> Binding {
        match binding {
            Binding::Expr(expr) => Binding::Expr(self.cache.canonicalize_expr(&expr)),
            value => value,
        }
    }

    /// Insert into the working map. A whole-array key drops element keys of
    /// the same array that came from a lower source.
    fn bind(&self, working: &mut Working, key: String, source: Source, binding: Binding) {
        if let Some(Resolved::Whole(entry)) = self.cache.resolve(&key) {
            for element in entry.element_names() {
                if working.get(&element).is_some_and(|(from, _)| *from < source) {
                    working.shift_remove(&element);
                }
            }
        }
        working.insert(key, (source, binding));
    }

    /// Merge every source into one working map, lowest precedence first.
    fn merge(&self) -> Result<Working, StoreError> {
        let mut working = Working::new();

        for entry in self.cache.entries() {
            if let Some(default) = &entry.default {
                let binding = self.canonical(default.clone());
                self.bind(&mut working, entry.name.clone(), Source::Declared, binding);
            }
        }
        for (name, binding) in &self.defaults {
            let key = self.key(name)?;
            self.bind(&mut working, key, Source::Default, self.canonical(binding.clone()));
        }
        for (name, value) in &self.unknowns {
            let binding = Binding::Value(value.clone());
            self.bind(&mut working, name.clone(), Source::Context, binding);
        }
        if let Some(t) = &self.initial_time {
            let binding = Binding::Value(t.clone());
            self.bind(&mut working, self.time_name.clone(), Source::Context, binding);
        }
        let mut explicit: HashSet<String> = HashSet::new();
        for (name, binding) in &self.values {
            let key = self.key(name)?;
            explicit.insert(key.clone());
            self.bind(&mut working, key, Source::Explicit, self.canonical(binding.clone()));
        }
        for (name, rhs) in self.cache.dependencies() {
            if explicit.contains(name) {
                warn!(name, "explicit binding overridden by dependency equation");
            }
            let binding = Binding::Expr(self.cache.canonicalize_expr(rhs));
            self.bind(&mut working, name.to_string(), Source::Equation, binding);
        }
        Ok(working)
    }

    /// Substitute to a fixpoint. Whole-array expressions held in `split` are
    /// scattered over their elements once concrete, and arrays whose elements
    /// are all concrete are assembled so whole-array references resolve.
    fn settle(
        &self,
        resolved: &mut Bindings,
        mut pending: IndexMap<String, Expr>,
        mut split: IndexMap<String, Expr>,
    ) -> Result<IndexMap<String, Expr>, StoreError> {
        loop {
            pending = substitute(self.evaluator, resolved, pending)?;
            let mut progressed = false;

            for (name, expr) in std::mem::take(&mut split) {
                match self.evaluator.evaluate(&expr, resolved)? {
                    Evaluation::Resolved(value) => {
                        let entry = self
                            .cache
                            .entry(&name)
                            .ok_or_else(|| StoreError::UnknownValue { name: name.clone() })?;
                        scatter(entry, &value, resolved, &pending)?;
                        progressed = true;
                    }
                    Evaluation::Symbolic(reduced) => {
                        split.insert(name, reduced);
                    }
                }
            }

            for entry in self.cache.entries().filter(|e| e.is_array()) {
                let name = &entry.name;
                if resolved.contains_key(name)
                    || pending.contains_key(name)
                    || split.contains_key(name)
                {
                    continue;
                }
                if let Some(value) = assemble(entry, resolved) {
                    resolved.insert(name.clone(), value);
                    progressed = true;
                }
            }

            if !progressed {
                pending.extend(split);
                return Ok(pending);
            }
        }
    }

    pub fn build(self) -> Result<ParameterStore, StoreError> {
        let working = self.merge()?;

        let mut resolved = Bindings::new();
        let mut pending: IndexMap<String, Expr> = IndexMap::new();
        for (name, (_, binding)) in working {
            match binding {
                Binding::Value(value) => {
                    resolved.insert(name, value);
                }
                Binding::Expr(expr) => {
                    pending.insert(name, expr);
                }
            }
        }

        // An array bound both whole and by element is held piecewise, so
        // element references read the same numbers that get stored.
        let mut split: IndexMap<String, Expr> = IndexMap::new();
        for entry in self.cache.entries().filter(|e| e.is_array()) {
            let piecewise = entry
                .element_names()
                .iter()
                .any(|n| resolved.contains_key(n) || pending.contains_key(n));
            if !piecewise {
                continue;
            }
            if let Some(value) = resolved.remove(&entry.name) {
                scatter(entry, &value, &mut resolved, &pending)?;
            } else if let Some(expr) = pending.shift_remove(&entry.name) {
                split.insert(entry.name.clone(), expr);
            }
        }
        let symbolic = self.settle(&mut resolved, pending, split)?;

        let mut missing = Vec::new();
        let mut unresolved = Vec::new();
        for entry in self.cache.stored_entries() {
            if resolved.contains_key(&entry.name) {
                continue;
            }
            if symbolic.contains_key(&entry.name) {
                unresolved.push(entry.name.clone());
                continue;
            }
            let names = slot_names(entry);
            let absent: Vec<String> = names
                .iter()
                .filter(|n| !resolved.contains_key(*n))
                .cloned()
                .collect();
            if absent.len() == names.len() && !absent.iter().any(|n| symbolic.contains_key(n)) {
                // Nothing bound at all: report the value, not its elements.
                missing.push(entry.name.clone());
                continue;
            }
            for name in absent {
                if symbolic.contains_key(&name) {
                    unresolved.push(name);
                } else {
                    missing.push(name);
                }
            }
        }
        if !missing.is_empty() {
            return Err(StoreError::MissingValues { names: missing });
        }
        if !unresolved.is_empty() {
            return Err(StoreError::Unresolved { names: unresolved });
        }

        let mut staging = Staging::new(self.cache);
        for entry in self.cache.stored_entries() {
            staging.write_entry(entry, &resolved)?;
        }
        let store = staging.finish(self.cache)?;

        debug!(
            fingerprint = %store.layout().short(),
            buffers = store.buffer_count(),
            tunables = store.tunable().len(),
            derived_symbolic = symbolic.len(),
            "built parameter store"
        );
        Ok(store)
    }
}

/// Bind every element of `value` that has no binding of its own.
fn scatter(
    entry: &ValueEntry,
    value: &Value,
    resolved: &mut Bindings,
    pending: &IndexMap<String, Expr>,
) -> Result<(), StoreError> {
    match &entry.index {
        Some(index) => check_value(index, value)?,
        None => {
            if value.shape().is_scalar()
                || Some(value.elements().len()) != entry.shape.element_count()
            {
                return Err(StoreError::SizeMismatch {
                    name: entry.name.clone(),
                    expected: entry.shape.clone(),
                    found: value.shape(),
                });
            }
        }
    }
    for (linear, scalar) in value.elements().iter().enumerate() {
        let name = entry.element_name(linear);
        if !resolved.contains_key(&name) && !pending.contains_key(&name) {
            resolved.insert(name, Value::Scalar(scalar.clone()));
        }
    }
    Ok(())
}

/// The array value of `entry` if every element is bound to a scalar.
fn assemble(entry: &ValueEntry, resolved: &Bindings) -> Option<Value> {
    let data = entry
        .element_names()
        .iter()
        .map(|n| resolved.get(n).and_then(Value::as_scalar).cloned())
        .collect::<Option<Vec<_>>>()?;
    if data.is_empty() {
        return None;
    }
    Value::array(entry.shape.dims().to_vec(), data)
}

/// Names that can fill an entry's slot piecewise: the entry name for
/// scalars, every element name for arrays.
fn slot_names(entry: &ValueEntry) -> Vec<String> {
    if entry.is_array() {
        entry.element_names()
    } else {
        vec![entry.name.clone()]
    }
}

/// Per-buffer slot contents collected before allocation.
struct Staging {
    tunable: Vec<Option<Scalar>>,
    discrete: Vec<Vec<Vec<Option<Scalar>>>>,
    constant: Vec<Vec<Option<Scalar>>>,
    nonnumeric: Vec<Vec<Option<Scalar>>>,
}

fn slots(template: &BufferTemplate) -> Vec<Option<Scalar>> {
    vec![None; template.length]
}

impl Staging {
    fn new(cache: &IndexCache) -> Self {
        Self {
            tunable: slots(cache.tunable_template()),
            discrete: cache
                .discrete_templates()
                .iter()
                .map(|group| group.iter().map(slots).collect())
                .collect(),
            constant: cache.constant_templates().iter().map(slots).collect(),
            nonnumeric: cache.nonnumeric_templates().iter().map(slots).collect(),
        }
    }

    fn buffer_mut(&mut self, coord: BufferCoord) -> Result<&mut Vec<Option<Scalar>>, StoreError> {
        let found = match coord.class {
            ParameterClass::Tunable => Some(&mut self.tunable),
            ParameterClass::Discrete => self
                .discrete
                .get_mut(coord.group)
                .and_then(|g| g.get_mut(coord.buffer)),
            ParameterClass::Constant => self.constant.get_mut(coord.buffer),
            ParameterClass::Nonnumeric => self.nonnumeric.get_mut(coord.buffer),
            ParameterClass::Dependent => {
                return Err(StoreError::UnhandledClass {
                    class: coord.class,
                    operation: "build",
                })
            }
        };
        found.ok_or_else(|| StoreError::InvalidLocator {
            reason: format!("no staged buffer for {coord:?}"),
        })
    }

    /// Stage one entry: the whole value if bound, patched by any element
    /// bindings.
    fn write_entry(&mut self, entry: &ValueEntry, resolved: &Bindings) -> Result<(), StoreError> {
        let Some(index) = &entry.index else {
            return Ok(());
        };
        let mut elements: Vec<Option<Scalar>> = vec![None; index.len()];
        if let Some(value) = resolved.get(&entry.name) {
            check_value(index, value)?;
            for (slot, scalar) in elements.iter_mut().zip(value.elements()) {
                *slot = Some(scalar.clone());
            }
        }
        if entry.is_array() {
            for (linear, slot) in elements.iter_mut().enumerate() {
                let name = entry.element_name(linear);
                if let Some(value) = resolved.get(&name) {
                    let Value::Scalar(scalar) = value else {
                        return Err(StoreError::TypeMismatch {
                            name,
                            expected: format!("{} scalar", entry.elem_type),
                            found: format!("array {}", value.shape()),
                        });
                    };
                    let element = Resolved::Element { entry, linear }.index();
                    if let Some(element) = element {
                        check_scalar(&element, scalar)?;
                    }
                    *slot = Some(scalar.clone());
                }
            }
        }

        let offset = index.offset();
        let buffer = self.buffer_mut(index.coord())?;
        for (i, scalar) in elements.into_iter().enumerate() {
            if let Some(slot) = buffer.get_mut(offset + i) {
                *slot = scalar;
            }
        }
        Ok(())
    }

    fn finish(self, cache: &IndexCache) -> Result<ParameterStore, StoreError> {
        let fill = |staged: Vec<Option<Scalar>>| -> Result<Vec<Scalar>, StoreError> {
            let len = staged.len();
            staged
                .into_iter()
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| StoreError::InvalidLocator {
                    reason: format!("staged buffer of length {len} has unwritten slots"),
                })
        };
        let numeric = |staged: Vec<Option<Scalar>>, template: &BufferTemplate| -> Result<Buffer, StoreError> {
            Ok(Buffer::narrowed(&fill(staged)?, template.elem_type, None))
        };

        let tunable = Buffer::narrowed(
            &fill(self.tunable)?,
            cache.tunable_template().elem_type,
            Some(ElemType::Float),
        );
        let discrete = self
            .discrete
            .into_iter()
            .zip(cache.discrete_templates())
            .map(|(group, templates)| {
                group
                    .into_iter()
                    .zip(templates)
                    .map(|(staged, template)| numeric(staged, template))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        let constant = self
            .constant
            .into_iter()
            .zip(cache.constant_templates())
            .map(|(staged, template)| numeric(staged, template))
            .collect::<Result<Vec<_>, _>>()?;
        // Nonnumeric buffers keep their declared type.
        let nonnumeric = self
            .nonnumeric
            .into_iter()
            .zip(cache.nonnumeric_templates())
            .map(|(staged, template)| -> Result<Buffer, StoreError> {
                let values = fill(staged)?;
                Ok(Buffer::from_scalars(template.elem_type, &values)
                    .unwrap_or(Buffer::Any(values)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ParameterStore {
            layout: cache.fingerprint(),
            buffer_table: cache.buffer_table().clone(),
            tunable: Arc::new(tunable),
            discrete: Arc::new(discrete),
            constant: Arc::new(constant),
            nonnumeric: Arc::new(nonnumeric),
        })
    }
}
