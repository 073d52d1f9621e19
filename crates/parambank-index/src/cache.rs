//! The layout planner.
//!
//! `IndexCache::plan` classifies every value of a universe, groups values of
//! one class by clock and element type, assigns contiguous offsets in
//! first-seen order, and records a locator for every value under all of its
//! names. The result is immutable and can be shared across threads and
//! across any number of stores.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parambank_core::{
    Binding, BufferTemplate, ElemType, Expr, LayoutFingerprint, ParameterClass, Shape,
};
use serde::Serialize;
use tracing::debug;

use crate::error::LayoutError;
use crate::locator::{
    element_name, linear_index, split_subscript, subscripts, BufferCoord, ParameterIndex,
    TimeseriesIndex,
};
use crate::universe::{ClockId, Universe, ValueDecl};

/// Planned information about one universe value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueEntry {
    pub name: String,
    pub class: ParameterClass,
    /// Declared element type.
    pub elem_type: ElemType,
    pub shape: Shape,
    /// Every other name registered for this value, namespaced forms included.
    pub aliases: Vec<String>,
    pub default: Option<Binding>,
    /// Storage locator; `None` for dependency-derived values.
    pub index: Option<ParameterIndex>,
    /// Defining right-hand side of a dependency-derived value.
    pub dependency: Option<Expr>,
}

impl ValueEntry {
    pub fn is_derived(&self) -> bool {
        self.class == ParameterClass::Dependent
    }

    pub fn is_array(&self) -> bool {
        matches!(self.shape, Shape::Array(_))
    }

    /// Name of the element at row-major position `linear`.
    pub fn element_name(&self, linear: usize) -> String {
        element_name(&self.name, self.shape.dims(), linear)
    }

    /// Element names of an array value; empty for scalars.
    pub fn element_names(&self) -> Vec<String> {
        if !self.is_array() {
            return Vec::new();
        }
        let count = self.shape.element_count().unwrap_or(0);
        (0..count).map(|i| self.element_name(i)).collect()
    }
}

/// A name resolved against the layout.
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    Whole(&'a ValueEntry),
    /// One element of an array value.
    Element { entry: &'a ValueEntry, linear: usize },
}

impl<'a> Resolved<'a> {
    pub fn entry(&self) -> &'a ValueEntry {
        match self {
            Resolved::Whole(entry) | Resolved::Element { entry, .. } => entry,
        }
    }

    pub fn canonical_name(&self) -> String {
        match self {
            Resolved::Whole(entry) => entry.name.clone(),
            Resolved::Element { entry, linear } => entry.element_name(*linear),
        }
    }

    /// Storage locator, or `None` for dependency-derived values.
    pub fn index(&self) -> Option<ParameterIndex> {
        match self {
            Resolved::Whole(entry) => entry.index.clone(),
            Resolved::Element { entry, linear } => entry
                .index
                .as_ref()
                .map(|idx| idx.element(*linear, entry.element_name(*linear))),
        }
    }
}

/// Where a value goes, decided once from its declaration.
enum Placement<'a> {
    Tunable,
    Discrete(&'a ClockId),
    Constant,
    Nonnumeric,
}

impl Placement<'_> {
    fn class(&self) -> ParameterClass {
        match self {
            Placement::Tunable => ParameterClass::Tunable,
            Placement::Discrete(_) => ParameterClass::Discrete,
            Placement::Constant => ParameterClass::Constant,
            Placement::Nonnumeric => ParameterClass::Nonnumeric,
        }
    }
}

fn classify(decl: &ValueDecl) -> Result<Placement<'_>, LayoutError> {
    if decl.shape == Shape::Unknown {
        return Err(LayoutError::Unstorable {
            name: decl.name.clone(),
            reason: "shape is not known at planning time".into(),
        });
    }
    Ok(if let Some(clock) = &decl.clock {
        Placement::Discrete(clock)
    } else if decl.tunable && decl.elem_type.is_real() {
        Placement::Tunable
    } else if decl.elem_type.is_numeric() {
        Placement::Constant
    } else {
        Placement::Nonnumeric
    })
}

/// Per-element-type buffers of one group, in first-seen order.
#[derive(Debug, Default)]
struct TypeGroups {
    lengths: IndexMap<ElemType, usize>,
}

impl TypeGroups {
    /// Reserve `count` slots of type `ty`; returns (buffer, offset).
    fn reserve(&mut self, ty: ElemType, count: usize) -> (usize, usize) {
        let entry = self.lengths.entry(ty);
        let buffer = entry.index();
        let len = entry.or_insert(0);
        let offset = *len;
        *len += count;
        (buffer, offset)
    }

    fn templates(&self) -> Vec<BufferTemplate> {
        self.lengths
            .iter()
            .map(|(ty, len)| BufferTemplate::new(*ty, *len))
            .collect()
    }
}

/// Serialized form hashed into the layout fingerprint.
#[derive(Serialize)]
struct LayoutDigest<'a> {
    tunable: &'a BufferTemplate,
    clocks: Vec<&'a ClockId>,
    discrete: &'a [Vec<BufferTemplate>],
    constant: &'a [BufferTemplate],
    nonnumeric: &'a [BufferTemplate],
    slots: Vec<(&'a str, BufferCoord, usize, &'a Shape, ElemType)>,
}

/// Immutable buffer layout and name index for one value universe.
#[derive(Debug, Clone)]
pub struct IndexCache {
    system: String,
    fingerprint: LayoutFingerprint,
    tunable: BufferTemplate,
    clocks: Vec<ClockId>,
    /// Union of element types over all clocks; every clock has one buffer per type.
    discrete_types: Vec<ElemType>,
    discrete: Vec<Vec<BufferTemplate>>,
    constant: Vec<BufferTemplate>,
    nonnumeric: Vec<BufferTemplate>,
    entries: IndexMap<String, ValueEntry>,
    /// Every registered name -> entry position.
    names: HashMap<String, usize>,
    buffer_table: Arc<[BufferCoord]>,
}

impl IndexCache {
    /// Plan the buffer layout of a universe.
    pub fn plan(universe: &Universe) -> Result<IndexCache, LayoutError> {
        let mut dependencies: HashMap<&str, &Expr> = HashMap::new();
        for dep in &universe.dependencies {
            if !universe.values.iter().any(|v| v.name == dep.name) {
                return Err(LayoutError::UnknownDependency(dep.name.clone()));
            }
            if dependencies.insert(&dep.name, &dep.rhs).is_some() {
                return Err(LayoutError::DuplicateDependency(dep.name.clone()));
            }
        }

        let mut tunable_len = 0usize;
        let mut tunable_type: Option<ElemType> = None;
        let mut clock_lengths: IndexMap<ClockId, HashMap<usize, usize>> = IndexMap::new();
        let mut discrete_types: Vec<ElemType> = Vec::new();
        let mut constant = TypeGroups::default();
        let mut nonnumeric = TypeGroups::default();
        let mut entries: IndexMap<String, ValueEntry> = IndexMap::new();

        for decl in &universe.values {
            if entries.contains_key(&decl.name) {
                return Err(LayoutError::DuplicateValue(decl.name.clone()));
            }

            let dependency = dependencies.get(decl.name.as_str()).map(|e| (*e).clone());
            let (class, index) = if dependency.is_some() {
                (ParameterClass::Dependent, None)
            } else {
                let placement = classify(decl)?;
                let count = decl.shape.element_count().unwrap_or(0);
                let (coord, offset) = match placement {
                    Placement::Tunable => {
                        let offset = tunable_len;
                        tunable_len += count;
                        tunable_type = Some(
                            tunable_type.map_or(decl.elem_type, |t| t.join(decl.elem_type)),
                        );
                        (BufferCoord::new(ParameterClass::Tunable, 0, 0), offset)
                    }
                    Placement::Discrete(clock) => {
                        let type_slot = match discrete_types.iter().position(|t| *t == decl.elem_type)
                        {
                            Some(i) => i,
                            None => {
                                discrete_types.push(decl.elem_type);
                                discrete_types.len() - 1
                            }
                        };
                        let entry = clock_lengths.entry(clock.clone());
                        let group = entry.index();
                        let len = entry.or_default().entry(type_slot).or_insert(0);
                        let offset = *len;
                        *len += count;
                        (
                            BufferCoord::new(ParameterClass::Discrete, group, type_slot),
                            offset,
                        )
                    }
                    Placement::Constant => {
                        let (buffer, offset) = constant.reserve(decl.elem_type, count);
                        (BufferCoord::new(ParameterClass::Constant, 0, buffer), offset)
                    }
                    Placement::Nonnumeric => {
                        let (buffer, offset) = nonnumeric.reserve(decl.elem_type, count);
                        (BufferCoord::new(ParameterClass::Nonnumeric, 0, buffer), offset)
                    }
                };
                let index = ParameterIndex::new(
                    decl.name.clone(),
                    coord,
                    offset,
                    decl.shape.clone(),
                    decl.elem_type,
                    LayoutFingerprint::default(),
                );
                (placement.class(), Some(index))
            };

            entries.insert(
                decl.name.clone(),
                ValueEntry {
                    name: decl.name.clone(),
                    class,
                    elem_type: decl.elem_type,
                    shape: decl.shape.clone(),
                    aliases: Vec::new(),
                    default: decl.default.clone(),
                    index,
                    dependency,
                },
            );
        }

        let tunable = BufferTemplate::new(
            tunable_type.map_or(ElemType::Float, |t| t.join(ElemType::Float)),
            tunable_len,
        );
        let clocks: Vec<ClockId> = clock_lengths.keys().cloned().collect();
        let discrete: Vec<Vec<BufferTemplate>> = clock_lengths
            .values()
            .map(|lengths| {
                discrete_types
                    .iter()
                    .enumerate()
                    .map(|(i, ty)| BufferTemplate::new(*ty, lengths.get(&i).copied().unwrap_or(0)))
                    .collect()
            })
            .collect();
        let constant = constant.templates();
        let nonnumeric = nonnumeric.templates();

        let fingerprint = LayoutFingerprint::of(&LayoutDigest {
            tunable: &tunable,
            clocks: clocks.iter().collect(),
            discrete: &discrete,
            constant: &constant,
            nonnumeric: &nonnumeric,
            slots: entries
                .values()
                .filter_map(|e| {
                    e.index
                        .as_ref()
                        .map(|idx| (e.name.as_str(), idx.coord(), idx.offset(), &e.shape, e.elem_type))
                })
                .collect(),
        })
        .map_err(|e| LayoutError::Fingerprint(e.to_string()))?;
        for entry in entries.values_mut() {
            if let Some(index) = entry.index.as_mut() {
                index.stamp(fingerprint);
            }
        }

        let names = register_names(&universe.system, &universe.values, &mut entries)?;
        let buffer_table = linear_table(&tunable, &discrete, &constant, &nonnumeric);

        debug!(
            system = %universe.system,
            fingerprint = %fingerprint.short(),
            tunables = tunable.length,
            clocks = clocks.len(),
            constant_buffers = constant.len(),
            nonnumeric_buffers = nonnumeric.len(),
            derived = dependencies.len(),
            "planned parameter layout"
        );

        Ok(IndexCache {
            system: universe.system.clone(),
            fingerprint,
            tunable,
            clocks,
            discrete_types,
            discrete,
            constant,
            nonnumeric,
            entries,
            names,
            buffer_table: buffer_table.into(),
        })
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn fingerprint(&self) -> LayoutFingerprint {
        self.fingerprint
    }

    pub fn tunable_template(&self) -> &BufferTemplate {
        &self.tunable
    }

    pub fn clocks(&self) -> &[ClockId] {
        &self.clocks
    }

    pub fn discrete_types(&self) -> &[ElemType] {
        &self.discrete_types
    }

    /// Per clock, one template per globally known discrete element type.
    pub fn discrete_templates(&self) -> &[Vec<BufferTemplate>] {
        &self.discrete
    }

    pub fn constant_templates(&self) -> &[BufferTemplate] {
        &self.constant
    }

    pub fn nonnumeric_templates(&self) -> &[BufferTemplate] {
        &self.nonnumeric
    }

    /// Template of one buffer.
    pub fn template(&self, coord: BufferCoord) -> Option<&BufferTemplate> {
        match coord.class {
            ParameterClass::Tunable => (coord.group == 0 && coord.buffer == 0).then_some(&self.tunable),
            ParameterClass::Discrete => self.discrete.get(coord.group)?.get(coord.buffer),
            ParameterClass::Constant if coord.group == 0 => self.constant.get(coord.buffer),
            ParameterClass::Nonnumeric if coord.group == 0 => self.nonnumeric.get(coord.buffer),
            _ => None,
        }
    }

    /// Linear numbering of owned buffers: the tunable buffer (if non-empty),
    /// every discrete buffer clock by clock, then constant and nonnumeric
    /// buffers.
    pub fn buffer_table(&self) -> &Arc<[BufferCoord]> {
        &self.buffer_table
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_table.len()
    }

    /// All values in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = &ValueEntry> {
        self.entries.values()
    }

    /// Values that own a storage slot.
    pub fn stored_entries(&self) -> impl Iterator<Item = &ValueEntry> {
        self.entries.values().filter(|e| !e.is_derived())
    }

    /// Dependency-derived values with their defining expressions.
    pub fn dependencies(&self) -> impl Iterator<Item = (&str, &Expr)> {
        self.entries
            .values()
            .filter_map(|e| e.dependency.as_ref().map(|rhs| (e.name.as_str(), rhs)))
    }

    /// Resolve any registered name, including element names like `p[2]`.
    pub fn resolve(&self, name: &str) -> Option<Resolved<'_>> {
        if let Some(&pos) = self.names.get(name) {
            return self.entries.get_index(pos).map(|(_, e)| Resolved::Whole(e));
        }
        let (base, subs) = split_subscript(name)?;
        let &pos = self.names.get(base)?;
        let (_, entry) = self.entries.get_index(pos)?;
        let linear = linear_index(entry.shape.dims(), &subs)?;
        Some(Resolved::Element { entry, linear })
    }

    pub fn entry(&self, name: &str) -> Option<&ValueEntry> {
        self.resolve(name).map(|r| r.entry())
    }

    /// Locator for a stored value or element.
    pub fn index(&self, name: &str) -> Option<ParameterIndex> {
        self.resolve(name)?.index()
    }

    pub fn class_of(&self, name: &str) -> Option<ParameterClass> {
        self.entry(name).map(|e| e.class)
    }

    pub fn is_derived(&self, name: &str) -> bool {
        self.entry(name).is_some_and(ValueEntry::is_derived)
    }

    pub fn canonical_name(&self, name: &str) -> Option<String> {
        self.resolve(name).map(|r| r.canonical_name())
    }

    /// Locator of a discrete value relative to its clock.
    pub fn timeseries_index(&self, name: &str) -> Option<TimeseriesIndex> {
        let index = self.index(name)?;
        if index.class() != ParameterClass::Discrete {
            return None;
        }
        let timeseries = index.coord().group;
        Some(TimeseriesIndex {
            timeseries,
            clock: self.clocks.get(timeseries)?.clone(),
            index,
        })
    }

    /// Rewrite every reference in `expr` to canonical form: aliases become
    /// the canonical name and element names become `Index(Ref(array), subs)`.
    /// Names outside the universe are left untouched.
    pub fn canonicalize_expr(&self, expr: &Expr) -> Expr {
        expr.map_refs(&|name: &str| match self.resolve(name) {
            Some(Resolved::Whole(entry)) => Expr::Ref(entry.name.clone()),
            Some(Resolved::Element { entry, linear }) => {
                Expr::Ref(entry.name.clone()).index(subscripts(entry.shape.dims(), linear))
            }
            None => Expr::Ref(name.to_string()),
        })
    }
}

/// Register the bare, aliased, and namespaced names of every value.
fn register_names(
    system: &str,
    decls: &[ValueDecl],
    entries: &mut IndexMap<String, ValueEntry>,
) -> Result<HashMap<String, usize>, LayoutError> {
    let mut names: HashMap<String, usize> = HashMap::new();

    for decl in decls {
        let Some(pos) = entries.get_index_of(&decl.name) else {
            continue;
        };
        let mut forms: Vec<String> = Vec::new();
        for term in std::iter::once(&decl.name).chain(&decl.aliases) {
            forms.push(term.clone());
            if !system.is_empty() {
                forms.push(format!("{system}.{term}"));
            }
        }

        let mut aliases = Vec::new();
        for form in forms {
            match names.get(&form) {
                Some(&other) if other != pos => {
                    let first = entries
                        .get_index(other)
                        .map(|(name, _)| name.clone())
                        .unwrap_or_default();
                    return Err(LayoutError::AliasConflict {
                        alias: form,
                        first,
                        second: decl.name.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    if form != decl.name {
                        aliases.push(form.clone());
                    }
                    names.insert(form, pos);
                }
            }
        }
        if let Some((_, entry)) = entries.get_index_mut(pos) {
            entry.aliases = aliases;
        }
    }
    Ok(names)
}

fn linear_table(
    tunable: &BufferTemplate,
    discrete: &[Vec<BufferTemplate>],
    constant: &[BufferTemplate],
    nonnumeric: &[BufferTemplate],
) -> Vec<BufferCoord> {
    let mut table = Vec::new();
    if tunable.length > 0 {
        table.push(BufferCoord::new(ParameterClass::Tunable, 0, 0));
    }
    for (group, buffers) in discrete.iter().enumerate() {
        for buffer in 0..buffers.len() {
            table.push(BufferCoord::new(ParameterClass::Discrete, group, buffer));
        }
    }
    for buffer in 0..constant.len() {
        table.push(BufferCoord::new(ParameterClass::Constant, 0, buffer));
    }
    for buffer in 0..nonnumeric.len() {
        table.push(BufferCoord::new(ParameterClass::Nonnumeric, 0, buffer));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Universe {
        Universe::new("sys")
            .with_value(ValueDecl::tunable_real("k").alias("gain"))
            .with_value(ValueDecl::new("c", ElemType::Int))
            .with_value(ValueDecl::new("x", ElemType::Float).on_clock(1u32))
    }

    #[test]
    fn classifies_each_value_once() {
        let cache = IndexCache::plan(&scenario()).unwrap();
        assert_eq!(cache.class_of("k"), Some(ParameterClass::Tunable));
        assert_eq!(cache.class_of("c"), Some(ParameterClass::Constant));
        assert_eq!(cache.class_of("x"), Some(ParameterClass::Discrete));
    }

    #[test]
    fn tunable_requires_real_type() {
        let universe = Universe::new("sys")
            .with_value(ValueDecl::new("n", ElemType::Int).tunable())
            .with_value(ValueDecl::new("label", ElemType::Text).tunable());
        let cache = IndexCache::plan(&universe).unwrap();
        assert_eq!(cache.class_of("n"), Some(ParameterClass::Constant));
        assert_eq!(cache.class_of("label"), Some(ParameterClass::Nonnumeric));
        assert_eq!(cache.tunable_template().length, 0);
    }

    #[test]
    fn templates_follow_grouping() {
        let universe = Universe::new("sys")
            .with_value(ValueDecl::tunable_real("a"))
            .with_value(ValueDecl::tunable_real("p").with_shape(Shape::vector(3)))
            .with_value(ValueDecl::new("c1", ElemType::Float))
            .with_value(ValueDecl::new("n", ElemType::Int))
            .with_value(ValueDecl::new("c2", ElemType::Float))
            .with_value(ValueDecl::new("tag", ElemType::Text));
        let cache = IndexCache::plan(&universe).unwrap();

        assert_eq!(*cache.tunable_template(), BufferTemplate::new(ElemType::Float, 4));
        assert_eq!(
            cache.constant_templates(),
            &[
                BufferTemplate::new(ElemType::Float, 2),
                BufferTemplate::new(ElemType::Int, 1)
            ]
        );
        assert_eq!(
            cache.nonnumeric_templates(),
            &[BufferTemplate::new(ElemType::Text, 1)]
        );

        let p = cache.index("p").unwrap();
        assert_eq!(p.offset(), 1);
        assert_eq!(p.len(), 3);
        let c2 = cache.index("c2").unwrap();
        assert_eq!(c2.coord(), BufferCoord::new(ParameterClass::Constant, 0, 0));
        assert_eq!(c2.offset(), 1);
    }

    #[test]
    fn every_clock_reserves_every_discrete_type() {
        let universe = Universe::new("sys")
            .with_value(ValueDecl::new("x", ElemType::Float).on_clock("fast"))
            .with_value(ValueDecl::new("flag", ElemType::Bool).on_clock("slow"))
            .with_value(ValueDecl::new("y", ElemType::Float).on_clock("slow"));
        let cache = IndexCache::plan(&universe).unwrap();

        assert_eq!(cache.clocks(), &[ClockId::from("fast"), ClockId::from("slow")]);
        assert_eq!(cache.discrete_types(), &[ElemType::Float, ElemType::Bool]);
        assert_eq!(
            cache.discrete_templates(),
            &[
                vec![
                    BufferTemplate::new(ElemType::Float, 1),
                    BufferTemplate::new(ElemType::Bool, 0)
                ],
                vec![
                    BufferTemplate::new(ElemType::Float, 1),
                    BufferTemplate::new(ElemType::Bool, 1)
                ],
            ]
        );
        assert_eq!(
            cache.index("flag").unwrap().coord(),
            BufferCoord::new(ParameterClass::Discrete, 1, 1)
        );
    }

    #[test]
    fn aliases_resolve_to_the_same_locator() {
        let cache = IndexCache::plan(&scenario()).unwrap();
        let expected = cache.index("k").unwrap();
        for name in ["gain", "sys.k", "sys.gain"] {
            assert_eq!(cache.index(name).as_ref(), Some(&expected), "alias {name}");
        }
        assert_eq!(cache.canonical_name("sys.gain").as_deref(), Some("k"));
    }

    #[test]
    fn element_names_resolve_through_any_alias() {
        let universe = Universe::new("sys")
            .with_value(ValueDecl::tunable_real("p").with_shape(Shape::vector(3)).alias("q"));
        let cache = IndexCache::plan(&universe).unwrap();

        let elem = cache.index("p[2]").unwrap();
        assert_eq!(elem.offset(), 1);
        assert_eq!(elem.shape(), &Shape::Scalar);
        assert_eq!(elem.name(), "p[2]");
        assert_eq!(cache.index("sys.q[2]"), Some(elem));
        assert!(cache.index("p[4]").is_none());
        assert!(cache.index("p[0]").is_none());
    }

    #[test]
    fn dependency_values_get_no_slot() {
        let universe = scenario()
            .with_value(ValueDecl::new("y", ElemType::Float))
            .with_dependency("y", Expr::lit(2.0) * Expr::var("k"));
        let cache = IndexCache::plan(&universe).unwrap();
        assert!(cache.is_derived("y"));
        assert_eq!(cache.class_of("y"), Some(ParameterClass::Dependent));
        assert!(cache.index("y").is_none());
        assert_eq!(cache.dependencies().count(), 1);
        assert_eq!(cache.stored_entries().count(), 3);
    }

    #[test]
    fn unknown_shape_is_a_planning_error_unless_derived() {
        let universe = Universe::new("sys")
            .with_value(ValueDecl::new("v", ElemType::Float).with_shape(Shape::Unknown));
        assert!(matches!(
            IndexCache::plan(&universe),
            Err(LayoutError::Unstorable { .. })
        ));

        let derived = universe.with_dependency("v", Expr::var("t"));
        assert!(IndexCache::plan(&derived).is_ok());
    }

    #[test]
    fn conflicting_alias_is_rejected() {
        let universe = Universe::new("sys")
            .with_value(ValueDecl::tunable_real("k"))
            .with_value(ValueDecl::tunable_real("gain").alias("k"));
        assert!(matches!(
            IndexCache::plan(&universe),
            Err(LayoutError::AliasConflict { .. })
        ));
    }

    #[test]
    fn dependency_must_name_a_declared_value() {
        let universe = scenario().with_dependency("ghost", Expr::var("k"));
        assert_eq!(
            IndexCache::plan(&universe).unwrap_err(),
            LayoutError::UnknownDependency("ghost".into())
        );
    }

    #[test]
    fn fingerprint_is_structural() {
        let a = IndexCache::plan(&scenario()).unwrap();
        let b = IndexCache::plan(&scenario()).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.index("k").unwrap().layout(), a.fingerprint());

        let other = scenario().with_value(ValueDecl::tunable_real("extra"));
        let c = IndexCache::plan(&other).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn linear_table_order() {
        let universe = scenario().with_value(ValueDecl::new("s", ElemType::Text));
        let cache = IndexCache::plan(&universe).unwrap();
        let table: Vec<ParameterClass> = cache.buffer_table().iter().map(|c| c.class).collect();
        assert_eq!(
            table,
            vec![
                ParameterClass::Tunable,
                ParameterClass::Discrete,
                ParameterClass::Constant,
                ParameterClass::Nonnumeric
            ]
        );
    }

    #[test]
    fn timeseries_index_only_for_discrete() {
        let cache = IndexCache::plan(&scenario()).unwrap();
        let ts = cache.timeseries_index("x").unwrap();
        assert_eq!(ts.timeseries, 0);
        assert_eq!(ts.clock, ClockId::from(1u32));
        assert!(cache.timeseries_index("k").is_none());
    }

    #[test]
    fn canonicalize_expr_rewrites_aliases_and_elements() {
        let universe = scenario()
            .with_value(ValueDecl::tunable_real("p").with_shape(Shape::vector(2)));
        let cache = IndexCache::plan(&universe).unwrap();
        let expr = Expr::var("sys.gain") + Expr::var("p[2]") + Expr::var("t");
        assert_eq!(
            cache.canonicalize_expr(&expr),
            Expr::var("k") + Expr::var("p").index(vec![2]) + Expr::var("t")
        );
    }

    #[test]
    fn cache_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<IndexCache>();
    }
}
