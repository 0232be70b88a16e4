//! Attribute registry built from the model's `AttrDefs` block.
//!
//! The registry maps class names to ordered attribute schemas. It is loaded
//! once from the merged model, before any node is validated, and is then a
//! read-only oracle for [`AttributeRegistry::validate`] and
//! [`AttributeRegistry::validate_node`].
//!
//! ```text
//! <AttrDefs>
//!   <ClassAttrs name="Field">
//!     <Options name="lift_types"><Option>none</Option><Option>gas</Option></Options>
//!     <AttrDef name="water_cut" type="float" unit="frac" GE="0" LE="1"/>
//!     <AttrDef name="lift" type="str" options="lift_types" default="none"/>
//!     <AttrDef name="flood_water" type="binary" exclusive="flood"/>
//!     <AttrDef name="flood_gas" type="binary" exclusive="flood"/>
//!   </ClassAttrs>
//! </AttrDefs>
//! ```

use std::collections::HashSet;

use indexmap::IndexMap;
use log::{debug, info};
use thiserror::Error;

use flowsheet_core::{
    element::{Element, Tag, attr},
    flag::parse_flag,
};

use crate::{
    error::{Diagnostic, DiagnosticCollector, ErrorCode, ResolveError, Result, Severity},
    identity::{Key, child_keys},
};

/// Schema class of processes without a registered `class` attribute.
const PROCESS_CLASS: &str = "Process";

/// Declared value type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Float,
    Int,
    Binary,
    Str,
    /// Any other type token; values are not checked.
    Token(String),
}

impl ValueType {
    fn parse(token: Option<&str>) -> Self {
        match token.map(str::trim) {
            None | Some("") | Some("str") | Some("string") => ValueType::Str,
            Some("float") => ValueType::Float,
            Some("int") => ValueType::Int,
            Some("binary") | Some("bool") => ValueType::Binary,
            Some(other) => ValueType::Token(other.to_string()),
        }
    }
}

/// Inclusive/exclusive numeric bounds of an attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    pub gt: Option<f64>,
    pub ge: Option<f64>,
    pub lt: Option<f64>,
    pub le: Option<f64>,
}

impl Bounds {
    pub fn is_empty(&self) -> bool {
        self.gt.is_none() && self.ge.is_none() && self.lt.is_none() && self.le.is_none()
    }

    /// Returns the first bound violated by `value`, rendered as a constraint.
    fn violation(&self, value: f64) -> Option<String> {
        if let Some(gt) = self.gt.filter(|gt| value <= *gt) {
            return Some(format!("must be > {gt}"));
        }
        if let Some(ge) = self.ge.filter(|ge| value < *ge) {
            return Some(format!("must be >= {ge}"));
        }
        if let Some(lt) = self.lt.filter(|lt| value >= *lt) {
            return Some(format!("must be < {lt}"));
        }
        if let Some(le) = self.le.filter(|le| value > *le) {
            return Some(format!("must be <= {le}"));
        }
        None
    }

    /// Returns a description of the first inconsistent lower/upper pair.
    fn inconsistency(&self) -> Option<String> {
        let pairs = [
            (attr::GT, self.gt, attr::LT, self.lt, true),
            (attr::GT, self.gt, attr::LE, self.le, true),
            (attr::GE, self.ge, attr::LT, self.lt, true),
            (attr::GE, self.ge, attr::LE, self.le, false),
        ];
        pairs
            .into_iter()
            .find_map(|(lo_name, lo, hi_name, hi, strict)| match (lo, hi) {
                (Some(lo), Some(hi)) if (strict && lo >= hi) || (!strict && lo > hi) => {
                    Some(format!("{lo_name}={lo} conflicts with {hi_name}={hi}"))
                }
                _ => None,
            })
    }
}

/// Definition of one attribute of a class.
#[derive(Debug, Clone)]
pub struct AttrDef {
    name: String,
    value_type: ValueType,
    unit: Option<String>,
    options: Option<Vec<String>>,
    bounds: Bounds,
    exclusive: Option<String>,
    synchronized: Option<String>,
    default: Option<String>,
    desc: Option<String>,
}

impl AttrDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Returns the enumerated values, if the attribute is an option set.
    pub fn options(&self) -> Option<&[String]> {
        self.options.as_deref()
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Returns the exclusivity group this attribute belongs to.
    pub fn exclusive(&self) -> Option<&str> {
        self.exclusive.as_deref()
    }

    /// Returns the synchronization group this attribute belongs to.
    pub fn synchronized(&self) -> Option<&str> {
        self.synchronized.as_deref()
    }

    /// Returns the value used when a node does not set the attribute.
    pub fn default(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn desc(&self) -> Option<&str> {
        self.desc.as_deref()
    }
}

/// Ordered attribute schema of one class.
#[derive(Debug, Clone, Default)]
pub struct ClassSchema {
    name: String,
    attrs: IndexMap<String, AttrDef>,
}

impl ClassSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, attr_name: &str) -> Option<&AttrDef> {
        self.attrs.get(attr_name)
    }

    /// Iterate over the attribute definitions in declaration order.
    pub fn attrs(&self) -> impl Iterator<Item = &AttrDef> {
        self.attrs.values()
    }

    fn group_members<'a>(
        &'a self,
        group_of: impl Fn(&AttrDef) -> Option<&str> + 'a,
    ) -> IndexMap<&'a str, Vec<&'a AttrDef>> {
        let mut groups: IndexMap<&str, Vec<&AttrDef>> = IndexMap::new();
        for def in self.attrs.values() {
            if let Some(group) = group_of(def) {
                groups.entry(group).or_default().push(def);
            }
        }
        groups
    }
}

/// Reasons a single value fails its definition.
#[derive(Debug, Error, PartialEq)]
enum ValueError {
    #[error("`{value}` is not a valid {expected}")]
    Unreadable { value: String, expected: &'static str },

    #[error("`{value}` is not one of {allowed}")]
    NotAnOption { value: String, allowed: String },

    #[error("value {value} is out of range: {constraint}")]
    OutOfRange { value: String, constraint: String },
}

impl ValueError {
    fn code(&self) -> ErrorCode {
        match self {
            ValueError::Unreadable { .. } => ErrorCode::E205,
            ValueError::NotAnOption { .. } => ErrorCode::E202,
            ValueError::OutOfRange { .. } => ErrorCode::E201,
        }
    }
}

/// Per-class attribute schemas.
#[derive(Debug, Clone, Default)]
pub struct AttributeRegistry {
    classes: IndexMap<String, ClassSchema>,
}

impl AttributeRegistry {
    /// Load the registry from a merged `Model` element.
    ///
    /// A model without `AttrDefs` yields an empty registry, in which case no
    /// node is validated.
    ///
    /// # Errors
    ///
    /// Returns every [`E104`](ErrorCode::E104) problem found across all
    /// definitions at once.
    pub fn load(model: &Element) -> std::result::Result<Self, ResolveError> {
        let mut registry = Self::default();
        let mut collector = DiagnosticCollector::new();

        let keys = child_keys(Key::root(), model.children())?;
        for (defs_key, defs) in keys.into_iter().zip(model.children()) {
            if *defs.tag() != Tag::AttrDefs {
                continue;
            }
            let class_keys = child_keys(defs_key, defs.children())?;
            for (class_key, class) in class_keys.into_iter().zip(defs.children()) {
                if *class.tag() != Tag::ClassAttrs {
                    continue;
                }
                let Some(class_name) = class.name() else {
                    collector.emit(
                        Diagnostic::error("ClassAttrs without a name")
                            .with_code(ErrorCode::E104)
                            .with_label(class_key, "name this class"),
                    );
                    continue;
                };
                let schema = load_class(class_name, class_key, class, &mut collector)?;
                registry.classes.insert(class_name.to_string(), schema);
            }
        }

        collector.finish()?;
        info!(classes = registry.classes.len(); "Attribute registry loaded");
        Ok(registry)
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Returns the schema of `class`.
    pub fn class(&self, class: &str) -> Option<&ClassSchema> {
        self.classes.get(class)
    }

    /// Iterate over the declared class names.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Returns the class whose schema applies to `element`.
    ///
    /// A `Process` uses its `class` attribute when the registry declares that
    /// class and the generic `Process` class otherwise. Every other element
    /// uses its tag name.
    pub fn class_of<'a>(&self, element: &'a Element) -> &'a str {
        self.class_for(element.tag(), element.attr(attr::CLASS))
    }

    /// Returns the class for an element tagged `tag` whose `class` attribute
    /// is `class`.
    pub fn class_for<'a>(&self, tag: &'a Tag, class: Option<&'a str>) -> &'a str {
        match tag {
            Tag::Process => class
                .filter(|class| self.classes.contains_key(*class))
                .unwrap_or(PROCESS_CLASS),
            tag => tag.as_str(),
        }
    }

    /// Returns the attribute value of `element`, falling back to the declared
    /// default of its class.
    pub fn value_of<'a>(&'a self, element: &'a Element, name: &str) -> Option<&'a str> {
        element.a_value(name).or_else(|| {
            self.class(self.class_of(element))
                .and_then(|schema| schema.get(name))
                .and_then(AttrDef::default)
        })
    }

    /// Check one attribute value against its definition in `class`.
    ///
    /// Classes without a schema accept everything. The returned diagnostic
    /// carries no label; callers attach the location.
    pub fn validate(&self, class: &str, name: &str, value: &str) -> Result<()> {
        let Some(schema) = self.classes.get(class) else {
            return Ok(());
        };
        let Some(def) = schema.get(name) else {
            return Err(Diagnostic::error(format!(
                "unknown attribute `{name}` for class `{class}`"
            ))
            .with_code(ErrorCode::E200));
        };

        check_value(def, value).map_err(|err| {
            Diagnostic::error(format!("attribute `{name}`: {err}")).with_code(err.code())
        })
    }

    /// Validate the `A` attributes of one node, including its exclusivity and
    /// synchronization groups.
    ///
    /// `key` is the node's identity and `attr_keys` the identities of its
    /// children, parallel to `element.children()`. Unknown attributes are
    /// reported with `unknown_severity`.
    pub fn validate_node(
        &self,
        element: &Element,
        key: Key,
        attr_keys: &[Key],
        unknown_severity: Severity,
    ) -> Vec<Diagnostic> {
        let class = self.class_of(element);
        let Some(schema) = self.classes.get(class) else {
            debug!(class = class, node:% = key; "No ClassAttrs for class, skipping validation");
            return Vec::new();
        };

        let mut diagnostics = Vec::new();
        for (attr_key, child) in attr_keys.iter().zip(element.children()) {
            if *child.tag() != Tag::A {
                continue;
            }
            let Some(name) = child.name() else {
                continue;
            };
            let value = child.text().unwrap_or_default();
            if let Err(diag) = self.validate(class, name, value) {
                let diag = if diag.code() == Some(ErrorCode::E200) {
                    diag.with_severity(unknown_severity)
                        .with_help(format!("declare it in ClassAttrs `{class}`"))
                } else {
                    diag
                };
                diagnostics.push(diag.with_label(*attr_key, "set here"));
            }
        }

        for (group, members) in schema.group_members(AttrDef::exclusive) {
            let set: Vec<&str> = members
                .iter()
                .filter(|def| element.a_value(def.name()).and_then(parse_flag) == Some(true))
                .map(|def| def.name())
                .collect();
            if set.len() > 1 {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "exclusive group `{group}` has {} true members: {}",
                        set.len(),
                        set.join(", ")
                    ))
                    .with_code(ErrorCode::E203)
                    .with_label(key, "on this element")
                    .with_help("at most one member of an exclusive group may be true"),
                );
            }
        }

        for (group, members) in schema.group_members(AttrDef::synchronized) {
            let present: Vec<(&str, &str)> = members
                .iter()
                .filter_map(|def| element.a_value(def.name()).map(|value| (def.name(), value)))
                .collect();
            let Some((_, first)) = present.first() else {
                continue;
            };
            if present.iter().any(|(_, value)| !values_equal(first, value)) {
                let listing: Vec<String> = present
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect();
                diagnostics.push(
                    Diagnostic::error(format!(
                        "synchronized group `{group}` has differing values: {}",
                        listing.join(", ")
                    ))
                    .with_code(ErrorCode::E204)
                    .with_label(key, "on this element"),
                );
            }
        }

        diagnostics
    }
}

fn load_class(
    class_name: &str,
    class_key: Key,
    class: &Element,
    collector: &mut DiagnosticCollector,
) -> Result<ClassSchema> {
    let mut schema = ClassSchema {
        name: class_name.to_string(),
        attrs: IndexMap::new(),
    };

    let named_options: IndexMap<&str, Vec<String>> = class
        .children_tagged(&Tag::Options)
        .filter_map(|options| options.name().map(|name| (name, option_values(options))))
        .collect();

    let keys = child_keys(class_key, class.children())?;
    let mut seen: HashSet<&str> = HashSet::new();
    for (def_key, def) in keys.into_iter().zip(class.children()) {
        if *def.tag() != Tag::AttrDef {
            continue;
        }
        let Some(name) = def.name() else {
            collector.emit(
                Diagnostic::error(format!("AttrDef without a name in class `{class_name}`"))
                    .with_code(ErrorCode::E104)
                    .with_label(def_key, "name this attribute"),
            );
            continue;
        };
        if !seen.insert(name) {
            collector.emit(
                Diagnostic::error(format!(
                    "attribute `{name}` is declared twice in class `{class_name}`"
                ))
                .with_code(ErrorCode::E104)
                .with_label(def_key, "second declaration"),
            );
            continue;
        }
        match load_attr_def(name, def, &named_options) {
            Ok(attr_def) => {
                schema.attrs.insert(name.to_string(), attr_def);
            }
            Err(message) => collector.emit(
                Diagnostic::error(format!("invalid definition of `{class_name}.{name}`: {message}"))
                    .with_code(ErrorCode::E104)
                    .with_label(def_key, "defined here"),
            ),
        }
    }

    debug!(class = class_name, attrs = schema.attrs.len(); "Loaded class attributes");
    Ok(schema)
}

fn load_attr_def(
    name: &str,
    def: &Element,
    named_options: &IndexMap<&str, Vec<String>>,
) -> std::result::Result<AttrDef, String> {
    let bound = |bound_name: &str| -> std::result::Result<Option<f64>, String> {
        def.attr(bound_name)
            .map(|text| {
                text.trim()
                    .parse::<f64>()
                    .map_err(|_| format!("bound {bound_name}=`{text}` is not a number"))
            })
            .transpose()
    };
    let bounds = Bounds {
        gt: bound(attr::GT)?,
        ge: bound(attr::GE)?,
        lt: bound(attr::LT)?,
        le: bound(attr::LE)?,
    };
    if let Some(conflict) = bounds.inconsistency() {
        return Err(format!("inconsistent bounds, {conflict}"));
    }

    let inline = def.children_tagged(&Tag::Options).next().map(option_values);
    let options = match (def.attr(attr::OPTIONS), inline) {
        (_, Some(values)) => Some(values),
        (Some(set), None) => Some(
            named_options
                .get(set)
                .cloned()
                .ok_or_else(|| format!("options set `{set}` is not declared"))?,
        ),
        (None, None) => None,
    };

    let text_attr = |attr_name: &str| def.attr(attr_name).map(str::to_string);
    Ok(AttrDef {
        name: name.to_string(),
        value_type: ValueType::parse(def.attr(attr::TYPE)),
        unit: text_attr(attr::UNIT),
        options,
        bounds,
        exclusive: text_attr(attr::EXCLUSIVE),
        synchronized: text_attr(attr::SYNCHRONIZED),
        default: text_attr(attr::DEFAULT).or_else(|| {
            def.text()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        }),
        desc: text_attr(attr::DESC),
    })
}

fn option_values(options: &Element) -> Vec<String> {
    options
        .children_tagged(&Tag::Option)
        .filter_map(Element::text)
        .map(|text| text.trim().to_string())
        .collect()
}

fn check_value(def: &AttrDef, value: &str) -> std::result::Result<(), ValueError> {
    let trimmed = value.trim();
    let unreadable = |expected| ValueError::Unreadable {
        value: value.to_string(),
        expected,
    };

    let number = match def.value_type {
        ValueType::Float => Some(trimmed.parse::<f64>().map_err(|_| unreadable("float"))?),
        ValueType::Int => Some(trimmed.parse::<i64>().map_err(|_| unreadable("int"))? as f64),
        ValueType::Binary => {
            parse_flag(trimmed).ok_or_else(|| unreadable("binary flag"))?;
            None
        }
        ValueType::Str | ValueType::Token(_) => None,
    };

    if let Some(options) = def.options() {
        if !options.iter().any(|option| option == trimmed) {
            return Err(ValueError::NotAnOption {
                value: value.to_string(),
                allowed: options.join("|"),
            });
        }
    }

    if def.bounds.is_empty() {
        return Ok(());
    }
    let number = match number {
        Some(number) => number,
        None => trimmed.parse::<f64>().map_err(|_| unreadable("number"))?,
    };
    match def.bounds.violation(number) {
        Some(constraint) => Err(ValueError::OutOfRange {
            value: value.to_string(),
            constraint,
        }),
        None => Ok(()),
    }
}

/// Synchronized values compare numerically when both sides are numbers.
fn values_equal(a: &str, b: &str) -> bool {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a.trim() == b.trim(),
    }
}
