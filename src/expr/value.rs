//! Typed argument values and their resolution.
//!
//! Raw argument values from a recipe are parsed once, at load time, into an
//! [`ArgValue`] tree (literal | reference | template | composite). Resolving
//! a tree walks it against a [`StaticScope`] and the [`ContextStore`];
//! there is no runtime string re-scanning and no nested expansion.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::context::ContextStore;
use crate::error::{EngineError, Result};

use super::template::{parse_template, Segment};

/// Static lookup scope consulted before the context: recipe parameters and
/// sub-recipe parameter bindings.
#[derive(Debug, Clone, Default)]
pub struct StaticScope {
    values: HashMap<String, Value>,
}

impl StaticScope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scope from name/value pairs.
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Add or replace a binding.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Look up a binding by exact name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Iterate over all bindings.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Whether the scope holds no bindings.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A parsed argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Scalar with no references; passes through unchanged.
    Literal(Value),
    /// A string that is exactly one `${path}`; resolves to the referenced
    /// value with its type preserved.
    Reference(String),
    /// A string with embedded references; resolves by stringifying each
    /// referenced value into the surrounding text.
    Template(Vec<Segment>),
    /// A sequence whose elements are parsed recursively.
    Sequence(Vec<ArgValue>),
    /// A mapping whose values are parsed recursively.
    Mapping(Vec<(String, ArgValue)>),
}

impl ArgValue {
    /// Parse a raw value into its typed form.
    pub fn parse(raw: &Value) -> ArgValue {
        match raw {
            Value::String(s) => {
                let segments = parse_template(s);
                let has_refs = segments
                    .iter()
                    .any(|seg| matches!(seg, Segment::Reference(_)));
                if !has_refs {
                    // No references: collapse back to the (possibly
                    // un-escaped) literal text.
                    let text: String = segments
                        .iter()
                        .map(|seg| match seg {
                            Segment::Literal(text) => text.as_str(),
                            Segment::Reference(_) => unreachable!(),
                        })
                        .collect();
                    return ArgValue::Literal(Value::String(text));
                }
                if let [Segment::Reference(path)] = segments.as_slice() {
                    return ArgValue::Reference(path.clone());
                }
                ArgValue::Template(segments)
            }
            Value::Array(items) => ArgValue::Sequence(items.iter().map(ArgValue::parse).collect()),
            Value::Object(map) => ArgValue::Mapping(
                map.iter()
                    .map(|(k, v)| (k.clone(), ArgValue::parse(v)))
                    .collect(),
            ),
            other => ArgValue::Literal(other.clone()),
        }
    }

    /// Resolve this value against the scope and context.
    pub fn resolve(&self, scope: &StaticScope, context: &ContextStore) -> Result<Value> {
        match self {
            ArgValue::Literal(value) => Ok(value.clone()),
            ArgValue::Reference(path) => lookup(path, scope, context),
            ArgValue::Template(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Literal(text) => out.push_str(text),
                        Segment::Reference(path) => {
                            out.push_str(&stringify(&lookup(path, scope, context)?));
                        }
                    }
                }
                Ok(Value::String(out))
            }
            ArgValue::Sequence(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| item.resolve(scope, context))
                    .collect::<Result<_>>()?,
            )),
            ArgValue::Mapping(pairs) => {
                let mut map = Map::new();
                for (key, value) in pairs {
                    map.insert(key.clone(), value.resolve(scope, context)?);
                }
                Ok(Value::Object(map))
            }
        }
    }
}

/// Parse every value of an argument map.
pub fn parse_args(raw: &Map<String, Value>) -> Vec<(String, ArgValue)> {
    raw.iter()
        .map(|(k, v)| (k.clone(), ArgValue::parse(v)))
        .collect()
}

/// Resolve a parsed argument map into concrete values.
pub fn resolve_args(
    args: &[(String, ArgValue)],
    scope: &StaticScope,
    context: &ContextStore,
) -> Result<Map<String, Value>> {
    let mut out = Map::new();
    for (key, value) in args {
        out.insert(key.clone(), value.resolve(scope, context)?);
    }
    Ok(out)
}

/// Look a dotted path up: static scope first, then context.
pub fn lookup(path: &str, scope: &StaticScope, context: &ContextStore) -> Result<Value> {
    if let Some(value) = scope.get(path) {
        return Ok(value.clone());
    }
    context
        .try_get(path)
        .ok_or_else(|| EngineError::UnresolvedReference {
            reference: path.to_string(),
        })
}

/// Render a value into template text: strings bare, everything else as JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope_xy() -> StaticScope {
        StaticScope::from_values(vec![
            ("x".to_string(), json!(5)),
            ("name".to_string(), json!("demo")),
        ])
    }

    #[test]
    fn scalar_parses_to_literal() {
        assert_eq!(ArgValue::parse(&json!(42)), ArgValue::Literal(json!(42)));
        assert_eq!(ArgValue::parse(&json!(true)), ArgValue::Literal(json!(true)));
        assert_eq!(
            ArgValue::parse(&json!("plain")),
            ArgValue::Literal(json!("plain"))
        );
    }

    #[test]
    fn whole_string_reference_parses_to_reference() {
        assert_eq!(
            ArgValue::parse(&json!("${fetch.result}")),
            ArgValue::Reference("fetch.result".into())
        );
    }

    #[test]
    fn embedded_reference_parses_to_template() {
        assert!(matches!(
            ArgValue::parse(&json!("rows=${count}")),
            ArgValue::Template(_)
        ));
    }

    #[test]
    fn escaped_reference_collapses_to_literal() {
        assert_eq!(
            ArgValue::parse(&json!("$${raw}")),
            ArgValue::Literal(json!("${raw}"))
        );
    }

    #[test]
    fn composites_parse_recursively() {
        let parsed = ArgValue::parse(&json!({"inner": ["${x}", 1]}));
        match parsed {
            ArgValue::Mapping(pairs) => match &pairs[0].1 {
                ArgValue::Sequence(items) => {
                    assert_eq!(items[0], ArgValue::Reference("x".into()));
                    assert_eq!(items[1], ArgValue::Literal(json!(1)));
                }
                other => panic!("expected sequence, got {:?}", other),
            },
            other => panic!("expected mapping, got {:?}", other),
        }
    }

    #[test]
    fn reference_resolution_preserves_type() {
        let ctx = ContextStore::new();
        let value = ArgValue::parse(&json!("${x}"))
            .resolve(&scope_xy(), &ctx)
            .unwrap();
        assert_eq!(value, json!(5));
    }

    #[test]
    fn scope_wins_over_context() {
        let ctx = ContextStore::new();
        ctx.set("x", json!("from-context"), "test");
        let value = ArgValue::parse(&json!("${x}"))
            .resolve(&scope_xy(), &ctx)
            .unwrap();
        assert_eq!(value, json!(5));
    }

    #[test]
    fn context_is_consulted_when_scope_misses() {
        let ctx = ContextStore::new();
        ctx.set("fetch.result", json!([1, 2]), "fetch");
        let value = ArgValue::parse(&json!("${fetch.result}"))
            .resolve(&StaticScope::new(), &ctx)
            .unwrap();
        assert_eq!(value, json!([1, 2]));
    }

    #[test]
    fn template_stringifies_non_strings() {
        let ctx = ContextStore::new();
        ctx.set("count", json!(3), "test");
        let value = ArgValue::parse(&json!("rows=${count}, who=${name}"))
            .resolve(&scope_xy(), &ctx)
            .unwrap();
        assert_eq!(value, json!("rows=3, who=demo"));
    }

    #[test]
    fn missing_reference_fails() {
        let ctx = ContextStore::new();
        let err = ArgValue::parse(&json!("${missing.path}"))
            .resolve(&StaticScope::new(), &ctx)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnresolvedReference { .. }));
    }

    #[test]
    fn resolution_is_single_pass() {
        // A resolved value containing placeholder text is not expanded again.
        let ctx = ContextStore::new();
        ctx.set("outer", json!("${inner}"), "test");
        let value = ArgValue::parse(&json!("${outer}"))
            .resolve(&StaticScope::new(), &ctx)
            .unwrap();
        assert_eq!(value, json!("${inner}"));
    }

    #[test]
    fn resolve_args_resolves_each_entry() {
        let ctx = ContextStore::new();
        ctx.set("a", json!(1), "test");
        let mut raw = Map::new();
        raw.insert("direct".to_string(), json!("${a}"));
        raw.insert("fixed".to_string(), json!("plain"));

        let parsed = parse_args(&raw);
        let resolved = resolve_args(&parsed, &StaticScope::new(), &ctx).unwrap();
        assert_eq!(resolved.get("direct"), Some(&json!(1)));
        assert_eq!(resolved.get("fixed"), Some(&json!("plain")));
    }
}
