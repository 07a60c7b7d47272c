//! Parsing and evaluation of parameter expressions.

use std::sync::Arc;

use super::{ParamValue, Properties};

/// Which activity a property reference reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyScope {
    /// The activity whose parameters are being resolved.
    Executing,
    /// The root activity of the instance.
    Root,
}

/// A parsed parameter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// Literal text, kept verbatim.
    Literal(String),
    /// `@@True` / `@@False`.
    Bool(bool),
    /// `[a,b,c]`.
    List(Vec<String>),
    /// `@Name`, `@Root.Name` or `@R.Name`.
    Property { scope: PropertyScope, name: String },
}

impl Expression {
    /// Parse expression text.
    ///
    /// Only property references can be malformed (`@`, `@Root.`, `@a-b`);
    /// everything else falls back to literal text.
    pub fn parse(text: &str) -> Result<Self, String> {
        if let Some(rest) = text.strip_prefix("@@") {
            return Ok(match rest {
                "True" => Expression::Bool(true),
                "False" => Expression::Bool(false),
                _ => Expression::Literal(format!("@{rest}")),
            });
        }

        if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            let items = if inner.trim().is_empty() {
                Vec::new()
            } else {
                inner.split(',').map(|item| item.trim().to_owned()).collect()
            };
            return Ok(Expression::List(items));
        }

        if let Some(reference) = text.strip_prefix('@') {
            let (scope, name) = match reference
                .strip_prefix("Root.")
                .or_else(|| reference.strip_prefix("R."))
            {
                Some(name) => (PropertyScope::Root, name),
                None => (PropertyScope::Executing, reference),
            };
            if !is_property_name(name) {
                return Err(format!("`{text}` is not a valid property reference"));
            }
            return Ok(Expression::Property {
                scope,
                name: name.to_owned(),
            });
        }

        Ok(Expression::Literal(text.to_owned()))
    }

    /// Evaluate against the executing and root activities.
    ///
    /// Each call builds a fresh value; property reads go through
    /// [`Properties::property`] every time.
    pub fn resolve(
        &self,
        executing: &dyn Properties,
        root: &dyn Properties,
    ) -> Result<ParamValue, String> {
        match self {
            Expression::Literal(text) => Ok(ParamValue::Text(text.clone())),
            Expression::Bool(value) => Ok(ParamValue::Bool(*value)),
            Expression::List(items) => Ok(ParamValue::List(Arc::new(
                items.iter().cloned().map(ParamValue::Text).collect(),
            ))),
            Expression::Property { scope, name } => {
                let (source, label) = match scope {
                    PropertyScope::Executing => (executing, "activity"),
                    PropertyScope::Root => (root, "root activity"),
                };
                source
                    .property(name)
                    .ok_or_else(|| format!("{label} exposes no property `{name}`"))
            }
        }
    }

    /// Returns `true` for property references.
    pub fn is_reference(&self) -> bool {
        matches!(self, Expression::Property { .. })
    }
}

fn is_property_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}
