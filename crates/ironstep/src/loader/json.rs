//! JSON scheme documents.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::SchemeLoader;
use crate::error::{Error, Result, SourceLocation};
use crate::scheme::{ActivityNode, AuxiliarySchema, Scheme};
use crate::sync::lock;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemeDocument {
    name: String,
    root: ActivityNode,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuxiliaryDocument {
    activities: BTreeMap<String, KindConstraints>,
}

/// Constraints an auxiliary schema places on one activity kind.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct KindConstraints {
    /// Parameters every activity of the kind must declare.
    #[serde(default)]
    parameters: Vec<String>,
    /// Transition keys the kind may use; unrestricted when absent.
    #[serde(default)]
    transitions: Option<Vec<String>>,
    /// Whether the kind must (or must not) own children.
    #[serde(default)]
    composite: Option<bool>,
}

/// Loads schemes from JSON documents.
///
/// URIs resolve to in-memory documents registered with
/// [`with_document`](Self::with_document) first, then to files
/// (`file:///path/to/scheme.json` or a bare path). The document shape is:
///
/// ```json
/// {
///   "name": "approval",
///   "root": { "id": "Approval", "kind": "flow", "start": "Review", "children": [ ... ] }
/// }
/// ```
///
/// See [`ActivityNode`] for the activity shape. Syntax errors are reported
/// with their line and column, validation errors with the activity path.
#[derive(Clone, Default)]
pub struct JsonSchemeLoader {
    documents: Arc<Mutex<HashMap<String, String>>>,
}

impl JsonSchemeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `content` for `uri` without touching the file system.
    pub fn with_document(self, uri: impl Into<String>, content: impl Into<String>) -> Self {
        self.add_document(uri, content);
        self
    }

    /// Register or replace an in-memory document.
    pub fn add_document(&self, uri: impl Into<String>, content: impl Into<String>) {
        lock(&self.documents).insert(uri.into(), content.into());
    }

    /// Parse and validate a scheme document.
    pub fn parse(uri: &str, content: &str, auxiliary: &[AuxiliarySchema]) -> Result<Scheme> {
        let document: SchemeDocument =
            serde_json::from_str(content).map_err(|e| syntax_error(uri, &e))?;
        if document.name.trim().is_empty() {
            return Err(Error::scheme(uri, SourceLocation::Unknown, "scheme name cannot be empty"));
        }

        for schema in auxiliary {
            let constraints: AuxiliaryDocument = serde_json::from_str(&schema.content)
                .map_err(|e| syntax_error(&schema.name, &e))?;
            check_constraints(uri, &document.root, document.root.id(), &constraints)?;
        }

        Scheme::build(document.name, uri, &document.root, auxiliary.to_vec())
    }

    async fn read_source(&self, uri: &str) -> Result<String> {
        let cached = lock(&self.documents).get(uri).cloned();
        if let Some(content) = cached {
            return Ok(content);
        }
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        Ok(tokio::fs::read_to_string(Path::new(path)).await?)
    }
}

#[async_trait]
impl SchemeLoader for JsonSchemeLoader {
    async fn create_instance(
        &self,
        scheme_uri: &str,
        auxiliary_schemas: &[AuxiliarySchema],
    ) -> Result<Arc<Scheme>> {
        if scheme_uri.trim().is_empty() {
            return Err(Error::Precondition("scheme URI cannot be empty"));
        }
        let content = self.read_source(scheme_uri).await?;
        let scheme = Self::parse(scheme_uri, &content, auxiliary_schemas)?;
        debug!(
            scheme_uri,
            scheme = scheme.name(),
            activities = scheme.len(),
            "Loaded scheme"
        );
        Ok(Arc::new(scheme))
    }
}

impl std::fmt::Debug for JsonSchemeLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchemeLoader")
            .field("documents", &lock(&self.documents).len())
            .finish()
    }
}

fn syntax_error(uri: &str, error: &serde_json::Error) -> Error {
    let full = error.to_string();
    let suffix = format!(" at line {} column {}", error.line(), error.column());
    let message = full.strip_suffix(&suffix).unwrap_or(&full);
    let location = if error.line() == 0 {
        SourceLocation::Unknown
    } else {
        SourceLocation::Position {
            line: error.line(),
            column: error.column(),
        }
    };
    Error::scheme(uri, location, message)
}

fn check_constraints(
    uri: &str,
    node: &ActivityNode,
    path: &str,
    document: &AuxiliaryDocument,
) -> Result<()> {
    if let Some(constraints) = document.activities.get(node.kind()) {
        let invalid = |message: String| {
            Error::scheme(uri, SourceLocation::Activity(path.to_owned()), message)
        };

        for required in &constraints.parameters {
            if !node.parameter_names().any(|name| name == required) {
                return Err(invalid(format!(
                    "kind `{}` requires parameter `{required}`",
                    node.kind()
                )));
            }
        }
        if let Some(allowed) = &constraints.transitions {
            if let Some(key) = node.transition_keys().find(|key| !allowed.iter().any(|a| a == key)) {
                return Err(invalid(format!(
                    "kind `{}` does not allow transition `{key}`",
                    node.kind()
                )));
            }
        }
        if let Some(composite) = constraints.composite {
            if composite == node.children().is_empty() {
                let expected = if composite { "must" } else { "cannot" };
                return Err(invalid(format!(
                    "kind `{}` {expected} have children",
                    node.kind()
                )));
            }
        }
    }

    for child in node.children() {
        check_constraints(uri, child, &format!("{path}/{}", child.id()), document)?;
    }
    Ok(())
}
