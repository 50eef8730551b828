//! Upgrade context: the document batch travelling through the pipeline

use serde_json::Value;

use crate::types::SchemaVersion;

use super::{CURRENT_SCHEMA_VERSION, LEGACY_BASE_VERSION};

/// One submitted document and whether it is still upgradeable
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeDocument {
    node: Value,
    error: Option<String>,
}

impl UpgradeDocument {
    pub fn new(node: Value) -> Self {
        let error = if node.is_object() {
            None
        } else {
            Some("document is not a JSON object".to_string())
        };
        Self { node, error }
    }

    pub fn node(&self) -> &Value {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut Value {
        &mut self.node
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// Why the document was dropped, if it was
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn invalidate(&mut self, reason: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(reason.into());
        }
    }

    pub fn into_node(self) -> Value {
        self.node
    }
}

/// A batch of raw documents plus the metadata needed to upgrade them.
///
/// `version` only ever moves forward while the pipeline runs.
#[derive(Debug, Clone)]
pub struct UpgradeContext {
    documents: Vec<UpgradeDocument>,
    version: SchemaVersion,
    user_agent: Option<String>,
    failure: Option<String>,
}

impl UpgradeContext {
    /// Build a context from raw text, detecting the schema version from the
    /// documents themselves
    pub fn from_json(text: &str) -> Self {
        Self::with_declared(text, None, None)
    }

    /// Build a context from raw text with an optional declared version and
    /// client identity. A declared version wins over detection.
    pub fn with_declared(
        text: &str,
        version: Option<SchemaVersion>,
        user_agent: Option<&str>,
    ) -> Self {
        let user_agent = user_agent.map(str::to_string);

        let documents = match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Array(items)) => items,
            Ok(node) => vec![node],
            Err(e) => {
                return Self {
                    documents: Vec::new(),
                    version: version.unwrap_or(CURRENT_SCHEMA_VERSION),
                    user_agent,
                    failure: Some(format!("payload is not JSON: {}", e)),
                };
            }
        };

        Self::from_documents(documents, version, user_agent.as_deref())
    }

    /// Build a context from already-parsed document nodes
    pub fn from_documents(
        documents: Vec<Value>,
        version: Option<SchemaVersion>,
        user_agent: Option<&str>,
    ) -> Self {
        let version = version
            .or_else(|| documents.first().and_then(detect_version))
            .unwrap_or(CURRENT_SCHEMA_VERSION);

        Self {
            documents: documents.into_iter().map(UpgradeDocument::new).collect(),
            version,
            user_agent: user_agent.map(str::to_string),
            failure: None,
        }
    }

    pub fn documents(&self) -> &[UpgradeDocument] {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut [UpgradeDocument] {
        &mut self.documents
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// False once the batch as a whole could not be brought to canonical form
    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn valid_documents(&self) -> impl Iterator<Item = &Value> {
        self.documents
            .iter()
            .filter(|d| d.is_valid())
            .map(UpgradeDocument::node)
    }

    pub fn invalid_count(&self) -> usize {
        self.documents.iter().filter(|d| !d.is_valid()).count()
    }

    /// Move the declared version forward; never backwards
    pub(crate) fn advance_version(&mut self, version: SchemaVersion) {
        if version > self.version {
            self.version = version;
        }
    }

    /// Mark the whole batch unusable
    pub(crate) fn invalidate(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        for document in &mut self.documents {
            document.invalidate(reason.clone());
        }
        if self.failure.is_none() {
            self.failure = Some(reason);
        }
    }

    /// Valid documents as a canonical JSON array
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        let nodes: Vec<&Value> = self.valid_documents().collect();
        serde_json::to_string(&nodes)
    }

    pub fn into_valid_documents(self) -> Vec<Value> {
        self.documents
            .into_iter()
            .filter(UpgradeDocument::is_valid)
            .map(UpgradeDocument::into_node)
            .collect()
    }
}

/// Infer a document's schema version from its shape
fn detect_version(node: &Value) -> Option<SchemaVersion> {
    let declared = node
        .get("ExceptionlessClientInfo")
        .and_then(|info| info.get("Version"))
        .and_then(Value::as_str)
        .and_then(SchemaVersion::parse_lenient);
    if declared.is_some() {
        return declared;
    }

    if node.get("Error").is_some() || node.get("ErrorStackId").is_some() {
        return Some(LEGACY_BASE_VERSION);
    }

    None
}
