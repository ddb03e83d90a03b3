//! Workflow template repository (C6): loads and structurally validates
//! compiled template JSON from a filesystem tree.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::domain::error::CoreError;
use crate::domain::graph::validate_graph;

fn template_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+/v[0-9]+$").expect("valid regex"))
}

/// Loads compiled workflow templates by key, e.g. `birth_de/v1`.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn load(&self, template_key: &str) -> Result<Value, CoreError>;
}

/// Reads `<root>/<event>/v<N>/compiled.json` off disk.
pub struct FsTemplateRepository {
    root: PathBuf,
}

impl FsTemplateRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn compiled_path(&self, template_key: &str) -> PathBuf {
        let (event, version) = template_key.split_once('/').expect("key already validated");
        self.root.join(event).join(version).join("compiled.json")
    }
}

#[async_trait]
impl TemplateRepository for FsTemplateRepository {
    async fn load(&self, template_key: &str) -> Result<Value, CoreError> {
        if !template_key_re().is_match(template_key) {
            return Err(CoreError::TemplateNotFound(template_key.to_string()));
        }

        let path: &Path = &self.compiled_path(template_key);
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| CoreError::TemplateNotFound(template_key.to_string()))?;

        let parsed: Value = serde_json::from_str(&raw)
            .map_err(|e| CoreError::PlannerInputInvalid(format!("malformed template json: {e}")))?;

        if !parsed.is_object() {
            return Err(CoreError::PlannerInputInvalid(
                "compiled template must be a JSON object".into(),
            ));
        }

        validate_graph(&parsed).map_err(CoreError::from)?;

        Ok(parsed)
    }
}
