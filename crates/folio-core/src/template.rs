//! Placeholder substitution and the per-run template set.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::row::Row;

/// File extension of typesetting templates.
pub const TEMPLATE_EXTENSION: &str = "typ";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("placeholder pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to read template directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read template {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no .typ templates found in {}", path.display())]
    NoTemplates { path: PathBuf },
}

/// Substitute `{{field}}` tokens with row values.
///
/// Tokens naming a missing (or null) field are left as they are.
pub fn render(template: &str, row: &Row) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            row.display_value(&caps[1])
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Templates loaded once per run, keyed by file name, ordered by name.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: IndexMap<String, Arc<str>>,
}

impl TemplateSet {
    /// Build from in-memory `(name, content)` pairs.
    pub fn from_pairs<I, N, C>(pairs: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<Arc<str>>,
    {
        let mut templates: IndexMap<String, Arc<str>> = pairs
            .into_iter()
            .map(|(n, c)| (n.into(), c.into()))
            .collect();
        if templates.is_empty() {
            return Err(TemplateError::NoTemplates {
                path: PathBuf::new(),
            });
        }
        templates.sort_keys();
        Ok(Self { templates })
    }

    /// Read every `*.typ` file directly inside `dir`.
    pub async fn load_dir(dir: &Path) -> Result<Self, TemplateError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|source| TemplateError::ReadDir {
                path: dir.to_path_buf(),
                source,
            })?;

        let mut templates = IndexMap::new();
        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|source| TemplateError::ReadDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
            let Some(entry) = entry else { break };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
                continue;
            }
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| TemplateError::ReadFile {
                    path: path.clone(),
                    source,
                })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            templates.insert(name, Arc::<str>::from(content));
        }

        if templates.is_empty() {
            return Err(TemplateError::NoTemplates {
                path: dir.to_path_buf(),
            });
        }
        templates.sort_keys();
        tracing::info!(dir = %dir.display(), count = templates.len(), "loaded templates");
        Ok(Self { templates })
    }

    /// The template every row is rendered with.
    pub fn primary(&self) -> (&str, Arc<str>) {
        let (name, content) = self
            .templates
            .first()
            .expect("TemplateSet is never empty");
        (name.as_str(), Arc::clone(content))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}
