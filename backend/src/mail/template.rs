//! Template-based mail bodies.
//!
//! Templates are tera files below a fixed root directory, chosen at startup.
//! Names coming off the queue are resolved against that root and may not
//! leave it.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use tera::{Context, Tera};
use thiserror::Error;
use tracing::debug;

use super::{error_chain, MailError};

#[derive(Debug, Error)]
pub enum TemplateRootError {
    #[error("template root {path:?} is not accessible: {source}")]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("template root {0:?} is not a directory")]
    NotADirectory(PathBuf),
}

/// Renders templates found below a validated root directory.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    root: PathBuf,
}

impl TemplateRenderer {
    /// Use `root` as the template directory. It must exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, TemplateRootError> {
        let path = root.as_ref();
        let root = fs::canonicalize(path).map_err(|source| TemplateRootError::Inaccessible {
            path: path.to_path_buf(),
            source,
        })?;

        if !root.is_dir() {
            return Err(TemplateRootError::NotADirectory(root));
        }

        Ok(Self { root })
    }

    /// The canonical template root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a template name to a file inside the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, MailError> {
        if name.trim().is_empty() {
            return Err(MailError::Template("template name is empty".to_string()));
        }

        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(MailError::Template(format!(
                "template name {name:?} must be a relative path inside the template root"
            )));
        }

        let path = fs::canonicalize(self.root.join(relative))
            .map_err(|e| MailError::Template(format!("template {name:?} not found: {e}")))?;

        // Symlinks can still point outside.
        if !path.starts_with(&self.root) {
            return Err(MailError::Template(format!(
                "template {name:?} resolves outside the template root"
            )));
        }

        Ok(path)
    }

    /// Render the template `name` with `data` as its context.
    ///
    /// `data` must be a JSON object or null. Output is HTML-escaped.
    pub fn render(&self, name: &str, data: &Value) -> Result<String, MailError> {
        let path = self.resolve(name)?;

        let source = fs::read_to_string(&path)
            .map_err(|e| MailError::Template(format!("failed to read template {name:?}: {e}")))?;

        let context = match data {
            Value::Null => Context::new(),
            other => Context::from_serialize(other)
                .map_err(|e| MailError::Template(format!("invalid template data: {}", error_chain(&e))))?,
        };

        let rendered = Tera::one_off(&source, &context, true)
            .map_err(|e| MailError::Template(format!("failed to render {name:?}: {}", error_chain(&e))))?;

        debug!(
            template = name,
            rendered_length = rendered.len(),
            "mail_template_rendered"
        );

        Ok(rendered)
    }
}
