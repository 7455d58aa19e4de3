//! # Template Rendering
//!
//! Turns a template identifier plus key/value [`Bindings`] into text with
//! [Tera](https://keats.github.io/tera/), a Jinja2-style engine. Rendering
//! is pure and deterministic; [`TemplateRenderer::render_to_file`] renders
//! fully in memory before anything touches the destination.
//!
//! Built-in templates are registered once per renderer. A template
//! directory, when configured, is consulted first: `<dir>/<id>.tmpl`
//! replaces the built-in of the same identifier.
//!
//! ```rust
//! use podnet::template::{Bindings, TemplateRenderer};
//!
//! let renderer = TemplateRenderer::new();
//! let bindings = Bindings::new()
//!     .scalar("name", "web1")
//!     .scalar("image", "nginx:latest")
//!     .list("mounts", ["/a:/b:ro"])
//!     .list("ports", Vec::<String>::new())
//!     .list("environment_variables", ["MODE=prod"])
//!     .scalar("attach_script", "/srv/web1/attach.sh");
//!
//! let unit = renderer.render("container/container", &bindings).unwrap();
//! assert!(unit.contains("Volume=/a:/b:ro\n"));
//! assert!(!unit.contains("PublishPort="));
//! ```

use regex::Regex;
use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tera::{Context, Tera};
use tracing::{debug, warn};

/// Built-in templates and their identifiers.
pub mod builtin;

/// Extension of template override files
pub const TEMPLATE_EXTENSION: &str = "tmpl";

/// How Tera reports an undefined variable somewhere in its error chain
static UNDEFINED_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Variable `([^`]+)` not found").expect("undefined variable pattern is valid")
});

/// Key/value bindings for a render call
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    context: Context,
}

impl Bindings {
    /// Create empty bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a scalar value
    pub fn scalar(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key, &value.to_string());
        self
    }

    /// Bind a path as a scalar value
    pub fn path(self, key: impl Into<String>, value: &Path) -> Self {
        self.scalar(key, value.display())
    }

    /// Bind a list value, iterated with `{% for item in key %}`
    pub fn list<I, S>(mut self, key: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<String> = items.into_iter().map(Into::into).collect();
        self.context.insert(key, &items);
        self
    }

    /// Look up a binding
    pub fn get(&self, key: &str) -> Option<&tera::Value> {
        self.context.get(key)
    }
}

/// Template rendering errors
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// No template with this identifier exists
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    /// The template references a key that has no binding
    #[error("Template '{template}' references unbound key '{key}'")]
    MissingBinding {
        /// Template identifier
        template: String,
        /// Unbound key
        key: String,
    },

    /// The template does not parse or fails to evaluate
    #[error("Template '{template}' failed: {message}")]
    Template {
        /// Template identifier
        template: String,
        /// Tera's message, with its causes
        message: String,
    },

    /// Reading an override or writing the output failed
    #[error("Template IO error at {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    fn from_tera(template: &str, error: tera::Error) -> Self {
        if let tera::ErrorKind::TemplateNotFound(name) = &error.kind {
            return RenderError::UnknownTemplate(name.clone());
        }

        let mut message = error.to_string();
        let mut source = std::error::Error::source(&error);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        match UNDEFINED_VARIABLE.captures(&message) {
            Some(captures) => RenderError::MissingBinding {
                template: template.to_string(),
                key: captures[1].to_string(),
            },
            None => RenderError::Template {
                template: template.to_string(),
                message,
            },
        }
    }
}

/// Renders built-in or overridden templates
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    tera: Tera,
    template_dir: Option<PathBuf>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    /// Renderer using only the built-in templates
    pub fn new() -> Self {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());

        for (id, source) in builtin::ALL {
            if let Err(e) = tera.add_raw_template(id, source) {
                warn!("Failed to add built-in template {}: {}", id, e);
            }
        }

        Self {
            tera,
            template_dir: None,
        }
    }

    /// Renderer that prefers `<dir>/<id>.tmpl` over the built-ins
    pub fn with_template_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            template_dir: Some(dir.into()),
            ..Self::new()
        }
    }

    /// Tera instance for `id`: the built-ins, plus the override when one exists
    fn engine_for(&self, id: &str) -> Result<Cow<'_, Tera>, RenderError> {
        let Some(dir) = &self.template_dir else {
            return Ok(Cow::Borrowed(&self.tera));
        };

        let path = dir.join(format!("{}.{}", id, TEMPLATE_EXTENSION));
        if !path.is_file() {
            return Ok(Cow::Borrowed(&self.tera));
        }

        debug!("Loading template override {}", path.display());
        let source = std::fs::read_to_string(&path).map_err(|source| RenderError::Io { path, source })?;
        let mut tera = self.tera.clone();
        tera.add_raw_template(id, &source)
            .map_err(|e| RenderError::from_tera(id, e))?;
        Ok(Cow::Owned(tera))
    }

    /// Render a template to text
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown template, a missing binding or a
    /// template that does not parse.
    pub fn render(&self, id: &str, bindings: &Bindings) -> Result<String, RenderError> {
        let tera = self.engine_for(id)?;
        tera.render(id, &bindings.context)
            .map_err(|e| RenderError::from_tera(id, e))
    }

    /// Render a template and install the result at `path`.
    ///
    /// The output is written to a sibling temporary file and renamed over
    /// `path`, replacing any existing file. Nothing is written when
    /// rendering fails. Returns the rendered text.
    pub fn render_to_file(
        &self,
        id: &str,
        bindings: &Bindings,
        path: &Path,
    ) -> Result<String, RenderError> {
        let rendered = self.render(id, bindings)?;
        write_atomically(path, rendered.as_bytes())?;
        debug!("Rendered {} to {}", id, path.display());
        Ok(rendered)
    }
}

/// Write `contents` next to `path` and rename it into place
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), RenderError> {
    let io_error = |source: std::io::Error| RenderError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::NamedTempFile::new_in(parent).map_err(io_error)?;
    file.write_all(contents).map_err(io_error)?;
    file.as_file().sync_all().map_err(io_error)?;
    file.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}
