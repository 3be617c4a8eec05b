//! A single page and its path from source text to rendered HTML.
//!
//! ## Lifecycle
//!
//! ```text
//! Page::new(path)       path only, everything else empty
//!   │
//!   ├── load()              body_raw  ← file contents (set once)
//!   ├── extract_vars()      page_vars ← declarations in body_raw
//!   ├── strip_vars()        body      ← body_raw minus declarations
//!   ├── replace_includes()  body      ← include directives expanded (optional)
//!   └── render()            rendered_page ← template + body + vars
//! ```
//!
//! Steps are not validated against each other. Calling one before its
//! predecessor leaves its output empty instead of failing: `render` on a
//! page that was never stripped produces no `rendered_page`.
//!
//! ## Rendering
//!
//! 1. Pick the template: the `template` variable, or `base.html`.
//! 2. Fetch it from the [`TemplateStore`].
//! 3. Put the body in place of every `$page_content` token. A template
//!    without the token silently drops the body.
//! 4. Expand include directives in the composed text, so directives from
//!    the template and the body are handled in the same pass.
//! 5. Replace `$name` for each page variable, once, without rescanning.

use crate::cache::{CacheError, IncludeCache, Storage, TemplateStore};
use crate::include::expand_includes;
use crate::vars::{self, PageVars};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Placeholder in templates that receives the page body.
pub const PAGE_CONTENT: &str = "$page_content";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("template not found: {name}")]
    MissingTemplate { name: String },
    #[error("include not found: {name}")]
    MissingInclude { name: String },
    #[error("template error: {0}")]
    Template(#[source] CacheError),
    #[error("include error: {0}")]
    Include(#[source] CacheError),
}

impl RenderError {
    pub(crate) fn from_template(err: CacheError) -> Self {
        match err {
            CacheError::NotFound { name } => Self::MissingTemplate { name },
            other => Self::Template(other),
        }
    }

    pub(crate) fn from_include(err: CacheError) -> Self {
        match err {
            CacheError::NotFound { name } => Self::MissingInclude { name },
            other => Self::Include(other),
        }
    }

    /// Name of the template or include file this error is about.
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::MissingTemplate { name } | Self::MissingInclude { name } => Some(name),
            Self::Template(err) | Self::Include(err) => match err {
                CacheError::NotFound { name }
                | CacheError::InvalidName { name }
                | CacheError::Io { name, .. } => Some(name),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    path: PathBuf,
    body_raw: Option<String>,
    page_vars: PageVars,
    body: Option<String>,
    includes_expanded: bool,
    rendered_page: Option<String>,
}

impl Page {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            body_raw: None,
            page_vars: PageVars::new(),
            body: None,
            includes_expanded: false,
            rendered_page: None,
        }
    }

    /// A page whose source text is already in memory.
    pub fn from_source(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        let mut page = Self::new(path);
        page.body_raw = Some(source.into());
        page
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn body_raw(&self) -> Option<&str> {
        self.body_raw.as_deref()
    }

    pub fn page_vars(&self) -> &PageVars {
        &self.page_vars
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn rendered_page(&self) -> Option<&str> {
        self.rendered_page.as_deref()
    }

    pub fn into_rendered_page(self) -> Option<String> {
        self.rendered_page
    }

    /// Template this page renders with.
    pub fn template_name(&self) -> &str {
        self.page_vars.template()
    }

    /// Read the source file. Does nothing if the page is already loaded.
    pub fn load(&mut self) -> io::Result<()> {
        if self.body_raw.is_none() {
            self.body_raw = Some(fs::read_to_string(&self.path)?);
        }
        Ok(())
    }

    pub fn extract_vars(&mut self) {
        if let Some(raw) = &self.body_raw {
            self.page_vars = vars::extract_vars(raw);
        }
    }

    pub fn strip_vars(&mut self) {
        if let Some(raw) = &self.body_raw {
            self.body = Some(vars::strip_vars(raw));
            self.includes_expanded = false;
        }
    }

    /// `load`, `extract_vars` and `strip_vars` in order.
    pub fn load_and_parse(&mut self) -> io::Result<()> {
        self.load()?;
        self.extract_vars();
        self.strip_vars();
        Ok(())
    }

    /// Expand include directives in the body in place.
    pub fn replace_includes<S: Storage>(
        &mut self,
        includes: &IncludeCache<S>,
    ) -> Result<(), RenderError> {
        if self.includes_expanded {
            return Ok(());
        }
        if let Some(body) = &self.body {
            self.body = Some(expand_includes(body, includes).map_err(RenderError::from_include)?);
            self.includes_expanded = true;
        }
        Ok(())
    }

    /// Compose the template, body and variables into `rendered_page`.
    ///
    /// A page that already rendered keeps its first result.
    pub fn render<T: Storage, I: Storage>(
        &mut self,
        templates: &TemplateStore<T>,
        includes: &IncludeCache<I>,
    ) -> Result<(), RenderError> {
        if self.rendered_page.is_some() {
            return Ok(());
        }
        let Some(body) = &self.body else {
            return Ok(());
        };

        let template = templates
            .get_or_load(self.page_vars.template())
            .map_err(RenderError::from_template)?;

        // A body expanded by `replace_includes` must not be scanned again,
        // so only the template text around the placeholder is expanded.
        let composed = if self.includes_expanded {
            template
                .split(PAGE_CONTENT)
                .map(|piece| expand_includes(piece, includes))
                .collect::<Result<Vec<_>, _>>()
                .map_err(RenderError::from_include)?
                .join(body.as_str())
        } else {
            expand_includes(&template.replace(PAGE_CONTENT, body), includes)
                .map_err(RenderError::from_include)?
        };

        self.rendered_page = Some(vars::substitute_vars(&composed, &self.page_vars));
        Ok(())
    }
}
