//! Build pipeline driver.
//!
//! Turns a project directory into a rendered output tree:
//!
//! ```text
//! build()
//!     │
//!     ├── check_required_paths   templates/base.html must exist (fatal)
//!     ├── check_output_dir       output must not be or contain a source dir
//!     ├── clean_build_path       only with --clean
//!     ├── collect_pages          pages/**/*.{html,htm}
//!     │
//!     ├── per page, in parallel:
//!     │       load → extract_vars → strip_vars → render → write
//!     │       failures are collected, never abort other pages
//!     │
//!     └── merge assets           templates/static/, then static/
//!                                → build/static/ (no overwrite)
//! ```
//!
//! ## Failure policy
//!
//! Anything that prevents every page from rendering (no base template, an
//! output directory that overlaps the sources or cannot be created, pages
//! cannot be listed) is a [`BuildError`] and stops the build before
//! rendering starts. A missing
//! named template or include, or an unreadable/unwritable page, only fails
//! that page: it is recorded as a [`PageFailure`] in the [`BuildReport`]
//! and the remaining pages still build.
//!
//! ## Shared state
//!
//! The only state shared between rayon workers is the [`TemplateStore`] and
//! [`IncludeCache`]; each page writes a distinct output path.

use crate::cache::{CacheStats, IncludeCache, Storage, TemplateStore};
use crate::config::{SitePaths, SiteConfig};
use crate::files::{FileManager, FilesError, MergeStats};
use crate::include::referenced_includes;
use crate::page::{PAGE_CONTENT, Page, RenderError};
use crate::scan::{self, ScanError};
use rayon::prelude::*;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{0}")]
    Files(#[from] FilesError),
    #[error("{0}")]
    Scan(#[from] ScanError),
}

/// Why a single page failed.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("failed to read page: {0}")]
    Read(#[source] io::Error),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A page that did not build, with the reason.
#[derive(Debug)]
pub struct PageFailure {
    /// Page path relative to the pages directory.
    pub page: PathBuf,
    pub error: PageError,
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.page.display(), self.error)
    }
}

impl std::error::Error for PageFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Remove the output directory before building.
    pub clean: bool,
}

/// Progress events emitted while building, for the CLI to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    Cleaned { output: PathBuf },
    PagesFound { count: usize },
    PageWritten { page: PathBuf },
    PageFailed { page: PathBuf, reason: String },
    AssetsMerged { source: PathBuf, stats: MergeStats },
}

/// Outcome of a build that got as far as rendering.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub output: PathBuf,
    pub cleaned: bool,
    /// Successfully written pages, relative to the output directory.
    pub written: Vec<PathBuf>,
    pub failures: Vec<PageFailure>,
    pub assets: MergeStats,
    pub templates: CacheStats,
    pub includes: CacheStats,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Build the site rooted at `root`.
pub fn build(
    root: &Path,
    config: &SiteConfig,
    options: &BuildOptions,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildReport, BuildError> {
    let paths = config.paths(root);
    let emit = |event: BuildEvent| {
        if let Some(tx) = &events {
            tx.send(event).ok();
        }
    };

    FileManager::check_required_paths(&paths.templates)?;

    let files = FileManager::new(&paths.output);
    files.check_output_dir(&[
        root,
        paths.pages.as_path(),
        paths.templates.as_path(),
        paths.site_static.as_path(),
    ])?;
    let cleaned = options.clean && files.clean_build_path()?;
    if cleaned {
        emit(BuildEvent::Cleaned {
            output: paths.output.clone(),
        });
    }
    files.create_out_dir()?;

    let pages = scan::collect_pages(&paths.pages, &config.page_extensions)?;
    emit(BuildEvent::PagesFound { count: pages.len() });

    let templates = TemplateStore::from_dir(&paths.templates);
    let includes = IncludeCache::from_dir(&paths.includes);

    let outcomes: Vec<Result<PathBuf, PageFailure>> = pages
        .par_iter()
        .map(|rel| {
            let outcome = build_page(rel, &paths, &templates, &includes, &files);
            match &outcome {
                Ok(_) => emit(BuildEvent::PageWritten { page: rel.clone() }),
                Err(failure) => emit(BuildEvent::PageFailed {
                    page: rel.clone(),
                    reason: failure.error.to_string(),
                }),
            }
            outcome
        })
        .collect();

    let mut written = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(rel) => written.push(rel),
            Err(failure) => failures.push(failure),
        }
    }

    let template_assets = files.copy_template_assets(&paths.template_static)?;
    let site_assets = files.copy_site_assets(&paths.site_static)?;
    let mut assets = MergeStats::default();
    for (source, stats) in [
        (&paths.template_static, template_assets),
        (&paths.site_static, site_assets),
    ] {
        if stats != MergeStats::default() {
            emit(BuildEvent::AssetsMerged {
                source: source.clone(),
                stats,
            });
        }
        assets += stats;
    }

    Ok(BuildReport {
        output: paths.output,
        cleaned,
        written,
        failures,
        assets,
        templates: templates.stats(),
        includes: includes.stats(),
    })
}

/// Load, render, and write one page.
fn build_page<T: Storage, I: Storage>(
    rel: &Path,
    paths: &SitePaths,
    templates: &TemplateStore<T>,
    includes: &IncludeCache<I>,
    files: &FileManager,
) -> Result<PathBuf, PageFailure> {
    let fail = |error: PageError| PageFailure {
        page: rel.to_path_buf(),
        error,
    };

    let mut page = Page::new(paths.pages.join(rel));
    page.load_and_parse().map_err(|e| fail(PageError::Read(e)))?;
    page.render(templates, includes)
        .map_err(|e| fail(PageError::Render(e)))?;

    let html = page.into_rendered_page().unwrap_or_default();
    files.write_page(rel, &html).map_err(|source| {
        fail(PageError::Write {
            path: files.out_dir().join(rel),
            source,
        })
    })?;
    Ok(rel.to_path_buf())
}

/// Result of validating a project without writing output.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub pages: usize,
    /// Distinct templates referenced across all pages.
    pub templates: Vec<String>,
    /// Distinct includes referenced across all pages and their templates.
    pub includes: Vec<String>,
    pub failures: Vec<PageFailure>,
}

impl CheckReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Verify that every page loads and every template and include it needs exists.
///
/// Unlike [`build`], all problems of a page are reported, not just the first.
pub fn check(root: &Path, config: &SiteConfig) -> Result<CheckReport, BuildError> {
    let paths = config.paths(root);
    FileManager::check_required_paths(&paths.templates)?;

    let pages = scan::collect_pages(&paths.pages, &config.page_extensions)?;
    let templates = TemplateStore::from_dir(&paths.templates);
    let includes = IncludeCache::from_dir(&paths.includes);

    let mut report = CheckReport {
        pages: pages.len(),
        ..CheckReport::default()
    };
    for rel in &pages {
        let fail = |error: PageError| PageFailure {
            page: rel.clone(),
            error,
        };

        let mut page = Page::new(paths.pages.join(rel));
        if let Err(e) = page.load_and_parse() {
            report.failures.push(fail(PageError::Read(e)));
            continue;
        }

        let template_name = page.template_name().to_string();
        push_unique(&mut report.templates, &template_name);
        let template = match templates.get_or_load(&template_name) {
            Ok(template) => Some(template),
            Err(e) => {
                report.failures.push(fail(PageError::Render(RenderError::from_template(e))));
                None
            }
        };

        let body = page.body().unwrap_or_default();
        let template_text = template.as_deref().unwrap_or_default();
        // Only the template pieces outside $page_content and the body itself
        // are scanned, matching what render expands.
        let sources = template_text.split(PAGE_CONTENT).chain(std::iter::once(body));
        let mut seen: Vec<&str> = Vec::new();
        for text in sources {
            for name in referenced_includes(text) {
                if seen.contains(&name) {
                    continue;
                }
                seen.push(name);
                push_unique(&mut report.includes, name);
                if let Err(e) = includes.get_or_load(name) {
                    report.failures.push(fail(PageError::Render(RenderError::from_include(e))));
                }
            }
        }
    }
    Ok(report)
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use std::fs;
    use tempfile::TempDir;

    fn minimal_site() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "templates/base.html", "<main>$page_content</main>");
        write_file(tmp.path(), "pages/index.html", "<!-- title = \"Home\" --><h1>$title</h1>");
        tmp
    }

    #[test]
    fn builds_fixture_site() {
        let tmp = setup_fixtures();
        let report = build(tmp.path(), &SiteConfig::default(), &BuildOptions::default(), None).unwrap();

        assert!(report.is_success(), "failures: {:?}", report.failures);
        assert_eq!(
            report.written,
            vec![
                PathBuf::from("about.html"),
                PathBuf::from("blog/first-post.html"),
                PathBuf::from("index.html"),
            ]
        );
        let index = read_output(tmp.path(), "index.html");
        assert!(index.contains("<title>Home</title>"));
        assert!(!index.contains("$page_content"));
    }

    #[test]
    fn output_mirrors_page_paths() {
        let tmp = minimal_site();
        write_file(tmp.path(), "pages/docs/deep/guide.htm", "guide");
        build(tmp.path(), &SiteConfig::default(), &BuildOptions::default(), None).unwrap();

        assert_eq!(read_output(tmp.path(), "index.html"), "<main><h1>Home</h1></main>");
        assert_eq!(read_output(tmp.path(), "docs/deep/guide.htm"), "<main>guide</main>");
    }

    #[test]
    fn missing_base_template_is_fatal_before_rendering() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "pages/index.html", "x");

        let err = build(tmp.path(), &SiteConfig::default(), &BuildOptions::default(), None)
            .unwrap_err();
        assert!(matches!(err, BuildError::Files(FilesError::MissingBaseTemplate(_))));
        assert!(!tmp.path().join("build").exists());
    }

    #[test]
    fn missing_named_template_fails_only_that_page() {
        let tmp = minimal_site();
        write_file(tmp.path(), "pages/broken.html", "<!-- template = \"nope.html\" -->x");
        write_file(tmp.path(), "pages/other.html", "fine");

        let report = build(tmp.path(), &SiteConfig::default(), &BuildOptions::default(), None).unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.page, PathBuf::from("broken.html"));
        assert!(matches!(
            failure.error,
            PageError::Render(RenderError::MissingTemplate { ref name }) if name == "nope.html"
        ));
        let message = failure.to_string();
        assert!(message.contains("broken.html") && message.contains("nope.html"));

        assert_eq!(report.written, vec![PathBuf::from("index.html"), PathBuf::from("other.html")]);
        assert!(!tmp.path().join("build/broken.html").exists());
        assert_eq!(read_output(tmp.path(), "other.html"), "<main>fine</main>");
    }

    #[test]
    fn missing_include_fails_only_that_page() {
        let tmp = minimal_site();
        write_file(tmp.path(), "pages/broken.html", "<!-- include(\"gone.html\") -->");

        let report = build(tmp.path(), &SiteConfig::default(), &BuildOptions::default(), None).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].error,
            PageError::Render(RenderError::MissingInclude { .. })
        ));
        assert_eq!(report.written, vec![PathBuf::from("index.html")]);
    }

    #[test]
    fn shared_template_and_include_read_once() {
        let tmp = minimal_site();
        write_file(
            tmp.path(),
            "templates/base.html",
            "<!-- include(\"nav.html\") --><main>$page_content</main>",
        );
        write_file(tmp.path(), "templates/includes/nav.html", "<nav/>");
        for i in 0..10 {
            write_file(tmp.path(), &format!("pages/p{i}.html"), "page");
        }

        let report = build(tmp.path(), &SiteConfig::default(), &BuildOptions::default(), None).unwrap();
        assert_eq!(report.written.len(), 11);
        assert_eq!(report.templates.reads, 1);
        assert_eq!(report.includes.reads, 1);
        assert_eq!(read_output(tmp.path(), "p3.html"), "<nav/><main>page</main>");
    }

    #[test]
    fn output_dir_at_project_root_is_rejected() {
        let tmp = setup_fixtures();
        let config = SiteConfig {
            output_dir: ".".into(),
            ..SiteConfig::default()
        };

        let err = build(tmp.path(), &config, &BuildOptions { clean: true }, None).unwrap_err();
        assert!(matches!(err, BuildError::Files(FilesError::UnsafeOutputDir { .. })));
        assert!(tmp.path().join("pages/index.html").is_file());
        assert!(tmp.path().join("templates/base.html").is_file());
    }

    #[test]
    fn output_dir_equal_to_pages_dir_is_rejected() {
        let tmp = setup_fixtures();
        let config = SiteConfig {
            output_dir: "pages".into(),
            ..SiteConfig::default()
        };
        let before = fs::read_to_string(tmp.path().join("pages/index.html")).unwrap();

        for clean in [true, false] {
            let err = build(tmp.path(), &config, &BuildOptions { clean }, None).unwrap_err();
            assert!(matches!(
                err,
                BuildError::Files(FilesError::UnsafeOutputDir { ref protected, .. })
                    if protected.ends_with("pages")
            ));
        }
        assert_eq!(fs::read_to_string(tmp.path().join("pages/index.html")).unwrap(), before);
    }

    #[test]
    fn output_dir_containing_templates_is_rejected() {
        let tmp = minimal_site();
        let config = SiteConfig {
            templates_dir: "site/templates".into(),
            output_dir: "site".into(),
            ..SiteConfig::default()
        };
        write_file(tmp.path(), "site/templates/base.html", "$page_content");

        let err = build(tmp.path(), &config, &BuildOptions::default(), None).unwrap_err();
        assert!(matches!(err, BuildError::Files(FilesError::UnsafeOutputDir { .. })));
    }

    #[test]
    fn clean_removes_stale_output() {
        let tmp = minimal_site();
        write_file(tmp.path(), "build/stale.html", "old");

        let report = build(
            tmp.path(),
            &SiteConfig::default(),
            &BuildOptions { clean: true },
            None,
        )
        .unwrap();
        assert!(report.cleaned);
        assert!(!tmp.path().join("build/stale.html").exists());
        assert!(tmp.path().join("build/index.html").exists());
    }

    #[test]
    fn without_clean_stale_output_kept() {
        let tmp = minimal_site();
        write_file(tmp.path(), "build/stale.html", "old");

        let report = build(tmp.path(), &SiteConfig::default(), &BuildOptions::default(), None).unwrap();
        assert!(!report.cleaned);
        assert!(tmp.path().join("build/stale.html").exists());
    }

    #[test]
    fn assets_merged_template_first() {
        let tmp = minimal_site();
        write_file(tmp.path(), "templates/static/css/main.css", "template");
        write_file(tmp.path(), "static/css/main.css", "site");
        write_file(tmp.path(), "static/js/app.js", "app");

        let report = build(tmp.path(), &SiteConfig::default(), &BuildOptions::default(), None).unwrap();
        assert_eq!(report.assets, MergeStats { copied: 2, skipped: 1 });
        assert_eq!(read_output(tmp.path(), "static/css/main.css"), "template");
        assert_eq!(read_output(tmp.path(), "static/js/app.js"), "app");
    }

    #[test]
    fn custom_layout_from_config() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "layout/base.html", "[$page_content]");
        write_file(tmp.path(), "layout/partials/x.html", "X");
        write_file(tmp.path(), "src/a.shtml", "<!-- include(\"x.html\") -->");
        let config = SiteConfig {
            pages_dir: "src".into(),
            templates_dir: "layout".into(),
            includes_dir: "partials".into(),
            output_dir: "public".into(),
            page_extensions: vec!["shtml".into()],
            ..SiteConfig::default()
        };

        let report = build(tmp.path(), &config, &BuildOptions::default(), None).unwrap();
        assert!(report.is_success());
        assert_eq!(
            fs::read_to_string(tmp.path().join("public/a.shtml")).unwrap(),
            "[X]"
        );
    }

    #[test]
    fn events_report_progress() {
        let tmp = minimal_site();
        write_file(tmp.path(), "pages/broken.html", "<!-- template = \"nope.html\" -->");
        let (tx, rx) = std::sync::mpsc::channel();

        build(tmp.path(), &SiteConfig::default(), &BuildOptions::default(), Some(tx)).unwrap();
        let events: Vec<BuildEvent> = rx.iter().collect();

        assert_eq!(events[0], BuildEvent::PagesFound { count: 2 });
        assert!(events.contains(&BuildEvent::PageWritten {
            page: PathBuf::from("index.html")
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            BuildEvent::PageFailed { page, reason }
                if page == Path::new("broken.html") && reason.contains("nope.html")
        )));
    }

    // =========================================================================
    // check
    // =========================================================================

    #[test]
    fn check_fixture_site_passes() {
        let tmp = setup_fixtures();
        let report = check(tmp.path(), &SiteConfig::default()).unwrap();
        assert!(report.is_success(), "failures: {:?}", report.failures);
        assert_eq!(report.pages, 3);
        assert!(report.templates.contains(&"base.html".to_string()));
        assert!(report.templates.contains(&"post.html".to_string()));
        assert!(!tmp.path().join("build").exists());
    }

    #[test]
    fn check_reports_every_missing_resource() {
        let tmp = minimal_site();
        write_file(
            tmp.path(),
            "pages/broken.html",
            "<!-- template = \"nope.html\" --><!-- include(\"a.html\") --><!-- include(\"b.html\") -->",
        );

        let report = check(tmp.path(), &SiteConfig::default()).unwrap();
        let messages: Vec<String> = report.failures.iter().map(|f| f.to_string()).collect();
        assert_eq!(messages.len(), 3, "{messages:?}");
        assert!(messages.iter().all(|m| m.starts_with("broken.html")));
        assert!(messages[0].contains("nope.html"));
        assert!(messages[1].contains("a.html"));
        assert!(messages[2].contains("b.html"));
    }

    #[test]
    fn check_missing_base_template_is_fatal() {
        let tmp = TempDir::new().unwrap();
        assert!(check(tmp.path(), &SiteConfig::default()).is_err());
    }
}
