//! # bsw
//!
//! A minimal static site generator. Pages are HTML fragments; templates are
//! HTML documents with a `$page_content` slot; everything else is done with
//! two kinds of HTML comment:
//!
//! ```html
//! <!-- title = "About us" -->          declares $title for this page
//! <!-- template = "post.html" -->      picks a template other than base.html
//! <!-- include("nav.html") -->         pastes templates/includes/nav.html here
//! ```
//!
//! # Architecture
//!
//! Each page goes through the same lifecycle, independently of every other
//! page:
//!
//! ```text
//! load          read pages/<path>
//! extract_vars  collect <!-- name = "value" --> declarations
//! strip_vars    remove the declarations from the body
//! render        template body with $page_content → expand includes
//!               → substitute $name variables
//! write         build/<path>
//! ```
//!
//! Pages are rendered in parallel. Templates and includes are read from disk
//! at most once per build and shared through thread-safe caches.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`vars`] | Variable declarations: extract, strip, and `$name` substitution |
//! | [`include`] | `<!-- include("…") -->` directive expansion |
//! | [`cache`] | Memoizing template and include stores |
//! | [`page`] | The per-page lifecycle and its render errors |
//! | [`scan`] | Page discovery under the pages directory |
//! | [`files`] | Output directory management and static asset merging |
//! | [`build`] | Pipeline driver: discover, render in parallel, write, copy assets |
//! | [`serve`] | Development HTTP server for the output directory |
//! | [`config`] | `bsw.toml` loading, merging, and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Includes Are Not Recursive
//!
//! An included file is pasted as-is. Directives inside it are left in the
//! output, and a page that already expanded its own includes is never scanned
//! a second time. This keeps expansion a single pass with no cycle detection.
//!
//! ## One Bad Page Does Not Stop the Build
//!
//! A missing template or include fails only the page that asked for it. The
//! build renders everything else and exits non-zero at the end with the list
//! of failed pages.

pub mod build;
pub mod cache;
pub mod config;
pub mod files;
pub mod include;
pub mod output;
pub mod page;
pub mod scan;
pub mod serve;
pub mod vars;

#[cfg(test)]
pub(crate) mod test_helpers;
