//! Include directives.
//!
//! Pages and templates pull in shared fragments with:
//!
//! ```text
//! <!-- include("header.html") -->
//! ```
//!
//! The named file is looked up in the includes directory through an
//! [`IncludeCache`] and its raw contents replace the directive verbatim.
//! Inserted content is never rescanned, so an include that itself contains
//! a directive leaves that directive in the output untouched.

use crate::cache::{CacheError, IncludeCache, Storage};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<!--\s+include\("([^"]+)"\)\s+-->"#).expect("include regex must compile")
});

/// Distinct include names referenced by `text`, in first-reference order.
pub fn referenced_includes(text: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for caps in DIRECTIVE.captures_iter(text) {
        if let Some(name) = caps.get(1).map(|m| m.as_str())
            && !names.contains(&name)
        {
            names.push(name);
        }
    }
    names
}

/// Replace every include directive in `text` with the named file's contents.
///
/// All referenced names are resolved before anything is replaced, so the
/// result is either fully expanded or an error naming the first include
/// that could not be loaded. Each distinct file is fetched from `includes`
/// once per call, and the cache makes that at most once per build.
pub fn expand_includes<S: Storage>(
    text: &str,
    includes: &IncludeCache<S>,
) -> Result<String, CacheError> {
    let names = referenced_includes(text);
    if names.is_empty() {
        return Ok(text.to_string());
    }

    let mut resolved: HashMap<&str, Arc<str>> = HashMap::with_capacity(names.len());
    for name in names {
        resolved.insert(name, includes.get_or_load(name)?);
    }

    let expanded = DIRECTIVE.replace_all(text, |caps: &Captures| {
        caps.get(1)
            .and_then(|m| resolved.get(m.as_str()))
            .map(|content| content.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    });
    Ok(expanded.into_owned())
}
