//! Page variables declared in HTML comments.
//!
//! A page declares variables with comments of the form:
//!
//! ```text
//! <!-- author = "Dave Barker" -->
//! <!-- template = "post.html" -->
//! ```
//!
//! The name is a bare identifier (letters, digits, underscore). The value is
//! any run of characters that does not contain `>`. Whitespace is required
//! between every token of the comment.
//!
//! Three operations live here:
//!
//! - [`extract_vars`] scans text into an ordered [`PageVars`] map
//!   (later declarations of the same name overwrite earlier ones).
//! - [`strip_vars`] removes exactly the declaration comments and nothing else.
//! - [`substitute_vars`] replaces `$name` placeholders in a single pass.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// Name of the reserved variable that selects a page's template.
pub const TEMPLATE_VAR: &str = "template";

/// Template used when a page does not declare one.
pub const DEFAULT_TEMPLATE: &str = "base.html";

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<!--\s+(\w+)\s+=\s+"([^>]*)"\s+-->"#).expect("declaration regex must compile")
});

/// One `<!-- name = "value" -->` comment found in page text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration<'a> {
    pub name: &'a str,
    pub value: &'a str,
    /// Byte range of the whole comment in the scanned text.
    pub span: Range<usize>,
}

/// Iterate over every variable declaration in `text`, in document order.
pub fn declarations(text: &str) -> impl Iterator<Item = Declaration<'_>> {
    DECLARATION.captures_iter(text).filter_map(|caps| {
        let whole = caps.get(0)?;
        Some(Declaration {
            name: caps.get(1)?.as_str(),
            value: caps.get(2)?.as_str(),
            span: whole.range(),
        })
    })
}

/// Collect all declared variables. Last write wins for repeated names.
pub fn extract_vars(text: &str) -> PageVars {
    declarations(text)
        .map(|decl| (decl.name.to_string(), decl.value.to_string()))
        .collect()
}

/// Remove every declaration comment from `text`.
///
/// Only the matched comment spans are removed; surrounding content and
/// whitespace (including the newline after a declaration) are kept as-is.
/// Repeated and overridden declarations are removed too, not just the
/// one whose value survives in [`extract_vars`].
pub fn strip_vars(text: &str) -> String {
    DECLARATION.replace_all(text, "").into_owned()
}

/// Replace `$name` with its value for every variable in `vars`.
///
/// The text is scanned once from left to right. At each `$` the longest
/// declared name that follows is substituted, so `$author_name` is never
/// clobbered by a shorter `$author`. Substituted values are not rescanned:
/// a value containing `$other` is emitted literally.
pub fn substitute_vars(text: &str, vars: &PageVars) -> String {
    if vars.is_empty() {
        return text.to_string();
    }

    let mut names: Vec<(&str, &str)> = vars.iter().filter(|(name, _)| !name.is_empty()).collect();
    names.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        match names.iter().find(|(name, _)| after.starts_with(name)) {
            Some((name, value)) => {
                out.push_str(value);
                rest = &after[name.len()..];
            }
            None => {
                out.push('$');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Variables declared by a page, in first-declaration order.
///
/// Re-declaring a name replaces its value but keeps its original position,
/// so iteration order is stable regardless of how often a name repeats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageVars {
    entries: Vec<(String, String)>,
}

impl PageVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, returning the previous value if any.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// The template this page renders with: `template` if declared,
    /// otherwise [`DEFAULT_TEMPLATE`].
    pub fn template(&self) -> &str {
        self.get(TEMPLATE_VAR).unwrap_or(DEFAULT_TEMPLATE)
    }
}

impl FromIterator<(String, String)> for PageVars {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut vars = Self::new();
        for (name, value) in iter {
            vars.insert(name, value);
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> PageVars {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    // =========================================================================
    // extract_vars
    // =========================================================================

    #[test]
    fn no_declarations_yields_empty_map() {
        let text = "<h1>Hello</h1>\n<!-- just a comment -->\n<p>$author</p>";
        assert!(extract_vars(text).is_empty());
    }

    #[test]
    fn single_declaration_extracted() {
        let text = "<!-- x = \"v\" -->\n<p>body</p>";
        assert_eq!(extract_vars(text), vars(&[("x", "v")]));
    }

    #[test]
    fn multiple_declarations_in_order() {
        let text = "<!-- template = \"post.html\" -->\n<!-- author = \"Dave Barker\" -->\n";
        let extracted = extract_vars(text);
        let names: Vec<&str> = extracted.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["template", "author"]);
        assert_eq!(extracted.get("author"), Some("Dave Barker"));
    }

    #[test]
    fn repeated_name_last_write_wins_keeps_position() {
        let text = "<!-- a = \"1\" --><!-- b = \"2\" --><!-- a = \"3\" -->";
        let extracted = extract_vars(text);
        assert_eq!(extracted.get("a"), Some("3"));
        let names: Vec<&str> = extracted.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn value_may_contain_spaces_and_punctuation() {
        let text = "<!-- title = \"Hello, world: part 2 (draft)\" -->";
        assert_eq!(
            extract_vars(text).get("title"),
            Some("Hello, world: part 2 (draft)")
        );
    }

    #[test]
    fn value_cannot_contain_closing_angle() {
        let text = "<!-- title = \"a > b\" -->";
        assert!(extract_vars(text).is_empty());
    }

    #[test]
    fn whitespace_between_tokens_is_required() {
        assert!(extract_vars("<!--x=\"v\"-->").is_empty());
        assert!(extract_vars("<!-- x=\"v\" -->").is_empty());
    }

    #[test]
    fn include_directive_is_not_a_declaration() {
        assert!(extract_vars("<!-- include(\"nav.html\") -->").is_empty());
    }

    #[test]
    fn declaration_spans_cover_whole_comment() {
        let text = "abc<!-- x = \"v\" -->def";
        let decl = declarations(text).next().unwrap();
        assert_eq!(&text[decl.span.clone()], "<!-- x = \"v\" -->");
        assert_eq!(decl.name, "x");
        assert_eq!(decl.value, "v");
    }

    // =========================================================================
    // strip_vars
    // =========================================================================

    #[test]
    fn strip_without_declarations_is_noop() {
        let text = "<h1>Title</h1>\n<!-- regular comment -->\n";
        assert_eq!(strip_vars(text), text);
    }

    #[test]
    fn strip_removes_exactly_the_comment() {
        let text = "before <!-- x = \"v\" --> after";
        assert_eq!(strip_vars(text), "before  after");
    }

    #[test]
    fn strip_keeps_surrounding_newlines() {
        let text = "<!-- author = \"Dave\" -->\n<p>Body</p>\n";
        assert_eq!(strip_vars(text), "\n<p>Body</p>\n");
    }

    #[test]
    fn strip_handles_shared_prefixes() {
        let text = "<!-- a = \"x\" -->|<!-- ab = \"x\" -->|<!-- a = \"xy\" -->|keep";
        assert_eq!(strip_vars(text), "|||keep");
    }

    #[test]
    fn strip_removes_repeated_and_overridden_declarations() {
        let text = "<!-- a = \"1\" -->X<!-- a = \"1\" -->Y<!-- a = \"2\" -->";
        assert_eq!(strip_vars(text), "XY");
        assert_eq!(extract_vars(text).get("a"), Some("2"));
    }

    #[test]
    fn strip_leaves_placeholders_alone() {
        let text = "<!-- author = \"Dave\" --><p>by $author</p>";
        assert_eq!(strip_vars(text), "<p>by $author</p>");
    }

    // =========================================================================
    // substitute_vars
    // =========================================================================

    #[test]
    fn substitute_replaces_every_occurrence() {
        let out = substitute_vars("$author wrote this. -- $author", &vars(&[("author", "Dave Barker")]));
        assert_eq!(out, "Dave Barker wrote this. -- Dave Barker");
        assert!(!out.contains("$author"));
    }

    #[test]
    fn substitute_prefers_longest_name() {
        let v = vars(&[("author", "Dave"), ("author_url", "https://example.com")]);
        let out = substitute_vars("$author <$author_url>", &v);
        assert_eq!(out, "Dave <https://example.com>");
    }

    #[test]
    fn substitute_is_single_pass() {
        let v = vars(&[("a", "$b"), ("b", "B")]);
        assert_eq!(substitute_vars("$a $b", &v), "$b B");
    }

    #[test]
    fn substitute_keeps_unknown_placeholders() {
        let v = vars(&[("title", "T")]);
        assert_eq!(substitute_vars("$title costs $5 $unknown", &v), "T costs $5 $unknown");
    }

    #[test]
    fn substitute_with_no_vars_returns_input() {
        assert_eq!(substitute_vars("$x $$ $", &PageVars::new()), "$x $$ $");
    }

    #[test]
    fn substitute_handles_multibyte_text() {
        let v = vars(&[("name", "Zoë")]);
        assert_eq!(substitute_vars("héllo $name — ünïcode", &v), "héllo Zoë — ünïcode");
    }

    // =========================================================================
    // PageVars
    // =========================================================================

    #[test]
    fn template_defaults_to_base() {
        assert_eq!(PageVars::new().template(), "base.html");
        assert_eq!(vars(&[("template", "custom.html")]).template(), "custom.html");
    }

    #[test]
    fn insert_returns_previous_value() {
        let mut v = PageVars::new();
        assert_eq!(v.insert("k", "1"), None);
        assert_eq!(v.insert("k", "2"), Some("1".to_string()));
        assert_eq!(v.len(), 1);
        assert!(v.contains("k"));
    }
}
