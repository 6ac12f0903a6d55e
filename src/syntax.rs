use regex::Regex;
use std::sync::OnceLock;

/// Fixed set of callout flavors. Each one maps to a line-start `::type`
/// marker in note text and a default display icon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CalloutKind {
    Info,
    Warning,
    Error,
    Success,
    Note,
}

impl CalloutKind {
    pub const ALL: [CalloutKind; 5] = [
        CalloutKind::Info,
        CalloutKind::Warning,
        CalloutKind::Error,
        CalloutKind::Success,
        CalloutKind::Note,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CalloutKind::Info => "info",
            CalloutKind::Warning => "warning",
            CalloutKind::Error => "error",
            CalloutKind::Success => "success",
            CalloutKind::Note => "note",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            CalloutKind::Info => "💡",
            CalloutKind::Warning => "⚠️",
            CalloutKind::Error => "❌",
            CalloutKind::Success => "✅",
            CalloutKind::Note => "📝",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        CalloutKind::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

/// Rewrites the bespoke inline markers into pseudo-element tags the renderer
/// knows how to mount:
///
/// - `?[note]`                 -> `<quick-aside content="note">?</quick-aside>`
/// - `||secret||`              -> `<spoiler>secret</spoiler>`
/// - `::warning be careful`    -> `<callout type="warning">be careful</callout>`
/// - `[text](wiki:Page)`       -> `<greenlink href="wiki:Page">text</greenlink>`
/// - `[text](doi:10.x/y)`      -> `<greenlink href="doi:10.x/y">text</greenlink>`
/// - `[[text]](url)`           -> `<greenlink href="url">text</greenlink>`
/// - `{\n}`                    -> `<br>`
///
/// The passes run in a fixed order. Malformed markers simply fail to match
/// and pass through unchanged, and re-running the pass on its own output is
/// a no-op since no output contains a raw marker.
pub fn preprocess(content: &str) -> String {
    static RE_BLANKS: OnceLock<Regex> = OnceLock::new();
    static RE_ASIDE: OnceLock<Regex> = OnceLock::new();
    static RE_SPOILER: OnceLock<Regex> = OnceLock::new();
    static RE_CALLOUT: OnceLock<Regex> = OnceLock::new();
    static RE_WIKI: OnceLock<Regex> = OnceLock::new();
    static RE_DOI: OnceLock<Regex> = OnceLock::new();
    static RE_INTERNAL: OnceLock<Regex> = OnceLock::new();
    static RE_NEWLINE: OnceLock<Regex> = OnceLock::new();

    if content.is_empty() {
        return String::new();
    }

    let re_blanks = RE_BLANKS.get_or_init(|| Regex::new(r"\n{2,}").unwrap());
    let re_aside = RE_ASIDE.get_or_init(|| Regex::new(r"\?\[(.*?)\]").unwrap());
    let re_spoiler = RE_SPOILER.get_or_init(|| Regex::new(r"\|\|(.*?)\|\|").unwrap());
    let re_callout = RE_CALLOUT.get_or_init(|| {
        Regex::new(r"(?m)^::(info|warning|error|success|note)\s+(.*?)$").unwrap()
    });
    let re_wiki = RE_WIKI.get_or_init(|| Regex::new(r"\[(.*?)\]\(wiki:(.*?)\)").unwrap());
    let re_doi = RE_DOI.get_or_init(|| Regex::new(r"\[(.*?)\]\(doi:(.*?)\)").unwrap());
    let re_internal = RE_INTERNAL.get_or_init(|| Regex::new(r"\[\[(.*?)\]\]\((.*?)\)").unwrap());
    let re_newline = RE_NEWLINE.get_or_init(|| Regex::new(r"\{\\n\}").unwrap());

    // Clean up stray editor artifacts before the marker passes.
    let text = content.replace("<div>", "").replace("</div>", "");
    let text = re_blanks.replace_all(&text, "\n\n");
    let text = text.trim();

    let text = re_aside.replace_all(text, r#"<quick-aside content="${1}">?</quick-aside>"#);
    let text = re_spoiler.replace_all(&text, "<spoiler>${1}</spoiler>");
    let text = re_callout.replace_all(&text, r#"<callout type="${1}">${2}</callout>"#);
    let text = re_wiki.replace_all(&text, r#"<greenlink href="wiki:${2}">${1}</greenlink>"#);
    let text = re_doi.replace_all(&text, r#"<greenlink href="doi:${2}">${1}</greenlink>"#);
    let text = re_internal.replace_all(&text, r#"<greenlink href="${2}">${1}</greenlink>"#);
    let text = re_newline.replace_all(&text, "<br>");

    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_quick_asides() {
        let out = preprocess("before ?[note] after");
        assert_eq!(
            out,
            r#"before <quick-aside content="note">?</quick-aside> after"#
        );
    }

    #[test]
    fn rewrites_spoilers() {
        let out = preprocess("a ||secret|| b");
        assert_eq!(out, "a <spoiler>secret</spoiler> b");
    }

    #[test]
    fn rewrites_callouts_at_line_start_only() {
        let out = preprocess("::warning be careful");
        assert_eq!(out, r#"<callout type="warning">be careful</callout>"#);

        // Mid-line `::` is not a callout marker.
        let out = preprocess("not ::warning a callout");
        assert_eq!(out, "not ::warning a callout");
    }

    #[test]
    fn unknown_callout_type_passes_through() {
        let out = preprocess("::danger zone");
        assert_eq!(out, "::danger zone");
    }

    #[test]
    fn rewrites_wiki_and_doi_links() {
        let out = preprocess("[Rust](wiki:Rust)");
        assert_eq!(out, r#"<greenlink href="wiki:Rust">Rust</greenlink>"#);

        let out = preprocess("[paper](doi:10.1000/xyz123)");
        assert_eq!(
            out,
            r#"<greenlink href="doi:10.1000/xyz123">paper</greenlink>"#
        );
    }

    #[test]
    fn rewrites_internal_links() {
        let out = preprocess("[[Home]](http://x/home)");
        assert_eq!(out, r#"<greenlink href="http://x/home">Home</greenlink>"#);
    }

    #[test]
    fn rewrites_newline_markers() {
        let out = preprocess(r"one{\n}two");
        assert_eq!(out, "one<br>two");
    }

    #[test]
    fn strips_div_artifacts_and_collapses_blank_runs() {
        let out = preprocess("<div>a</div>\n\n\n\nb");
        assert_eq!(out, "a\n\nb");
    }

    #[test]
    fn malformed_markers_pass_through() {
        assert_eq!(preprocess("||unclosed spoiler"), "||unclosed spoiler");
        assert_eq!(preprocess("?[unclosed aside"), "?[unclosed aside");
        assert_eq!(preprocess("[[no target]]"), "[[no target]]");
    }

    #[test]
    fn idempotent_on_transformed_output() {
        let source = "::info heads up\n\n?[aside] and ||secret|| and [[Home]](http://x/home)";
        let once = preprocess(source);
        let twice = preprocess(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn callout_kind_round_trips() {
        for kind in CalloutKind::ALL {
            assert_eq!(CalloutKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CalloutKind::parse("danger"), None);
    }
}
