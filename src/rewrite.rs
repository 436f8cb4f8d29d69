use crate::entities::{decode_url_entities, EntityPatterns};
use crate::resolve::{resolve_url, BaseUrl};
use regex::{Captures, Regex};

/// Characters that may not directly precede an HTML attribute name. Used as a
/// boundary so `href` does not match inside `data-href`.
const ATTR_BOUNDARY: &str = r"[^-a-z0-9:._]";

/// Boundary before `url` in CSS text. Unlike [`ATTR_BOUNDARY`] this admits
/// `:` so that `background:url(...)` is recognized.
const CSS_BOUNDARY: &str = r"[^-a-z0-9._]";

/// Matches anything between `<` and the closing `>` of a tag, skipping over
/// quoted attribute values that may themselves contain `>`.
const IN_TAG: &str = r#"(?:[^>"']*(?:"[^"]*"|'[^']*'))*?[^>]*"#;

/// Patterns here are built from internal fragments and always compile; if one
/// ever does not, the rule is skipped and the fragment passes through
/// unchanged rather than failing the whole rewrite.
fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern).ok()
}

/// Shared replacement callback: group 1 is the prefix up to the URL, group 2
/// the URL itself, group 3 an optional terminator. The captured URL is
/// normalized for entity-encoded `/` and `.` before resolution so obfuscated
/// values resolve identically to their literal forms.
fn resolve_groups(caps: &Captures, base: &BaseUrl) -> String {
    let value = decode_url_entities(&caps[2]);
    let end = caps.get(3).map_or("", |m| m.as_str());
    format!("{}{}{}", &caps[1], resolve_url(&value, base), end)
}

fn replace_urls(text: &str, re: &Regex, all: bool, base: &BaseUrl) -> String {
    if all {
        re.replace_all(text, |caps: &Captures| resolve_groups(caps, base))
            .into_owned()
    } else {
        re.replace(text, |caps: &Captures| resolve_groups(caps, base))
            .into_owned()
    }
}

/// Search-and-replace on a whole attribute value.
///
/// The selector picks the constructs to examine; within each match the
/// attribute's value is rewritten through three parallel sub-patterns for
/// double-quoted, single-quoted and unquoted syntax. Everything around the
/// value is reproduced byte-for-byte.
struct AttrRule {
    selector: String,
    /// Boundary-guarded attribute (or CSS token) pattern.
    attribute: String,
    /// Pattern between the attribute and its value, `\s*=\s*` by default.
    marker: String,
    /// Extra characters excluded from the value, as character-class content.
    delimiter: String,
    /// Pattern the match must end before, e.g. `\s*\)` for CSS `url(...)`.
    end: Option<String>,
}

impl AttrRule {
    fn new(selector: String, attribute: &str) -> Self {
        Self {
            selector,
            attribute: format!("{}{}", ATTR_BOUNDARY, attribute),
            marker: r"\s*=\s*".to_string(),
            delimiter: String::new(),
            end: None,
        }
    }

    fn apply(&self, html: &str, base: &BaseUrl) -> String {
        let Some(selector) = compile(&format!("(?i){}", self.selector)) else {
            return html.to_string();
        };
        let tail = match &self.end {
            Some(end) => format!("?)({})", end),
            None => ")()".to_string(),
        };
        let double_quoted = format!(
            "(?i)({}{}\")([^\"{}]+{}",
            self.attribute, self.marker, self.delimiter, tail
        );
        let single_quoted = format!(
            "(?i)({}{}')([^'{}]+{}",
            self.attribute, self.marker, self.delimiter, tail
        );
        let unquoted = format!(
            "(?i)({}{})([^\"'][^\\s>{}]*{}",
            self.attribute, self.marker, self.delimiter, tail
        );
        let sub_rules: Vec<Regex> = [double_quoted, single_quoted, unquoted]
            .iter()
            .filter_map(|p| compile(p))
            .collect();

        selector
            .replace_all(html, |caps: &Captures| {
                let mut tag = caps[0].to_string();
                for re in &sub_rules {
                    tag = replace_urls(&tag, re, true, base);
                }
                tag
            })
            .into_owned()
    }
}

/// Search-and-replace on URLs embedded inside a composite attribute value,
/// e.g. `url(...)` inside `style="..."` or `url=` inside a refresh directive.
struct ValueRule {
    selector: String,
    attribute: String,
    /// Pattern for the sub-value's prefix, e.g. entity-aware `url(`.
    front: String,
    /// Rewrite every occurrence in the value, or only the first.
    all: bool,
    /// Character-class content bounding an unquoted sub-value; without it
    /// only quoted sub-values are rewritten.
    delimiter: Option<String>,
    end: Option<String>,
}

impl ValueRule {
    fn apply(&self, html: &str, base: &BaseUrl) -> String {
        let Some(selector) = compile(&format!("(?i){}", self.selector)) else {
            return html.to_string();
        };
        let attr_rules: Vec<Regex> = [
            format!("(?i)({}\\s*=\\s*\")([^\"]*)", self.attribute),
            format!("(?i)({}\\s*=\\s*')([^']+)", self.attribute),
        ]
        .iter()
        .filter_map(|p| compile(p))
        .collect();

        let mut value_rules: Vec<Regex> = [
            format!("(?i)({})([^\"]+)(\")", self.front),
            format!("(?i)({})([^']+)(')", self.front),
        ]
        .iter()
        .filter_map(|p| compile(p))
        .collect();
        if let Some(delimiter) = &self.delimiter {
            let tail = match &self.end {
                Some(end) => format!("?)({})", end),
                None => ")()".to_string(),
            };
            let unquoted = format!("(?i)({})([^\"'][^{}]*{}", self.front, delimiter, tail);
            if let Some(re) = compile(&unquoted) {
                value_rules.push(re);
            }
        }

        selector
            .replace_all(html, |caps: &Captures| {
                let mut tag = caps[0].to_string();
                for attr_re in &attr_rules {
                    tag = attr_re
                        .replace_all(&tag, |attr_caps: &Captures| {
                            let mut value = attr_caps[2].to_string();
                            for re in &value_rules {
                                value = replace_urls(&value, re, self.all, base);
                            }
                            format!("{}{}", &attr_caps[1], value)
                        })
                        .into_owned();
                }
                tag
            })
            .into_owned()
    }
}

/// Rewrite every relative URL reachable through the known set of HTML
/// constructs to an absolute URL against `base_url`.
///
/// Covers `meta http-equiv=refresh` directives, `href` and `src` on any tag,
/// `object data`, `applet codebase`, `param name=movie value`, `url(...)`
/// references in `<style>` blocks and in inline `style` attributes.
/// Attribute values obfuscated with numeric HTML entities are recognized;
/// trusted-scheme URLs pass through untouched. Total over its inputs: no
/// input can make it panic, and unmatched constructs are left as they were.
pub fn rewrite_relative_urls(html: &str, base_url: &str) -> String {
    let base = BaseUrl::parse(base_url);
    let mut ents = EntityPatterns::new();

    let space = ents.literal(" ");
    let spaces = format!("{}*", space);
    let refresh = ents.literal("refresh");
    let movie = ents.literal("movie");
    let url_word = ents.literal("url");
    let equals = ents.literal("=");
    let lparen = ents.literal("(");
    let rparen = ents.literal(")");

    let mut html = html.to_string();

    // <meta http-equiv=refresh content="...; url=...">
    let meta_selector = format!(
        "<meta{any}{att}http-equiv\\s*=\\s*(?:\"{refresh}\"{any}>|'{refresh}'{any}>|{refresh}(?:{space}{any}>|>))",
        any = IN_TAG,
        att = ATTR_BOUNDARY,
        refresh = refresh,
        space = space,
    );
    html = ValueRule {
        selector: meta_selector,
        attribute: format!("{}content", ATTR_BOUNDARY),
        front: format!("{url_word}{spaces}{equals}{spaces}"),
        all: false,
        delimiter: Some(r";\s".to_string()),
        end: None,
    }
    .apply(&html, &base);

    // Linked and embedded elements, plus the object/applet specials.
    for (tag, attribute) in [
        ("", "href"),
        ("", "src"),
        ("object", "data"),
        ("applet", "codebase"),
    ] {
        let selector = format!(
            "<{tag}{any}{att}{attribute}\\s*={any}>",
            tag = tag,
            any = IN_TAG,
            att = ATTR_BOUNDARY,
            attribute = attribute,
        );
        html = AttrRule::new(selector, attribute).apply(&html, &base);
    }

    // <param name=movie value=...>
    let param_selector = format!(
        "<param{any}{att}name\\s*=\\s*(?:\"{movie}\"{any}>|'{movie}'{any}>|{movie}(?:{space}{any}>|>))",
        any = IN_TAG,
        att = ATTR_BOUNDARY,
        movie = movie,
        space = space,
    );
    html = AttrRule::new(param_selector, "value").apply(&html, &base);

    // url(...) references inside <style> blocks.
    let style_block = AttrRule {
        selector: "<style[^>]*>(?:[^\"']*(?:\"[^\"]*\"|'[^']*'))*?[^'\"]*(?:</style|$)"
            .to_string(),
        attribute: format!("{}url", CSS_BOUNDARY),
        marker: r"\s*\(\s*".to_string(),
        delimiter: String::new(),
        end: Some(r"\s*\)".to_string()),
    };
    html = style_block.apply(&html, &base);

    // url(...) references inside inline style attributes.
    let style_attr_selector = format!(
        "<{any}{att}style\\s*={any}>",
        any = IN_TAG,
        att = ATTR_BOUNDARY,
    );
    html = ValueRule {
        selector: style_attr_selector,
        attribute: format!("{}style", ATTR_BOUNDARY),
        front: format!("{url_word}{spaces}{lparen}{spaces}"),
        all: true,
        delimiter: Some(r"\s)".to_string()),
        end: Some(format!("{spaces}{rparen}")),
    }
    .apply(&html, &base);

    html
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://site.org/docs/";

    #[test]
    fn test_full_document_scenario() {
        let html = r#"<a href="foo.html">x</a><img src="/b.png"><style>div{background:url(bg.png)}</style>"#;
        let rewritten = rewrite_relative_urls(html, BASE);
        assert!(rewritten.contains(r#"href="https://site.org/docs/foo.html""#));
        assert!(rewritten.contains(r#"src="https://site.org/b.png""#));
        assert!(rewritten.contains("url(https://site.org/docs/bg.png)"));
        assert!(rewritten.contains(">x</a>"));
    }

    #[test]
    fn test_absolute_urls_untouched() {
        let html = r#"<a href="https://other.org/a">x</a><img src="data:image/png;base64,AA==">"#;
        assert_eq!(rewrite_relative_urls(html, BASE), html);
    }

    #[test]
    fn test_javascript_and_mailto_untouched() {
        let html = r#"<a href="javascript:void(0)">x</a><a href="mailto:a@b.org">y</a>"#;
        assert_eq!(rewrite_relative_urls(html, BASE), html);
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let html = r#"<a href="a/b.html">x</a><img src="../up.png" style="background:url(t.gif)">"#;
        let once = rewrite_relative_urls(html, BASE);
        let twice = rewrite_relative_urls(&once, BASE);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_single_quoted_and_unquoted_attributes() {
        let html = "<img src='a.png'><img src=b.png>";
        let rewritten = rewrite_relative_urls(html, BASE);
        assert!(rewritten.contains("src='https://site.org/docs/a.png'"));
        assert!(rewritten.contains("src=https://site.org/docs/b.png>"));
    }

    #[test]
    fn test_protocol_relative_src() {
        let html = r#"<script src="//cdn.example.com/lib.js"></script>"#;
        let rewritten = rewrite_relative_urls(html, BASE);
        assert!(rewritten.contains(r#"src="https://cdn.example.com/lib.js""#));
    }

    #[test]
    fn test_entity_obfuscated_value_resolves_like_literal() {
        let obfuscated =
            rewrite_relative_urls(r#"<a href="&#46;&#46;&#x2f;img.png">x</a>"#, "https://site.org/a/b/");
        let literal =
            rewrite_relative_urls(r#"<a href="../img.png">x</a>"#, "https://site.org/a/b/");
        assert!(obfuscated.contains(r#"href="https://site.org/a/img.png""#));
        assert_eq!(
            obfuscated.replace("&#46;&#46;&#x2f;", "../"),
            obfuscated
        );
        assert!(literal.contains(r#"href="https://site.org/a/img.png""#));
    }

    #[test]
    fn test_meta_refresh_url() {
        let html = r#"<meta http-equiv="refresh" content="5; url=intro.html">"#;
        let rewritten = rewrite_relative_urls(html, BASE);
        assert!(rewritten.contains("url=https://site.org/docs/intro.html"));
    }

    #[test]
    fn test_meta_refresh_entity_obfuscated_equiv() {
        let html = r#"<meta http-equiv="&#114;efresh" content="0; url=next.html">"#;
        let rewritten = rewrite_relative_urls(html, BASE);
        assert!(rewritten.contains("url=https://site.org/docs/next.html"));
    }

    #[test]
    fn test_param_movie_value() {
        let html = r#"<object><param name="movie" value="intro.swf"></object>"#;
        let rewritten = rewrite_relative_urls(html, BASE);
        assert!(rewritten.contains(r#"value="https://site.org/docs/intro.swf""#));
    }

    #[test]
    fn test_param_other_names_untouched() {
        let html = r#"<param name="quality" value="high">"#;
        assert_eq!(rewrite_relative_urls(html, BASE), html);
    }

    #[test]
    fn test_object_data_and_applet_codebase() {
        let html = r#"<object data="viewer.svg"></object><applet codebase="java/"></applet>"#;
        let rewritten = rewrite_relative_urls(html, BASE);
        assert!(rewritten.contains(r#"data="https://site.org/docs/viewer.svg""#));
        assert!(rewritten.contains(r#"codebase="https://site.org/docs/java/""#));
    }

    #[test]
    fn test_inline_style_url() {
        let html = r#"<div style="background:url(paper.gif);color:red">x</div>"#;
        let rewritten = rewrite_relative_urls(html, BASE);
        assert!(rewritten.contains("url(https://site.org/docs/paper.gif)"));
        assert!(rewritten.contains("color:red"));
    }

    #[test]
    fn test_inline_style_rewrites_every_url() {
        let html = r#"<div style="background:url(a.png);border-image:url(b.png)">x</div>"#;
        let rewritten = rewrite_relative_urls(html, BASE);
        assert!(rewritten.contains("url(https://site.org/docs/a.png)"));
        assert!(rewritten.contains("url(https://site.org/docs/b.png)"));
    }

    #[test]
    fn test_style_block_with_spaces() {
        let html = "<style>body { background: url( bg.png ) }</style>";
        let rewritten = rewrite_relative_urls(html, BASE);
        assert!(rewritten.contains("url( https://site.org/docs/bg.png )"));
    }

    #[test]
    fn test_data_attribute_outside_object_untouched() {
        let html = r#"<div data="x.bin">x</div>"#;
        assert_eq!(rewrite_relative_urls(html, BASE), html);
    }

    #[test]
    fn test_custom_data_href_attribute_untouched() {
        let html = r#"<a data-href="x.html" href="y.html">x</a>"#;
        let rewritten = rewrite_relative_urls(html, BASE);
        assert!(rewritten.contains(r#"data-href="x.html""#));
        assert!(rewritten.contains(r#"href="https://site.org/docs/y.html""#));
    }

    #[test]
    fn test_resolved_url_cannot_break_out_of_attribute() {
        let html = r#"<img src='x"onerror="alert(1)'>"#;
        let rewritten = rewrite_relative_urls(html, BASE);
        assert!(rewritten.contains("%22"));
        assert!(!rewritten.contains(r#"x"onerror"#));
    }

    #[test]
    fn test_malformed_fragments_pass_through() {
        for html in [
            "<a href=\"unterminated",
            "<>< href=>",
            "plain text without tags",
            "<style>div{background:url(",
            "",
        ] {
            // Must not panic; unmatched constructs stay as they were.
            let rewritten = rewrite_relative_urls(html, BASE);
            assert!(rewritten.contains(html.split('<').next().unwrap_or("")));
        }
    }

    #[test]
    fn test_base_url_without_trailing_slash() {
        let rewritten = rewrite_relative_urls(r#"<a href="x.html">x</a>"#, "https://site.org/docs");
        assert!(rewritten.contains(r#"href="https://site.org/docs/x.html""#));
    }

    #[test]
    fn test_empty_attribute_untouched() {
        let html = r#"<a href="">x</a>"#;
        assert_eq!(rewrite_relative_urls(html, BASE), html);
    }

    #[test]
    fn test_whitespace_only_reference_is_dropped() {
        let html = r#"<a href="   ">x</a>"#;
        let rewritten = rewrite_relative_urls(html, BASE);
        assert!(rewritten.contains(r#"href="""#));
    }
}
