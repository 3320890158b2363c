//! Shared helpers for source parsers: static regex/selector compilation,
//! text cleanup, author splitting and URL joining.

use regex::Regex;
use scraper::{ElementRef, Selector};
use url::Url;

/// Compiles a regex at static init; panics on invalid pattern.
pub fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Parses a CSS selector at static init; panics on invalid selector.
pub fn compile_static_selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid static selector '{css}': {e}"))
}

/// Collapses whitespace (including non-breaking spaces) to single spaces and trims.
#[must_use]
pub fn clean_text(raw: &str) -> String {
    raw.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// All text below `element`, cleaned.
#[must_use]
pub fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<String>())
}

/// Text of the first match of `selector` under `scope`, if non-empty.
#[must_use]
pub fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Element siblings after `element`, in document order.
pub fn following_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.next_siblings().filter_map(ElementRef::wrap)
}

/// First element matching `selector` whose cleaned text equals `text`, ignoring case.
#[must_use]
pub fn find_by_text<'a>(
    scope: ElementRef<'a>,
    selector: &Selector,
    text: &str,
) -> Option<ElementRef<'a>> {
    scope
        .select(selector)
        .find(|el| element_text(*el).eq_ignore_ascii_case(text))
}

/// Splits an author list on `separator`, dropping blanks.
#[must_use]
pub fn split_authors(raw: &str, separator: char) -> Vec<String> {
    clean_text(raw)
        .split(separator)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolves `href` against `base`. Returns `None` if either is malformed.
#[must_use]
pub fn join_url(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(String::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_clean_text_collapses_whitespace_and_nbsp() {
        assert_eq!(clean_text("  A\u{a0}B \n\t C  "), "A B C");
    }

    #[test]
    fn test_element_text_joins_inline_children() {
        let doc = Html::parse_fragment("<p>Deep <i>Learning</i>\n for all</p>");
        let p = doc.select(&compile_static_selector("p")).next().unwrap();
        assert_eq!(element_text(p), "Deep Learning for all");
    }

    #[test]
    fn test_following_elements_skips_text_nodes() {
        let doc = Html::parse_fragment("<div><h4>Abstract</h4> text <p>one</p><p>two</p></div>");
        let h4 = find_by_text(
            doc.root_element(),
            &compile_static_selector("h4"),
            "abstract",
        )
        .unwrap();
        let texts: Vec<_> = following_elements(h4).map(element_text).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn test_split_authors_drops_blanks() {
        assert_eq!(
            split_authors("Ada Lovelace, ,Alan\u{a0}Turing,", ','),
            vec!["Ada Lovelace", "Alan Turing"]
        );
    }

    #[test]
    fn test_join_url_relative_and_absolute() {
        assert_eq!(
            join_url("https://proceedings.mlr.press/", "v202/a23a.html").unwrap(),
            "https://proceedings.mlr.press/v202/a23a.html"
        );
        assert_eq!(
            join_url("https://openaccess.thecvf.com/", "/content/x.html").unwrap(),
            "https://openaccess.thecvf.com/content/x.html"
        );
        assert_eq!(
            join_url("https://a.org/x/", "https://b.org/y.pdf").unwrap(),
            "https://b.org/y.pdf"
        );
        assert!(join_url("not a url", "x").is_none());
    }

    #[test]
    #[should_panic(expected = "invalid static regex")]
    fn test_compile_static_regex_panics_on_bad_pattern() {
        let _ = compile_static_regex("(");
    }
}
