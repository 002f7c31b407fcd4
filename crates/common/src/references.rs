//! Work package references in formatted text
//!
//! `#12` links work package 12, `##12` links it and shows its subject.
//! While typing, a trailing `#term` or `##term` is an autocomplete query
//! that is replaced by the chosen work package's reference.

use crate::error::Result;
use crate::types::WorkPackageId;

/// Path work package links point to
pub const WORK_PACKAGE_PATH: &str = "/work_packages/";

/// Most suggestions offered for one query
pub const AUTOCOMPLETE_LIMIT: usize = 10;

/// How a reference is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceStyle {
    /// `#12`
    Id,
    /// `##12`
    Subject,
}

impl ReferenceStyle {
    fn from_hashes(count: usize) -> Option<Self> {
        match count {
            1 => Some(ReferenceStyle::Id),
            2 => Some(ReferenceStyle::Subject),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            ReferenceStyle::Id => "#",
            ReferenceStyle::Subject => "##",
        }
    }
}

/// An unfinished reference at the end of the editor text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceQuery {
    pub style: ReferenceStyle,
    pub term: String,
    start: usize,
}

impl ReferenceQuery {
    /// Find the query being typed at the end of `text`, if any
    pub fn at_end(text: &str) -> Option<Self> {
        let term_start = text
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace() || *c == '#')
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let term = &text[term_start..];
        if term.is_empty() {
            return None;
        }

        let before = &text[..term_start];
        let hashes = before.len() - before.trim_end_matches('#').len();
        let style = ReferenceStyle::from_hashes(hashes)?;
        let start = term_start - hashes;
        let boundary = text[..start].chars().next_back().map_or(true, char::is_whitespace);
        if !boundary {
            return None;
        }

        Some(Self {
            style,
            term: term.to_string(),
            start,
        })
    }

    /// Replace the query in `text` with a reference to `id`
    pub fn complete(&self, text: &str, id: WorkPackageId) -> String {
        let head = text.get(..self.start).unwrap_or(text);
        format!("{}{}{} ", head, self.style.prefix(), id)
    }
}

/// Render editor text to the HTML shown in preview mode.
///
/// Blank lines separate paragraphs, single newlines become line breaks,
/// and references to work packages `resolve` knows become links.
pub fn render_preview<F>(text: &str, mut resolve: F) -> Result<String>
where
    F: FnMut(WorkPackageId) -> Result<Option<String>>,
{
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    let mut html = String::new();
    for lines in paragraphs {
        html.push_str("<p>");
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                html.push_str("<br>\n");
            }
            render_line(line, &mut html, &mut resolve)?;
        }
        html.push_str("</p>\n");
    }
    Ok(html)
}

fn render_line<F>(line: &str, html: &mut String, resolve: &mut F) -> Result<()>
where
    F: FnMut(WorkPackageId) -> Result<Option<String>>,
{
    let mut rest = line;
    let mut prev: Option<char> = None;
    while let Some(c) = rest.chars().next() {
        if c == '#' && prev.map_or(true, |p| !is_word(p)) {
            if let Some((style, id, len)) = parse_reference(rest) {
                match resolve(id)? {
                    Some(subject) => push_link(html, style, id, &subject),
                    // Unknown work packages stay literal text
                    None => push_escaped(html, &rest[..len]),
                }
                prev = rest[..len].chars().next_back();
                rest = &rest[len..];
                continue;
            }
        }
        push_escaped(html, &rest[..c.len_utf8()]);
        prev = Some(c);
        rest = &rest[c.len_utf8()..];
    }
    Ok(())
}

/// Parse `#12` / `##12` at the start of `s`; returns the style, id and byte length
fn parse_reference(s: &str) -> Option<(ReferenceStyle, WorkPackageId, usize)> {
    let hashes = s.len() - s.trim_start_matches('#').len();
    let style = ReferenceStyle::from_hashes(hashes)?;
    let digits = s[hashes..]
        .chars()
        .take_while(char::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    let len = hashes + digits;
    if s[len..].chars().next().is_some_and(is_word) {
        return None;
    }
    let id = s[hashes..len].parse::<u64>().ok()?;
    Some((style, WorkPackageId(id), len))
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '#'
}

fn push_link(html: &mut String, style: ReferenceStyle, id: WorkPackageId, subject: &str) {
    html.push_str(&format!(
        "<a class=\"work-package\" href=\"{}{}\" title=\"",
        WORK_PACKAGE_PATH, id
    ));
    push_escaped(html, subject);
    html.push_str(&format!("\">#{}", id));
    if style == ReferenceStyle::Subject {
        html.push(' ');
        push_escaped(html, subject);
    }
    html.push_str("</a>");
}

fn push_escaped(html: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => html.push_str("&amp;"),
            '<' => html.push_str("&lt;"),
            '>' => html.push_str("&gt;"),
            '"' => html.push_str("&quot;"),
            '\'' => html.push_str("&#39;"),
            other => html.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn subjects(id: WorkPackageId) -> Result<Option<String>> {
        Ok(match id.0 {
            2 => Some("Dependency".to_string()),
            3 => Some("<Tricky> & co".to_string()),
            _ => None,
        })
    }

    #[test_case("See #Dep", Some((ReferenceStyle::Id, "Dep")) ; "single hash")]
    #[test_case("##dep", Some((ReferenceStyle::Subject, "dep")) ; "double hash at start")]
    #[test_case("line\n#12", Some((ReferenceStyle::Id, "12")) ; "after newline")]
    #[test_case("See #", None ; "no term yet")]
    #[test_case("###x", None ; "three hashes")]
    #[test_case("issue#12", None ; "inside a word")]
    #[test_case("#12 done", None ; "finished reference")]
    #[test_case("", None ; "empty")]
    fn test_query_at_end(text: &str, expected: Option<(ReferenceStyle, &str)>) {
        let found = ReferenceQuery::at_end(text).map(|q| (q.style, q.term));
        assert_eq!(found, expected.map(|(s, t)| (s, t.to_string())));
    }

    #[test]
    fn test_complete_replaces_query() {
        let text = "Blocked by ##Dep";
        let query = ReferenceQuery::at_end(text).unwrap();
        assert_eq!(query.complete(text, WorkPackageId(2)), "Blocked by ##2 ");

        let text = "#1";
        let query = ReferenceQuery::at_end(text).unwrap();
        assert_eq!(query.complete(text, WorkPackageId(17)), "#17 ");
    }

    #[test]
    fn test_render_paragraphs_and_escaping() {
        let html = render_preview("a < b\nsecond line\n\n\nnext", subjects).unwrap();
        assert_eq!(html, "<p>a &lt; b<br>\nsecond line</p>\n<p>next</p>\n");
        assert_eq!(render_preview("  \n", subjects).unwrap(), "");
    }

    #[test]
    fn test_render_references() {
        let html = render_preview("See #2 and ##2.", subjects).unwrap();
        assert_eq!(
            html,
            "<p>See <a class=\"work-package\" href=\"/work_packages/2\" title=\"Dependency\">#2</a> \
             and <a class=\"work-package\" href=\"/work_packages/2\" title=\"Dependency\">#2 Dependency</a>.</p>\n"
        );

        let html = render_preview("##3", subjects).unwrap();
        assert!(html.contains("#3 &lt;Tricky&gt; &amp; co</a>"));
    }

    #[test]
    fn test_render_leaves_non_references() {
        assert_eq!(
            render_preview("#99 issue#2 ###2 #2x", subjects).unwrap(),
            "<p>#99 issue#2 ###2 #2x</p>\n"
        );
    }
}
