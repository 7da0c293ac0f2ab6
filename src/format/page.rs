//! Line-diff format for ordinary pages.
//!
//! Removals and one-line edits are shown as a `diff` code block. Pure
//! additions of several lines are usually new announcements, so those are
//! rendered as Markdown instead.

use async_trait::async_trait;
use reqwest::Url;
use scraper::{ElementRef, Html, Node};
use similar::{ChangeTag, TextDiff};
use tracing::debug;

use super::{Format, FormatError, MAX_DESCRIPTION, display_title};
use crate::notification::{Embed, Notification};

pub const TOO_LARGE: &str = "Prevelike izmene, ne može se generisati pregled.";

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub struct PageFormat;

/// A contiguous block of inserted or deleted lines.
#[derive(Debug, PartialEq)]
struct Run {
    tag: ChangeTag,
    lines: Vec<String>,
}

impl Run {
    fn text(&self) -> String {
        self.lines.join("\n")
    }
}

#[async_trait]
impl Format for PageFormat {
    async fn format(
        &self,
        url: &Url,
        title: Option<&str>,
        new: &str,
        old: &str,
    ) -> Result<Option<Notification>, FormatError> {
        if new == old {
            return Ok(None);
        }

        let runs = changed_runs(old, new);
        let count = |tag: ChangeTag| {
            runs.iter()
                .filter(|run| run.tag == tag)
                .map(|run| run.lines.len())
                .sum::<usize>()
        };
        let removed = count(ChangeTag::Delete);
        let added = count(ChangeTag::Insert);

        let relay = if removed > 0 || added == 1 {
            let diff = render_diff(&runs);
            if diff.is_empty() {
                debug!("But the changes weren't there.");
                return Ok(None);
            }
            format!("```diff\n{diff}```")
        } else {
            let added_html = runs
                .iter()
                .filter(|run| run.tag == ChangeTag::Insert)
                .map(Run::text)
                .collect::<Vec<_>>()
                .join(" ");
            htmd::convert(&rewrite_links(&added_html, url))
                .map_err(|e| FormatError::Markdown(e.to_string()))?
        };

        let description = if relay.chars().count() > MAX_DESCRIPTION {
            TOO_LARGE.to_string()
        } else {
            relay
        };

        Ok(Some(Notification::embed(Embed::branded(
            format!("Stranica '{}' ažurirana!", display_title(url, title)),
            url.to_string(),
            description,
        ))))
    }
}

fn changed_runs(old: &str, new: &str) -> Vec<Run> {
    // Both sides end in a newline, so an appended line leaves the previous last line equal.
    let old = format!("{old}\n");
    let new = format!("{new}\n");
    let diff = TextDiff::from_lines(old.as_str(), new.as_str());

    let mut runs: Vec<Run> = Vec::new();
    let mut previous = ChangeTag::Equal;
    for change in diff.iter_all_changes() {
        let tag = change.tag();
        if tag != ChangeTag::Equal {
            let line = change.value().trim_end_matches(['\n', '\r']).to_string();
            match runs.last_mut() {
                Some(run) if previous == tag => run.lines.push(line),
                _ => runs.push(Run { tag, lines: vec![line] }),
            }
        }
        previous = tag;
    }
    runs
}

fn render_diff(runs: &[Run]) -> String {
    runs.iter()
        .map(|run| {
            let sign = if run.tag == ChangeTag::Insert { '+' } else { '-' };
            run.text()
                .trim()
                .split('\n')
                .map(|line| format!("{sign} {line}"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Make anchors safe to render outside the page: relative links become
/// absolute, `mailto:` links collapse to their text and anchors without a
/// target are dropped entirely. Other markup is re-serialized as parsed.
fn rewrite_links(html: &str, page: &Url) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    write_children(fragment.root_element(), page, &mut out);
    out
}

fn write_children(element: ElementRef<'_>, page: &Url, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape(text, false)),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(child, page, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(element: ElementRef<'_>, page: &Url, out: &mut String) {
    let name = element.value().name();
    if name == "a" {
        let Some(href) = element.value().attr("href") else {
            return;
        };
        if href.starts_with("mailto:") {
            write_children(element, page, out);
            return;
        }
        out.push_str(&format!(r#"<a href="{}">"#, escape(&absolute_link(href, page), true)));
        write_children(element, page, out);
        out.push_str("</a>");
        return;
    }

    out.push('<');
    out.push_str(name);
    for (key, value) in element.value().attrs() {
        out.push_str(&format!(r#" {key}="{}""#, escape(value, true)));
    }
    out.push('>');
    if VOID_ELEMENTS.contains(&name) {
        return;
    }
    write_children(element, page, out);
    out.push_str(&format!("</{name}>"));
}

fn absolute_link(href: &str, page: &Url) -> String {
    let origin = page.origin().ascii_serialization();
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{origin}{href}")
    } else {
        let directory = match page.path().rfind('/') {
            Some(idx) => &page.path()[..=idx],
            None => "/",
        };
        format!("{origin}{directory}{href}")
    }
}

fn escape(s: &str, attribute: bool) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' if attribute => result.push_str("&quot;"),
            _ => result.push(c),
        }
    }
    result
}
