//! Apache directory listing format.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;

use super::{Format, FormatError, MAX_DESCRIPTION, display_title};
use crate::notification::{Embed, Notification, truncate_chars};

static LISTING_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<img src="/icons/[^"]+" alt="\[([^\]]+)\]"> <a href="([^"]+)">[^<]+</a>\s*(\d{2}-\w{3}-\d{4} \d{2}:\d{2})"#,
    )
    .expect("static regex")
});

pub struct DirectoryFormat;

/// Entry name mapped to its last-modified stamp as shown in the listing.
#[derive(Debug, Default, PartialEq)]
pub struct Listing {
    pub directories: BTreeMap<String, String>,
    pub files: BTreeMap<String, String>,
}

impl Listing {
    pub fn parse(content: &str) -> Self {
        let mut listing = Self::default();
        for caps in LISTING_ROW.captures_iter(content) {
            let stamp = caps[3].to_string();
            if &caps[1] == "DIR" {
                let name = caps[2].strip_suffix('/').unwrap_or(&caps[2]);
                listing.directories.insert(name.to_string(), stamp);
            } else {
                listing.files.insert(caps[2].to_string(), stamp);
            }
        }
        listing
    }
}

#[async_trait]
impl Format for DirectoryFormat {
    async fn format(
        &self,
        url: &Url,
        title: Option<&str>,
        new: &str,
        old: &str,
    ) -> Result<Option<Notification>, FormatError> {
        let old = Listing::parse(old);
        let new = Listing::parse(new);

        let mut sections = compare("files", url, &old.files, &new.files);
        sections.extend(compare("directories", url, &old.directories, &new.directories));
        if sections.is_empty() {
            return Ok(None);
        }

        let description = sections.join("\n");
        Ok(Some(Notification::embed(Embed::branded(
            format!("Directory {} changed!", display_title(url, title)),
            url.to_string(),
            truncate_chars(&description, MAX_DESCRIPTION).to_string(),
        ))))
    }
}

fn compare(
    what: &str,
    url: &Url,
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> Vec<String> {
    let added: Vec<&str> = new.keys().filter(|k| !old.contains_key(*k)).map(String::as_str).collect();
    let removed: Vec<&str> = old.keys().filter(|k| !new.contains_key(*k)).map(String::as_str).collect();
    let changed: Vec<&str> = new
        .iter()
        .filter(|(k, stamp)| old.get(*k).is_some_and(|prev| prev != *stamp))
        .map(|(k, _)| k.as_str())
        .collect();

    [("New", added), ("Removed", removed), ("Changed", changed)]
        .into_iter()
        .filter(|(_, names)| !names.is_empty())
        .map(|(label, names)| format_list(&format!("{label} {what}"), url, &names))
        .collect()
}

fn format_list(heading: &str, url: &Url, names: &[&str]) -> String {
    let base = url.as_str().trim_end_matches('/');
    let items = names
        .iter()
        .map(|name| format!("• [{name}]({base}/{name})"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("**{heading}:**\n{items}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD: &str = r#"<pre><img src="/icons/blank.gif" alt="Icon "> <a href="?C=N;O=D">Name</a>
<img src="/icons/back.gif" alt="[PARENTDIR]"> <a href="/pub/">Parent Directory</a>                             -
<img src="/icons/folder.gif" alt="[DIR]"> <a href="lab1/">lab1/</a>                   12-Feb-2024 10:15    -
<img src="/icons/layout.gif" alt="[   ]"> <a href="uputstvo.pdf">uputstvo.pdf</a>            12-Feb-2024 10:20  120K
<img src="/icons/text.gif" alt="[TXT]"> <a href="rezultati.txt">rezultati.txt</a>           13-Feb-2024 09:00  2.1K
</pre>"#;

    const NEW: &str = r#"<pre><img src="/icons/blank.gif" alt="Icon "> <a href="?C=N;O=D">Name</a>
<img src="/icons/back.gif" alt="[PARENTDIR]"> <a href="/pub/">Parent Directory</a>                             -
<img src="/icons/folder.gif" alt="[DIR]"> <a href="lab1/">lab1/</a>                   12-Feb-2024 10:15    -
<img src="/icons/folder.gif" alt="[DIR]"> <a href="lab2/">lab2/</a>                   20-Feb-2024 08:00    -
<img src="/icons/text.gif" alt="[TXT]"> <a href="rezultati.txt">rezultati.txt</a>           21-Feb-2024 14:30  2.4K
</pre>"#;

    fn url() -> Url {
        Url::parse("https://rti.etf.bg.ac.rs/rti/ir2oo1/").unwrap()
    }

    #[test]
    fn test_parse_listing() {
        let listing = Listing::parse(OLD);
        assert_eq!(listing.directories.len(), 1);
        assert_eq!(listing.directories["lab1"], "12-Feb-2024 10:15");
        assert_eq!(
            listing.files.keys().collect::<Vec<_>>(),
            vec!["rezultati.txt", "uputstvo.pdf"]
        );
    }

    #[tokio::test]
    async fn test_reports_all_kinds_of_change() {
        let notification = DirectoryFormat
            .format(&url(), Some("IR2OO1"), NEW, OLD)
            .await
            .unwrap()
            .unwrap();
        let embed = &notification.embeds[0];

        assert_eq!(embed.title, "Directory IR2OO1 changed!");
        assert_eq!(
            embed.description,
            "**Removed files:**\n• [uputstvo.pdf](https://rti.etf.bg.ac.rs/rti/ir2oo1/uputstvo.pdf)\n\
             **Changed files:**\n• [rezultati.txt](https://rti.etf.bg.ac.rs/rti/ir2oo1/rezultati.txt)\n\
             **New directories:**\n• [lab2](https://rti.etf.bg.ac.rs/rti/ir2oo1/lab2)"
        );
    }

    #[tokio::test]
    async fn test_no_changes() {
        let result = DirectoryFormat.format(&url(), None, OLD, OLD).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_description_is_capped() {
        let rows: String = (0..200)
            .map(|i| {
                format!(
                    "<img src=\"/icons/layout.gif\" alt=\"[   ]\"> <a href=\"predavanje-{i:03}.pdf\">p</a> 01-Mar-2024 12:00\n"
                )
            })
            .collect();
        let notification = DirectoryFormat
            .format(&url(), None, &rows, "")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notification.embeds[0].description.chars().count(), MAX_DESCRIPTION);
    }
}
