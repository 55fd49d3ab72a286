//! Link extraction from fetched pages
//!
//! The pipeline only needs URLs out of a page, never rendered content, so
//! the default parser extracts anchor hrefs from the parsed document and
//! resolves them against the page URL. The parser is a trait seam so tests
//! (and future structured extractors) can substitute their own.

use crate::queue::TargetKind;
use scraper::{Html, Selector};
use url::Url;

/// A link discovered on a fetched page, already typed for the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    pub url: String,
    pub kind: TargetKind,
}

/// What a page yielded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Links to enqueue; empty is valid for leaf pages
    Discovered(Vec<DiscoveredLink>),

    /// The page fetched fine but held nothing this stage could use
    NoData,
}

/// Extracts typed child links from a fetched page
pub trait DocumentParser {
    fn parse(&self, body: &str, kind: TargetKind, base_url: &Url) -> ParseOutcome;
}

/// Default parser: anchor hrefs from the parsed document
///
/// Every same-host link found on a page of kind K becomes a child target of
/// kind K's child. Pages of a leaf kind are complete in themselves and
/// always yield an empty discovery.
pub struct HrefScanParser;

impl DocumentParser for HrefScanParser {
    fn parse(&self, body: &str, kind: TargetKind, base_url: &Url) -> ParseOutcome {
        let child_kind = match kind.child_kind() {
            Some(k) => k,
            // Leaf page: the fetch itself was the goal
            None => return ParseOutcome::Discovered(Vec::new()),
        };

        let document = Html::parse_document(body);

        let mut links = Vec::new();
        if let Ok(selector) = Selector::parse("a[href]") {
            for element in document.select(&selector) {
                let href = match element.value().attr("href") {
                    Some(href) => href,
                    None => continue,
                };
                if let Some(url) = resolve_same_host(href, base_url) {
                    if links.iter().any(|l: &DiscoveredLink| l.url == url) {
                        continue;
                    }
                    links.push(DiscoveredLink {
                        url,
                        kind: child_kind,
                    });
                }
            }
        }

        if links.is_empty() {
            return ParseOutcome::NoData;
        }
        ParseOutcome::Discovered(links)
    }
}

/// Resolves an href against the page URL, keeping only same-host HTTP links
fn resolve_same_host(href: &str, base_url: &Url) -> Option<String> {
    let trimmed = href.trim();

    // Non-navigational schemes and in-page anchors
    if trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with("javascript:")
        || trimmed.starts_with("mailto:")
        || trimmed.starts_with("tel:")
        || trimmed.starts_with("data:")
    {
        return None;
    }

    let mut resolved = base_url.join(trimmed).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    if resolved.host_str() != base_url.host_str() {
        return None;
    }

    // Fragments never distinguish targets
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://stats.example.com/league/17/premier-league").unwrap()
    }

    fn parse(body: &str, kind: TargetKind) -> ParseOutcome {
        HrefScanParser.parse(body, kind, &base())
    }

    #[test]
    fn test_extracts_absolute_and_relative_links() {
        let body = r#"<html><body>
            <a href="https://stats.example.com/season/2024">abs</a>
            <a href="/season/2023">rel</a>
        </body></html>"#;

        let outcome = parse(body, TargetKind::Competition);
        let links = match outcome {
            ParseOutcome::Discovered(links) => links,
            other => panic!("expected discovery, got {:?}", other),
        };
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://stats.example.com/season/2024");
        assert_eq!(links[1].url, "https://stats.example.com/season/2023");
        assert!(links.iter().all(|l| l.kind == TargetKind::SeasonLink));
    }

    #[test]
    fn test_skips_offsite_and_non_navigational() {
        let body = r##"
            <a href="https://other.example.net/x">offsite</a>
            <a href="javascript:void(0)">js</a>
            <a href="mailto:a@b.c">mail</a>
            <a href="#standings">anchor</a>
        "##;
        assert_eq!(parse(body, TargetKind::Competition), ParseOutcome::NoData);
    }

    #[test]
    fn test_deduplicates_and_strips_fragments() {
        let body = r##"
            <a href="/season/2024">one</a>
            <a href="/season/2024#table">same with fragment</a>
        "##;
        let outcome = parse(body, TargetKind::Competition);
        match outcome {
            ParseOutcome::Discovered(links) => assert_eq!(links.len(), 1),
            other => panic!("expected discovery, got {:?}", other),
        }
    }

    #[test]
    fn test_uppercase_and_unquoted_hrefs() {
        // Real markup is not always tidy; the document parser normalizes
        // attribute case and unquoted values
        let body = r#"<html><body>
            <a HREF="/season/2024">upper</a>
            <a href=/season/2023>unquoted</a>
        </body></html>"#;

        match parse(body, TargetKind::Competition) {
            ParseOutcome::Discovered(links) => {
                assert_eq!(links.len(), 2);
                assert_eq!(links[0].url, "https://stats.example.com/season/2024");
                assert_eq!(links[1].url, "https://stats.example.com/season/2023");
            }
            other => panic!("expected discovery, got {:?}", other),
        }
    }

    #[test]
    fn test_single_quoted_hrefs() {
        let body = "<a href='/season/2022'>q</a>";
        match parse(body, TargetKind::Competition) {
            ParseOutcome::Discovered(links) => {
                assert_eq!(links[0].url, "https://stats.example.com/season/2022")
            }
            other => panic!("expected discovery, got {:?}", other),
        }
    }

    #[test]
    fn test_child_kind_follows_hierarchy() {
        let body = r#"<a href="/m/901">match</a>"#;
        match parse(body, TargetKind::SeasonLink) {
            ParseOutcome::Discovered(links) => assert_eq!(links[0].kind, TargetKind::Match),
            other => panic!("expected discovery, got {:?}", other),
        }
    }

    #[test]
    fn test_leaf_kind_yields_empty_discovery() {
        let body = r#"<a href="/somewhere">ignored</a>"#;
        assert_eq!(
            parse(body, TargetKind::MatchDetail),
            ParseOutcome::Discovered(Vec::new())
        );
    }

    #[test]
    fn test_linkless_page_is_no_data() {
        assert_eq!(
            parse("<html><body>empty</body></html>", TargetKind::Match),
            ParseOutcome::NoData
        );
    }
}
