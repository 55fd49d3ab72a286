//! Browser header profiles
//!
//! A fixed table of realistic browser fingerprints. One profile is paired
//! with each identity and kept stable across a short run of requests so the
//! traffic reads as a single browsing session, including a `Referer` carried
//! forward between consecutive navigations.

use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};

/// A realistic browser fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderProfile {
    pub name: &'static str,
    pub user_agent: &'static str,
    pub accept: &'static str,
    pub accept_language: &'static str,
    pub sec_ch_ua: Option<&'static str>,
    pub sec_fetch_mode: &'static str,
    pub sec_fetch_dest: &'static str,
}

/// The fingerprint table
///
/// Chrome/Firefox/Safari/Edge across Windows and macOS; the exact versions
/// are refreshed occasionally but stay realistic rather than current.
pub const PROFILES: &[HeaderProfile] = &[
    HeaderProfile {
        name: "chrome-windows",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        sec_ch_ua: Some("\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\""),
        sec_fetch_mode: "navigate",
        sec_fetch_dest: "document",
    },
    HeaderProfile {
        name: "chrome-macos",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        sec_ch_ua: Some("\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\""),
        sec_fetch_mode: "navigate",
        sec_fetch_dest: "document",
    },
    HeaderProfile {
        name: "firefox-windows",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.5",
        sec_ch_ua: None,
        sec_fetch_mode: "navigate",
        sec_fetch_dest: "document",
    },
    HeaderProfile {
        name: "safari-macos",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_language: "en-GB,en;q=0.9",
        sec_ch_ua: None,
        sec_fetch_mode: "navigate",
        sec_fetch_dest: "document",
    },
    HeaderProfile {
        name: "edge-windows",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        sec_ch_ua: Some("\"Chromium\";v=\"124\", \"Microsoft Edge\";v=\"124\", \"Not-A.Brand\";v=\"99\""),
        sec_fetch_mode: "navigate",
        sec_fetch_dest: "document",
    },
];

/// Picks a random profile from the table
pub fn random_profile() -> &'static HeaderProfile {
    PROFILES
        .choose(&mut rand::thread_rng())
        .expect("profile table is non-empty")
}

/// Looks up a profile by name
pub fn profile_by_name(name: &str) -> Option<&'static HeaderProfile> {
    PROFILES.iter().find(|p| p.name == name)
}

/// A simulated navigation sequence
///
/// Holds the profile stable and carries the previous URL forward as the
/// `Referer` of the next request.
#[derive(Debug)]
pub struct BrowsingSession {
    profile: &'static HeaderProfile,
    referer: Option<String>,
}

impl BrowsingSession {
    pub fn new(profile: &'static HeaderProfile) -> Self {
        Self {
            profile,
            referer: None,
        }
    }

    pub fn profile(&self) -> &'static HeaderProfile {
        self.profile
    }

    /// Builds the per-request headers for the next navigation
    ///
    /// The first request of a session carries `Sec-Fetch-Site: none` (typed
    /// address); subsequent ones carry the referer and `same-origin`.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(ACCEPT, static_value(self.profile.accept));
        headers.insert(ACCEPT_LANGUAGE, static_value(self.profile.accept_language));
        headers.insert(
            HeaderName::from_static("sec-fetch-mode"),
            static_value(self.profile.sec_fetch_mode),
        );
        headers.insert(
            HeaderName::from_static("sec-fetch-dest"),
            static_value(self.profile.sec_fetch_dest),
        );

        if let Some(sec_ch_ua) = self.profile.sec_ch_ua {
            headers.insert(HeaderName::from_static("sec-ch-ua"), static_value(sec_ch_ua));
        }

        match &self.referer {
            Some(referer) => {
                if let Ok(value) = HeaderValue::from_str(referer) {
                    headers.insert(REFERER, value);
                }
                headers.insert(
                    HeaderName::from_static("sec-fetch-site"),
                    HeaderValue::from_static("same-origin"),
                );
            }
            None => {
                headers.insert(
                    HeaderName::from_static("sec-fetch-site"),
                    HeaderValue::from_static("none"),
                );
            }
        }

        headers
    }

    /// Records that `url` was visited, so the next request refers back to it
    pub fn record_navigation(&mut self, url: &str) {
        self.referer = Some(url.to_string());
    }

    pub fn referer(&self) -> Option<&str> {
        self.referer.as_deref()
    }
}

fn static_value(s: &'static str) -> HeaderValue {
    HeaderValue::from_static(s)
}
