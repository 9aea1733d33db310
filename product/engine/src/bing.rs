//! Bing Images result pages: building the paginated search URL and pulling
//! full-size image links out of the returned markup.

use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

use crate::{EngineError, Result};

pub const SEARCH_ENDPOINT: &str = "https://www.bing.com/images/async";

static MURL_RE: OnceLock<Regex> = OnceLock::new();

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHit {
    /// Full-size image URL.
    pub url: String,
    /// Bing-hosted thumbnail, used when the full-size link fails.
    pub thumb_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultMeta {
    murl: Option<String>,
    turl: Option<String>,
}

/// URL of the result page holding results `first ..= first + count - 1`,
/// served from `endpoint` (normally [`SEARCH_ENDPOINT`]).
pub fn search_page_url(endpoint: &str, keyword: &str, first: usize, count: usize) -> Result<String> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| EngineError::InvalidRequest(format!("bad search endpoint {endpoint:?}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("q", keyword)
        .append_pair("first", &first.to_string())
        .append_pair("count", &count.max(1).to_string())
        .append_pair("adlt", "off")
        .append_pair("qft", "");
    Ok(url.to_string())
}

/// Extracts image hits in ranking order, without duplicates.
pub fn parse_search_page(html: &str) -> Vec<ImageHit> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a.iusc[m]").expect("iusc selector");

    let mut seen: HashSet<String> = HashSet::new();
    let mut hits: Vec<ImageHit> = Vec::new();

    for anchor in document.select(&selector) {
        let Some(raw_meta) = anchor.value().attr("m") else {
            continue;
        };
        let Ok(meta) = serde_json::from_str::<ResultMeta>(raw_meta) else {
            continue;
        };
        let Some(url) = meta.murl.as_deref().and_then(normalize_http_url) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        hits.push(ImageHit {
            url,
            thumb_url: meta.turl.as_deref().and_then(normalize_http_url),
        });
    }

    if hits.is_empty() {
        // Markup drifted; the metadata blob is usually still present verbatim.
        let re = MURL_RE.get_or_init(|| {
            Regex::new(r#"murl(?:&quot;|")\s*:\s*(?:&quot;|")(.*?)(?:&quot;|")"#)
                .expect("murl regex")
        });
        for caps in re.captures_iter(html) {
            let raw = caps[1].replace("&amp;", "&").replace("\\/", "/");
            let Some(url) = normalize_http_url(&raw) else {
                continue;
            };
            if seen.insert(url.clone()) {
                hits.push(ImageHit {
                    url,
                    thumb_url: None,
                });
            }
        }
    }

    hits
}

fn normalize_http_url(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut parsed = Url::parse(trimmed).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    parsed.set_fragment(None);
    Some(parsed.to_string())
}
