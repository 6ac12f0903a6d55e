use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::Response;

pub const WIKI_API_BASE: &str = "https://en.wikipedia.org/api/rest_v1";
pub const DOI_API_BASE: &str = "https://doi-extract.vercel.app/api/doi";

pub const WIKI_LOAD_ERROR: &str = "Failed to load Wikipedia preview";
pub const DOI_LOAD_ERROR: &str = "Failed to load DOI preview";

/// What a greenlink href points at, by prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreviewTarget {
    Wiki(String),
    Doi(String),
    External(String),
}

impl PreviewTarget {
    pub fn classify(url: &str) -> Self {
        if let Some(title) = url.strip_prefix("wiki:") {
            PreviewTarget::Wiki(title.to_string())
        } else if let Some(id) = url.strip_prefix("doi:") {
            PreviewTarget::Doi(id.to_string())
        } else {
            PreviewTarget::External(url.to_string())
        }
    }

    /// Browser-openable form of the target.
    pub fn external_url(&self) -> String {
        match self {
            PreviewTarget::Wiki(title) => {
                format!("https://en.wikipedia.org/wiki/{}", urlencoding::encode(title))
            }
            PreviewTarget::Doi(id) => format!("https://doi.org/{id}"),
            PreviewTarget::External(url) => url.clone(),
        }
    }
}

pub fn wiki_summary_url(title: &str) -> String {
    format!("{WIKI_API_BASE}/page/summary/{}", urlencoding::encode(title))
}

pub fn wiki_title_url(title: &str) -> String {
    format!("{WIKI_API_BASE}/page/title/{}", urlencoding::encode(title))
}

pub fn doi_lookup_url(id: &str) -> String {
    format!("{DOI_API_BASE}/{}", urlencoding::encode(id))
}

/// Subset of the Wikipedia REST `page/summary` payload the popup shows.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct WikiSummary {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub extract: Option<String>,
    #[serde(default)]
    pub extract_html: Option<String>,
    #[serde(skip)]
    pub last_modified: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WikiTitleListing {
    #[serde(default)]
    pub items: Vec<WikiTitleItem>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WikiTitleItem {
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// DOI metadata as served by the doi-extract endpoint.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DoiMetadata {
    #[serde(default)]
    pub doi: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub full_journal: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub first_page: Option<String>,
    #[serde(default)]
    pub last_page: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
}

impl DoiMetadata {
    /// `authors (year). title. journal[, volume][(issue)][, first-last]. DOI: doi`
    pub fn citation(&self) -> String {
        let mut out = String::new();
        if !self.authors.is_empty() {
            out.push_str(&self.authors.join(", "));
            out.push(' ');
        }
        if let Some(year) = self.year {
            out.push_str(&format!("({year}). "));
        }
        if !self.title.is_empty() {
            out.push_str(&self.title);
            out.push_str(". ");
        }
        if let Some(journal) = &self.full_journal {
            out.push_str(journal);
            if let Some(volume) = &self.volume {
                out.push_str(&format!(", {volume}"));
            }
            if let Some(issue) = &self.issue {
                out.push_str(&format!("({issue})"));
            }
            if let (Some(first), Some(last)) = (&self.first_page, &self.last_page) {
                out.push_str(&format!(", {first}-{last}"));
            }
            out.push_str(". ");
        }
        out.push_str(&format!("DOI: {}", self.doi));
        out
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PreviewError {
    #[error("no window object")]
    NoWindow,
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("could not decode response: {0}")]
    Decode(String),
}

async fn fetch_json<T: DeserializeOwned>(url: &str) -> Result<T, PreviewError> {
    let window = web_sys::window().ok_or(PreviewError::NoWindow)?;
    let response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|err| PreviewError::Request(format!("{err:?}")))?;
    let response: Response = response
        .dyn_into()
        .map_err(|err| PreviewError::Request(format!("{err:?}")))?;
    if !response.ok() {
        return Err(PreviewError::Status(response.status()));
    }
    let promise = response
        .json()
        .map_err(|err| PreviewError::Request(format!("{err:?}")))?;
    let value = JsFuture::from(promise)
        .await
        .map_err(|err| PreviewError::Decode(format!("{err:?}")))?;
    serde_wasm_bindgen::from_value(value).map_err(|err| PreviewError::Decode(err.to_string()))
}

/// Fetches the Wikipedia summary plus the title listing, whose first item
/// carries the last-modified timestamp. Either request failing fails the
/// preview.
pub async fn fetch_wiki_preview(title: &str) -> Result<WikiSummary, PreviewError> {
    let mut summary: WikiSummary = fetch_json(&wiki_summary_url(title)).await?;
    let listing: WikiTitleListing = fetch_json(&wiki_title_url(title)).await?;
    summary.last_modified = listing
        .items
        .into_iter()
        .next()
        .and_then(|item| item.timestamp);
    Ok(summary)
}

pub async fn fetch_doi_preview(id: &str) -> Result<DoiMetadata, PreviewError> {
    fetch_json(&doi_lookup_url(id)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_targets_by_prefix() {
        assert_eq!(
            PreviewTarget::classify("wiki:Rust (programming language)"),
            PreviewTarget::Wiki("Rust (programming language)".to_string())
        );
        assert_eq!(
            PreviewTarget::classify("doi:10.1000/xyz123"),
            PreviewTarget::Doi("10.1000/xyz123".to_string())
        );
        assert_eq!(
            PreviewTarget::classify("http://x/home"),
            PreviewTarget::External("http://x/home".to_string())
        );
    }

    #[test]
    fn builds_external_urls() {
        assert_eq!(
            PreviewTarget::classify("wiki:Ada Lovelace").external_url(),
            "https://en.wikipedia.org/wiki/Ada%20Lovelace"
        );
        assert_eq!(
            PreviewTarget::classify("doi:10.1/a").external_url(),
            "https://doi.org/10.1/a"
        );
        assert_eq!(
            PreviewTarget::classify("http://x/home").external_url(),
            "http://x/home"
        );
    }

    #[test]
    fn builds_encoded_api_urls() {
        assert_eq!(
            wiki_summary_url("Ada Lovelace"),
            "https://en.wikipedia.org/api/rest_v1/page/summary/Ada%20Lovelace"
        );
        assert_eq!(
            wiki_title_url("Ada Lovelace"),
            "https://en.wikipedia.org/api/rest_v1/page/title/Ada%20Lovelace"
        );
        assert_eq!(
            doi_lookup_url("10.1000/xyz123"),
            "https://doi-extract.vercel.app/api/doi/10.1000%2Fxyz123"
        );
    }

    #[test]
    fn formats_full_citation() {
        let meta = DoiMetadata {
            doi: "10.1000/xyz123".to_string(),
            title: "A Study".to_string(),
            authors: vec!["Doe, J.".to_string(), "Roe, R.".to_string()],
            year: Some(2021),
            full_journal: Some("Journal of Examples".to_string()),
            volume: Some("12".to_string()),
            issue: Some("3".to_string()),
            first_page: Some("100".to_string()),
            last_page: Some("110".to_string()),
            abstract_text: None,
        };
        assert_eq!(
            meta.citation(),
            "Doe, J., Roe, R. (2021). A Study. Journal of Examples, 12(3), 100-110. \
             DOI: 10.1000/xyz123"
        );
    }

    #[test]
    fn citation_skips_missing_fields() {
        let meta = DoiMetadata {
            doi: "10.1/a".to_string(),
            title: "Untitled".to_string(),
            ..Default::default()
        };
        assert_eq!(meta.citation(), "Untitled. DOI: 10.1/a");
    }

    #[test]
    fn decodes_wiki_summary_payload() {
        let summary: WikiSummary = serde_json::from_str(
            r#"{
                "title": "Ada Lovelace",
                "description": "English mathematician",
                "extract": "Ada Lovelace was…",
                "extract_html": "<p>Ada Lovelace was…</p>",
                "thumbnail": {"source": "http://img"}
            }"#,
        )
        .unwrap();
        assert_eq!(summary.title, "Ada Lovelace");
        assert_eq!(
            summary.description.as_deref(),
            Some("English mathematician")
        );
        assert!(summary.extract_html.is_some());
        assert_eq!(summary.last_modified, None);
    }

    #[test]
    fn decodes_title_listing_payload() {
        let listing: WikiTitleListing = serde_json::from_str(
            r#"{"items": [{"title": "Ada_Lovelace", "timestamp": "2024-01-02T03:04:05Z"}]}"#,
        )
        .unwrap();
        assert_eq!(
            listing.items[0].timestamp.as_deref(),
            Some("2024-01-02T03:04:05Z")
        );
    }

    #[test]
    fn decodes_doi_payload() {
        let meta: DoiMetadata = serde_json::from_str(
            r#"{
                "doi": "10.1000/xyz123",
                "title": "A Study",
                "authors": ["Doe, J."],
                "year": 2021,
                "fullJournal": "Journal of Examples",
                "volume": "12",
                "issue": "3",
                "firstPage": "100",
                "lastPage": "110",
                "abstract": "Findings."
            }"#,
        )
        .unwrap();
        assert_eq!(meta.full_journal.as_deref(), Some("Journal of Examples"));
        assert_eq!(meta.abstract_text.as_deref(), Some("Findings."));
        assert_eq!(meta.year, Some(2021));
    }
}
