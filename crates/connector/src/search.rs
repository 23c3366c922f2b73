//! Search index client: cursor-paginated id retrieval.
//!
//! The index is queried Solr-style: results are sorted by the unique id
//! key so a cursor mark yields a deterministic, resumable traversal.
//! Pagination terminates when the index echoes the cursor mark it was
//! given.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::config_store::parse_base_url;
use crate::error::ConnectorError;

/// Cursor mark starting a fresh traversal.
pub const FIRST_CURSOR_MARK: &str = "*";

/// One page of a cursor traversal.
#[derive(Debug, Clone)]
pub struct SearchPage {
    /// Record ids in `bib:agency` form, in stable sort order.
    pub ids: Vec<String>,
    /// Cursor mark for the next page; equal to the requested mark when
    /// the traversal is exhausted.
    pub next_cursor_mark: String,
    /// Total matches for the query, independent of paging.
    pub num_found: u64,
}

/// Call surface the record searcher needs from the index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Fetch one page of up to `rows` ids starting at `cursor_mark`.
    async fn fetch_page(
        &self,
        collection: &str,
        query: &str,
        cursor_mark: &str,
        rows: u32,
    ) -> Result<SearchPage, ConnectorError>;

    /// Zero-row fetch returning only the match count.
    async fn count(&self, collection: &str, query: &str) -> Result<u64, ConnectorError>;
}

/// HTTP implementation against a Solr-compatible index.
pub struct HttpSearchIndex {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct SelectResponse {
    response: ResponseBody,
    #[serde(rename = "nextCursorMark")]
    next_cursor_mark: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(rename = "numFound")]
    num_found: u64,
    docs: Vec<Doc>,
}

#[derive(Debug, Deserialize)]
struct Doc {
    id: String,
}

impl HttpSearchIndex {
    pub fn new(base_url: &str) -> Result<Self, ConnectorError> {
        let base_url = parse_base_url(base_url)?;
        info!(url = %base_url, "search index connector initialized");
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    async fn select(
        &self,
        collection: &str,
        query: &str,
        cursor_mark: Option<&str>,
        rows: u32,
    ) -> Result<SelectResponse, ConnectorError> {
        let mut url = self
            .base_url
            .join(&format!("{collection}/select"))
            .map_err(|e| ConnectorError::Url(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", query)
                .append_pair("wt", "json")
                .append_pair("fl", "id")
                .append_pair("rows", &rows.to_string());
            if let Some(mark) = cursor_mark {
                // cursorMark requires a total sort order on the unique key
                pairs
                    .append_pair("sort", "id asc")
                    .append_pair("cursorMark", mark);
            }
        }
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| ConnectorError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SearchIndex for HttpSearchIndex {
    async fn fetch_page(
        &self,
        collection: &str,
        query: &str,
        cursor_mark: &str,
        rows: u32,
    ) -> Result<SearchPage, ConnectorError> {
        let body = self.select(collection, query, Some(cursor_mark), rows).await?;
        let next_cursor_mark = body
            .next_cursor_mark
            .ok_or_else(|| ConnectorError::Decode("missing nextCursorMark".to_string()))?;
        Ok(SearchPage {
            ids: body.response.docs.into_iter().map(|d| d.id).collect(),
            next_cursor_mark,
            num_found: body.response.num_found,
        })
    }

    async fn count(&self, collection: &str, query: &str) -> Result<u64, ConnectorError> {
        let body = self.select(collection, query, None, 0).await?;
        Ok(body.response.num_found)
    }
}
