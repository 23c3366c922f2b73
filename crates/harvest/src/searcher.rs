//! Record discovery against the search index.
//!
//! Cursor-based pagination with a fixed page size, sorted by the unique
//! id key, so a traversal is deterministic and resumable. Discovered ids
//! stream into the cycle's staging file; smaller previews collect
//! in-memory; dry-run validation fetches only the match count.

use std::sync::Arc;

use tracing::debug;

use bibharvest_connector::{SearchIndex, FIRST_CURSOR_MARK};
use bibharvest_core::HarvesterError;

use crate::staging::StagingWriter;

/// Fixed page size for cursor traversals.
pub const SEARCH_PAGE_SIZE: u32 = 5000;

pub struct RecordSearcher {
    index: Arc<dyn SearchIndex>,
}

impl RecordSearcher {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    /// Stream all ids matching `query` into the staging file, returning
    /// the total number of matches reported by the index.
    pub async fn search_into(
        &self,
        collection: &str,
        query: &str,
        writer: &mut StagingWriter,
    ) -> Result<u64, HarvesterError> {
        let mut num_found = 0;
        self.traverse(collection, query, |page_ids, total| {
            num_found = total;
            for id in page_ids {
                writer.append(id)?;
            }
            Ok(())
        })
        .await?;
        Ok(num_found)
    }

    /// Collect all matching ids in-memory, for previews and the
    /// holdings-combined dry run.
    pub async fn search_to_vec(
        &self,
        collection: &str,
        query: &str,
    ) -> Result<Vec<String>, HarvesterError> {
        let mut ids = Vec::new();
        self.traverse(collection, query, |page_ids, _| {
            ids.extend(page_ids.iter().cloned());
            Ok(())
        })
        .await?;
        Ok(ids)
    }

    /// Zero-row fetch returning only the match count.
    pub async fn validate_count(
        &self,
        collection: &str,
        query: &str,
    ) -> Result<u64, HarvesterError> {
        self.index
            .count(collection, query)
            .await
            .map_err(|e| HarvesterError::SearchIndex(e.to_string()))
    }

    async fn traverse<F>(
        &self,
        collection: &str,
        query: &str,
        mut on_page: F,
    ) -> Result<(), HarvesterError>
    where
        F: FnMut(&[String], u64) -> Result<(), std::io::Error>,
    {
        let mut cursor_mark = FIRST_CURSOR_MARK.to_string();
        loop {
            let page = self
                .index
                .fetch_page(collection, query, &cursor_mark, SEARCH_PAGE_SIZE)
                .await
                .map_err(|e| HarvesterError::SearchIndex(e.to_string()))?;
            debug!(
                ids = page.ids.len(),
                num_found = page.num_found,
                "fetched search page"
            );
            on_page(&page.ids, page.num_found)?;
            // The index echoes the cursor mark when the traversal is done.
            if page.next_cursor_mark == cursor_mark || page.ids.is_empty() {
                return Ok(());
            }
            cursor_mark = page.next_cursor_mark;
        }
    }
}
