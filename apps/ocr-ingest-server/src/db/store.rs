//! Persistence seam used by the ingestion pipeline

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::documents::{
    Document, DocumentRepository, ExtractedText, ExtractedTextRepository, NewDocument,
    NewExtractedText,
};
use crate::error::Result;

/// Durable writes the pipeline needs.
///
/// Each call is atomic on its own; no transaction spans both.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(&self, new: &NewDocument) -> Result<Document>;

    async fn create_extracted_text(&self, new: &NewExtractedText) -> Result<ExtractedText>;
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn create_document(&self, new: &NewDocument) -> Result<Document> {
        DocumentRepository::new(&self.pool).create(new).await
    }

    async fn create_extracted_text(&self, new: &NewExtractedText) -> Result<ExtractedText> {
        ExtractedTextRepository::new(&self.pool).create(new).await
    }
}
