//! Keyword search using Tantivy (BM25)
//!
//! Embedded alternative to Elasticsearch: same two searchable fields,
//! `title` and `information`, kept in RAM or in an on-disk directory.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use tantivy::{
    collector::{Count, TopDocs},
    query::{QueryParser, TermQuery},
    schema::{
        Field, IndexRecordOption, OwnedValue, Schema, TextFieldIndexing, TextOptions, STORED,
        STRING,
    },
    tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer},
    Index, IndexReader, IndexWriter, TantivyDocument, Term,
};

use sales_rag_config::TantivySettings;
use sales_rag_core::{ProductDocument, ProductHit, ProductStore, StoreKind};

use crate::{document_id, RagError};

const TOKENIZER: &str = "vi_simple";
const WRITER_BUDGET_BYTES: usize = 50_000_000;

/// Keyword index configuration
#[derive(Debug, Clone, Default)]
pub struct KeywordIndexConfig {
    /// Index path (use RAM if None)
    pub index_path: Option<String>,
}

impl From<&TantivySettings> for KeywordIndexConfig {
    fn from(settings: &TantivySettings) -> Self {
        Self {
            index_path: settings.path.clone(),
        }
    }
}

/// BM25 keyword index over product documents
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id_field: Field,
    title_field: Field,
    title_exact_field: Field,
    information_field: Field,
}

impl KeywordIndex {
    pub fn new(config: KeywordIndexConfig) -> Result<Self, RagError> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(TOKENIZER)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let title_field = schema_builder.add_text_field("title", text_options.clone());
        let title_exact_field = schema_builder.add_text_field("title_exact", STRING);
        let information_field = schema_builder.add_text_field("information", text_options);
        let schema = schema_builder.build();

        let index = match config.index_path {
            Some(ref path) => {
                std::fs::create_dir_all(path).map_err(|e| RagError::Index(e.to_string()))?;
                let dir = tantivy::directory::MmapDirectory::open(Path::new(path))
                    .map_err(|e| RagError::Index(e.to_string()))?;
                Index::open_or_create(dir, schema).map_err(|e| RagError::Index(e.to_string()))?
            }
            None => Index::create_in_ram(schema),
        };

        // SimpleTokenizer splits on non-alphanumerics and keeps Vietnamese
        // diacritics intact
        let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser)
            .build();
        index.tokenizers().register(TOKENIZER, tokenizer);

        let reader = index.reader().map_err(|e| RagError::Index(e.to_string()))?;
        let writer = index
            .writer(WRITER_BUDGET_BYTES)
            .map_err(|e| RagError::Index(e.to_string()))?;

        tracing::info!(
            path = config.index_path.as_deref().unwrap_or("<ram>"),
            "Keyword index opened"
        );

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            id_field,
            title_field,
            title_exact_field,
            information_field,
        })
    }

    /// In-memory index
    pub fn in_ram() -> Result<Self, RagError> {
        Self::new(KeywordIndexConfig::default())
    }

    /// Add or replace a document, keyed by title
    pub fn index_document(&self, doc: &ProductDocument) -> Result<(), RagError> {
        let id = document_id(&doc.title);
        let mut writer = self.writer.lock();

        writer.delete_term(Term::from_field_text(self.id_field, &id));

        let mut tantivy_doc = TantivyDocument::default();
        tantivy_doc.add_text(self.id_field, &id);
        tantivy_doc.add_text(self.title_field, &doc.title);
        tantivy_doc.add_text(self.title_exact_field, &doc.title);
        tantivy_doc.add_text(self.information_field, &doc.information);

        writer
            .add_document(tantivy_doc)
            .map_err(|e| RagError::Index(e.to_string()))?;
        writer.commit().map_err(|e| RagError::Index(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| RagError::Index(e.to_string()))?;
        Ok(())
    }

    /// BM25 search over title and information
    pub fn search_text(&self, query: &str, limit: usize) -> Result<Vec<ProductHit>, RagError> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query_parser =
            QueryParser::for_index(&self.index, vec![self.title_field, self.information_field]);

        // Lenient parsing: customer text is full of '?' and quotes
        let (query, errors) = query_parser.parse_query_lenient(query);
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "Query parsed leniently");
        }

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| RagError::Search(e.to_string()))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| RagError::Search(e.to_string()))?;

            let text = |field: Field| match doc.get_first(field) {
                Some(OwnedValue::Str(s)) => s.to_string(),
                _ => String::new(),
            };

            hits.push(
                ProductHit::new(text(self.title_field), text(self.information_field))
                    .with_score(score),
            );
        }
        Ok(hits)
    }

    pub fn has_title(&self, title: &str) -> Result<bool, RagError> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.title_exact_field, title),
            IndexRecordOption::Basic,
        );
        let count = searcher
            .search(&query, &Count)
            .map_err(|e| RagError::Search(e.to_string()))?;
        Ok(count > 0)
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

#[async_trait]
impl ProductStore for KeywordIndex {
    fn kind(&self) -> StoreKind {
        StoreKind::Keyword
    }

    async fn ensure_ready(&self) -> sales_rag_core::Result<()> {
        Ok(())
    }

    async fn count(&self) -> sales_rag_core::Result<u64> {
        Ok(self.doc_count())
    }

    async fn exists(&self, title: &str) -> sales_rag_core::Result<bool> {
        Ok(self.has_title(title)?)
    }

    async fn insert(
        &self,
        doc: &ProductDocument,
        _embedding: Option<&[f32]>,
    ) -> sales_rag_core::Result<()> {
        Ok(self.index_document(doc)?)
    }

    async fn search(
        &self,
        text: &str,
        _embedding: Option<&[f32]>,
        limit: usize,
    ) -> sales_rag_core::Result<Vec<ProductHit>> {
        Ok(self.search_text(text, limit)?)
    }

    fn name(&self) -> &str {
        "tantivy"
    }
}
