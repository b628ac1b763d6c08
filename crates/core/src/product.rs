//! Product records and search hits

use serde::{Deserialize, Serialize};

/// One catalog row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub title: String,
    #[serde(default)]
    pub product_specs: String,
    #[serde(default)]
    pub current_price: String,
    #[serde(default)]
    pub product_promotion: String,
    #[serde(default)]
    pub color_options: String,
}

impl Product {
    /// Text blob that gets embedded, indexed and shown to the model
    pub fn information(&self) -> String {
        format!(
            "Tên sản phẩm: {}\nMô tả: {}\nGiá: {}\nƯu đãi: {}\nMàu sắc: {}\n",
            self.title,
            self.product_specs,
            self.current_price,
            self.product_promotion,
            self.color_options
        )
    }

    /// Document form stored in the search backends
    pub fn to_document(&self) -> ProductDocument {
        ProductDocument {
            title: self.title.clone(),
            information: self.information(),
        }
    }
}

/// What every store persists per product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDocument {
    pub title: String,
    pub information: String,
}

impl From<&Product> for ProductDocument {
    fn from(product: &Product) -> Self {
        product.to_document()
    }
}

/// Search result returned by a store, optionally rescored by a reranker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductHit {
    pub title: String,
    pub information: String,
    /// Similarity or relevance score reported by the store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl ProductHit {
    pub fn new(title: impl Into<String>, information: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            information: information.into(),
            score: None,
            rerank_score: None,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }
}

impl From<ProductDocument> for ProductHit {
    fn from(doc: ProductDocument) -> Self {
        ProductHit::new(doc.title, doc.information)
    }
}
