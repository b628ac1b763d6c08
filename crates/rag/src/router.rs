//! Semantic router
//!
//! Classifies a query as one of a few named routes by comparing its
//! embedding against pre-embedded sample phrases. Queries that are not
//! close enough to any route come back as `uncertain`.

use std::sync::Arc;

use serde::Serialize;

use sales_rag_config::constants::router::UNCERTAIN;
use sales_rag_config::{Aggregation, RouteSettings, RouterSettings};
use sales_rag_core::Embedder;

use crate::RagError;

/// A named route and its sample phrases
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub name: String,
    pub samples: Vec<String>,
}

impl Route {
    pub fn new(name: impl Into<String>, samples: Vec<String>) -> Self {
        Self {
            name: name.into(),
            samples,
        }
    }
}

impl From<&RouteSettings> for Route {
    fn from(settings: &RouteSettings) -> Self {
        Self::new(settings.name.clone(), settings.samples.clone())
    }
}

/// Routing result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDecision {
    pub score: f32,
    pub name: String,
}

impl RouteDecision {
    pub fn is_uncertain(&self) -> bool {
        self.name == UNCERTAIN
    }
}

struct EmbeddedRoute {
    name: String,
    samples: Vec<Vec<f32>>,
}

/// Embedding-similarity router
pub struct SemanticRouter {
    embedder: Arc<dyn Embedder>,
    routes: Vec<EmbeddedRoute>,
    threshold: f32,
    aggregation: Aggregation,
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl SemanticRouter {
    /// Embed every sample once
    pub async fn new(
        embedder: Arc<dyn Embedder>,
        routes: Vec<Route>,
        threshold: f32,
        aggregation: Aggregation,
    ) -> Result<Self, RagError> {
        let mut embedded = Vec::with_capacity(routes.len());

        for route in routes {
            if route.samples.is_empty() {
                return Err(RagError::Embedding(format!(
                    "Route '{}' has no samples",
                    route.name
                )));
            }

            let vectors = embedder
                .embed_batch(&route.samples)
                .await
                .map_err(|e| RagError::Embedding(e.to_string()))?;

            tracing::debug!(route = %route.name, samples = vectors.len(), "Route embedded");

            embedded.push(EmbeddedRoute {
                name: route.name,
                samples: vectors.into_iter().map(normalize).collect(),
            });
        }

        tracing::info!(
            routes = embedded.len(),
            threshold,
            aggregation = ?aggregation,
            "Semantic router ready"
        );

        Ok(Self {
            embedder,
            routes: embedded,
            threshold,
            aggregation,
        })
    }

    pub async fn from_settings(
        embedder: Arc<dyn Embedder>,
        settings: &RouterSettings,
    ) -> Result<Self, RagError> {
        let routes = settings.routes.iter().map(Route::from).collect();
        Self::new(embedder, routes, settings.threshold, settings.aggregation).await
    }

    pub fn route_names(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn aggregate(&self, scores: impl Iterator<Item = f32>) -> f32 {
        match self.aggregation {
            Aggregation::Max => scores.fold(f32::NEG_INFINITY, f32::max),
            Aggregation::Mean => {
                let (sum, n) = scores.fold((0.0f32, 0usize), |(s, n), x| (s + x, n + 1));
                if n == 0 {
                    0.0
                } else {
                    sum / n as f32
                }
            }
        }
    }

    /// Score a pre-computed query embedding
    pub fn classify(&self, query_embedding: Vec<f32>) -> RouteDecision {
        let query = normalize(query_embedding);

        let mut best: Option<(f32, &str)> = None;
        for route in &self.routes {
            let score = self.aggregate(route.samples.iter().map(|s| dot(&query, s)));
            // Strictly greater: the first-declared route wins ties
            if best.map_or(true, |(b, _)| score > b) {
                best = Some((score, &route.name));
            }
        }

        match best {
            Some((score, name)) if score >= self.threshold => RouteDecision {
                score,
                name: name.to_string(),
            },
            Some((score, _)) => RouteDecision {
                score,
                name: UNCERTAIN.to_string(),
            },
            None => RouteDecision {
                score: 0.0,
                name: UNCERTAIN.to_string(),
            },
        }
    }

    /// Route a query
    pub async fn guide(&self, query: &str) -> Result<RouteDecision, RagError> {
        let embedding = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        let decision = self.classify(embedding);
        tracing::info!(query, route = %decision.name, score = decision.score, "Query routed");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sales_rag_config::constants::router::{CHITCHAT, PRODUCTS};
    use sales_rag_llm::HashEmbedder;

    /// Maps known texts to fixed vectors, everything else to zero
    struct TableEmbedder(Vec<(&'static str, Vec<f32>)>);

    #[async_trait]
    impl Embedder for TableEmbedder {
        async fn embed(&self, text: &str) -> sales_rag_core::Result<Vec<f32>> {
            Ok(self
                .0
                .iter()
                .find(|(t, _)| *t == text)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| vec![0.0, 0.0]))
        }

        fn dim(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "table"
        }
    }

    fn table() -> Arc<dyn Embedder> {
        Arc::new(TableEmbedder(vec![
            ("a1", vec![1.0, 0.0]),
            ("a2", vec![0.0, 1.0]),
            ("b1", vec![0.8, 0.6]),
            ("b2", vec![0.8, 0.6]),
            ("q", vec![0.95, 0.05]),
            ("far", vec![-1.0, 0.0]),
        ]))
    }

    fn routes() -> Vec<Route> {
        vec![
            Route::new("a", vec!["a1".to_string(), "a2".to_string()]),
            Route::new("b", vec!["b1".to_string(), "b2".to_string()]),
        ]
    }

    #[tokio::test]
    async fn test_max_picks_nearest_sample() {
        let router = SemanticRouter::new(table(), routes(), 0.4, Aggregation::Max)
            .await
            .unwrap();
        let decision = router.guide("q").await.unwrap();
        assert_eq!(decision.name, "a");
        assert!(decision.score > 0.99);
    }

    #[tokio::test]
    async fn test_mean_averages_samples() {
        // Route a averages one close and one orthogonal sample
        let router = SemanticRouter::new(table(), routes(), 0.4, Aggregation::Mean)
            .await
            .unwrap();
        let decision = router.guide("q").await.unwrap();
        assert_eq!(decision.name, "b");
    }

    #[tokio::test]
    async fn test_below_threshold_is_uncertain() {
        let router = SemanticRouter::new(table(), routes(), 0.4, Aggregation::Max)
            .await
            .unwrap();
        let decision = router.guide("far").await.unwrap();
        assert!(decision.is_uncertain());
        assert!(decision.score < 0.4);
    }

    #[tokio::test]
    async fn test_zero_query_vector() {
        let router = SemanticRouter::new(table(), routes(), 0.0, Aggregation::Max)
            .await
            .unwrap();
        let decision = router.guide("unknown").await.unwrap();
        // Every score is 0, the first route wins the tie at threshold 0
        assert_eq!(decision.score, 0.0);
        assert_eq!(decision.name, "a");
    }

    #[tokio::test]
    async fn test_no_routes() {
        let router = SemanticRouter::new(table(), Vec::new(), 0.4, Aggregation::Max)
            .await
            .unwrap();
        let decision = router.guide("q").await.unwrap();
        assert!(decision.is_uncertain());
        assert_eq!(decision.score, 0.0);
    }

    #[tokio::test]
    async fn test_empty_route_rejected() {
        let result =
            SemanticRouter::new(table(), vec![Route::new("x", Vec::new())], 0.4, Aggregation::Max)
                .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_default_routes_with_hash_embedder() {
        let router =
            SemanticRouter::from_settings(Arc::new(HashEmbedder::default()), &RouterSettings::default())
                .await
                .unwrap();
        assert_eq!(router.route_names(), vec![PRODUCTS, CHITCHAT]);

        let settings = RouterSettings::default();
        let product_sample = settings.routes[0].samples[0].clone();
        let chitchat_sample = settings.routes[1].samples[0].clone();

        assert_eq!(router.guide(&product_sample).await.unwrap().name, PRODUCTS);
        assert_eq!(router.guide(&chitchat_sample).await.unwrap().name, CHITCHAT);
    }
}
