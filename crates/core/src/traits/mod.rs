//! Core traits for the sales assistant
//!
//! Every external service sits behind one of these traits so it can be
//! swapped from configuration or replaced by a mock in tests.
//!
//! ```text
//!   - Embedder: text -> dense vector
//!   - ChatModel: messages -> completion (optionally streamed)
//!   - ProductStore: vector or keyword index over product documents
//!   - Reranker: rescoring of retrieved passages
//! ```

mod chat;
mod embedder;
mod reranker;
mod store;

pub use chat::{ChatModel, Completion, FinishReason};
pub use embedder::Embedder;
pub use reranker::{RankedPassage, Reranker};
pub use store::{ProductStore, StoreKind};
