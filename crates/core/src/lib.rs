//! Core traits and types for the sales assistant
//!
//! This crate provides foundational types used across all other crates:
//! - Conversation messages and the mutable system prompt
//! - Product records and search hits
//! - Traits for pluggable backends (embeddings, chat, stores, rerankers)
//! - Error types

pub mod conversation;
pub mod error;
pub mod product;
pub mod traits;

pub use conversation::{Conversation, Message, Role};
pub use error::{Error, Result};
pub use product::{Product, ProductDocument, ProductHit};
pub use traits::{
    ChatModel, Completion, Embedder, FinishReason, ProductStore, RankedPassage, Reranker,
    StoreKind,
};
