//! Retrieval Client (C5): thin HTTP proxy to the external knowledge-base
//! service. See [`retriever`] for the implementation.

pub mod retriever;

pub use retriever::RetrievalClient;
