pub mod config;
pub mod documents;
pub mod health;
pub mod orchestrate;
pub mod rag;
pub mod sessions;
pub mod transactions;
