pub mod config;
pub mod extract;
pub mod llm;
pub mod mapper;
pub mod rag;
pub mod types;
pub mod vocabulary;
