pub mod answer;
pub mod compose;
pub mod embeddings;
pub mod llm;
pub mod ollama;
pub mod policy;
pub mod prompt;
pub mod retrieve;
pub mod service;
pub mod text;
