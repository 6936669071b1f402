//! Text generation backends.

mod ollama;

pub use ollama::OllamaGenerator;
