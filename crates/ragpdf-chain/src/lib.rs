//! Retrieval-augmented question answering over a loaded PDF.
//!
//! [`Session`] ties the pieces together: extraction, chunking and embedding
//! on `load`; retrieval, an [`AnswerChain`] and conversation memory on `ask`.

pub mod chains;
pub mod generation;
pub mod memory;
pub mod prompt;
pub mod retriever;
pub mod session;

pub use chains::{build_chain, AnswerChain, ChainInput, MapReduceChain, MapRerankChain, RefineChain, StuffChain};
pub use generation::TimedGenerator;
pub use memory::{MemoryContext, MemoryManager, MemoryState};
pub use retriever::Retriever;
pub use session::{Answer, Backends, LoadReport, Session, SessionState, SharedSession};
