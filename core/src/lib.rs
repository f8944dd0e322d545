pub mod engine;
pub mod error;
pub mod index;
pub mod persist;
pub mod postings;
pub mod query;
pub mod tokenizer;

pub use engine::{SearchEngine, SearchHit, SearchPage};
pub use error::{IndexError, Result};
pub use index::*;
