//! Model provider adapters.
//!
//! Each provider implements [`Backend`](crate::model::Backend) for its API.

mod openai;

pub use openai::{OpenAiBackend, OpenAiBackendBuilder};
