//! Wire types of the upstream chat APIs.

pub mod gemini;
pub mod openai;
