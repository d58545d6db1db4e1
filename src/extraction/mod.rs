//! Natural-language passenger extraction
//!
//! A language model proposes structured fields; a deterministic rule pass
//! over the same message overrides whatever it matches.

pub mod llm;
pub mod merge;
pub mod rules;
pub mod service;

pub use llm::{LanguageModel, OpenAiChatModel};
pub use merge::{merge, FieldSource, FieldSources, PassengerDraft, Resolved};
pub use rules::apply_rules;
pub use service::{Extraction, ExtractionAdapter, ExtractionPath};
