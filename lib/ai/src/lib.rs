//! Text generation primitives for FlowMentor.
//!
//! Activities that need prose (plan tips, reflection summaries, goal
//! rationales) go through the [`TextGenerator`] trait. Prompts are built from
//! named templates in the [`PromptRegistry`].

pub mod backend;
pub mod error;
pub mod prompt;

pub use backend::{GenerationRequest, StaticTextGenerator, TextGenerator};
pub use error::{GenerationError, PromptError};
pub use prompt::{PromptRegistry, PromptTemplate, VariableDefinition};
