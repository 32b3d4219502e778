//! External AI provider implementations.

pub mod deepseek;
pub mod openai;
pub mod openai_assistants;
pub mod openai_compatible;

pub use deepseek::*;
pub use openai::*;
pub use openai_assistants::*;
pub use openai_compatible::*;
