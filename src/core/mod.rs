pub mod agent;
pub mod catalog;
pub mod operations;
pub mod pipeline;
pub mod prompts;
pub mod table;
pub mod vector_store;

pub use crate::domain::model::{Computation, Record};
pub use crate::domain::ports::{ConfigProvider, LanguageModel, Pipeline, Storage};
pub use crate::utils::error::Result;
