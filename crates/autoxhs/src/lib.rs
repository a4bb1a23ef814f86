//! AutoXHS - theme in, published Xiaohongshu image note out.
//!
//! The [`pipeline`] module chains the stages: categorize the theme, generate
//! a title, search the web for grounding data, write the post, render a cover
//! image, and hand the result to the `xhs` publisher.

pub mod config;
pub mod content;
pub mod image;
pub mod llm;
pub mod pipeline;
pub mod search;

pub use config::AppConfig;
pub use content::{ContentGenerator, PostContent};
pub use image::ImageGenerator;
pub use llm::LlmClient;
pub use pipeline::{PostOptions, PostPipeline};
pub use search::SearchClient;
