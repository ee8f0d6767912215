pub mod compare;
pub mod enrich;
pub mod fallback;
pub mod fanout;
pub mod links;
pub mod openai_compat;
pub mod pipeline;
pub mod queries;
pub mod reconcile;
pub mod sanitize;
pub mod search;
pub mod select;
pub mod supabase;
pub mod textprep;
pub mod verify;

pub use fanout::SearchProviders;
pub use pipeline::{GiftPipeline, PipelineConfig};
