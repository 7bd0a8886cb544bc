pub mod client;
pub mod models;

pub mod mock;

pub use client::{HttpClientConfig, HttpGenerationClient, SamplingParams, STOP_SEQUENCES};
pub use mock::{MockGenerationClient, MockReply};
pub use models::ModelCatalog;
