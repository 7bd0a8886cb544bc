pub mod errors;
pub mod generation;
pub mod ids;
pub mod messages;
pub mod security;

pub use errors::GatewayError;
pub use generation::{GenerationClient, GenerationRequest};
pub use ids::{ConversationId, Principal};
pub use messages::{Role, Turn};
