//! Public types for the huginn API.

mod message;
mod provider;
mod request;
mod response;

pub use message::{Role, Turn, trailing};
pub use provider::ProviderKind;
pub use request::{DEFAULT_HISTORY_WINDOW, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, QueryRequest};
pub use response::{QueryError, QueryResponse, Usage};
