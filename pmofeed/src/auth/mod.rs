//! OAuth credential handling
//!
//! - [`TokenRefreshCoordinator`]: owns the credential, runs single-flight refreshes
//! - [`TokenExchange`] / [`OAuth2TokenExchange`]: the token endpoint
//! - [`AuthenticatedTransport`]: signs requests and replays them after a refresh

pub mod coordinator;
pub mod credential;
pub mod exchange;
pub mod transport;

pub use coordinator::{RefreshEvent, RetryDecision, TokenRefreshCoordinator};
pub use credential::{mask_token, Credential, TokenSet};
pub use exchange::{parse_token_response, OAuth2TokenExchange, TokenExchange};
pub use transport::{AuthenticatedTransport, DEFAULT_MAX_REPLAYS};
