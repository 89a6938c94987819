//! Client SDK for a courier server: typed REST calls, the persistent
//! gateway subscription, and the reconciled chat state a frontend renders
//! from.

pub mod api;
pub mod error;
pub mod gateway;
pub mod state;

pub use api::ApiClient;
pub use error::ClientError;
pub use gateway::GatewaySubscription;
pub use state::ChatState;
