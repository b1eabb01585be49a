pub mod burn_scheduler;
pub mod expiry;
pub mod gateway;
pub mod http_gateway;
pub mod message_store;

pub use burn_scheduler::BurnScheduler;
pub use expiry::{should_burn, ExpiryPolicy};
pub use gateway::ChatGateway;
pub use http_gateway::HttpChatGateway;
pub use message_store::MessageStore;
