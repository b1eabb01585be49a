//! Client core for burn-after-read private chats.
//!
//! [`MessageStore`] holds the open chat, decrypts message bodies with
//! `crypto-core`, and burns messages when their read-gated delay or TTL runs
//! out. The backend is reached through the [`ChatGateway`] trait;
//! [`HttpChatGateway`] is the REST implementation.

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use services::{
    should_burn, BurnScheduler, ChatGateway, ExpiryPolicy, HttpChatGateway, MessageStore,
};
