//! # GuardBot
//!
//! Group chat moderation and command-dispatch engine for WhatsApp-style
//! group conversations, driven through an external session bridge.
//!
//! ## Features
//!
//! - **Content Policies**: toxic language, links, group promotion, explicit terms,
//!   crash payloads (virtex) and message flooding, toggled per group
//! - **Warning Ladder**: time-decayed warnings with removal at the limit, and
//!   immediate removal plus block for severe violations
//! - **Group Administration**: prefixed commands gated by group roles and
//!   configured owners
//! - **Greetings**: welcome and goodbye messages with placeholders
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use guardbot::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BotConfiguration::default();
//!     let store = SharedStore::new(Arc::new(JsonFileStore::new("database/db.json")));
//!
//!     let mut connection = BridgeConnection::new(config.bridge.clone());
//!     connection.connect().await?;
//!     let events = connection
//!         .get_event_receiver()
//!         .ok_or_else(|| anyhow::anyhow!("bridge has no event stream"))?;
//!
//!     let bot = GuardBot::new(&config, Arc::new(connection.clone()), store)?;
//!     bot.run(events).await;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod platforms;
pub mod store;
pub mod types;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::{EventOutcome, GuardBot};
    pub use crate::config::{BotConfiguration, ConfigurationManager};
    pub use crate::platforms::{bridge::BridgeConnection, PlatformConnection, Transport};
    pub use crate::store::{ChatStore, JsonFileStore, MemoryStore, SharedStore};
    pub use crate::types::{
        ChatRecord, GroupSettings, GuardError, InboundEvent, InboundMessage, ViolationKind,
    };
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
