//! forgehub - tool-server provisioning and supervised self-maintenance.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Hub facade                             │
//! │  clone_and_build → register_server → smoke_run                    │
//! │  analyze_self → improve_codebase → validate_changes → rollback    │
//! └───────────┬──────────────────┬───────────────────┬───────────────┘
//!             ▼                  ▼                   ▼
//! ┌───────────────────┐ ┌────────────────┐ ┌─────────────────────────┐
//! │  Forge pipeline   │ │  MCP client    │ │   Provider manager      │
//! │ - git acquisition │ │ - stdio        │ │ - openai / anthropic /  │
//! │ - ecosystem build │ │   transport    │ │   local adapters        │
//! │ - registration    │ │ - smoke runner │ │ - failover + ensemble   │
//! └───────────────────┘ └────────────────┘ └─────────────────────────┘
//!             ▼                  ▼                   ▼
//!      workspace root     server registry     snapshot store
//! ```
//!
//! # Features
//!
//! - **Provisioning** - clone any repo, detect its ecosystem, build it,
//!   register it as a tool-server, smoke test every declared tool
//! - **Multi-backend AI** - one adapter per chat API behind a single
//!   trait, with failover, rate-interval gating, and consensus analysis
//! - **Guarded self-modification** - snapshot before every write, apply
//!   only above a confidence threshold, validate after, roll back on
//!   demand

pub mod cli;
pub mod config;
pub mod error;
pub mod evolve;
pub mod forge;
pub mod hub;
pub mod llm;
pub mod mcp;
pub mod registry;

pub use config::Config;
pub use error::{Error, Result};
pub use hub::Hub;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::evolve::{AnalyzeRequest, ImproveRequest, RollbackRequest, ValidateRequest};
    pub use crate::forge::{AcquireRequest, ProjectHandle};
    pub use crate::hub::Hub;
    pub use crate::llm::{ChatAdapter, ChatMessage, ProviderManager};
    pub use crate::mcp::{SmokeRequest, SmokeRunner};
    pub use crate::registry::{ServerDefinition, ServerRegistry};
}
