//! # filachat core
//!
//! Domain types, traits, and error definitions for the filachat queue
//! assistant. The crate holds the vocabulary every other crate speaks:
//! sessions and their turns, completion-service messages, tool calls, and the
//! traits for the two remote boundaries (completion and tool execution).
//!
//! Implementations live elsewhere:
//! - `filachat-providers` implements [`Provider`]
//! - `filachat-tools` implements [`ToolInvoker`]
//! - `filachat-memory` persists [`Session`] records

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use session::{
    CompletedEntity, DefaultDevice, MonitoredServices, ProfilePatch, ServicesPatch, Session,
    SessionConfiguration, SessionId, SetupPatch, SetupStatus, SystemInfo, Turn, TurnRole,
    UserProfile,
};
pub use tool::{ToolCall, ToolCatalog, ToolInvoker};
