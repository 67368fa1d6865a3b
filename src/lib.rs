// Module declarations
pub mod accumulator;
pub mod audit;
pub mod config;
pub mod constants;
pub mod error;
pub mod formatting;
pub mod gateway;
pub mod logging;
pub mod pricing;
pub mod session;
pub mod store;
pub mod types;
pub mod utils;
pub mod view;

// Re-export commonly used items
pub use accumulator::CostAccumulator;
pub use audit::AuditRecorder;
pub use config::{AppConfig, Mode, Provider};
pub use error::{ArchitectError, Result};
pub use gateway::InferenceGateway;
pub use pricing::{RateTable, estimate};
pub use session::{Analysis, ConversationSession, SendOutcome, SessionOptions};
pub use store::{FileStore, MemoryStore, Store};
pub use types::{
    AuditAction, AuditEntry, ConversationEntry, Cost, KnowledgeItem, Message, MessageId,
    MessageStatus, ModelId, Role, UsageStats,
};
pub use view::ConversationView;
