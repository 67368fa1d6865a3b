pub mod cost;
pub mod ids;
pub mod knowledge;
pub mod message;
pub mod pricing;
pub mod usage;

pub use cost::Cost;
pub use ids::{KnowledgeId, MessageId, ModelId};
pub use knowledge::{KnowledgeItem, KnowledgePatch};
pub use message::{ChatTurn, ConversationEntry, Message, MessageStatus, Role};
pub use pricing::{ModelRate, RateLookup, TokenUsage};
pub use usage::{AuditAction, AuditEntry, ModelUsage, UsageStats};
