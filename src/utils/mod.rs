pub mod export;
pub mod ingest;
pub mod paths;

pub use export::ConversationExport;
pub use ingest::{ingest_file, read_knowledge_file};
pub use paths::default_data_dir;
