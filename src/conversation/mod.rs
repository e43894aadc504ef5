pub mod builder;
pub mod log;
pub mod store;
pub mod summarize;
pub mod token_estimate;
pub mod types;

pub use builder::ConversationBuilder;
pub use log::{ConversationLogger, LogInfo};
pub use store::{ConversationStore, FlagRefresh, SqliteConversationStore};
pub use summarize::{SummarizationService, SummaryReport, spawn_flag_refresher};
pub use token_estimate::{HeuristicCounter, TiktokenCounter, TokenCounter};
pub use types::{ConversationStats, Message, Purpose};
