use clap::{Args, Parser, Subcommand};

/// `songsmith` - AI-assisted songwriting backend.
#[derive(Parser, Debug)]
#[command(name = "songsmith")]
#[command(version)]
#[command(about = "Streams AI-generated song names, styles, hooks, words and lyrics.", long_about = None)]
pub struct Cli {
    /// Log at DEBUG instead of INFO
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Address to bind (default: [gateway] host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (default: [gateway] port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Inspect and prune conversation logs
    Logs {
        #[command(subcommand)]
        command: LogCommands,
    },

    /// Inspect and maintain stored conversations
    Conversation {
        #[command(subcommand)]
        command: ConversationCommands,
    },
}

/// Which log file to look at.
#[derive(Args, Debug, Clone)]
pub struct LogTarget {
    /// Conversation purpose (names, style, hook, lyrics, ...)
    pub purpose: String,

    /// Song id; omitted for song-less generations
    pub song_id: Option<i64>,
}

#[derive(Subcommand, Debug)]
pub enum LogCommands {
    /// List all conversation log files
    List,

    /// Size, session count and modification time of one log
    Info(LogTarget),

    /// Print a log, or its tail when it is large
    View {
        #[command(flatten)]
        target: LogTarget,

        /// Characters shown from the end of large logs
        #[arg(long, default_value_t = 1000)]
        tail: usize,
    },

    /// Remove log files older than the given number of days
    Cleanup {
        #[arg(long)]
        days: u64,
    },
}

/// One stored conversation, seen as `user`.
#[derive(Args, Debug, Clone)]
pub struct ConversationTarget {
    /// Song id
    #[arg(long)]
    pub song: i64,

    /// Conversation purpose (style, hook, lyrics, ...)
    #[arg(long)]
    pub purpose: String,

    /// Owning user id from [[users]]
    #[arg(long)]
    pub user: String,
}

#[derive(Subcommand, Debug)]
pub enum ConversationCommands {
    /// Message counts for a conversation
    Stats(ConversationTarget),

    /// Delete unanswered turns after the last assistant message
    Cleanup(ConversationTarget),

    /// Summarize a conversation now, regardless of its size
    Summarize(ConversationTarget),
}
