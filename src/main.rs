use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod association;
mod cli;
mod clock;
mod codec;
mod config;
mod consolidation;
mod embeddings;
mod episodes;
mod error;
mod graph;
mod hopfield;
mod index;
mod memory;
mod scoring;
mod search;
mod types;

#[cfg(test)]
mod testing;

#[derive(Parser)]
#[command(name = "reverie")]
#[command(version)]
#[command(about = "Associative long-term memory for AI agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a .reverie directory
    Init {
        /// Directory to initialize .reverie in
        #[arg(short, long, default_value = ".")]
        path: String,
    },

    /// Remember something, skipping near-duplicates and linking similar memories
    Remember {
        /// Content to remember
        content: String,

        /// Primary emotion
        #[arg(short, long, default_value = "neutral")]
        emotion: String,

        /// Comma-separated secondary emotions
        #[arg(long, default_value = "")]
        secondary: String,

        /// Emotional intensity (0-1)
        #[arg(long, default_value = "0.5")]
        intensity: f64,

        /// Valence (-1 to 1)
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        valence: f64,

        /// Arousal (0-1)
        #[arg(long, default_value = "0.5")]
        arousal: f64,

        /// Importance (1-5)
        #[arg(short, long, default_value = "3")]
        importance: i64,

        /// Category
        #[arg(short, long, default_value = "daily")]
        category: String,

        /// Comma-separated tags
        #[arg(short, long, default_value = "")]
        tags: String,

        /// Mark as private
        #[arg(long)]
        private: bool,
    },

    /// Semantic search with filters
    Search {
        /// Search query
        query: String,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,

        /// Only this primary emotion
        #[arg(short, long)]
        emotion: Option<String>,

        /// Only this category
        #[arg(short, long)]
        category: Option<String>,

        /// Earliest timestamp (ISO-8601 prefix)
        #[arg(long)]
        from: Option<String>,

        /// Latest timestamp (ISO-8601 prefix)
        #[arg(long)]
        to: Option<String>,

        /// Valence range as MIN,MAX
        #[arg(long, allow_hyphen_values = true)]
        valence: Option<String>,

        /// Arousal range as MIN,MAX
        #[arg(long)]
        arousal: Option<String>,
    },

    /// Hybrid recall (semantic search re-ranked by a Hopfield network)
    Recall {
        /// Context to recall from
        context: String,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "3")]
        limit: usize,

        /// Valence range as MIN,MAX
        #[arg(long, allow_hyphen_values = true)]
        valence: Option<String>,

        /// Arousal range as MIN,MAX
        #[arg(long)]
        arousal: Option<String>,
    },

    /// Recall plus associated memories, formatted as context
    Context {
        /// The prompt to find context for
        prompt: String,

        /// Maximum recalled memories
        #[arg(short = 'n', long, default_value = "3")]
        limit: usize,

        /// Maximum associated memories
        #[arg(short, long)]
        associations: Option<usize>,
    },

    /// Show one memory
    Show {
        /// Memory ID
        id: String,
    },

    /// List recent memories
    List {
        /// Filter by category
        #[arg(short, long)]
        category: Option<String>,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Forget a memory
    Forget {
        /// Memory ID to forget
        id: String,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Link two memories in both directions
    Link {
        source: String,
        target: String,

        /// Link type
        #[arg(short = 't', long = "type", default_value = "related")]
        link_type: String,
    },

    /// Strengthen the link between two memories
    Bump {
        a: String,
        b: String,

        /// Confidence delta (0-1)
        #[arg(short, long, default_value = "0.1")]
        delta: f64,
    },

    /// Spreading activation from seed memories
    Associate {
        /// Seed memory IDs
        #[arg(required = true)]
        seeds: Vec<String>,

        /// Maximum hops
        #[arg(short, long)]
        depth: Option<usize>,

        /// Maximum results
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Replay recent memories and flag near-duplicates
    Consolidate {
        /// Window in hours
        #[arg(short, long)]
        window: Option<i64>,

        /// Print stats as JSON
        #[arg(long)]
        json: bool,
    },

    /// Group memories into episodes
    #[command(subcommand)]
    Episode(EpisodeCommands),

    /// Show statistics
    Stats,

    /// View or set configuration
    Config {
        /// Config key (dotted, e.g. recall.semantic_blend)
        key: Option<String>,

        /// Config value
        value: Option<String>,

        /// List available models
        #[arg(long)]
        list_models: bool,
    },
}

#[derive(Subcommand)]
enum EpisodeCommands {
    /// Create an episode from existing memories
    Create {
        /// What the episode was about
        #[arg(short, long)]
        summary: String,

        /// Member memory IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Show one episode and its memories
    Show {
        /// Episode ID
        id: String,
    },

    /// List episodes, latest first
    List {
        /// Maximum results
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Find episodes by summary
    Search {
        /// Search query
        query: String,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { path } => cli::memory::run_init(&path),
        Commands::Remember {
            content,
            emotion,
            secondary,
            intensity,
            valence,
            arousal,
            importance,
            category,
            tags,
            private,
        } => cli::memory::run_remember(cli::memory::RememberArgs {
            content,
            emotion,
            secondary,
            intensity,
            valence,
            arousal,
            importance,
            category,
            tags,
            private,
        }),
        Commands::Search {
            query,
            limit,
            emotion,
            category,
            from,
            to,
            valence,
            arousal,
        } => cli::memory::parse_filters(
            emotion.as_deref(),
            category.as_deref(),
            from,
            to,
            valence.as_deref(),
            arousal.as_deref(),
        )
        .and_then(|filters| cli::memory::run_search(&query, limit, &filters)),
        Commands::Recall {
            context,
            limit,
            valence,
            arousal,
        } => cli::memory::parse_filters(None, None, None, None, valence.as_deref(), arousal.as_deref())
            .and_then(|filters| cli::memory::run_recall(&context, limit, &filters)),
        Commands::Context {
            prompt,
            limit,
            associations,
        } => cli::context::run_context(&prompt, limit, associations),
        Commands::Show { id } => cli::memory::run_show(&id),
        Commands::List { category, limit } => cli::memory::run_list(category.as_deref(), limit),
        Commands::Forget { id, force } => cli::memory::run_forget(&id, force),
        Commands::Link {
            source,
            target,
            link_type,
        } => cli::graph::run_link(&source, &target, &link_type),
        Commands::Bump { a, b, delta } => cli::graph::run_bump(&a, &b, delta),
        Commands::Associate { seeds, depth, limit } => cli::graph::run_associate(&seeds, depth, limit),
        Commands::Consolidate { window, json } => cli::graph::run_consolidate(window, json),
        Commands::Episode(cmd) => match cmd {
            EpisodeCommands::Create { summary, ids } => cli::episode::run_create(&ids, &summary),
            EpisodeCommands::Show { id } => cli::episode::run_show(&id),
            EpisodeCommands::List { limit } => cli::episode::run_list(limit),
            EpisodeCommands::Search { query, limit } => cli::episode::run_search(&query, limit),
        },
        Commands::Stats => cli::memory::run_stats(),
        Commands::Config {
            key,
            value,
            list_models,
        } => cli::config::run_config(key.as_deref(), value.as_deref(), list_models),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
