//! CLI argument parsing for skilltree.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "skt",
    about = "Concept prerequisite graphs and per-user learning progress",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/skilltree/logs/skilltree.log"
)]
pub struct Cli {
    /// Directory containing the .skilltree store (default: current directory)
    #[arg(short = 'd', long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new store in the current directory
    Init,

    /// Add a concept
    Add {
        /// Concept id (no whitespace)
        concept_id: String,

        /// Title
        title: String,

        /// Description
        #[arg(short = 'D', long, default_value = "")]
        description: String,

        /// Category
        #[arg(short, long, default_value = "")]
        category: String,

        /// Difficulty level
        #[arg(short = 'l', long, default_value = "1")]
        difficulty: i32,

        /// Prerequisite concept ids (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        prerequisites: Option<Vec<String>>,
    },

    /// Show a concept
    Show {
        /// Concept id
        concept_id: String,
    },

    /// Update fields of a concept
    Update {
        /// Concept id
        concept_id: String,

        /// New title
        #[arg(short, long)]
        title: Option<String>,

        /// New description
        #[arg(short = 'D', long)]
        description: Option<String>,

        /// New category
        #[arg(short, long)]
        category: Option<String>,

        /// New difficulty level
        #[arg(short = 'l', long)]
        difficulty: Option<i32>,

        /// Replace prerequisites (comma-separated, empty string clears)
        #[arg(short, long)]
        prerequisites: Option<String>,

        /// Restore an archived concept
        #[arg(long)]
        unarchive: bool,
    },

    /// Archive a concept
    Archive {
        /// Concept id
        concept_id: String,
    },

    /// List concepts
    List {
        /// Only concepts in this category
        #[arg(short, long)]
        category: Option<String>,

        /// Include archived concepts
        #[arg(short, long)]
        all: bool,
    },

    /// Show the prerequisite tree of a concept
    Deps {
        /// Concept id
        concept_id: String,

        /// Print the transitive prerequisite ids instead of a tree
        #[arg(long)]
        flat: bool,
    },

    /// Show concepts that directly require a concept
    Dependents {
        /// Concept id
        concept_id: String,
    },

    /// Print the category graph as JSON
    Graph {
        /// Category (default: all)
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Show a user's progress
    Progress {
        /// User id
        user_id: String,
    },

    /// Start a concept
    Start {
        /// User id
        user_id: String,

        /// Concept id
        concept_id: String,
    },

    /// Complete a concept
    Complete {
        /// User id
        user_id: String,

        /// Concept id
        concept_id: String,
    },

    /// Show concepts a user can work on next
    Available {
        /// User id
        user_id: String,
    },

    /// Show concepts a user cannot start yet
    Blocked {
        /// User id
        user_id: String,
    },

    /// Export a user's snapshot
    Export {
        /// User id
        user_id: String,

        /// Print the snapshot JSON instead of a summary
        #[arg(long)]
        print: bool,
    },

    /// Import a user's snapshot
    Import {
        /// User id
        user_id: String,

        /// Snapshot file (default: the user's file in the snapshot directory)
        file: Option<PathBuf>,
    },

    /// Run the daemon in foreground
    Daemon,

    /// Stop the running daemon
    DaemonStop,

    /// Check daemon status
    DaemonStatus,
}
