use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ytdigest::output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "ytdigest",
    about = "YouTube transcript normalizer and summarizer",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Config file (default: ~/.config/ytdigest/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging and extra metadata on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Bearer token required on requests (overrides config and YTDIGEST_API_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },

    /// Print a video's transcript
    Extract {
        /// YouTube video URL or video ID (reads from stdin if omitted)
        url: Option<String>,

        /// Preferred caption language ("auto" walks the fallback list)
        #[arg(short, long)]
        lang: Option<String>,

        /// Output format: text (default), json, srt
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Print the normalized text instead of raw segments
        #[arg(long)]
        normalized: bool,

        /// Write output to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize a video or a local transcript file
    Summarize {
        /// YouTube video URL or video ID
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        url: Option<String>,

        /// Summarize the text in this file instead of fetching captions
        #[arg(long)]
        file: Option<PathBuf>,

        /// Caption language to fetch
        #[arg(short, long)]
        lang: Option<String>,

        /// Language of the summary
        #[arg(short, long)]
        target_lang: Option<String>,

        /// Summary length budget
        #[arg(short = 'w', long)]
        max_words: Option<u32>,

        /// LLM model for summarization
        #[arg(long)]
        model: Option<String>,
    },
}
