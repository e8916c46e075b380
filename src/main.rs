use std::io::{self, BufRead, Read};
use std::path::PathBuf;
use std::sync::Arc;

use eyre::{Result, bail};
use log::{debug, info, warn};

mod cli;

use cli::{Cli, Command};
use ytdigest::cache::ResponseCache;
use ytdigest::config::{self, Config};
use ytdigest::engine::{Engine, TranscriptInput};
use ytdigest::fetcher::CaptionFetcher;
use ytdigest::llm::{LlmClient, TextGenerator};
use ytdigest::normalize::Normalizer;
use ytdigest::output::{self, OutputFormat};
use ytdigest::ratelimit::RateLimiter;
use ytdigest::server::{self, AppState};
use ytdigest::summarize::{Summarizer, SummaryRequest};
use ytdigest::youtube::InnerTubeSource;

fn default_filter(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// CLI commands log to a file so stdout stays clean for transcripts
fn setup_file_logging(verbose: bool) -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("ytdigest.log");

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter(verbose)))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn setup_stderr_logging(verbose: bool) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter(verbose)))
        .target(env_logger::Target::Stderr)
        .init();
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ytdigest")
        .join("logs")
}

fn env_status(var: &str) -> String {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => format!("  \x1b[32m✅\x1b[0m {var}"),
        _ => format!("  \x1b[31m❌\x1b[0m {var} (not set)"),
    }
}

fn build_after_help() -> String {
    let log_path = log_dir().join("ytdigest.log");

    format!(
        "\nCREDENTIALS:\n{}\n{}\n{}\n\nConfig is read from: {}\nLogs are written to: {}",
        env_status("ANTHROPIC_API_KEY"),
        env_status("OPENAI_API_KEY"),
        env_status(config::TOKEN_ENV_VAR),
        config::config_path().display(),
        log_path.display()
    )
}

/// Wire the pipeline together from config
fn build_engine(config: &Config, client: &reqwest::Client) -> Result<Engine> {
    let source = Arc::new(InnerTubeSource::new(client.clone()));
    let fetcher = CaptionFetcher::new(source, config.captions.fallback_languages.clone());
    let normalizer = Normalizer::new(config.normalize.clone())?;

    let generator: Option<Arc<dyn TextGenerator>> =
        match LlmClient::from_env(client.clone(), &config.summarize.model, config.summarize.request_timeout()) {
            Ok(llm) => Some(Arc::new(llm)),
            Err(e) => {
                warn!("Generative service unavailable ({e}); summaries will be extractive");
                None
            }
        };
    let summarizer = Summarizer::new(generator, config.summarize.settings());

    Ok(Engine::new(fetcher, normalizer, summarizer, config.chunking.max_chars))
}

async fn serve(config: Config, client: &reqwest::Client, bind: Option<String>, token: Option<String>) -> Result<()> {
    let config = config
        .with_token_override(std::env::var(config::TOKEN_ENV_VAR).ok())
        .with_token_override(token);
    config.validate()?;

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let state = AppState {
        engine: build_engine(&config, client)?,
        limiter: RateLimiter::new(config.rate_limit.max_requests, config.rate_limit.window()),
        cache: ResponseCache::new(config.cache.ttl(), config.cache.capacity),
        auth_token: config.auth_token(),
        defaults: config.summarize.request_defaults(),
    };
    server::run(Arc::new(state), &bind).await
}

struct ExtractArgs {
    url: Option<String>,
    lang: Option<String>,
    format: OutputFormat,
    normalized: bool,
    output: Option<PathBuf>,
}

async fn extract(config: &Config, client: &reqwest::Client, verbose: bool, args: ExtractArgs) -> Result<()> {
    let engine = build_engine(config, client)?;
    let lang = args.lang.unwrap_or_else(|| config.captions.default_lang.clone());

    // Collect URLs: from arg or stdin
    let urls = if let Some(url) = args.url {
        vec![url]
    } else {
        io::stdin().lock().lines().collect::<Result<Vec<_>, _>>()?
    };
    let urls: Vec<&str> = urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()).collect();

    if urls.is_empty() {
        bail!("no URL or video ID provided\n\nUsage: ytdigest extract <URL>\n       echo <URL> | ytdigest extract");
    }

    let mut rendered = Vec::with_capacity(urls.len());
    for url in urls {
        let extraction = engine.extract(url, &lang).await?;
        let transcript = &extraction.transcript;

        if verbose {
            eprintln!(
                "Video: {} ({})\nChannel: {}\nLanguage: {} (requested {})\nSegments: {}",
                transcript.title.as_deref().unwrap_or("-"),
                transcript.video_id,
                transcript.channel.as_deref().unwrap_or("-"),
                transcript.language,
                extraction.requested_lang,
                transcript.segments.len(),
            );
        }

        rendered.push(if args.normalized {
            extraction.normalized
        } else {
            output::render(args.format, transcript)
        });
    }
    let rendered = rendered.join("\n\n");

    if let Some(path) = args.output {
        std::fs::write(&path, &rendered)?;
        if verbose {
            eprintln!("Output written to: {}", path.display());
        }
    } else {
        println!("{rendered}");
    }
    Ok(())
}

struct SummarizeArgs {
    url: Option<String>,
    file: Option<PathBuf>,
    lang: Option<String>,
    target_lang: Option<String>,
    max_words: Option<u32>,
    model: Option<String>,
}

async fn summarize(mut config: Config, client: &reqwest::Client, verbose: bool, args: SummarizeArgs) -> Result<()> {
    if let Some(model) = args.model {
        config.summarize.model = model;
    }
    if let Some(max_words) = args.max_words {
        config.summarize.max_words = max_words;
    }
    config.validate()?;
    let engine = build_engine(&config, client)?;

    let input = match args.file {
        Some(path) if path.as_os_str() == "-" => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            TranscriptInput::from_parts(None, Some(&text), None)?
        }
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            TranscriptInput::from_parts(None, Some(&text), None)?
        }
        None => {
            let lang = args.lang.unwrap_or_else(|| config.captions.default_lang.clone());
            TranscriptInput::from_parts(args.url.as_deref(), None, Some(&lang))?
        }
    };

    let target_lang = args.target_lang.unwrap_or_else(|| config.summarize.target_lang.clone());
    let request = SummaryRequest {
        target_lang: &target_lang,
        max_words: config.summarize.max_words,
        title: None,
    };
    let outcome = engine.summarize(&input, &request).await?;

    if verbose {
        if let Some(video_id) = &outcome.video_id {
            eprintln!(
                "Video: {} ({})\nLanguage: {}",
                outcome.title.as_deref().unwrap_or("-"),
                video_id,
                outcome.original_lang.as_deref().unwrap_or("-"),
            );
        }
        eprintln!(
            "Characters: {}\nChunks: {}\nModel: {}",
            outcome.transcript_length,
            outcome.summary.chunks,
            outcome.summary.model.as_deref().unwrap_or("extractive"),
        );
    }
    if !outcome.summary.ai_generated {
        eprintln!("Note: extractive summary (generative service unavailable)");
    }

    println!("{}", outcome.summary.text);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let after_help = build_after_help();
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    match &cli.command {
        Command::Serve { .. } => setup_stderr_logging(cli.verbose),
        _ => setup_file_logging(cli.verbose)?,
    }

    // A broken default config is reported but not fatal; an explicit --config must load
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) if cli.config.is_none() => {
            eprintln!("Ignoring config: {e:#}");
            Config::default()
        }
        Err(e) => return Err(e),
    };
    debug!("Effective config: {config:?}");

    let client = reqwest::Client::new();

    match cli.command {
        Command::Serve { bind, token } => serve(config, &client, bind, token).await,
        Command::Extract {
            url,
            lang,
            format,
            normalized,
            output,
        } => {
            let args = ExtractArgs {
                url,
                lang,
                format,
                normalized,
                output,
            };
            extract(&config, &client, cli.verbose, args).await
        }
        Command::Summarize {
            url,
            file,
            lang,
            target_lang,
            max_words,
            model,
        } => {
            let args = SummarizeArgs {
                url,
                file,
                lang,
                target_lang,
                max_words,
                model,
            };
            summarize(config, &client, cli.verbose, args).await
        }
    }
}
