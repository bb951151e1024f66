//! Condense CLI - shrink documents and codebases to a token budget
//!
//! Subcommands: `compress` (iterative text compression), `summarize`
//! (per-file codebase summaries), `explain` (line-by-line annotations),
//! `styles` and `init`.

// CLI tools legitimately use print macros for user output
#![allow(clippy::print_stdout, clippy::print_stderr)]

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

mod scanner;

use condense_engine::{
    convergence,
    prompts::{reserved_prompt_tokens, CODE_SYSTEM_PROMPT, TEXT_SYSTEM_PROMPT},
    CodebaseSummarizer, CondenseError, Explainer, LlmCompressor, LoopConfig, LoopState, ModelProfile,
    OpenAiClient, RemoteRepo, Settings, Style, SummaryFormat, SummaryOptions, Tokenizer,
};

/// Condense - iterative LLM compression to a token budget
#[derive(Parser)]
#[command(
    name = "condense",
    version,
    about = "Compress text and code to a token budget with an LLM",
    long_about = "Condense repeatedly chunks, compresses and re-joins a document until it fits a\ntoken target, and summarizes or annotates whole codebases."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file (default: .condense.toml in current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a text file until it fits a token target
    Compress {
        /// Input text file
        file: PathBuf,

        /// Target token count
        #[arg(short, long)]
        target: usize,

        /// Compression style (see `condense styles`)
        #[arg(short, long, default_value = "summary")]
        style: Style,

        /// Model name (default from config)
        #[arg(short, long)]
        model: Option<String>,

        /// Ask for JSON-formatted output
        #[arg(long)]
        json: bool,

        /// Print the result to stdout instead of writing a file
        #[arg(long)]
        stdout: bool,

        /// Output file (default: compressed_output.txt or .json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compress the chunks of each iteration concurrently
        #[arg(long)]
        parallel: bool,

        /// Iteration cap (default from config)
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Summarize the source files of a repository
    Summarize {
        /// Repository path or Git URL
        path: String,

        /// Token budget for the combined summary
        #[arg(short, long)]
        target: usize,

        /// Summary style (see `condense styles`)
        #[arg(short, long, default_value = "summary")]
        style: Style,

        /// Output format
        #[arg(short, long, default_value = "markdown")]
        format: SummaryFormat,

        /// Quote the first lines of each file ahead of its summary
        #[arg(long)]
        include_code_fragments: bool,

        /// Exclude files matching glob pattern (can be repeated)
        #[arg(long = "exclude", short = 'e')]
        exclude_patterns: Vec<String>,

        /// Model name (default from config)
        #[arg(short, long)]
        model: Option<String>,

        /// File extension to summarize
        #[arg(long, default_value = "py")]
        ext: String,

        /// Output file (default: compressed.md or compressed.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Include hidden files
        #[arg(long)]
        hidden: bool,

        /// Don't respect .gitignore
        #[arg(long)]
        no_gitignore: bool,
    },

    /// Annotate every line of a repository's source files
    Explain {
        /// Local repository path
        repo_path: PathBuf,

        /// Directory the explained files are written to (replaced if present)
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Git URL cloned into REPO_PATH when it does not exist
        #[arg(long)]
        repo_url: Option<String>,

        /// Model name (default from config)
        #[arg(short, long)]
        model: Option<String>,

        /// File extension to explain
        #[arg(long, default_value = "py")]
        ext: String,

        /// Language named in the prompt
        #[arg(long, default_value = "Python")]
        language: String,

        /// Include hidden files
        #[arg(long)]
        hidden: bool,

        /// Don't respect .gitignore
        #[arg(long)]
        no_gitignore: bool,
    },

    /// List compression styles
    Styles,

    /// Initialize a configuration file
    Init {
        /// Configuration format
        #[arg(short, long, value_enum, default_value = "toml")]
        format: ConfigFormat,

        /// Output path (default: .condense.toml in current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(ValueEnum, Clone, Copy)]
enum ConfigFormat {
    /// TOML format
    Toml,
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Compress {
            file,
            target,
            style,
            model,
            json,
            stdout,
            output,
            parallel,
            max_iterations,
        } => cmd_compress(
            config,
            file,
            target,
            style,
            model,
            json,
            stdout,
            output,
            parallel,
            max_iterations,
        ),
        Commands::Summarize {
            path,
            target,
            style,
            format,
            include_code_fragments,
            exclude_patterns,
            model,
            ext,
            output,
            hidden,
            no_gitignore,
        } => cmd_summarize(
            config,
            &path,
            target,
            style,
            format,
            include_code_fragments,
            exclude_patterns,
            model,
            ext,
            output,
            hidden,
            !no_gitignore,
        ),
        Commands::Explain {
            repo_path,
            output_dir,
            repo_url,
            model,
            ext,
            language,
            hidden,
            no_gitignore,
        } => cmd_explain(
            config,
            repo_path,
            output_dir,
            repo_url,
            model,
            ext,
            language,
            hidden,
            !no_gitignore,
        ),
        Commands::Styles => cmd_styles(),
        Commands::Init { format, output, force } => cmd_init(format, output, force),
    }
}

/// Settings from the config file and environment, with CLI overrides applied
fn load_settings(config: Option<&Path>, model: Option<String>) -> Result<Settings> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let mut settings = Settings::load(config, &cwd).context("Failed to load configuration")?;
    if let Some(model) = model {
        settings.model = model;
    }
    settings.validate()?;
    Ok(settings)
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_owned());
    pb
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}

fn cmd_compress(
    config: Option<&Path>,
    file: PathBuf,
    target: usize,
    style: Style,
    model: Option<String>,
    json: bool,
    stdout: bool,
    output: Option<PathBuf>,
    parallel: bool,
    max_iterations: Option<u32>,
) -> Result<()> {
    let start = Instant::now();

    if target == 0 {
        return Err(CondenseError::InvalidTarget.into());
    }

    let mut settings = load_settings(config, model)?;
    settings.parallel |= parallel;
    if let Some(max_iterations) = max_iterations {
        settings.max_iterations = max_iterations;
    }
    settings.validate()?;

    let client = OpenAiClient::from_settings(&settings)?;

    if !file.is_file() {
        anyhow::bail!("Input file not found: {}", file.display());
    }
    let text = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read input file: {}", file.display()))?;

    let tokenizer = Tokenizer::for_model(&settings.model);
    let reserved = reserved_prompt_tokens(&tokenizer, TEXT_SYSTEM_PROMPT, &[style], json);
    let max_chunk = ModelProfile::for_model(&settings.model).max_chunk_tokens(settings.safety_margin, reserved);
    log::info!(
        "Model {} ({}), chunks of at most {} tokens",
        settings.model,
        tokenizer.encoding().name(),
        max_chunk
    );

    let loop_config = LoopConfig::from_settings(&settings, target, max_chunk)
        .with_style(style)
        .with_json(json);
    let compressor = LlmCompressor::new(client, settings.model.clone());

    let pb = spinner("Counting tokens...");
    let outcome = convergence::run_observed(&loop_config, &tokenizer, &compressor, &text, |session| {
        pb.set_message(format!(
            "Iteration {}: {} tokens (target {})",
            session.iteration, session.tokens, target
        ));
    })?;
    pb.finish_and_clear();

    let original = outcome.history.first().copied().unwrap_or(outcome.tokens);
    match outcome.state {
        LoopState::Exhausted => eprintln!(
            "{} Maximum iterations reached: {} tokens remain (target {})",
            "⚠".yellow(),
            outcome.tokens,
            target
        ),
        _ => eprintln!(
            "{} Compressed {} -> {} tokens in {} iteration(s), {:.1}s",
            "✓".green(),
            original,
            outcome.tokens,
            outcome.iterations,
            start.elapsed().as_secs_f64()
        ),
    }

    if stdout {
        println!("{}", outcome.text);
        return Ok(());
    }

    let output_path = output.unwrap_or_else(|| {
        PathBuf::from(if json { "compressed_output.json" } else { "compressed_output.txt" })
    });
    std::fs::write(&output_path, &outcome.text)
        .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;
    eprintln!("{} Output written to: {}", "✓".green(), output_path.display());

    Ok(())
}

/// Scratch clone deleted when dropped, on success and error paths alike
struct ClonedRepo(PathBuf);

impl Drop for ClonedRepo {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.0) {
                log::debug!("Failed to remove {}: {}", self.0.display(), e);
            }
        }
    }
}

fn cmd_summarize(
    config: Option<&Path>,
    path: &str,
    target: usize,
    style: Style,
    format: SummaryFormat,
    include_code_fragments: bool,
    exclude_patterns: Vec<String>,
    model: Option<String>,
    ext: String,
    output: Option<PathBuf>,
    include_hidden: bool,
    respect_gitignore: bool,
) -> Result<()> {
    let start = Instant::now();

    if target == 0 {
        return Err(CondenseError::InvalidTarget.into());
    }

    let settings = load_settings(config, model)?;
    let client = OpenAiClient::from_settings(&settings)?;

    // Clone remote repositories to a scratch directory removed on return
    let (repo_path, _cloned) = if !Path::new(path).is_dir() && RemoteRepo::is_remote_url(path) {
        let remote = RemoteRepo::parse(path)?;
        let pb = spinner(&format!("Cloning {}...", remote.name));
        let target = remote.default_target();
        let guard = ClonedRepo(target.clone());
        remote.clone_into(&target).context("Failed to clone repository")?;
        pb.finish_and_clear();
        (target, Some(guard))
    } else {
        let local = PathBuf::from(path);
        if !local.is_dir() {
            anyhow::bail!("Repository path not found: {}", local.display());
        }
        (local, None)
    };

    let mut exclude = settings.exclude.clone();
    exclude.extend(exclude_patterns);
    let scan = scanner::ScanConfig {
        extensions: vec![ext],
        exclude,
        include_hidden,
        respect_gitignore,
    };
    let files = scanner::collect_files(&repo_path, &scan).context("Failed to scan repository")?;

    let rendered = if files.is_empty() {
        eprintln!("{} No source files found to process.", "⚠".yellow());
        String::new()
    } else {
        eprintln!(
            "{} {} files ({})",
            "Summarizing".cyan().bold(),
            files.len(),
            format_size(scanner::total_size(&files)?, BINARY)
        );

        let sources = scanner::read_sources(&files);
        let tokenizer = Tokenizer::for_model(&settings.model);
        let reserved = reserved_prompt_tokens(&tokenizer, CODE_SYSTEM_PROMPT, &[style], false);
        let max_file_tokens =
            ModelProfile::for_model(&settings.model).max_chunk_tokens(settings.safety_margin, reserved);

        let mut options = SummaryOptions::new(target, max_file_tokens);
        options.style = style;
        options.include_code_fragments = include_code_fragments;
        options.aggression = settings.initial_aggression;

        let summarizer = CodebaseSummarizer::new(client, &tokenizer, settings.model.clone(), options);
        let pb = progress_bar(sources.len());
        let summary = summarizer.summarize_observed(&sources, |index, file| {
            pb.set_position(index as u64);
            pb.set_message(file.relative_path.clone());
        });
        pb.finish_and_clear();

        if summary.truncated {
            eprintln!(
                "{} Token target reached after {} of {} files",
                "⚠".yellow(),
                summary.files.len(),
                sources.len()
            );
        }
        summary.render(format)?
    };

    if rendered.is_empty() {
        println!("No output produced.");
        return Ok(());
    }

    let output_path = output.unwrap_or_else(|| PathBuf::from(format!("compressed.{}", format.extension())));
    std::fs::write(&output_path, &rendered)
        .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;

    eprintln!(
        "{} Output written to: {} ({:.1}s)",
        "✓".green(),
        output_path.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn cmd_explain(
    config: Option<&Path>,
    repo_path: PathBuf,
    output_dir: PathBuf,
    repo_url: Option<String>,
    model: Option<String>,
    ext: String,
    language: String,
    include_hidden: bool,
    respect_gitignore: bool,
) -> Result<()> {
    let start = Instant::now();

    if !repo_path.exists() && repo_url.is_none() {
        anyhow::bail!(
            "Repository path does not exist and --repo-url was not provided: {}",
            repo_path.display()
        );
    }

    let settings = load_settings(config, model)?;
    let client = OpenAiClient::from_settings(&settings)?;

    if !repo_path.exists() {
        if let Some(url) = &repo_url {
            let pb = spinner(&format!("Cloning {}...", url));
            RemoteRepo::parse(url)?
                .clone_into(&repo_path)
                .context("Failed to clone repository")?;
            pb.finish_and_clear();
        }
    }

    let repo_root = repo_path
        .canonicalize()
        .with_context(|| format!("Invalid repository path: {}", repo_path.display()))?;

    if output_dir.exists() {
        let out = output_dir.canonicalize()?;
        if repo_root.starts_with(&out) {
            anyhow::bail!("Output directory contains the repository: {}", output_dir.display());
        }
        std::fs::remove_dir_all(&output_dir)
            .with_context(|| format!("Failed to remove {}", output_dir.display()))?;
    }
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let scan = scanner::ScanConfig {
        extensions: vec![ext],
        exclude: settings.exclude.clone(),
        include_hidden,
        respect_gitignore,
    };
    let files = scanner::collect_files(&repo_root, &scan).context("Failed to scan repository")?;
    if files.is_empty() {
        eprintln!("{} No source files found to explain.", "⚠".yellow());
        return Ok(());
    }

    let explainer = Explainer::new(client, settings.model.clone()).with_language(language);
    let pb = progress_bar(files.len());
    for file in &files {
        pb.set_message(file.relative_path.clone());
        match explainer.explain_file(&file.path, &repo_root, &output_dir) {
            Ok(written) => log::info!("Wrote {}", written.display()),
            Err(e) => pb.println(format!("{} {}: {}", "⚠".yellow(), file.relative_path, e)),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    eprintln!(
        "{} Explained {} files into {} in {}",
        "✓".green(),
        files.len(),
        output_dir.display(),
        humantime::format_duration(Duration::from_secs(start.elapsed().as_secs()))
    );
    Ok(())
}

fn cmd_styles() -> Result<()> {
    println!("{}", "Compression styles".cyan().bold());
    println!();
    for style in Style::ALL {
        let kind = format!("{:?}", style.kind()).to_lowercase();
        println!("  {:<22} {:<6} {}", style.tag().green(), kind.dimmed(), style.description());
        if !style.aliases().is_empty() {
            println!("  {:<22} {:<6} aliases: {}", "", "", style.aliases().join(", ").dimmed());
        }
    }
    Ok(())
}

fn cmd_init(format: ConfigFormat, output: Option<PathBuf>, force: bool) -> Result<()> {
    let ext = match format {
        ConfigFormat::Toml => "toml",
        ConfigFormat::Yaml => "yaml",
        ConfigFormat::Json => "json",
    };

    let output_path = output.unwrap_or_else(|| PathBuf::from(format!(".condense.{}", ext)));

    if output_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {} (use --force to overwrite)",
            output_path.display()
        );
    }

    let config_content = Settings::generate_default(ext)?;
    std::fs::write(&output_path, &config_content)
        .with_context(|| format!("Failed to write config file: {}", output_path.display()))?;

    println!("{} Created configuration file: {}", "✓".green(), output_path.display());
    println!();
    println!("Edit this file to customize Condense behavior.");
    println!("Every key can also be set through a CONDENSE_<KEY> environment variable.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cloned_repo_is_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let clone = dir.path().join("condense-repo");
        std::fs::create_dir_all(clone.join("pkg")).unwrap();
        std::fs::write(clone.join("pkg/a.py"), "x = 1\n").unwrap();

        drop(ClonedRepo(clone.clone()));
        assert!(!clone.exists());
    }

    #[test]
    fn test_missing_clone_drops_quietly() {
        let dir = TempDir::new().unwrap();
        drop(ClonedRepo(dir.path().join("never-cloned")));
        assert!(dir.path().exists());
    }
}
