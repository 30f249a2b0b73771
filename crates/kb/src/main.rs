//! kb - personal knowledge base CLI
//!
//! Index a folder of notes, slides and papers, then search or ask it.
//!
//! Usage:
//!   kb index                       Index new and previously failed documents
//!   kb index --full-reindex        Rebuild the whole index
//!   kb search "query"              Semantic search
//!   kb ask "question"              Answer from the knowledge base
//!   kb chunk <file>                Show how a file is split into passages
//!   kb status                      Document and job counts
//!   kb documents                   List documents and their status
//!   kb documents show <id>         Print a document's tags and passages
//!   kb documents tag <id> <tags>   Replace a document's tags

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use kb_core::search::DEFAULT_TOP_K;
use kb_core::{
    default_config_path, load_config, Answer, Config, DocumentFilter, DocumentStatus, IndexMode,
    IndexStats, KnowledgeBase, ParserRegistry, SearchFilter, SearchOptions, SearchResult,
    VectorStore,
};
use passage_chunker::{Chunker, Metadata, Passage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Characters of passage text shown per search hit
const SNIPPET_CHARS: usize = 300;

#[derive(Parser)]
#[command(name = "kb")]
#[command(about = "Personal knowledge base: index, search and ask your documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index documents under the scan directory
    Index {
        /// Re-index every document, not only new and failed ones
        #[arg(long, conflicts_with = "single_file")]
        full_reindex: bool,
        /// Index a single file, whatever its status
        #[arg(long, value_name = "PATH")]
        single_file: Option<PathBuf>,
        /// Show what would be indexed without processing anything
        #[arg(long)]
        dry_run: bool,
        /// Worker threads (defaults to one per core)
        #[arg(long, value_name = "N")]
        threads: Option<usize>,
        /// Output statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search the knowledge base
    Search {
        /// Search query
        query: String,
        /// Number of results to return
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Minimum similarity (0-1); below it results are marked low confidence
        #[arg(long, default_value_t = 0.0)]
        threshold: f32,
        /// Only search these folders. Can be specified multiple times.
        #[arg(long = "folder", value_name = "NAME")]
        folders: Vec<String>,
        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask a question and answer it from the knowledge base
    Ask {
        question: String,
        /// Number of passages given to the model
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Output the answer as JSON
        #[arg(long)]
        json: bool,
    },
    /// Split a file into passages without indexing it
    Chunk {
        file: PathBuf,
        /// Passage size in characters (defaults to the configured size)
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Overlap in characters (defaults to the configured overlap)
        #[arg(long)]
        overlap: Option<usize>,
        /// Ignore headings and split by paragraphs only
        #[arg(long)]
        plain: bool,
        /// Output passages as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show document and index job status
    Status {
        /// Output status as JSON
        #[arg(long)]
        json: bool,
    },
    /// List known documents, or show, delete and tag one
    Documents {
        #[command(subcommand)]
        action: Option<DocumentsAction>,
        /// Only documents with this status (pending, processing, indexed, failed)
        #[arg(long)]
        status: Option<String>,
        /// Only documents in this folder
        #[arg(long)]
        folder: Option<String>,
        /// Output documents as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DocumentsAction {
    /// Show a document with its tags and passages
    Show {
        id: String,
        /// Output the document as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a document and its passages from the index (the file is kept)
    Delete { id: String },
    /// Replace the tags of a document
    Tag {
        id: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Remove one tag from a document
    Untag { id: String, tag: String },
    /// List every tag in use
    Tags {
        /// Output tags as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays clean
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_cli_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Index {
            full_reindex,
            single_file,
            dry_run,
            threads,
            json,
        } => {
            let mode = match single_file {
                Some(path) => IndexMode::SingleFile(path),
                None if full_reindex => IndexMode::FullReindex,
                None => IndexMode::Resume,
            };
            cmd_index(config, &mode, dry_run, threads, json)
        }
        Commands::Search {
            query,
            top_k,
            threshold,
            folders,
            json,
        } => {
            let options = SearchOptions {
                top_k,
                threshold,
                filter: SearchFilter {
                    folders,
                    ..Default::default()
                },
            };
            cmd_search(config, &query, &options, json).map(|()| ExitCode::SUCCESS)
        }
        Commands::Ask {
            question,
            top_k,
            json,
        } => cmd_ask(config, &question, top_k, json).map(|()| ExitCode::SUCCESS),
        Commands::Chunk {
            file,
            chunk_size,
            overlap,
            plain,
            json,
        } => cmd_chunk(&config, &file, chunk_size, overlap, plain, json)
            .map(|()| ExitCode::SUCCESS),
        Commands::Status { json } => cmd_status(config, json).map(|()| ExitCode::SUCCESS),
        Commands::Documents {
            action: Some(action),
            ..
        } => cmd_document_action(config, action).map(|()| ExitCode::SUCCESS),
        Commands::Documents {
            action: None,
            status,
            folder,
            json,
        } => cmd_documents(config, status.as_deref(), folder, json).map(|()| ExitCode::SUCCESS),
    }
}

/// Load the config file, then apply environment overrides.
///
/// An explicit `--config` must exist; the default location may be missing.
fn load_cli_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            anyhow::ensure!(path.exists(), "Config file not found: {}", path.display());
            load_config(path)?
        }
        None => load_config(&default_config_path()?)?,
    };
    config.apply_env()?;
    Ok(config)
}

fn progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .context("Invalid progress bar template")?
        .progress_chars("#>-"),
    );
    Ok(pb)
}

fn cmd_index(
    mut config: Config,
    mode: &IndexMode,
    dry_run: bool,
    threads: Option<usize>,
    json: bool,
) -> Result<ExitCode> {
    if threads.is_some() {
        config.indexing.get_or_insert_with(Default::default).threads = threads;
    }
    let kb = KnowledgeBase::open(config)?;
    let indexer = kb.indexer()?;

    if !json {
        let target = match mode {
            IndexMode::Resume => "new and failed documents".to_string(),
            IndexMode::FullReindex => "all documents".to_string(),
            IndexMode::SingleFile(path) => path.display().to_string(),
        };
        println!(
            "Indexing {} in {}{}",
            target,
            kb.config.scan_dir().display().to_string().cyan(),
            if dry_run { " (dry run)".yellow().to_string() } else { String::new() }
        );
    }

    let pb = if json { ProgressBar::hidden() } else { progress_bar()? };
    let stats = indexer.run_with_progress(mode, dry_run, |outcome| {
        pb.set_length(outcome.total as u64);
        if let Err(error) = &outcome.result {
            pb.println(format!("  {} {}: {}", "failed".red(), outcome.filename, error));
        }
        pb.set_message(outcome.filename.clone());
        pb.inc(1);
    })?;
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_index_summary(&stats);
    }

    Ok(if stats.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_index_summary(stats: &IndexStats) {
    println!(
        "  Scanned:  {} files ({} new)",
        stats.sync.total.to_string().cyan(),
        stats.sync.new
    );

    if stats.dry_run {
        println!(
            "  Would index {} documents",
            stats.total.to_string().cyan()
        );
        return;
    }
    if stats.total == 0 {
        println!("{}", "Nothing to index.".green());
        return;
    }

    println!();
    println!("{}", "Indexing complete!".green().bold());
    println!("  Documents indexed: {}", stats.succeeded.to_string().cyan());
    if stats.failed > 0 {
        println!("  Documents failed:  {}", stats.failed.to_string().red());
    }
    println!("  Passages stored:   {}", stats.chunks.to_string().cyan());
    println!("  Time:              {:.1}s", stats.elapsed_secs);
    if stats.failed > 0 {
        println!(
            "  {}",
            "Run 'kb index' again to retry failed documents".dimmed()
        );
    }
}

/// Match quality tier based on cosine similarity
#[derive(Debug, Clone, Copy)]
enum MatchQuality {
    /// Score >= 0.6
    Strong,
    /// Score >= 0.4
    Good,
    /// Score >= 0.2
    Fair,
    Weak,
}

impl MatchQuality {
    fn from_score(score: f32) -> Self {
        if score >= 0.6 {
            MatchQuality::Strong
        } else if score >= 0.4 {
            MatchQuality::Good
        } else if score >= 0.2 {
            MatchQuality::Fair
        } else {
            MatchQuality::Weak
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MatchQuality::Strong => "Strong",
            MatchQuality::Good => "Good",
            MatchQuality::Fair => "Fair",
            MatchQuality::Weak => "Weak",
        }
    }

    fn colored_label(&self) -> colored::ColoredString {
        match self {
            MatchQuality::Strong => self.label().green().bold(),
            MatchQuality::Good => self.label().green(),
            MatchQuality::Fair => self.label().yellow(),
            MatchQuality::Weak => self.label().dimmed(),
        }
    }
}

fn cmd_search(config: Config, query: &str, options: &SearchOptions, json: bool) -> Result<()> {
    let kb = KnowledgeBase::open(config)?;
    let results = kb.search(query, options)?;

    if json {
        #[derive(Serialize)]
        struct SearchOutput<'a> {
            query: &'a str,
            results: &'a [SearchResult],
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&SearchOutput {
                query,
                results: &results
            })?
        );
        return Ok(());
    }

    print_results_human(&results, query);
    Ok(())
}

fn result_location(filename: Option<&str>, folder: Option<&str>, page: Option<u32>) -> String {
    let mut location = match (folder, filename) {
        (Some(folder), Some(name)) => format!("{folder}/{name}"),
        (None, Some(name)) => name.to_string(),
        (_, None) => "unknown".to_string(),
    };
    if let Some(page) = page {
        location.push_str(&format!(" p.{page}"));
    }
    location
}

fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn print_results_human(results: &[SearchResult], query: &str) {
    if results.is_empty() {
        println!("No results found for \"{query}\"");
        return;
    }

    println!(
        "Found {} results for \"{}\":",
        results.len().to_string().cyan(),
        query.yellow()
    );
    if results.iter().any(|r| r.low_confidence) {
        println!(
            "{}",
            "No passage met the threshold; showing the closest matches.".yellow()
        );
    }
    println!();

    for (i, result) in results.iter().enumerate() {
        let quality = MatchQuality::from_score(result.score);
        println!(
            "{} {} {} {}",
            format!("{}.", i + 1).dimmed(),
            result_location(
                result.filename.as_deref(),
                result.folder.as_deref(),
                result.page
            )
            .cyan()
            .bold(),
            quality.colored_label(),
            format!("({:.0}%)", result.score * 100.0).dimmed()
        );
        if let Some(title) = &result.section_title {
            println!("  {} {}", "Section:".dimmed(), title.blue());
        }
        for line in snippet(&result.text, SNIPPET_CHARS).lines() {
            println!("  {}", line.dimmed());
        }
        println!();
    }
}

fn cmd_ask(config: Config, question: &str, top_k: usize, json: bool) -> Result<()> {
    let kb = KnowledgeBase::open(config)?;
    let answer = kb.ask(question, top_k)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    print_answer_human(&answer);
    Ok(())
}

fn print_answer_human(answer: &Answer) {
    println!("{}", answer.text);
    println!();

    if !answer.sources.is_empty() {
        println!("{}", "Sources".white().bold());
        for (i, source) in answer.sources.iter().enumerate() {
            println!(
                "  [{}] {} {}",
                i + 1,
                result_location(
                    source.filename.as_deref(),
                    source.folder.as_deref(),
                    source.page
                )
                .cyan(),
                format!("({:.2})", source.score).dimmed()
            );
        }
        println!();
    }

    match &answer.model {
        Some(model) => println!("{} {}", "Answered by".dimmed(), model.dimmed()),
        None => println!("{}", "No language model was used".dimmed()),
    }
}

fn cmd_chunk(
    config: &Config,
    file: &Path,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
    plain: bool,
    json: bool,
) -> Result<()> {
    let parsed = ParserRegistry::with_defaults()
        .parse(file)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    let chunker = Chunker::builder()
        .chunk_size(chunk_size.unwrap_or_else(|| config.chunk_size()))
        .chunk_overlap(overlap.unwrap_or_else(|| config.chunk_overlap()))
        .include_title_prefix(config.include_title_prefix())
        .smart(!plain && config.smart_chunking())
        .build()?;

    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut metadata = Metadata::new();
    metadata.insert("filename".to_string(), filename.as_str().into());
    let passages = chunker.chunk_pages(&parsed.pages, &metadata)?;

    if json {
        #[derive(Serialize)]
        struct ChunkOutput<'a> {
            path: String,
            chunk_size: usize,
            chunk_overlap: usize,
            smart: bool,
            pages: usize,
            total_passages: usize,
            passages: &'a [Passage],
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&ChunkOutput {
                path: file.display().to_string(),
                chunk_size: chunker.chunk_size(),
                chunk_overlap: chunker.chunk_overlap(),
                smart: chunker.is_smart(),
                pages: parsed.pages.len(),
                total_passages: passages.len(),
                passages: &passages,
            })?
        );
        return Ok(());
    }

    println!(
        "{}: {} passages from {} pages (size {}, overlap {}, {})",
        filename.cyan().bold(),
        passages.len().to_string().cyan(),
        parsed.pages.len(),
        chunker.chunk_size(),
        chunker.chunk_overlap(),
        if chunker.is_smart() { "section-aware" } else { "plain" }
    );
    println!();

    for passage in &passages {
        let mut header = format!("#{} {} chars", passage.index, passage.char_len());
        if let Some(page) = passage.metadata.page {
            header.push_str(&format!(", page {page}"));
        }
        if let Some(title) = &passage.metadata.section_title {
            header.push_str(&format!(", {title}"));
        }
        println!("{}", format!("── {header} ──").dimmed());
        println!("{}", passage.text);
        println!();
    }
    Ok(())
}

fn cmd_status(config: Config, json: bool) -> Result<()> {
    let kb = KnowledgeBase::open(config)?;
    let counts = kb.db.status_counts()?;
    let passages = kb.store.count()?;

    if json {
        #[derive(Serialize)]
        struct StatusOutput {
            scan_dir: String,
            data_dir: String,
            documents: kb_core::StatusCounts,
            passages: usize,
            folders: Vec<kb_core::FolderStats>,
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&StatusOutput {
                scan_dir: kb.config.scan_dir().display().to_string(),
                data_dir: kb.config.data_dir().display().to_string(),
                documents: counts,
                passages,
                folders: kb.db.folders()?,
            })?
        );
        return Ok(());
    }

    println!("{}", "━".repeat(50).dimmed());
    println!("{}", "            Knowledge Base Status".cyan().bold());
    println!("{}", "━".repeat(50).dimmed());
    println!();

    println!("{}", "Documents".white().bold());
    println!("  Total:      {}", counts.total.to_string().cyan());
    println!("  Indexed:    {}", counts.indexed.to_string().green());
    println!("  Pending:    {}", counts.pending.to_string().yellow());
    if counts.processing > 0 {
        println!("  Processing: {}", counts.processing.to_string().yellow());
    }
    if counts.failed > 0 {
        println!("  Failed:     {}", counts.failed.to_string().red());
    }
    println!("  Passages:   {}", passages.to_string().cyan());
    println!();

    let folders = kb.db.folders()?;
    if !folders.is_empty() {
        println!("{}", "Folders".white().bold());
        for folder in folders {
            println!(
                "  {:<30} {}/{} indexed",
                folder.name,
                folder.indexed,
                folder.count
            );
        }
        println!();
    }

    println!("{}", "Last index job".white().bold());
    match &counts.latest_job {
        Some(job) => {
            println!("  Job:       #{} ({})", job.id, job.status.as_str().cyan());
            println!(
                "  Processed: {}/{} ({} failed)",
                job.processed_files, job.total_files, job.failed_files
            );
        }
        None => println!("  {}", "Run 'kb index' to build the index".dimmed()),
    }
    println!();

    println!("{}", "Paths".white().bold());
    println!(
        "  Documents: {}",
        kb.config.scan_dir().display().to_string().dimmed()
    );
    println!(
        "  Data:      {}",
        kb.config.data_dir().display().to_string().dimmed()
    );
    Ok(())
}

fn cmd_documents(
    config: Config,
    status: Option<&str>,
    folder: Option<String>,
    json: bool,
) -> Result<()> {
    let kb = KnowledgeBase::open(config)?;
    let mut filter = DocumentFilter {
        folder,
        ..Default::default()
    };
    if let Some(status) = status {
        filter.statuses.push(status.parse::<DocumentStatus>()?);
    }
    let documents = kb.db.list_documents(&filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&documents)?);
        return Ok(());
    }

    if documents.is_empty() {
        println!("No documents found.");
        return Ok(());
    }

    for doc in &documents {
        let status = match doc.status {
            DocumentStatus::Indexed => doc.status.as_str().green(),
            DocumentStatus::Failed => doc.status.as_str().red(),
            DocumentStatus::Pending | DocumentStatus::Processing => doc.status.as_str().yellow(),
        };
        println!(
            "{:<10} {} {} {}",
            status,
            doc.id.dimmed(),
            result_location(Some(&doc.filename), doc.folder.as_deref(), None).cyan(),
            format!("{} KB, {} passages", doc.size_kb, doc.chunks_count).dimmed()
        );
        if let Some(error) = &doc.error {
            println!("           {}", error.red());
        }
    }
    println!();
    println!("{} documents", documents.len().to_string().cyan());
    Ok(())
}

fn cmd_document_action(config: Config, action: DocumentsAction) -> Result<()> {
    let kb = KnowledgeBase::open(config)?;

    match action {
        DocumentsAction::Show { id, json } => {
            let content = kb
                .document_content(&id)?
                .with_context(|| format!("Document not found: {id}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&content)?);
                return Ok(());
            }

            let doc = &content.document;
            println!(
                "{} {}",
                result_location(Some(&doc.filename), doc.folder.as_deref(), None)
                    .cyan()
                    .bold(),
                doc.id.dimmed()
            );
            println!("  Path:     {}", doc.filepath.display());
            println!("  Status:   {}", doc.status);
            println!("  Size:     {} KB", doc.size_kb);
            if !content.tags.is_empty() {
                println!("  Tags:     {}", content.tags.join(", ").blue());
            }
            if let Some(error) = &doc.error {
                println!("  Error:    {}", error.red());
            }
            println!("  Passages: {}", content.chunks.len().to_string().cyan());
            println!();
            for chunk in &content.chunks {
                let page = chunk.page.map(|p| format!(", page {p}")).unwrap_or_default();
                println!("{}", format!("── #{}{page} ──", chunk.chunk_index).dimmed());
                println!("{}", chunk.text);
                println!();
            }
        }
        DocumentsAction::Delete { id } => {
            let removed = kb
                .delete_document(&id)?
                .with_context(|| format!("Document not found: {id}"))?;
            println!("Deleted {} ({} passages removed)", id.cyan(), removed);
        }
        DocumentsAction::Tag { id, tags } => {
            let tags = kb.set_document_tags(&id, &tags)?;
            println!("{} tags: {}", id.cyan(), tags.join(", "));
        }
        DocumentsAction::Untag { id, tag } => {
            let tags = kb.remove_document_tag(&id, &tag)?;
            println!("{} tags: {}", id.cyan(), tags.join(", "));
        }
        DocumentsAction::Tags { json } => {
            let tags = kb.db.all_tags()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
            } else if tags.is_empty() {
                println!("No tags.");
            } else {
                for tag in tags {
                    println!("{tag}");
                }
            }
        }
    }
    Ok(())
}
