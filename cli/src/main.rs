//! mdocx CLI - Markdown and Word conversion tool

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use mdocx::{
    media, parse_file, ConvertOptions, Diagnostic, DocFormat, JsonFormat, Lineage, MediaDir,
    Pipeline, VersionEntry,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "mdocx")]
#[command(author = "iyulab")]
#[command(version)]
#[command(about = "Convert between Markdown and Word documents", long_about = None)]
struct Cli {
    /// Try pandoc before the built-in converter
    #[arg(long, global = true)]
    external: bool,

    /// Path to the pandoc executable (implies --external)
    #[arg(long, global = true, env = "MDOCX_PANDOC", value_name = "PATH")]
    pandoc: Option<PathBuf>,

    /// Timeout for one pandoc run, in seconds
    #[arg(long, global = true, env = "MDOCX_TIMEOUT", default_value = "60")]
    timeout: u64,

    /// Name of the media directory next to the document
    #[arg(long, global = true, default_value = "media", value_name = "NAME")]
    media: String,

    /// Do not record version history
    #[arg(long, global = true)]
    no_history: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a Word document from Markdown
    Generate {
        /// Input Markdown file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output directory (defaults to the input's directory)
        #[arg(short, long, env = "MDOCX_OUTPUT_DIR", value_name = "DIR")]
        output: Option<PathBuf>,

        /// Base name of the generated files (defaults to the input's name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Extract a Word document to Markdown
    Extract {
        /// Input Word file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output directory (defaults to the input's directory)
        #[arg(short, long, env = "MDOCX_OUTPUT_DIR", value_name = "DIR")]
        output: Option<PathBuf>,

        /// Print the Markdown instead of writing a file
        #[arg(long)]
        stdout: bool,
    },

    /// Save a revised Markdown text as a new version of a document
    Revise {
        /// Existing Markdown document
        #[arg(value_name = "EXISTING")]
        existing: PathBuf,

        /// File holding the revised Markdown
        #[arg(value_name = "REVISED")]
        revised: PathBuf,
    },

    /// List the recorded versions of a document
    History {
        /// Document name (the file name without extension)
        #[arg(value_name = "LINEAGE")]
        lineage: String,

        /// Directory holding the document
        #[arg(short, long, env = "MDOCX_OUTPUT_DIR", value_name = "DIR")]
        output: Option<PathBuf>,

        /// Show the files of one version
        #[arg(long, value_name = "N")]
        show: Option<u32>,
    },

    /// Copy the images of a Markdown file into its media directory
    Normalize {
        /// Markdown file, rewritten in place
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Show document information
    Info {
        /// Markdown or Word file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Dump the block model as JSON
    Json {
        /// Markdown or Word file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Show version information
    Version,
}

impl Cli {
    fn options(&self) -> ConvertOptions {
        let mut options = ConvertOptions::new().with_history(!self.no_history);
        options.media_dir_name = self.media.clone();
        options.external.enabled = self.external || self.pandoc.is_some();
        options.external.program = self.pandoc.clone();
        options.external.timeout = Duration::from_secs(self.timeout);
        options
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let options = cli.options();

    let result = match cli.command {
        Commands::Generate {
            input,
            output,
            name,
        } => cmd_generate(options, &input, output.as_deref(), name),
        Commands::Extract {
            input,
            output,
            stdout,
        } => cmd_extract(options, &input, output.as_deref(), stdout),
        Commands::Revise { existing, revised } => cmd_revise(options, &existing, &revised),
        Commands::History {
            lineage,
            output,
            show,
        } => cmd_history(options, &lineage, output.as_deref(), show),
        Commands::Normalize { input } => cmd_normalize(&options, &input),
        Commands::Info { input } => cmd_info(&input),
        Commands::Json {
            input,
            output,
            compact,
        } => cmd_json(&input, output.as_deref(), compact),
        Commands::Version => {
            cmd_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}

fn spinner(message: &str) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    Ok(pb)
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{} {}", "warning:".yellow().bold(), diagnostic);
    }
}

fn print_version(entry: &VersionEntry) {
    println!(
        "{} {} v{} ({}, {})",
        "Recorded".green(),
        entry.lineage,
        entry.sequence,
        entry.operation,
        entry.created.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

fn cmd_generate(
    options: ConvertOptions,
    input: &Path,
    output: Option<&Path>,
    name: Option<String>,
) -> CliResult {
    let text = fs::read_to_string(input)?;
    let output_dir = output.map(Path::to_path_buf).unwrap_or_else(|| parent_dir(input));
    fs::create_dir_all(&output_dir)?;

    let name = name.unwrap_or_else(|| file_stem(input));
    let media = MediaDir::with_base(output_dir.join(&options.media_dir_name), &output_dir);
    let pipeline = Pipeline::new(options.with_document_name(name));

    let pb = spinner("Generating Word document...")?;
    let result = pipeline.generate_from_markdown(&text, &media);
    pb.finish_and_clear();
    let result = result?;

    print_diagnostics(&result.diagnostics);
    println!("{}", "Output files:".green().bold());
    println!("  {} {}", "├─".dimmed(), result.markdown_path.display());
    println!("  {} {}", "└─".dimmed(), result.word_path.display());
    println!("{} {}", "Converted with".dimmed(), result.path_taken);
    if let Some(entry) = &result.version {
        print_version(entry);
    }
    Ok(())
}

fn cmd_extract(
    options: ConvertOptions,
    input: &Path,
    output: Option<&Path>,
    stdout: bool,
) -> CliResult {
    let output_dir = output.map(Path::to_path_buf).unwrap_or_else(|| parent_dir(input));
    let media = MediaDir::with_base(output_dir.join(&options.media_dir_name), &output_dir);
    let pipeline = Pipeline::new(options);

    let pb = spinner("Extracting Markdown...")?;
    let result = pipeline.extract_to_markdown(input, &media);
    pb.finish_and_clear();
    let result = result?;

    print_diagnostics(&result.diagnostics);
    if stdout {
        print!("{}", result.markdown);
        return Ok(());
    }

    let path = output_dir.join(format!("{}.{}", file_stem(input), DocFormat::Markdown.extension()));
    mdocx::persist::write_atomic(&path, result.markdown.as_bytes())?;
    println!("{} {}", "Saved to".green(), path.display());
    println!("{} {}", "Converted with".dimmed(), result.path_taken);
    Ok(())
}

fn cmd_revise(options: ConvertOptions, existing: &Path, revised: &Path) -> CliResult {
    let text = fs::read_to_string(revised)?;
    let pipeline = Pipeline::new(options);

    let pb = spinner("Recording revision...")?;
    let result = pipeline.revise(existing, &text);
    pb.finish_and_clear();
    let result = result?;

    print_diagnostics(&result.generate.diagnostics);
    println!("{} {}", "Updated".green(), result.generate.word_path.display());
    print_version(&result.entry);
    Ok(())
}

fn cmd_history(
    options: ConvertOptions,
    lineage: &str,
    output: Option<&Path>,
    show: Option<u32>,
) -> CliResult {
    let dir = output.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let ledger = Pipeline::new(options).ledger_for(&dir);
    let lineage = Lineage::new(lineage)?;

    if let Some(sequence) = show {
        let entry = ledger.get(&lineage, sequence)?;
        print_version(&entry);
        println!("  {} {}", "├─".dimmed(), entry.markdown.display());
        match &entry.media {
            Some(media) => {
                println!("  {} {}", "├─".dimmed(), entry.word.display());
                println!("  {} {}", "└─".dimmed(), media.display());
            }
            None => println!("  {} {}", "└─".dimmed(), entry.word.display()),
        }
        return Ok(());
    }

    let entries = ledger.list(&lineage)?;
    if entries.is_empty() {
        println!("{} {}", "No versions recorded for".yellow(), lineage);
        return Ok(());
    }

    println!("{} {}", "History of".cyan().bold(), lineage);
    println!("{}", "─".repeat(40).dimmed());
    for entry in &entries {
        println!(
            "{:>4}  {}  {}",
            format!("v{}", entry.sequence).bold(),
            entry.created.format("%Y-%m-%d %H:%M:%S"),
            entry.operation
        );
    }
    Ok(())
}

fn cmd_normalize(options: &ConvertOptions, input: &Path) -> CliResult {
    let dir = parent_dir(input);
    let media_dir = MediaDir::with_base(dir.join(&options.media_dir_name), &dir);
    let report = media::normalize_markdown_file(input, &media_dir)?;

    print_diagnostics(&report.diagnostics);
    println!(
        "{} {} references, {} copied, {} rewritten",
        "Normalized".green(),
        report.references.len(),
        report.copied,
        report.rewritten
    );
    Ok(())
}

fn cmd_json(input: &Path, output: Option<&Path>, compact: bool) -> CliResult {
    let format = if compact {
        JsonFormat::Compact
    } else {
        JsonFormat::Pretty
    };

    let json = mdocx::to_json(input, format)?;

    if let Some(path) = output {
        mdocx::persist::write_atomic(path, json.as_bytes())?;
        println!("{} {}", "Saved to".green(), path.display());
    } else {
        println!("{}", json);
    }

    Ok(())
}

fn cmd_info(input: &Path) -> CliResult {
    let format = mdocx::detect_format_from_path(input)?;
    let parsed = parse_file(input)?;
    let doc = &parsed.document;

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {}", "Format".bold(), format);
    if let Some(title) = doc.title() {
        println!("{}: {}", "Title".bold(), title);
    }
    if let Some(ref author) = doc.metadata.author {
        println!("{}: {}", "Author".bold(), author);
    }
    if let Some(ref created) = doc.metadata.created {
        println!("{}: {}", "Created".bold(), created);
    }

    println!();
    println!("{}", "Content Statistics".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    let stats = doc.stats();
    println!("{}: {}", "Blocks".bold(), doc.len());
    println!("{}: {}", "Headings".bold(), stats.heading_count);
    println!("{}: {}", "Paragraphs".bold(), stats.paragraph_count);
    println!("{}: {}", "List items".bold(), stats.list_item_count);
    println!("{}: {}", "Quotes".bold(), stats.quote_count);
    println!("{}: {}", "Tables".bold(), stats.table_count);
    println!("{}: {}", "Code blocks".bold(), stats.code_block_count);
    println!("{}: {}", "Images".bold(), stats.image_count);
    println!("{}: {}", "Words".bold(), stats.word_count);
    println!("{}: {}", "Characters".bold(), stats.char_count);

    print_diagnostics(&parsed.diagnostics);
    Ok(())
}

fn cmd_version() {
    println!("{} {}", "mdocx".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("Markdown and Word conversion tool");
    println!();
    println!("Repository: {}", "https://github.com/iyulab/mdocx".dimmed());
    println!("License: MIT");
}
