use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a whole book in one run and export it.
    Write(WriteArgs),
    /// Interactive, resumable writing session on stdin.
    Session(SessionArgs),
    /// Show the saved draft.
    Status(DraftArgs),
    /// Compile the saved draft into a document.
    Export(ExportArgs),
    /// Delete the saved draft.
    Reset(DraftArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LlmEngine {
    Noop,
    Openai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Md,
    Html,
}

#[derive(Debug, Args)]
pub struct DraftArgs {
    /// Directory holding the saved draft.
    #[arg(long, default_value = "bookforge-draft")]
    pub draft_dir: PathBuf,

    /// Refuse to save drafts larger than this many bytes.
    #[arg(long)]
    pub max_draft_bytes: Option<usize>,
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    #[command(flatten)]
    pub draft: DraftArgs,

    /// Book details (YAML).
    #[arg(long)]
    pub details: PathBuf,

    /// Output file for the compiled book.
    #[arg(long)]
    pub out: PathBuf,

    #[arg(long, value_enum, default_value_t = ExportFormat::Md)]
    pub format: ExportFormat,

    /// Overwrite the output file if it exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    #[arg(long, value_enum, default_value_t = LlmEngine::Noop)]
    pub engine: LlmEngine,
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    #[command(flatten)]
    pub draft: DraftArgs,

    /// Book details (YAML) used by the `outline` command.
    #[arg(long)]
    pub details: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LlmEngine::Noop)]
    pub engine: LlmEngine,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub draft: DraftArgs,

    #[arg(long)]
    pub out: PathBuf,

    #[arg(long, value_enum, default_value_t = ExportFormat::Md)]
    pub format: ExportFormat,

    #[arg(long, default_value_t = false)]
    pub force: bool,
}
