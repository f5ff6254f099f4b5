use std::io::Write;
use std::path::PathBuf;

use anyhow::Context as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _};

use crate::autosave::Autosaver;
use crate::cli::{ExportFormat, SessionArgs};
use crate::commands::{describe, draft_store, load_details};
use crate::error::WorkflowError;
use crate::model::BookDetails;
use crate::workflow::{Direction, WorkflowSession};

const HELP: &str = "commands:\n\
  outline                 generate the outline from --details\n\
  revise-outline <text>   revise the outline\n\
  approve                 approve the outline and write the first page\n\
  next                    approve the current page and write the next one\n\
  revise <text>           revise the page being viewed\n\
  prev | forward          move between written pages\n\
  auto                    write the whole book from the outline\n\
  revise-book <text>      revise the finished book\n\
  show                    print the page being viewed\n\
  status                  print session state\n\
  export [--force] <path> write the book as Markdown (.html for HTML)\n\
  start-over              delete the draft and start again\n\
  quit\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Outline,
    ReviseOutline(String),
    Approve,
    Next,
    Revise(String),
    Prev,
    Forward,
    Auto,
    ReviseBook(String),
    Show,
    Status,
    Export { path: PathBuf, force: bool },
    StartOver,
    Help,
    Quit,
}

impl ReplCommand {
    /// Parses one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "outline" => Self::Outline,
            "revise-outline" => Self::ReviseOutline(rest.to_owned()),
            "approve" => Self::Approve,
            "next" => Self::Next,
            "revise" => Self::Revise(rest.to_owned()),
            "prev" => Self::Prev,
            "forward" => Self::Forward,
            "auto" => Self::Auto,
            "revise-book" => Self::ReviseBook(rest.to_owned()),
            "show" => Self::Show,
            "status" => Self::Status,
            "export" => {
                let (force, path) = match rest.strip_prefix("--force") {
                    Some(path) if path.is_empty() || path.starts_with(char::is_whitespace) => {
                        (true, path.trim())
                    }
                    _ => (false, rest),
                };
                if path.is_empty() {
                    return Err("export needs an output path".to_owned());
                }
                Self::Export {
                    path: PathBuf::from(path),
                    force,
                }
            }
            "start-over" => Self::StartOver,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command: {other} (try `help`)")),
        };
        Ok(Some(command))
    }
}

pub async fn run(args: SessionArgs) -> anyhow::Result<()> {
    let details = args.details.as_deref().map(load_details).transpose()?;
    let generator = crate::generator::from_engine(args.engine)?;
    let store = draft_store(&args.draft);
    let mut session = WorkflowSession::new(generator, store);

    let mut stdout = std::io::stdout();
    match session.load_draft().await {
        Ok(true) => writeln!(stdout, "resumed saved draft")?,
        Ok(false) => {}
        Err(err @ WorkflowError::StorageCorrupt(_)) => writeln!(stdout, "warning: {err}")?,
        Err(err) => return Err(err).context("load draft"),
    }

    let interval = crate::config::autosave_interval_from_env()?;
    let _autosaver = Autosaver::spawn(session.shared_draft(), session.subscribe(), interval);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run_loop(&mut session, details.as_ref(), stdin, &mut stdout).await
}

/// Reads commands until `quit` or end of input.
pub async fn run_loop<R, W>(
    session: &mut WorkflowSession,
    details: Option<&BookDetails>,
    input: R,
    out: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "{}", describe(session.state()).trim_end())?;
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("read command")? {
        let command = match ReplCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                writeln!(out, "error: {message}")?;
                continue;
            }
        };
        if command == ReplCommand::Quit {
            break;
        }
        if let Err(err) = execute(session, details, command, out).await {
            writeln!(out, "error: {err:#}")?;
        }
        if let Some(warning) = session.take_persist_warning() {
            writeln!(out, "warning: draft not saved: {warning}")?;
        }
        out.flush().context("flush output")?;
    }
    Ok(())
}

async fn execute<W: Write>(
    session: &mut WorkflowSession,
    details: Option<&BookDetails>,
    command: ReplCommand,
    out: &mut W,
) -> anyhow::Result<()> {
    match command {
        ReplCommand::Outline => {
            let details = details.cloned().ok_or_else(|| {
                anyhow::anyhow!("start the session with --details to generate an outline")
            })?;
            session.generate_outline(details).await?;
            print_outline(session, out)?;
        }
        ReplCommand::ReviseOutline(feedback) => {
            session.revise_outline(&feedback).await?;
            print_outline(session, out)?;
        }
        ReplCommand::Approve => {
            session.approve_outline().await?;
            print_page(session, out)?;
        }
        ReplCommand::Next => {
            session.approve_and_continue().await?;
            print_page(session, out)?;
        }
        ReplCommand::Revise(feedback) => {
            session.revise_page(&feedback).await?;
            print_page(session, out)?;
        }
        ReplCommand::Prev => {
            session.navigate(Direction::Prev);
            print_page(session, out)?;
        }
        ReplCommand::Forward => {
            session.navigate(Direction::Next);
            print_page(session, out)?;
        }
        ReplCommand::Auto => {
            session.auto_write().await?;
            writeln!(out, "{}", describe(session.state()).trim_end())?;
        }
        ReplCommand::ReviseBook(feedback) => {
            session.revise_full_book(&feedback).await?;
            writeln!(out, "book revised")?;
        }
        ReplCommand::Show => print_page(session, out)?,
        ReplCommand::Status => writeln!(out, "{}", describe(session.state()).trim_end())?,
        ReplCommand::Export { path, force } => {
            let format = match path.extension().and_then(|e| e.to_str()) {
                Some("html" | "htm") => ExportFormat::Html,
                _ => ExportFormat::Md,
            };
            crate::export::write(session.state(), &path, format, force)?;
            writeln!(out, "exported to {}", path.display())?;
        }
        ReplCommand::StartOver => {
            session.start_over().await?;
            writeln!(out, "draft cleared")?;
        }
        ReplCommand::Help => write!(out, "{HELP}")?,
        ReplCommand::Quit => {}
    }
    Ok(())
}

fn print_outline<W: Write>(session: &WorkflowSession, out: &mut W) -> anyhow::Result<()> {
    let Some(outline) = session.outline() else {
        return Ok(());
    };
    writeln!(out, "titles: {}", outline.titles.join(" | "))?;
    writeln!(out, "{}", outline.summary)?;
    for (idx, chapter) in outline.chapters.iter().enumerate() {
        writeln!(out, "{}. {}: {}", idx + 1, chapter.title, chapter.description)?;
    }
    Ok(())
}

fn print_page<W: Write>(session: &WorkflowSession, out: &mut W) -> anyhow::Result<()> {
    writeln!(
        out,
        "[{} | viewing {} | latest {}]",
        session.phase(),
        session.view_cursor(),
        session.write_cursor()
    )?;
    writeln!(out, "{}", session.displayed_text())?;
    Ok(())
}
