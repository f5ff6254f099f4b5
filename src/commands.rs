use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use crate::cli::{DraftArgs, ExportArgs, WriteArgs};
use crate::draft_store::{DRAFT_KEY, DraftStore, LocalFsDraftStore};
use crate::model::{BookDetails, SavedState};
use crate::workflow::{WorkflowSession, decode_snapshot};

pub fn load_details(path: &Path) -> anyhow::Result<BookDetails> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("read book details: {}", path.display()))?;
    let details: BookDetails = serde_yaml::from_str(&yaml).context("parse book details yaml")?;
    details
        .validate()
        .map_err(|msg| anyhow::anyhow!("invalid book details: {msg}"))?;
    Ok(details)
}

pub fn draft_store(args: &DraftArgs) -> Arc<dyn DraftStore> {
    let store = LocalFsDraftStore::new(&args.draft_dir);
    match args.max_draft_bytes {
        Some(max_bytes) => Arc::new(store.with_max_bytes(max_bytes)),
        None => Arc::new(store),
    }
}

/// Outline, full automatic draft, export.
pub async fn write(args: WriteArgs) -> anyhow::Result<()> {
    if args.out.exists() && !args.force {
        anyhow::bail!("output already exists: {}", args.out.display());
    }
    let details = load_details(&args.details)?;
    let generator = crate::generator::from_engine(args.engine)?;
    let mut session = WorkflowSession::new(generator, draft_store(&args.draft));

    tracing::info!(engine = ?args.engine, theme = %details.theme, "write book");
    session
        .generate_outline(details)
        .await
        .context("generate outline")?;
    session.auto_write().await.context("write book")?;
    if let Some(warning) = session.take_persist_warning() {
        tracing::warn!(%warning, "draft was not saved");
    }

    crate::export::write(session.state(), &args.out, args.format, args.force)
        .context("export book")?;
    Ok(())
}

pub async fn status(args: DraftArgs) -> anyhow::Result<()> {
    let Some(state) = read_draft(&args).await? else {
        println!("no saved draft in {}", args.draft_dir.display());
        return Ok(());
    };
    print!("{}", describe(&state));
    Ok(())
}

pub async fn export(args: ExportArgs) -> anyhow::Result<()> {
    let state = read_draft(&args.draft)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no saved draft in {}", args.draft.draft_dir.display()))?;
    crate::export::write(&state, &args.out, args.format, args.force)
}

pub async fn reset(args: DraftArgs) -> anyhow::Result<()> {
    draft_store(&args)
        .delete(DRAFT_KEY)
        .await
        .context("delete draft")?;
    println!("draft removed");
    Ok(())
}

async fn read_draft(args: &DraftArgs) -> anyhow::Result<Option<SavedState>> {
    let raw = draft_store(args)
        .get(DRAFT_KEY)
        .await
        .context("read draft")?;
    raw.map(|raw| {
        decode_snapshot(&raw)
            .map_err(|reason| anyhow::anyhow!("saved draft is corrupted: {reason}"))
    })
    .transpose()
}

/// Multi-line summary of a snapshot.
pub fn describe(state: &SavedState) -> String {
    let mut out = format!("phase: {}\n", state.phase);
    if let Some(title) = state.outline.as_ref().and_then(|o| o.title()) {
        out.push_str(&format!("title: {title}\n"));
    }
    if let Some(details) = state.details.as_ref() {
        out.push_str(&format!(
            "pages: {}/{}\n",
            state.content.pages_written(),
            details.total_pages()
        ));
    }
    if state.phase.is_persisted() {
        out.push_str(&format!(
            "latest: {}\nviewing: {}\n",
            state.write_cursor,
            state.view()
        ));
    }
    if let Some(saved_at) = state.saved_at {
        out.push_str(&format!("saved: {}\n", saved_at.to_rfc3339()));
    }
    out
}
