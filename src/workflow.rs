use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::watch;

use crate::draft_store::{DRAFT_KEY, DraftStore, SharedDraft};
use crate::error::WorkflowError;
use crate::generator::{ContentGenerator, Manuscript, PageRequest};
use crate::model::{BookContent, BookDetails, BookMatter, BookOutline, Cursor, Phase, SavedState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

/// Shared flag marking an outstanding generator call.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicBool>);

impl InFlight {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Claims the flag, or returns `None` when a call is already running.
    pub fn try_acquire(&self) -> Option<InFlightGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(Arc::clone(&self.0)))
    }
}

/// Clears the in-flight flag on drop, including on error paths.
#[derive(Debug)]
pub struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Book-writing session: phase machine, cursors and draft persistence.
pub struct WorkflowSession {
    generator: Arc<dyn ContentGenerator>,
    draft: SharedDraft,
    state: SavedState,
    in_flight: InFlight,
    snapshots: watch::Sender<SavedState>,
}

impl WorkflowSession {
    pub fn new(generator: Arc<dyn ContentGenerator>, store: Arc<dyn DraftStore>) -> Self {
        let (snapshots, _) = watch::channel(SavedState::default());
        Self {
            generator,
            draft: SharedDraft::new(store),
            state: SavedState::default(),
            in_flight: InFlight::default(),
            snapshots,
        }
    }

    pub fn state(&self) -> &SavedState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn details(&self) -> Option<&BookDetails> {
        self.state.details.as_ref()
    }

    pub fn outline(&self) -> Option<&BookOutline> {
        self.state.outline.as_ref()
    }

    pub fn content(&self) -> &BookContent {
        &self.state.content
    }

    pub fn matter(&self) -> &BookMatter {
        &self.state.matter
    }

    pub fn write_cursor(&self) -> Cursor {
        self.state.write_cursor
    }

    pub fn view_cursor(&self) -> Cursor {
        self.state.view()
    }

    /// Uncommitted text of the latest generated page.
    pub fn current_page(&self) -> &str {
        &self.state.current_page
    }

    /// Text shown at the view cursor: the buffer at the latest page, the
    /// stored page otherwise.
    pub fn displayed_text(&self) -> &str {
        let view = self.view_cursor();
        if self.state.phase == Phase::Writing && view == self.state.write_cursor {
            return &self.state.current_page;
        }
        self.state.content.page(view).unwrap_or("")
    }

    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_set()
    }

    /// Most recent persistence failure since the last call, if any,
    /// including failed autosaves.
    pub fn take_persist_warning(&mut self) -> Option<String> {
        self.draft.take_warning()
    }

    /// Receives every state change; used by the autosave task.
    pub fn subscribe(&self) -> watch::Receiver<SavedState> {
        self.snapshots.subscribe()
    }

    pub fn store(&self) -> Arc<dyn DraftStore> {
        Arc::clone(self.draft.store())
    }

    /// Store handle for the autosave task, sharing this session's write lock.
    pub fn shared_draft(&self) -> SharedDraft {
        self.draft.clone()
    }

    pub async fn generate_outline(&mut self, details: BookDetails) -> Result<(), WorkflowError> {
        self.expect_phase(Phase::Setup)?;
        details.validate().map_err(WorkflowError::Validation)?;
        let _guard = self.acquire()?;

        tracing::info!(
            chapters = details.num_chapters,
            pages_per_chapter = details.num_pages_per_chapter,
            "generate outline"
        );
        let outline = self.generator.generate_outline(&details).await?;
        check_chapter_count(&details, &outline)?;

        self.state = SavedState {
            phase: Phase::Outline,
            details: Some(details),
            outline: Some(outline),
            ..SavedState::default()
        };
        self.publish();
        self.discard_draft().await;
        Ok(())
    }

    pub async fn revise_outline(&mut self, feedback: &str) -> Result<(), WorkflowError> {
        self.expect_phase(Phase::Outline)?;
        let feedback = non_blank_feedback(feedback)?;
        let _guard = self.acquire()?;
        let (details, outline) = self.book_plan()?;

        tracing::info!("revise outline");
        let revised = self
            .generator
            .revise_outline(details, outline, feedback)
            .await?;
        check_chapter_count(details, &revised)?;

        self.state.outline = Some(revised);
        self.publish();
        Ok(())
    }

    pub async fn approve_outline(&mut self) -> Result<(), WorkflowError> {
        self.expect_phase(Phase::Outline)?;
        let _guard = self.acquire()?;
        let (details, outline) = self.book_plan()?;

        tracing::info!("approve outline; writing first page");
        let first_page = self
            .generator
            .write_page(PageRequest {
                details,
                outline,
                chapter_index: 0,
                page_index: 0,
                previous_page: None,
            })
            .await?;
        let num_chapters = details.num_chapters;

        self.state.content = BookContent::with_chapters(num_chapters);
        self.state.write_cursor = Cursor::START;
        self.state.view_cursor = Some(Cursor::START);
        self.state.current_page = first_page;
        self.state.phase = Phase::Writing;
        self.persist().await;
        Ok(())
    }

    /// Commits the buffered page and writes the next one, or finishes the
    /// book with front and back matter after the last page.
    pub async fn approve_and_continue(&mut self) -> Result<(), WorkflowError> {
        self.expect_phase(Phase::Writing)?;
        let write = self.state.write_cursor;
        let view = self.view_cursor();
        if view != write {
            return Err(WorkflowError::NotAtLatestPage { view, write });
        }
        let _guard = self.acquire()?;
        let (details, outline) = self.book_plan()?;

        let mut content = self.state.content.clone();
        content
            .set_page(write, self.state.current_page.clone())
            .map_err(|err| WorkflowError::validation(err.to_string()))?;

        let Some(next) = write.next(details.num_chapters, details.num_pages_per_chapter) else {
            tracing::info!(pages = content.pages_written(), "last page approved; writing matter");
            let front = self
                .generator
                .generate_front_matter(details, outline)
                .await?;
            let back = self
                .generator
                .generate_back_matter(details, outline, &content)
                .await?;

            self.state.content = content;
            self.state.matter = BookMatter::from_halves(front, back);
            self.state.current_page.clear();
            self.state.view_cursor = Some(write);
            self.state.phase = Phase::Final;
            self.persist().await;
            return Ok(());
        };

        tracing::info!(chapter = next.chapter, page = next.page, "write page");
        let page = self
            .generator
            .write_page(PageRequest {
                details,
                outline,
                chapter_index: next.chapter,
                page_index: next.page,
                previous_page: Some(self.state.current_page.as_str()),
            })
            .await?;

        self.state.content = content;
        self.state.write_cursor = next;
        self.state.view_cursor = Some(next);
        self.state.current_page = page;
        self.persist().await;
        Ok(())
    }

    /// Rewrites the page at the view cursor using `feedback`.
    pub async fn revise_page(&mut self, feedback: &str) -> Result<(), WorkflowError> {
        self.expect_phase(Phase::Writing)?;
        let feedback = non_blank_feedback(feedback)?;
        let _guard = self.acquire()?;
        let details = self.book_plan()?.0;

        let view = self.view_cursor();
        let at_latest = view == self.state.write_cursor;
        let original = if at_latest {
            self.state.current_page.as_str()
        } else {
            self.state.content.page(view).unwrap_or("")
        };

        tracing::info!(chapter = view.chapter, page = view.page, "revise page");
        let revised = self
            .generator
            .revise_page(original, feedback, details)
            .await?;

        self.state
            .content
            .set_page(view, revised.clone())
            .map_err(|err| WorkflowError::validation(err.to_string()))?;
        if at_latest {
            self.state.current_page = revised;
        }
        self.persist().await;
        Ok(())
    }

    /// Moves the view cursor one page, clamped to `[start, write cursor]`.
    pub fn navigate(&mut self, direction: Direction) -> Cursor {
        let Some(details) = self.state.details.as_ref() else {
            return self.view_cursor();
        };
        if !self.state.phase.is_persisted() {
            return self.view_cursor();
        }

        let view = self.view_cursor();
        let moved = match direction {
            Direction::Prev => view.prev(details.num_pages_per_chapter),
            Direction::Next => view
                .next(details.num_chapters, details.num_pages_per_chapter)
                .filter(|next| *next <= self.state.write_cursor),
        };
        if let Some(moved) = moved {
            tracing::debug!(chapter = moved.chapter, page = moved.page, "navigate");
            self.state.view_cursor = Some(moved);
            self.publish();
        }
        self.view_cursor()
    }

    /// Writes the whole book in one run: front matter, every page in order,
    /// back matter. Nothing is kept if any call fails.
    pub async fn auto_write(&mut self) -> Result<(), WorkflowError> {
        self.expect_phase(Phase::Outline)?;
        let _guard = self.acquire()?;
        let (details, outline) = self.book_plan()?;
        let total = details.total_pages();

        tracing::info!(pages = total, "auto write: front matter");
        let front = self
            .generator
            .generate_front_matter(details, outline)
            .await?;

        let mut chapters = Vec::with_capacity(details.num_chapters);
        let mut previous: Option<String> = None;
        let mut done = 0usize;
        for chapter_index in 0..details.num_chapters {
            let mut pages = Vec::with_capacity(details.num_pages_per_chapter);
            for page_index in 0..details.num_pages_per_chapter {
                let page = self
                    .generator
                    .write_page(PageRequest {
                        details,
                        outline,
                        chapter_index,
                        page_index,
                        previous_page: previous.as_deref(),
                    })
                    .await?;
                done += 1;
                tracing::info!(
                    done,
                    total,
                    chapter = chapter_index,
                    page = page_index,
                    "auto write: progress"
                );
                previous = Some(page.clone());
                pages.push(page);
            }
            chapters.push(pages);
        }
        let content = BookContent::from_chapters(chapters);

        tracing::info!("auto write: back matter");
        let back = self
            .generator
            .generate_back_matter(details, outline, &content)
            .await?;

        let last = details.last_page();
        self.state.content = content;
        self.state.matter = BookMatter::from_halves(front, back);
        self.state.write_cursor = last;
        self.state.view_cursor = Some(last);
        self.state.current_page.clear();
        self.state.phase = Phase::Final;
        self.persist().await;
        Ok(())
    }

    /// Applies a feedback-driven revision patch to the finished book.
    pub async fn revise_full_book(&mut self, feedback: &str) -> Result<(), WorkflowError> {
        self.expect_phase(Phase::Final)?;
        let feedback = non_blank_feedback(feedback)?;
        let _guard = self.acquire()?;
        let (details, outline) = self.book_plan()?;

        tracing::info!("revise full book");
        let revision = self
            .generator
            .revise_full_book(
                Manuscript {
                    details,
                    outline,
                    matter: &self.state.matter,
                    content: &self.state.content,
                },
                feedback,
            )
            .await?;

        self.state.matter.apply_patch(revision.revised_matter);
        for edit in revision.revised_content {
            let at = Cursor::new(edit.chapter_index, edit.page_index);
            if self.state.content.replace_page(at, edit.new_text).is_none() {
                tracing::warn!(
                    chapter = at.chapter,
                    page = at.page,
                    "revision targets a page that does not exist; skipping"
                );
            }
        }
        self.persist().await;
        Ok(())
    }

    /// Drops the draft and every entity, returning to setup.
    pub async fn start_over(&mut self) -> Result<(), WorkflowError> {
        let _guard = self.acquire()?;
        tracing::info!(phase = %self.state.phase, "start over");
        self.state = SavedState::default();
        self.publish();
        self.discard_draft().await;
        Ok(())
    }

    /// Restores the saved draft. Returns `false` when none exists.
    pub async fn load_draft(&mut self) -> Result<bool, WorkflowError> {
        let _guard = self.acquire()?;
        let raw = self
            .draft
            .store()
            .get(DRAFT_KEY)
            .await
            .map_err(|err| WorkflowError::storage(&err))?;
        let Some(raw) = raw else {
            return Ok(false);
        };

        let mut state = match decode_snapshot(&raw) {
            Ok(state) => state,
            Err(reason) => {
                tracing::warn!(%reason, "discarding corrupted draft");
                self.state = SavedState::default();
                self.publish();
                self.discard_draft().await;
                return Err(WorkflowError::StorageCorrupt(reason));
            }
        };
        if state.view() > state.write_cursor {
            state.view_cursor = Some(state.write_cursor);
        }
        let view = state.view();
        state.view_cursor = Some(view);

        tracing::info!(
            phase = %state.phase,
            write = %state.write_cursor,
            view = %view,
            "draft restored"
        );
        self.state = state;
        self.publish();
        Ok(true)
    }

    fn acquire(&self) -> Result<InFlightGuard, WorkflowError> {
        self.in_flight.try_acquire().ok_or(WorkflowError::Busy)
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), WorkflowError> {
        if self.state.phase != expected {
            return Err(WorkflowError::InvalidPhase {
                expected,
                actual: self.state.phase,
            });
        }
        Ok(())
    }

    fn book_plan(&self) -> Result<(&BookDetails, &BookOutline), WorkflowError> {
        match (self.state.details.as_ref(), self.state.outline.as_ref()) {
            (Some(details), Some(outline)) => Ok((details, outline)),
            _ => Err(WorkflowError::validation("book details and outline are missing")),
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.state.clone());
    }

    /// Publishes, then saves under the draft lock. The autosave task reads
    /// the published snapshot only while holding that lock.
    async fn persist(&mut self) {
        if !self.state.phase.is_persisted() {
            self.publish();
            return;
        }
        self.state.saved_at = Some(Utc::now());
        self.publish();

        let _lock = self.draft.lock().await;
        if let Err(err) = save_snapshot(self.draft.store().as_ref(), &self.state).await {
            let message = format!("{err:#}");
            tracing::warn!(error = %message, "failed to persist draft; keeping in-memory state");
            self.draft.record_warning(message);
        }
    }

    /// Deletes the draft. Callers publish the new state first.
    async fn discard_draft(&self) {
        let _lock = self.draft.lock().await;
        if let Err(err) = self.draft.store().delete(DRAFT_KEY).await {
            let message = format!("{err:#}");
            tracing::warn!(error = %message, "failed to delete draft");
            self.draft.record_warning(message);
        }
    }
}

/// Serializes `state` and writes it under the draft key in one call.
pub async fn save_snapshot(store: &dyn DraftStore, state: &SavedState) -> anyhow::Result<()> {
    use anyhow::Context as _;

    let json = serde_json::to_string(state).context("serialize draft")?;
    store
        .set(DRAFT_KEY, &json)
        .await
        .context("write draft")?;
    tracing::debug!(key = DRAFT_KEY, bytes = json.len(), phase = %state.phase, "draft saved");
    Ok(())
}

pub fn decode_snapshot(raw: &str) -> Result<SavedState, String> {
    let state: SavedState = serde_json::from_str(raw).map_err(|err| err.to_string())?;
    if state.phase.is_persisted() && (state.details.is_none() || state.outline.is_none()) {
        return Err(format!("{} draft without details or outline", state.phase));
    }
    Ok(state)
}

fn non_blank_feedback(feedback: &str) -> Result<&str, WorkflowError> {
    let trimmed = feedback.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::validation("feedback must not be empty"));
    }
    Ok(trimmed)
}

fn check_chapter_count(details: &BookDetails, outline: &BookOutline) -> Result<(), WorkflowError> {
    if outline.chapters.len() != details.num_chapters {
        return Err(WorkflowError::GeneratorInvalidFormat(format!(
            "outline has {} chapters, expected {}",
            outline.chapters.len(),
            details.num_chapters
        )));
    }
    Ok(())
}
