use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bookforge::draft_store::DraftStore;
use bookforge::error::GeneratorError;
use bookforge::generator::{ContentGenerator, Manuscript, PageRequest};
use bookforge::model::{
    BackMatter, BookContent, BookDetails, BookOutline, BookRevision, ChapterOutline, FrontMatter,
    Genre, Language, ParagraphLength, WritingStyle,
};
use bookforge::workflow::{InFlight, WorkflowSession};

pub fn details(num_chapters: usize, pages: usize) -> BookDetails {
    BookDetails {
        theme: "Lighthouse keepers".to_owned(),
        genre: Genre::Fiction,
        audience: "Young adults".to_owned(),
        writing_style: WritingStyle::Descriptive,
        paragraph_length: ParagraphLength::Short,
        chapter_hints: Some("Start with a storm".to_owned()),
        pen_name: "R. Beacon".to_owned(),
        num_chapters,
        num_pages_per_chapter: pages,
        language: Language::English,
    }
}

pub fn page_text(chapter: usize, page: usize) -> String {
    format!("c{chapter}p{page}")
}

/// Deterministic generator with switchable failures and a call log.
#[derive(Default)]
pub struct ScriptedGenerator {
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
    fail_write_page_on_call: Mutex<Option<usize>>,
    outline_chapters: Mutex<Option<usize>>,
    revision: Mutex<BookRevision>,
    previous_pages: Mutex<Vec<Option<String>>>,
    in_flight: Mutex<Option<InFlight>>,
    busy_during_calls: Mutex<Vec<bool>>,
}

#[allow(dead_code)]
impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every call to `op` fail until cleared.
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.failing.lock().unwrap().remove(op);
    }

    /// Fails only the n-th (1-based) `write_page` call.
    pub fn fail_write_page_on_call(&self, n: usize) {
        *self.fail_write_page_on_call.lock().unwrap() = Some(n);
    }

    /// Forces outlines to carry this many chapters.
    pub fn outline_chapters(&self, n: usize) {
        *self.outline_chapters.lock().unwrap() = Some(n);
    }

    pub fn set_revision(&self, revision: BookRevision) {
        *self.revision.lock().unwrap() = revision;
    }

    pub fn watch_in_flight(&self, flag: InFlight) {
        *self.in_flight.lock().unwrap() = Some(flag);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    pub fn previous_pages(&self) -> Vec<Option<String>> {
        self.previous_pages.lock().unwrap().clone()
    }

    pub fn busy_during_calls(&self) -> Vec<bool> {
        self.busy_during_calls.lock().unwrap().clone()
    }

    fn enter(&self, op: &'static str) -> Result<(), GeneratorError> {
        self.calls.lock().unwrap().push(op);
        if let Some(flag) = self.in_flight.lock().unwrap().as_ref() {
            self.busy_during_calls.lock().unwrap().push(flag.is_set());
        }
        if self.failing.lock().unwrap().contains(op) {
            return Err(GeneratorError::Failure(format!("{op} unavailable")));
        }
        Ok(())
    }

    fn outline(&self, details: &BookDetails, summary: &str) -> BookOutline {
        let n = self
            .outline_chapters
            .lock()
            .unwrap()
            .unwrap_or(details.num_chapters);
        BookOutline {
            titles: vec!["The Last Light".to_owned(), "Keeper".to_owned()],
            summary: summary.to_owned(),
            chapters: (0..n)
                .map(|i| ChapterOutline {
                    title: format!("Chapter {}", i + 1),
                    description: format!("Events of chapter {}", i + 1),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate_outline(&self, details: &BookDetails) -> Result<BookOutline, GeneratorError> {
        self.enter("generate_outline")?;
        Ok(self.outline(details, "first draft"))
    }

    async fn revise_outline(
        &self,
        details: &BookDetails,
        _outline: &BookOutline,
        feedback: &str,
    ) -> Result<BookOutline, GeneratorError> {
        self.enter("revise_outline")?;
        Ok(self.outline(details, feedback))
    }

    async fn write_page(&self, request: PageRequest<'_>) -> Result<String, GeneratorError> {
        self.enter("write_page")?;
        let call = self.count("write_page");
        if *self.fail_write_page_on_call.lock().unwrap() == Some(call) {
            return Err(GeneratorError::Failure("write_page timed out".to_owned()));
        }
        self.previous_pages
            .lock()
            .unwrap()
            .push(request.previous_page.map(str::to_owned));
        Ok(page_text(request.chapter_index, request.page_index))
    }

    async fn revise_page(
        &self,
        original: &str,
        feedback: &str,
        _details: &BookDetails,
    ) -> Result<String, GeneratorError> {
        self.enter("revise_page")?;
        Ok(format!("{original} [{feedback}]"))
    }

    async fn generate_front_matter(
        &self,
        _details: &BookDetails,
        _outline: &BookOutline,
    ) -> Result<FrontMatter, GeneratorError> {
        self.enter("front_matter")?;
        Ok(FrontMatter {
            copyright: "copyright".to_owned(),
            dedication: "dedication".to_owned(),
            acknowledgments: "acknowledgments".to_owned(),
            introduction: "introduction".to_owned(),
        })
    }

    async fn generate_back_matter(
        &self,
        _details: &BookDetails,
        _outline: &BookOutline,
        content: &BookContent,
    ) -> Result<BackMatter, GeneratorError> {
        self.enter("back_matter")?;
        Ok(BackMatter {
            conclusion: format!("conclusion after {} pages", content.pages_written()),
            appendix: "appendix".to_owned(),
            glossary: "glossary".to_owned(),
            author_bio: "author bio".to_owned(),
        })
    }

    async fn revise_full_book(
        &self,
        _manuscript: Manuscript<'_>,
        _feedback: &str,
    ) -> Result<BookRevision, GeneratorError> {
        self.enter("revise_book")?;
        Ok(self.revision.lock().unwrap().clone())
    }
}

/// Draft store whose writes always fail, like a full quota.
#[derive(Default)]
pub struct FullStore;

#[async_trait]
impl DraftStore for FullStore {
    async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
        anyhow::bail!("quota exceeded")
    }

    async fn delete(&self, _key: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Wraps a store so every `set` takes `delay` before landing.
pub struct SlowStore {
    inner: Arc<dyn DraftStore>,
    delay: std::time::Duration,
}

#[allow(dead_code)]
impl SlowStore {
    pub fn new(inner: Arc<dyn DraftStore>, delay: std::time::Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl DraftStore for SlowStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.inner.delete(key).await
    }
}

pub fn session(
    generator: &Arc<ScriptedGenerator>,
    store: Arc<dyn DraftStore>,
) -> WorkflowSession {
    let generator: Arc<dyn ContentGenerator> = Arc::clone(generator) as Arc<dyn ContentGenerator>;
    WorkflowSession::new(generator, store)
}
