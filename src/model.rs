use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_CHAPTERS: usize = 20;
pub const MAX_PAGES_PER_CHAPTER: usize = 15;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Genre {
    Fiction,
    NonFiction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WritingStyle {
    Descriptive,
    Narrative,
    Expository,
    Persuasive,
    Conversational,
    Academic,
    Poetic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphLength {
    Short,
    Medium,
    Long,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    English,
    Polish,
}

impl Language {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Polish => "Polish",
        }
    }
}

/// Book configuration submitted at setup. Never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookDetails {
    pub theme: String,
    pub genre: Genre,
    pub audience: String,
    pub writing_style: WritingStyle,
    pub paragraph_length: ParagraphLength,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_hints: Option<String>,
    pub pen_name: String,
    pub num_chapters: usize,
    pub num_pages_per_chapter: usize,
    pub language: Language,
}

impl BookDetails {
    /// Checks required text fields and numeric bounds. Returns a message for
    /// the first violation.
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("theme", &self.theme),
            ("audience", &self.audience),
            ("penName", &self.pen_name),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} must not be empty"));
            }
        }
        if !(1..=MAX_CHAPTERS).contains(&self.num_chapters) {
            return Err(format!(
                "numChapters must be between 1 and {MAX_CHAPTERS} (got {})",
                self.num_chapters
            ));
        }
        if !(1..=MAX_PAGES_PER_CHAPTER).contains(&self.num_pages_per_chapter) {
            return Err(format!(
                "numPagesPerChapter must be between 1 and {MAX_PAGES_PER_CHAPTER} (got {})",
                self.num_pages_per_chapter
            ));
        }
        Ok(())
    }

    pub fn total_pages(&self) -> usize {
        self.num_chapters * self.num_pages_per_chapter
    }

    pub fn last_page(&self) -> Cursor {
        Cursor::new(
            self.num_chapters.saturating_sub(1),
            self.num_pages_per_chapter.saturating_sub(1),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterOutline {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookOutline {
    pub titles: Vec<String>,
    pub summary: String,
    pub chapters: Vec<ChapterOutline>,
}

impl BookOutline {
    pub fn title(&self) -> Option<&str> {
        self.titles
            .iter()
            .map(|t| t.trim())
            .find(|t| !t.is_empty())
    }
}

/// Position of a page. Ordering is chapter-major, then page-minor.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub chapter: usize,
    pub page: usize,
}

impl Cursor {
    pub const START: Self = Self {
        chapter: 0,
        page: 0,
    };

    pub fn new(chapter: usize, page: usize) -> Self {
        Self { chapter, page }
    }

    /// Next position, or `None` when this is the last page of the book.
    pub fn next(self, num_chapters: usize, pages_per_chapter: usize) -> Option<Self> {
        if self.page + 1 < pages_per_chapter {
            return Some(Self::new(self.chapter, self.page + 1));
        }
        if self.chapter + 1 < num_chapters {
            return Some(Self::new(self.chapter + 1, 0));
        }
        None
    }

    /// Previous position, or `None` at the first page.
    pub fn prev(self, pages_per_chapter: usize) -> Option<Self> {
        if self.page > 0 {
            return Some(Self::new(self.chapter, self.page - 1));
        }
        if self.chapter > 0 {
            return Some(Self::new(
                self.chapter - 1,
                pages_per_chapter.saturating_sub(1),
            ));
        }
        None
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chapter {} page {}", self.chapter + 1, self.page + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("chapter index {0} is out of range")]
    ChapterOutOfRange(usize),
    #[error("page index {page} in chapter {chapter} would leave a gap")]
    PageGap { chapter: usize, page: usize },
}

/// Chapters of page texts, `[chapter][page]`.
///
/// The outer sequence is fixed once writing starts. Each chapter grows one
/// page at a time, so a page exists iff its index is below the chapter length.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct BookContent {
    chapters: Vec<Vec<String>>,
}

impl BookContent {
    pub fn with_chapters(num_chapters: usize) -> Self {
        Self {
            chapters: vec![Vec::new(); num_chapters],
        }
    }

    pub fn from_chapters(chapters: Vec<Vec<String>>) -> Self {
        Self { chapters }
    }

    pub fn chapters(&self) -> &[Vec<String>] {
        &self.chapters
    }

    pub fn num_chapters(&self) -> usize {
        self.chapters.len()
    }

    pub fn has_page(&self, at: Cursor) -> bool {
        self.page(at).is_some()
    }

    pub fn page(&self, at: Cursor) -> Option<&str> {
        self.chapters
            .get(at.chapter)
            .and_then(|pages| pages.get(at.page))
            .map(String::as_str)
    }

    /// Overwrites an existing page or appends the next one in its chapter.
    pub fn set_page(&mut self, at: Cursor, text: String) -> Result<(), ContentError> {
        let pages = self
            .chapters
            .get_mut(at.chapter)
            .ok_or(ContentError::ChapterOutOfRange(at.chapter))?;
        match at.page.cmp(&pages.len()) {
            std::cmp::Ordering::Less => pages[at.page] = text,
            std::cmp::Ordering::Equal => pages.push(text),
            std::cmp::Ordering::Greater => {
                return Err(ContentError::PageGap {
                    chapter: at.chapter,
                    page: at.page,
                });
            }
        }
        Ok(())
    }

    /// Replaces an existing page, returning the old text. Never appends.
    pub fn replace_page(&mut self, at: Cursor, text: String) -> Option<String> {
        let slot = self.chapters.get_mut(at.chapter)?.get_mut(at.page)?;
        Some(std::mem::replace(slot, text))
    }

    pub fn pages_written(&self) -> usize {
        self.chapters.iter().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FrontMatter {
    pub copyright: String,
    pub dedication: String,
    pub acknowledgments: String,
    pub introduction: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackMatter {
    pub conclusion: String,
    pub appendix: String,
    pub glossary: String,
    pub author_bio: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookMatter {
    #[serde(default)]
    pub copyright: String,
    #[serde(default)]
    pub dedication: String,
    #[serde(default)]
    pub acknowledgments: String,
    #[serde(default)]
    pub introduction: String,
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub appendix: String,
    #[serde(default)]
    pub glossary: String,
    #[serde(default)]
    pub author_bio: String,
}

impl BookMatter {
    pub fn from_halves(front: FrontMatter, back: BackMatter) -> Self {
        Self {
            copyright: front.copyright,
            dedication: front.dedication,
            acknowledgments: front.acknowledgments,
            introduction: front.introduction,
            conclusion: back.conclusion,
            appendix: back.appendix,
            glossary: back.glossary,
            author_bio: back.author_bio,
        }
    }

    /// Sections in reading order, paired with their display headings.
    pub fn front_sections(&self) -> [(&'static str, &str); 4] {
        [
            ("Copyright", self.copyright.as_str()),
            ("Dedication", self.dedication.as_str()),
            ("Acknowledgments", self.acknowledgments.as_str()),
            ("Introduction", self.introduction.as_str()),
        ]
    }

    pub fn back_sections(&self) -> [(&'static str, &str); 4] {
        [
            ("Conclusion", self.conclusion.as_str()),
            ("Appendix", self.appendix.as_str()),
            ("Glossary", self.glossary.as_str()),
            ("About the Author", self.author_bio.as_str()),
        ]
    }

    pub fn is_complete(&self) -> bool {
        self.front_sections()
            .iter()
            .chain(self.back_sections().iter())
            .all(|(_, text)| !text.trim().is_empty())
    }

    /// Field-wise overwrite; fields absent from the patch keep their value.
    pub fn apply_patch(&mut self, patch: MatterPatch) {
        let MatterPatch {
            copyright,
            dedication,
            acknowledgments,
            introduction,
            conclusion,
            appendix,
            glossary,
            author_bio,
        } = patch;
        for (slot, value) in [
            (&mut self.copyright, copyright),
            (&mut self.dedication, dedication),
            (&mut self.acknowledgments, acknowledgments),
            (&mut self.introduction, introduction),
            (&mut self.conclusion, conclusion),
            (&mut self.appendix, appendix),
            (&mut self.glossary, glossary),
            (&mut self.author_bio, author_bio),
        ] {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatterPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedication: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledgments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introduction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appendix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glossary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_bio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageRevision {
    pub chapter_index: usize,
    pub page_index: usize,
    pub new_text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookRevision {
    #[serde(default)]
    pub revised_matter: MatterPatch,
    #[serde(default)]
    pub revised_content: Vec<PageRevision>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Setup,
    Outline,
    Writing,
    Final,
}

impl Phase {
    pub fn is_persisted(self) -> bool {
        matches!(self, Self::Writing | Self::Final)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Setup => "setup",
            Self::Outline => "outline",
            Self::Writing => "writing",
            Self::Final => "final",
        };
        f.write_str(name)
    }
}

/// Complete session snapshot, as written to the draft store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SavedState {
    pub phase: Phase,
    #[serde(default)]
    pub details: Option<BookDetails>,
    #[serde(default)]
    pub outline: Option<BookOutline>,
    #[serde(default)]
    pub content: BookContent,
    #[serde(default)]
    pub matter: BookMatter,
    #[serde(default)]
    pub current_page: String,
    #[serde(default)]
    pub write_cursor: Cursor,
    /// Absent in older snapshots; readers fall back to `write_cursor`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_cursor: Option<Cursor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl SavedState {
    pub fn view(&self) -> Cursor {
        self.view_cursor.unwrap_or(self.write_cursor)
    }
}
