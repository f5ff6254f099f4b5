use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::cli::LlmEngine;
use crate::config::OpenAiConfig;
use crate::error::GeneratorError;
use crate::model::{
    BackMatter, BookContent, BookDetails, BookMatter, BookOutline, BookRevision, ChapterOutline,
    FrontMatter,
};
use crate::openai::OpenAiGenerator;

#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub details: &'a BookDetails,
    pub outline: &'a BookOutline,
    pub chapter_index: usize,
    pub page_index: usize,
    /// Text of the page right before this one; `None` for the first page.
    pub previous_page: Option<&'a str>,
}

impl PageRequest<'_> {
    pub fn pages_per_chapter(&self) -> usize {
        self.details.num_pages_per_chapter
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Manuscript<'a> {
    pub details: &'a BookDetails,
    pub outline: &'a BookOutline,
    pub matter: &'a BookMatter,
    pub content: &'a BookContent,
}

/// Text-generation backend driven by the workflow.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_outline(&self, details: &BookDetails) -> Result<BookOutline, GeneratorError>;

    async fn revise_outline(
        &self,
        details: &BookDetails,
        outline: &BookOutline,
        feedback: &str,
    ) -> Result<BookOutline, GeneratorError>;

    async fn write_page(&self, request: PageRequest<'_>) -> Result<String, GeneratorError>;

    async fn revise_page(
        &self,
        original: &str,
        feedback: &str,
        details: &BookDetails,
    ) -> Result<String, GeneratorError>;

    async fn generate_front_matter(
        &self,
        details: &BookDetails,
        outline: &BookOutline,
    ) -> Result<FrontMatter, GeneratorError>;

    async fn generate_back_matter(
        &self,
        details: &BookDetails,
        outline: &BookOutline,
        content: &BookContent,
    ) -> Result<BackMatter, GeneratorError>;

    async fn revise_full_book(
        &self,
        manuscript: Manuscript<'_>,
        feedback: &str,
    ) -> Result<BookRevision, GeneratorError>;
}

pub fn from_engine(engine: LlmEngine) -> anyhow::Result<Arc<dyn ContentGenerator>> {
    match engine {
        LlmEngine::Noop => Ok(Arc::new(NoopGenerator)),
        LlmEngine::Openai => {
            let config = OpenAiConfig::from_env().context("load openai config")?;
            tracing::info!(engine = "openai", model = %config.model, "content generator");
            let generator = OpenAiGenerator::new(config).context("build openai generator")?;
            Ok(Arc::new(generator))
        }
    }
}

/// Offline generator producing placeholder text. Useful for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGenerator;

#[async_trait]
impl ContentGenerator for NoopGenerator {
    async fn generate_outline(&self, details: &BookDetails) -> Result<BookOutline, GeneratorError> {
        let chapters = (1..=details.num_chapters)
            .map(|n| ChapterOutline {
                title: format!("Chapter {n}"),
                description: format!("Part {n} of a book about {}.", details.theme.trim()),
            })
            .collect();
        Ok(BookOutline {
            titles: vec![format!("A Book About {}", details.theme.trim())],
            summary: format!(
                "A book about {} for {}.",
                details.theme.trim(),
                details.audience.trim()
            ),
            chapters,
        })
    }

    async fn revise_outline(
        &self,
        _details: &BookDetails,
        outline: &BookOutline,
        _feedback: &str,
    ) -> Result<BookOutline, GeneratorError> {
        Ok(outline.clone())
    }

    async fn write_page(&self, request: PageRequest<'_>) -> Result<String, GeneratorError> {
        let chapter_title = request
            .outline
            .chapters
            .get(request.chapter_index)
            .map(|c| c.title.as_str())
            .unwrap_or("Untitled chapter");
        Ok(format!(
            "{chapter_title}, page {} of {}.",
            request.page_index + 1,
            request.pages_per_chapter()
        ))
    }

    async fn revise_page(
        &self,
        original: &str,
        _feedback: &str,
        _details: &BookDetails,
    ) -> Result<String, GeneratorError> {
        Ok(original.to_owned())
    }

    async fn generate_front_matter(
        &self,
        details: &BookDetails,
        outline: &BookOutline,
    ) -> Result<FrontMatter, GeneratorError> {
        let title = outline.title().unwrap_or("this book");
        Ok(FrontMatter {
            copyright: format!("Copyright (c) {}. All rights reserved.", details.pen_name),
            dedication: "For every reader.".to_owned(),
            acknowledgments: "Thanks to everyone who helped.".to_owned(),
            introduction: format!("Welcome to {title}. {}", outline.summary),
        })
    }

    async fn generate_back_matter(
        &self,
        details: &BookDetails,
        _outline: &BookOutline,
        content: &BookContent,
    ) -> Result<BackMatter, GeneratorError> {
        Ok(BackMatter {
            conclusion: format!("That concludes {} pages.", content.pages_written()),
            appendix: "No appendix material.".to_owned(),
            glossary: format!("{}: the subject of this book.", details.theme.trim()),
            author_bio: format!("{} writes books.", details.pen_name),
        })
    }

    async fn revise_full_book(
        &self,
        _manuscript: Manuscript<'_>,
        _feedback: &str,
    ) -> Result<BookRevision, GeneratorError> {
        Ok(BookRevision::default())
    }
}
