use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;

use crate::cli::ExportFormat;
use crate::model::SavedState;

/// Compiles the book into Markdown. Missing pages and empty matter sections
/// are skipped, so in-progress drafts export too.
pub fn render_markdown(state: &SavedState) -> anyhow::Result<String> {
    let Some(outline) = state.outline.as_ref() else {
        anyhow::bail!("draft has no outline yet; nothing to export");
    };
    let title = outline.title().unwrap_or("Untitled");

    let mut md = format!("# {title}\n\n");
    if let Some(details) = state.details.as_ref() {
        md.push_str(&format!("*by {}*\n\n", details.pen_name.trim()));
    }

    for (heading, text) in state.matter.front_sections() {
        push_section(&mut md, heading, text);
    }

    for (idx, chapter) in outline.chapters.iter().enumerate() {
        md.push_str(&format!("## Chapter {}: {}\n\n", idx + 1, chapter.title.trim()));
        let pages = state
            .content
            .chapters()
            .get(idx)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for page in pages.iter().filter(|p| !p.trim().is_empty()) {
            md.push_str(page.trim());
            md.push_str("\n\n");
        }
    }

    for (heading, text) in state.matter.back_sections() {
        push_section(&mut md, heading, text);
    }

    Ok(format!("{}\n", md.trim_end()))
}

pub fn render_html(state: &SavedState) -> anyhow::Result<String> {
    let markdown = render_markdown(state)?;
    let title = state
        .outline
        .as_ref()
        .and_then(|o| o.title())
        .unwrap_or("Untitled");

    let parser = pulldown_cmark::Parser::new_ext(&markdown, pulldown_cmark::Options::empty());
    let mut body = String::new();
    pulldown_cmark::html::push_html(&mut body, parser);

    Ok(format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{body}</body>\n</html>\n",
        escape_html(title)
    ))
}

pub fn write(
    state: &SavedState,
    out: &Path,
    format: ExportFormat,
    force: bool,
) -> anyhow::Result<()> {
    let contents = match format {
        ExportFormat::Md => render_markdown(state)?,
        ExportFormat::Html => render_html(state)?,
    };

    if let Some(parent) = out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export output dir: {}", parent.display()))?;
    }

    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut file = options
        .open(out)
        .with_context(|| format!("open output: {}", out.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("write output: {}", out.display()))?;
    file.flush()
        .with_context(|| format!("flush output: {}", out.display()))?;

    tracing::info!(out = %out.display(), ?format, bytes = contents.len(), "export");
    Ok(())
}

fn push_section(md: &mut String, heading: &str, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    md.push_str(&format!("## {heading}\n\n{text}\n\n"));
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
