use anyhow::Context as _;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::OpenAiConfig;
use crate::error::GeneratorError;
use crate::generator::{ContentGenerator, Manuscript, PageRequest};
use crate::model::{
    BackMatter, BookContent, BookDetails, BookOutline, BookRevision, FrontMatter, Language,
};

pub fn responses_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/responses")
}

pub async fn responses_text(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    model: &str,
    instructions: &str,
    input: &str,
    temperature: f32,
) -> anyhow::Result<String> {
    let mut body = serde_json::json!({
        "model": model,
        "instructions": instructions,
        "input": input,
        "text": { "format": { "type": "text" } },
        "store": false,
    });

    // NOTE: Some GPT-5 models reject sampling params like `temperature`.
    if !model.starts_with("gpt-5")
        && let Some(obj) = body.as_object_mut()
    {
        obj.insert("temperature".to_owned(), serde_json::json!(temperature));
    }

    let response = client
        .post(endpoint)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("POST {endpoint}"))?;

    let status = response.status();
    let raw = response.text().await.context("read OpenAI response body")?;
    if !status.is_success() {
        let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
        anyhow::bail!("OpenAI API error ({status}): {message}");
    }

    let value: serde_json::Value = serde_json::from_str(&raw).context("parse OpenAI response")?;
    extract_output_text(&value).context("extract output text")
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn extract_output_text(value: &serde_json::Value) -> anyhow::Result<String> {
    let output = value
        .get("output")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("missing `output` array in response"))?;

    let mut text = String::new();
    for item in output {
        if item.get("type").and_then(|v| v.as_str()) != Some("message") {
            continue;
        }
        let Some(content) = item.get("content").and_then(|v| v.as_array()) else {
            continue;
        };
        for part in content {
            if part.get("type").and_then(|v| v.as_str()) != Some("output_text") {
                continue;
            }
            if let Some(part_text) = part.get("text").and_then(|v| v.as_str()) {
                text.push_str(part_text);
            }
        }
    }

    if text.trim().is_empty() {
        anyhow::bail!("OpenAI output text is empty");
    }
    Ok(text)
}

/// Returns the outermost `{...}` span of a model reply.
pub fn extract_json_object(text: &str) -> anyhow::Result<&str> {
    let start = text
        .find('{')
        .ok_or_else(|| anyhow::anyhow!("missing `{{`"))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| anyhow::anyhow!("missing `}}`"))?;
    if end <= start {
        anyhow::bail!("invalid json object span");
    }
    Ok(&text[start..=end])
}

#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiGenerator {
    pub fn new(config: OpenAiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: responses_endpoint(&config.base_url),
            api_key: config.api_key,
            model: config.model,
            temperature: config.temperature,
        })
    }

    async fn text_call<I: Serialize + Sync>(
        &self,
        task: &str,
        instructions: &str,
        input: &I,
    ) -> Result<String, GeneratorError> {
        let input_json = serde_json::to_string_pretty(input)
            .map_err(|err| GeneratorError::Failure(format!("serialize {task} input: {err}")))?;
        let input = format!("BEGIN_REQUEST_JSON\n{input_json}\nEND_REQUEST_JSON\n");
        let instructions = format!("Task: {task}\n\n{instructions}");

        tracing::debug!(engine = "openai", task, model = %self.model, "openai request");
        let text = responses_text(
            &self.client,
            &self.endpoint,
            &self.api_key,
            &self.model,
            &instructions,
            &input,
            self.temperature,
        )
        .await
        .with_context(|| format!("openai {task}"))
        .map_err(|err| GeneratorError::failure(&err))?;
        Ok(text.trim().to_owned())
    }

    async fn json_call<I: Serialize + Sync, T: DeserializeOwned>(
        &self,
        task: &str,
        instructions: &str,
        input: &I,
    ) -> Result<T, GeneratorError> {
        let raw = self.text_call(task, instructions, input).await?;
        let json = extract_json_object(&raw)
            .map_err(|err| GeneratorError::invalid_format(format!("{task}: {err}")))?;
        serde_json::from_str(json)
            .map_err(|err| GeneratorError::invalid_format(format!("{task}: {err}")))
    }
}

fn language_rule(details: &BookDetails) -> String {
    let language = details.language.display_name();
    match details.language {
        Language::English => format!("Write in {language}."),
        Language::Polish => {
            format!("Write in {language}. All titles and prose must be in {language}.")
        }
    }
}

const OUTLINE_SCHEMA: &str = "{\"titles\":[\"...\"],\"summary\":\"...\",\"chapters\":[{\"title\":\"...\",\"description\":\"...\"}]}";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutlineRevisionInput<'a> {
    details: &'a BookDetails,
    outline: &'a BookOutline,
    feedback: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageInput<'a> {
    details: &'a BookDetails,
    outline: &'a BookOutline,
    chapter_index: usize,
    page_index: usize,
    pages_per_chapter: usize,
    previous_page: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageRevisionInput<'a> {
    details: &'a BookDetails,
    original_text: &'a str,
    feedback: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MatterInput<'a> {
    details: &'a BookDetails,
    outline: &'a BookOutline,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a BookContent>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BookRevisionInput<'a> {
    details: &'a BookDetails,
    outline: &'a BookOutline,
    matter: &'a crate::model::BookMatter,
    content: &'a BookContent,
    feedback: &'a str,
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate_outline(&self, details: &BookDetails) -> Result<BookOutline, GeneratorError> {
        let instructions = format!(
            "You are a book author planning a new book.\n\
Create an outline from the book details in the request JSON.\n\
- Propose several title candidates.\n\
- The outline MUST contain exactly {n} chapters.\n\
- {language}\n\
Output ONLY a single JSON object (no markdown fences, no commentary) with schema:\n{OUTLINE_SCHEMA}\n",
            n = details.num_chapters,
            language = language_rule(details),
        );
        self.json_call("outline", &instructions, &details).await
    }

    async fn revise_outline(
        &self,
        details: &BookDetails,
        outline: &BookOutline,
        feedback: &str,
    ) -> Result<BookOutline, GeneratorError> {
        let instructions = format!(
            "You are a book author revising an outline.\n\
Apply the feedback in the request JSON to the outline.\n\
- Keep exactly {n} chapters.\n\
- {language}\n\
Output ONLY a single JSON object with schema:\n{OUTLINE_SCHEMA}\n",
            n = details.num_chapters,
            language = language_rule(details),
        );
        let input = OutlineRevisionInput {
            details,
            outline,
            feedback,
        };
        self.json_call("revise_outline", &instructions, &input).await
    }

    async fn write_page(&self, request: PageRequest<'_>) -> Result<String, GeneratorError> {
        let instructions = format!(
            "You are a book author writing one page at a time.\n\
Write page {page} of {pages} of chapter {chapter} following the outline.\n\
- Continue naturally from `previousPage` when present.\n\
- Match the writing style and paragraph length from the details.\n\
- {language}\n\
Output ONLY the page text.\n",
            page = request.page_index + 1,
            pages = request.pages_per_chapter(),
            chapter = request.chapter_index + 1,
            language = language_rule(request.details),
        );
        let input = PageInput {
            details: request.details,
            outline: request.outline,
            chapter_index: request.chapter_index,
            page_index: request.page_index,
            pages_per_chapter: request.pages_per_chapter(),
            previous_page: request.previous_page,
        };
        self.text_call("write_page", &instructions, &input).await
    }

    async fn revise_page(
        &self,
        original: &str,
        feedback: &str,
        details: &BookDetails,
    ) -> Result<String, GeneratorError> {
        let instructions = format!(
            "You are a book editor.\n\
Rewrite `originalText` applying `feedback`.\n\
- {language}\n\
Output ONLY the revised page text.\n",
            language = language_rule(details),
        );
        let input = PageRevisionInput {
            details,
            original_text: original,
            feedback,
        };
        self.text_call("revise_page", &instructions, &input).await
    }

    async fn generate_front_matter(
        &self,
        details: &BookDetails,
        outline: &BookOutline,
    ) -> Result<FrontMatter, GeneratorError> {
        let instructions = format!(
            "You are a book author writing front matter.\n\
- {language}\n\
Output ONLY a single JSON object with schema:\n\
{{\"copyright\":\"...\",\"dedication\":\"...\",\"acknowledgments\":\"...\",\"introduction\":\"...\"}}\n",
            language = language_rule(details),
        );
        let input = MatterInput {
            details,
            outline,
            content: None,
        };
        self.json_call("front_matter", &instructions, &input).await
    }

    async fn generate_back_matter(
        &self,
        details: &BookDetails,
        outline: &BookOutline,
        content: &BookContent,
    ) -> Result<BackMatter, GeneratorError> {
        let instructions = format!(
            "You are a book author writing back matter for the finished manuscript.\n\
- {language}\n\
Output ONLY a single JSON object with schema:\n\
{{\"conclusion\":\"...\",\"appendix\":\"...\",\"glossary\":\"...\",\"authorBio\":\"...\"}}\n",
            language = language_rule(details),
        );
        let input = MatterInput {
            details,
            outline,
            content: Some(content),
        };
        self.json_call("back_matter", &instructions, &input).await
    }

    async fn revise_full_book(
        &self,
        manuscript: Manuscript<'_>,
        feedback: &str,
    ) -> Result<BookRevision, GeneratorError> {
        let instructions = format!(
            "You are a book editor revising a complete manuscript.\n\
Apply `feedback`. Return only what changes.\n\
- `revisedMatter` holds only the changed matter fields.\n\
- `revisedContent` lists changed pages by zero-based chapterIndex and pageIndex.\n\
- {language}\n\
Output ONLY a single JSON object with schema:\n\
{{\"revisedMatter\":{{\"conclusion\":\"...\"}},\"revisedContent\":[{{\"chapterIndex\":0,\"pageIndex\":0,\"newText\":\"...\"}}]}}\n",
            language = language_rule(manuscript.details),
        );
        let input = BookRevisionInput {
            details: manuscript.details,
            outline: manuscript.outline,
            matter: manuscript.matter,
            content: manuscript.content,
            feedback,
        };
        self.json_call("revise_book", &instructions, &input).await
    }
}
