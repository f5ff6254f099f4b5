use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use serde_json::Value;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubBehavior {
    Normal,
    /// Outline replies are prose instead of JSON.
    GarbledOutline,
    /// Every request gets an OpenAI-style 429 error body.
    RateLimited,
}

pub struct OpenAiStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Value>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl OpenAiStub {
    pub fn spawn(behavior: StubBehavior) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start openai stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                if request.method() != &tiny_http::Method::Post || request.url() != "/v1/responses"
                {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }
                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };
                seen.lock().unwrap().push(parsed.clone());

                if behavior == StubBehavior::RateLimited {
                    let body = serde_json::json!({
                        "error": { "message": "Rate limit reached", "type": "rate_limit" }
                    });
                    let _ = request.respond(
                        tiny_http::Response::from_string(body.to_string()).with_status_code(429),
                    );
                    continue;
                }

                let output_text = match reply(&parsed, behavior) {
                    Ok(text) => text,
                    Err(err) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string(format!("{err:#}"))
                                .with_status_code(400),
                        );
                        continue;
                    }
                };

                let response_body = serde_json::json!({
                    "id": "resp_stub",
                    "object": "response",
                    "output": [
                        {
                            "type": "message",
                            "role": "assistant",
                            "content": [
                                { "type": "output_text", "text": output_text }
                            ]
                        }
                    ]
                });
                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(response_body.to_string())
                    .with_status_code(200)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Request bodies received so far, in order.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    /// Parsed request payloads for one task.
    pub fn payloads(&self, task: &str) -> Vec<Value> {
        self.requests()
            .iter()
            .filter(|body| task_of(body) == Some(task))
            .filter_map(|body| request_json(body).ok())
            .collect()
    }
}

impl Drop for OpenAiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn task_of(body: &Value) -> Option<&str> {
    let instructions = body.get("instructions")?.as_str()?;
    let first = instructions.lines().next()?;
    first.strip_prefix("Task: ")
}

fn request_json(body: &Value) -> anyhow::Result<Value> {
    let input = body
        .get("input")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing input"))?;
    let begin = "BEGIN_REQUEST_JSON\n";
    let end = "\nEND_REQUEST_JSON";
    let start = input
        .find(begin)
        .ok_or_else(|| anyhow::anyhow!("missing request markers"))?
        + begin.len();
    let rest = &input[start..];
    let stop = rest
        .find(end)
        .ok_or_else(|| anyhow::anyhow!("missing request end marker"))?;
    serde_json::from_str(&rest[..stop]).context("parse request json")
}

fn outline_json(num_chapters: u64, summary: &str) -> String {
    let chapters = (1..=num_chapters)
        .map(|n| {
            serde_json::json!({
                "title": format!("Chapter {n}"),
                "description": format!("What happens in chapter {n}."),
            })
        })
        .collect::<Vec<_>>();
    serde_json::json!({
        "titles": ["Stub Book", "Another Title"],
        "summary": summary,
        "chapters": chapters,
    })
    .to_string()
}

fn reply(body: &Value, behavior: StubBehavior) -> anyhow::Result<String> {
    let task = task_of(body).ok_or_else(|| anyhow::anyhow!("missing task line"))?;
    let input = request_json(body)?;
    let num_chapters = input
        .pointer("/numChapters")
        .or_else(|| input.pointer("/details/numChapters"))
        .and_then(Value::as_u64)
        .unwrap_or(1);

    let text = match task {
        "outline" if behavior == StubBehavior::GarbledOutline => {
            "Here is a lovely outline about lighthouses.".to_owned()
        }
        "outline" => format!("```json\n{}\n```", outline_json(num_chapters, "Stub summary.")),
        "revise_outline" => {
            let feedback = input["feedback"].as_str().unwrap_or_default();
            outline_json(num_chapters, feedback)
        }
        "write_page" => {
            let chapter = input["chapterIndex"].as_u64().unwrap_or_default() + 1;
            let page = input["pageIndex"].as_u64().unwrap_or_default() + 1;
            format!("Page {page} of chapter {chapter}.\n")
        }
        "revise_page" => format!(
            "{} (revised: {})",
            input["originalText"].as_str().unwrap_or_default(),
            input["feedback"].as_str().unwrap_or_default()
        ),
        "front_matter" => serde_json::json!({
            "copyright": "Copyright stub",
            "dedication": "For the keepers",
            "acknowledgments": "Thanks",
            "introduction": "An introduction",
        })
        .to_string(),
        "back_matter" => serde_json::json!({
            "conclusion": "The end",
            "appendix": "Appendix",
            "glossary": "Glossary",
            "authorBio": "Bio",
        })
        .to_string(),
        "revise_book" => serde_json::json!({
            "revisedMatter": { "conclusion": "Revised ending" },
            "revisedContent": [
                { "chapterIndex": 0, "pageIndex": 0, "newText": "Revised first page" }
            ],
        })
        .to_string(),
        other => anyhow::bail!("unknown task: {other}"),
    };
    Ok(text)
}
