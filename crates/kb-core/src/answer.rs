//! Question answering over search results with an optional LLM backend.

use crate::config::{Config, LlmProvider};
use crate::search::SearchResult;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Returned when the knowledge base has nothing relevant
pub const NO_RESULTS_ANSWER: &str =
    "Sorry, I couldn't find any relevant information in the knowledge base.";

/// Context characters shown when no LLM is available
const FALLBACK_CONTEXT_CHARS: usize = 500;

/// Source excerpt length in characters
const EXCERPT_CHARS: usize = 200;

const SOURCE_SEPARATOR: &str = "\n\n---\n\n";

/// Text generation backend
pub trait AnswerGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;

    /// Reported as the model that produced an answer
    fn name(&self) -> &str;
}

/// Local Ollama server, non-streaming `/api/generate`
pub struct OllamaGenerator {
    model: String,
    base_url: String,
    timeout: Duration,
    name: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaGenerator {
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            name: format!("ollama/{model}"),
            model,
            base_url: crate::config::DEFAULT_OLLAMA_URL.to_string(),
            timeout: Duration::from_secs(crate::config::DEFAULT_LLM_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl AnswerGenerator for OllamaGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response: OllamaResponse = ureq::post(&format!("{}/api/generate", self.base_url))
            .timeout(self.timeout)
            .send_json(&request)
            .context("Failed to call Ollama")?
            .into_json()
            .context("Failed to parse Ollama response")?;

        Ok(response.response)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Anthropic Messages API
pub struct AnthropicGenerator {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    name: String,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl AnthropicGenerator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_model(api_key, crate::config::DEFAULT_ANTHROPIC_MODEL)
    }

    pub fn with_model(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            api_key: api_key.into(),
            name: format!("anthropic/{model}"),
            model,
            base_url: crate::config::DEFAULT_ANTHROPIC_URL.to_string(),
            timeout: Duration::from_secs(crate::config::DEFAULT_LLM_TIMEOUT_SECS),
        }
    }

    /// Use a custom base URL (for proxies or alternative endpoints)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl AnswerGenerator for AnthropicGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: 1024,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response: AnthropicResponse = ureq::post(&format!("{}/messages", self.base_url))
            .set("x-api-key", &self.api_key)
            .set("anthropic-version", "2023-06-01")
            .set("content-type", "application/json")
            .timeout(self.timeout)
            .send_json(&request)
            .context("Failed to call Anthropic API")?
            .into_json()
            .context("Failed to parse Anthropic response")?;

        response
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .context("Anthropic response has no content")
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Generator for the configured provider, if one is usable.
pub fn generator_from_config(config: &Config) -> Option<Box<dyn AnswerGenerator>> {
    let timeout = Duration::from_secs(config.llm_timeout_secs());
    match config.llm_provider() {
        LlmProvider::Ollama => Some(Box::new(
            OllamaGenerator::new(config.llm_model())
                .with_base_url(config.llm_base_url())
                .with_timeout(timeout),
        )),
        LlmProvider::Anthropic => match config.llm_api_key() {
            Some(key) => Some(Box::new(
                AnthropicGenerator::with_model(key, config.llm_model())
                    .with_base_url(config.llm_base_url())
                    .with_timeout(timeout),
            )),
            None => {
                warn!("Anthropic provider selected but no API key is set");
                None
            }
        },
        LlmProvider::Disabled => None,
    }
}

/// A cited passage in an answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerSource {
    pub document_id: String,
    pub filename: Option<String>,
    pub folder: Option<String>,
    /// First 200 characters of the passage
    pub text: String,
    pub page: Option<u32>,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// Generator that wrote the answer, `None` for canned or excerpt answers
    pub model: Option<String>,
    pub sources: Vec<AnswerSource>,
}

/// Join results into numbered context blocks.
pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[Source {}: {}]\n{}",
                i + 1,
                r.filename.as_deref().unwrap_or("Unknown"),
                r.text
            )
        })
        .collect::<Vec<_>>()
        .join(SOURCE_SEPARATOR)
}

pub fn build_prompt(question: &str, results: &[SearchResult]) -> String {
    format!(
        "Answer the question using the reference material below. \
         If the material does not contain the answer, say so honestly.\n\n\
         Reference material:\n{}\n\n\
         Question: {}\n\n\
         Answer:",
        build_context(results),
        question.trim()
    )
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn sources(results: &[SearchResult]) -> Vec<AnswerSource> {
    results
        .iter()
        .map(|r| AnswerSource {
            document_id: r.document_id.clone(),
            filename: r.filename.clone(),
            folder: r.folder.clone(),
            text: excerpt(&r.text, EXCERPT_CHARS),
            page: r.page,
            score: r.score,
        })
        .collect()
}

/// Answer `question` from `results`.
///
/// Without results the generator is never called. Without a generator, or
/// when it fails, the answer is an excerpt of the retrieved context.
pub fn answer(
    question: &str,
    results: &[SearchResult],
    generator: Option<&dyn AnswerGenerator>,
) -> Answer {
    if results.is_empty() {
        return Answer {
            text: NO_RESULTS_ANSWER.to_string(),
            model: None,
            sources: Vec::new(),
        };
    }

    let sources = sources(results);

    if let Some(generator) = generator {
        let prompt = build_prompt(question, results);
        debug!("Prompt length: {} chars", prompt.len());
        match generator.generate(&prompt) {
            Ok(text) => {
                return Answer {
                    text: text.trim().to_string(),
                    model: Some(generator.name().to_string()),
                    sources,
                }
            }
            Err(e) => warn!("{} failed, answering with excerpts: {e:#}", generator.name()),
        }
    }

    let context = build_context(results);
    Answer {
        text: format!(
            "(LLM not configured) Relevant excerpts from the knowledge base:\n\n{}",
            excerpt(&context, FALLBACK_CONTEXT_CHARS)
        ),
        model: None,
        sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::Mutex;

    fn result(filename: &str, text: &str) -> SearchResult {
        SearchResult {
            chunk_id: format!("{filename}_chunk_0"),
            document_id: format!("id-{filename}"),
            chunk_index: 0,
            text: text.to_string(),
            score: 0.8123,
            page: Some(3),
            folder: Some("notes".into()),
            filename: Some(filename.into()),
            section_title: None,
            low_confidence: false,
        }
    }

    struct Recording {
        prompts: Mutex<Vec<String>>,
        reply: Result<String, String>,
    }

    impl Recording {
        fn replying(reply: &str) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                reply: Ok(reply.into()),
            }
        }
    }

    impl AnswerGenerator for Recording {
        fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(anyhow::Error::msg)
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn test_build_prompt_numbers_sources() {
        let results = [result("a.md", "Alpha."), result("b.md", "Beta.")];
        let prompt = build_prompt(" What is alpha? ", &results);

        assert!(prompt.contains("[Source 1: a.md]\nAlpha.\n\n---\n\n[Source 2: b.md]\nBeta."));
        assert!(prompt.contains("Question: What is alpha?"));
    }

    #[test]
    fn test_no_results_skips_generator() {
        let generator = Recording::replying("unused");
        let answer = answer("anything", &[], Some(&generator));

        assert_eq!(answer.text, NO_RESULTS_ANSWER);
        assert_eq!(answer.model, None);
        assert!(answer.sources.is_empty());
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_generator_answer_and_sources() {
        let generator = Recording::replying("  Alpha is first.\n");
        let long = "x".repeat(250);
        let results = [result("a.md", "Alpha."), result("b.md", &long)];
        let answer = answer("What is alpha?", &results, Some(&generator));

        assert_eq!(answer.text, "Alpha is first.");
        assert_eq!(answer.model.as_deref(), Some("recording"));
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].text, "Alpha.");
        assert_eq!(answer.sources[1].text.chars().count(), 203);
        assert!(answer.sources[1].text.ends_with("..."));
        assert_eq!(answer.sources[1].page, Some(3));
    }

    #[test]
    fn test_without_generator_returns_excerpt() {
        let results = [result("a.md", &"長".repeat(600))];
        let answer = answer("question", &results, None);

        assert_eq!(answer.model, None);
        assert!(answer.text.starts_with("(LLM not configured)"));
        assert!(answer.text.contains("[Source 1: a.md]"));
        assert!(answer.text.ends_with("..."));
    }

    #[test]
    fn test_failing_generator_falls_back() {
        let generator = Recording {
            prompts: Mutex::new(Vec::new()),
            reply: Err("connection refused".into()),
        };
        let answer = answer("q", &[result("a.md", "Alpha.")], Some(&generator));
        assert_eq!(answer.model, None);
        assert!(answer.text.contains("Alpha."));
    }

    #[test]
    fn test_generator_from_config() {
        let mut config = Config::default();
        assert_eq!(
            generator_from_config(&config).unwrap().name(),
            "ollama/llama3"
        );

        config
            .apply_env_from(|key| (key == "KB_LLM_PROVIDER").then(|| "anthropic".to_string()))
            .unwrap();
        assert!(generator_from_config(&config).is_none());

        config
            .apply_env_from(|key| (key == "KB_LLM_PROVIDER").then(|| "none".to_string()))
            .unwrap();
        assert!(generator_from_config(&config).is_none());
    }

    /// Serve one HTTP request; the handle yields its request line and body.
    fn serve_once(
        response_body: &'static str,
    ) -> (String, std::thread::JoinHandle<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();

            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).unwrap();

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response_body.len(),
                response_body
            )
            .unwrap();
            (request_line, String::from_utf8(body).unwrap())
        });
        (url, handle)
    }

    #[test]
    fn test_ollama_wire_format() {
        let (url, server) = serve_once(r#"{"response":"From ollama","done":true}"#);
        let generator = OllamaGenerator::new("llama3").with_base_url(format!("{url}/"));

        assert_eq!(generator.generate("hello").unwrap(), "From ollama");
        let (request_line, body) = server.join().unwrap();
        assert!(request_line.starts_with("POST /api/generate"));
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["model"], "llama3");
        assert_eq!(body["prompt"], "hello");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_anthropic_wire_format() {
        let (url, server) =
            serve_once(r#"{"content":[{"type":"text","text":"From claude"}]}"#);
        let generator = AnthropicGenerator::new("secret").with_base_url(url);

        assert_eq!(generator.generate("hello").unwrap(), "From claude");
        assert_eq!(generator.name(), "anthropic/claude-3-haiku-20240307");
        let (request_line, body) = server.join().unwrap();
        assert!(request_line.starts_with("POST /messages"));
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
    }
}
