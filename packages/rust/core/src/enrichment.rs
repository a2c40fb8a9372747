//! Background LLM enrichment pipeline.
//!
//! The [`EnrichmentCoordinator`] generates repository descriptions in two
//! steps: fetch the repository page through a reader API as markdown, then
//! summarize it with an OpenAI-compatible chat completion call. Jobs run on
//! detached tasks but are globally serialized: at most one job talks to the
//! remote services at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use repodex_shared::{RepodexError, Result};
use repodex_storage::Storage;

/// Reader API base used to fetch repository pages as markdown.
const READER_BASE_URL: &str = "https://r.jina.ai";

/// Timeout for the reader fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the chat completion call.
const SUMMARIZE_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Settings (stored in the configs table, editable from the admin UI)
// ---------------------------------------------------------------------------

const KEY_READER_API_KEY: &str = "jina_api_key";
const KEY_LLM_BASE_URL: &str = "openai_base_url";
const KEY_LLM_API_KEY: &str = "openai_api_key";
const KEY_LLM_MODEL: &str = "openai_model";
const KEY_LLM_PROMPT: &str = "openai_prompt";

const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_PROMPT: &str =
    "Summarize the main features and purpose of this GitHub repository in under 200 words.";

/// Enrichment settings loaded from the configs table at job start, so admin
/// edits apply to the next job without a restart.
#[derive(Debug, Clone)]
struct EnrichmentSettings {
    reader_api_key: Option<String>,
    llm_base_url: String,
    llm_api_key: Option<String>,
    model: String,
    prompt: String,
}

impl EnrichmentSettings {
    async fn load(storage: &Storage) -> Result<Self> {
        Ok(Self {
            reader_api_key: read_key(storage, KEY_READER_API_KEY).await?,
            llm_base_url: read_key(storage, KEY_LLM_BASE_URL)
                .await?
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            llm_api_key: read_key(storage, KEY_LLM_API_KEY).await?,
            model: read_key(storage, KEY_LLM_MODEL)
                .await?
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            prompt: read_key(storage, KEY_LLM_PROMPT)
                .await?
                .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
        })
    }
}

/// Read a config value, treating empty strings as unset.
async fn read_key(storage: &Storage, key: &str) -> Result<Option<String>> {
    Ok(storage
        .get_config_value(key)
        .await?
        .filter(|v| !v.is_empty()))
}

// ---------------------------------------------------------------------------
// Wire types (OpenAI-compatible chat completion)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Outcome of a synchronous summary request, shaped for the admin endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Coordinates enrichment jobs: tracks which repositories are being
/// processed and serializes all remote calls behind one execution lock.
pub struct EnrichmentCoordinator {
    storage: Arc<Storage>,
    client: reqwest::Client,
    /// Repository ids with a queued or running job.
    in_progress: Mutex<HashSet<i64>>,
    /// Held for the entire remote-call section of each job.
    run_lock: tokio::sync::Mutex<()>,
    reader_base_url: String,
}

impl EnrichmentCoordinator {
    /// Create a coordinator sharing the given storage handle.
    pub fn new(storage: Arc<Storage>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("repodex/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RepodexError::Network(e.to_string()))?;

        Ok(Self {
            storage,
            client,
            in_progress: Mutex::new(HashSet::new()),
            run_lock: tokio::sync::Mutex::new(()),
            reader_base_url: READER_BASE_URL.to_string(),
        })
    }

    /// Point the reader fetch at a local mock server.
    #[cfg(test)]
    fn with_reader_base(mut self, base_url: &str) -> Self {
        self.reader_base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Whether a repository currently has a queued or running job.
    pub fn is_in_progress(&self, repo_id: i64) -> bool {
        lock_set(&self.in_progress).contains(&repo_id)
    }

    /// Queue a background enrichment job for a repository. The id becomes
    /// visible as in-progress before this returns; a repository that already
    /// has a pending job is not queued twice.
    pub fn spawn(self: &Arc<Self>, repo_id: i64, github_url: String) {
        if !lock_set(&self.in_progress).insert(repo_id) {
            debug!(repo_id, "enrichment already queued, skipping");
            return;
        }

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.run_job(repo_id, github_url).await;
        });
    }

    /// Run one background job to completion and persist the result.
    #[instrument(skip(self, github_url))]
    async fn run_job(&self, repo_id: i64, github_url: String) {
        // Removes the id from the in-progress set on every exit path.
        let _cleanup = InProgressGuard {
            coordinator: self,
            repo_id,
        };

        match self.generate(&github_url).await {
            Ok(summary) => match self.storage.get_repository(repo_id).await {
                Ok(Some(_)) => {
                    if let Err(e) = self
                        .storage
                        .set_repository_description(repo_id, &summary)
                        .await
                    {
                        error!(repo_id, error = %e, "failed to persist summary");
                    } else {
                        info!(repo_id, "enrichment complete");
                    }
                }
                Ok(None) => {
                    debug!(repo_id, "repository removed before enrichment finished");
                }
                Err(e) => error!(repo_id, error = %e, "failed to reload repository"),
            },
            Err(e) => warn!(repo_id, error = %e, "enrichment failed"),
        }
    }

    /// Generate a summary for a repository URL, serialized with every other
    /// job on the global execution lock.
    pub async fn generate(&self, github_url: &str) -> Result<String> {
        let _running = self.run_lock.lock().await;
        self.generate_locked(github_url).await
    }

    /// [`generate`](Self::generate) shaped for the admin endpoint, which
    /// reports failure in the response body rather than via status codes.
    pub async fn generate_summary(&self, github_url: &str) -> SummaryOutcome {
        match self.generate(github_url).await {
            Ok(summary) => SummaryOutcome {
                success: true,
                summary: Some(summary),
                error: None,
            },
            Err(e) => SummaryOutcome {
                success: false,
                summary: None,
                error: Some(e.to_string()),
            },
        }
    }

    async fn generate_locked(&self, github_url: &str) -> Result<String> {
        let settings = EnrichmentSettings::load(&self.storage).await?;

        // Without an LLM key there is nothing to call; fail before any
        // network traffic.
        let Some(api_key) = settings.llm_api_key.as_deref() else {
            return Err(RepodexError::Enrichment(
                "LLM API key is not configured".into(),
            ));
        };

        let content = self
            .fetch_content(github_url, settings.reader_api_key.as_deref())
            .await
            .unwrap_or_else(|| format!("GitHub repository: {github_url}"));

        self.summarize(&content, api_key, &settings).await
    }

    /// Fetch a repository page as markdown through the reader API.
    /// All failures are soft: the caller falls back to a bare URL stub.
    async fn fetch_content(&self, github_url: &str, api_key: Option<&str>) -> Option<String> {
        let url = format!("{}/{github_url}", self.reader_base_url);

        let mut request = self
            .client
            .get(&url)
            .header("X-Return-Format", "markdown")
            .timeout(FETCH_TIMEOUT);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) if !body.trim().is_empty() => Some(body),
                Ok(_) => {
                    warn!("reader API returned an empty body");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "reader response body unreadable");
                    None
                }
            },
            Ok(response) => {
                warn!(status = %response.status(), "reader API returned an error");
                None
            }
            Err(e) => {
                warn!(error = %e, "reader API request failed");
                None
            }
        }
    }

    /// Summarize fetched content with a chat completion call.
    async fn summarize(
        &self,
        content: &str,
        api_key: &str,
        settings: &EnrichmentSettings,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a professional technical documentation analyst.".into(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("{}\n\nRepository content:\n{content}", settings.prompt),
                },
            ],
            max_tokens: 500,
        };

        let url = format!(
            "{}/chat/completions",
            settings.llm_base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .timeout(SUMMARIZE_TIMEOUT)
            .send()
            .await
            .map_err(|e| RepodexError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RepodexError::Enrichment(format!(
                "LLM API returned status {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RepodexError::Enrichment(format!("invalid LLM response: {e}")))?;

        let summary = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        summary.ok_or_else(|| RepodexError::Enrichment("the model returned an empty summary".into()))
    }
}

/// Lock the in-progress set, recovering from a poisoned lock (the set stays
/// usable even if a holder panicked).
fn lock_set(set: &Mutex<HashSet<i64>>) -> std::sync::MutexGuard<'_, HashSet<i64>> {
    match set.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Removes a repository id from the in-progress set when dropped, so the
/// "processing" flag clears on every job exit path.
struct InProgressGuard<'a> {
    coordinator: &'a EnrichmentCoordinator,
    repo_id: i64,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        lock_set(&self.coordinator.in_progress).remove(&self.repo_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_storage() -> Arc<Storage> {
        let tmp = std::env::temp_dir().join(format!("repodex_test_{}.db", Uuid::now_v7()));
        Arc::new(Storage::open(&tmp).await.expect("open test db"))
    }

    async fn configure_llm(storage: &Storage, base_url: &str) {
        storage.set_config(KEY_LLM_BASE_URL, base_url).await.unwrap();
        storage.set_config(KEY_LLM_API_KEY, "sk-test").await.unwrap();
    }

    fn chat_response(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    async fn insert_repo(storage: &Storage, url: &str) -> i64 {
        let cat = storage.insert_category("Tools", None, 0).await.unwrap();
        storage
            .insert_repository("test", url, "acme", "test", cat.id, Some(url))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn generates_summary_from_fetched_content() {
        let storage = test_storage().await;
        let reader = MockServer::start().await;
        let llm = MockServer::start().await;
        configure_llm(&storage, &llm.uri()).await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# Readme\nA search tool."))
            .mount(&reader)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 500})))
            .respond_with(chat_response("A fast search tool."))
            .mount(&llm)
            .await;

        let coordinator = EnrichmentCoordinator::new(storage)
            .unwrap()
            .with_reader_base(&reader.uri());

        let summary = coordinator
            .generate("https://github.com/acme/search")
            .await
            .expect("summary");
        assert_eq!(summary, "A fast search tool.");
    }

    #[tokio::test]
    async fn missing_llm_key_makes_no_remote_calls() {
        let storage = test_storage().await;
        let reader = MockServer::start().await;
        let llm = MockServer::start().await;
        storage
            .set_config(KEY_LLM_BASE_URL, &llm.uri())
            .await
            .unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&reader)
            .await;
        Mock::given(method("POST"))
            .respond_with(chat_response("unused"))
            .expect(0)
            .mount(&llm)
            .await;

        let coordinator = EnrichmentCoordinator::new(storage)
            .unwrap()
            .with_reader_base(&reader.uri());

        let err = coordinator
            .generate("https://github.com/acme/search")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn failed_fetch_falls_back_to_url_stub() {
        let storage = test_storage().await;
        let reader = MockServer::start().await;
        let llm = MockServer::start().await;
        configure_llm(&storage, &llm.uri()).await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&reader)
            .await;
        Mock::given(method("POST"))
            .respond_with(chat_response("Summary from stub."))
            .mount(&llm)
            .await;

        let coordinator = EnrichmentCoordinator::new(storage)
            .unwrap()
            .with_reader_base(&reader.uri());

        let summary = coordinator
            .generate("https://github.com/acme/search")
            .await
            .expect("summary");
        assert_eq!(summary, "Summary from stub.");

        // The user message carried the URL stub, not fetched content.
        let requests = llm.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let user_content = body["messages"][1]["content"].as_str().unwrap();
        assert!(user_content.contains("GitHub repository: https://github.com/acme/search"));
    }

    #[tokio::test]
    async fn empty_fetched_body_falls_back_to_url_stub() {
        let storage = test_storage().await;
        let reader = MockServer::start().await;
        let llm = MockServer::start().await;
        configure_llm(&storage, &llm.uri()).await;

        // A 200 with nothing but whitespace in it.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  \n"))
            .mount(&reader)
            .await;
        Mock::given(method("POST"))
            .respond_with(chat_response("Summary from stub."))
            .mount(&llm)
            .await;

        let coordinator = EnrichmentCoordinator::new(storage)
            .unwrap()
            .with_reader_base(&reader.uri());

        coordinator
            .generate("https://github.com/acme/search")
            .await
            .expect("summary");

        let requests = llm.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let user_content = body["messages"][1]["content"].as_str().unwrap();
        assert!(user_content.contains("GitHub repository: https://github.com/acme/search"));
    }

    #[tokio::test]
    async fn empty_model_output_is_an_error() {
        let storage = test_storage().await;
        let reader = MockServer::start().await;
        let llm = MockServer::start().await;
        configure_llm(&storage, &llm.uri()).await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("content"))
            .mount(&reader)
            .await;
        Mock::given(method("POST"))
            .respond_with(chat_response("   "))
            .mount(&llm)
            .await;

        let coordinator = EnrichmentCoordinator::new(storage)
            .unwrap()
            .with_reader_base(&reader.uri());

        let err = coordinator
            .generate("https://github.com/acme/search")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty summary"));
    }

    #[tokio::test]
    async fn background_job_persists_summary_and_clears_flag() {
        let storage = test_storage().await;
        let reader = MockServer::start().await;
        let llm = MockServer::start().await;
        configure_llm(&storage, &llm.uri()).await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("content"))
            .mount(&reader)
            .await;
        Mock::given(method("POST"))
            .respond_with(chat_response("Generated description."))
            .mount(&llm)
            .await;

        let url = "https://github.com/acme/search";
        let repo_id = insert_repo(&storage, url).await;

        let coordinator = Arc::new(
            EnrichmentCoordinator::new(Arc::clone(&storage))
                .unwrap()
                .with_reader_base(&reader.uri()),
        );

        coordinator.spawn(repo_id, url.to_string());
        assert!(coordinator.is_in_progress(repo_id));

        while coordinator.is_in_progress(repo_id) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let repo = storage.get_repository(repo_id).await.unwrap().unwrap();
        assert_eq!(repo.description.as_deref(), Some("Generated description."));
        assert!(repo.updated_at.is_some());
    }

    #[tokio::test]
    async fn failed_job_leaves_description_and_clears_flag() {
        let storage = test_storage().await;
        // No LLM key configured: the job fails fast with no remote calls.
        let url = "https://github.com/acme/search";
        let repo_id = insert_repo(&storage, url).await;

        let coordinator = Arc::new(EnrichmentCoordinator::new(Arc::clone(&storage)).unwrap());
        coordinator.spawn(repo_id, url.to_string());

        while coordinator.is_in_progress(repo_id) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let repo = storage.get_repository(repo_id).await.unwrap().unwrap();
        assert_eq!(repo.description.as_deref(), Some(url));
    }

    #[tokio::test]
    async fn duplicate_spawn_runs_one_job() {
        let storage = test_storage().await;
        let reader = MockServer::start().await;
        let llm = MockServer::start().await;
        configure_llm(&storage, &llm.uri()).await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("content"))
            .mount(&reader)
            .await;
        Mock::given(method("POST"))
            .respond_with(chat_response("Summary.").set_delay(Duration::from_millis(100)))
            .mount(&llm)
            .await;

        let url = "https://github.com/acme/search";
        let repo_id = insert_repo(&storage, url).await;

        let coordinator = Arc::new(
            EnrichmentCoordinator::new(Arc::clone(&storage))
                .unwrap()
                .with_reader_base(&reader.uri()),
        );

        coordinator.spawn(repo_id, url.to_string());
        coordinator.spawn(repo_id, url.to_string());

        while coordinator.is_in_progress(repo_id) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let requests = llm.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_jobs_never_overlap() {
        let storage = test_storage().await;
        let reader = MockServer::start().await;
        let llm = MockServer::start().await;
        configure_llm(&storage, &llm.uri()).await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("content"))
            .mount(&reader)
            .await;
        Mock::given(method("POST"))
            .respond_with(chat_response("Summary.").set_delay(Duration::from_millis(200)))
            .mount(&llm)
            .await;

        let coordinator = Arc::new(
            EnrichmentCoordinator::new(storage)
                .unwrap()
                .with_reader_base(&reader.uri()),
        );

        // Each call holds the run lock through its 200ms remote call; if
        // the calls overlapped the pair would finish in well under 400ms.
        let started = std::time::Instant::now();
        let (a, b) = tokio::join!(
            coordinator.generate("https://github.com/acme/one"),
            coordinator.generate("https://github.com/acme/two"),
        );
        a.expect("first summary");
        b.expect("second summary");
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn job_for_deleted_repository_finishes_quietly() {
        let storage = test_storage().await;
        let reader = MockServer::start().await;
        let llm = MockServer::start().await;
        configure_llm(&storage, &llm.uri()).await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("content"))
            .mount(&reader)
            .await;
        Mock::given(method("POST"))
            .respond_with(chat_response("Summary.").set_delay(Duration::from_millis(50)))
            .mount(&llm)
            .await;

        let url = "https://github.com/acme/search";
        let repo_id = insert_repo(&storage, url).await;

        let coordinator = Arc::new(
            EnrichmentCoordinator::new(Arc::clone(&storage))
                .unwrap()
                .with_reader_base(&reader.uri()),
        );

        coordinator.spawn(repo_id, url.to_string());
        storage.delete_repository(repo_id).await.unwrap();

        while coordinator.is_in_progress(repo_id) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(storage.get_repository(repo_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn generate_summary_reports_failure_in_body() {
        let storage = test_storage().await;
        let coordinator = EnrichmentCoordinator::new(storage).unwrap();

        let outcome = coordinator
            .generate_summary("https://github.com/acme/search")
            .await;
        assert!(!outcome.success);
        assert!(outcome.summary.is_none());
        assert!(outcome.error.unwrap().contains("not configured"));
    }
}
