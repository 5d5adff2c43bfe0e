//! Moltbook feed API client.
//!
//! Bearer-auth HTTP client with a minimum inter-request interval derived
//! from the requests-per-minute budget, and jittered retry for transient
//! failures. The worker only reads from the API (comment enrichment); all
//! post collection happens out-of-band.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::feed::Comment;
use crate::util::retry::{RetryConfig, is_retryable_error};

#[derive(Debug, Clone)]
pub(crate) struct MoltbookConfig {
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) rate_limit_rpm: u32,
    pub(crate) connect_timeout: Duration,
    pub(crate) total_timeout: Duration,
}

pub(crate) struct MoltbookClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    min_request_interval: Duration,
    last_request: Mutex<Option<Instant>>,
    retry_config: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct CommentsResponse {
    #[serde(default)]
    comments: Vec<Comment>,
}

impl MoltbookClient {
    pub(crate) fn new(config: MoltbookConfig, retry_config: RetryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build moltbook http client")?;

        // 60秒をRPM予算で割った値が最小リクエスト間隔になる。
        let min_request_interval = Duration::from_millis(60_000 / u64::from(config.rate_limit_rpm));

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            min_request_interval,
            last_request: Mutex::new(None),
            retry_config,
        })
    }

    /// APIキーが設定されているかどうか。未設定の場合、呼び出し側は
    /// コメント取得をスキップする。
    pub(crate) fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// 前回リクエストからの経過時間が最小間隔未満なら待機する。
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_request_interval {
                tokio::time::sleep(self.min_request_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// 指定ポストのコメントを上位 `limit` 件まで取得する。
    ///
    /// # Errors
    /// APIキー未設定、または再試行を使い切ってもリクエストが成功しない
    /// 場合はエラーを返す。
    pub(crate) async fn fetch_post_comments(
        &self,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<Comment>> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("moltbook API key not configured");
        };

        let url = format!("{}/posts/{post_id}/comments?limit={limit}", self.base_url);
        let mut attempt = 0;

        loop {
            self.throttle().await;

            let result = self
                .http
                .get(&url)
                .bearer_auth(api_key)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);

            match result {
                Ok(response) => {
                    if attempt > 0 {
                        info!(attempt, post_id, "comment fetch succeeded after retry");
                    }
                    let body: CommentsResponse = response
                        .json()
                        .await
                        .context("failed to decode comments response")?;
                    debug!(post_id, count = body.comments.len(), "comments fetched");
                    return Ok(body.comments);
                }
                Err(err) => {
                    attempt += 1;

                    if !self.retry_config.can_retry(attempt) {
                        warn!(
                            attempt,
                            post_id,
                            max_attempts = self.retry_config.max_attempts,
                            "comment fetch failed after all retries"
                        );
                        return Err(err).context("comment fetch exhausted retries");
                    }

                    if !is_retryable_error(&err) {
                        warn!(?err, post_id, "comment fetch error is not retryable");
                        return Err(err).context("comment fetch failed");
                    }

                    let delay = self.retry_config.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        post_id,
                        delay_ms = delay.as_millis(),
                        "comment fetch failed, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String, api_key: Option<&str>) -> MoltbookConfig {
        MoltbookConfig {
            base_url,
            api_key: api_key.map(ToString::to_string),
            rate_limit_rpm: 6000,
            connect_timeout: Duration::from_millis(500),
            total_timeout: Duration::from_millis(2000),
        }
    }

    fn comment_json(id: &str, upvotes: i64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "post_id": "p1",
            "author": { "name": "shellfish" },
            "content": "I molted twice this week",
            "upvotes": upvotes,
            "created_at": "2026-02-01T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn fetch_post_comments_decodes_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts/p1/comments"))
            .and(header("authorization", "Bearer molt_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "comments": [comment_json("c1", 10), comment_json("c2", 4)]
            })))
            .mount(&server)
            .await;

        let client = MoltbookClient::new(
            config(server.uri(), Some("molt_test")),
            RetryConfig::new(1, 1, 2),
        )
        .expect("client builds");

        let comments = client
            .fetch_post_comments("p1", 3)
            .await
            .expect("fetch succeeds");

        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].id, "c1");
        assert_eq!(comments[0].upvotes, 10);
    }

    #[tokio::test]
    async fn fetch_post_comments_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts/p1/comments"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/posts/p1/comments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "comments": [comment_json("c1", 1)]
            })))
            .mount(&server)
            .await;

        let client = MoltbookClient::new(
            config(server.uri(), Some("molt_test")),
            RetryConfig::new(3, 1, 2),
        )
        .expect("client builds");

        let comments = client
            .fetch_post_comments("p1", 3)
            .await
            .expect("fetch succeeds after retry");

        assert_eq!(comments.len(), 1);
    }

    #[tokio::test]
    async fn fetch_post_comments_requires_api_key() {
        let client = MoltbookClient::new(
            config("http://localhost:9".to_string(), None),
            RetryConfig::default(),
        )
        .expect("client builds");

        assert!(!client.has_credentials());
        let error = client
            .fetch_post_comments("p1", 3)
            .await
            .expect_err("missing key should fail");
        assert!(error.to_string().contains("API key"));
    }
}
