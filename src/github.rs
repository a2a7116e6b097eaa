//! Source-control collaborator: contract and GitHub REST adapter.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use crate::task::{PostedComment, PullDetails};

/// Per-request timeout for source-control calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

// ── Contract ─────────────────────────────────────────────────────

/// Operations the pipeline needs from the source-control provider.
#[async_trait]
pub trait SourceControlClient: Send + Sync {
    /// Fetch the unified diff for a pull request.
    async fn get_diff(&self, owner: &str, repo: &str, number: u64) -> anyhow::Result<String>;

    /// Fetch pull request details (title, body) for synthesis context.
    async fn get_details(&self, owner: &str, repo: &str, number: u64)
        -> anyhow::Result<PullDetails>;

    /// Post the review comment; returns the provider-assigned comment id.
    async fn post_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> anyhow::Result<PostedComment>;
}

// ── GitHub adapter ───────────────────────────────────────────────

/// [`SourceControlClient`] over the GitHub REST API.
///
/// Owns its bearer token (an installation token or PAT); auth never rides
/// through the queue.
pub struct GithubClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl GithubClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, "https://api.github.com".to_string())
    }

    /// Point the adapter at a different endpoint (tests, GHE).
    pub fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            base_url,
            token,
            client: reqwest::Client::new(),
        }
    }

    fn request(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        accept: &str,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, endpoint))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", accept)
            .header("User-Agent", "clawreview/0.1")
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }
}

#[async_trait]
impl SourceControlClient for GithubClient {
    async fn get_diff(&self, owner: &str, repo: &str, number: u64) -> anyhow::Result<String> {
        let endpoint = format!("/repos/{owner}/{repo}/pulls/{number}");
        let resp = self
            .request(
                reqwest::Method::GET,
                &endpoint,
                "application/vnd.github.v3.diff",
            )
            .send()
            .await
            .context("diff request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GitHub diff fetch returned {status}: {body}");
        }

        let diff = resp.text().await.context("reading diff body")?;
        tracing::info!(owner, repo, number, diff_size = diff.len(), "Fetched PR diff");
        Ok(diff)
    }

    async fn get_details(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> anyhow::Result<PullDetails> {
        let endpoint = format!("/repos/{owner}/{repo}/pulls/{number}");
        let resp = self
            .request(
                reqwest::Method::GET,
                &endpoint,
                "application/vnd.github.v3+json",
            )
            .send()
            .await
            .context("details request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GitHub details fetch returned {status}: {body}");
        }

        let body: serde_json::Value = resp.json().await.context("parsing details body")?;
        Ok(PullDetails {
            title: body["title"].as_str().unwrap_or_default().to_string(),
            body: body["body"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn post_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> anyhow::Result<PostedComment> {
        // Preferred path: a review with event COMMENT (no approve/reject).
        let endpoint = format!("/repos/{owner}/{repo}/pulls/{number}/reviews");
        let payload = serde_json::json!({ "body": body, "event": "COMMENT" });
        let resp = self
            .request(
                reqwest::Method::POST,
                &endpoint,
                "application/vnd.github.v3+json",
            )
            .json(&payload)
            .send()
            .await
            .context("review post failed")?;

        if resp.status().is_success() {
            let data: serde_json::Value = resp.json().await.context("parsing review response")?;
            let id = data["id"].as_i64().unwrap_or_default();
            tracing::info!(owner, repo, number, comment_id = id, "Posted PR review comment");
            return Ok(PostedComment { id });
        }

        // Some installations reject review posts; fall back to a plain
        // issue comment.
        let status = resp.status();
        tracing::warn!(
            owner,
            repo,
            number,
            %status,
            "Review post rejected, falling back to issue comment"
        );

        let endpoint = format!("/repos/{owner}/{repo}/issues/{number}/comments");
        let payload = serde_json::json!({ "body": body });
        let resp = self
            .request(
                reqwest::Method::POST,
                &endpoint,
                "application/vnd.github.v3+json",
            )
            .json(&payload)
            .send()
            .await
            .context("issue comment post failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GitHub comment post returned {status}: {body}");
        }

        let data: serde_json::Value = resp.json().await.context("parsing comment response")?;
        let id = data["id"].as_i64().unwrap_or_default();
        tracing::info!(owner, repo, number, comment_id = id, "Posted PR issue comment");
        Ok(PostedComment { id })
    }
}

// ── Test double ──────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_diff_uses_diff_media_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/42"))
            .and(header("accept", "application/vnd.github.v3.diff"))
            .and(header("authorization", "token gh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("diff --git a/x b/x"))
            .mount(&server)
            .await;

        let client = GithubClient::with_base_url("gh-token".into(), server.uri());
        let diff = client.get_diff("acme", "widgets", 42).await.unwrap();
        assert_eq!(diff, "diff --git a/x b/x");
    }

    #[tokio::test]
    async fn get_diff_propagates_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/42"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = GithubClient::with_base_url("gh-token".into(), server.uri());
        let err = client.get_diff("acme", "widgets", 42).await.unwrap_err();
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn get_details_extracts_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "Add widget cache",
                "body": "Caches widgets."
            })))
            .mount(&server)
            .await;

        let client = GithubClient::with_base_url("gh-token".into(), server.uri());
        let details = client.get_details("acme", "widgets", 42).await.unwrap();
        assert_eq!(details.title, "Add widget cache");
        assert_eq!(details.body, "Caches widgets.");
    }

    #[tokio::test]
    async fn post_comment_returns_review_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/pulls/42/reviews"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": 777 })),
            )
            .mount(&server)
            .await;

        let client = GithubClient::with_base_url("gh-token".into(), server.uri());
        let posted = client
            .post_comment("acme", "widgets", 42, "review body")
            .await
            .unwrap();
        assert_eq!(posted.id, 777);
    }

    #[tokio::test]
    async fn post_comment_falls_back_to_issue_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/pulls/42/reviews"))
            .respond_with(ResponseTemplate::new(422).set_body_string("validation failed"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/issues/42/comments"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": 888 })),
            )
            .mount(&server)
            .await;

        let client = GithubClient::with_base_url("gh-token".into(), server.uri());
        let posted = client
            .post_comment("acme", "widgets", 42, "review body")
            .await
            .unwrap();
        assert_eq!(posted.id, 888);
    }
}
