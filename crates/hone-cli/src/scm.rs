//! Commit status reporting.

use async_trait::async_trait;
use hone_core::config::{ScmConfig, ScmProvider};
use hone_core::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Receives build lifecycle events for the commit being built.
#[async_trait]
pub trait ScmReporter: Send + Sync {
    async fn build_started(&self) -> Result<()>;
    async fn build_completed(&self) -> Result<()>;
    async fn build_errored(&self) -> Result<()>;
}

/// Build one reporter per configured provider.
pub fn init_reporters(
    configs: &[ScmConfig],
    env: &BTreeMap<String, String>,
) -> Result<Vec<Box<dyn ScmReporter>>> {
    configs
        .iter()
        .map(|config| match config.provider {
            ScmProvider::Github => {
                GithubStatus::from_config(config, env).map(|g| Box::new(g) as Box<dyn ScmReporter>)
            }
        })
        .collect()
}

#[derive(Serialize)]
struct StatusRequest<'a> {
    state: &'a str,
    context: &'a str,
    description: &'a str,
}

/// Posts GitHub commit statuses.
pub struct GithubStatus {
    client: Client,
    api_url: String,
    token: String,
    repository: String,
    commit: String,
    context: String,
}

impl GithubStatus {
    /// Settings missing from `config` fall back to `GITHUB_TOKEN`,
    /// `GITHUB_REPOSITORY` and `GITHUB_SHA`, first in the config's global
    /// env and then in the process environment.
    pub fn from_config(config: &ScmConfig, env: &BTreeMap<String, String>) -> Result<Self> {
        let lookup = |value: &Option<String>, var: &str| -> Result<String> {
            value
                .clone()
                .or_else(|| env.get(var).cloned())
                .or_else(|| std::env::var(var).ok())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::InvalidConfig(format!("github scm requires {}", var)))
        };

        Ok(Self {
            client: Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: lookup(&config.token, "GITHUB_TOKEN")?,
            repository: lookup(&config.repository, "GITHUB_REPOSITORY")?,
            commit: lookup(&config.commit, "GITHUB_SHA")?,
            context: config.context.clone(),
        })
    }

    async fn post_status(&self, state: &str, description: &str) -> Result<()> {
        let url = format!(
            "{}/repos/{}/statuses/{}",
            self.api_url, self.repository, self.commit
        );
        debug!(url = %url, state = %state, "Posting commit status");

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "hone")
            .json(&StatusRequest {
                state,
                context: &self.context,
                description,
            })
            .send()
            .await
            .map_err(|e| Error::Scm(format!("Request failed: {}", e)))?;

        let status = res.status();
        if status.is_success() {
            info!(commit = %self.commit, state = %state, "Posted commit status");
            return Ok(());
        }

        let body = res.text().await.unwrap_or_default();
        if status == StatusCode::UNPROCESSABLE_ENTITY && body.contains("No commit found for SHA") {
            return Err(Error::CommitNotFound(self.commit.clone()));
        }
        Err(Error::Scm(format!("GitHub returned {}: {}", status, body)))
    }
}

#[async_trait]
impl ScmReporter for GithubStatus {
    async fn build_started(&self) -> Result<()> {
        self.post_status("pending", "Build started").await
    }

    async fn build_completed(&self) -> Result<()> {
        self.post_status("success", "Build succeeded").await
    }

    async fn build_errored(&self) -> Result<()> {
        self.post_status("failure", "Build failed").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(api_url: &str) -> ScmConfig {
        ScmConfig {
            provider: ScmProvider::Github,
            token: Some("s3cret".into()),
            repository: Some("acme/widgets".into()),
            commit: Some("abc123".into()),
            api_url: api_url.to_string(),
            context: "hone".into(),
        }
    }

    #[tokio::test]
    async fn test_posts_pending_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/statuses/abc123"))
            .and(header("Authorization", "Bearer s3cret"))
            .and(body_partial_json(serde_json::json!({
                "state": "pending",
                "context": "hone"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let github = GithubStatus::from_config(&config(&server.uri()), &BTreeMap::new()).unwrap();
        github.build_started().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_commit_is_commit_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "message": "No commit found for SHA: abc123",
                "documentation_url": "https://docs.github.com/rest/commits/statuses"
            })))
            .mount(&server)
            .await;

        let github = GithubStatus::from_config(&config(&server.uri()), &BTreeMap::new()).unwrap();
        assert!(matches!(
            github.build_completed().await,
            Err(Error::CommitNotFound(sha)) if sha == "abc123"
        ));
    }

    #[tokio::test]
    async fn test_other_failures_are_scm_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
            .mount(&server)
            .await;

        let github = GithubStatus::from_config(&config(&server.uri()), &BTreeMap::new()).unwrap();
        assert!(matches!(github.build_errored().await, Err(Error::Scm(_))));
    }

    #[test]
    fn test_settings_fall_back_to_config_env() {
        let mut scm = config("https://api.github.com/");
        scm.commit = None;
        let env = BTreeMap::from([("GITHUB_SHA".to_string(), "fromenv".to_string())]);

        let github = GithubStatus::from_config(&scm, &env).unwrap();
        assert_eq!(github.commit, "fromenv");
        assert_eq!(github.api_url, "https://api.github.com");
    }
}
