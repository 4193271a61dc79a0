//! HTTP/JSON implementation of the gateway client.

use std::time::Duration;

use async_trait::async_trait;
use common::{ProjectId, RepositoryId};
use reqwest::{RequestBuilder, Response, StatusCode};

use crate::client::GatewayClient;
use crate::error::{GatewayError, Result};
use crate::model::{CreateRepositoryRequest, Repository, UpdateRepositoryRequest};

/// Connection settings for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL, e.g. `http://git-gateway:8080`.
    pub base_url: String,
    /// Bearer token sent on every request, if set.
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Gateway client speaking the gateway's REST API.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpGatewayClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpGatewayClient {
    /// Builds a client from the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    fn repositories_url(&self) -> String {
        format!("{}/api/v1/repositories", self.base_url)
    }

    fn repository_url(&self, id: RepositoryId) -> String {
        format!("{}/api/v1/repositories/{}", self.base_url, id)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Maps non-success statuses onto [`GatewayError`].
    async fn check(response: Response, resource: impl Into<String>) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => GatewayError::NotFound(resource.into()),
            StatusCode::CONFLICT => GatewayError::Conflict(body),
            other => GatewayError::Status {
                status: other.as_u16(),
                body,
            },
        })
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    #[tracing::instrument(skip(self, req), fields(project_id = %req.project_id, name = %req.name))]
    async fn create_repository(&self, req: &CreateRepositoryRequest) -> Result<Repository> {
        let response = self
            .authorize(self.http.post(self.repositories_url()))
            .json(req)
            .send()
            .await?;
        let response = Self::check(response, format!("repository {}", req.name)).await?;
        Ok(response.json().await?)
    }

    #[tracing::instrument(skip(self))]
    async fn get_repository(&self, id: RepositoryId) -> Result<Repository> {
        let response = self
            .authorize(self.http.get(self.repository_url(id)))
            .send()
            .await?;
        let response = Self::check(response, format!("repository {id}")).await?;
        Ok(response.json().await?)
    }

    #[tracing::instrument(skip(self, req))]
    async fn update_repository(
        &self,
        id: RepositoryId,
        req: &UpdateRepositoryRequest,
    ) -> Result<Repository> {
        let response = self
            .authorize(self.http.patch(self.repository_url(id)))
            .json(req)
            .send()
            .await?;
        let response = Self::check(response, format!("repository {id}")).await?;
        Ok(response.json().await?)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_repository(&self, id: RepositoryId) -> Result<()> {
        let response = self
            .authorize(self.http.delete(self.repository_url(id)))
            .send()
            .await?;
        match Self::check(response, format!("repository {id}")).await {
            Ok(_) => Ok(()),
            Err(GatewayError::NotFound(_)) => {
                tracing::debug!(%id, "repository already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn list_repositories(&self, project_id: ProjectId) -> Result<Vec<Repository>> {
        let url = format!(
            "{}/api/v1/projects/{}/repositories",
            self.base_url, project_id
        );
        let response = self.authorize(self.http.get(url)).send().await?;
        let response = Self::check(response, format!("project {project_id}")).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = HttpGatewayClient::new(GatewayConfig::new("http://gw:8080/")).unwrap();
        let id = RepositoryId::new();
        assert_eq!(
            client.repository_url(id),
            format!("http://gw:8080/api/v1/repositories/{id}")
        );
        assert_eq!(client.repositories_url(), "http://gw:8080/api/v1/repositories");
    }

    #[test]
    fn test_config_builders() {
        let config = GatewayConfig::new("http://gw")
            .with_token("secret")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
