//! In-memory gateway with fault injection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{ProjectId, RepositoryId};

use crate::client::GatewayClient;
use crate::error::{GatewayError, Result};
use crate::model::{CreateRepositoryRequest, Repository, UpdateRepositoryRequest};

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    repositories: HashMap<RepositoryId, Repository>,
    fail_on_create: bool,
    failing_deletes: u32,
    hide_on_get: bool,
    ignore_deletes: bool,
    latency: Duration,
    create_calls: usize,
    get_calls: usize,
    delete_calls: usize,
    deleted: Vec<RepositoryId>,
}

/// In-memory gateway for tests and local runs.
///
/// Failures are injected through the `set_*` / `fail_*` methods and every
/// call is counted so tests can assert on what reached the gateway.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGatewayClient {
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl InMemoryGatewayClient {
    /// Creates an empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryGatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unavailable() -> GatewayError {
        GatewayError::Status {
            status: 503,
            body: "service unavailable".to_string(),
        }
    }

    async fn simulate_latency(&self) {
        let latency = self.state().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    /// Makes every create fail with a 503.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state().fail_on_create = fail;
    }

    /// Makes the next `count` deletes fail with a 503.
    pub fn fail_next_deletes(&self, count: u32) {
        self.state().failing_deletes = count;
    }

    /// Makes reads report `NotFound` even for stored repositories.
    pub fn set_hide_on_get(&self, hide: bool) {
        self.state().hide_on_get = hide;
    }

    /// Makes deletes report success without removing anything.
    pub fn set_ignore_deletes(&self, ignore: bool) {
        self.state().ignore_deletes = ignore;
    }

    /// Delays every call by the given duration.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Stores a repository directly, bypassing fault injection.
    pub fn insert_repository(&self, repository: Repository) {
        self.state()
            .repositories
            .insert(repository.id, repository);
    }

    /// Returns the number of stored repositories.
    pub fn repository_count(&self) -> usize {
        self.state().repositories.len()
    }

    /// Returns true if a repository with the given ID is stored.
    pub fn has_repository(&self, id: RepositoryId) -> bool {
        self.state().repositories.contains_key(&id)
    }

    /// Counts stored repositories with the given name in a project.
    pub fn count_named(&self, project_id: ProjectId, name: &str) -> usize {
        self.state()
            .repositories
            .values()
            .filter(|r| r.project_id == project_id && r.name == name)
            .count()
    }

    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    pub fn get_calls(&self) -> usize {
        self.state().get_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.state().delete_calls
    }

    /// Repositories for which a delete succeeded, in call order.
    pub fn deleted(&self) -> Vec<RepositoryId> {
        self.state().deleted.clone()
    }
}

#[async_trait]
impl GatewayClient for InMemoryGatewayClient {
    async fn create_repository(&self, req: &CreateRepositoryRequest) -> Result<Repository> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.create_calls += 1;

        if state.fail_on_create {
            return Err(Self::unavailable());
        }

        let taken = state
            .repositories
            .values()
            .any(|r| r.project_id == req.project_id && r.name == req.name);
        if taken {
            return Err(GatewayError::Conflict(format!(
                "repository '{}' already exists in project {}",
                req.name, req.project_id
            )));
        }

        let repository = Repository {
            id: RepositoryId::new(),
            project_id: req.project_id,
            name: req.name.clone(),
            description: req.description.clone(),
            visibility: req.visibility,
            default_branch: req.default_branch.clone(),
            created_at: Some(Utc::now()),
        };
        state
            .repositories
            .insert(repository.id, repository.clone());

        Ok(repository)
    }

    async fn get_repository(&self, id: RepositoryId) -> Result<Repository> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.get_calls += 1;

        if state.hide_on_get {
            return Err(GatewayError::NotFound(format!("repository {id}")));
        }

        state
            .repositories
            .get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("repository {id}")))
    }

    async fn update_repository(
        &self,
        id: RepositoryId,
        req: &UpdateRepositoryRequest,
    ) -> Result<Repository> {
        self.simulate_latency().await;
        let mut state = self.state();

        let current = state
            .repositories
            .get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("repository {id}")))?;

        if let Some(name) = &req.name {
            let taken = state
                .repositories
                .values()
                .any(|r| r.id != id && r.project_id == current.project_id && &r.name == name);
            if taken {
                return Err(GatewayError::Conflict(format!(
                    "repository '{name}' already exists in project {}",
                    current.project_id
                )));
            }
        }

        let mut updated = current;
        req.apply_to(&mut updated);
        state.repositories.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_repository(&self, id: RepositoryId) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.delete_calls += 1;

        if state.failing_deletes > 0 {
            state.failing_deletes -= 1;
            return Err(Self::unavailable());
        }

        if !state.ignore_deletes {
            state.repositories.remove(&id);
        }
        state.deleted.push(id);
        Ok(())
    }

    async fn list_repositories(&self, project_id: ProjectId) -> Result<Vec<Repository>> {
        self.simulate_latency().await;
        let mut repositories: Vec<_> = self
            .state()
            .repositories
            .values()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect();
        repositories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(repositories)
    }
}
