//! Repository endpoints, each backed by a transaction.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use callback::EventPublisher;
use common::{ProjectId, RepositoryId};
use gateway::{CreateRepositoryRequest, GatewayClient, Repository, Visibility};
use serde::Deserialize;

use crate::error::ApiError;
use crate::extract::Caller;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateRepositoryBody {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    pub default_branch: Option<String>,
}

impl CreateRepositoryBody {
    fn into_request(self, project_id: ProjectId) -> CreateRepositoryRequest {
        let mut req = CreateRepositoryRequest::new(project_id, self.name).with_visibility(self.visibility);
        if let Some(branch) = self.default_branch {
            req = req.with_default_branch(branch);
        }
        if let Some(description) = self.description {
            req = req.with_description(description);
        }
        req
    }
}

/// POST /projects/{id}/repositories: create a repository transactionally.
#[tracing::instrument(skip(state, body))]
pub async fn create<G, E>(
    State(state): State<Arc<AppState<G, E>>>,
    caller: Caller,
    Path(project_id): Path<ProjectId>,
    Json(body): Json<CreateRepositoryBody>,
) -> Result<(StatusCode, Json<Repository>), ApiError>
where
    G: GatewayClient + Clone + 'static,
    E: EventPublisher + Clone + 'static,
{
    let repository = state
        .transactions
        .create_repository_transaction(
            &state.shutdown.child_token(),
            project_id,
            caller.actor_id,
            caller.tenant_id,
            body.into_request(project_id),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(repository)))
}

/// DELETE /projects/{id}/repositories/{repo_id}: delete a repository transactionally.
#[tracing::instrument(skip(state))]
pub async fn delete<G, E>(
    State(state): State<Arc<AppState<G, E>>>,
    caller: Caller,
    Path((project_id, repository_id)): Path<(ProjectId, RepositoryId)>,
) -> Result<Json<Repository>, ApiError>
where
    G: GatewayClient + Clone + 'static,
    E: EventPublisher + Clone + 'static,
{
    let repository = state
        .transactions
        .delete_repository_transaction(
            &state.shutdown.child_token(),
            project_id,
            caller.actor_id,
            caller.tenant_id,
            repository_id,
        )
        .await?;

    Ok(Json(repository))
}
