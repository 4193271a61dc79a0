//! Project endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use callback::{CallbackEvent, EventPublisher};
use chrono::{DateTime, Utc};
use common::{ActorId, ProjectId, TenantId};
use gateway::GatewayClient;
use project::{Project, ProjectRepository};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::Caller;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub actor_id: ActorId,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProjectResponse {
    pub id: ProjectId,
    pub tenant_id: TenantId,
    pub name: String,
    pub owner_id: ActorId,
    pub members: Vec<ActorId>,
    pub created_at: DateTime<Utc>,
}

impl From<&Project> for ProjectResponse {
    fn from(project: &Project) -> Self {
        let mut members: Vec<ActorId> = project.members.iter().copied().collect();
        members.sort();
        Self {
            id: project.id,
            tenant_id: project.tenant_id,
            name: project.name.clone(),
            owner_id: project.owner_id,
            members,
            created_at: project.created_at,
        }
    }
}

// -- Handlers --

/// POST /projects: create a project owned by the caller.
#[tracing::instrument(skip(state, req))]
pub async fn create<G, E>(
    State(state): State<Arc<AppState<G, E>>>,
    caller: Caller,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), ApiError>
where
    G: GatewayClient + Clone + 'static,
    E: EventPublisher + Clone + 'static,
{
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("project name is empty".to_string()));
    }

    let project = Project::new(caller.tenant_id, caller.actor_id, name);
    state.projects.insert_project(project.clone()).await;
    tracing::info!(project_id = %project.id, "project created");

    let response = ProjectResponse::from(&project);
    match CallbackEvent::project_event("created", project.id, &response) {
        Ok(event) => state.publisher.publish(event).await,
        Err(e) => tracing::warn!(error = %e, "could not build project event"),
    }

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /projects/{id}/members: grant an actor access. Owner only.
#[tracing::instrument(skip(state, req))]
pub async fn add_member<G, E>(
    State(state): State<Arc<AppState<G, E>>>,
    caller: Caller,
    Path(project_id): Path<ProjectId>,
    Json(req): Json<AddMemberRequest>,
) -> Result<StatusCode, ApiError>
where
    G: GatewayClient + Clone + 'static,
    E: EventPublisher + Clone + 'static,
{
    let project = state
        .projects
        .find_project(caller.tenant_id, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {project_id} not found")))?;

    if project.owner_id != caller.actor_id {
        return Err(ApiError::Forbidden(
            "only the project owner can add members".to_string(),
        ));
    }

    state.projects.grant_access(project_id, req.actor_id).await;
    tracing::info!(%project_id, member = %req.actor_id, "project member added");

    match CallbackEvent::project_event(
        "member_added",
        project_id,
        &serde_json::json!({ "actor_id": req.actor_id }),
    ) {
        Ok(event) => state.publisher.publish(event).await,
        Err(e) => tracing::warn!(error = %e, "could not build project event"),
    }

    Ok(StatusCode::NO_CONTENT)
}
