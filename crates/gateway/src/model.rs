//! Repository model exchanged with the Git gateway.

use chrono::{DateTime, Utc};
use common::{ProjectId, RepositoryId};
use serde::{Deserialize, Serialize};

/// Who can see a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
    Internal,
}

impl Visibility {
    /// Returns the wire name of the visibility.
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Internal => "internal",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "internal" => Ok(Visibility::Internal),
            other => Err(format!(
                "invalid visibility '{other}', expected public, private or internal"
            )),
        }
    }
}

/// A repository as held by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub visibility: Visibility,
    pub default_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Payload for creating a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRepositoryRequest {
    pub project_id: ProjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    pub default_branch: String,
}

impl CreateRepositoryRequest {
    /// Creates a private repository request on `main`.
    pub fn new(project_id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            project_id,
            name: name.into(),
            description: None,
            visibility: Visibility::default(),
            default_branch: "main".to_string(),
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial update of a repository. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRepositoryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
}

impl UpdateRepositoryRequest {
    /// Applies the update to a repository in place.
    pub fn apply_to(&self, repository: &mut Repository) {
        if let Some(name) = &self.name {
            repository.name = name.clone();
        }
        if let Some(description) = &self.description {
            repository.description = Some(description.clone());
        }
        if let Some(visibility) = self.visibility {
            repository.visibility = visibility;
        }
        if let Some(branch) = &self.default_branch {
            repository.default_branch = branch.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_parse() {
        assert_eq!("public".parse::<Visibility>(), Ok(Visibility::Public));
        assert_eq!("internal".parse::<Visibility>(), Ok(Visibility::Internal));
        assert!("secret".parse::<Visibility>().is_err());
    }

    #[test]
    fn test_visibility_wire_format() {
        let json = serde_json::to_string(&Visibility::Internal).unwrap();
        assert_eq!(json, "\"internal\"");
        assert!(serde_json::from_str::<Visibility>("\"hidden\"").is_err());
    }

    #[test]
    fn test_request_defaults() {
        let req = CreateRepositoryRequest::new(ProjectId::new(), "core");
        assert_eq!(req.visibility, Visibility::Private);
        assert_eq!(req.default_branch, "main");
        assert!(req.description.is_none());
    }

    #[test]
    fn test_update_applies_only_present_fields() {
        let mut repo = Repository {
            id: RepositoryId::new(),
            project_id: ProjectId::new(),
            name: "core".into(),
            description: None,
            visibility: Visibility::Private,
            default_branch: "main".into(),
            created_at: None,
        };
        let update = UpdateRepositoryRequest {
            visibility: Some(Visibility::Public),
            ..Default::default()
        };
        update.apply_to(&mut repo);
        assert_eq!(repo.visibility, Visibility::Public);
        assert_eq!(repo.name, "core");
        assert_eq!(repo.default_branch, "main");
    }

    #[test]
    fn test_repository_accepts_minimal_gateway_payload() {
        let id = RepositoryId::new();
        let project_id = ProjectId::new();
        let json = serde_json::json!({
            "id": id,
            "project_id": project_id,
            "name": "core",
            "visibility": "public",
            "default_branch": "main",
        });
        let repo: Repository = serde_json::from_value(json).unwrap();
        assert_eq!(repo.id, id);
        assert_eq!(repo.project_id, project_id);
        assert!(repo.created_at.is_none());
    }
}
