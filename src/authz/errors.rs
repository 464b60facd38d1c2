use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use crate::authz::types::{Action, ResourceType};

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Authentication required")]
    #[diagnostic(code(tribune::authz::auth_required))]
    AuthRequired,

    #[error("Permission denied")]
    #[diagnostic(code(tribune::authz::permission_denied))]
    PermissionDenied,

    #[error("Unknown resource type `{0}`")]
    #[diagnostic(
        code(tribune::authz::unknown_resource_type),
        help("Instances must carry a `__typename` naming one of the registered resource types")
    )]
    UnknownResourceType(String),

    #[error("Relation `{relation}` on `{resource_type}` was not loaded")]
    #[diagnostic(
        code(tribune::authz::unloaded_relation),
        help("Load the relation before evaluating; `includes_for` lists every relation the rules need")
    )]
    UnloadedRelation {
        resource_type: ResourceType,
        relation: String,
    },

    #[error("Attribute `{attribute}` on `{resource_type}` was not loaded")]
    #[diagnostic(code(tribune::authz::missing_attribute))]
    MissingAttribute {
        resource_type: ResourceType,
        attribute: String,
    },

    #[error("Unresolved path `{path}` on `{resource_type}`: {reason}")]
    #[diagnostic(
        code(tribune::authz::unresolved_path),
        help("Field paths are to-one relations followed by an attribute; quantifier paths are relations only")
    )]
    UnresolvedPath {
        resource_type: ResourceType,
        path: String,
        reason: String,
    },

    #[error("Malformed quantifier: {0}")]
    #[diagnostic(code(tribune::authz::malformed_quantifier))]
    MalformedQuantifier(String),

    #[error("Type mismatch on `{resource_type}.{attribute}`: expected {expected}")]
    #[diagnostic(code(tribune::authz::type_mismatch))]
    TypeMismatch {
        resource_type: ResourceType,
        attribute: String,
        expected: String,
    },

    #[error("Public grant on `{resource_type}` in module `{module}` references the subject")]
    #[diagnostic(
        code(tribune::authz::subject_in_public_grant),
        help("Anonymous requests have no subject id; register the grant as subject-dependent instead")
    )]
    SubjectInPublicGrant {
        module: String,
        resource_type: ResourceType,
    },

    #[error("No rule registered for `{action}` on `{resource_type}`")]
    #[diagnostic(
        code(tribune::authz::missing_rule),
        help("Register at least one grant for this pair, even if it never applies to ordinary subjects")
    )]
    MissingRule {
        resource_type: ResourceType,
        action: Action,
    },

    #[error("Invalid instance: {0}")]
    #[diagnostic(code(tribune::authz::invalid_instance))]
    InvalidInstance(String),

    #[error("Invalid schema: {0}")]
    #[diagnostic(code(tribune::authz::invalid_schema))]
    InvalidSchema(String),

    #[error("Failed to load policy file `{path}`")]
    #[diagnostic(
        code(tribune::authz::policy_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    PolicyLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy: {0}")]
    #[diagnostic(
        code(tribune::authz::invalid_policy),
        help("Policy files contain `grant \"<ResourceType>\" {{ actions ...; when {{ ... }} }}` nodes")
    )]
    InvalidPolicy(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(tribune::authz::kdl_parse),
        help("Check the KDL syntax of the rule file (https://kdl.dev)")
    )]
    KdlParse(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(tribune::authz::io))]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// Programmer errors: misconfigured rules or incompletely loaded data.
    /// These must never be mistaken for a denial.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, AuthzError::AuthRequired | AuthzError::PermissionDenied)
    }
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthzError::AuthRequired => (StatusCode::UNAUTHORIZED, "authentication required"),
            AuthzError::PermissionDenied => (StatusCode::FORBIDDEN, "forbidden"),
            _ => {
                tracing::error!(error = %self, "authorization configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal authorization error",
                )
            }
        };
        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}
