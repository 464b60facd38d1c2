use axum::http::HeaderMap;

use crate::authz::types::Subject;

pub const SUBJECT_ID_HEADER: &str = "x-subject-id";
pub const SUBJECT_ROLES_HEADER: &str = "x-subject-roles";

/// Read the subject a trusted gateway forwarded. `None` means anonymous.
pub fn from_headers(headers: &HeaderMap) -> Option<Subject> {
    let id = headers.get(SUBJECT_ID_HEADER)?.to_str().ok()?.trim();
    if id.is_empty() {
        return None;
    }

    let roles = headers
        .get(SUBJECT_ROLES_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Some(Subject::new(id, roles))
}
