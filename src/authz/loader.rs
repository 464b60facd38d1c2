use std::path::Path;
use std::sync::Arc;

use crate::authz::errors::AuthzError;
use crate::authz::policy::{parse_kdl_document, ParsedPolicy};
use crate::authz::registry::{Audience, ConditionBuilder, RegistryBuilder};
use crate::authz::types::Subject;

/// Register every `.kdl` rule file in `dir`, sorted by file name. Each file
/// becomes one rule module named after its stem. Returns the number of files.
pub fn load_policies(dir: &Path, builder: &mut RegistryBuilder) -> Result<usize, AuthzError> {
    if !dir.is_dir() {
        return Err(AuthzError::InvalidPolicy(format!(
            "policies directory `{}` does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "kdl"))
        .collect();
    entries.sort();

    let mut grant_count = 0;
    for path in &entries {
        let contents =
            std::fs::read_to_string(path).map_err(|source| AuthzError::PolicyLoadError {
                path: path.display().to_string(),
                source,
            })?;
        let parsed = parse_kdl_document(&contents)?;
        let module = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        grant_count += parsed.grants.len();
        register_policy(builder, &module, parsed);
    }

    tracing::info!(
        files = entries.len(),
        grants = grant_count,
        dir = %dir.display(),
        "Loaded rule files"
    );

    Ok(entries.len())
}

/// Add parsed grants to `builder` under the module `module`.
pub fn register_policy(builder: &mut RegistryBuilder, module: &str, parsed: ParsedPolicy) {
    let mut registrar = builder.module(module);
    for grant in parsed.grants {
        let condition = match grant.audience {
            Audience::Anyone => ConditionBuilder::Static(grant.condition),
            Audience::Authenticated => {
                let condition = grant.condition;
                ConditionBuilder::PerSubject(Arc::new(move |_: &Subject| condition.clone()))
            }
        };
        registrar.push(grant.resource_type, grant.actions, condition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::ability::AbilitySet;
    use crate::authz::schema::Schema;
    use crate::authz::types::{Action, ResourceType};
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_kdl(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_sorted_modules() {
        let dir = TempDir::new().unwrap();
        write_kdl(
            dir.path(),
            "20-papers.kdl",
            r#"grant "Paper" { actions "read"; audience "anyone"; when { eq "status" value="PUBLISHED"; }; }"#,
        );
        write_kdl(
            dir.path(),
            "10-delegations.kdl",
            r#"grant "Delegation" { actions "read"; when { some "members" { eq "user_id" subject="id"; }; }; }"#,
        );
        write_kdl(dir.path(), "notes.txt", "not a policy");

        let mut builder = RegistryBuilder::new(Schema::conference());
        assert_eq!(load_policies(dir.path(), &mut builder).unwrap(), 2);
        let reg = builder.build().unwrap();
        assert_eq!(reg.modules(), ["10-delegations", "20-papers"]);

        let anon = AbilitySet::for_subject(&reg, None);
        assert_eq!(anon.grants().len(), 1);
        assert_eq!(anon.grants()[0].resource_type, ResourceType::Paper);

        let user = AbilitySet::for_subject(&reg, Some(Subject::new("u1", Vec::<String>::new())));
        let d = json!({ "__typename": "Delegation", "id": "D", "members": [{ "id": "m", "user_id": "u1" }] });
        assert!(crate::authz::engine::can_json(&user, Action::Read, d).unwrap());
    }

    #[test]
    fn test_load_missing_dir() {
        let mut builder = RegistryBuilder::new(Schema::conference());
        let err = load_policies(Path::new("/nonexistent/rules"), &mut builder).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidPolicy(_)));
    }

    #[test]
    fn test_public_file_grant_with_subject_rejected_at_build() {
        let dir = TempDir::new().unwrap();
        write_kdl(
            dir.path(),
            "bad.kdl",
            r#"grant "User" { actions "read"; audience "anyone"; when { eq "id" subject="id"; }; }"#,
        );
        let mut builder = RegistryBuilder::new(Schema::conference());
        load_policies(dir.path(), &mut builder).unwrap();
        assert!(matches!(
            builder.build().unwrap_err(),
            AuthzError::SubjectInPublicGrant { .. }
        ));
    }

    #[test]
    fn test_bad_path_in_file_rejected_at_build() {
        let dir = TempDir::new().unwrap();
        write_kdl(
            dir.path(),
            "typo.kdl",
            r#"grant "Delegation" { actions "read"; when { every { always; }; }; }"#,
        );
        let mut builder = RegistryBuilder::new(Schema::conference());
        load_policies(dir.path(), &mut builder).unwrap();
        assert!(matches!(
            builder.build().unwrap_err(),
            AuthzError::MalformedQuantifier(_)
        ));
    }
}
