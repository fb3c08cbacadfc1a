//! Manifest files: a JSON array of resources, each tagged with its `kind`.

use std::path::Path;

use anyhow::{Context, Result};
use ark_state::{Resource, ResourceStore, StoreError};
use tracing::{debug, info};

/// Parse a manifest file.
pub fn load(path: &Path) -> Result<Vec<Resource>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest file: {:?}", path))?;
    parse(&raw).with_context(|| format!("Invalid manifest file: {:?}", path))
}

pub fn parse(raw: &str) -> Result<Vec<Resource>> {
    let resources: Vec<Resource> =
        serde_json::from_str(raw).context("Manifest must be a JSON array of resources")?;
    for resource in &resources {
        let meta = resource.metadata();
        anyhow::ensure!(
            !meta.name.is_empty() && !meta.namespace.is_empty(),
            "{} resource is missing metadata.name or metadata.namespace",
            resource.kind()
        );
    }
    Ok(resources)
}

/// Outcome of [`apply`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
}

/// Create each resource, or replace the spec of one that already exists.
pub async fn apply<S: ResourceStore + ?Sized>(
    store: &S,
    resources: Vec<Resource>,
) -> Result<ApplySummary> {
    let mut summary = ApplySummary::default();

    for resource in resources {
        let kind = resource.kind();
        let key = resource.key();
        match store.create(resource.clone()).await {
            Ok(_) => {
                debug!(kind = %kind, resource = %key, "created");
                summary.created += 1;
            }
            Err(StoreError::AlreadyExists { .. }) => {
                let existing = store
                    .get(kind, &key)
                    .await
                    .with_context(|| format!("Failed to read existing {kind} {key}"))?;
                let mut replacement = resource;
                replacement.metadata_mut().resource_version = existing.metadata().resource_version;
                store
                    .update(replacement)
                    .await
                    .with_context(|| format!("Failed to update {kind} {key}"))?;
                debug!(kind = %kind, resource = %key, "updated");
                summary.updated += 1;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to create {kind} {key}"));
            }
        }
    }

    info!(
        created = summary.created,
        updated = summary.updated,
        "manifests applied"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_state::{AgentPhase, MemoryResourceStore, ObjectKey, ResourceKind};
    use std::io::Write;

    const MANIFEST: &str = r#"[
        {"kind": "Tool", "metadata": {"name": "search", "namespace": "default"},
         "spec": {"type": "http"}},
        {"kind": "Agent", "metadata": {"name": "helper", "namespace": "default"},
         "spec": {"modelRef": {"name": "gpt"},
                  "tools": [{"type": "custom", "name": "search"}]}}
    ]"#;

    #[test]
    fn test_load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();

        let resources = load(file.path()).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].kind(), ResourceKind::Tool);
        assert_eq!(resources[1].kind(), ResourceKind::Agent);
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("absent.json"));
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(parse(r#"{"kind": "Tool"}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_empty_namespace() {
        let raw = r#"[{"kind": "Tool", "metadata": {"name": "t", "namespace": ""}}]"#;
        assert!(parse(raw).is_err());
    }

    #[tokio::test]
    async fn test_apply_creates_then_updates() {
        let store = MemoryResourceStore::new();
        let resources = parse(MANIFEST).unwrap();

        let first = apply(&store, resources.clone()).await.unwrap();
        assert_eq!(first, ApplySummary { created: 2, updated: 0 });

        let second = apply(&store, resources).await.unwrap();
        assert_eq!(second, ApplySummary { created: 0, updated: 2 });

        let agent = store
            .get_agent(&ObjectKey::new("default", "helper"))
            .await
            .unwrap();
        assert_eq!(agent.status.phase, AgentPhase::Unset);
        assert_eq!(agent.spec.tools.len(), 1);
    }
}
