use chrono::Utc;
use k8s_openapi::api::core::v1::{EnvVar, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use thiserror::Error;

/// Maximum length of a pod name accepted by the API server.
const MAX_NAME_LENGTH: usize = 63;

#[derive(Error, Debug)]
pub enum CloneError {
    #[error("source pod has no name in its metadata")]
    MissingName,

    #[error("source pod '{name}' has no spec")]
    MissingSpec { name: String },

    #[error("source pod '{name}' has no containers to clone")]
    NoContainers { name: String },
}

type Result<T> = std::result::Result<T, CloneError>;

/// Caller-supplied inputs of a clone operation.
///
/// The uniqueness `token` is injected so that name generation stays
/// deterministic under test; production callers use [`uniqueness_token`].
#[derive(Debug, Clone)]
pub struct CloneOptions {
    pub user: String,
    pub command: Vec<String>,
    pub prefix: String,
    pub suffix: String,
    pub labels: BTreeMap<String, String>,
    pub env: Vec<EnvVar>,
    pub token: String,
}

/// A short time-derived token appended to generated names.
///
/// Collisions across concurrent sessions are improbable, not impossible; a
/// name conflict on creation is surfaced as a creation error and the session
/// can simply be rerun.
pub fn uniqueness_token() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{}", nanos.rem_euclid(10_000))
}

/// Derive the clone's name from its parts.
///
/// Each part is stripped of leading/trailing separators before joining, the
/// result is truncated to the platform limit and trimmed again so that
/// truncation can never leave a trailing separator.
pub fn generate_pod_name(
    original: &str,
    prefix: &str,
    suffix: &str,
    user: &str,
    token: &str,
) -> String {
    let parts = [prefix, original, suffix, user, token];
    let name = parts
        .iter()
        .map(|part| part.trim_matches('-'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let truncated: String = name.chars().take(MAX_NAME_LENGTH).collect();
    truncated.trim_matches('-').to_string()
}

/// Union of `base` and `overrides`, the override side winning on key collision.
///
/// Used for both the label merge and the environment merge.
pub fn merge_with_precedence<K, V, B, O>(base: B, overrides: O) -> BTreeMap<K, V>
where
    K: Ord,
    B: IntoIterator<Item = (K, V)>,
    O: IntoIterator<Item = (K, V)>,
{
    let mut merged: BTreeMap<K, V> = base.into_iter().collect();
    merged.extend(overrides);
    merged
}

/// Derive an attachable one-shot pod from `source`.
///
/// Pure transformation: the first container becomes the interactive target
/// (caller command, no args, TTY and stdin forced on), labels and environment
/// are merged with caller precedence, the restart policy is forced to
/// `Never` and the node binding is cleared so the scheduler re-places the
/// pod. The service account and annotations are carried over unchanged.
pub fn clone_pod(source: &Pod, options: &CloneOptions) -> Result<Pod> {
    let source_name = source
        .metadata
        .name
        .clone()
        .ok_or(CloneError::MissingName)?;

    let mut spec = source
        .spec
        .clone()
        .ok_or_else(|| CloneError::MissingSpec {
            name: source_name.clone(),
        })?;

    if spec.containers.is_empty() {
        return Err(CloneError::NoContainers { name: source_name });
    }

    let name = generate_pod_name(
        &source_name,
        &options.prefix,
        &options.suffix,
        &options.user,
        &options.token,
    );

    let labels = merge_with_precedence(
        source.metadata.labels.clone().unwrap_or_default(),
        options.labels.clone(),
    );

    spec.restart_policy = Some("Never".to_string());
    spec.node_name = None;

    let target = &mut spec.containers[0];
    target.command = Some(options.command.clone());
    target.args = None;
    target.tty = Some(true);
    target.stdin = Some(true);

    let merged_env = merge_with_precedence(
        target
            .env
            .take()
            .unwrap_or_default()
            .into_iter()
            .map(|env| (env.name.clone(), env)),
        options.env.iter().cloned().map(|env| (env.name.clone(), env)),
    );
    // env ordering is insignificant to the container runtime; emit it sorted
    // by name so the clone is reproducible
    target.env = Some(merged_env.into_values().collect());

    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: source.metadata.namespace.clone(),
            labels: Some(labels),
            annotations: source.metadata.annotations.clone(),
            ..Default::default()
        },
        spec: Some(spec),
        status: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use pretty_assertions::assert_eq;

    fn env(name: &str, value: &str) -> EnvVar {
        EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        }
    }

    fn source_pod(name: &str, namespace: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([(
                    "app".to_string(),
                    "web".to_string(),
                )])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "main".to_string(),
                    image: Some("registry.local/web:1.2".to_string()),
                    command: Some(vec!["web-server".to_string()]),
                    args: Some(vec!["--port=8080".to_string()]),
                    env: Some(vec![env("API_KEY", "original"), env("LOG_LEVEL", "info")]),
                    ..Default::default()
                }],
                node_name: Some("node-a".to_string()),
                service_account_name: Some("web-sa".to_string()),
                restart_policy: Some("Always".to_string()),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn options() -> CloneOptions {
        CloneOptions {
            user: "al-ice".to_string(),
            command: vec!["bash".to_string()],
            prefix: "dbg-".to_string(),
            suffix: String::new(),
            labels: BTreeMap::new(),
            env: Vec::new(),
            token: "1234".to_string(),
        }
    }

    #[test]
    fn clone_produces_interactive_one_shot_pod() {
        let cloned = clone_pod(&source_pod("web-7f", "prod"), &options()).unwrap();

        assert_eq!(
            cloned.metadata.name,
            Some("dbg-web-7f-al-ice-1234".to_string())
        );
        assert_eq!(cloned.metadata.namespace, Some("prod".to_string()));

        let spec = cloned.spec.unwrap();
        assert_eq!(spec.restart_policy, Some("Never".to_string()));
        assert_eq!(spec.node_name, None);
        assert_eq!(spec.service_account_name, Some("web-sa".to_string()));
        assert_eq!(spec.containers.len(), 1);

        let target = &spec.containers[0];
        assert_eq!(target.command, Some(vec!["bash".to_string()]));
        assert_eq!(target.args, None);
        assert_eq!(target.tty, Some(true));
        assert_eq!(target.stdin, Some(true));
    }

    #[test]
    fn generated_name_never_exceeds_limit_or_keeps_separators() {
        let long = "a".repeat(80);
        let name = generate_pod_name(&long, "dbg", "", "user", "42");

        assert!(name.len() <= MAX_NAME_LENGTH);
        assert!(!name.starts_with('-'));
        assert!(!name.ends_with('-'));
    }

    #[test]
    fn truncation_never_reintroduces_a_trailing_separator() {
        // 62 chars + "-12": the cut lands right after the separator
        let original = "a".repeat(62);
        let name = generate_pod_name(&original, "", "", "", "12");

        assert!(name.len() <= MAX_NAME_LENGTH);
        assert!(!name.ends_with('-'));
        assert_eq!(name, original);
    }

    #[test]
    fn empty_parts_are_skipped() {
        assert_eq!(generate_pod_name("web", "", "", "", "7"), "web-7");
        assert_eq!(
            generate_pod_name("web", "dbg-", "-x", "", "7"),
            "dbg-web-x-7"
        );
    }

    #[test]
    fn labels_merge_with_caller_precedence() {
        let mut opts = options();
        opts.labels = BTreeMap::from([
            ("app".to_string(), "debug".to_string()),
            ("owner".to_string(), "alice".to_string()),
        ]);

        let cloned = clone_pod(&source_pod("web-7f", "prod"), &opts).unwrap();
        let labels = cloned.metadata.labels.unwrap();

        assert_eq!(labels.get("app"), Some(&"debug".to_string()));
        assert_eq!(labels.get("owner"), Some(&"alice".to_string()));
    }

    #[test]
    fn env_merges_with_caller_precedence() {
        let mut opts = options();
        opts.env = vec![env("LOG_LEVEL", "debug"), env("EXTRA", "1")];

        let cloned = clone_pod(&source_pod("web-7f", "prod"), &opts).unwrap();
        let merged = cloned.spec.unwrap().containers[0].env.clone().unwrap();

        let by_name: BTreeMap<_, _> = merged
            .iter()
            .map(|e| (e.name.clone(), e.value.clone().unwrap_or_default()))
            .collect();

        assert_eq!(by_name.len(), merged.len(), "no duplicate names");
        assert_eq!(by_name.get("API_KEY"), Some(&"original".to_string()));
        assert_eq!(by_name.get("LOG_LEVEL"), Some(&"debug".to_string()));
        assert_eq!(by_name.get("EXTRA"), Some(&"1".to_string()));
    }

    #[test]
    fn merge_with_precedence_is_a_union_with_override() {
        let base = [("a", 1), ("b", 2)];
        let overrides = [("b", 9), ("c", 3)];

        let merged = merge_with_precedence(base, overrides);

        assert_eq!(merged, BTreeMap::from([("a", 1), ("b", 9), ("c", 3)]));
    }

    #[test]
    fn source_without_containers_is_rejected() {
        let mut source = source_pod("web-7f", "prod");
        source.spec.as_mut().unwrap().containers.clear();

        let err = clone_pod(&source, &options()).unwrap_err();
        assert!(matches!(err, CloneError::NoContainers { name } if name == "web-7f"));
    }

    #[test]
    fn uniqueness_token_is_short_and_numeric() {
        let token = uniqueness_token();
        assert!(token.len() <= 4);
        assert!(token.chars().all(|c| c.is_ascii_digit()));
    }
}
