use k8s_openapi::api::core::v1::EnvVar;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid label format: {0}, expected key=value")]
    InvalidLabel(String),

    #[error("could not open env file {path}: {source}")]
    EnvFile {
        path: String,
        source: std::io::Error,
    },
}

type Result<T> = std::result::Result<T, ParseError>;

/// Parse repeated `key=value` tokens into a label map.
///
/// A value may itself contain `=`; a token without any `=` is fatal.
pub fn parse_labels(tokens: &[String]) -> Result<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    for token in tokens {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| ParseError::InvalidLabel(token.clone()))?;
        labels.insert(key.to_string(), value.to_string());
    }
    Ok(labels)
}

/// Parse a line-oriented `KEY=VALUE` file into environment variables.
///
/// Blank lines and `#` comments are skipped, as is any line without an `=`.
/// A line ending in `=` yields a variable with an empty value.
pub fn parse_env_file(path: Option<&Path>) -> Result<Vec<EnvVar>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let contents = std::fs::read_to_string(path).map_err(|source| ParseError::EnvFile {
        path: path.display().to_string(),
        source,
    })?;

    let mut envs = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((name, value)) = line.split_once('=') {
            envs.push(EnvVar {
                name: name.to_string(),
                value: Some(value.to_string()),
                ..Default::default()
            });
        }
    }
    Ok(envs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn parse_labels_splits_on_first_equals() {
        let labels = parse_labels(&[
            "app=web".to_string(),
            "team=platform".to_string(),
            "selector=a=b".to_string(),
        ])
        .unwrap();

        assert_eq!(labels.get("app"), Some(&"web".to_string()));
        assert_eq!(labels.get("team"), Some(&"platform".to_string()));
        // the value keeps everything after the first separator
        assert_eq!(labels.get("selector"), Some(&"a=b".to_string()));
    }

    #[test]
    fn parse_labels_rejects_token_without_separator() {
        let err = parse_labels(&["nonsense".to_string()]).unwrap_err();
        assert!(matches!(err, ParseError::InvalidLabel(token) if token == "nonsense"));
    }

    #[test]
    fn parse_env_file_skips_comments_and_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "API_KEY=xyz\n# comment\nLOG_LEVEL=\nBAD_LINE\n").unwrap();

        let envs = parse_env_file(Some(file.path())).unwrap();

        assert_eq!(envs.len(), 2);
        assert_eq!(envs[0].name, "API_KEY");
        assert_eq!(envs[0].value, Some("xyz".to_string()));
        assert_eq!(envs[1].name, "LOG_LEVEL");
        assert_eq!(envs[1].value, Some(String::new()));
    }

    #[test]
    fn parse_env_file_without_path_is_empty() {
        assert!(parse_env_file(None).unwrap().is_empty());
    }

    #[test]
    fn parse_env_file_missing_file_is_an_error() {
        let err = parse_env_file(Some(Path::new("/does/not/exist.env"))).unwrap_err();
        assert!(matches!(err, ParseError::EnvFile { .. }));
    }
}
