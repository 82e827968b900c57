use std::process::Command;

/// Identifier appended to generated pod names so a clone can be traced back
/// to whoever opened the session.
///
/// Prefers the global git email, falls back to the hostname, and sanitizes
/// the result into a label-safe token.
pub fn resolve_user() -> String {
    let raw = git_email()
        .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned());
    sanitize(&raw)
}

fn git_email() -> Option<String> {
    let output = Command::new("git")
        .args(["config", "--global", "--get", "user.email"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let email = String::from_utf8(output.stdout).ok()?;
    let email = email.trim();
    (!email.is_empty()).then(|| email.to_string())
}

fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            '@' | '.' => Some('-'),
            c if c.is_ascii_alphanumeric() || c == '-' => Some(c),
            _ => None,
        })
        .collect();
    cleaned.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn email_is_flattened_into_a_label_safe_token() {
        assert_eq!(sanitize("Al.Ice@example.com"), "al-ice-example-com");
    }

    #[test]
    fn symbols_are_dropped_and_edges_trimmed() {
        assert_eq!(sanitize("  user+ops@host. "), "userops-host");
    }

    #[test]
    fn plain_hostname_passes_through() {
        assert_eq!(sanitize("build-box-42"), "build-box-42");
    }
}
