use serde::Serialize;

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Identity {
    pub(crate) name: String,
    pub(crate) email: String,
}

impl Identity {
    pub(crate) fn unknown() -> Self {
        Self { name: UNKNOWN.to_string(), email: UNKNOWN.to_string() }
    }

    /// Key under which graded records for this student accumulate.
    pub(crate) fn record_key(&self) -> String {
        format!("{}-{}", self.name, self.email)
    }
}

/// Best-effort scan of header comments such as `# Name: Ada` or `// Email: ada@example.com`.
/// The first non-empty value for each field wins.
pub(crate) fn extract_identity(source: &str) -> Identity {
    let mut name = None;
    let mut email = None;

    for line in source.lines() {
        let Some(comment) = comment_body(line) else {
            continue;
        };

        if name.is_none() {
            name = field_value(comment, "name:");
        }
        if email.is_none() {
            email = field_value(comment, "email:");
        }
        if name.is_some() && email.is_some() {
            break;
        }
    }

    let unknown = Identity::unknown();
    Identity { name: name.unwrap_or(unknown.name), email: email.unwrap_or(unknown.email) }
}

fn comment_body(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    trimmed
        .strip_prefix('#')
        .or_else(|| trimmed.strip_prefix("//"))
        .map(str::trim_start)
}

fn field_value(comment: &str, prefix: &str) -> Option<String> {
    let head = comment.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }

    let value = comment[prefix.len()..].trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_hash_comment_header() {
        let source = "# Name: Ada Lovelace\n# Email: ada@example.com\nprint('hi')\n";
        let identity = extract_identity(source);
        assert_eq!(identity.name, "Ada Lovelace");
        assert_eq!(identity.email, "ada@example.com");
        assert_eq!(identity.record_key(), "Ada Lovelace-ada@example.com");
    }

    #[test]
    fn accepts_slash_comments_and_any_case() {
        let source = "// NAME: Grace\nint main() {}\n  // email:grace@navy.mil\n";
        let identity = extract_identity(source);
        assert_eq!(identity.name, "Grace");
        assert_eq!(identity.email, "grace@navy.mil");
    }

    #[test]
    fn missing_fields_default_to_unknown() {
        let identity = extract_identity("# Name: Alan\nx = 1\n");
        assert_eq!(identity.name, "Alan");
        assert_eq!(identity.email, UNKNOWN);

        assert_eq!(extract_identity("fn main() {}"), Identity::unknown());
        assert_eq!(Identity::unknown().record_key(), "Unknown-Unknown");
    }

    #[test]
    fn blank_values_and_code_lines_are_ignored() {
        let source = "# Name:\nname: not a comment\n# Name: Barbara\n";
        assert_eq!(extract_identity(source).name, "Barbara");
    }

    #[test]
    fn multibyte_comment_does_not_panic() {
        let identity = extract_identity("# Ñ\n# Name: José");
        assert_eq!(identity.name, "José");
    }
}
