// Validator engine - evaluates named validators against sink arguments

use crate::core::policy::{JsonSchemaParams, PathParams, Policy, StringParams, ValidatorParams};
use crate::engine::schema_cache;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Outcome of evaluating a validator against a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected { reason: String },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Accepted => None,
            Self::Rejected { reason } => Some(reason),
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Evaluate the validator named `validator_id` against `value`.
///
/// An unknown validator id is a rejection, so a sink that names a missing
/// validator fails closed. Internal errors (unreadable schema, bad regex,
/// unresolvable path) are also rejections, never panics or propagated
/// errors.
pub fn validate(policy: &Policy, validator_id: &str, value: &Value) -> Verdict {
    let Some(def) = policy.validators.get(validator_id) else {
        return Verdict::reject(format!("unknown validator {validator_id}"));
    };

    match &def.params {
        ValidatorParams::Str(params) => validate_string(&coerce_str(value), params),
        ValidatorParams::Path(params) => validate_path(&coerce_str(value), params),
        ValidatorParams::JsonSchema(params) => validate_json(value, params),
    }
}

/// Convenience wrapper for sink arguments, which are always strings.
pub fn validate_str(policy: &Policy, validator_id: &str, value: &str) -> Verdict {
    validate(policy, validator_id, &Value::String(value.to_string()))
}

fn coerce_str(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

/// String checks run in a fixed order; the first failure determines the
/// reported reason. Lengths are counted in code points of the NFC-normalized
/// string.
fn validate_string(raw: &str, params: &StringParams) -> Verdict {
    let s: String = raw.nfc().collect();
    let len = s.chars().count();

    if let Some(max) = params.max_len {
        if len > max {
            return Verdict::reject(format!("length>{max}"));
        }
    }
    if let Some(min) = params.min_len {
        if len < min {
            return Verdict::reject(format!("length<{min}"));
        }
    }
    if let Some(pattern) = &params.deny_regex {
        match Regex::new(pattern) {
            Ok(re) => {
                // substring search, not a full match
                if re.is_match(&s) {
                    return Verdict::reject("matches forbidden pattern");
                }
            }
            Err(e) => return Verdict::reject(format!("invalid deny_regex: {e}")),
        }
    }
    for sub in &params.deny_substrings {
        if s.contains(sub.as_str()) {
            return Verdict::reject(format!("contains forbidden substring {sub:?}"));
        }
    }
    if let Some(charset) = &params.allow_charset {
        // The fragment is pasted verbatim into a character class; it is
        // trusted configuration, not a place for untrusted regex.
        match Regex::new(&format!("^[{charset}]+$")) {
            Ok(re) => {
                if !re.is_match(&s) {
                    return Verdict::reject("contains disallowed characters");
                }
            }
            Err(e) => return Verdict::reject(format!("invalid allow_charset: {e}")),
        }
    }
    if let Some(pattern) = &params.match_regex {
        match Regex::new(&format!("^(?:{pattern})$")) {
            Ok(re) => {
                if !re.is_match(&s) {
                    return Verdict::reject("regex mismatch");
                }
            }
            Err(e) => return Verdict::reject(format!("invalid match_regex: {e}")),
        }
    }
    Verdict::Accepted
}

fn validate_path(raw: &str, params: &PathParams) -> Verdict {
    let path = match resolve_path(Path::new(raw)) {
        Ok(p) => p,
        Err(e) => return Verdict::reject(format!("path invalid: {e}")),
    };

    // Malformed root entries are skipped; an empty resulting list rejects
    // everything.
    let roots: Vec<PathBuf> = params
        .allowed_roots
        .iter()
        .filter_map(|root| resolve_path(Path::new(root)).ok())
        .collect();
    if roots.is_empty() {
        return Verdict::reject("no allowed roots configured");
    }

    for root in &roots {
        // containment on path-component boundaries; equal-to-root is under
        if !path.starts_with(root) {
            continue;
        }
        if params.deny_subdirectories && path.parent() != Some(root.as_path()) {
            return Verdict::reject(format!(
                "subdirectories disallowed under {}",
                root.display()
            ));
        }
        return Verdict::Accepted;
    }

    Verdict::reject(format!(
        "path not under allowed roots: {:?}",
        params.allowed_roots
    ))
}

/// Resolve `path` to an absolute form with `.`/`..` removed lexically and
/// symlinks of the longest existing prefix resolved, so paths that do not
/// exist yet still canonicalize.
fn resolve_path(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut lexical = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                lexical.pop();
            }
            other => lexical.push(other),
        }
    }

    let mut existing = lexical.as_path();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(resolved) => {
                let mut out = resolved;
                for name in tail.iter().rev() {
                    out.push(name);
                }
                return Ok(out);
            }
            Err(_) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    tail.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Ok(lexical),
            },
        }
    }
}

fn validate_json(value: &Value, params: &JsonSchemaParams) -> Verdict {
    let validator = match schema_cache::load_schema(&params.schema_ref) {
        Ok(v) => v,
        Err(detail) => {
            return Verdict::reject(format!("json schema load/validate error: {detail}"))
        }
    };

    let mut errors: Vec<(String, String)> = validator
        .iter_errors(value)
        .map(|e| (e.instance_path.to_string(), e.to_string()))
        .collect();
    if errors.is_empty() {
        return Verdict::Accepted;
    }
    errors.sort();
    let (path, message) = &errors[0];
    Verdict::reject(format!("json schema error at {path}: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::{Defaults, ValidatorDef};
    use std::collections::HashMap;

    fn policy_with(id: &str, params: ValidatorParams) -> Policy {
        let mut validators = HashMap::new();
        validators.insert(
            id.to_string(),
            ValidatorDef {
                id: id.to_string(),
                params,
            },
        );
        Policy {
            version: 1,
            defaults: Defaults::default(),
            validators,
            sinks: Vec::new(),
        }
    }

    #[test]
    fn unknown_validator_fails_closed() {
        let policy = policy_with("x", ValidatorParams::Str(StringParams::default()));
        let verdict = validate_str(&policy, "missing", "anything");
        assert_eq!(verdict.reason(), Some("unknown validator missing"));
    }

    #[test]
    fn string_check_order_is_observable() {
        // both max_len and deny_substrings would fail; max_len runs first
        let policy = policy_with(
            "v",
            ValidatorParams::Str(StringParams {
                max_len: Some(3),
                deny_substrings: vec![";".to_string()],
                ..StringParams::default()
            }),
        );
        let verdict = validate_str(&policy, "v", "long;input");
        assert_eq!(verdict.reason(), Some("length>3"));
    }

    #[test]
    fn deny_regex_is_a_search_match_regex_is_anchored() {
        let policy = policy_with(
            "deny",
            ValidatorParams::Str(StringParams {
                deny_regex: Some("rm".to_string()),
                ..StringParams::default()
            }),
        );
        assert!(!validate_str(&policy, "deny", "echo; rm -rf /").is_accepted());

        let policy = policy_with(
            "full",
            ValidatorParams::Str(StringParams {
                match_regex: Some("[a-z]+".to_string()),
                ..StringParams::default()
            }),
        );
        assert!(validate_str(&policy, "full", "abc").is_accepted());
        assert_eq!(
            validate_str(&policy, "full", "abc1").reason(),
            Some("regex mismatch")
        );
    }

    #[test]
    fn allow_charset_wraps_fragment_in_anchored_class() {
        let policy = policy_with(
            "cs",
            ValidatorParams::Str(StringParams {
                allow_charset: Some("A-Za-z0-9_.-".to_string()),
                ..StringParams::default()
            }),
        );
        assert!(validate_str(&policy, "cs", "report-2.txt").is_accepted());
        assert_eq!(
            validate_str(&policy, "cs", "a/b").reason(),
            Some("contains disallowed characters")
        );
    }

    #[test]
    fn validation_is_invariant_under_nfc() {
        let policy = policy_with(
            "len",
            ValidatorParams::Str(StringParams {
                max_len: Some(4),
                ..StringParams::default()
            }),
        );
        // "e" + combining acute normalizes to a single code point
        let decomposed = "cafe\u{0301}";
        let precomposed = "caf\u{e9}";
        assert_eq!(
            validate_str(&policy, "len", decomposed),
            validate_str(&policy, "len", precomposed)
        );
        assert!(validate_str(&policy, "len", decomposed).is_accepted());
    }

    #[test]
    fn invalid_pattern_is_a_rejection_not_a_panic() {
        let policy = policy_with(
            "bad",
            ValidatorParams::Str(StringParams {
                deny_regex: Some("(unclosed".to_string()),
                ..StringParams::default()
            }),
        );
        let verdict = validate_str(&policy, "bad", "anything");
        assert!(verdict.reason().unwrap().starts_with("invalid deny_regex"));
    }

    #[test]
    fn path_traversal_escapes_root() {
        let root = tempfile::tempdir().unwrap();
        let policy = policy_with(
            "p",
            ValidatorParams::Path(PathParams {
                allowed_roots: vec![root.path().to_string_lossy().into_owned()],
                deny_subdirectories: false,
            }),
        );

        let inside = root.path().join("file.txt");
        assert!(validate_str(&policy, "p", &inside.to_string_lossy()).is_accepted());

        let escaping = root.path().join("../outside.txt");
        let verdict = validate_str(&policy, "p", &escaping.to_string_lossy());
        assert!(verdict
            .reason()
            .unwrap()
            .starts_with("path not under allowed roots"));
    }

    #[test]
    fn deny_subdirectories_allows_direct_children_only() {
        let root = tempfile::tempdir().unwrap();
        let policy = policy_with(
            "p",
            ValidatorParams::Path(PathParams {
                allowed_roots: vec![root.path().to_string_lossy().into_owned()],
                deny_subdirectories: true,
            }),
        );

        let direct = root.path().join("a.txt");
        assert!(validate_str(&policy, "p", &direct.to_string_lossy()).is_accepted());

        let nested = root.path().join("sub/a.txt");
        let verdict = validate_str(&policy, "p", &nested.to_string_lossy());
        assert!(verdict
            .reason()
            .unwrap()
            .starts_with("subdirectories disallowed under"));
    }

    #[test]
    fn empty_roots_reject_everything() {
        let policy = policy_with(
            "p",
            ValidatorParams::Path(PathParams {
                allowed_roots: Vec::new(),
                deny_subdirectories: false,
            }),
        );
        assert_eq!(
            validate_str(&policy, "p", "/tmp/x").reason(),
            Some("no allowed roots configured")
        );
    }

    #[test]
    fn nonexistent_paths_still_canonicalize() {
        let root = tempfile::tempdir().unwrap();
        let policy = policy_with(
            "p",
            ValidatorParams::Path(PathParams {
                allowed_roots: vec![root.path().to_string_lossy().into_owned()],
                deny_subdirectories: false,
            }),
        );

        // neither the subdirectory nor the file exists yet
        let fresh = root.path().join("not-yet/created.txt");
        assert!(validate_str(&policy, "p", &fresh.to_string_lossy()).is_accepted());
    }
}
