// Policy model - immutable in-memory representation of validators and sinks

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What to do when a validator rejects a sink argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationMode {
    /// Raise a policy violation and abort the operation.
    Block,
    /// Log the violation and let the operation proceed.
    Warn,
    /// Reserved. No sanitization transform is defined; behaves as `Warn`.
    Sanitize,
}

impl ViolationMode {
    /// Strict parse used by the policy loader; `None` for unknown strings.
    pub fn parse_strict(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Some(Self::Block),
            "warn" => Some(Self::Warn),
            "sanitize" => Some(Self::Sanitize),
            _ => None,
        }
    }

    /// Lenient parse used at enforcement time for the `defaults.mode`
    /// string; anything unrecognized falls back to `Block`.
    pub fn parse_or_block(s: &str) -> Self {
        Self::parse_strict(s).unwrap_or(Self::Block)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Warn => "warn",
            Self::Sanitize => "sanitize",
        }
    }
}

/// Parameters of a `string` validator. All checks are optional; they run in
/// a fixed order so the first failing check determines the reported reason.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StringParams {
    pub max_len: Option<usize>,
    pub min_len: Option<usize>,
    pub match_regex: Option<String>,
    pub allow_charset: Option<String>,
    pub deny_regex: Option<String>,
    pub deny_substrings: Vec<String>,
}

/// Parameters of a `path` validator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathParams {
    pub allowed_roots: Vec<String>,
    pub deny_subdirectories: bool,
}

/// Parameters of a `json_schema` validator. The referenced schema document
/// is resolved lazily on first use, not at policy load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSchemaParams {
    pub schema_ref: String,
}

/// Typed parameter union over the three validator kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ValidatorParams {
    Str(StringParams),
    Path(PathParams),
    JsonSchema(JsonSchemaParams),
}

impl ValidatorParams {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Path(_) => "path",
            Self::JsonSchema(_) => "json_schema",
        }
    }
}

/// A named, parameterized predicate on a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorDef {
    pub id: String,
    pub params: ValidatorParams,
}

/// Which form of a file path a validator receives for the `builtins.open`
/// sink. Ignored by every other sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationTarget {
    FullPath,
    Basename,
}

/// A single `require` entry: a validator id plus the argument form it runs
/// on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequireEntry {
    pub id: String,
    pub target: ValidationTarget,
}

impl RequireEntry {
    /// Bare-id entries keep the historical dispatch: the literal id
    /// `safe_filename` sees the basename, every other validator the full
    /// path. An explicit `target` on the wire overrides this.
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let target = if id == "safe_filename" {
            ValidationTarget::Basename
        } else {
            ValidationTarget::FullPath
        };
        Self { id, target }
    }
}

/// Per-sink override of the default violation handling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnViolation {
    pub mode: Option<ViolationMode>,
    pub message: Option<String>,
}

/// A guarded operation and the validators applied to its extracted strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkDef {
    pub id: String,
    /// Fully-qualified name of the guarded operation, e.g. `subprocess.run`.
    pub function: String,
    pub require: Vec<RequireEntry>,
    pub on_violation: Option<OnViolation>,
    /// Hard-deny list; a sink whose function appears here is always blocked
    /// regardless of validator results.
    pub forbid_functions: Vec<String>,
}

/// Process-wide defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Defaults {
    /// Raw mode string; unrecognized values fall back to `block` at
    /// enforcement time.
    pub mode: Option<String>,
}

/// The loaded policy. Created once at startup and immutable afterwards, so
/// it is shared across threads behind an `Arc` with no synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub version: i64,
    pub defaults: Defaults,
    pub validators: HashMap<String, ValidatorDef>,
    pub sinks: Vec<SinkDef>,
}

impl Policy {
    /// Look up the sink definition guarding `func_fqn`, if any.
    pub fn sink_for_function(&self, func_fqn: &str) -> Option<&SinkDef> {
        self.sinks.iter().find(|s| s.function == func_fqn)
    }

    /// Effective process-wide violation mode.
    pub fn default_mode(&self) -> ViolationMode {
        self.defaults
            .mode
            .as_deref()
            .map(ViolationMode::parse_or_block)
            .unwrap_or(ViolationMode::Block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parse_strict_rejects_unknown() {
        assert_eq!(ViolationMode::parse_strict("warn"), Some(ViolationMode::Warn));
        assert_eq!(ViolationMode::parse_strict("BLOCK"), Some(ViolationMode::Block));
        assert_eq!(ViolationMode::parse_strict("audit"), None);
    }

    #[test]
    fn mode_parse_or_block_falls_back() {
        assert_eq!(ViolationMode::parse_or_block("sanitize"), ViolationMode::Sanitize);
        assert_eq!(ViolationMode::parse_or_block("nonsense"), ViolationMode::Block);
    }

    #[test]
    fn bare_require_entry_dispatch() {
        assert_eq!(RequireEntry::from_id("safe_filename").target, ValidationTarget::Basename);
        assert_eq!(RequireEntry::from_id("path_in_uploads").target, ValidationTarget::FullPath);
    }

    #[test]
    fn default_mode_falls_back_to_block() {
        let policy = Policy {
            version: 1,
            defaults: Defaults { mode: None },
            validators: HashMap::new(),
            sinks: Vec::new(),
        };
        assert_eq!(policy.default_mode(), ViolationMode::Block);

        let policy = Policy {
            defaults: Defaults { mode: Some("whatever".to_string()) },
            ..policy
        };
        assert_eq!(policy.default_mode(), ViolationMode::Block);
    }
}
