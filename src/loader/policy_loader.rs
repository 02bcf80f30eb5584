// YAML policy loading - parse the declarative policy document into the model

use crate::core::errors::GuardError;
use crate::core::policy::{
    Defaults, JsonSchemaParams, OnViolation, PathParams, Policy, RequireEntry, SinkDef,
    StringParams, ValidationTarget, ValidatorDef, ValidatorParams, ViolationMode,
};
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::Path;

/// Load a policy document from a YAML file.
///
/// Structural problems are hard errors that should halt process startup.
/// Unknown keys anywhere in the document are ignored for forward
/// compatibility.
pub fn load_policy<P: AsRef<Path>>(path: P) -> Result<Policy, GuardError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        GuardError::Configuration(format!("failed to read policy file {}: {e}", path.display()))
    })?;
    load_policy_str(&raw)
}

/// Load a policy document from a YAML string.
pub fn load_policy_str(raw: &str) -> Result<Policy, GuardError> {
    let doc: Value = serde_yaml::from_str(raw)
        .map_err(|e| GuardError::Configuration(format!("failed to parse policy YAML: {e}")))?;
    parse_policy(&doc)
}

fn config_err(msg: impl Into<String>) -> GuardError {
    GuardError::Configuration(msg.into())
}

fn parse_policy(doc: &Value) -> Result<Policy, GuardError> {
    if !doc.is_mapping() {
        return Err(config_err("policy document must be a mapping"));
    }

    let version = doc.get("version").and_then(Value::as_i64).unwrap_or(1);
    let defaults = Defaults {
        mode: doc
            .get("defaults")
            .and_then(|d| d.get("mode"))
            .and_then(Value::as_str)
            .map(str::to_string),
    };
    let validators = parse_validators(doc.get("validators"))?;
    let sinks = parse_sinks(doc.get("sinks"))?;

    Ok(Policy {
        version,
        defaults,
        validators,
        sinks,
    })
}

fn parse_validators(items: Option<&Value>) -> Result<HashMap<String, ValidatorDef>, GuardError> {
    let mut out = HashMap::new();
    let Some(items) = items else {
        return Ok(out);
    };
    let list = items
        .as_sequence()
        .ok_or_else(|| config_err("'validators' must be a sequence"))?;

    for item in list {
        let id = non_empty_str(item.get("id"))
            .ok_or_else(|| config_err("validator missing id or type"))?;
        let vtype = non_empty_str(item.get("type"))
            .ok_or_else(|| config_err("validator missing id or type"))?;

        // Either wire shape: a nested `params:` mapping, or the
        // type-specific keys inlined on the validator entry itself.
        let params_src = match item.get("params") {
            Some(v) if v.is_mapping() => v,
            Some(Value::Null) | None => item,
            Some(_) => {
                return Err(config_err(format!(
                    "validator '{id}': params must be a mapping"
                )))
            }
        };

        let params = match vtype {
            "string" => ValidatorParams::Str(parse_string_params(id, params_src)?),
            "path" => ValidatorParams::Path(parse_path_params(id, params_src)?),
            "json_schema" => {
                let schema_ref = non_empty_str(params_src.get("schema_ref")).ok_or_else(|| {
                    config_err(format!("validator '{id}': json_schema requires schema_ref"))
                })?;
                ValidatorParams::JsonSchema(JsonSchemaParams {
                    schema_ref: schema_ref.to_string(),
                })
            }
            other => {
                return Err(config_err(format!(
                    "validator '{id}': unknown validator type '{other}'"
                )))
            }
        };

        out.insert(
            id.to_string(),
            ValidatorDef {
                id: id.to_string(),
                params,
            },
        );
    }
    Ok(out)
}

fn parse_string_params(id: &str, src: &Value) -> Result<StringParams, GuardError> {
    Ok(StringParams {
        max_len: opt_usize(id, src, "max_len")?,
        min_len: opt_usize(id, src, "min_len")?,
        match_regex: opt_string(id, src, "match_regex")?,
        allow_charset: opt_string(id, src, "allow_charset")?,
        deny_regex: opt_string(id, src, "deny_regex")?,
        deny_substrings: opt_string_list(id, src, "deny_substrings")?.unwrap_or_default(),
    })
}

fn parse_path_params(id: &str, src: &Value) -> Result<PathParams, GuardError> {
    Ok(PathParams {
        allowed_roots: opt_string_list(id, src, "allowed_roots")?.unwrap_or_default(),
        deny_subdirectories: src
            .get("deny_subdirectories")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn parse_sinks(items: Option<&Value>) -> Result<Vec<SinkDef>, GuardError> {
    let mut out = Vec::new();
    let Some(items) = items else {
        return Ok(out);
    };
    let list = items
        .as_sequence()
        .ok_or_else(|| config_err("'sinks' must be a sequence"))?;

    for item in list {
        let id = non_empty_str(item.get("id")).ok_or_else(|| config_err("sink missing id"))?;
        let function = non_empty_str(item.get("function"))
            .ok_or_else(|| config_err(format!("sink '{id}': missing function")))?;

        let require = parse_require(id, item.get("require"))?;
        let on_violation = parse_on_violation(id, item.get("on_violation"))?;
        let forbid_functions = opt_string_list(id, item, "forbid_functions")?.unwrap_or_default();

        out.push(SinkDef {
            id: id.to_string(),
            function: function.to_string(),
            require,
            on_violation,
            forbid_functions,
        });
    }
    Ok(out)
}

/// A `require` entry is either a bare validator id or a mapping
/// `{ id, target: basename|fullpath }`.
fn parse_require(sink_id: &str, items: Option<&Value>) -> Result<Vec<RequireEntry>, GuardError> {
    let mut out = Vec::new();
    let Some(items) = items else {
        return Ok(out);
    };
    let list = items
        .as_sequence()
        .ok_or_else(|| config_err(format!("sink '{sink_id}': 'require' must be a sequence")))?;

    for entry in list {
        match entry {
            Value::String(id) => out.push(RequireEntry::from_id(id.clone())),
            Value::Mapping(_) => {
                let id = non_empty_str(entry.get("id")).ok_or_else(|| {
                    config_err(format!("sink '{sink_id}': require entry missing id"))
                })?;
                let parsed = match entry.get("target").and_then(Value::as_str) {
                    None => RequireEntry::from_id(id),
                    Some("basename") => RequireEntry {
                        id: id.to_string(),
                        target: ValidationTarget::Basename,
                    },
                    Some("fullpath") => RequireEntry {
                        id: id.to_string(),
                        target: ValidationTarget::FullPath,
                    },
                    Some(other) => {
                        return Err(config_err(format!(
                            "sink '{sink_id}': require entry '{id}' has invalid target \
                             '{other}' (must be basename or fullpath)"
                        )))
                    }
                };
                out.push(parsed);
            }
            _ => {
                return Err(config_err(format!(
                    "sink '{sink_id}': require entries must be strings or mappings"
                )))
            }
        }
    }
    Ok(out)
}

fn parse_on_violation(
    sink_id: &str,
    value: Option<&Value>,
) -> Result<Option<OnViolation>, GuardError> {
    let Some(value) = value else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    if !value.is_mapping() {
        return Err(config_err(format!(
            "sink '{sink_id}': 'on_violation' must be a mapping"
        )));
    }

    let mode = match value.get("mode").and_then(Value::as_str) {
        None => None,
        Some(raw) => Some(ViolationMode::parse_strict(raw).ok_or_else(|| {
            config_err(format!(
                "sink '{sink_id}': invalid mode '{raw}' (must be block, warn, or sanitize)"
            ))
        })?),
    };
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Some(OnViolation { mode, message }))
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn opt_usize(id: &str, src: &Value, key: &str) -> Result<Option<usize>, GuardError> {
    match src.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| config_err(format!("validator '{id}': '{key}' must be a non-negative integer"))),
    }
}

fn opt_string(id: &str, src: &Value, key: &str) -> Result<Option<String>, GuardError> {
    match src.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| config_err(format!("validator '{id}': '{key}' must be a string"))),
    }
}

fn opt_string_list(id: &str, src: &Value, key: &str) -> Result<Option<Vec<String>>, GuardError> {
    match src.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Sequence(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let s = item.as_str().ok_or_else(|| {
                    config_err(format!("validator '{id}': '{key}' entries must be strings"))
                })?;
                out.push(s.to_string());
            }
            Ok(Some(out))
        }
        Some(_) => Err(config_err(format!(
            "validator '{id}': '{key}' must be a sequence of strings"
        ))),
    }
}
