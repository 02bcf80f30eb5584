// Lazy Draft-7 schema compilation with a process-wide cache

use jsonschema::Validator;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

static SCHEMA_CACHE: Lazy<RwLock<HashMap<String, Arc<Validator>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Load, parse, and compile the Draft-7 schema at `path`, consulting the
/// cache first.
///
/// Concurrent first loads may compile the same document twice; the last
/// store wins, which is benign because both validators are built from the
/// same file.
pub fn load_schema(path: &str) -> Result<Arc<Validator>, String> {
    if let Some(cached) = SCHEMA_CACHE
        .read()
        .ok()
        .and_then(|cache| cache.get(path).cloned())
    {
        return Ok(cached);
    }

    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let document: Value = serde_json::from_str(&raw).map_err(|e| e.to_string())?;
    let validator = jsonschema::draft7::new(&document).map_err(|e| e.to_string())?;
    let validator = Arc::new(validator);

    if let Ok(mut cache) = SCHEMA_CACHE.write() {
        cache.insert(path.to_string(), validator.clone());
    }
    Ok(validator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn caches_by_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"type": "string"}}"#).unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let first = load_schema(&path).unwrap();
        let second = load_schema(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_schema("/nonexistent/schema.json").is_err());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let path = file.path().to_string_lossy().into_owned();
        assert!(load_schema(&path).is_err());
    }
}
