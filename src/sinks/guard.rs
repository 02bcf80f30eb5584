// Sink guard facade - validates extracted strings before delegating

use crate::core::errors::GuardError;
use crate::core::policy::{Policy, SinkDef, ValidationTarget, ViolationMode};
use crate::engine::validators::{validate_str, Verdict};
use crate::sinks::SinkKind;
use crate::state::flow;
use crate::utils::audit_logger::{AuditEntry, AuditLogger};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::{Command, ExitStatus, Output};
use std::sync::Arc;

/// File-open intent for the `builtins.open` sink. Validation runs only on
/// write-like modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
    CreateNew,
    ReadWrite,
}

impl OpenMode {
    fn is_write_like(self) -> bool {
        !matches!(self, Self::Read)
    }

    fn open_options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            Self::Read => options.read(true),
            Self::Write => options.write(true).create(true).truncate(true),
            Self::Append => options.append(true).create(true),
            Self::CreateNew => options.write(true).create_new(true),
            Self::ReadWrite => options.read(true).write(true).create(true),
        };
        options
    }
}

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*)|(\$))")
        .expect("static placeholder pattern must compile")
});

/// The explicit interception facade.
///
/// Applications call these methods instead of the raw operations; the guard
/// extracts the string arguments each sink defines, runs the policy's
/// required validators over them, and delegates only when enforcement
/// passes. Cloning shares the underlying policy, so constructing or cloning
/// the facade any number of times composes no wrappers.
#[derive(Clone)]
pub struct SinkGuard {
    policy: Arc<Policy>,
    http: reqwest::Client,
}

impl SinkGuard {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self {
            policy,
            http: reqwest::Client::new(),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    // --- enforcement pipeline -------------------------------------------

    fn effective_mode(&self, sink: &SinkDef) -> ViolationMode {
        sink.on_violation
            .as_ref()
            .and_then(|o| o.mode)
            .unwrap_or_else(|| self.policy.default_mode())
    }

    fn effective_message(&self, sink: &SinkDef, vid: &str, reason: &str) -> String {
        sink.on_violation
            .as_ref()
            .and_then(|o| o.message.clone())
            .unwrap_or_else(|| format!("violation {vid}: {reason}"))
    }

    /// Run the enforcement algorithm for one sink invocation.
    ///
    /// Validators run in declaration order over strings in extraction
    /// order. Block mode raises on the first failure; warn mode records
    /// every failure and proceeds.
    fn enforce(&self, kind: SinkKind, strings: &[String]) -> Result<(), GuardError> {
        let fqn = kind.fingerprint();
        flow::record_flowpoint(fqn);

        let Some(sink) = self.policy.sink_for_function(fqn) else {
            return Ok(());
        };
        self.check_forbidden(sink, fqn)?;

        for entry in &sink.require {
            for s in strings {
                self.check_one(sink, fqn, &entry.id, s, None)?;
            }
        }
        Ok(())
    }

    fn check_forbidden(&self, sink: &SinkDef, fqn: &str) -> Result<(), GuardError> {
        if !sink.forbid_functions.iter().any(|f| f == fqn) {
            return Ok(());
        }
        let message = sink
            .on_violation
            .as_ref()
            .and_then(|o| o.message.clone())
            .unwrap_or_else(|| format!("function {fqn} is forbidden"));
        AuditLogger::log(&AuditEntry::blocked(fqn, &message, flow::current_flow()));
        Err(GuardError::PolicyViolation(message))
    }

    /// Validate one (validator, argument) pair, logging and applying the
    /// effective violation mode on failure.
    fn check_one(
        &self,
        sink: &SinkDef,
        fqn: &str,
        vid: &str,
        value: &str,
        paths: Option<(&str, &str)>,
    ) -> Result<(), GuardError> {
        let reason = match validate_str(&self.policy, vid, value) {
            Verdict::Accepted => return Ok(()),
            Verdict::Rejected { reason } => reason,
        };

        let mode = self.effective_mode(sink);
        let message = self.effective_message(sink, vid, &reason);
        let mut entry = AuditEntry::violation(fqn, vid, &reason, mode, flow::current_flow());
        if let Some((basename, full_path)) = paths {
            entry = entry.with_paths(basename, full_path);
        }
        AuditLogger::log(&entry);

        match mode {
            ViolationMode::Block => Err(GuardError::PolicyViolation(message)),
            // sanitize is reserved; it currently behaves as warn
            ViolationMode::Warn | ViolationMode::Sanitize => Ok(()),
        }
    }

    // --- file writes -----------------------------------------------------

    /// Open `path` with the given intent.
    ///
    /// Write-like modes are validated against the `builtins.open` sink.
    /// Each `require` entry's target decides whether the validator sees the
    /// basename or the full path. Interpreter bytecode-cache writes bypass
    /// the guard entirely.
    pub fn open(&self, path: impl AsRef<Path>, mode: OpenMode) -> Result<File, GuardError> {
        let path = path.as_ref();
        if mode.is_write_like() && !is_bytecode_cache(path) {
            self.enforce_open(path)?;
        }
        Ok(mode.open_options().open(path)?)
    }

    fn enforce_open(&self, path: &Path) -> Result<(), GuardError> {
        let fqn = SinkKind::Open.fingerprint();
        flow::record_flowpoint(fqn);

        let Some(sink) = self.policy.sink_for_function(fqn) else {
            return Ok(());
        };
        self.check_forbidden(sink, fqn)?;

        let full_path = path.to_string_lossy().into_owned();
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| full_path.clone());

        for entry in &sink.require {
            let value = match entry.target {
                ValidationTarget::Basename => &basename,
                ValidationTarget::FullPath => &full_path,
            };
            self.check_one(sink, fqn, &entry.id, value, Some((&basename, &full_path)))?;
        }
        Ok(())
    }

    // --- process execution -----------------------------------------------

    /// Run `program` with `args`, no shell involved.
    ///
    /// The program name and every argument are validated. Non-UTF-8
    /// arguments are decoded lossily (UTF-8 with replacement) for
    /// validation and passed to the child unchanged.
    pub fn run<S: AsRef<OsStr>>(&self, program: S, args: &[S]) -> Result<Output, GuardError> {
        let mut strings = vec![program.as_ref().to_string_lossy().into_owned()];
        strings.extend(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()));
        self.enforce(SinkKind::SubprocessRun, &strings)?;

        Ok(Command::new(program.as_ref())
            .args(args.iter().map(AsRef::as_ref))
            .output()?)
    }

    /// Run a full command line through the shell.
    pub fn run_shell(&self, command: &str) -> Result<Output, GuardError> {
        self.enforce(SinkKind::SubprocessRun, &[command.to_string()])?;
        Ok(Command::new("sh").arg("-c").arg(command).output()?)
    }

    /// Shell out and report only the exit status.
    pub fn system(&self, command: &str) -> Result<ExitStatus, GuardError> {
        self.enforce(SinkKind::OsSystem, &[command.to_string()])?;
        Ok(Command::new("sh").arg("-c").arg(command).status()?)
    }

    // --- deserialization -------------------------------------------------

    /// Unsafe YAML loading is forbidden unconditionally; the call never
    /// proceeds.
    pub fn yaml_load(&self, _input: &str) -> Result<serde_yaml::Value, GuardError> {
        let fqn = SinkKind::YamlLoad.fingerprint();
        flow::record_flowpoint(fqn);
        let reason = "yaml.load is forbidden; use yaml.safe_load";
        AuditLogger::log(&AuditEntry::blocked(fqn, reason, flow::current_flow()));
        Err(GuardError::PolicyViolation(reason.to_string()))
    }

    /// Safe YAML parsing; no validation applies.
    pub fn yaml_safe_load(&self, input: &str) -> Result<serde_yaml::Value, GuardError> {
        flow::record_flowpoint(SinkKind::YamlSafeLoad.fingerprint());
        Ok(serde_yaml::from_str(input)?)
    }

    // --- SQL -------------------------------------------------------------

    /// Open a SQLite database whose statements are validated before
    /// execution.
    pub fn connect_sqlite(&self, path: impl AsRef<Path>) -> Result<GuardedConnection, GuardError> {
        let conn = rusqlite::Connection::open(path)?;
        Ok(GuardedConnection {
            guard: self.clone(),
            conn,
        })
    }

    // --- templates -------------------------------------------------------

    /// Render a template with the given context.
    ///
    /// The template source and every string or numeric context value are
    /// validated before the engine sees the template.
    pub fn render_template(
        &self,
        source: &str,
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, GuardError> {
        let mut strings = vec![source.to_string()];
        strings.extend(context.values().filter_map(scalar_to_string));
        self.enforce(SinkKind::JinjaRender, &strings)?;

        let env = minijinja::Environment::new();
        let template = env.template_from_str(source)?;
        Ok(template.render(context)?)
    }

    /// Substitute `$name` / `${name}` placeholders in `template`.
    ///
    /// The template source and every substitution value are validated. A
    /// placeholder without a binding is a delegation error, not a policy
    /// violation; `$$` escapes a literal dollar sign.
    pub fn substitute(
        &self,
        template: &str,
        vars: &HashMap<String, String>,
    ) -> Result<String, GuardError> {
        let mut strings = vec![template.to_string()];
        strings.extend(vars.values().cloned());
        self.enforce(SinkKind::StrTemplateSubstitute, &strings)?;

        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in PLACEHOLDER_RE.captures_iter(template) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&template[last..whole.start()]);
            if caps.get(3).is_some() {
                out.push('$');
            } else {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|g| g.as_str())
                    .unwrap_or_default();
                let value = vars
                    .get(name)
                    .ok_or_else(|| GuardError::MissingVariable(name.to_string()))?;
                out.push_str(value);
            }
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }

    // --- outbound HTTP ---------------------------------------------------

    /// SSRF-guarded GET; only the URL is validated.
    pub async fn http_get(&self, url: &str) -> Result<reqwest::Response, GuardError> {
        self.enforce(SinkKind::RequestsGet, &[url.to_string()])?;
        Ok(self.http.get(url).send().await?)
    }

    /// SSRF-guarded POST with an optional JSON body; only the URL is
    /// validated.
    pub async fn http_post(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, GuardError> {
        self.enforce(SinkKind::RequestsPost, &[url.to_string()])?;
        Ok(self.http.post(url).json(body).send().await?)
    }

    /// `urllib`-style URL open, validated under its own sink name.
    pub async fn urlopen(&self, url: &str) -> Result<reqwest::Response, GuardError> {
        self.enforce(SinkKind::UrllibUrlopen, &[url.to_string()])?;
        Ok(self.http.get(url).send().await?)
    }
}

/// A SQLite connection whose statements pass through the guard. Only the
/// SQL text is validated; bound parameters are never inspected.
pub struct GuardedConnection {
    guard: SinkGuard,
    conn: rusqlite::Connection,
}

impl GuardedConnection {
    /// Execute a single statement, returning the number of affected rows.
    pub fn execute<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<usize, GuardError> {
        self.guard
            .enforce(SinkKind::SqliteExecute, &[sql.to_string()])?;
        Ok(self.conn.execute(sql, params)?)
    }

    /// Execute one statement once per parameter set.
    pub fn execute_many<P>(
        &self,
        sql: &str,
        param_sets: impl IntoIterator<Item = P>,
    ) -> Result<usize, GuardError>
    where
        P: rusqlite::Params,
    {
        self.guard
            .enforce(SinkKind::SqliteExecuteMany, &[sql.to_string()])?;
        let mut statement = self.conn.prepare(sql)?;
        let mut affected = 0;
        for params in param_sets {
            affected += statement.execute(params)?;
        }
        Ok(affected)
    }

    /// Run a query, mapping every row through `f`.
    pub fn query<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Vec<T>, GuardError>
    where
        P: rusqlite::Params,
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        self.guard
            .enforce(SinkKind::SqliteExecute, &[sql.to_string()])?;
        let mut statement = self.conn.prepare(sql)?;
        let rows = statement.query_map(params, f)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Interpreter bytecode-cache writes bypass the guard.
fn is_bytecode_cache(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == "__pycache__")
        || path.extension().map_or(false, |ext| ext == "pyc")
}

/// Template context values that take part in validation: strings and
/// numbers, stringified.
fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
