// Sink registry - fixed mapping from guarded operations to policy keys

pub mod guard;

pub use guard::{GuardedConnection, OpenMode, SinkGuard};

/// The fixed set of guarded operations.
///
/// Each variant carries the fully-qualified function name that identifies
/// the sink in policy documents and violation records. The names are the
/// stable wire contract; the facade methods on [`SinkGuard`] are the Rust
/// binding to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    Open,
    SubprocessRun,
    OsSystem,
    YamlLoad,
    YamlSafeLoad,
    SqliteExecute,
    SqliteExecuteMany,
    JinjaRender,
    StrTemplateSubstitute,
    RequestsGet,
    RequestsPost,
    UrllibUrlopen,
}

impl SinkKind {
    /// Canonical policy key for this sink.
    pub fn fingerprint(self) -> &'static str {
        match self {
            Self::Open => "builtins.open",
            Self::SubprocessRun => "subprocess.run",
            Self::OsSystem => "os.system",
            Self::YamlLoad => "yaml.load",
            Self::YamlSafeLoad => "yaml.safe_load",
            Self::SqliteExecute => "sqlite3.Cursor.execute",
            Self::SqliteExecuteMany => "sqlite3.Cursor.executemany",
            Self::JinjaRender => "jinja2.Template.render",
            Self::StrTemplateSubstitute => "string.Template.substitute",
            Self::RequestsGet => "requests.get",
            Self::RequestsPost => "requests.post",
            Self::UrllibUrlopen => "urllib.request.urlopen",
        }
    }
}
