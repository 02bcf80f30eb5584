// Taint flow tracking - per-request ordered list of interception points

use std::cell::RefCell;
use std::future::Future;

tokio::task_local! {
    /// Ordered labels of the guard points tainted data has traversed during
    /// the current request. Absent outside a request scope.
    static TAINT_FLOW: RefCell<Vec<String>>;
}

/// Record that data reached the interception point `label`.
///
/// Consecutive duplicates collapse: if the tail of the stack already equals
/// `label` the append is suppressed. Outside a request scope (CLI, worker
/// tasks that did not inherit the scope) this is a silent no-op.
pub fn record_flowpoint(label: &str) {
    let _ = TAINT_FLOW.try_with(|flow| {
        let mut flow = flow.borrow_mut();
        if flow.last().map(String::as_str) != Some(label) {
            flow.push(label.to_string());
        }
    });
}

/// Snapshot of the current flow stack; empty outside a request scope.
pub fn current_flow() -> Vec<String> {
    TAINT_FLOW
        .try_with(|flow| flow.borrow().clone())
        .unwrap_or_default()
}

/// Run `fut` with a fresh flow stack seeded with `initial`. Concurrent
/// requests each see their own stack.
pub async fn with_flow<F>(initial: Vec<String>, fut: F) -> F::Output
where
    F: Future,
{
    TAINT_FLOW.scope(RefCell::new(initial), fut).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_and_collapses_duplicates() {
        let flow = with_flow(vec!["http_request".to_string()], async {
            record_flowpoint("middleware:json_parsing");
            record_flowpoint("subprocess.run");
            record_flowpoint("subprocess.run");
            record_flowpoint("subprocess.run");
            current_flow()
        })
        .await;

        assert_eq!(
            flow,
            ["http_request", "middleware:json_parsing", "subprocess.run"]
        );
    }

    #[tokio::test]
    async fn non_adjacent_duplicates_are_kept() {
        let flow = with_flow(Vec::new(), async {
            record_flowpoint("a");
            record_flowpoint("b");
            record_flowpoint("a");
            current_flow()
        })
        .await;

        assert_eq!(flow, ["a", "b", "a"]);
    }

    #[test]
    fn silent_noop_outside_scope() {
        record_flowpoint("subprocess.run");
        assert!(current_flow().is_empty());
    }

    #[tokio::test]
    async fn concurrent_scopes_are_isolated() {
        let (a, b) = tokio::join!(
            with_flow(vec!["a".to_string()], async {
                tokio::task::yield_now().await;
                record_flowpoint("one");
                current_flow()
            }),
            with_flow(vec!["b".to_string()], async {
                record_flowpoint("two");
                tokio::task::yield_now().await;
                current_flow()
            }),
        );

        assert_eq!(a, ["a", "one"]);
        assert_eq!(b, ["b", "two"]);
    }
}
