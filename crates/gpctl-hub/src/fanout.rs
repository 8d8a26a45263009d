//! Parallel fan-out with an explicit join point.
//!
//! Every task runs on its own tokio task and every task is awaited before the
//! caller proceeds; there is no early cancellation. The two primitives only
//! differ in how failures are reported:
//!
//! - [`execute_first_err`]: the first failure, in completion order
//! - [`execute_join_err`]: every failure, combined into [`HubError::Multiple`]
//!
//! Side effects of tasks that succeeded are never rolled back here.

use crate::error::{HubError, Result};
use crate::pool::AgentConn;
use std::future::Future;
use tokio::task::JoinSet;

/// Runs all tasks concurrently, waits for all of them, and returns their
/// outputs or the first error observed.
pub async fn execute_first_err<I, F, T>(tasks: I) -> Result<Vec<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut outputs = Vec::new();
    let mut first = None;

    for result in join_all(tasks).await {
        match result {
            Ok(output) => outputs.push(output),
            Err(err) => {
                first.get_or_insert(err);
            }
        }
    }

    match first {
        Some(err) => Err(err),
        None => Ok(outputs),
    }
}

/// Runs all tasks concurrently, waits for all of them, and returns their
/// outputs or all errors joined together.
pub async fn execute_join_err<I, F, T>(tasks: I) -> Result<Vec<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut outputs = Vec::new();
    let mut errors = Vec::new();

    for result in join_all(tasks).await {
        match result {
            Ok(output) => outputs.push(output),
            Err(err) => errors.push(err),
        }
    }

    match HubError::join(errors) {
        Some(err) => Err(err),
        None => Ok(outputs),
    }
}

/// Results in completion order; a panicked task becomes a [`HubError::Join`].
async fn join_all<I, F, T>(tasks: I) -> Vec<Result<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut set = JoinSet::new();
    for task in tasks {
        set.spawn(task);
    }

    let mut results = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        results.push(joined.unwrap_or_else(|e| Err(HubError::Join(e))));
    }
    results
}

/// Runs `op` against every connection, first error wins.
pub async fn execute_rpc<Op, F>(conns: &[AgentConn], op: Op) -> Result<()>
where
    Op: Fn(AgentConn) -> F,
    F: Future<Output = Result<()>> + Send + 'static,
{
    execute_first_err(conns.iter().cloned().map(op)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn failing(host: &str, delay_ms: u64) -> impl Future<Output = Result<u32>> + Send + 'static {
        let host = host.to_string();
        async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Err(HubError::MissingConnection(host))
        }
    }

    #[tokio::test]
    async fn test_first_err_returns_earliest_failure() {
        let tasks: Vec<std::pin::Pin<Box<dyn Future<Output = Result<u32>> + Send>>> = vec![
            Box::pin(failing("slow", 200)),
            Box::pin(async { Ok::<u32, HubError>(1) }),
            Box::pin(failing("fast", 10)),
        ];
        let err = execute_first_err(tasks).await.unwrap_err();
        assert!(err.to_string().contains("fast"));
    }

    #[tokio::test]
    async fn test_first_err_waits_for_every_task() {
        let finished = Arc::new(AtomicUsize::new(0));
        let tasks = (0..4u64).map(|i| {
            let finished = finished.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20 * i)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                if i == 0 {
                    Err(HubError::Catalog("first".into()))
                } else {
                    Ok::<u64, HubError>(i)
                }
            }
        });

        assert!(execute_first_err(tasks).await.is_err());
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_join_err_reports_every_failure() {
        let tasks = ["sdw1", "sdw2", "sdw3"].into_iter().map(|host| failing(host, 1));
        let err = execute_join_err(tasks).await.unwrap_err();
        match err {
            HubError::Multiple(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected Multiple, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_outputs_collected_on_success() {
        let tasks = (1..=3u32).map(|i| async move { Ok::<_, HubError>(i * 10) });
        let mut outputs = execute_join_err(tasks).await.unwrap();
        outputs.sort();
        assert_eq!(outputs, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_panicking_task_becomes_error() {
        let tasks = vec![async {
            if true {
                panic!("agent task blew up");
            }
            Ok::<(), HubError>(())
        }];
        let err = execute_first_err(tasks).await.unwrap_err();
        assert!(matches!(err, HubError::Join(_)));
    }
}
