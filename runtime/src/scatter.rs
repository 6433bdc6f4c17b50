//! Scatter-gather over independent fallible tasks.
//!
//! Every task is spawned onto its own tokio task through a [`JoinSet`], so the
//! queries behind them really overlap. Results come back in input order. The
//! first failure aborts the siblings that are still running and is returned to
//! the caller; dropping the returned future aborts everything as well.
//!
//! # Example
//!
//! ```rust
//! use ticket_stock_runtime::scatter::{try_join_all, Task};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let tasks: Vec<Task<u32, String>> = vec![
//!     Box::pin(async { Ok(1) }),
//!     Box::pin(async { Ok(2) }),
//! ];
//! let values = try_join_all(tasks).await.map_err(|e| e.to_string());
//! assert_eq!(values, Ok(vec![1, 2]));
//! # }
//! ```

use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};

/// A boxed unit of work handed to the scatter-gather.
pub type Task<T, E> = BoxFuture<'static, Result<T, E>>;

/// Why a scatter-gather did not produce all of its results.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScatterError<E> {
    /// One of the tasks returned an error.
    #[error("{0}")]
    Failed(E),

    /// One of the tasks panicked.
    #[error("scatter task panicked: {0}")]
    Panicked(String),

    /// A task was cancelled before it produced a result.
    #[error("scatter task was cancelled")]
    Cancelled,
}

impl<E> ScatterError<E> {
    /// Convert the task error, keeping the panic/cancel cases.
    pub fn map<F>(self, f: impl FnOnce(E) -> F) -> ScatterError<F> {
        match self {
            Self::Failed(e) => ScatterError::Failed(f(e)),
            Self::Panicked(msg) => ScatterError::Panicked(msg),
            Self::Cancelled => ScatterError::Cancelled,
        }
    }
}

fn settle<T, E>(joined: Result<Result<T, E>, JoinError>) -> Result<T, ScatterError<E>> {
    match joined {
        Ok(result) => result.map_err(ScatterError::Failed),
        Err(err) if err.is_panic() => {
            let payload = err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ScatterError::Panicked(message))
        }
        Err(_) => Err(ScatterError::Cancelled),
    }
}

/// Run every task concurrently and collect their results in input order.
///
/// # Errors
///
/// Returns the first failure observed (in completion order). All tasks still
/// running at that point are aborted.
pub async fn try_join_all<T, E>(tasks: Vec<Task<T, E>>) -> Result<Vec<T>, ScatterError<E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let total = tasks.len();
    let mut set = JoinSet::new();
    for (index, task) in tasks.into_iter().enumerate() {
        set.spawn(task.map(move |result| result.map(|value| (index, value))));
    }

    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();
    while let Some(joined) = set.join_next().await {
        match settle(joined) {
            Ok((index, value)) => slots[index] = Some(value),
            Err(err) => {
                set.abort_all();
                tracing::debug!(total, "scatter-gather aborted on first failure");
                return Err(err);
            }
        }
    }

    slots
        .into_iter()
        .map(|slot| slot.ok_or(ScatterError::Cancelled))
        .collect()
}

enum Either<A, B> {
    Left(A),
    Right(B),
}

/// Run two differently-typed tasks concurrently.
///
/// # Errors
///
/// Returns whichever failure is observed first; the other task is aborted.
pub async fn try_join2<A, B, E, FA, FB>(left: FA, right: FB) -> Result<(A, B), ScatterError<E>>
where
    A: Send + 'static,
    B: Send + 'static,
    E: Send + 'static,
    FA: Future<Output = Result<A, E>> + Send + 'static,
    FB: Future<Output = Result<B, E>> + Send + 'static,
{
    let tasks: Vec<Task<Either<A, B>, E>> = vec![
        left.map(|r| r.map(Either::Left)).boxed(),
        right.map(|r| r.map(Either::Right)).boxed(),
    ];

    let mut a = None;
    let mut b = None;
    for value in try_join_all(tasks).await? {
        match value {
            Either::Left(v) => a = Some(v),
            Either::Right(v) => b = Some(v),
        }
    }

    match (a, b) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(ScatterError::Cancelled),
    }
}
