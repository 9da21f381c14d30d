use std::future::{Future, IntoFuture};

use futures::future::{self, BoxFuture, FutureExt, Shared};

/// A value that is not known synchronously.
///
/// A [Deferred] resolves at most once and may be observed by any number of
/// consumers: cloning a [Deferred] clones the handle, not the work. Consumers
/// attach continuations with [Deferred::apply] and [Deferred::and_then]
/// rather than blocking on the value, so one slow chain never stalls an
/// unrelated one.
///
/// A rejected [Deferred] rejects every continuation attached to it with the
/// same error. Failures therefore stay scoped to the dependency subtree that
/// is rooted at the failed step.
///
/// ```rust
/// # use tether_common::Deferred;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let arn: Deferred<String, String> = Deferred::resolved("arn:aws:iam::111:role/ci".into());
/// let secret = arn.apply(|arn| format!("IDENTITY_ROLE_ARN={arn}"));
///
/// assert_eq!(secret.await, Ok("IDENTITY_ROLE_ARN=arn:aws:iam::111:role/ci".to_string()));
/// # }
/// ```
pub struct Deferred<T, E>
where
    T: Clone,
    E: Clone,
{
    inner: Shared<BoxFuture<'static, Result<T, E>>>,
}

impl<T, E> Clone for Deferred<T, E>
where
    T: Clone,
    E: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> std::fmt::Debug for Deferred<T, E>
where
    T: Clone + std::fmt::Debug,
    E: Clone + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.peek() {
            Some(result) => f.debug_tuple("Deferred").field(result).finish(),
            None => f.write_str("Deferred(<pending>)"),
        }
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wrap a future whose output becomes the deferred value.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            inner: future.boxed().shared(),
        }
    }

    /// A deferred value that is already known.
    pub fn resolved(value: T) -> Self {
        Self::new(future::ready(Ok(value)))
    }

    /// A deferred value that has already failed.
    pub fn rejected(error: E) -> Self {
        Self::new(future::ready(Err(error)))
    }

    /// Start driving the underlying work on the ambient tokio runtime, so it
    /// makes progress even before anyone awaits it. Without a runtime the
    /// work stays lazy and runs when first awaited.
    pub fn spawn(self) -> Self {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(self.inner.clone().map(|_| ()));
        }
        self
    }

    /// Attach a synchronous continuation.
    pub fn apply<U, F>(&self, f: F) -> Deferred<U, E>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let this = self.inner.clone();
        Deferred::new(async move { this.await.map(f) })
    }

    /// Attach a continuation that itself produces deferred work.
    pub fn and_then<U, F, Fut>(&self, f: F) -> Deferred<U, E>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<U, E>> + Send + 'static,
    {
        let this = self.inner.clone();
        Deferred::new(async move { f(this.await?).await })
    }

    /// Combine two deferred values. Rejects with the first observed failure.
    pub fn zip<U>(&self, other: &Deferred<U, E>) -> Deferred<(T, U), E>
    where
        U: Clone + Send + Sync + 'static,
    {
        let left = self.inner.clone();
        let right = other.inner.clone();
        Deferred::new(async move { future::try_join(left, right).await })
    }

    /// Wait for every deferred value, preserving input order.
    pub fn all<I>(values: I) -> Deferred<Vec<T>, E>
    where
        I: IntoIterator<Item = Deferred<T, E>>,
    {
        let pending = values
            .into_iter()
            .map(|value| value.inner)
            .collect::<Vec<_>>();
        Deferred::new(future::try_join_all(pending))
    }

    /// Observe the value without waiting, if it has already settled.
    pub fn peek(&self) -> Option<Result<T, E>> {
        self.inner.peek().cloned()
    }
}

impl<T, E> IntoFuture for Deferred<T, E>
where
    T: Clone,
    E: Clone,
{
    type Output = Result<T, E>;
    type IntoFuture = Shared<BoxFuture<'static, Result<T, E>>>;

    fn into_future(self) -> Self::IntoFuture {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use testresult::TestResult;

    use super::Deferred;

    #[tokio::test]
    async fn it_resolves_continuations_in_order() -> TestResult {
        let region: Deferred<String, String> = Deferred::resolved("eu-west-1".into());
        let arn = Deferred::resolved("arn:aws:iam::111:role/ci-svc".to_string());

        let pair = arn.zip(&region).apply(|(arn, region)| format!("{arn}@{region}"));

        assert_eq!(pair.await?, "arn:aws:iam::111:role/ci-svc@eu-west-1");
        Ok(())
    }

    #[tokio::test]
    async fn it_propagates_rejection_to_dependents_only() {
        let failed: Deferred<String, String> = Deferred::rejected("role".into());
        let healthy: Deferred<String, String> = Deferred::resolved("pool".into());

        let dependent = failed.and_then(|value| async move { Ok(format!("{value}/binding")) });
        let sibling = healthy.apply(|value| format!("{value}/provider"));

        assert_eq!(dependent.await, Err("role".to_string()));
        assert_eq!(sibling.await, Ok("pool/provider".to_string()));
    }

    #[tokio::test]
    async fn it_runs_shared_work_once() -> TestResult {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let trust: Deferred<u32, String> = Deferred::new(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        });

        let first = trust.apply(|id| id + 1);
        let second = trust.apply(|id| id + 2);

        assert_eq!(Deferred::all([first, second]).await?, vec![8, 9]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn it_makes_progress_when_spawned() -> TestResult {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let deferred: Deferred<(), String> = Deferred::new(async move {
            let _ = tx.send(());
            Ok(())
        })
        .spawn();

        rx.await?;
        tokio::task::yield_now().await;
        deferred.await?;
        Ok(())
    }

    #[test]
    fn it_can_be_peeked_once_settled() {
        let value: Deferred<u8, String> = Deferred::resolved(1);
        assert_eq!(value.peek(), None);

        let value = futures::executor::block_on(async {
            let _ = value.clone().await;
            value
        });
        assert_eq!(value.peek(), Some(Ok(1)));
    }
}
