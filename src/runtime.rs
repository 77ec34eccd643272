use std::{future::Future, time::Duration};

use crate::FlashStockError;

#[cfg(not(any(feature = "tokio", feature = "smol")))]
compile_error!("flashstock needs an async runtime: enable the `tokio` or the `smol` feature");

// async-io timers run on their own reactor thread and work under any executor, so smol
// wins when both features are enabled
#[cfg(feature = "smol")]
pub(crate) async fn sleep(duration: Duration) {
    smol::Timer::after(duration).await;
}

#[cfg(all(feature = "tokio", not(feature = "smol")))]
pub(crate) async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Panics outside a tokio runtime.
#[cfg(all(feature = "tokio", not(feature = "smol")))]
pub(crate) fn spawn_task<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(fut);
}

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(crate) fn spawn_task<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    smol::spawn(fut).detach();
}

// stay on the caller's tokio runtime when there is one so tokio-bound IO keeps its reactor
#[cfg(all(feature = "tokio", feature = "smol"))]
pub(crate) fn spawn_task<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(fut);
        }
        Err(_) => smol::spawn(fut).detach(),
    }
}

/// Drive `fut` to completion on a detached task and wait for its output.
///
/// Dropping the returned future stops the wait, not `fut`.
pub(crate) async fn run_detached<F, T>(fut: F) -> Result<T, FlashStockError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = futures::channel::oneshot::channel();

    spawn_task(async move {
        if tx.send(fut.await).is_err() {
            tracing::debug!("detached task finished after its caller went away");
        }
    });

    rx.await.map_err(|_| {
        FlashStockError::StoreUnavailable("detached task dropped before finishing".to_string())
    })
}
