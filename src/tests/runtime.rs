use std::{future::Future, time::Duration};

#[cfg(all(feature = "tokio", not(feature = "smol")))]
pub(super) fn block_on<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::runtime::Runtime::new().unwrap().block_on(f)
}

#[cfg(feature = "smol")]
pub(super) fn block_on<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    smol::block_on(f)
}

#[cfg(all(feature = "tokio", not(feature = "smol")))]
pub(super) async fn async_sleep(d: Duration) {
    tokio::time::sleep(d).await;
}

#[cfg(feature = "smol")]
pub(super) async fn async_sleep(d: Duration) {
    smol::Timer::after(d).await;
}

/// `Some(output)` if `f` finishes within `d`; otherwise `f` is dropped unfinished.
pub(super) async fn timeout<F: Future>(d: Duration, f: F) -> Option<F::Output> {
    let f = std::pin::pin!(f);
    let sleep = std::pin::pin!(async_sleep(d));

    match futures::future::select(f, sleep).await {
        futures::future::Either::Left((output, _)) => Some(output),
        futures::future::Either::Right(_) => None,
    }
}
