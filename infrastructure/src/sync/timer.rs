use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

/// Runs `f` once per `period`, starting immediately, until it breaks.
///
/// A round that overruns the period delays the next one instead of causing a
/// burst of catch-up rounds.
pub async fn repeat<T, F, Fut>(period: Duration, mut f: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ControlFlow<T>>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        if let ControlFlow::Break(ret) = f().await {
            break ret;
        }
    }
}

/// Like [`repeat`], but gives up with `None` once `shutdown` completes.
///
/// A round already in progress is dropped at shutdown.
pub async fn repeat_until<T, F, Fut, S>(period: Duration, shutdown: S, f: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ControlFlow<T>>,
    S: Future,
{
    tokio::select! {
        ret = repeat(period, f) => Some(ret),
        _ = shutdown => None,
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn breaks_after_rounds() {
        let start = Instant::now();
        let mut rounds = 0;

        let ret = repeat(Duration::from_secs(10), || {
            rounds += 1;
            let n = rounds;
            async move {
                if n == 3 {
                    ControlFlow::Break(n * 2)
                } else {
                    ControlFlow::Continue(())
                }
            }
        })
        .await;

        assert_eq!(6, ret);
        assert_eq!(Duration::from_secs(20), start.elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_loop() {
        let ret = repeat_until(
            Duration::from_secs(1),
            tokio::time::sleep(Duration::from_millis(3500)),
            || async { ControlFlow::<()>::Continue(()) },
        )
        .await;

        assert_eq!(None, ret);
    }
}
