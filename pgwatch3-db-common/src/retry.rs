use std::future::Future;
use std::time::Duration;

/// Retries `f` up to `attempts` times with a constant `delay` between tries.
/// Always calls `f` at least once, even if `attempts` is configured to 0.
/// Used solely at bootstrap time (connection-pool construction); the flush
/// path never retries — recovery there is the `force_recreate` pass, not a
/// retry loop.
pub async fn retry_constant<F, Fut, T, E>(
    attempts: u32,
    delay: Duration,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut last_err = match f().await {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };
    for _ in 1..attempts {
        tokio::time::sleep(delay).await;
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}
