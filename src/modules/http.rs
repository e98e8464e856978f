use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::search::{ModuleError, ModuleResult};

/// Build the client every module shares
pub fn build_client(user_agent: &str, timeout: Duration) -> ModuleResult<Client> {
    let client = Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Race `fut` against the token. Returns `ModuleError::Cancelled` as soon as
/// the token fires; the future is dropped, which aborts an in-flight request.
pub async fn cancellable<F, T>(token: &CancellationToken, fut: F) -> ModuleResult<T>
where
    F: Future<Output = ModuleResult<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ModuleError::Cancelled),
        result = fut => result,
    }
}

/// Fail fast if the token already fired
pub fn ensure_active(token: &CancellationToken) -> ModuleResult<()> {
    if token.is_cancelled() {
        Err(ModuleError::Cancelled)
    } else {
        Ok(())
    }
}

/// Send a request and decode the JSON body. 404 becomes `NotFound`, other
/// non-success statuses become `Status`.
pub async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    token: &CancellationToken,
) -> ModuleResult<T> {
    cancellable(token, async {
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().to_string();

        if status == StatusCode::NOT_FOUND {
            return Err(ModuleError::NotFound(url));
        }
        if !status.is_success() {
            return Err(ModuleError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    })
    .await
}

/// Fetch a page and return its status with the body text, without treating
/// non-success as an error. Used by probes that judge existence themselves.
pub async fn fetch_text(request: RequestBuilder) -> ModuleResult<(u16, String)> {
    let response = request.send().await?;
    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok((status, body))
}

/// Turn a failed sub-lookup of a composite module into an `{"error": ..}`
/// value so the other sources still count. Cancellation still propagates.
pub fn soft_fail(source: &str, result: ModuleResult<Value>) -> ModuleResult<Value> {
    match result {
        Err(ModuleError::Cancelled) => Err(ModuleError::Cancelled),
        Err(e) => {
            warn!("{} lookup failed: {}", source, e);
            Ok(json!({ "error": e.to_string() }))
        }
        ok => ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancellable_returns_value() {
        let token = CancellationToken::new();
        let value = cancellable(&token, async { Ok::<_, ModuleError>(7) }).await;
        assert_eq!(value.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancellable_aborts_pending_future() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waiter.cancel();
        });

        let result: ModuleResult<()> = cancellable(&token, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(ModuleError::Cancelled)));
    }

    #[test]
    fn test_soft_fail_keeps_cancellation() {
        assert!(soft_fail("whois", Err(ModuleError::Cancelled))
            .unwrap_err()
            .is_cancelled());

        let reported = soft_fail("whois", Err(ModuleError::Subprocess("exit 1".into()))).unwrap();
        assert!(reported["error"].as_str().unwrap().contains("exit 1"));

        assert_eq!(soft_fail("crt.sh", Ok(json!([1]))).unwrap(), json!([1]));
    }

    #[test]
    fn test_ensure_active() {
        let token = CancellationToken::new();
        assert!(ensure_active(&token).is_ok());
        token.cancel();
        assert!(ensure_active(&token).unwrap_err().is_cancelled());
    }
}
