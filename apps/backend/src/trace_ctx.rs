//! Task-local trace id of the request being served.
//!
//! `RequestTrace` opens the scope; problem-details bodies read it back.

use tokio::task_local;

pub const UNKNOWN: &str = "unknown";

task_local! {
    static TRACE_ID: String;
}

/// The current trace id, or `"unknown"` outside a request.
pub fn trace_id() -> String {
    TRACE_ID
        .try_with(Clone::clone)
        .unwrap_or_else(|_| UNKNOWN.to_string())
}

pub async fn with_trace_id<F, R>(trace_id: String, future: F) -> R
where
    F: std::future::Future<Output = R>,
{
    TRACE_ID.scope(trace_id, future).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scoped_and_unscoped() {
        assert_eq!(trace_id(), UNKNOWN);

        let seen = with_trace_id("req-1".into(), async {
            let inner = with_trace_id("req-2".into(), async { trace_id() }).await;
            (trace_id(), inner)
        })
        .await;

        assert_eq!(seen, ("req-1".to_string(), "req-2".to_string()));
        assert_eq!(trace_id(), UNKNOWN);
    }
}
