use tracing::debug;
use workscope_k8s::ClusterGateway;
use workscope_types::LogEntry;

use crate::{LogError, LogOptions, LogParser};

/// Read and parse the logs of one pod container
pub async fn get_pod_logs(
    gateway: &dyn ClusterGateway,
    namespace: &str,
    pod: &str,
    options: &LogOptions,
) -> Result<Vec<LogEntry>, LogError> {
    let request = options.pod_log_request();
    let raw = gateway.pod_logs(namespace, pod, &request).await?;

    let entries = LogParser::parse_window(
        &raw,
        options.since_time,
        options.duration,
        options.tail_lines,
    );
    debug!(namespace, pod, count = entries.len(), bounded = options.is_bounded(), "parsed pod logs");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use workscope_k8s::fake::FakeGateway;

    const LOGS: &str = "\
2024-01-15T10:30:00Z one
2024-01-15T10:30:01Z two
2024-01-15T10:30:02Z three
2024-01-15T10:30:03Z four
";

    #[tokio::test]
    async fn test_bounded_read_trims_window_and_tail_locally() {
        let gateway = FakeGateway::new().with_logs("reviews-v1-a", LOGS);
        let options =
            LogOptions::from_criteria(Some("istio-proxy"), Some("2s"), None, Some("2")).unwrap();

        let entries = get_pod_logs(&gateway, "bookinfo", "reviews-v1-a", &options)
            .await
            .unwrap();

        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["two", "three"]);

        let requests = gateway.log_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tail_lines, None);
        assert_eq!(requests[0].container.as_deref(), Some("istio-proxy"));
        assert!(requests[0].timestamps);
    }

    #[tokio::test]
    async fn test_unbounded_read_passes_tail_to_server() {
        let gateway = FakeGateway::new().with_logs("reviews-v1-a", LOGS);
        let options = LogOptions::from_criteria(None, None, None, Some("2")).unwrap();

        let entries = get_pod_logs(&gateway, "bookinfo", "reviews-v1-a", &options)
            .await
            .unwrap();

        // The fake ignores the tail, so every line comes back
        assert_eq!(entries.len(), 4);
        assert_eq!(gateway.log_requests()[0].tail_lines, Some(2));
    }

    #[tokio::test]
    async fn test_missing_pod() {
        let gateway = FakeGateway::new();

        let err = get_pod_logs(&gateway, "bookinfo", "gone", &LogOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::Gateway(e) if e.is_not_found()));
    }
}
