// Exercises the reqwest adapter against a one-shot local HTTP server
#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };
    use wafctl::{Credentials, SucuriClient, WafAction, WafApi, WafApiError};

    fn credentials() -> Credentials {
        Credentials {
            api_key: "test-key".to_string(),
            api_secret: "test-secret".to_string(),
        }
    }

    fn header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    /// Accept one connection, answer it, and hand back the raw request
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/api?v2", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if let Some(end) = header_end(&request) {
                    let headers = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
                    let content_length = headers
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8(request).unwrap()
        });

        (url, handle)
    }

    fn whitelist_action() -> WafAction {
        WafAction::WhitelistIp {
            ip: "200.0.0.1".parse().unwrap(),
            delete: false,
        }
    }

    #[tokio::test]
    async fn test_successful_request_posts_form_fields() {
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"status": 1, "action": "whitelist_ip", "messages": ["IP 200.0.0.1 whitelisted"]}"#,
        )
        .await;

        let client = SucuriClient::new(&url, credentials(), Duration::from_secs(5)).unwrap();
        let response = client.submit(&whitelist_action()).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.messages, vec!["IP 200.0.0.1 whitelisted"]);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api?v2 HTTP/1.1"));
        assert!(request.contains("application/x-www-form-urlencoded"));
        assert!(request.contains("k=test-key"));
        assert!(request.contains("s=test-secret"));
        assert!(request.contains("a=whitelist_ip"));
        assert!(request.contains("ip=200.0.0.1"));
    }

    #[tokio::test]
    async fn test_api_rejection() {
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"status": 0, "messages": ["Wrong API secret"]}"#,
        )
        .await;

        let client = SucuriClient::new(&url, credentials(), Duration::from_secs(5)).unwrap();
        let err = client.submit(&whitelist_action()).await.unwrap_err();
        assert_eq!(
            err,
            WafApiError::Rejected {
                action: "whitelist_ip".to_string(),
                messages: vec!["Wrong API secret".to_string()],
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let (url, server) = serve_once("HTTP/1.1 503 Service Unavailable", "{}").await;

        let client = SucuriClient::new(&url, credentials(), Duration::from_secs(5)).unwrap();
        let err = client.submit(&WafAction::ShowSettings).await.unwrap_err();
        assert_eq!(
            err,
            WafApiError::HttpStatus {
                action: "show_settings".to_string(),
                status: 503,
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let (url, server) = serve_once("HTTP/1.1 200 OK", "<html>maintenance</html>").await;

        let client = SucuriClient::new(&url, credentials(), Duration::from_secs(5)).unwrap();
        let err = client.submit(&whitelist_action()).await.unwrap_err();
        assert!(matches!(err, WafApiError::InvalidResponse { .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_api_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/api?v2", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let timeout = Duration::from_millis(200);
        let client = SucuriClient::new(&url, credentials(), timeout).unwrap();
        let err = client.submit(&whitelist_action()).await.unwrap_err();
        assert_eq!(err, WafApiError::Timeout(timeout));
        assert_eq!(err.to_string(), "Timeout error after 200ms");
        server.abort();
    }

    #[tokio::test]
    async fn test_unreachable_api() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/api?v2", listener.local_addr().unwrap());
        drop(listener);

        let client = SucuriClient::new(&url, credentials(), Duration::from_secs(5)).unwrap();
        let err = client.submit(&whitelist_action()).await.unwrap_err();
        assert!(matches!(err, WafApiError::ConnectionError(_)));
    }
}
