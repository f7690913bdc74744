use reqwest::Client;
use tokio::task::JoinHandle;

use mvl_common::results::MatchResult;

#[derive(Debug, thiserror::Error)]
pub enum ResultsError {
    #[error("results request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("results service answered {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Posts match results to the results service.
#[derive(Debug, Clone)]
pub struct ResultsClient {
    http: Client,
    url: String,
}

impl ResultsClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn post(&self, result: &MatchResult) -> Result<(), ResultsError> {
        let response = self.http.post(&self.url).json(result).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResultsError::Status { status, body });
        }
        Ok(())
    }

    /// Post in the background. Failures are logged and never retried.
    pub fn submit(&self, result: MatchResult) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            tracing::info!(url = %client.url, match_id = %result.match_id, "submitting match results");
            match client.post(&result).await {
                Ok(()) => tracing::info!(match_id = %result.match_id, "match results submitted"),
                Err(e) => tracing::warn!(match_id = %result.match_id, error = %e, "match results not submitted"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn result() -> MatchResult {
        MatchResult {
            match_id: uuid::Uuid::new_v4(),
            timestamp: "2024-05-01T12:00:00.000Z".into(),
            is_team_mode: false,
            teams: Vec::new(),
            players: Vec::new(),
        }
    }

    /// Accept one HTTP request, answer with `status_line`, return the raw request.
    async fn one_shot_server(status_line: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/match-results", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!("{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8(request).unwrap()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn test_post_sends_json() {
        let (url, server) = one_shot_server("HTTP/1.1 200 OK").await;
        let client = ResultsClient::new(url);
        let sent = result();

        client.post(&sent).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /match-results"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(request.contains(&sent.match_id.to_string()));
        assert!(request.contains("\"isTeamMode\":false"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let (url, server) = one_shot_server("HTTP/1.1 500 Internal Server Error").await;
        let client = ResultsClient::new(url);

        let err = client.post(&result()).await.unwrap_err();
        assert!(matches!(err, ResultsError::Status { status, .. } if status.as_u16() == 500));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_swallows_transport_errors() {
        // nothing listens on port 1
        let client = ResultsClient::new("http://127.0.0.1:1/match-results");
        client.submit(result()).await.unwrap();
    }
}
