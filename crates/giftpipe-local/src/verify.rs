use giftpipe_core::LinkVerifier;

/// HEAD-request existence check for synthesized product links.
///
/// Only an explicit "gone" answer (404/410) or a transport failure counts as invalid; servers
/// that refuse HEAD (405) or rate-limit (429/503) are not evidence that the page is missing.
#[derive(Debug, Clone)]
pub struct HttpLinkVerifier {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl HttpLinkVerifier {
    pub fn new(client: reqwest::Client, timeout_ms: u64) -> Self {
        Self {
            client,
            timeout_ms: timeout_ms.clamp(500, 10_000),
        }
    }
}

#[async_trait::async_trait]
impl LinkVerifier for HttpLinkVerifier {
    async fn verify(&self, url: &str) -> bool {
        let resp = self
            .client
            .head(url)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;
        match resp {
            Ok(r) => {
                let s = r.status();
                !(s == reqwest::StatusCode::NOT_FOUND || s == reqwest::StatusCode::GONE)
            }
            Err(e) => {
                tracing::debug!(error = %e, "link verification failed");
                false
            }
        }
    }
}
