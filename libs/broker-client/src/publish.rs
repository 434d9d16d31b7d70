use std::time::Duration;

use broker_api::PublishRequest;

use crate::error::ClientError;

// ═══════════════════════════════════════════════════════════════
//  Request/response publish: POST {base}/publish
// ═══════════════════════════════════════════════════════════════

/// HTTP-клиент publish-вызова. Каждый publisher владеет своим экземпляром.
pub struct PublishClient {
    http: reqwest::Client,
    url: String,
}

impl PublishClient {
    /// `timeout` ограничивает весь вызов: connect + запрос + ответ.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: format!("{}/publish", base_url.trim_end_matches('/')),
        })
    }

    /// Успех только при статусе 200; любой другой статус или таймаут дают ошибку.
    pub async fn publish(&self, req: &PublishRequest) -> Result<(), ClientError> {
        let resp = self.http.post(&self.url).json(req).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::OK {
            Ok(())
        } else {
            Err(ClientError::Status(status.as_u16()))
        }
    }
}
