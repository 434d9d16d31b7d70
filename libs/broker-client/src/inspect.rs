use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::ClientError;

/// Read-only эндпоинты брокера: путь и подпись для отчёта.
pub const INSPECTION_ENDPOINTS: &[(&str, &str)] = &[
    ("/health", "Health check"),
    ("/clients", "Get clients"),
    ("/messages", "Get messages"),
    ("/consumptions", "Get consumptions"),
    ("/graph/state", "Graph state"),
];

/// Результат замера одного эндпоинта.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointProbe {
    pub path: String,
    pub label: String,
    /// Среднее по успешным (200) вызовам; `None`, если успешных не было.
    pub mean_ms: Option<f64>,
    pub ok: usize,
    pub failed: usize,
}

// ═══════════════════════════════════════════════════════════════
//  Inspector: GET-замеры эндпоинтов инспекции
// ═══════════════════════════════════════════════════════════════

/// Замеряет время ответа эндпоинтов инспекции.
///
/// Содержимое ответов не интерпретируется: тело читается целиком,
/// чтобы замер включал передачу данных.
pub struct Inspector {
    http: reqwest::Client,
    base: String,
}

impl Inspector {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn probe(&self, path: &str, label: &str, samples: usize) -> EndpointProbe {
        let mut times = Vec::with_capacity(samples);
        let mut failed = 0;

        for _ in 0..samples {
            let start = Instant::now();
            match self.get(path).await {
                Ok(()) => times.push(start.elapsed()),
                Err(e) => {
                    tracing::debug!(path, error = %e, "inspection call failed");
                    failed += 1;
                }
            }
        }

        let mean_ms = (!times.is_empty()).then(|| {
            times.iter().map(|d| d.as_secs_f64() * 1000.0).sum::<f64>() / times.len() as f64
        });

        EndpointProbe {
            path: path.to_string(),
            label: label.to_string(),
            mean_ms,
            ok: times.len(),
            failed,
        }
    }

    /// Все эндпоинты из `INSPECTION_ENDPOINTS`, последовательно.
    pub async fn probe_all(&self, samples: usize) -> Vec<EndpointProbe> {
        let mut out = Vec::with_capacity(INSPECTION_ENDPOINTS.len());
        for (path, label) in INSPECTION_ENDPOINTS {
            out.push(self.probe(path, label, samples).await);
        }
        out
    }

    async fn get(&self, path: &str) -> Result<(), ClientError> {
        let resp = self.http.get(format!("{}{path}", self.base)).send().await?;
        let status = resp.status();
        resp.bytes().await?;
        if status == reqwest::StatusCode::OK {
            Ok(())
        } else {
            Err(ClientError::Status(status.as_u16()))
        }
    }
}
