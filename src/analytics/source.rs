use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use super::kinds::KpiKind;
use crate::config::KpiConfig;

#[derive(Debug, Error)]
pub enum KpiError {
    #[error("kpi {kind}: request failed: {source}")]
    Request {
        kind: KpiKind,
        source: reqwest::Error,
    },
    #[error("kpi {kind}: upstream returned {status}")]
    Status { kind: KpiKind, status: u16 },
    #[error("kpi {kind}: malformed payload: {reason}")]
    Malformed { kind: KpiKind, reason: String },
}

/// The analytics collaborator: one dataset of opaque rows per kind.
#[async_trait]
pub trait KpiSource: Send + Sync {
    async fn fetch(&self, kind: KpiKind) -> Result<Vec<Value>, KpiError>;
}

pub struct HttpKpiSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpKpiSource {
    pub fn new(cfg: &KpiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, kind: KpiKind) -> String {
        format!("{}/api/kpi/{}", self.base_url, kind.as_str())
    }
}

/// Pulls the row array out of `{"<kind>": [...]}`.
pub(crate) fn extract_rows(kind: KpiKind, body: Value) -> Result<Vec<Value>, KpiError> {
    let Value::Object(mut map) = body else {
        return Err(KpiError::Malformed {
            kind,
            reason: "body is not an object".into(),
        });
    };
    match map.remove(kind.as_str()) {
        Some(Value::Array(rows)) => Ok(rows),
        Some(_) => Err(KpiError::Malformed {
            kind,
            reason: format!("`{kind}` is not an array"),
        }),
        None => Err(KpiError::Malformed {
            kind,
            reason: format!("missing `{kind}`"),
        }),
    }
}

#[async_trait]
impl KpiSource for HttpKpiSource {
    #[instrument(skip(self))]
    async fn fetch(&self, kind: KpiKind) -> Result<Vec<Value>, KpiError> {
        let res = self
            .client
            .get(self.url(kind))
            .send()
            .await
            .map_err(|source| KpiError::Request { kind, source })?;
        let status = res.status();
        if !status.is_success() {
            return Err(KpiError::Status {
                kind,
                status: status.as_u16(),
            });
        }
        let body: Value = res
            .json()
            .await
            .map_err(|source| KpiError::Request { kind, source })?;
        let rows = extract_rows(kind, body)?;
        debug!(%kind, rows = rows.len(), "kpi fetched");
        Ok(rows)
    }
}

#[cfg(test)]
pub mod fake {
    //! Canned KPI rows with a switch to fail one kind.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct StaticKpiSource {
        rows: Mutex<HashMap<KpiKind, Vec<Value>>>,
        failing: Mutex<Option<KpiKind>>,
        pub calls: AtomicUsize,
    }

    impl StaticKpiSource {
        pub fn set_rows(&self, kind: KpiKind, rows: Vec<Value>) {
            self.rows.lock().unwrap().insert(kind, rows);
        }

        pub fn fail_on(&self, kind: KpiKind) {
            *self.failing.lock().unwrap() = Some(kind);
        }
    }

    #[async_trait]
    impl KpiSource for StaticKpiSource {
        async fn fetch(&self, kind: KpiKind) -> Result<Vec<Value>, KpiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if *self.failing.lock().unwrap() == Some(kind) {
                return Err(KpiError::Status { kind, status: 503 });
            }
            Ok(self
                .rows
                .lock()
                .unwrap()
                .get(&kind)
                .cloned()
                .unwrap_or_default())
        }
    }
}
