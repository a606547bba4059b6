use std::collections::HashMap;

use axum::extract::Multipart;
use bytes::Bytes;
use time::Date;
use tracing::warn;
use uuid::Uuid;

use crate::category::Category;
use crate::error::AppError;
use crate::uploads::UploadRequest;

pub const FILE_FIELD: &str = "file";

/// A submitted panel form: text fields plus at most one file part.
#[derive(Debug, Default)]
pub struct Form {
    fields: HashMap<String, String>,
    file: Option<UploadRequest>,
}

impl Form {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Form::default();
        while let Some(field) = multipart.next_field().await.map_err(|e| {
            warn!(error = %e, "multipart read failed");
            AppError::BadRequest(format!("Invalid form data: {e}"))
        })? {
            let name = field.name().unwrap_or_default().to_string();
            if name == FILE_FIELD {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let body = field.bytes().await.map_err(|e| {
                    warn!(error = %e, "multipart file read failed");
                    AppError::BadRequest(format!("Invalid file: {e}"))
                })?;
                form = form.with_file(file_name, content_type, body);
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid field `{name}`: {e}")))?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    pub fn with_text(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    /// An empty part (no file chosen) counts as no file.
    pub fn with_file(mut self, file_name: String, content_type: String, body: Bytes) -> Self {
        self.file = (!body.is_empty()).then_some(UploadRequest {
            file_name,
            content_type,
            body,
        });
        self
    }

    /// Trimmed value; `None` when absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.trim())
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }

    pub fn take_file(&mut self) -> Option<UploadRequest> {
        self.file.take()
    }

    /// Present and non-blank.
    pub fn required(&self, name: &'static str, message: &str) -> Result<String, AppError> {
        match self.text(name) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => Err(AppError::validation(name, message)),
        }
    }

    /// For partial updates: absent is `None`, present must be non-blank.
    pub fn changed(&self, name: &'static str, message: &str) -> Result<Option<String>, AppError> {
        if !self.has(name) {
            return Ok(None);
        }
        self.required(name, message).map(Some)
    }

    pub fn require_file(&self, message: &str) -> Result<(), AppError> {
        if self.has_file() {
            Ok(())
        } else {
            Err(AppError::validation(FILE_FIELD, message))
        }
    }
}

pub fn parse_category(field: &'static str, raw: &str, message: &str) -> Result<Category, AppError> {
    raw.parse().map_err(|_| AppError::validation(field, message))
}

pub fn parse_date(field: &'static str, raw: &str) -> Result<Date, AppError> {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    Date::parse(raw, &format)
        .map_err(|_| AppError::validation(field, "Please enter a valid date (YYYY-MM-DD)."))
}

pub fn parse_id(field: &'static str, raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::validation(field, format!("Invalid {field}.")))
}
