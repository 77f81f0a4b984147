// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Attachments stored inline in the `files` collection.
//!
//! The payload is kept as a `data:<mime>;base64,<payload>` URL so clients can
//! render it directly.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MIME types accepted for activity attachments.
pub const ALLOWED_CONTENT_TYPES: [&str; 4] =
    ["application/pdf", "image/jpeg", "image/jpg", "image/png"];

/// Immutable inline file document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: String,
    /// Owner uid
    pub uid: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub data: String,
    pub created_at: DateTime<Utc>,
}

impl StoredFile {
    pub fn encode(
        id: String,
        uid: &str,
        name: &str,
        content_type: &str,
        bytes: &[u8],
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            uid: uid.to_string(),
            name: name.to_string(),
            size: bytes.len() as u64,
            content_type: content_type.to_string(),
            data: format!("data:{};base64,{}", content_type, STANDARD.encode(bytes)),
            created_at,
        }
    }

    /// Decode the data URL back into raw bytes.
    pub fn decode(&self) -> Result<Vec<u8>, FileDataError> {
        let rest = self
            .data
            .strip_prefix("data:")
            .ok_or(FileDataError::NotDataUrl)?;
        let (_, payload) = rest
            .split_once(";base64,")
            .ok_or(FileDataError::NotBase64)?;
        Ok(STANDARD.decode(payload)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FileDataError {
    #[error("stored data is not a data URL")]
    NotDataUrl,
    #[error("stored data URL is not base64")]
    NotBase64,
    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Check size and type limits for an upload.
pub fn check_attachment(content_type: &str, size: usize, max_bytes: usize) -> Result<(), String> {
    if size == 0 {
        return Err("File is empty".to_string());
    }
    if size > max_bytes {
        return Err(format!("File size must be at most {}", human_size(max_bytes)));
    }
    if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
        return Err("Only PDF, JPEG, and PNG files are allowed".to_string());
    }
    Ok(())
}

fn human_size(bytes: usize) -> String {
    const MB: usize = 1024 * 1024;
    if bytes >= MB && bytes % MB == 0 {
        format!("{} MB", bytes / MB)
    } else {
        format!("{} KB", bytes / 1024)
    }
}
