//! Google Drive v3 store over plain REST.
//!
//! Downloads look up the file metadata first (for the name, and to export
//! native Google Sheets as xlsx), then fetch the content. Uploads create the
//! file metadata, PATCH the media onto it and optionally share it with
//! anyone holding the link; a file whose upload fails part-way is deleted.
use super::{FetchedFile, StoreError, StoredFile, TableStore};
use crate::config::DriveStoreConfig;
use crate::lm::command::parse_command;
use crate::util::truncate_string;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::process::Command;
use std::time::{Duration, Instant};
use ureq::http::Response;
use ureq::Body;

const GOOGLE_SHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const MAX_DOWNLOAD_BYTES: u64 = 64 * 1024 * 1024;
const ERROR_BODY_BYTES: usize = 500;

enum TokenSource {
    Static(String),
    /// Re-run for every call; access tokens are short-lived.
    Command(Vec<String>),
}

pub struct DriveStore {
    agent: ureq::Agent,
    api_base: String,
    upload_base: String,
    share_publicly: bool,
    token: TokenSource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata {
    id: String,
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    web_view_link: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateFile<'a> {
    name: &'a str,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parents: Vec<&'a str>,
}

impl DriveStore {
    pub fn new(config: &DriveStoreConfig) -> Result<Self> {
        let static_token = config
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty());
        let token = match (static_token, &config.token_command) {
            (Some(token), _) => TokenSource::Static(token.to_string()),
            (None, Some(command)) => TokenSource::Command(
                parse_command(command).context("parse drive token_command")?,
            ),
            (None, None) => {
                return Err(anyhow!(
                    "drive store needs GOOGLE_OAUTH_ACCESS_TOKEN or a token_command"
                ))
            }
        };

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            agent,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            share_publicly: config.share_publicly,
            token,
        })
    }

    fn bearer(&self) -> Result<String, String> {
        let token = match &self.token {
            TokenSource::Static(token) => token.clone(),
            TokenSource::Command(argv) => run_token_command(argv)?,
        };
        Ok(format!("Bearer {token}"))
    }

    fn metadata(&self, file_id: &str, bearer: &str) -> Result<FileMetadata, StoreError> {
        let mut response = self
            .agent
            .get(format!("{}/files/{file_id}", self.api_base))
            .query("fields", "id,name,mimeType")
            .query("supportsAllDrives", "true")
            .header("Authorization", bearer)
            .call()
            .map_err(|err| StoreError::Transfer(format!("metadata request: {err}")))?;
        if response.status().as_u16() == 404 {
            return Err(StoreError::NotFound(file_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(StoreError::Transfer(describe_failure(
                "metadata lookup",
                &mut response,
            )));
        }
        response
            .body_mut()
            .read_json()
            .map_err(|err| StoreError::Transfer(format!("decode metadata: {err}")))
    }

    fn create(
        &self,
        bearer: &str,
        name: &str,
        content_type: &str,
        folder: Option<&str>,
    ) -> Result<FileMetadata, String> {
        let body = CreateFile {
            name,
            mime_type: content_type,
            parents: folder.into_iter().collect(),
        };
        let mut response = self
            .agent
            .post(format!("{}/files", self.api_base))
            .query("supportsAllDrives", "true")
            .query("fields", "id,name,webViewLink")
            .header("Authorization", bearer)
            .send_json(&body)
            .map_err(|err| format!("create request: {err}"))?;
        if !response.status().is_success() {
            return Err(describe_failure("file create", &mut response));
        }
        response
            .body_mut()
            .read_json()
            .map_err(|err| format!("decode create response: {err}"))
    }

    fn upload_media(
        &self,
        bearer: &str,
        file_id: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<FileMetadata, String> {
        let mut response = self
            .agent
            .patch(format!("{}/files/{file_id}", self.upload_base))
            .query("uploadType", "media")
            .query("supportsAllDrives", "true")
            .query("fields", "id,name,webViewLink")
            .header("Authorization", bearer)
            .header("Content-Type", content_type)
            .send(bytes)
            .map_err(|err| format!("media upload request: {err}"))?;
        if !response.status().is_success() {
            return Err(describe_failure("media upload", &mut response));
        }
        response
            .body_mut()
            .read_json()
            .map_err(|err| format!("decode upload response: {err}"))
    }

    fn share_with_link(&self, bearer: &str, file_id: &str) -> Result<(), String> {
        let mut response = self
            .agent
            .post(format!("{}/files/{file_id}/permissions", self.api_base))
            .query("supportsAllDrives", "true")
            .header("Authorization", bearer)
            .send_json(json!({"type": "anyone", "role": "reader"}))
            .map_err(|err| format!("permission request: {err}"))?;
        if !response.status().is_success() {
            return Err(describe_failure("permission create", &mut response));
        }
        Ok(())
    }

    /// Remove a created file whose upload did not complete. Failures are only logged.
    fn discard(&self, bearer: &str, file_id: &str) {
        let outcome = self
            .agent
            .delete(format!("{}/files/{file_id}", self.api_base))
            .query("supportsAllDrives", "true")
            .header("Authorization", bearer)
            .call();
        match outcome {
            Ok(response) if response.status().is_success() => {
                tracing::info!(file_id, "removed incomplete drive upload");
            }
            Ok(mut response) => {
                let error = describe_failure("file delete", &mut response);
                tracing::warn!(file_id, error = %error, "failed to remove incomplete drive upload");
            }
            Err(err) => {
                tracing::warn!(file_id, error = %err, "failed to remove incomplete drive upload");
            }
        }
    }
}

impl TableStore for DriveStore {
    fn fetch(&self, file_id: &str) -> Result<FetchedFile, StoreError> {
        if !is_valid_file_id(file_id) {
            return Err(StoreError::NotFound(file_id.to_string()));
        }
        let start = Instant::now();
        let bearer = self.bearer().map_err(StoreError::Transfer)?;
        let metadata = self.metadata(file_id, &bearer)?;

        let (request, name) = if metadata.mime_type == GOOGLE_SHEET_MIME {
            let request = self
                .agent
                .get(format!("{}/files/{file_id}/export", self.api_base))
                .query("mimeType", XLSX_MIME);
            (request, exported_name(&metadata.name))
        } else {
            let request = self
                .agent
                .get(format!("{}/files/{file_id}", self.api_base))
                .query("alt", "media")
                .query("supportsAllDrives", "true");
            (request, metadata.name)
        };

        let mut response = request
            .header("Authorization", bearer)
            .call()
            .map_err(|err| StoreError::Transfer(format!("download request: {err}")))?;
        if response.status().as_u16() == 404 {
            return Err(StoreError::NotFound(file_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(StoreError::Transfer(describe_failure(
                "download",
                &mut response,
            )));
        }
        let bytes = response
            .body_mut()
            .with_config()
            .limit(MAX_DOWNLOAD_BYTES)
            .read_to_vec()
            .map_err(|err| StoreError::Transfer(format!("read download body: {err}")))?;

        tracing::info!(
            file_id,
            name = %name,
            bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "downloaded drive file"
        );
        Ok(FetchedFile { name, bytes })
    }

    fn persist(
        &self,
        name: &str,
        content_type: &str,
        bytes: &[u8],
        folder: Option<&str>,
    ) -> Result<StoredFile, StoreError> {
        let start = Instant::now();
        let bearer = self.bearer().map_err(StoreError::Persist)?;
        let created = self
            .create(&bearer, name, content_type, folder)
            .map_err(StoreError::Persist)?;
        let finished = self
            .upload_media(&bearer, &created.id, content_type, bytes)
            .and_then(|uploaded| {
                if self.share_publicly {
                    self.share_with_link(&bearer, &uploaded.id)?;
                }
                Ok(uploaded)
            });
        let uploaded = match finished {
            Ok(uploaded) => uploaded,
            Err(err) => {
                self.discard(&bearer, &created.id);
                return Err(StoreError::Persist(err));
            }
        };

        let link = view_link(&uploaded.id, uploaded.web_view_link.or(created.web_view_link));
        tracing::info!(
            file_id = %uploaded.id,
            name,
            bytes = bytes.len(),
            shared = self.share_publicly,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "uploaded drive file"
        );
        Ok(StoredFile {
            id: uploaded.id,
            link,
        })
    }
}

/// Drive ids are URL-safe base64-ish tokens.
fn is_valid_file_id(file_id: &str) -> bool {
    !file_id.is_empty()
        && file_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn exported_name(name: &str) -> String {
    if name.to_ascii_lowercase().ends_with(".xlsx") {
        name.to_string()
    } else {
        format!("{name}.xlsx")
    }
}

fn view_link(file_id: &str, web_view_link: Option<String>) -> String {
    web_view_link
        .filter(|link| !link.trim().is_empty())
        .unwrap_or_else(|| format!("https://drive.google.com/file/d/{file_id}/view"))
}

fn describe_failure(what: &str, response: &mut Response<Body>) -> String {
    let status = response.status();
    let text = response.body_mut().read_to_string().unwrap_or_default();
    format!(
        "{what} returned {status}: {}",
        truncate_string(text.trim(), ERROR_BODY_BYTES)
    )
}

fn run_token_command(argv: &[String]) -> Result<String, String> {
    let output = Command::new(&argv[0])
        .args(&argv[1..])
        .output()
        .map_err(|err| format!("run token command {}: {err}", argv[0]))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "token command failed with status {}: {}",
            output.status,
            truncate_string(stderr.trim(), ERROR_BODY_BYTES)
        ));
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err("token command printed nothing".to_string());
    }
    Ok(token)
}
