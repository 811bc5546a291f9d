//! Signed upload parameter fetch.

use std::collections::HashMap;

use reqwest::{header, Client};
use serde::Deserialize;

use crate::config::OriginConfig;
use crate::error::{Error, Result};

/// Signed parameters issued by the origin for one upload attempt.
///
/// Single-use, tied to one file name and size.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadParams {
    pub response_token: String,
    pub project: String,
    pub nonce: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
    pub signature: String,
    /// CDN endpoint the multipart body is posted to.
    pub upload_url: String,
}

impl UploadParams {
    /// Form fields in the order the CDN expects them, ahead of the file part.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("response_token".to_string(), self.response_token.clone()),
            ("project".to_string(), self.project.clone()),
            ("nonce".to_string(), self.nonce.clone()),
            ("signature".to_string(), self.signature.clone()),
        ];
        let mut extra: Vec<_> = self.params.iter().collect();
        extra.sort_by(|a, b| a.0.cmp(b.0));
        for (name, value) in extra {
            fields.push((name.clone(), value.clone()));
        }
        fields
    }
}

/// Request signed upload parameters for a file.
///
/// A non-JSON body means the origin bounced us to an HTML page: the
/// session is not authenticated. That is not a transient fault, so it
/// fails fast instead of being retried.
pub async fn fetch_upload_params(
    client: &Client,
    origin: &OriginConfig,
    cookies: &str,
    file_name: &str,
    file_size: u64,
) -> Result<UploadParams> {
    let url = format!("{}{}", origin.base_url, origin.upload_prepare_path);

    let response = client
        .post(&url)
        .header(header::COOKIE, cookies)
        .form(&[
            ("name", file_name.to_string()),
            ("size", file_size.to_string()),
        ])
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(Error::Upload(format!(
            "Upload parameter endpoint failed: HTTP {} - {}",
            status,
            &text[..text.len().min(200)]
        )));
    }

    let params: UploadParams = serde_json::from_str(&text).map_err(|_| {
        Error::Authentication(
            "Upload parameter endpoint returned non-JSON; session is not authenticated".into(),
        )
    })?;

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> UploadParams {
        serde_json::from_str(
            r#"{
                "response_token": "tok",
                "project": "proj",
                "nonce": "n1",
                "params": { "b": "2", "a": "1" },
                "signature": "sig",
                "upload_url": "https://cdn.example/upload"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_form_fields_order() {
        let fields = params().form_fields();
        let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["response_token", "project", "nonce", "signature", "a", "b"]
        );
    }

    #[test]
    fn test_html_response_is_not_params() {
        let result: std::result::Result<UploadParams, _> =
            serde_json::from_str("<html><body>Please log in</body></html>");
        assert!(result.is_err());
    }

    #[test]
    fn test_params_without_extras_parse() {
        let params: UploadParams = serde_json::from_str(
            r#"{
                "response_token": "tok",
                "project": "proj",
                "nonce": "n1",
                "signature": "sig",
                "upload_url": "https://cdn.example/upload"
            }"#,
        )
        .unwrap();
        assert!(params.params.is_empty());
    }
}
