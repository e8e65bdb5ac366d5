use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{
    header::CONTENT_TYPE,
    multipart::{Form, Part},
    Response,
};
use uuid::Uuid;

use crate::{
    analysis::{
        AnalysisResult, BackendErrorBody, BatchFormat, BatchOutput, FileUpload,
        TextAnalysisRequest, ValidatedMetadata,
    },
    error::ShellError,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Typed HTTP client for the local sentiment backend.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build backend HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn analyze_text(
        &self,
        text: &str,
        metadata: &ValidatedMetadata,
    ) -> Result<AnalysisResult, ShellError> {
        let request_id = Uuid::new_v4();
        log_info!("[{request_id}] analyze text ({} chars)", text.chars().count());

        let response = self
            .http
            .post(self.url("/analyze/text"))
            .json(&TextAnalysisRequest::new(text, metadata))
            .send()
            .await?;
        let result = check_status(request_id, response)
            .await?
            .json::<AnalysisResult>()
            .await?;
        log_info!("[{request_id}] {:?} {}", result.label, result.compound);
        Ok(result)
    }

    pub async fn analyze_file(
        &self,
        upload: FileUpload,
        metadata: &ValidatedMetadata,
    ) -> Result<AnalysisResult, ShellError> {
        let request_id = Uuid::new_v4();
        log_info!(
            "[{request_id}] analyze file {} ({} bytes)",
            upload.file_name,
            upload.bytes.len()
        );

        let response = self
            .http
            .post(self.url("/analyze/file"))
            .multipart(upload_form(upload, metadata))
            .send()
            .await?;
        let result = check_status(request_id, response)
            .await?
            .json::<AnalysisResult>()
            .await?;
        log_info!("[{request_id}] {:?} {}", result.label, result.compound);
        Ok(result)
    }

    pub async fn analyze_batch(
        &self,
        upload: FileUpload,
        metadata: &ValidatedMetadata,
    ) -> Result<BatchOutput, ShellError> {
        let request_id = Uuid::new_v4();
        let format = BatchFormat::from_file_name(&upload.file_name);
        log_info!(
            "[{request_id}] analyze batch {} ({} bytes)",
            upload.file_name,
            upload.bytes.len()
        );

        let response = self
            .http
            .post(self.url("/analyze/batch"))
            .multipart(upload_form(upload, metadata))
            .send()
            .await?;
        let response = check_status(request_id, response).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        log_info!("[{request_id}] batch result {} bytes", bytes.len());

        Ok(BatchOutput {
            file_name: format.download_name().to_string(),
            content_type,
            bytes,
        })
    }
}

fn upload_form(upload: FileUpload, metadata: &ValidatedMetadata) -> Form {
    let file = Part::bytes(upload.bytes).file_name(upload.file_name);
    Form::new()
        .part("file", file)
        .text("contact", metadata.contact.clone())
        .text("company", metadata.company.clone())
        .text("perception", metadata.perception.to_string())
}

async fn check_status(request_id: Uuid, response: Response) -> Result<Response, ShellError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<BackendErrorBody>(&body)
        .map(|parsed| parsed.error)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("error").to_string()
            } else {
                body.trim().to_string()
            }
        });
    log_warn!("[{request_id}] backend answered {status}: {message}");
    Err(ShellError::Backend {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisMetadata, SentimentLabel};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    /// Answers one request with a canned response and hands back the raw request.
    async fn serve_once(
        status: &'static str,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            let header_end = loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if let Some(pos) = find(&request, b"\r\n\r\n") {
                    break pos + 4;
                }
                if n == 0 {
                    break request.len();
                }
            };
            let head = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while request.len() < header_end + content_length {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let mut response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .into_bytes();
            response.extend_from_slice(&body);
            socket.write_all(&response).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (base_url, handle)
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }

    fn metadata() -> ValidatedMetadata {
        AnalysisMetadata {
            contact: "Ana".into(),
            company: "Acme".into(),
            perception: "0.5".into(),
        }
        .validate()
        .unwrap()
    }

    fn upload(name: &str) -> FileUpload {
        FileUpload {
            file_name: name.into(),
            bytes: b"texto\nmuito bom\n".to_vec(),
        }
    }

    #[tokio::test]
    async fn text_analysis_posts_json() {
        let (base_url, server) = serve_once(
            "200 OK",
            "application/json",
            br#"{"label":"Positivo","compound":0.61}"#.to_vec(),
        )
        .await;
        let client = BackendClient::new(base_url).unwrap();

        let result = client.analyze_text("muito bom", &metadata()).await.unwrap();
        assert_eq!(result.label, SentimentLabel::Positive);
        assert_eq!(result.compound, 0.61);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /analyze/text "));
        assert!(request.contains(r#""text":"muito bom""#));
        assert!(request.contains(r#""perception":0.5"#));
    }

    #[tokio::test]
    async fn file_analysis_sends_multipart_fields() {
        let (base_url, server) = serve_once(
            "200 OK",
            "application/json",
            br#"{"label":"Neutro","compound":0.0}"#.to_vec(),
        )
        .await;
        let client = BackendClient::new(format!("{base_url}/")).unwrap();

        let result = client
            .analyze_file(upload("nota.txt"), &metadata())
            .await
            .unwrap();
        assert_eq!(result.label, SentimentLabel::Neutral);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /analyze/file "));
        assert!(request.contains(r#"name="file"; filename="nota.txt""#));
        assert!(request.contains(r#"name="company""#));
        assert!(request.contains("Acme"));
    }

    #[tokio::test]
    async fn backend_error_body_is_surfaced() {
        let (base_url, _server) = serve_once(
            "400 BAD REQUEST",
            "application/json",
            r#"{"error":"Formato não suportado"}"#.as_bytes().to_vec(),
        )
        .await;
        let client = BackendClient::new(base_url).unwrap();

        match client.analyze_file(upload("nota.odt"), &metadata()).await {
            Err(ShellError::Backend { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "Formato não suportado");
            }
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn batch_returns_file_bytes_and_download_name() {
        let csv = b"texto,sentimento,compound\nmuito bom,Positivo,0.49\n".to_vec();
        let (base_url, server) = serve_once("200 OK", "text/csv", csv.clone()).await;
        let client = BackendClient::new(base_url).unwrap();

        let output = client
            .analyze_batch(upload("clientes.csv"), &metadata())
            .await
            .unwrap();
        assert_eq!(output.file_name, "resultado.csv");
        assert_eq!(output.content_type.as_deref(), Some("text/csv"));
        assert_eq!(output.bytes, csv);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /analyze/batch "));
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let client = BackendClient::new(base_url).unwrap();

        let err = client.analyze_text("oi", &metadata()).await.unwrap_err();
        assert!(matches!(err, ShellError::Request(_)));
    }
}
