//! Catalog REST client

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::types::{CatalogChange, MediaKind};
use crate::config::{join_url, ServiceConfig};
use crate::dispatch::{EventSink, InboundEvent};
use crate::sync::MediaItem;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Uploads can be large, so only the connect phase is bounded tightly
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors from the catalog plane
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("Could not read media file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog address: {0}")]
    InvalidAddress(String),
}

/// Client for the catalog plane of the service of record
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: String,
    secret_key: Option<String>,
    user_token: Option<String>,
    notifier: Option<EventSink>,
}

impl CatalogClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, CatalogError> {
        let http = Client::builder()
            .connect_timeout(CONNECTION_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_address().to_string(),
            secret_key: config.secret_key.clone(),
            user_token: config.user_token.clone(),
            notifier: None,
        })
    }

    /// Report successful mutations through the dispatch queue
    pub fn with_notifier(mut self, sink: EventSink) -> Self {
        self.notifier = Some(sink);
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, join_url(&self.base_url, path))
    }

    /// Request for `{base}/{segment}`, with the segment percent-encoded
    fn item_request(&self, method: Method, segment: &str) -> Result<RequestBuilder, CatalogError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| CatalogError::InvalidAddress(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| CatalogError::InvalidAddress(self.base_url.clone()))?
            .pop_if_empty()
            .push(segment);
        Ok(self.http.request(method, url))
    }

    fn secret_key(&self) -> Result<&str, CatalogError> {
        self.secret_key
            .as_deref()
            .ok_or(CatalogError::MissingCredential("secret key"))
    }

    fn user_token(&self) -> Result<&str, CatalogError> {
        self.user_token
            .as_deref()
            .ok_or(CatalogError::MissingCredential("user token"))
    }

    fn notify(&self, change: CatalogChange) {
        if let Some(sink) = &self.notifier {
            sink.push(InboundEvent::CatalogChanged(change));
        }
    }

    /// Grant a user token access to state-mutating calls
    #[instrument(skip(self, user_token), fields(base_url = %self.base_url))]
    pub async fn add_user(&self, user_token: &str) -> Result<(), CatalogError> {
        let resp = self
            .request(Method::POST, "/add-user")
            .bearer_auth(self.secret_key()?)
            .form(&[("userToken", user_token)])
            .send()
            .await?;
        check(resp).await?;

        debug!("User added");
        self.notify(CatalogChange::UserAdded {
            user_token: user_token.to_string(),
        });
        Ok(())
    }

    /// Revoke a user token
    #[instrument(skip(self, user_token), fields(base_url = %self.base_url))]
    pub async fn remove_user(&self, user_token: &str) -> Result<(), CatalogError> {
        let resp = self
            .request(Method::POST, "/remove-user")
            .bearer_auth(self.secret_key()?)
            .form(&[("userToken", user_token)])
            .send()
            .await?;
        check(resp).await?;

        debug!("User removed");
        self.notify(CatalogChange::UserRemoved {
            user_token: user_token.to_string(),
        });
        Ok(())
    }

    /// Upload media bytes to a playlist. `extension` is `mp4` or `wav`.
    #[instrument(skip(self, bytes), fields(base_url = %self.base_url, size = bytes.len()))]
    pub async fn upload(&self, playlist_id: &str, bytes: Vec<u8>, extension: &str) -> Result<(), CatalogError> {
        let kind = MediaKind::from_extension(extension)
            .ok_or_else(|| CatalogError::UnsupportedMedia(extension.to_string()))?;
        self.upload_kind(playlist_id, bytes, kind).await
    }

    /// Read a file from disk and upload it, picking the format from its extension
    pub async fn upload_file(&self, playlist_id: &str, path: &Path) -> Result<(), CatalogError> {
        let kind = MediaKind::from_path(path)
            .ok_or_else(|| CatalogError::UnsupportedMedia(path.display().to_string()))?;
        let bytes = tokio::fs::read(path).await?;
        self.upload_kind(playlist_id, bytes, kind).await
    }

    async fn upload_kind(&self, playlist_id: &str, bytes: Vec<u8>, kind: MediaKind) -> Result<(), CatalogError> {
        let token = self.user_token()?;

        let part = Part::bytes(bytes)
            .file_name(kind.file_name())
            .mime_str(kind.mime_type())?;
        let form = Form::new()
            .part("file", part)
            .text("playListId", playlist_id.to_string());

        let resp = self
            .request(Method::POST, "/upload")
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        check(resp).await?;

        debug!("Upload accepted");
        self.notify(CatalogChange::Uploaded {
            playlist_id: playlist_id.to_string(),
        });
        Ok(())
    }

    /// Delete a media item
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn delete(&self, media_id: &str) -> Result<(), CatalogError> {
        let resp = self
            .item_request(Method::DELETE, media_id)?
            .bearer_auth(self.user_token()?)
            .send()
            .await?;
        check(resp).await?;

        debug!("Media deleted");
        self.notify(CatalogChange::Deleted {
            media_id: media_id.to_string(),
        });
        Ok(())
    }

    /// List a playlist's media items, in server order
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn list(&self, playlist_id: &str) -> Result<Vec<MediaItem>, CatalogError> {
        let resp = self
            .item_request(Method::GET, playlist_id)?
            .send()
            .await?;
        let items: Vec<MediaItem> = check(resp).await?.json().await?;

        debug!("Listed {} media items", items.len());
        Ok(items)
    }
}

/// Turn non-2xx responses into [`CatalogError::Http`]
async fn check(resp: Response) -> Result<Response, CatalogError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    warn!("Catalog call failed: HTTP {} {}", status.as_u16(), body);
    Err(CatalogError::Http {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::EventDispatchQueue;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(uri: &str) -> ServiceConfig {
        ServiceConfig::new(uri)
            .with_secret_key("secret")
            .with_user_token("user-1")
    }

    fn drain_changes(queue: &EventDispatchQueue) -> Vec<CatalogChange> {
        let mut changes = Vec::new();
        queue.drain(|_, event| {
            if let InboundEvent::CatalogChanged(change) = event {
                changes.push(change);
            }
        });
        changes
    }

    #[tokio::test]
    async fn test_add_user_sends_secret_and_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/add-user"))
            .and(header("authorization", "Bearer secret"))
            .and(body_string_contains("userToken=alice"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let queue = EventDispatchQueue::new();
        let client = CatalogClient::new(&test_config(&server.uri()))
            .unwrap()
            .with_notifier(queue.unscoped_sink());

        client.add_user("alice").await.unwrap();
        assert_eq!(
            drain_changes(&queue),
            vec![CatalogChange::UserAdded { user_token: "alice".into() }]
        );
    }

    #[tokio::test]
    async fn test_remove_user_requires_secret() {
        let client = CatalogClient::new(&ServiceConfig::new("http://127.0.0.1:1")).unwrap();
        let result = client.remove_user("alice").await;
        assert!(matches!(result, Err(CatalogError::MissingCredential("secret key"))));
    }

    #[tokio::test]
    async fn test_upload_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(header("authorization", "Bearer user-1"))
            .and(body_string_contains("filename=\"file.mp4\""))
            .and(body_string_contains("video/mp4"))
            .and(body_string_contains("name=\"playListId\""))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let queue = EventDispatchQueue::new();
        let client = CatalogClient::new(&test_config(&server.uri()))
            .unwrap()
            .with_notifier(queue.unscoped_sink());

        client.upload("pl-1", b"fake video".to_vec(), "mp4").await.unwrap();
        assert_eq!(
            drain_changes(&queue),
            vec![CatalogChange::Uploaded { playlist_id: "pl-1".into() }]
        );
    }

    #[tokio::test]
    async fn test_upload_rejects_unknown_format() {
        let client = CatalogClient::new(&test_config("http://127.0.0.1:1")).unwrap();
        let result = client.upload("pl-1", vec![1, 2, 3], "avi").await;
        assert!(matches!(result, Err(CatalogError::UnsupportedMedia(_))));

        let result = client.upload_file("pl-1", Path::new("/tmp/clip.mkv")).await;
        assert!(matches!(result, Err(CatalogError::UnsupportedMedia(_))));
    }

    #[tokio::test]
    async fn test_delete_http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/m1"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let queue = EventDispatchQueue::new();
        let client = CatalogClient::new(&test_config(&server.uri()))
            .unwrap()
            .with_notifier(queue.unscoped_sink());

        match client.delete("m1").await {
            Err(CatalogError::Http { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(drain_changes(&queue).is_empty());
    }

    #[tokio::test]
    async fn test_list_decodes_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pl-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "m1", "playListId": "pl-1", "filePath": "/v/m1.mp4", "duration": 30.0, "sortOrder": 0},
                {"id": "m2", "playListId": "pl-1", "filePath": "/v/m2.wav", "duration": 12.5, "sortOrder": 1}
            ])))
            .mount(&server)
            .await;

        let client = CatalogClient::new(&test_config(&server.uri())).unwrap();
        let items = client.list("pl-1").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].file_path, "/v/m2.wav");
    }

    #[tokio::test]
    async fn test_network_error_is_distinct_from_http_error() {
        // Nothing listens on port 1
        let client = CatalogClient::new(&test_config("http://127.0.0.1:1")).unwrap();
        let result = client.list("pl-1").await;
        assert!(matches!(result, Err(CatalogError::Network(_))));
    }

    #[tokio::test]
    async fn test_item_ids_are_path_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/a%2Fb%3Fc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pl%201%23x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = CatalogClient::new(&test_config(&format!("{}/", server.uri()))).unwrap();
        client.delete("a/b?c").await.unwrap();
        assert!(client.list("pl 1#x").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_file_picks_format_from_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(body_string_contains("filename=\"file.wav\""))
            .and(body_string_contains("audio/x-wav"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let file = std::env::temp_dir().join(format!("mediasync-upload-{}.WAV", std::process::id()));
        tokio::fs::write(&file, b"RIFF").await.unwrap();

        let client = CatalogClient::new(&test_config(&server.uri())).unwrap();
        let result = client.upload_file("pl-1", &file).await;
        let _ = tokio::fs::remove_file(&file).await;
        result.unwrap();
    }
}
