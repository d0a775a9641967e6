//! Instagram image mirroring.
//!
//! Discovers every image of a post (the `og:image` preview plus the carousel
//! `display_url` entries embedded in the page JSON), then downloads, uploads
//! and records them one at a time. Downloads are paced with a fixed pause
//! between consecutive images to stay under Instagram's blocking thresholds;
//! the loop must stay sequential.

use crate::error::FunctionError;
use crate::gallery_store::{RecordStore, StoredImageRecord};
use crate::html::{extract_display_urls, extract_meta_content};
use crate::http_client::HttpClient;
use crate::s3_uploader::{sanitize_path_component, ObjectStore};
use crate::waiter::Waiter;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// URL fragment identifying an image post (reels and stories are not supported)
const POST_URL_MARKER: &str = "instagram.com/p/";

/// Content type every mirrored image is stored under
const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// A mirrored image and its position in the post
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedImageRef {
    pub image_url: String,
    pub image_index: usize,
}

/// Outcome of one extraction request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    pub success: bool,
    pub message: String,
    pub downloaded: usize,
    pub total: usize,
    pub images: Vec<ExtractedImageRef>,
}

impl ExtractionSummary {
    fn skipped(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            downloaded: 0,
            total: 0,
            images: Vec::new(),
        }
    }
}

/// Whether a URL points at an Instagram image post
pub fn is_supported_post(url: &str) -> bool {
    url.contains(POST_URL_MARKER)
}

/// Image URLs of a post page in discovery order, without duplicates
pub fn discover_image_urls(html: &str) -> Vec<String> {
    let mut image_urls: Vec<String> = Vec::new();

    if let Some(primary) = extract_meta_content(html, "og:image") {
        image_urls.push(primary);
    }

    for url in extract_display_urls(html) {
        if !image_urls.contains(&url) {
            image_urls.push(url);
        }
    }

    image_urls
}

/// Object key for a mirrored image: `<user>/<link>_<index>_<millis>.jpg`
pub fn storage_path(user_id: &str, link_id: &str, index: usize, timestamp_millis: i64) -> String {
    format!(
        "{}/{}_{}_{}.jpg",
        sanitize_path_component(user_id),
        sanitize_path_component(link_id),
        index,
        timestamp_millis
    )
}

/// Mirrors the images of an Instagram post into the gallery
pub struct InstagramImageExtractor {
    http: Arc<dyn HttpClient>,
    object_store: Arc<dyn ObjectStore>,
    record_store: Arc<dyn RecordStore>,
    waiter: Arc<dyn Waiter>,
    user_agent: String,
    download_delay: Duration,
}

impl InstagramImageExtractor {
    pub fn new(
        http: Arc<dyn HttpClient>,
        object_store: Arc<dyn ObjectStore>,
        record_store: Arc<dyn RecordStore>,
        waiter: Arc<dyn Waiter>,
        user_agent: impl Into<String>,
        download_delay: Duration,
    ) -> Self {
        Self {
            http,
            object_store,
            record_store,
            waiter,
            user_agent: user_agent.into(),
            download_delay,
        }
    }

    /// Discover, download, upload and record every image of a post.
    ///
    /// Only discovery failures are returned as errors. A failure on a single
    /// image skips that index and the loop carries on; the summary's
    /// `downloaded < total` is the only trace of it.
    #[instrument(skip(self))]
    pub async fn extract_and_store(
        &self,
        url: &str,
        link_id: &str,
        user_id: &str,
    ) -> Result<ExtractionSummary, FunctionError> {
        if !is_supported_post(url) {
            info!("Not an Instagram image post, skipping");
            return Ok(ExtractionSummary::skipped(
                FunctionError::UnsupportedPost.to_string(),
            ));
        }

        info!("Processing Instagram image post");

        let html = self.http.get_text(url, &self.user_agent).await?;
        let image_urls = discover_image_urls(&html);
        let total = image_urls.len();

        info!(total = total, "Found images in post");
        metrics::counter!("functions.images.discovered").increment(total as u64);

        if image_urls.is_empty() {
            return Ok(ExtractionSummary::skipped("No images found"));
        }

        let mut images = Vec::with_capacity(total);

        for (index, image_url) in image_urls.iter().enumerate() {
            // The pause only follows an index whose upload went through.
            let uploaded = match self
                .store_image(url, image_url, link_id, user_id, index)
                .await
            {
                Ok(stored) => {
                    metrics::counter!("functions.images.stored").increment(1);
                    images.push(stored);
                    true
                }
                Err(e) => {
                    metrics::counter!("functions.images.skipped", "reason" => e.kind())
                        .increment(1);
                    error!(image_index = index, error = %e, "Failed to process image, skipping");
                    matches!(e, FunctionError::Persist(_))
                }
            };

            if uploaded && index + 1 < total {
                info!(
                    delay_ms = self.download_delay.as_millis() as u64,
                    "Waiting before next download"
                );
                self.waiter.wait(self.download_delay).await;
            }
        }

        let downloaded = images.len();
        if downloaded < total {
            warn!(downloaded = downloaded, total = total, "Some images were skipped");
        }

        Ok(ExtractionSummary {
            success: true,
            message: format!("Downloaded {} of {} images", downloaded, total),
            downloaded,
            total,
            images,
        })
    }

    /// Download one image, mirror it into the object store and record it
    async fn store_image(
        &self,
        post_url: &str,
        image_url: &str,
        link_id: &str,
        user_id: &str,
        index: usize,
    ) -> Result<ExtractedImageRef, FunctionError> {
        info!(image_index = index, image_url = %image_url, "Downloading image");
        let body = self.http.get_bytes(image_url).await?;

        let path = storage_path(user_id, link_id, index, Utc::now().timestamp_millis());
        self.object_store
            .upload(&path, body, IMAGE_CONTENT_TYPE, false)
            .await?;

        let public_url = self.object_store.public_url(&path);
        let image_index = i32::try_from(index)
            .map_err(|_| FunctionError::Persist(format!("image index {} out of range", index)))?;

        self.record_store
            .insert_image(&StoredImageRecord {
                user_id: user_id.to_string(),
                link_id: link_id.to_string(),
                image_url: public_url.clone(),
                storage_path: path,
                instagram_post_url: post_url.to_string(),
                image_index,
            })
            .await?;

        info!(image_index = index, public_url = %public_url, "Image stored");

        Ok(ExtractedImageRef {
            image_url: public_url,
            image_index: index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use uuid::Uuid;

    const POST_URL: &str = "https://www.instagram.com/p/C0ffee/";
    const USER_ID: &str = "user-1";
    const LINK_ID: &str = "link-1";

    type EventLog = Arc<Mutex<Vec<String>>>;

    struct FakeHttp {
        page: Result<String, FetchError>,
        failing_images: HashSet<String>,
        events: EventLog,
    }

    #[async_trait]
    impl HttpClient for FakeHttp {
        async fn get_text(&self, url: &str, _user_agent: &str) -> Result<String, FetchError> {
            self.events.lock().unwrap().push(format!("page {}", url));
            self.page.clone()
        }

        async fn get_bytes(&self, url: &str) -> Result<Bytes, FetchError> {
            self.events.lock().unwrap().push(format!("download {}", url));
            if self.failing_images.contains(url) {
                Err(FetchError::Status { status: 404 })
            } else {
                Ok(Bytes::from_static(b"\xFF\xD8jpeg"))
            }
        }
    }

    #[derive(Default)]
    struct FakeObjectStore {
        objects: Mutex<HashMap<String, (String, bool)>>,
        failing_indices: HashSet<usize>,
        events: EventLog,
    }

    #[async_trait]
    impl ObjectStore for FakeObjectStore {
        async fn upload(
            &self,
            path: &str,
            _body: Bytes,
            content_type: &str,
            overwrite: bool,
        ) -> Result<(), FunctionError> {
            self.events.lock().unwrap().push(format!("upload {}", path));
            let failing = self
                .failing_indices
                .iter()
                .any(|i| path.contains(&format!("_{}_", i)));
            let mut objects = self.objects.lock().unwrap();
            if failing || (!overwrite && objects.contains_key(path)) {
                return Err(FunctionError::Upload("object exists".to_string()));
            }
            objects.insert(path.to_string(), (content_type.to_string(), overwrite));
            Ok(())
        }

        fn public_url(&self, path: &str) -> String {
            format!("https://cdn.test/{}", path)
        }
    }

    #[derive(Default)]
    struct FakeRecordStore {
        records: Mutex<Vec<StoredImageRecord>>,
        failing_indices: HashSet<i32>,
        events: EventLog,
    }

    #[async_trait]
    impl RecordStore for FakeRecordStore {
        async fn insert_image(&self, record: &StoredImageRecord) -> Result<Uuid, FunctionError> {
            self.events
                .lock()
                .unwrap()
                .push(format!("insert {}", record.image_index));
            if self.failing_indices.contains(&record.image_index) {
                return Err(FunctionError::Persist("constraint violation".to_string()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(Uuid::new_v4())
        }

        async fn ping(&self) -> Result<(), FunctionError> {
            Ok(())
        }
    }

    struct RecordingWaiter {
        events: EventLog,
    }

    #[async_trait]
    impl Waiter for RecordingWaiter {
        async fn wait(&self, duration: Duration) {
            self.events
                .lock()
                .unwrap()
                .push(format!("wait {}", duration.as_millis()));
        }
    }

    struct Harness {
        extractor: InstagramImageExtractor,
        object_store: Arc<FakeObjectStore>,
        record_store: Arc<FakeRecordStore>,
        events: EventLog,
    }

    fn page_with_images(count: usize) -> String {
        let mut html = String::from(
            r#"<html><head><meta property="og:image" content="https://img.test/0.jpg"></head><script>"#,
        );
        for i in 0..count {
            html.push_str(&format!(r#"{{"display_url":"https://img.test/{}.jpg"}},"#, i));
        }
        html.push_str("</script></html>");
        html
    }

    fn harness(
        page: Result<String, FetchError>,
        failing_downloads: &[usize],
        failing_uploads: &[usize],
        failing_inserts: &[i32],
    ) -> Harness {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let http = Arc::new(FakeHttp {
            page,
            failing_images: failing_downloads
                .iter()
                .map(|i| format!("https://img.test/{}.jpg", i))
                .collect(),
            events: events.clone(),
        });
        let object_store = Arc::new(FakeObjectStore {
            failing_indices: failing_uploads.iter().copied().collect(),
            events: events.clone(),
            ..Default::default()
        });
        let record_store = Arc::new(FakeRecordStore {
            failing_indices: failing_inserts.iter().copied().collect(),
            events: events.clone(),
            ..Default::default()
        });
        let waiter = Arc::new(RecordingWaiter {
            events: events.clone(),
        });

        let extractor = InstagramImageExtractor::new(
            http,
            object_store.clone(),
            record_store.clone(),
            waiter,
            "browser-agent",
            Duration::from_millis(3000),
        );

        Harness {
            extractor,
            object_store,
            record_store,
            events,
        }
    }

    fn count_events(events: &EventLog, prefix: &str) -> usize {
        count_events_in(&events.lock().unwrap(), prefix)
    }

    fn count_events_in(events: &[String], prefix: &str) -> usize {
        events.iter().filter(|e| e.starts_with(prefix)).count()
    }

    #[test]
    fn test_supported_post_urls() {
        assert!(is_supported_post("https://www.instagram.com/p/C0ffee/"));
        assert!(!is_supported_post("https://www.instagram.com/reel/C0ffee/"));
        assert!(!is_supported_post("https://example.com/p/abc"));
    }

    #[test]
    fn test_discovery_dedupes_primary_image() {
        let html = r#"
            <meta property="og:image" content="https://img.test/b.jpg">
            {"display_url":"https://img.test/a.jpg"}
            {"display_url":"https://img.test/b.jpg"}
            {"display_url":"https://img.test/a.jpg"}
            {"display_url":"https://img.test/c.jpg?x=1&y=2"}
        "#;

        assert_eq!(
            discover_image_urls(html),
            vec![
                "https://img.test/b.jpg".to_string(),
                "https://img.test/a.jpg".to_string(),
                "https://img.test/c.jpg?x=1&y=2".to_string(),
            ]
        );
    }

    #[test]
    fn test_storage_path_layout() {
        assert_eq!(
            storage_path("user-1", "link-1", 2, 1_700_000_000_000),
            "user-1/link-1_2_1700000000000.jpg"
        );
        assert_eq!(storage_path("../x", "a/b", 0, 1), "___x/a_b_0_1.jpg");
    }

    #[tokio::test]
    async fn test_unsupported_post_makes_no_calls() {
        let h = harness(Ok(page_with_images(3)), &[], &[], &[]);

        let summary = h
            .extractor
            .extract_and_store("https://www.instagram.com/reel/abc/", LINK_ID, USER_ID)
            .await
            .unwrap();

        assert!(!summary.success);
        assert_eq!(summary.downloaded, 0);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.message, "Not an Instagram image post");
        assert!(h.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stores_every_image_in_order() {
        let h = harness(Ok(page_with_images(3)), &[], &[], &[]);

        let summary = h
            .extractor
            .extract_and_store(POST_URL, LINK_ID, USER_ID)
            .await
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.downloaded, 3);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.message, "Downloaded 3 of 3 images");
        let indices: Vec<usize> = summary.images.iter().map(|i| i.image_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);

        let records = h.record_store.records.lock().unwrap();
        assert_eq!(records.len(), 3);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.image_index, i as i32);
            assert_eq!(record.user_id, USER_ID);
            assert_eq!(record.link_id, LINK_ID);
            assert_eq!(record.instagram_post_url, POST_URL);
            assert!(record
                .storage_path
                .starts_with(&format!("{}/{}_{}_", USER_ID, LINK_ID, i)));
            assert_eq!(
                record.image_url,
                format!("https://cdn.test/{}", record.storage_path)
            );
        }

        for (content_type, overwrite) in h.object_store.objects.lock().unwrap().values() {
            assert_eq!(content_type, "image/jpeg");
            assert!(!overwrite);
        }
    }

    #[tokio::test]
    async fn test_waits_between_images_but_not_after_last() {
        let h = harness(Ok(page_with_images(3)), &[], &[], &[]);

        h.extractor
            .extract_and_store(POST_URL, LINK_ID, USER_ID)
            .await
            .unwrap();

        let events = h.events.lock().unwrap();
        let waits: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.starts_with("wait"))
            .map(|(i, _)| i)
            .collect();

        assert_eq!(waits.len(), 2);
        assert!(events.iter().all(|e| !e.starts_with("wait") || e == "wait 3000"));
        assert_eq!(events.last().map(String::as_str), Some("insert 2"));
        // each wait sits between one image's insert and the next download
        for i in waits {
            assert!(events[i - 1].starts_with("insert"));
            assert!(events[i + 1].starts_with("download"));
        }
    }

    #[tokio::test]
    async fn test_failed_download_leaves_gap() {
        let h = harness(Ok(page_with_images(4)), &[2], &[], &[]);

        let summary = h
            .extractor
            .extract_and_store(POST_URL, LINK_ID, USER_ID)
            .await
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.downloaded, 3);
        assert_eq!(summary.total, 4);
        let indices: Vec<usize> = summary.images.iter().map(|i| i.image_index).collect();
        assert_eq!(indices, vec![0, 1, 3]);
        assert_eq!(count_events(&h.events, "wait"), 2);
        assert_eq!(count_events(&h.events, "upload"), 3);
    }

    #[tokio::test]
    async fn test_failed_download_moves_on_without_waiting() {
        let h = harness(Ok(page_with_images(2)), &[0], &[], &[]);

        let summary = h
            .extractor
            .extract_and_store(POST_URL, LINK_ID, USER_ID)
            .await
            .unwrap();

        assert_eq!(summary.downloaded, 1);
        let events = h.events.lock().unwrap();
        assert_eq!(events[1], "download https://img.test/0.jpg");
        assert_eq!(events[2], "download https://img.test/1.jpg");
        assert!(!events.iter().any(|e| e.starts_with("wait")));
    }

    #[tokio::test]
    async fn test_failed_upload_and_insert_are_skipped() {
        let h = harness(Ok(page_with_images(3)), &[], &[0], &[1]);

        let summary = h
            .extractor
            .extract_and_store(POST_URL, LINK_ID, USER_ID)
            .await
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.images[0].image_index, 2);
        assert_eq!(count_events(&h.events, "insert"), 2);
        assert_eq!(h.record_store.records.lock().unwrap().len(), 1);
        // Upload failure at 0 skips the pause; the insert failure at 1 keeps it.
        let events = h.events.lock().unwrap();
        let wait_at = events.iter().position(|e| e.starts_with("wait")).unwrap();
        assert_eq!(events[wait_at - 1], "insert 1");
        assert_eq!(count_events_in(&events, "wait"), 1);
    }

    #[tokio::test]
    async fn test_discovery_failure_is_fatal() {
        let h = harness(Err(FetchError::Status { status: 429 }), &[], &[], &[]);

        let err = h
            .extractor
            .extract_and_store(POST_URL, LINK_ID, USER_ID)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FunctionError::Fetch(FetchError::Status { status: 429 })
        ));
        assert_eq!(count_events(&h.events, "download"), 0);
    }

    #[tokio::test]
    async fn test_no_images_found() {
        let h = harness(Ok("<html></html>".to_string()), &[], &[], &[]);

        let summary = h
            .extractor
            .extract_and_store(POST_URL, LINK_ID, USER_ID)
            .await
            .unwrap();

        assert!(!summary.success);
        assert_eq!(summary.message, "No images found");
        assert_eq!(summary.downloaded, 0);
        assert_eq!(count_events(&h.events, "wait"), 0);
    }
}
