//! LinkKeeper Functions
//!
//! Backend functions for the LinkKeeper bookmarking app. Two stateless
//! request handlers are served over HTTP:
//!
//! - **Link metadata**: resolves a title and thumbnail for a pasted URL,
//!   trying Instagram's oEmbed endpoint first and falling back to Open Graph /
//!   Twitter card meta tags. Links are also tagged with a category derived
//!   from their host.
//! - **Instagram image mirroring**: discovers every image of an Instagram
//!   post, then downloads, uploads and records them one at a time with a fixed
//!   pause between downloads.
//!
//! ## Architecture
//!
//! ```text
//!  Client app                      Functions service                 Collaborators
//! ┌──────────────┐   POST        ┌──────────────────┐   GET        ┌──────────────┐
//! │ Add link     │──────────────▶│ MetadataFetcher  │─────────────▶│ oEmbed / page│
//! └──────────────┘               └──────────────────┘              └──────────────┘
//! ┌──────────────┐   POST        ┌──────────────────┐   GET        ┌──────────────┐
//! │ Save images  │──────────────▶│ InstagramImage   │─────────────▶│ Instagram    │
//! └──────────────┘   + bearer    │ Extractor        │              └──────────────┘
//!                                │  (sequential,    │   PUT        ┌──────────────┐
//!                                │   paced loop)    │─────────────▶│ S3 bucket    │
//!                                │                  │   INSERT     ┌──────────────┐
//!                                │                  │─────────────▶│ PostgreSQL   │
//!                                └──────────────────┘              └──────────────┘
//! ```
//!
//! Every outside system sits behind a trait ([`HttpClient`], [`ObjectStore`],
//! [`RecordStore`], [`AuthVerifier`], [`Waiter`]) so handlers can run against
//! in-memory doubles.

pub mod api;
pub mod auth;
pub mod category;
pub mod config;
pub mod error;
pub mod gallery_store;
pub mod html;
pub mod http_client;
pub mod instagram;
pub mod link_metadata;
pub mod s3_uploader;
pub mod waiter;

pub use api::{create_router, start_api_server, AppState};
pub use auth::{AuthVerifier, HttpAuthVerifier};
pub use category::{detect_category, LinkCategory};
pub use config::Config;
pub use error::{FetchError, FunctionError};
pub use gallery_store::{GalleryStore, RecordStore, StoredImageRecord};
pub use http_client::{HttpClient, ReqwestHttpClient};
pub use instagram::{ExtractedImageRef, ExtractionSummary, InstagramImageExtractor};
pub use link_metadata::{MetadataFetcher, MetadataOutcome, MetadataResult};
pub use s3_uploader::{ObjectStore, S3Uploader};
pub use waiter::{TokioWaiter, Waiter};
