//! Resumable multipart uploads to S3-compatible object stores.
//!
//! The [`Uploader`] drives a session end to end: bucket check, initiate,
//! bounded-concurrency part workers with retries, durable status after every
//! acknowledged part, and complete-or-abort teardown. [`Uploader::resume`]
//! reconciles a persisted status with the server's part list and uploads
//! only what is missing.

mod client;
mod compress;
mod config;
mod engine;
mod error;
mod events;
mod list;
mod resume;

pub use client::new_client;
pub use config::Config;
pub use engine::Uploader;
pub use error::UploadError;
pub use events::UploadEvent;
pub use list::{MultipartUploadInfo, ObjectInfo};
