//! Image acquisition: fetch remote images and persist them durably

mod fetcher;
mod resolver;
mod strategy;
pub mod validate;

pub use fetcher::{FetchedPayload, HttpFetcher, ImageFetcher};
pub use resolver::{ImageOrigin, ResolvedImage, UploadResolver};
pub use strategy::{classify_failure, AcquisitionAttempt, AcquisitionError, FailureClass, Strategy};
