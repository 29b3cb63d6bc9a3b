use chrono::{DateTime, FixedOffset, Local};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelfServiceError {
    #[error("Samad unreachable: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Samad returned {status} for {context}")]
    HttpStatus { status: u16, context: &'static str },
    #[error("unexpected Samad page: {0}")]
    Scrape(String),
    #[error(transparent)]
    Captcha(#[from] CaptchaError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("meal {id} at {date} not found in this or next week")]
    MealNotFound {
        id: String,
        date: DateTime<FixedOffset>,
    },
}

impl SelfServiceError {
    pub fn scrape(msg: impl Into<String>) -> Self {
        Self::Scrape(msg.into())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    #[error("Samad login page has no CSRF token")]
    MissingCsrf,
    #[error("Samad login page failed: {0}")]
    LoginPageFailed(u16),
    #[error("Samad login request failed: {0}")]
    LoginRequestFailed(u16),
    #[error("Samad login rejected: {0}")]
    LoginRejected(String),
}

#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("captcha image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
    #[error("OCR unavailable: {0}")]
    OcrUnavailable(std::io::Error),
    #[error("OCR failed: {0}")]
    OcrFailed(String),
}

/// Error banner the portal rendered after a write, kept verbatim for the user.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message}")]
pub struct Rejection {
    pub message: String,
    pub at: DateTime<Local>,
}
