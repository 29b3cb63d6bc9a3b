use std::{
    io::{Cursor, Write},
    process::{Command, Stdio},
    sync::Arc,
};

use image::ImageFormat;

use crate::errors::CaptchaError;

/// Turns a captcha image into a best-effort guess. A wrong guess is only noticed when the login
/// is rejected.
pub trait CaptchaSolver: Send + Sync {
    fn solve(&self, image: &[u8]) -> Result<String, CaptchaError>;
}

/// Pipes the captcha through the `tesseract` command line tool.
#[derive(Debug, Clone)]
pub struct TesseractSolver {
    command: String,
}

impl TesseractSolver {
    pub fn new(command: impl Into<String>) -> Self {
        TesseractSolver {
            command: command.into(),
        }
    }
}

impl Default for TesseractSolver {
    fn default() -> Self {
        TesseractSolver::new("tesseract")
    }
}

impl CaptchaSolver for TesseractSolver {
    fn solve(&self, image: &[u8]) -> Result<String, CaptchaError> {
        let png = prepare_image(image)?;

        // psm 7: treat the image as a single text line
        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "--psm", "7"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(CaptchaError::OcrUnavailable)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&png)
                .map_err(|e| CaptchaError::OcrFailed(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| CaptchaError::OcrFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(CaptchaError::OcrFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Decodes a JPEG/PNG captcha and re-encodes it as grayscale PNG.
pub fn prepare_image(image: &[u8]) -> Result<Vec<u8>, CaptchaError> {
    let decoded = image::load_from_memory(image)?;
    let mut png = Vec::new();
    decoded
        .grayscale()
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

/// Runs the solver off the async runtime and trims its guess.
pub async fn solve_captcha(
    solver: Arc<dyn CaptchaSolver>,
    image: Vec<u8>,
) -> Result<String, CaptchaError> {
    let guess = tokio::task::spawn_blocking(move || solver.solve(&image))
        .await
        .map_err(|e| CaptchaError::OcrFailed(e.to_string()))??;

    Ok(guess.trim().to_string())
}
