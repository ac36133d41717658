use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use image::imageops::FilterType;
use image::ImageFormat;
use lumus_core::config::OcrConfig;
use lumus_core::TextRecognizer;
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

/// Long-lived handle on the tesseract engine.
///
/// Opened once at startup and closed at shutdown; recognitions are
/// serialized so only one engine process runs at a time.
pub struct TesseractService {
    command: String,
    languages: String,
    target_height: u32,
    open: Mutex<bool>,
}

impl TesseractService {
    pub fn open(config: &OcrConfig) -> Result<Self> {
        let output = Command::new(&config.command)
            .arg("--version")
            .output()
            .with_context(|| format!("failed to start {:?}", config.command))?;
        if !output.status.success() {
            bail!("{} --version exited with {}", config.command, output.status);
        }

        // tesseract prints its version on stdout or stderr depending on the build
        let banner = [&output.stdout[..], &output.stderr[..]]
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .find_map(|text| text.lines().next().map(str::to_owned))
            .unwrap_or_default();
        info!(command = %config.command, version = %banner, "text recognition ready");

        Ok(Self {
            command: config.command.clone(),
            languages: config.languages.join("+"),
            target_height: config.target_height,
            open: Mutex::new(true),
        })
    }

    pub fn close(&self) {
        let mut open = self.open.lock();
        if *open {
            *open = false;
            info!("text recognition closed");
        }
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }
}

impl TextRecognizer for TesseractService {
    #[instrument(skip(self), fields(image = %image.display()))]
    fn recognize(&self, image: &Path) -> Result<String> {
        let open = self.open.lock();
        if !*open {
            bail!("text recognition service is closed");
        }

        let prepared = prepare_image(image, self.target_height)?;
        let output = Command::new(&self.command)
            .arg(&prepared)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .output()
            .with_context(|| format!("failed to start {:?}", self.command))?;
        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(chars = text.chars().count(), "recognized text");
        Ok(text)
    }
}

/// Scales `source` to `target_height` pixels (aspect preserved, Lanczos3)
/// and writes it as a PNG next to the source.
pub fn prepare_image(source: &Path, target_height: u32) -> Result<PathBuf> {
    let decoded = image::open(source).with_context(|| format!("failed to decode {:?}", source))?;
    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        bail!("{:?} has no pixels", source);
    }

    let scaled = if target_height == 0 || height == target_height {
        decoded
    } else {
        let target_width =
            ((u64::from(width) * u64::from(target_height)) / u64::from(height)).max(1);
        let target_width = u32::try_from(target_width).unwrap_or(u32::MAX);
        decoded.resize_exact(target_width, target_height, FilterType::Lanczos3)
    };

    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_owned());
    let target = source.with_file_name(format!("{stem}-ocr.png"));
    scaled
        .save_with_format(&target, ImageFormat::Png)
        .with_context(|| format!("failed to write {:?}", target))?;
    Ok(target)
}
