//! Renderer seam. The crate ships no ray tracer; hosts plug one in through [`Renderer`].

use std::io::Cursor;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelFlag;
use crate::scene::CompiledScene;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 400,
            height: 300,
            samples_per_pixel: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("render failed: {0}")]
    Failed(String),
    #[error("render cancelled")]
    Cancelled,
}

/// Row-major 8-bit RGBA pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl PixelBuffer {
    pub fn to_png(&self) -> Result<Vec<u8>, RenderError> {
        let image = image::RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
            .ok_or_else(|| {
                RenderError::Failed(format!(
                    "pixel buffer holds {} bytes, expected {}x{}x4",
                    self.rgba.len(),
                    self.width,
                    self.height
                ))
            })?;
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, image::ImageFormat::Png)
            .map_err(|e| RenderError::Failed(e.to_string()))?;
        Ok(out.into_inner())
    }
}

/// Turns a compiled scene into pixels. Called from a blocking thread; long
/// renders should poll `cancel` and return [`RenderError::Cancelled`].
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        scene: &CompiledScene,
        settings: &RenderSettings,
        cancel: &CancelFlag,
    ) -> Result<PixelBuffer, RenderError>;
}
