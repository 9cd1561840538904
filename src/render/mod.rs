pub mod color;
pub mod document;
pub mod font;
pub mod raster;

use std::path::Path;

use thiserror::Error;

pub use color::Rgb;
pub use document::DocumentRenderer;
pub use font::FontResolution;
pub use raster::RasterRenderer;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF has no pages")]
    EmptyDocument,
}

/// Where and how the name is drawn. Offsets are pixels for raster templates
/// and points (from the bottom-left corner) for PDF templates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub font_size: f32,
    pub color: Rgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Raster,
    Document,
}

impl TemplateKind {
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "png" | "jpg" | "jpeg" => Some(Self::Raster),
            "pdf" => Some(Self::Document),
            _ => None,
        }
    }

    pub fn default_color(self) -> &'static str {
        match self {
            Self::Raster => "black",
            Self::Document => "#000000",
        }
    }

    pub fn default_font_size(self) -> i64 {
        match self {
            Self::Raster => 30,
            Self::Document => 12,
        }
    }
}

/// One template, drawn once per record.
pub trait CertificateRenderer {
    /// Extension of the produced files, without the dot.
    fn extension(&self) -> &str;

    fn render(&self, text: &str) -> Result<Vec<u8>, RenderError>;
}
