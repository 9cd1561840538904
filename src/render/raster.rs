use std::io::Cursor;
use std::path::{Path, PathBuf};

use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use rusttype::{point, Font, Scale};

use super::font::{FallbackFont, FontResolution};
use super::{CertificateRenderer, Placement, RenderError, Rgb};

pub struct RasterRenderer {
    template_path: PathBuf,
    format: ImageFormat,
    extension: String,
    placement: Placement,
    font: FontResolution,
}

impl RasterRenderer {
    pub fn new(
        template_path: impl Into<PathBuf>,
        placement: Placement,
        font: FontResolution,
    ) -> Result<Self, RenderError> {
        let template_path = template_path.into();
        let format = ImageFormat::from_path(&template_path)?;
        let extension = template_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("png")
            .to_ascii_lowercase();

        Ok(Self {
            template_path,
            format,
            extension,
            placement,
            font,
        })
    }
}

impl CertificateRenderer for RasterRenderer {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn render(&self, text: &str) -> Result<Vec<u8>, RenderError> {
        render_raster(&self.template_path, self.format, text, &self.placement, &self.font)
    }
}

/// Draws `text` on a freshly decoded copy of the template and re-encodes it in
/// `format`. The top-left corner of the text lands on the placement offset.
pub fn render_raster(
    template_path: &Path,
    format: ImageFormat,
    text: &str,
    placement: &Placement,
    font: &FontResolution,
) -> Result<Vec<u8>, RenderError> {
    let template = image::open(template_path)?;
    let keep_alpha = template.color().has_alpha() && format != ImageFormat::Jpeg;
    let mut canvas = template.into_rgba8();

    let x = i64::from(placement.x);
    let y = i64::from(placement.y);
    match font {
        FontResolution::Resolved(font) => {
            draw_truetype(&mut canvas, font, placement.font_size, x, y, placement.color, text)
        }
        FontResolution::FallbackUsed(_) => draw_bitmap(&mut canvas, x, y, placement.color, text),
    }

    let output = if keep_alpha {
        DynamicImage::ImageRgba8(canvas)
    } else {
        DynamicImage::ImageRgba8(canvas).into_rgb8().into()
    };

    let mut bytes = Vec::new();
    output.write_to(&mut Cursor::new(&mut bytes), format)?;
    Ok(bytes)
}

fn draw_truetype(
    img: &mut RgbaImage,
    font: &Font<'static>,
    px: f32,
    x: i64,
    y: i64,
    color: Rgb,
    text: &str,
) {
    let scale = Scale::uniform(px);
    let v_metrics = font.v_metrics(scale);
    let origin = point(x as f32, y as f32 + v_metrics.ascent);

    for glyph in font.layout(text, scale, origin) {
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, coverage| {
                blend(
                    img,
                    i64::from(gx) + i64::from(bb.min.x),
                    i64::from(gy) + i64::from(bb.min.y),
                    color,
                    coverage,
                );
            });
        }
    }
}

fn draw_bitmap(img: &mut RgbaImage, x: i64, y: i64, color: Rgb, text: &str) {
    let cell = i64::from(FallbackFont::CELL_SIZE);
    let mut caret_x = x;

    for ch in text.chars() {
        if caret_x >= i64::from(img.width()) {
            break;
        }
        let rows = BASIC_FONTS
            .get(ch)
            .or_else(|| LATIN_FONTS.get(ch))
            .or_else(|| BASIC_FONTS.get('?'))
            .unwrap_or([0; 8]);

        for (row, bits) in rows.iter().enumerate() {
            for col in 0..cell {
                // Bit 0 is the leftmost pixel.
                if bits & (1 << col) != 0 {
                    blend(img, caret_x + col, y + row as i64, color, 1.0);
                }
            }
        }
        caret_x += cell;
    }
}

fn blend(img: &mut RgbaImage, px: i64, py: i64, color: Rgb, coverage: f32) {
    if coverage <= 0.0 {
        return;
    }
    let (Ok(px), Ok(py)) = (u32::try_from(px), u32::try_from(py)) else {
        return;
    };
    if px >= img.width() || py >= img.height() {
        return;
    }

    let alpha = coverage.min(1.0);
    let inv = 1.0 - alpha;
    let dst = img.get_pixel_mut(px, py);
    let Rgba([r, g, b, a]) = *dst;
    *dst = Rgba([
        (f32::from(color.r) * alpha + f32::from(r) * inv) as u8,
        (f32::from(color.g) * alpha + f32::from(g) * inv) as u8,
        (f32::from(color.b) * alpha + f32::from(b) * inv) as u8,
        (255.0 * alpha + f32::from(a) * inv) as u8,
    ]);
}
