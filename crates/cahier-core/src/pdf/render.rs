//! Page rasterization for the OCR path.
//!
//! MuPDF renders the page, the `image` crate encodes the pixmap to
//! PNG. Synchronous; callers wrap it in `spawn_blocking`.

use std::io::Cursor;

use mupdf::{Colorspace, Document, Matrix};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to render page: {0}")]
    Mupdf(String),
    #[error("failed to encode page image: {0}")]
    Encode(String),
}

impl From<mupdf::Error> for RenderError {
    fn from(err: mupdf::Error) -> Self {
        RenderError::Mupdf(err.to_string())
    }
}

/// Render one page (0-based index) to PNG bytes at the given
/// resolution. PDF user space is 72 dpi, so the scale is `dpi / 72`.
pub fn render_page_png(
    pdf_bytes: &[u8],
    page_index: usize,
    dpi: f32,
) -> Result<Vec<u8>, RenderError> {
    let doc = Document::from_bytes(pdf_bytes, "application/pdf")?;
    let page = doc.load_page(page_index as i32)?;

    let scale = dpi / 72.0;
    let matrix = Matrix::new_scale(scale, scale);
    let pixmap = page.to_pixmap(&matrix, &Colorspace::device_rgb(), true, false)?;

    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let components = pixmap.n() as usize;

    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for pixel in 0..(width * height) as usize {
        let offset = pixel * components;
        let r = samples.get(offset).copied().unwrap_or(0);
        let g = samples.get(offset + 1).copied().unwrap_or(0);
        let b = samples.get(offset + 2).copied().unwrap_or(0);
        let a = if components >= 4 {
            samples.get(offset + 3).copied().unwrap_or(255)
        } else {
            255
        };
        rgba.extend_from_slice(&[r, g, b, a]);
    }

    let image = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| RenderError::Encode("pixmap buffer size mismatch".to_string()))?;

    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|err| RenderError::Encode(err.to_string()))?;

    Ok(png)
}
