use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use thiserror::Error;

/// Prefix added to the prompt when a request carries a usable image.
pub const IMAGE_PROMPT_CUE: &str = "Analyze this image and answer: ";

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Decodes base64 image data, a leading `data:<mime>;base64,` header is accepted.
pub fn decode_base64_image(data: &str, max_size: u32) -> Result<DynamicImage, ImageError> {
    let payload = match data.split_once(";base64,") {
        Some((header, payload)) if header.starts_with("data:") => payload,
        _ => data,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(cleaned)?;
    decode_image(&bytes, max_size)
}

/// Decodes raw image bytes into RGB and fits them within `max_size` on both sides.
pub fn decode_image(bytes: &[u8], max_size: u32) -> Result<DynamicImage, ImageError> {
    let image = image::load_from_memory(bytes)?;
    let image = DynamicImage::ImageRgb8(image.to_rgb8());

    let (width, height) = image.dimensions();
    if width.max(height) <= max_size {
        return Ok(image);
    }

    let resized = image.resize(max_size, max_size, FilterType::Lanczos3);
    tracing::debug!(
        "Resized image from {}x{} to {}x{}",
        width,
        height,
        resized.width(),
        resized.height()
    );
    Ok(DynamicImage::ImageRgb8(resized.to_rgb8()))
}
