use std::io::Cursor;

use image::{AnimationDecoder, DynamicImage, ImageFormat, codecs::gif::GifDecoder, imageops::FilterType};

pub const WEBP: &str = "image/webp";

pub const AVATAR_MAX_BYTES: usize = 1024 * 1024;
pub const POSTER_MAX_BYTES: usize = 5 * 1024 * 1024;

pub const AVATAR_SMALL: u32 = 64;
pub const AVATAR_LARGE: u32 = 512;

const POSTER_MAX_WIDTH: u32 = 600;
const POSTER_MAX_HEIGHT: u32 = 900;

const ALLOWED: &[(&str, ImageFormat)] = &[
    ("image/jpeg", ImageFormat::Jpeg),
    ("image/jpg", ImageFormat::Jpeg),
    ("image/png", ImageFormat::Png),
    ("image/webp", ImageFormat::WebP),
    ("image/gif", ImageFormat::Gif),
];

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("invalid image type, allowed types are jpeg, png, webp and static gif")]
    InvalidType,

    #[error("invalid image resolution, image must be square")]
    InvalidResolution,

    #[error("image is larger than {limit} bytes")]
    TooLarge { limit: usize },
}

#[derive(Clone, Debug)]
pub struct Variant {
    pub size: u32,
    pub bytes: Vec<u8>,
}

/// Validates a square avatar and renders one WebP variant per requested edge length.
pub fn process_avatar(
    bytes: &[u8],
    declared: Option<&str>,
    sizes: &[u32],
) -> Result<Vec<Variant>, ImageError> {
    let img = decode(bytes, declared, AVATAR_MAX_BYTES)?;
    if img.width() != img.height() || img.width() == 0 {
        return Err(ImageError::InvalidResolution);
    }

    sizes
        .iter()
        .map(|&size| {
            let resized = img.resize_exact(size, size, FilterType::Lanczos3);
            Ok(Variant { size, bytes: encode_webp(&resized)? })
        })
        .collect()
}

/// Validates a poster and shrinks it to fit the poster frame, keeping its aspect ratio.
pub fn process_poster(bytes: &[u8], declared: Option<&str>) -> Result<Vec<u8>, ImageError> {
    let img = decode(bytes, declared, POSTER_MAX_BYTES)?;
    let img = if img.width() > POSTER_MAX_WIDTH || img.height() > POSTER_MAX_HEIGHT {
        img.resize(POSTER_MAX_WIDTH, POSTER_MAX_HEIGHT, FilterType::Lanczos3)
    } else {
        img
    };
    encode_webp(&img)
}

fn decode(bytes: &[u8], declared: Option<&str>, limit: usize) -> Result<DynamicImage, ImageError> {
    if bytes.len() > limit {
        return Err(ImageError::TooLarge { limit });
    }

    let declared = match declared.map(|d| d.trim().to_ascii_lowercase()) {
        Some(mime) if !mime.is_empty() && mime != "application/octet-stream" => Some(
            ALLOWED
                .iter()
                .find(|(m, _)| *m == mime)
                .map(|(_, f)| *f)
                .ok_or(ImageError::InvalidType)?,
        ),
        _ => None,
    };

    let sniffed = image::guess_format(bytes).map_err(|_| ImageError::InvalidType)?;
    if !ALLOWED.iter().any(|(_, f)| *f == sniffed) || declared.is_some_and(|d| d != sniffed) {
        return Err(ImageError::InvalidType);
    }

    if sniffed == ImageFormat::Gif && is_animated(bytes) {
        return Err(ImageError::InvalidType);
    }

    image::load_from_memory_with_format(bytes, sniffed).map_err(|_| ImageError::InvalidType)
}

fn is_animated(bytes: &[u8]) -> bool {
    match GifDecoder::new(Cursor::new(bytes)) {
        Ok(decoder) => decoder.into_frames().take(2).count() > 1,
        Err(_) => false,
    }
}

fn encode_webp(img: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img.to_rgba8())
        .write_to(&mut Cursor::new(&mut out), ImageFormat::WebP)
        .map_err(|err| {
            tracing::warn!(error = %err, "webp encoding failed");
            ImageError::InvalidType
        })?;
    Ok(out)
}


#[cfg(test)]
mod tests {
    use image::{Delay, Frame, RgbaImage, codecs::gif::GifEncoder};

    use super::{fixtures::png, *};

    fn dims(webp: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory_with_format(webp, ImageFormat::WebP).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn avatar_variants_are_square_webp() {
        let variants =
            process_avatar(&png(100, 100), Some("image/png"), &[AVATAR_SMALL, AVATAR_LARGE]).unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(dims(&variants[0].bytes), (64, 64));
        assert_eq!(dims(&variants[1].bytes), (512, 512));
    }

    #[test]
    fn avatar_must_be_square() {
        let err = process_avatar(&png(120, 80), Some("image/png"), &[AVATAR_SMALL]).unwrap_err();
        assert_eq!(err, ImageError::InvalidResolution);
    }

    #[test]
    fn size_limit_is_checked_first() {
        let big = vec![0u8; AVATAR_MAX_BYTES + 1];
        let err = process_avatar(&big, Some("text/plain"), &[AVATAR_SMALL]).unwrap_err();
        assert_eq!(err, ImageError::TooLarge { limit: AVATAR_MAX_BYTES });
    }

    #[test]
    fn rejects_types_outside_the_allow_list() {
        let bytes = png(10, 10);
        assert_eq!(process_poster(&bytes, Some("text/plain")).unwrap_err(), ImageError::InvalidType);
        assert_eq!(process_poster(&bytes, Some("image/jpeg")).unwrap_err(), ImageError::InvalidType);
        assert_eq!(process_poster(b"not an image", None).unwrap_err(), ImageError::InvalidType);
    }

    #[test]
    fn rejects_animated_gif() {
        let mut bytes = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut bytes);
            let frames = (0..2).map(|i| {
                let img = RgbaImage::from_pixel(8, 8, image::Rgba([i * 100, 0, 0, 255]));
                Frame::from_parts(img, 0, 0, Delay::from_numer_denom_ms(100, 1))
            });
            encoder.encode_frames(frames).unwrap();
        }
        assert_eq!(
            process_avatar(&bytes, Some("image/gif"), &[AVATAR_SMALL]).unwrap_err(),
            ImageError::InvalidType
        );
    }

    #[test]
    fn poster_is_shrunk_into_frame() {
        let out = process_poster(&png(1200, 1800), None).unwrap();
        assert_eq!(dims(&out), (600, 900));

        let small = process_poster(&png(300, 200), Some("image/png")).unwrap();
        assert_eq!(dims(&small), (300, 200));
    }
}
