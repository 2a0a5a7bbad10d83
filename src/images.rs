//! Image loading and validation for classification.
//!
//! Report images are referenced by http(s) URL or local path. Bytes are
//! fetched (with retries for remote images) and validated before they are
//! sent to the classifier:
//! - Non-empty and within the size limit
//! - Magic bytes match a known format
//! - Not an HTML error page
//! - Successfully decodes

use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use std::io::Read;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;
use url::Url;

/// Where the bytes of an image reference come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Remote(Url),
    Local(PathBuf),
}

/// Interpret an image reference. Anything that is not an http(s) or file URL
/// is treated as a local path.
pub fn parse_image_ref(reference: &str) -> Result<ImageSource> {
    let reference = reference.trim();
    if reference.is_empty() {
        bail!("empty image reference");
    }

    let reference = if reference.starts_with("//") {
        format!("https:{reference}")
    } else {
        reference.to_string()
    };

    match Url::parse(&reference) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(ImageSource::Remote(url)),
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map(ImageSource::Local)
            .map_err(|_| anyhow::anyhow!("invalid file url: {url}")),
        Ok(url) if url.scheme().len() > 1 => bail!("unsupported image url scheme: {}", url.scheme()),
        // relative paths and windows drive letters
        _ => Ok(ImageSource::Local(PathBuf::from(reference))),
    }
}

/// Read the referenced image, fetching remote images over HTTP.
pub fn load_image_bytes(
    client: &reqwest::blocking::Client,
    reference: &str,
    retries: u32,
    max_bytes: usize,
) -> Result<Vec<u8>> {
    let bytes = match parse_image_ref(reference)? {
        ImageSource::Remote(url) => fetch_with_retries(client, &url, retries, max_bytes)?,
        ImageSource::Local(path) => {
            let file = std::fs::File::open(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            read_limited(file, max_bytes)
                .with_context(|| format!("failed to read {}", path.display()))?
        }
    };

    validate_image(&bytes)?;
    Ok(bytes)
}

/// GET the url, retrying on transport errors, 429 and 5xx.
fn fetch_with_retries(
    client: &reqwest::blocking::Client,
    url: &Url,
    retries: u32,
    max_bytes: usize,
) -> Result<Vec<u8>> {
    let iden = format!("{}{}", url.host_str().unwrap_or_default(), url.path());
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        if attempt > 1 {
            log::debug!("{iden}: retrying");
        }

        let last_attempt = attempt > retries;

        log::debug!("{iden}: requesting");
        let resp = match client.get(url.clone()).send() {
            Ok(resp) => resp,
            Err(err) if !last_attempt => {
                log::debug!("{iden}: {err}");
                continue;
            }
            Err(err) => return Err(err).with_context(|| format!("failed to fetch {url}")),
        };

        let status = resp.status();
        if status.is_success() {
            if let Some(len) = resp.content_length() {
                if len > max_bytes as u64 {
                    bail!("{url} is {len} bytes, limit is {max_bytes}");
                }
            }
            return read_limited(resp, max_bytes)
                .with_context(|| format!("failed to read body of {url}"));
        }

        log::debug!("{iden}: {status}");

        if last_attempt || (status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS) {
            bail!("{url} returned {status}");
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            sleep(Duration::from_secs(u64::from(attempt) * 2));
        }
    }
}

/// Read at most `max_bytes`, failing instead of buffering anything larger.
fn read_limited<R: Read>(reader: R, max_bytes: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut bytes)?;

    if bytes.len() > max_bytes {
        bail!("image is larger than the {max_bytes} byte limit");
    }
    Ok(bytes)
}

/// Check that bytes are a decodable image and return its dimensions.
pub fn validate_image(bytes: &[u8]) -> Result<(u32, u32)> {
    if bytes.is_empty() {
        bail!("image is empty");
    }

    if is_html_content(bytes) {
        bail!("got an html page instead of an image");
    }

    if !has_valid_magic_bytes(bytes) {
        bail!("unrecognized image format");
    }

    let img = image::load_from_memory(bytes).context("failed to decode image")?;
    Ok((img.width(), img.height()))
}

/// MIME type for the classifier request, sniffed from the bytes.
pub fn detect_mime(bytes: &[u8]) -> &'static str {
    infer::get(bytes)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream")
}

fn has_valid_magic_bytes(bytes: &[u8]) -> bool {
    // PNG
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return true;
    }

    // JPEG
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return true;
    }

    // GIF
    if bytes.starts_with(b"GIF8") {
        return true;
    }

    // WebP
    if bytes.len() >= 12 && bytes[0..4] == *b"RIFF" && bytes[8..12] == *b"WEBP" {
        return true;
    }

    // BMP
    bytes.starts_with(b"BM")
}

fn is_html_content(bytes: &[u8]) -> bool {
    let check_len = bytes.len().min(50);
    let prefix = bytes[0..check_len].to_ascii_lowercase();
    let start = prefix
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(prefix.len());
    let prefix = &prefix[start..];

    prefix.starts_with(b"<!doctype") || prefix.starts_with(b"<html")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn create_image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img: RgbImage = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });

        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_parse_remote_refs() {
        assert!(matches!(
            parse_image_ref("https://cdn.example.com/items/1.jpg").unwrap(),
            ImageSource::Remote(_)
        ));
        match parse_image_ref("//cdn.example.com/a.png").unwrap() {
            ImageSource::Remote(url) => assert_eq!(url.scheme(), "https"),
            other => panic!("expected remote, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_local_refs() {
        assert_eq!(
            parse_image_ref("uploads/wallet.png").unwrap(),
            ImageSource::Local(PathBuf::from("uploads/wallet.png"))
        );
        assert_eq!(
            parse_image_ref("/srv/images/1.jpg").unwrap(),
            ImageSource::Local(PathBuf::from("/srv/images/1.jpg"))
        );
    }

    #[test]
    fn test_parse_rejects_empty_and_unknown_scheme() {
        assert!(parse_image_ref("   ").is_err());
        assert!(parse_image_ref("ftp://example.com/a.png").is_err());
    }

    #[test]
    fn test_validate_png_and_jpeg() {
        let png = create_image_bytes(40, 30, ImageFormat::Png);
        assert_eq!(validate_image(&png).unwrap(), (40, 30));

        let jpeg = create_image_bytes(64, 64, ImageFormat::Jpeg);
        assert_eq!(validate_image(&jpeg).unwrap(), (64, 64));
    }

    #[test]
    fn test_validate_rejects_html() {
        let html = b"<!DOCTYPE html><html><body>not found</body></html>";
        assert!(validate_image(html).is_err());
        let html = b"  <HTML><head></head></HTML>";
        assert!(validate_image(html).is_err());
    }

    #[test]
    fn test_validate_rejects_garbage_and_truncated() {
        assert!(validate_image(&[]).is_err());
        assert!(validate_image(&[0xAB; 600]).is_err());

        let mut truncated = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        truncated.resize(600, 0xFF);
        assert!(validate_image(&truncated).is_err());
    }

    #[test]
    fn test_detect_mime() {
        let png = create_image_bytes(4, 4, ImageFormat::Png);
        assert_eq!(detect_mime(&png), "image/png");
        assert_eq!(detect_mime(b"plain text"), "application/octet-stream");
    }

    #[test]
    fn test_load_local_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.png");
        std::fs::write(&path, create_image_bytes(16, 16, ImageFormat::Png)).unwrap();

        let client = reqwest::blocking::Client::new();
        let bytes = load_image_bytes(&client, path.to_str().unwrap(), 0, 1024 * 1024).unwrap();
        assert_eq!(validate_image(&bytes).unwrap(), (16, 16));

        // size limit
        assert!(load_image_bytes(&client, path.to_str().unwrap(), 0, 10).is_err());
    }

    #[test]
    fn test_read_limited_stops_past_limit() {
        assert_eq!(read_limited(Cursor::new(vec![7u8; 10]), 10).unwrap().len(), 10);
        assert!(read_limited(Cursor::new(vec![7u8; 11]), 10).is_err());

        // the reader is not drained beyond the limit
        let mut source = Cursor::new(vec![0u8; 4096]);
        assert!(read_limited(&mut source, 100).is_err());
        assert_eq!(source.position(), 101);
    }

    #[test]
    fn test_load_missing_local_image() {
        let client = reqwest::blocking::Client::new();
        assert!(load_image_bytes(&client, "/nonexistent/lostfound/x.png", 0, 1024).is_err());
    }
}
