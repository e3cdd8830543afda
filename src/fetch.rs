use image::ImageFormat;
use std::io::Read;
use std::time::Duration;

/// Only these two arrive from the chart service; anything else is dropped
/// rather than embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub kind: ImageKind,
}

/// Response bodies above this are discarded; a chart render is tens of
/// kilobytes, so anything larger is a misbehaving upstream.
pub const MAX_IMAGE_BYTES: u64 = 4 * 1024 * 1024;

/// Sniffs the payload by magic bytes, ignoring whatever the server claimed.
pub fn sniff_image(bytes: &[u8]) -> Option<ImageKind> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some(ImageKind::Png),
        ImageFormat::Jpeg => Some(ImageKind::Jpeg),
        _ => None,
    }
}

/// Fetches the rendered chart. Every failure mode (network, status, size,
/// unrecognized format) comes back as `None`: the report is assembled without
/// its chart rather than failing the whole export.
pub fn fetch_chart_image(url: &str, timeout: Duration) -> Option<FetchedImage> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout(timeout)
        .build();
    let response = agent.get(url).call().ok()?;
    if response.status() != 200 {
        return None;
    }
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_IMAGE_BYTES + 1)
        .read_to_end(&mut bytes)
        .ok()?;
    if bytes.len() as u64 > MAX_IMAGE_BYTES {
        return None;
    }
    let kind = sniff_image(&bytes)?;
    Some(FetchedImage { bytes, kind })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_recognizes_png_and_jpeg_magic() {
        let png = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0];
        assert_eq!(sniff_image(&png), Some(ImageKind::Png));
        let jpeg = [0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        assert_eq!(sniff_image(&jpeg), Some(ImageKind::Jpeg));
    }

    #[test]
    fn sniff_rejects_other_payloads() {
        assert_eq!(sniff_image(b"<html>not an image</html>"), None);
        assert_eq!(sniff_image(b""), None);
        let gif = b"GIF89a\x01\x00\x01\x00";
        assert_eq!(sniff_image(gif), None);
    }
}
