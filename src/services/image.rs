//! Image type detection from leading bytes.

/// Image formats accepted as avatars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
    Tiff,
    Ico,
}

impl ImageType {
    #[must_use]
    pub const fn mime(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Ico => "image/x-icon",
        }
    }

    /// Sniffs `content`. The client-declared type plays no part.
    #[must_use]
    pub fn detect(content: &[u8]) -> Option<Self> {
        const SIGNATURES: &[(&[u8], ImageType)] = &[
            (b"\x89PNG\r\n\x1a\n", ImageType::Png),
            (b"\xff\xd8\xff", ImageType::Jpeg),
            (b"GIF87a", ImageType::Gif),
            (b"GIF89a", ImageType::Gif),
            (b"BM", ImageType::Bmp),
            (b"II*\x00", ImageType::Tiff),
            (b"MM\x00*", ImageType::Tiff),
            (b"\x00\x00\x01\x00", ImageType::Ico),
        ];

        if content.len() >= 12 && &content[..4] == b"RIFF" && &content[8..12] == b"WEBP" {
            return Some(Self::Webp);
        }

        SIGNATURES
            .iter()
            .find(|(magic, _)| content.starts_with(magic))
            .map(|(_, kind)| *kind)
    }
}

/// Keeps ASCII alphanumerics, `.`, `-` and `_` of the final path component.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "avatar".to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_formats() {
        assert_eq!(
            ImageType::detect(b"\x89PNG\r\n\x1a\n\x00\x00"),
            Some(ImageType::Png)
        );
        assert_eq!(ImageType::detect(b"\xff\xd8\xff\xe0"), Some(ImageType::Jpeg));
        assert_eq!(ImageType::detect(b"GIF89a..."), Some(ImageType::Gif));
        assert_eq!(
            ImageType::detect(b"RIFF\x00\x00\x00\x00WEBPVP8 "),
            Some(ImageType::Webp)
        );
        assert_eq!(ImageType::detect(b"II*\x00rest"), Some(ImageType::Tiff));
    }

    #[test]
    fn rejects_non_images() {
        assert_eq!(ImageType::detect(b"%PDF-1.7"), None);
        assert_eq!(ImageType::detect(b"hello world"), None);
        assert_eq!(ImageType::detect(b""), None);
        assert_eq!(ImageType::detect(b"RIFF\x00\x00\x00\x00WAVE"), None);
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_file_name("me.png"), "me.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\pics\\my face.jpg"), "my_face.jpg");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "avatar");
    }
}
