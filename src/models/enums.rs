use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Invalid {field} value: {value}")]
pub struct InvalidEnum {
    pub field: &'static str,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// Declaration order is the order tags appear in a bundle.
str_enum!(ContentType {
    StructuredData => "structured_data",
    TextNote => "text_note",
    Images => "images",
});

str_enum!(ImageMime {
    Jpeg => "image/jpeg",
    Png => "image/png",
});

impl ImageMime {
    /// Map a declared upload content type onto an accepted image type.
    /// `image/jpg` is a common non-standard alias for JPEG.
    pub fn from_declared(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn content_type_round_trips_through_str() {
        for ct in [ContentType::StructuredData, ContentType::TextNote, ContentType::Images] {
            assert_eq!(ContentType::from_str(ct.as_str()).unwrap(), ct);
        }
    }

    #[test]
    fn content_type_serializes_snake_case() {
        let json = serde_json::to_string(&ContentType::StructuredData).unwrap();
        assert_eq!(json, "\"structured_data\"");
    }

    #[test]
    fn unknown_content_type_is_rejected() {
        let err = ContentType::from_str("video").unwrap_err();
        assert_eq!(err.field, "ContentType");
        assert_eq!(err.value, "video");
    }

    #[test]
    fn declared_mime_accepts_jpeg_aliases() {
        assert_eq!(ImageMime::from_declared("image/jpeg"), Some(ImageMime::Jpeg));
        assert_eq!(ImageMime::from_declared("image/jpg"), Some(ImageMime::Jpeg));
        assert_eq!(ImageMime::from_declared("IMAGE/PNG"), Some(ImageMime::Png));
        assert_eq!(
            ImageMime::from_declared("image/png; charset=binary"),
            Some(ImageMime::Png)
        );
    }

    #[test]
    fn declared_mime_rejects_pdf_and_webp() {
        assert_eq!(ImageMime::from_declared("application/pdf"), None);
        assert_eq!(ImageMime::from_declared("image/webp"), None);
        assert_eq!(ImageMime::from_declared(""), None);
    }
}
