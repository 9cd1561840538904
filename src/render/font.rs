use std::path::Path;

use rusttype::Font;

/// Outcome of looking up the certificate font.
#[derive(Clone)]
pub enum FontResolution {
    Resolved(Font<'static>),
    /// The built-in 8x8 bitmap font. It ignores the requested size, so
    /// certificates drawn with it are smaller than configured.
    FallbackUsed(FallbackFont),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackFont {
    pub reason: String,
}

impl FallbackFont {
    pub const CELL_SIZE: u32 = 8;
}

impl FontResolution {
    pub fn resolve(font_path: Option<&Path>) -> Self {
        let Some(path) = font_path else {
            return Self::fallback("no font configured");
        };

        match std::fs::read(path) {
            Ok(bytes) => match Font::try_from_vec(bytes) {
                Some(font) => Self::Resolved(font),
                None => Self::fallback(format!("{} is not a usable TrueType font", path.display())),
            },
            Err(e) => Self::fallback(format!("cannot read {}: {}", path.display(), e)),
        }
    }

    pub fn fallback(reason: impl Into<String>) -> Self {
        Self::FallbackUsed(FallbackFont {
            reason: reason.into(),
        })
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::FallbackUsed(_))
    }
}

impl std::fmt::Debug for FontResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolved(_) => f.write_str("Resolved(..)"),
            Self::FallbackUsed(fallback) => f.debug_tuple("FallbackUsed").field(fallback).finish(),
        }
    }
}
