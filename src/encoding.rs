use crate::error::{MergeError, Result};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

// Windows-1252 code points for bytes 0x80..=0x9F. `None` marks bytes the
// code page leaves undefined.
const WINDOWS_1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// Text encodings a source file may be decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// UTF-8, tolerating a leading byte-order mark.
    Utf8Sig,
    Windows1252,
    /// ISO-8859-1. Never fails.
    Latin1,
}

impl Encoding {
    pub const LABELS: &'static [&'static str] = &[
        "utf-8-sig",
        "utf-8",
        "utf8",
        "windows-1252",
        "cp1252",
        "latin-1",
        "latin1",
        "iso-8859-1",
    ];

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "utf-8-sig" | "utf_8_sig" | "utf-8" | "utf8" => Some(Encoding::Utf8Sig),
            "windows-1252" | "cp1252" => Some(Encoding::Windows1252),
            "latin-1" | "latin1" | "iso-8859-1" => Some(Encoding::Latin1),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8Sig => "utf-8-sig",
            Encoding::Windows1252 => "windows-1252",
            Encoding::Latin1 => "latin-1",
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            Encoding::Utf8Sig => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                std::str::from_utf8(body)
                    .map(str::to_owned)
                    .map_err(|_| self.decode_error())
            }
            Encoding::Windows1252 => bytes
                .iter()
                .map(|&b| match b {
                    0x80..=0x9F => WINDOWS_1252_HIGH[usize::from(b - 0x80)],
                    _ => Some(char::from(b)),
                })
                .collect::<Option<String>>()
                .ok_or_else(|| self.decode_error()),
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }

    fn decode_error(&self) -> MergeError {
        MergeError::Decode {
            encoding: self.name(),
        }
    }
}
