//! File format and text encoding detection

use crate::error::{RepairError, Result};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use serde::Serialize;

const PARQUET_MAGIC: &[u8] = b"PAR1";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Tsv,
    Json,
    JsonLines,
    Parquet,
    Excel,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Tsv => "tsv",
            FileFormat::Json => "json",
            FileFormat::JsonLines => "jsonl",
            FileFormat::Parquet => "parquet",
            FileFormat::Excel => "excel",
        }
    }

    pub fn is_delimited(&self) -> bool {
        matches!(self, FileFormat::Csv | FileFormat::Tsv)
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Some(FileFormat::Csv),
            "tsv" | "tab" => Some(FileFormat::Tsv),
            "json" => Some(FileFormat::Json),
            "jsonl" | "ndjson" => Some(FileFormat::JsonLines),
            "parquet" | "pq" => Some(FileFormat::Parquet),
            "xlsx" | "xls" | "xlsm" | "xltx" => Some(FileFormat::Excel),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the format of a file from its name, falling back to content.
///
/// Binary magic bytes win over a misleading extension so a parquet file
/// uploaded as `.csv` is still read as parquet.
pub fn detect_format(file_name: &str, bytes: &[u8]) -> Result<FileFormat> {
    if bytes.is_empty() {
        return Err(RepairError::EmptyFile);
    }
    if bytes.starts_with(PARQUET_MAGIC) {
        return Ok(FileFormat::Parquet);
    }
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
        return Ok(FileFormat::Excel);
    }

    let ext = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    if let Some(format) = FileFormat::from_extension(ext) {
        if matches!(format, FileFormat::Parquet | FileFormat::Excel) {
            return Err(RepairError::UnsupportedFormat(format!(
                "{} has a .{} extension but no {} signature",
                file_name, ext, format
            )));
        }
        return Ok(format);
    }

    if bytes.contains(&0) && !has_utf16_bom(bytes) {
        return Err(RepairError::UnsupportedFormat(format!(
            "{} looks like binary data",
            file_name
        )));
    }

    let first = bytes
        .iter()
        .copied()
        .find(|b| !(b.is_ascii_whitespace() || matches!(b, 0xEF | 0xBB | 0xBF)));
    match first {
        Some(b'[') => Ok(FileFormat::Json),
        Some(b'{') => Ok(FileFormat::JsonLines),
        Some(_) => Ok(FileFormat::Csv),
        None => Err(RepairError::EmptyFile),
    }
}

fn has_utf16_bom(bytes: &[u8]) -> bool {
    bytes.starts_with(b"\xFF\xFE") || bytes.starts_with(b"\xFE\xFF")
}

/// Text content decoded to UTF-8
#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    /// Canonical name of the source encoding
    pub encoding: &'static str,
    /// Whether any byte sequence was replaced during decoding
    pub lossy: bool,
}

/// Decode text bytes to UTF-8.
///
/// A byte order mark selects the encoding and is stripped. Without one, strict
/// UTF-8 is tried first and Windows-1252 is the fallback.
pub fn decode_text(bytes: &[u8]) -> Result<DecodedText> {
    let decoded = if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        DecodedText {
            text: text.into_owned(),
            encoding: encoding.name(),
            lossy: had_errors,
        }
    } else if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        DecodedText {
            text: text.into_owned(),
            encoding: UTF_8.name(),
            lossy: false,
        }
    } else {
        let (text, had_errors) = WINDOWS_1252.decode_without_bom_handling(bytes);
        tracing::warn!(
            encoding = WINDOWS_1252.name(),
            "Content is not valid UTF-8, decoded with fallback encoding"
        );
        DecodedText {
            text: text.into_owned(),
            encoding: WINDOWS_1252.name(),
            lossy: had_errors,
        }
    };

    if decoded.text.trim().is_empty() {
        return Err(RepairError::EmptyFile);
    }
    Ok(decoded)
}
