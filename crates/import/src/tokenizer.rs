use encoding_rs::{Encoding, EUC_JP, SHIFT_JIS, UTF_16BE, UTF_16LE};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenizeError {
    #[error("no candidate encoding decoded the file cleanly")]
    Decode,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Decoded file plus which encoding won, for display in the wizard.
#[derive(Debug, Clone)]
pub struct DecodedStatement {
    pub text: String,
    pub encoding: &'static str,
}

/// Byte-order marks checked before any heuristic decoding.
const BOM_UTF8: &[u8] = &[0xEF, 0xBB, 0xBF];
const BOM_UTF16_LE: &[u8] = &[0xFF, 0xFE];
const BOM_UTF16_BE: &[u8] = &[0xFE, 0xFF];

/// Decode raw statement bytes under a ranked candidate list: BOM (if any),
/// then strict UTF-8, then UTF-16 when the byte pattern demands it, then the
/// two legacy Japanese encodings. A candidate only wins if it decodes with
/// zero replacement errors and produces no embedded NULs.
pub fn decode_statement(bytes: &[u8]) -> Result<DecodedStatement, TokenizeError> {
    if let Some(rest) = bytes.strip_prefix(BOM_UTF8) {
        let text = std::str::from_utf8(rest).map_err(|_| TokenizeError::Decode)?;
        return Ok(DecodedStatement { text: text.to_string(), encoding: "UTF-8" });
    }
    if bytes.starts_with(BOM_UTF16_LE) {
        return decode_with(UTF_16LE, &bytes[2..], "UTF-16LE").ok_or(TokenizeError::Decode);
    }
    if bytes.starts_with(BOM_UTF16_BE) {
        return decode_with(UTF_16BE, &bytes[2..], "UTF-16BE").ok_or(TokenizeError::Decode);
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        if !text.contains('\0') {
            return Ok(DecodedStatement { text: text.to_string(), encoding: "UTF-8" });
        }
    }

    // BOM-less UTF-16 text is full of NUL bytes; the legacy encodings would
    // happily "decode" it, so it has to be ruled in or out before them. ASCII
    // content puts the NUL in odd positions for LE and even positions for BE.
    if bytes.iter().filter(|b| **b == 0).count() * 4 > bytes.len() {
        let zeros_at_odd = bytes.iter().enumerate().filter(|(i, b)| i % 2 == 1 && **b == 0).count();
        let zeros_at_even = bytes.iter().enumerate().filter(|(i, b)| i % 2 == 0 && **b == 0).count();
        let (encoding, name) = if zeros_at_odd >= zeros_at_even {
            (UTF_16LE, "UTF-16LE")
        } else {
            (UTF_16BE, "UTF-16BE")
        };
        return decode_with(encoding, bytes, name).ok_or(TokenizeError::Decode);
    }

    for (encoding, name) in [(SHIFT_JIS, "Shift_JIS"), (EUC_JP, "EUC-JP")] {
        if let Some(decoded) = decode_with(encoding, bytes, name) {
            return Ok(decoded);
        }
    }

    Err(TokenizeError::Decode)
}

fn decode_with(
    encoding: &'static Encoding,
    bytes: &[u8],
    name: &'static str,
) -> Option<DecodedStatement> {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors || text.contains('\0') {
        return None;
    }
    Some(DecodedStatement { text: text.into_owned(), encoding: name })
}

/// Pick the delimiter by counting occurrences outside of any judgement about
/// quoting: tab-separated exports carry few or no commas, so tabs dominating
/// commas is a reliable signal.
fn detect_delimiter(text: &str) -> u8 {
    let tabs = text.matches('\t').count();
    let commas = text.matches(',').count();
    if tabs > commas {
        b'\t'
    } else {
        b','
    }
}

/// Split decoded text into rows of raw cells.
///
/// Quoted fields (escaped quotes, embedded delimiters, embedded newlines)
/// are handled by the csv reader; ragged rows are legal at this layer and
/// passed through untouched. Fully empty rows are dropped.
pub fn split_rows(text: &str) -> Result<Vec<Vec<String>>, TokenizeError> {
    let delimiter = detect_delimiter(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells: Vec<String> = record.iter().map(|c| c.to_string()).collect();
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        rows.push(cells);
    }
    Ok(rows)
}

/// Full tokenizer entry point: decode then split.
pub fn tokenize(bytes: &[u8]) -> Result<Vec<Vec<String>>, TokenizeError> {
    let decoded = decode_statement(bytes)?;
    split_rows(&decoded.text)
}
