//! CSV symbol list parsing

use anyhow::Context;
use std::path::Path;

/// Outcome of a bulk symbol import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    /// Tickers that could not be fetched
    pub failed: Vec<String>,
}

/// `;` if the header line contains one, `,` otherwise
pub fn detect_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    if header.contains(';') {
        b';'
    } else {
        b','
    }
}

/// Tickers from the `Symbol` column of a CSV file, blanks skipped.
///
/// Files that are not valid UTF-8 are read as Latin-1.
pub fn read_tickers(path: &Path) -> anyhow::Result<Vec<String>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading symbol list {}", path.display()))?;
    let content = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    };
    parse_tickers(&content).with_context(|| format!("parsing symbol list {}", path.display()))
}

fn parse_tickers(content: &str) -> anyhow::Result<Vec<String>> {
    let content = content.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(detect_delimiter(content))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let column = reader
        .headers()?
        .iter()
        .position(|h| h == "Symbol")
        .ok_or_else(|| anyhow::anyhow!("no Symbol column"))?;

    let mut tickers = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(ticker) = record.get(column).filter(|t| !t.is_empty()) {
            tickers.push(ticker.to_string());
        }
    }
    Ok(tickers)
}
