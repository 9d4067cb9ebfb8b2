//! Delimited text (CSV, TSV and friends)
//!
//! The delimiter is sniffed from the first lines. Output normalizes every record to
//! `;`-joined fields, one record per line. Quote handling is lenient: a stray quote
//! inside a field is kept as a literal character.

use super::{read_utf8, ContentExtractor, ExtractionError};
use std::fs::File;

/// Candidate delimiters in preference order
const DELIMITERS: [char; 5] = [',', '\t', ';', ':', '|'];

/// Lines sampled by the delimiter sniffer
const SNIFF_LINES: usize = 15;

/// Field separator of the normalized output
const OUTPUT_SEPARATOR: &str = ";";

pub struct DelimitedExtractor {
    max_records: Option<usize>,
}

impl DelimitedExtractor {
    /// Every record
    pub fn full() -> Self {
        Self { max_records: None }
    }

    /// At most `rows` records, header included
    pub fn preview(rows: usize) -> Self {
        Self {
            max_records: Some(rows),
        }
    }
}

impl ContentExtractor for DelimitedExtractor {
    fn name(&self) -> &'static str {
        match self.max_records {
            Some(_) => "delimited-preview",
            None => "delimited",
        }
    }

    fn extract(&self, file: &mut File) -> Result<String, ExtractionError> {
        let text = read_utf8(file)?;
        let delimiter = sniff_delimiter(&text);
        let records = parse_records(&text, delimiter, self.max_records);

        let mut output = String::with_capacity(text.len().min(64 * 1024));
        for record in &records {
            output.push_str(&record.join(OUTPUT_SEPARATOR));
            output.push('\n');
        }
        Ok(output)
    }
}

/// Pick the delimiter that splits the sample most consistently
pub fn sniff_delimiter(text: &str) -> char {
    let sample: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();

    let mut best = (DELIMITERS[0], false, 0usize);
    for &candidate in &DELIMITERS {
        let counts: Vec<usize> = sample
            .iter()
            .map(|line| count_unquoted(line, candidate))
            .collect();
        let min = counts.iter().copied().min().unwrap_or(0);
        if min == 0 {
            continue;
        }
        let consistent = counts.iter().all(|&c| c == min);
        if (consistent, min) > (best.1, best.2) {
            best = (candidate, consistent, min);
        }
    }
    best.0
}

fn count_unquoted(line: &str, delimiter: char) -> usize {
    let mut in_quotes = false;
    line.chars()
        .filter(|&c| {
            if c == '"' {
                in_quotes = !in_quotes;
            }
            c == delimiter && !in_quotes
        })
        .count()
}

/// Split text into records, stopping after `limit` records
///
/// Blank lines are skipped. Quoted fields may span lines.
pub fn parse_records(text: &str, delimiter: char, limit: Option<usize>) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    if limit == Some(0) {
        return records;
    }

    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_start = true;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                match chars.peek() {
                    Some('"') => {
                        field.push('"');
                        chars.next();
                    }
                    Some(&next) if next != delimiter && next != '\n' && next != '\r' => {
                        field.push('"');
                    }
                    _ => in_quotes = false,
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' if field_start => {
                in_quotes = true;
                field_start = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                let blank = record.is_empty() && field.is_empty() && field_start;
                if !blank {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                    if limit.map_or(false, |max| records.len() >= max) {
                        return records;
                    }
                }
                field_start = true;
            }
            c if c == delimiter => {
                record.push(std::mem::take(&mut field));
                field_start = true;
            }
            c => {
                field.push(c);
                field_start = false;
            }
        }
    }

    if !record.is_empty() || !field.is_empty() || !field_start {
        record.push(field);
        records.push(record);
    }
    records
}
