//! Interchange table: the persisted form of a reconciliation matrix
//!
//! Comma-separated, one header line and one line per package:
//!
//! ```text
//! name,version,kind,quantal_source,quantal_i386,quantal_amd64
//! roscpp,1.9.41,source-built,1.9.41-0|1.9.41-0|None,1.9.41-0|1.9.41-0|None,...
//! ```
//!
//! Each platform column joins the per-channel versions with `|` in channel
//! order, writing `None` for absent entries.

use std::io::{Read, Write};

use thiserror::Error;

use crate::status::types::{ABSENT, Cell, Matrix, PackageKind, Platform, Row};

/// Leading columns before the platform columns
pub const FIXED_COLUMNS: [&str; 3] = ["name", "version", "kind"];

const CHANNEL_SEPARATOR: char = '|';

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table has no header")]
    MissingHeader,

    #[error("Invalid header column {0:?}")]
    BadHeader(String),

    #[error("Line {line}: expected {expected} columns, found {found}")]
    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Line {line}: cell {cell:?} does not hold {expected} channel versions")]
    ChannelCount {
        line: usize,
        cell: String,
        expected: usize,
    },

    #[error("Line {line}: unknown package kind {kind:?}")]
    UnknownKind { line: usize, kind: String },

    #[error("Unterminated quoted field")]
    UnterminatedQuote,
}

/// Write a matrix as an interchange table
pub fn write_table<W: Write>(matrix: &Matrix, mut output: W) -> Result<(), TableError> {
    let header: Vec<String> = FIXED_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(matrix.platforms().iter().map(Platform::key))
        .collect();
    write_record(&mut output, &header)?;

    for row in matrix.rows() {
        let mut record = vec![
            row.name.clone(),
            row.version.clone().unwrap_or_default(),
            row.kind.as_str().to_string(),
        ];
        for p in 0..matrix.platforms().len() {
            record.push(join_channels(matrix.column(row, p)));
        }
        write_record(&mut output, &record)?;
    }

    output.flush()?;
    Ok(())
}

/// Render a matrix as interchange table text
pub fn table_to_string(matrix: &Matrix) -> String {
    let mut buffer = Vec::new();
    write_table(matrix, &mut buffer).expect("writing into a Vec cannot fail");
    String::from_utf8(buffer).expect("table fields are UTF-8 strings")
}

/// Read an interchange table back into a matrix.
///
/// `channels` names the channels in the order the table was written with.
pub fn read_table<R: Read>(mut input: R, channels: &[String]) -> Result<Matrix, TableError> {
    let mut content = String::new();
    input.read_to_string(&mut content)?;
    parse_table(&content, channels)
}

pub fn parse_table(content: &str, channels: &[String]) -> Result<Matrix, TableError> {
    let mut records = parse_records(content)?.into_iter();

    let header = records.next().ok_or(TableError::MissingHeader)?;
    for (expected, found) in FIXED_COLUMNS.iter().zip(header.iter()) {
        if expected != found {
            return Err(TableError::BadHeader(found.clone()));
        }
    }
    if header.len() < FIXED_COLUMNS.len() {
        return Err(TableError::MissingHeader);
    }

    let platforms = header[FIXED_COLUMNS.len()..]
        .iter()
        .map(|key| Platform::from_key(key).ok_or_else(|| TableError::BadHeader(key.clone())))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::new();
    for (i, record) in records.enumerate() {
        // Header is line 1
        let line = i + 2;
        if record.len() != header.len() {
            return Err(TableError::ColumnCount {
                line,
                expected: header.len(),
                found: record.len(),
            });
        }

        let mut fields = record.into_iter();
        let name = fields.next().unwrap_or_default();
        let version = fields.next().filter(|v| !v.is_empty());
        let kind_text = fields.next().unwrap_or_default();
        let kind = kind_text
            .parse::<PackageKind>()
            .map_err(|_| TableError::UnknownKind {
                line,
                kind: kind_text.clone(),
            })?;

        let mut cells = Vec::with_capacity(platforms.len() * channels.len());
        for field in fields {
            cells.extend(split_channels(&field, channels.len(), line)?);
        }

        rows.push(Row {
            name,
            version,
            kind,
            cells,
        });
    }

    Ok(Matrix::new(channels.to_vec(), platforms, rows))
}

fn join_channels(cells: &[Cell]) -> String {
    cells
        .iter()
        .map(|cell| cell.as_deref().unwrap_or(ABSENT))
        .collect::<Vec<_>>()
        .join(&CHANNEL_SEPARATOR.to_string())
}

fn split_channels(field: &str, expected: usize, line: usize) -> Result<Vec<Cell>, TableError> {
    let cells: Vec<Cell> = field
        .split(CHANNEL_SEPARATOR)
        .map(|v| (v != ABSENT).then(|| v.to_string()))
        .collect();

    if cells.len() != expected {
        return Err(TableError::ChannelCount {
            line,
            cell: field.to_string(),
            expected,
        });
    }
    Ok(cells)
}

fn write_record<W: Write>(output: &mut W, fields: &[String]) -> std::io::Result<()> {
    let line = fields
        .iter()
        .map(|f| quote_field(f))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(output, "{}", line)
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split comma-separated text into records, honoring double-quoted fields
fn parse_records(content: &str) -> Result<Vec<Vec<String>>, TableError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(TableError::UnterminatedQuote);
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    // Blank lines carry no record
    records.retain(|r| !(r.len() == 1 && r[0].is_empty()));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::types::platforms_for;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn sample_matrix() -> Matrix {
        Matrix::new(
            strings(&["building", "public"]),
            platforms_for(&strings(&["quantal"]), &strings(&["amd64"])),
            vec![
                Row {
                    name: "alpha".to_string(),
                    version: Some("1.0".to_string()),
                    kind: PackageKind::SourceBuilt,
                    cells: vec![Some("1.0-1".to_string()), None, Some("1.0-1".to_string()), None],
                },
                Row {
                    name: "odd,name".to_string(),
                    version: None,
                    kind: PackageKind::Unknown,
                    cells: vec![None, None, None, Some("2.0".to_string())],
                },
            ],
        )
    }

    #[test]
    fn table_to_string_writes_header_and_pipe_joined_cells() {
        let text = table_to_string(&sample_matrix());

        assert_eq!(
            text,
            "name,version,kind,quantal_source,quantal_amd64\n\
             alpha,1.0,source-built,1.0-1|None,1.0-1|None\n\
             \"odd,name\",,unknown,None|None,None|2.0\n"
        );
    }

    #[test]
    fn parse_table_restores_written_matrix() {
        let matrix = sample_matrix();
        let text = table_to_string(&matrix);

        let parsed = parse_table(&text, matrix.channels()).unwrap();

        assert_eq!(parsed, matrix);
    }

    #[test]
    fn parse_table_accepts_crlf_line_endings() {
        let text = "name,version,kind,quantal_amd64\r\nalpha,1.0,prebuilt,1.0|None\r\n";

        let parsed = parse_table(text, &strings(&["building", "public"])).unwrap();

        assert_eq!(parsed.rows()[0].cells, vec![Some("1.0".to_string()), None]);
    }

    #[test]
    fn parse_table_rejects_empty_input() {
        let result = parse_table("", &strings(&["public"]));

        assert!(matches!(result, Err(TableError::MissingHeader)));
    }

    #[test]
    fn parse_table_rejects_unexpected_header() {
        let result = parse_table("package,version,kind\n", &strings(&["public"]));

        assert!(matches!(result, Err(TableError::BadHeader(h)) if h == "package"));
    }

    #[test]
    fn parse_table_rejects_row_with_wrong_width() {
        let text = "name,version,kind,quantal_amd64\nalpha,1.0,prebuilt\n";

        let result = parse_table(text, &strings(&["public"]));

        assert!(matches!(
            result,
            Err(TableError::ColumnCount {
                line: 2,
                expected: 4,
                found: 3
            })
        ));
    }

    #[test]
    fn parse_table_rejects_cell_with_wrong_channel_count() {
        let text = "name,version,kind,quantal_amd64\nalpha,1.0,prebuilt,1.0|None|None\n";

        let result = parse_table(text, &strings(&["building", "public"]));

        assert!(matches!(result, Err(TableError::ChannelCount { line: 2, .. })));
    }

    #[test]
    fn parse_table_rejects_unknown_kind() {
        let text = "name,version,kind,quantal_amd64\nalpha,1.0,wet,1.0\n";

        let result = parse_table(text, &strings(&["public"]));

        assert!(matches!(result, Err(TableError::UnknownKind { kind, .. }) if kind == "wet"));
    }

    #[test]
    fn parse_records_rejects_unterminated_quote() {
        assert!(matches!(
            parse_records("name,\"oops\n"),
            Err(TableError::UnterminatedQuote)
        ));
    }
}
