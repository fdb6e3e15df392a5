//! Container catalog: loading, column mapping and persistence.
//!
//! A catalog is an explicit value handed to every optimization run. Tables
//! come in as CSV text (or header + rows) whose columns are matched against
//! a fixed synonym table once, at load time.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{ContainerRecord, ValidationError};
use crate::types::Dims;

const DEFAULT_CATALOG_CSV: &str = include_str!("../data/default_catalog.csv");

/// Column roles a catalog table can provide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnCategory {
    Length,
    Width,
    Height,
    WallThickness,
    Stock,
    Identifier,
}

impl ColumnCategory {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnCategory::Length => "length",
            ColumnCategory::Width => "width",
            ColumnCategory::Height => "height",
            ColumnCategory::WallThickness => "wall thickness",
            ColumnCategory::Stock => "stock",
            ColumnCategory::Identifier => "identifier",
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(
            self,
            ColumnCategory::Length | ColumnCategory::Width | ColumnCategory::Height
        )
    }

    pub fn synonyms(&self) -> &'static [&'static str] {
        COLUMN_SYNONYMS
            .iter()
            .find(|(category, _)| category == self)
            .map(|(_, synonyms)| *synonyms)
            .unwrap_or(&[])
    }
}

impl std::fmt::Display for ColumnCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepted header names per category, in resolution order.
///
/// Dimensions are claimed before the identifier so that a header such as
/// "Width" is never taken for an "id" column.
pub const COLUMN_SYNONYMS: [(ColumnCategory, &[&str]); 6] = [
    (ColumnCategory::Length, &["lengte", "length", "len"]),
    (ColumnCategory::Width, &["breedte", "width", "wid"]),
    (ColumnCategory::Height, &["hoogte", "height"]),
    (ColumnCategory::WallThickness, &["dikte", "thickness", "wall"]),
    (ColumnCategory::Stock, &["voorraad", "stock", "available", "qty"]),
    (
        ColumnCategory::Identifier,
        &["referentie", "reference", "ref", "id", "code", "name"],
    ),
];

/// Errors while reading, validating or persisting a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog has no header row")]
    Empty,
    #[error("could not resolve column(s) for: {}", format_categories(.0))]
    MissingColumns(Vec<ColumnCategory>),
    #[error("line {line}: expected {expected} fields, found {found}")]
    MalformedRow {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: unterminated quoted field")]
    UnterminatedQuote { line: usize },
    #[error("line {line}: column '{column}' has value '{value}', expected {expected}")]
    InvalidValue {
        line: usize,
        column: String,
        value: String,
        expected: &'static str,
    },
    #[error("{location}: {source}")]
    InvalidRecord {
        location: String,
        #[source]
        source: ValidationError,
    },
    #[error("could not access catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn format_categories(categories: &[ColumnCategory]) -> String {
    categories
        .iter()
        .map(ColumnCategory::name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Column index per category, resolved once per table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnMapping {
    pub length: usize,
    pub width: usize,
    pub height: usize,
    pub identifier: usize,
    pub wall_thickness: Option<usize>,
    pub stock: Option<usize>,
}

impl ColumnMapping {
    /// Matches headers to categories.
    ///
    /// Per category an exact (case-insensitive) header match wins over a
    /// substring match; every column is claimed at most once. The identifier
    /// falls back to the first unclaimed column, or to the first column when
    /// every column is taken. All unresolved required categories are
    /// reported together.
    ///
    /// # Examples
    /// ```
    /// use carton_fit::catalog::ColumnMapping;
    ///
    /// let mapping = ColumnMapping::resolve(&["Ref", "Lengte (mm)", "Breedte", "Hoogte"]).unwrap();
    /// assert_eq!((mapping.identifier, mapping.length), (0, 1));
    /// ```
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Result<Self, CatalogError> {
        if headers.is_empty() {
            return Err(CatalogError::Empty);
        }

        let normalized: Vec<String> = headers
            .iter()
            .map(|h| h.as_ref().trim().to_lowercase())
            .collect();
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut resolved: Vec<(ColumnCategory, Option<usize>)> = Vec::new();

        for (category, synonyms) in COLUMN_SYNONYMS {
            let mut found = find_column(&normalized, synonyms, &claimed);
            if let Some(idx) = found {
                claimed.insert(idx);
            } else if category == ColumnCategory::Identifier {
                // A table with dimension columns only shares its first column.
                found = Some(
                    (0..normalized.len())
                        .find(|idx| !claimed.contains(idx))
                        .unwrap_or(0),
                );
            }
            resolved.push((category, found));
        }

        let missing: Vec<ColumnCategory> = resolved
            .iter()
            .filter(|(category, idx)| idx.is_none() && category.is_required())
            .map(|(category, _)| *category)
            .collect();
        if !missing.is_empty() {
            return Err(CatalogError::MissingColumns(missing));
        }

        let optional = |wanted: ColumnCategory| {
            resolved
                .iter()
                .find(|(category, _)| *category == wanted)
                .and_then(|(_, idx)| *idx)
        };
        let lookup = |wanted: ColumnCategory| optional(wanted).unwrap_or(0);

        Ok(Self {
            length: lookup(ColumnCategory::Length),
            width: lookup(ColumnCategory::Width),
            height: lookup(ColumnCategory::Height),
            identifier: lookup(ColumnCategory::Identifier),
            wall_thickness: optional(ColumnCategory::WallThickness),
            stock: optional(ColumnCategory::Stock),
        })
    }
}

fn find_column(normalized: &[String], synonyms: &[&str], claimed: &HashSet<usize>) -> Option<usize> {
    let unclaimed = |idx: &usize| !claimed.contains(idx);

    synonyms
        .iter()
        .find_map(|synonym| {
            (0..normalized.len())
                .filter(unclaimed)
                .find(|idx| normalized[*idx] == *synonym)
        })
        .or_else(|| {
            synonyms.iter().find_map(|synonym| {
                (0..normalized.len())
                    .filter(unclaimed)
                    .find(|idx| normalized[*idx].contains(synonym))
            })
        })
}

/// An ordered list of candidate containers.
///
/// Serializes as a plain JSON array of records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    records: Vec<ContainerRecord>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<ContainerRecord>) -> Self {
        Self { records }
    }

    /// Validates every record before building the catalog.
    pub fn try_from_records(records: Vec<ContainerRecord>) -> Result<Self, CatalogError> {
        for record in &records {
            record
                .validate()
                .map_err(|source| CatalogError::InvalidRecord {
                    location: format!("record '{}'", record.id),
                    source,
                })?;
        }
        warn_on_duplicate_ids(&records);
        Ok(Self { records })
    }

    /// The embedded default carton set.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_csv_str(DEFAULT_CATALOG_CSV)
    }

    pub fn records(&self) -> &[ContainerRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ContainerRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ContainerRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    /// Appends a validated record.
    pub fn add(&mut self, record: ContainerRecord) -> Result<(), CatalogError> {
        record
            .validate()
            .map_err(|source| CatalogError::InvalidRecord {
                location: format!("record '{}'", record.id),
                source,
            })?;
        if self.get(&record.id).is_some() {
            warn!(id = %record.id, "catalog already contains a container with this id");
        }
        self.records.push(record);
        Ok(())
    }

    /// Removes every record with the given id; returns how many were removed.
    pub fn remove(&mut self, id: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|record| record.id != id);
        before - self.records.len()
    }

    /// Parses CSV text with a header row.
    ///
    /// The delimiter is detected from the header (`,`, `;` or tab). With a
    /// non-comma delimiter, decimal commas ("12,5") are accepted.
    pub fn from_csv_str(text: &str) -> Result<Self, CatalogError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let delimiter = detect_delimiter(text);
        let mut rows = parse_csv(text, delimiter)?.into_iter();
        let header = rows.next().ok_or(CatalogError::Empty)?;
        Self::build(&header.fields, rows.collect(), delimiter != ',')
    }

    /// Builds a catalog from an already split table. Data rows are numbered
    /// from line 2.
    pub fn from_table<S: AsRef<str>>(
        headers: &[S],
        rows: Vec<Vec<String>>,
    ) -> Result<Self, CatalogError> {
        let headers: Vec<String> = headers.iter().map(|h| h.as_ref().to_string()).collect();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, fields)| CsvRow {
                line: idx + 2,
                fields,
            })
            .collect();
        Self::build(&headers, rows, false)
    }

    fn build(
        headers: &[String],
        rows: Vec<CsvRow>,
        decimal_comma: bool,
    ) -> Result<Self, CatalogError> {
        let mapping = ColumnMapping::resolve(headers)?;
        let parser = RowParser {
            headers,
            mapping,
            decimal_comma,
        };
        let records = rows
            .iter()
            .map(|row| parser.parse(row))
            .collect::<Result<Vec<_>, _>>()?;
        warn_on_duplicate_ids(&records);
        Ok(Self { records })
    }

    /// Loads a catalog file; `.json` files hold a record array, anything
    /// else is read as CSV.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let catalog = if is_json {
            let records: Vec<ContainerRecord> =
                serde_json::from_str(&text).map_err(|source| CatalogError::Json {
                    path: path.to_path_buf(),
                    source,
                })?;
            Self::try_from_records(records)?
        } else {
            Self::from_csv_str(&text)?
        };

        info!(
            "📂 Loaded {} containers from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Writes the catalog as a JSON array.
    pub fn save_json(&self, path: &Path) -> Result<(), CatalogError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| CatalogError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn warn_on_duplicate_ids(records: &[ContainerRecord]) {
    let mut seen: HashSet<&str> = HashSet::new();
    for record in records {
        if !seen.insert(record.id.as_str()) {
            warn!(id = %record.id, "duplicate container id in catalog");
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct CsvRow {
    line: usize,
    fields: Vec<String>,
}

struct RowParser<'a> {
    headers: &'a [String],
    mapping: ColumnMapping,
    decimal_comma: bool,
}

impl RowParser<'_> {
    fn parse(&self, row: &CsvRow) -> Result<ContainerRecord, CatalogError> {
        if row.fields.len() != self.headers.len() {
            return Err(CatalogError::MalformedRow {
                line: row.line,
                expected: self.headers.len(),
                found: row.fields.len(),
            });
        }

        let outer = Dims::new(
            self.required_number(row, self.mapping.length)?,
            self.required_number(row, self.mapping.width)?,
            self.required_number(row, self.mapping.height)?,
        );

        let id = row.fields[self.mapping.identifier].trim();
        let id = if id.is_empty() {
            format!("line-{}", row.line)
        } else {
            id.to_string()
        };

        let wall_thickness = match self.mapping.wall_thickness {
            Some(column) => self.optional_number(row, column)?,
            None => None,
        };
        let stock = match self.mapping.stock {
            Some(column) => self.optional_count(row, column)?,
            None => None,
        };

        let record = ContainerRecord {
            id,
            outer,
            wall_thickness,
            stock,
        };
        record
            .validate()
            .map_err(|source| CatalogError::InvalidRecord {
                location: format!("line {}", row.line),
                source,
            })?;
        Ok(record)
    }

    fn invalid(&self, row: &CsvRow, column: usize, expected: &'static str) -> CatalogError {
        CatalogError::InvalidValue {
            line: row.line,
            column: self.headers[column].clone(),
            value: row.fields[column].clone(),
            expected,
        }
    }

    fn required_number(&self, row: &CsvRow, column: usize) -> Result<f64, CatalogError> {
        parse_number(&row.fields[column], self.decimal_comma)
            .ok_or_else(|| self.invalid(row, column, "a number"))
    }

    fn optional_number(&self, row: &CsvRow, column: usize) -> Result<Option<f64>, CatalogError> {
        if row.fields[column].trim().is_empty() {
            return Ok(None);
        }
        self.required_number(row, column).map(Some)
    }

    fn optional_count(&self, row: &CsvRow, column: usize) -> Result<Option<u32>, CatalogError> {
        match self.optional_number(row, column)? {
            None => Ok(None),
            Some(value) if value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 => {
                Ok(Some(value as u32))
            }
            Some(_) => Err(self.invalid(row, column, "a whole non-negative number")),
        }
    }
}

fn parse_number(raw: &str, decimal_comma: bool) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value = if decimal_comma && !trimmed.contains('.') {
        trimmed.replace(',', ".").parse::<f64>()
    } else {
        trimmed.parse::<f64>()
    };
    value.ok().filter(|v| v.is_finite())
}

fn detect_delimiter(text: &str) -> char {
    let header = text
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("");
    let mut best = ',';
    let mut best_count = 0;
    for candidate in [',', ';', '\t'] {
        let count = header.matches(candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Splits CSV text into rows, honouring double-quoted fields.
///
/// Blank lines are skipped; `line` is the 1-based line a row starts on.
fn parse_csv(text: &str, delimiter: char) -> Result<Vec<CsvRow>, CatalogError> {
    let mut rows: Vec<CsvRow> = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut row_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            '\r' => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                push_row(&mut rows, row_line, std::mem::take(&mut fields));
                line += 1;
                row_line = line;
            }
            c if c == delimiter => fields.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }

    if in_quotes {
        return Err(CatalogError::UnterminatedQuote { line: row_line });
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        push_row(&mut rows, row_line, fields);
    }

    Ok(rows)
}

fn push_row(rows: &mut Vec<CsvRow>, line: usize, fields: Vec<String>) {
    if fields.iter().any(|f| !f.trim().is_empty()) {
        rows.push(CsvRow { line, fields });
    }
}
