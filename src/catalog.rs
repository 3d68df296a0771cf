//! Nursery Catalog Loading
//!
//! Reads the nursery table into a Polars DataFrame, validates the required
//! columns once, then converts every row into a typed `NurseryRecord`.
//!
//! Supported sources:
//! - Spreadsheets (`.xlsx`, `.xlsm`, `.xls`, `.ods`): first worksheet, first row is the header
//! - CSV with a header row
//! - Parquet

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use polars::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::geodesy::validate_coordinate;

/// Column names the catalog must carry (case sensitive)
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "Name",
    "Latitude",
    "Longitude",
    "Capacity",
    "PlantsAvailable",
    "Contact",
];

/// One nursery row, immutable after load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NurseryRecord {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub capacity: u64,
    pub plants_available: u64,
    pub contact: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(
        "Catalog must include: {} (missing: {})",
        REQUIRED_COLUMNS.join(", "),
        .missing.join(", ")
    )]
    Schema { missing: Vec<String> },

    #[error("Row {row}: {message}")]
    InvalidRow { row: usize, message: String },

    #[error("Unsupported catalog format: {0}")]
    UnsupportedFormat(String),

    #[error("Spreadsheet {0} has no worksheets")]
    EmptyWorkbook(String),

    #[error("Failed to read spreadsheet {path}: {source}")]
    Spreadsheet {
        path: String,
        #[source]
        source: calamine::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Dataframe {
        path: String,
        #[source]
        source: PolarsError,
    },

    #[error("Column '{column}' could not be converted: {source}")]
    Column {
        column: String,
        #[source]
        source: PolarsError,
    },
}

/// Read-only, ordered table of nurseries
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    records: Vec<NurseryRecord>,
    duplicate_names: Vec<String>,
}

impl Catalog {
    /// Load and validate a catalog file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let df = read_dataframe(path)?;
        tracing::debug!("Read {} rows, columns {:?}", df.height(), df.get_column_names());

        let catalog = Self::from_dataframe(&df)?;

        tracing::info!("Loaded {} nurseries from {}", catalog.len(), path.display());
        for name in &catalog.duplicate_names {
            tracing::warn!("Duplicate nursery name '{}': lookups resolve to the first row", name);
        }

        Ok(catalog)
    }

    /// Validate columns and convert rows to typed records
    pub fn from_dataframe(df: &DataFrame) -> Result<Self, CatalogError> {
        let present: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        validate_columns(&present)?;

        let names = string_column(df, "Name")?;
        let latitudes = float_column(df, "Latitude")?;
        let longitudes = float_column(df, "Longitude")?;
        let capacities = float_column(df, "Capacity")?;
        let plants = float_column(df, "PlantsAvailable")?;
        let contacts = string_column(df, "Contact")?;

        let mut records = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            // Header occupies row 1
            let row = i + 2;

            let name = names
                .get(i)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| invalid_row(row, "Name is empty"))?
                .to_string();

            let latitude = latitudes
                .get(i)
                .ok_or_else(|| invalid_row(row, "Latitude is not a number"))?;
            let longitude = longitudes
                .get(i)
                .ok_or_else(|| invalid_row(row, "Longitude is not a number"))?;
            validate_coordinate(&name, latitude, longitude)
                .map_err(|e| invalid_row(row, &e.to_string()))?;

            let capacity = count_value(capacities.get(i))
                .ok_or_else(|| invalid_row(row, "Capacity must be a whole number >= 0"))?;
            let plants_available = count_value(plants.get(i))
                .ok_or_else(|| invalid_row(row, "PlantsAvailable must be a whole number >= 0"))?;

            let contact = contacts.get(i).map(|s| s.trim().to_string()).unwrap_or_default();

            records.push(NurseryRecord {
                name,
                latitude,
                longitude,
                capacity,
                plants_available,
                contact,
            });
        }

        Ok(Self::from_records(records))
    }

    /// Build a catalog from already-typed records
    pub fn from_records(records: Vec<NurseryRecord>) -> Self {
        let mut seen: FxHashMap<&str, usize> = FxHashMap::default();
        for record in &records {
            *seen.entry(record.name.as_str()).or_insert(0) += 1;
        }

        // Report duplicates in catalog order
        let mut duplicate_names = Vec::new();
        for record in &records {
            if seen.get(record.name.as_str()).copied().unwrap_or(0) > 1
                && !duplicate_names.contains(&record.name)
            {
                duplicate_names.push(record.name.clone());
            }
        }

        Self { records, duplicate_names }
    }

    pub fn records(&self) -> &[NurseryRecord] {
        &self.records
    }

    /// Names that occur more than once
    pub fn duplicate_names(&self) -> &[String] {
        &self.duplicate_names
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Fail with every missing required column, in declaration order
pub fn validate_columns(present: &[String]) -> Result<(), CatalogError> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !present.iter().any(|p| p == *required))
        .map(|s| s.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(CatalogError::Schema { missing })
    }
}

/// Read any supported catalog file into a DataFrame
pub fn read_dataframe(path: &Path) -> Result<DataFrame, CatalogError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let display = path.display().to_string();

    match extension.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_spreadsheet(path),
        "csv" => CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .and_then(|reader| reader.finish())
            .map_err(|source| CatalogError::Dataframe { path: display, source }),
        "parquet" => LazyFrame::scan_parquet(path, Default::default())
            .and_then(|lf| lf.collect())
            .map_err(|source| CatalogError::Dataframe { path: display, source }),
        other => Err(CatalogError::UnsupportedFormat(if other.is_empty() {
            display
        } else {
            other.to_string()
        })),
    }
}

/// First worksheet as an all-text DataFrame; typing happens in `from_dataframe`
fn read_spreadsheet(path: &Path) -> Result<DataFrame, CatalogError> {
    let display = path.display().to_string();
    let spreadsheet_err = |source| CatalogError::Spreadsheet { path: display.clone(), source };

    let mut workbook = open_workbook_auto(path).map_err(spreadsheet_err)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| CatalogError::EmptyWorkbook(display.clone()))?
        .map_err(spreadsheet_err)?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header
            .iter()
            .enumerate()
            .map(|(idx, cell)| cell_text(cell).unwrap_or_else(|| format!("column_{}", idx + 1)))
            .collect(),
        None => Vec::new(),
    };

    let body: Vec<&[Data]> = rows
        .filter(|row| row.iter().any(|cell| cell_text(cell).is_some()))
        .collect();

    let columns: Vec<Column> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let values: Vec<Option<String>> = body
                .iter()
                .map(|row| row.get(idx).and_then(cell_text))
                .collect();
            Column::new(name.as_str().into(), values)
        })
        .collect();

    DataFrame::new(columns).map_err(|source| CatalogError::Dataframe { path: display, source })
}

/// Spreadsheet cell as trimmed text; whole floats lose their ".0"
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn float_column(df: &DataFrame, name: &str) -> Result<Float64Chunked, CatalogError> {
    let column_err = |source| CatalogError::Column { column: name.to_string(), source };

    let cast = df
        .column(name)
        .and_then(|c| c.cast(&DataType::Float64))
        .map_err(column_err)?;
    let values = cast.f64().map_err(column_err)?.clone();
    Ok(values)
}

fn string_column(df: &DataFrame, name: &str) -> Result<StringChunked, CatalogError> {
    let column_err = |source| CatalogError::Column { column: name.to_string(), source };

    let cast = df
        .column(name)
        .and_then(|c| c.cast(&DataType::String))
        .map_err(column_err)?;
    let values = cast.str().map_err(column_err)?.clone();
    Ok(values)
}

/// Whole, non-negative count
fn count_value(value: Option<f64>) -> Option<u64> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0)
        .map(|v| v as u64)
}

fn invalid_row(row: usize, message: &str) -> CatalogError {
    CatalogError::InvalidRow { row, message: message.to_string() }
}
