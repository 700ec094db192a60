//! CSV-backed package store
//!
//! Loads the whole package file into memory at construction, answers every
//! query from the in-memory copy, and rewrites the complete file (header plus
//! all rows) after each mutation. The header read at load time is the
//! canonical column schema for the life of the store; rewrites always use it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

pub const PACKAGE_ID_COLUMN: &str = "package_id";
pub const DELIVERY_GUY_COLUMN: &str = "delivery_guy";
pub const WEIGHT_COLUMN: &str = "weight_kg";
pub const LABEL_COLUMN: &str = "label";
pub const STATE_COLUMN: &str = "state";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("package file not found: {}", path.display())]
    FileNotFound { path: PathBuf },
    #[error("Package {package_id} not found")]
    PackageNotFound { package_id: String },
    #[error("column {column} holds non-numeric value {value:?}")]
    MalformedField { column: &'static str, value: String },
    #[error("column {column:?} is not part of the package file schema")]
    UnknownColumn { column: String },
    #[error("failed to read package file: {0}")]
    Read(#[from] csv::Error),
    #[error("failed to persist package file: {message}")]
    Persist { message: String },
}

impl StoreError {
    fn persist(err: impl std::fmt::Display) -> Self {
        Self::Persist {
            message: err.to_string(),
        }
    }
}

/// One row of the package file: an open mapping from column name to raw
/// string value. Columns the store does not know about round-trip untouched;
/// column order on disk comes from the store schema, not from the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PackageRecord {
    fields: BTreeMap<String, String>,
}

impl PackageRecord {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    fn field_or_empty(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    fn set(&mut self, column: &str, value: String) {
        self.fields.insert(column.to_string(), value);
    }

    pub fn package_id(&self) -> &str {
        self.field_or_empty(PACKAGE_ID_COLUMN)
    }

    pub fn delivery_guy(&self) -> Result<i64, StoreError> {
        let raw = self.field_or_empty(DELIVERY_GUY_COLUMN);
        raw.trim()
            .parse()
            .map_err(|_| StoreError::MalformedField {
                column: DELIVERY_GUY_COLUMN,
                value: raw.to_string(),
            })
    }

    pub fn weight_kg(&self) -> Result<f64, StoreError> {
        let raw = self.field_or_empty(WEIGHT_COLUMN);
        raw.trim()
            .parse()
            .map_err(|_| StoreError::MalformedField {
                column: WEIGHT_COLUMN,
                value: raw.to_string(),
            })
    }

    pub fn label(&self) -> &str {
        self.field_or_empty(LABEL_COLUMN)
    }

    pub fn state(&self) -> &str {
        self.field_or_empty(STATE_COLUMN)
    }
}

/// Per-delivery-guy aggregate over the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryGuyStats {
    pub delivery_guy: i64,
    pub total_packages: usize,
    pub total_weight_kg: f64,
    pub fragile_packages: usize,
    pub urgent_packages: usize,
}

/// The in-memory package collection plus its backing CSV file.
///
/// All reads are served from memory. Every mutation updates memory first and
/// then rewrites the whole file through a temp-file-and-rename, so a failed
/// rewrite leaves memory ahead of the file and surfaces a `Persist` error.
#[derive(Debug)]
pub struct PackageStore {
    csv_path: PathBuf,
    schema: Vec<String>,
    packages: Vec<PackageRecord>,
}

impl PackageStore {
    /// Reads the header and every row of `csv_path` into memory. Numeric
    /// columns stay strings until a query parses them.
    pub fn load(csv_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let csv_path = csv_path.as_ref().to_path_buf();
        if !csv_path.exists() {
            return Err(StoreError::FileNotFound { path: csv_path });
        }

        let mut reader = csv::Reader::from_path(&csv_path)?;
        let schema: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut packages = Vec::new();
        for row in reader.records() {
            let row = row?;
            let fields = schema
                .iter()
                .cloned()
                .zip(row.iter().map(str::to_string))
                .collect();
            packages.push(PackageRecord::new(fields));
        }

        Ok(Self {
            csv_path,
            schema,
            packages,
        })
    }

    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    pub fn packages(&self) -> &[PackageRecord] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// All packages assigned to `delivery_guy`, in file order. Fails if any
    /// record in the store carries a non-numeric `delivery_guy` value.
    pub fn packages_for_delivery_guy(
        &self,
        delivery_guy: i64,
    ) -> Result<Vec<&PackageRecord>, StoreError> {
        let mut matching = Vec::new();
        for package in &self.packages {
            if package.delivery_guy()? == delivery_guy {
                matching.push(package);
            }
        }
        Ok(matching)
    }

    /// First record with the given id in file order, if any. Duplicate ids
    /// are not rejected on insert, so later duplicates are unreachable here.
    pub fn package_details(&self, package_id: &str) -> Option<&PackageRecord> {
        self.packages
            .iter()
            .find(|package| package.package_id() == package_id)
    }

    pub fn delivery_guy_stats(&self, delivery_guy: i64) -> Result<DeliveryGuyStats, StoreError> {
        let packages = self.packages_for_delivery_guy(delivery_guy)?;

        let mut total_weight_kg = 0.0;
        for package in &packages {
            total_weight_kg += package.weight_kg()?;
        }

        Ok(DeliveryGuyStats {
            delivery_guy,
            total_packages: packages.len(),
            total_weight_kg: (total_weight_kg * 100.0).round() / 100.0,
            fragile_packages: packages
                .iter()
                .filter(|package| package.label() == "FRAGILE")
                .count(),
            urgent_packages: packages
                .iter()
                .filter(|package| package.label() == "URGENT")
                .count(),
        })
    }

    /// Distinct delivery guys across the store, ascending.
    pub fn all_delivery_guys(&self) -> Result<Vec<i64>, StoreError> {
        let mut guys = BTreeSet::new();
        for package in &self.packages {
            guys.insert(package.delivery_guy()?);
        }
        Ok(guys.into_iter().collect())
    }

    /// Packages whose stored label equals the upper-cased query exactly.
    pub fn packages_by_label(&self, label: &str) -> Vec<&PackageRecord> {
        let label = label.to_uppercase();
        self.packages
            .iter()
            .filter(|package| package.label() == label)
            .collect()
    }

    /// Packages whose state matches the query case-insensitively.
    pub fn packages_by_state(&self, state: &str) -> Vec<&PackageRecord> {
        let state = state.to_lowercase();
        self.packages
            .iter()
            .filter(|package| package.state().to_lowercase() == state)
            .collect()
    }

    /// Sets the state of the first record matching `package_id`, rewrites
    /// the file, and returns the previous state.
    pub fn update_state(&mut self, package_id: &str, new_state: &str) -> Result<String, StoreError> {
        if !self.schema.iter().any(|column| column == STATE_COLUMN) {
            return Err(StoreError::UnknownColumn {
                column: STATE_COLUMN.to_string(),
            });
        }

        let package = self
            .packages
            .iter_mut()
            .find(|package| package.package_id() == package_id)
            .ok_or_else(|| StoreError::PackageNotFound {
                package_id: package_id.to_string(),
            })?;

        let old_state = package.state().to_string();
        package.set(STATE_COLUMN, new_state.to_string());
        self.persist()?;
        Ok(old_state)
    }

    /// Appends a record and rewrites the file. Every supplied column must be
    /// part of the canonical schema; omitted columns are stored empty.
    /// Package id uniqueness is not checked.
    pub fn add_package(&mut self, fields: BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(column) = fields.keys().find(|column| !self.schema.contains(*column)) {
            return Err(StoreError::UnknownColumn {
                column: column.clone(),
            });
        }

        self.packages.push(PackageRecord::new(fields));
        self.persist()
    }

    /// Removes the first record matching `package_id` and rewrites the file.
    pub fn delete_package(&mut self, package_id: &str) -> Result<(), StoreError> {
        let position = self
            .packages
            .iter()
            .position(|package| package.package_id() == package_id)
            .ok_or_else(|| StoreError::PackageNotFound {
                package_id: package_id.to_string(),
            })?;

        self.packages.remove(position);
        self.persist()
    }

    /// Removes every listed id that exists, skipping unknown ids silently,
    /// and rewrites the file once at the end. Returns the number removed.
    pub fn delete_packages(&mut self, package_ids: &[String]) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for package_id in package_ids {
            if let Some(position) = self
                .packages
                .iter()
                .position(|package| package.package_id() == package_id)
            {
                self.packages.remove(position);
                deleted += 1;
            }
        }

        if deleted > 0 {
            self.persist()?;
        }
        Ok(deleted)
    }

    /// Full-file rewrite: canonical header plus every record in memory
    /// order, written to a temp file in the target directory and renamed
    /// over the original.
    fn persist(&self) -> Result<(), StoreError> {
        // parent() yields an empty path for bare file names; the temp file
        // must land in the same directory for the rename to stay atomic.
        let directory = match self.csv_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file = NamedTempFile::new_in(directory).map_err(StoreError::persist)?;

        let mut writer = csv::Writer::from_writer(file.as_file());
        writer
            .write_record(&self.schema)
            .map_err(StoreError::persist)?;
        for package in &self.packages {
            writer
                .write_record(self.schema.iter().map(|column| package.field_or_empty(column)))
                .map_err(StoreError::persist)?;
        }
        writer.flush().map_err(StoreError::persist)?;
        drop(writer);

        file.persist(&self.csv_path).map_err(StoreError::persist)?;
        Ok(())
    }
}
