//! Reference-data loaders.
//!
//! Reads the organization lists, population estimates, deprivation indices
//! and age-band population estimates published as CSV, and attaches them to
//! [`LocationNode`]s. Every file has one header row and is read by column
//! position. Rows that cannot be used are collected as [`RejectedRow`]s and
//! never abort the load.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use covid_stats_location_models::{
    AgeBandPopulation, LocationLevel, LocationNode, fold_age_group,
};
use serde::{Deserialize, Serialize};

use crate::parsing::{parse_count, parse_decimal};
use crate::{LocationError, LocationRegistry, MergeTable};

const LOCATION_CODE: usize = 0;
const LOCATION_NAME: usize = 1;
const LOCATION_PARENT: usize = 7;
const LOCATION_STATUS: usize = 10;
const LOCATION_AREA: usize = 11;

const POPULATION_CODE: usize = 0;
const POPULATION_COUNT: usize = 4;

const DEPRIVATION_CODE: usize = 0;
const DEPRIVATION_HEALTH: usize = 1;
const DEPRIVATION_MDI: usize = 2;

const AGE_CODE: usize = 0;
const AGE_GROUP: usize = 2;
const AGE_COUNT: usize = 3;

/// A location list and the level every row in it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationFile {
    /// Path, relative to the reference-data directory.
    pub file: PathBuf,
    /// Level tag applied to every row (e.g. `"CCG"`).
    pub level: LocationLevel,
}

/// The set of reference files to load, as written in the run config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceFiles {
    /// Location lists, loaded in order.
    #[serde(default)]
    pub locations: Vec<LocationFile>,
    /// Population estimate files.
    #[serde(default)]
    pub populations: Vec<PathBuf>,
    /// Health and multiple-deprivation index file.
    #[serde(default)]
    pub deprivation: Option<PathBuf>,
    /// Five-year age-group population estimates.
    #[serde(default)]
    pub age_bands: Option<PathBuf>,
}

/// A reference-data row that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRow {
    /// Label of the file the row came from.
    pub file: String,
    /// 1-based line number.
    pub line: u64,
    /// What was wrong with it.
    pub message: String,
}

/// Health and multiple-deprivation indices for one organization.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Deprivation {
    /// Health index.
    pub health_index: Option<f64>,
    /// Multiple deprivation index.
    pub deprivation_index: Option<f64>,
}

/// Reference data accumulated from any number of files.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    /// Organizations by code.
    pub locations: BTreeMap<String, LocationNode>,
    /// Population by canonical code (summed across merged predecessors).
    pub populations: BTreeMap<String, u64>,
    /// Deprivation indices by code.
    pub deprivation: BTreeMap<String, Deprivation>,
    /// Age-band breakdown by canonical code.
    pub age_bands: BTreeMap<String, AgeBandPopulation>,
    /// Rows that were skipped.
    pub rejected: Vec<RejectedRow>,
}

impl ReferenceData {
    /// Loads every file named in `files`, resolving paths against
    /// `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError`] if a file cannot be opened or is not
    /// readable CSV. Bad rows are not errors; see [`Self::rejected`].
    pub fn load(
        files: &ReferenceFiles,
        base_dir: &Path,
        merges: &MergeTable,
    ) -> Result<Self, LocationError> {
        let mut data = Self::default();

        for location_file in &files.locations {
            let path = base_dir.join(&location_file.file);
            let count = data.add_locations(open(&path)?, location_file.level, &label(&path))?;
            log::info!("Loaded {count} {} locations from {}", location_file.level, path.display());
        }

        for file in &files.populations {
            let path = base_dir.join(file);
            let count = data.add_populations(open(&path)?, &label(&path), merges)?;
            log::info!("Loaded {count} population rows from {}", path.display());
        }

        if let Some(file) = &files.deprivation {
            let path = base_dir.join(file);
            let count = data.add_deprivation(open(&path)?, &label(&path))?;
            log::info!("Loaded {count} deprivation rows from {}", path.display());
        }

        if let Some(file) = &files.age_bands {
            let path = base_dir.join(file);
            let count = data.add_age_bands(open(&path)?, &label(&path), merges)?;
            log::info!("Loaded {count} age-band rows from {}", path.display());
        }

        if !data.rejected.is_empty() {
            log::warn!("{} reference rows were rejected", data.rejected.len());
        }

        Ok(data)
    }

    /// Reads a location list. A code seen before is replaced, unless the
    /// new row's status marks it as terminated.
    ///
    /// Returns the number of rows accepted.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Csv`] if the input is not readable CSV.
    pub fn add_locations(
        &mut self,
        reader: impl Read,
        level: LocationLevel,
        file: &str,
    ) -> Result<u64, LocationError> {
        let mut count = 0;

        for_each_row(reader, |line, row| {
            let code = cell(row, LOCATION_CODE);
            if code.is_empty() {
                self.reject(file, line, "missing location code");
                return;
            }

            let terminated = cell(row, LOCATION_STATUS)
                .to_ascii_lowercase()
                .contains("terminated");
            if terminated && self.locations.contains_key(code) {
                log::debug!("Ignoring terminated duplicate of {code} at {file}:{line}");
                return;
            }

            let parent = Some(cell(row, LOCATION_PARENT)).filter(|p| !p.is_empty());
            let mut node = LocationNode::new(code, cell(row, LOCATION_NAME), parent, level);
            node.area_hectares = parse_decimal(cell(row, LOCATION_AREA));

            self.locations.insert(code.to_owned(), node);
            count += 1;
        })?;

        Ok(count)
    }

    /// Reads a population file. Codes are resolved through `merges` and
    /// summed.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Csv`] if the input is not readable CSV.
    pub fn add_populations(
        &mut self,
        reader: impl Read,
        file: &str,
        merges: &MergeTable,
    ) -> Result<u64, LocationError> {
        let mut count = 0;

        for_each_row(reader, |line, row| {
            let code = cell(row, POPULATION_CODE);
            if code.is_empty() {
                self.reject(file, line, "missing population code");
                return;
            }
            let raw = cell(row, POPULATION_COUNT);
            let Some(population) = parse_count(raw) else {
                log::warn!("Bad population {raw:?} for {code} at {file}:{line}");
                self.reject(file, line, &format!("bad population {raw:?} for {code}"));
                return;
            };

            let total = self
                .populations
                .entry(merges.resolve(code).to_owned())
                .or_default();
            *total = total.saturating_add(population);
            count += 1;
        })?;

        Ok(count)
    }

    /// Reads the deprivation index file.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Csv`] if the input is not readable CSV.
    pub fn add_deprivation(&mut self, reader: impl Read, file: &str) -> Result<u64, LocationError> {
        let mut count = 0;

        for_each_row(reader, |line, row| {
            let code = cell(row, DEPRIVATION_CODE);
            if code.is_empty() {
                self.reject(file, line, "missing deprivation code");
                return;
            }
            self.deprivation.insert(
                code.to_owned(),
                Deprivation {
                    health_index: parse_decimal(cell(row, DEPRIVATION_HEALTH)),
                    deprivation_index: parse_decimal(cell(row, DEPRIVATION_MDI)),
                },
            );
            count += 1;
        })?;

        Ok(count)
    }

    /// Reads five-year age-group estimates and folds them into ten-year
    /// bands. Codes are resolved through `merges` and summed.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Csv`] if the input is not readable CSV.
    pub fn add_age_bands(
        &mut self,
        reader: impl Read,
        file: &str,
        merges: &MergeTable,
    ) -> Result<u64, LocationError> {
        let mut count = 0;

        for_each_row(reader, |line, row| {
            let code = cell(row, AGE_CODE);
            let label = cell(row, AGE_GROUP);
            let Some(group) = fold_age_group(label) else {
                self.reject(file, line, &format!("unknown age group {label:?}"));
                return;
            };
            let raw = cell(row, AGE_COUNT);
            let Some(people) = parse_count(raw) else {
                self.reject(file, line, &format!("bad age-group count {raw:?} for {code}"));
                return;
            };
            if code.is_empty() {
                self.reject(file, line, "missing age-group code");
                return;
            }

            self.age_bands
                .entry(merges.resolve(code).to_owned())
                .or_default()
                .add(group, people);
            count += 1;
        })?;

        Ok(count)
    }

    /// Attaches static attributes to the loaded locations and builds the
    /// hierarchy.
    #[must_use]
    pub fn into_registry(self, merges: MergeTable) -> LocationRegistry {
        let Self {
            locations,
            mut populations,
            mut deprivation,
            mut age_bands,
            ..
        } = self;

        let nodes: Vec<LocationNode> = locations
            .into_values()
            .map(|mut node| {
                node.population = populations.remove(&node.code).unwrap_or_default();
                if let Some(indices) = deprivation.remove(&node.code) {
                    node.health_index = indices.health_index;
                    node.deprivation_index = indices.deprivation_index;
                }
                node.age_bands = age_bands.remove(&node.code);
                node
            })
            .collect();

        if !populations.is_empty() {
            log::debug!(
                "{} population codes have no matching location",
                populations.len()
            );
        }

        LocationRegistry::new(nodes, merges)
    }

    fn reject(&mut self, file: &str, line: u64, message: &str) {
        self.rejected.push(RejectedRow {
            file: file.to_owned(),
            line,
            message: message.to_owned(),
        });
    }
}

fn open(path: &Path) -> Result<std::fs::File, LocationError> {
    std::fs::File::open(path).map_err(|source| LocationError::File {
        path: path.display().to_string(),
        source,
    })
}

fn label(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn cell(row: &csv::StringRecord, index: usize) -> &str {
    row.get(index).map_or("", str::trim)
}

/// Streams data rows (header skipped) with their 1-based line numbers.
fn for_each_row(
    reader: impl Read,
    mut on_row: impl FnMut(u64, &csv::StringRecord),
) -> Result<(), LocationError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut row = csv::StringRecord::new();
    while reader.read_record(&mut row)? {
        let line = row.position().map_or(0, csv::Position::line);
        on_row(line, &row);
    }
    Ok(())
}
