// 💧 Moisture Loss Tables - drying waste by humidity
//
// Lookup key is the humidity rounded UP to the next tenth:
//   15.05% → 15.1% → table entry for 15.1
// Handling waste ("merma por manipuleo") is a fixed percent per grain and
// only applies when the lot actually needed drying.

use crate::entities::GrainType;
use crate::text::round_to;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

// ============================================================================
// MOISTURE LOSS TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoistureLossTable {
    pub grain: GrainType,

    /// Humidity in tenths of a point (151 = 15.1%) → drying waste %
    pub entries: BTreeMap<u32, f64>,

    /// Fixed handling waste %
    pub handling_waste_percent: f64,
}

/// Result of a table lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DryingLookup {
    /// Humidity actually looked up (rounded up to 0.1)
    pub lookup_humidity: f64,
    pub drying_waste_percent: f64,
    /// Humidity above the last entry: the last entry was used
    pub beyond_table: bool,
}

/// Round humidity up to the next tenth, in tenths.
/// The epsilon keeps 14.3 (stored as 14.3000000001) from jumping to 14.4.
pub fn humidity_key(humidity: f64) -> u32 {
    ((humidity * 10.0) - 1e-9).ceil().max(0.0) as u32
}

impl MoistureLossTable {
    pub fn new(grain: GrainType, handling_waste_percent: f64) -> Self {
        MoistureLossTable {
            grain,
            entries: BTreeMap::new(),
            handling_waste_percent,
        }
    }

    /// Builder: add one row
    pub fn with_entry(mut self, humidity: f64, drying_waste_percent: f64) -> Self {
        self.insert(humidity, drying_waste_percent);
        self
    }

    pub fn insert(&mut self, humidity: f64, drying_waste_percent: f64) {
        self.entries
            .insert((humidity * 10.0).round() as u32, drying_waste_percent);
    }

    /// Linear table from `from` to `to` in 0.1 steps:
    /// waste = (humidity − offset) × slope
    pub fn linear(
        grain: GrainType,
        from: f64,
        to: f64,
        offset: f64,
        slope: f64,
        handling_waste_percent: f64,
    ) -> Self {
        let mut table = MoistureLossTable::new(grain, handling_waste_percent);
        let first = (from * 10.0).round() as u32;
        let last = (to * 10.0).round() as u32;
        for key in first..=last {
            let humidity = key as f64 / 10.0;
            table
                .entries
                .insert(key, round_to((humidity - offset) * slope, 2));
        }
        table
    }

    /// Drying waste % for a humidity above base.
    ///
    /// Returns None only for an empty table. Humidity below the first entry
    /// uses the first entry.
    pub fn drying_waste(&self, humidity: f64) -> Option<DryingLookup> {
        let key = humidity_key(humidity);
        let lookup_humidity = key as f64 / 10.0;

        if let Some(percent) = self.entries.get(&key) {
            return Some(DryingLookup {
                lookup_humidity,
                drying_waste_percent: *percent,
                beyond_table: false,
            });
        }

        // Gaps in a hand-loaded table: next entry at or above the key
        if let Some((_, percent)) = self.entries.range(key..).next() {
            return Some(DryingLookup {
                lookup_humidity,
                drying_waste_percent: *percent,
                beyond_table: false,
            });
        }

        let (_, percent) = self.entries.iter().next_back()?;
        Some(DryingLookup {
            lookup_humidity,
            drying_waste_percent: *percent,
            beyond_table: true,
        })
    }

    pub fn max_humidity(&self) -> Option<f64> {
        self.entries.keys().next_back().map(|k| *k as f64 / 10.0)
    }
}

// ============================================================================
// MOISTURE REGISTRY
// ============================================================================

#[derive(Debug, Deserialize)]
struct MoistureRow {
    grain: String,
    humidity: String,
    percent: f64,
}

/// Read-only catalogue of moisture tables, built once at startup
#[derive(Debug, Clone, Default)]
pub struct MoistureRegistry {
    tables: HashMap<GrainType, MoistureLossTable>,
}

impl MoistureRegistry {
    pub fn new() -> Self {
        MoistureRegistry {
            tables: HashMap::new(),
        }
    }

    /// Registry with the built-in drying tables
    pub fn with_defaults() -> Self {
        let tables = default_tables().into_iter().map(|t| (t.grain, t)).collect();
        MoistureRegistry { tables }
    }

    /// Load tables from CSV: `grain,humidity,percent`
    ///
    /// A row whose humidity column reads `handling` sets the handling waste
    /// of that grain instead of a drying entry.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())
            .with_context(|| format!("Failed to open moisture table: {}", path.as_ref().display()))?;

        let mut registry = MoistureRegistry::new();

        for (line_num, result) in reader.deserialize::<MoistureRow>().enumerate() {
            let row = result.with_context(|| {
                format!("Failed to parse moisture table line {}", line_num + 2)
            })?;

            let grain = GrainType::from_name(&row.grain)
                .ok_or_else(|| anyhow!("Unknown grain '{}' on line {}", row.grain, line_num + 2))?;

            let table = registry
                .tables
                .entry(grain)
                .or_insert_with(|| MoistureLossTable::new(grain, 0.0));

            if row.humidity.eq_ignore_ascii_case("handling") {
                table.handling_waste_percent = row.percent;
            } else {
                let humidity = crate::text::parse_number(&row.humidity).ok_or_else(|| {
                    anyhow!("Invalid humidity '{}' on line {}", row.humidity, line_num + 2)
                })?;
                table.insert(humidity, row.percent);
            }
        }

        tracing::info!(
            tables = registry.tables.len(),
            path = %path.as_ref().display(),
            "loaded moisture loss tables"
        );

        Ok(registry)
    }

    pub fn insert(&mut self, table: MoistureLossTable) {
        self.tables.insert(table.grain, table);
    }

    pub fn get(&self, grain: GrainType) -> Option<&MoistureLossTable> {
        self.tables.get(&grain)
    }

    pub fn count(&self) -> usize {
        self.tables.len()
    }
}

/// Built-in drying tables: 1.15 points of waste per point of humidity,
/// starting one tenth above each grain's receiving base.
pub fn default_tables() -> Vec<MoistureLossTable> {
    vec![
        MoistureLossTable::linear(GrainType::TrigoPan, 14.1, 25.0, 13.5, 1.15, 0.10),
        MoistureLossTable::linear(GrainType::Maiz, 14.6, 25.0, 14.0, 1.15, 0.25),
        MoistureLossTable::linear(GrainType::Soja, 13.6, 25.0, 13.0, 1.15, 0.25),
        MoistureLossTable::linear(GrainType::Girasol, 11.1, 25.0, 10.5, 1.15, 0.20),
        MoistureLossTable::linear(GrainType::Sorgo, 15.1, 25.0, 14.5, 1.15, 0.25),
    ]
}

// ============================================================================
// TESTS
// ============================================================================
