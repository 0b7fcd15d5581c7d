//! Manual correction overlay
//!
//! Corrections are additive amounts kept in a CSV file next to the service,
//! one row per `(concept, dimension, period, label)`:
//!
//! ```text
//! concept,dimension,period,label,amount
//! gross_revenue,,2025-01,,1168710.89
//! cogs,product,2025-01,FS - Widget 100g (KG),120.5
//! revenue_taxes,,2025-01,ICMS/return,-1659.36
//! ```
//!
//! Each correction is bound to one fetcher output and one period. Merging is
//! not idempotent: applying the same set twice counts it twice, so callers
//! apply a target exactly once per build.

use anyhow::{Context, Result};
use pnl_model::{BreakdownRequest, Dimension, Month, SalesLine, TaxFamily};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{info, warn};

use crate::fetchers::{AggregateRow, parse_tax_label, tax_label};
use crate::labels::{normalize_product_label, normalize_volume_label, product_key};

// =============================================================================
// Merge
// =============================================================================

/// Add each correction to the row with the same key, or append it when no
/// row matches.
pub fn merge<K, F>(mut rows: Vec<AggregateRow>, corrections: &[AggregateRow], key_fn: F) -> Vec<AggregateRow>
where
    K: PartialEq,
    F: Fn(&AggregateRow) -> K,
{
    for correction in corrections {
        let key = key_fn(correction);
        match rows.iter_mut().find(|row| key_fn(row) == key) {
            Some(row) => row.amount += correction.amount,
            None => rows.push(correction.clone()),
        }
    }
    rows
}

/// Label and period must match exactly
pub fn merge_exact(rows: Vec<AggregateRow>, corrections: &[AggregateRow]) -> Vec<AggregateRow> {
    merge(rows, corrections, |row| (row.label.clone(), row.period))
}

/// Product labels match after normalization, ignoring case. Inserted rows
/// carry the normalized label.
pub fn merge_products(rows: Vec<AggregateRow>, corrections: &[AggregateRow]) -> Vec<AggregateRow> {
    let normalized: Vec<AggregateRow> = corrections
        .iter()
        .map(|c| AggregateRow::new(normalize_product_label(&c.label), c.period, c.amount))
        .collect();
    merge(rows, &normalized, |row| (product_key(&row.label), row.period))
}

/// Volume-product labels match on the normalized product and its unit
pub fn merge_volume_products(rows: Vec<AggregateRow>, corrections: &[AggregateRow]) -> Vec<AggregateRow> {
    let normalized: Vec<AggregateRow> = corrections
        .iter()
        .map(|c| AggregateRow::new(normalize_volume_label(&c.label), c.period, c.amount))
        .collect();
    merge(rows, &normalized, |row| {
        (normalize_volume_label(&row.label).to_uppercase(), row.period)
    })
}

// =============================================================================
// Correction Set
// =============================================================================

/// The fetcher output a correction belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrectionTarget {
    Line(SalesLine),
    Breakdown(BreakdownRequest),
    Taxes(TaxFamily),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub target: CorrectionTarget,
    pub row: AggregateRow,
}

/// Raw CSV record
#[derive(Debug, Deserialize)]
struct CorrectionRecord {
    concept: String,
    #[serde(default)]
    dimension: String,
    period: String,
    #[serde(default)]
    label: String,
    amount: f64,
}

impl CorrectionRecord {
    fn parse(self) -> Result<Correction> {
        let period: Month = self.period.parse()?;
        let concept = self.concept.trim();
        let dimension = self.dimension.trim();

        let tax_family = match concept {
            "revenue_taxes" => Some(TaxFamily::Revenue),
            "st_taxes" => Some(TaxFamily::St),
            _ => None,
        };

        if let Some(family) = tax_family {
            if !dimension.is_empty() {
                anyhow::bail!("Tax corrections take no dimension, got {:?}", dimension);
            }
            let (tax, scenario) = parse_tax_label(self.label.trim())
                .with_context(|| format!("Tax correction label must be TAX/scenario, got {:?}", self.label))?;
            if tax.family() != family {
                anyhow::bail!("{} is not part of {}", tax, concept);
            }
            return Ok(Correction {
                target: CorrectionTarget::Taxes(family),
                row: AggregateRow::new(tax_label(tax, scenario), period, self.amount),
            });
        }

        let line: SalesLine = concept.parse()?;
        let target = if dimension.is_empty() {
            CorrectionTarget::Line(line)
        } else {
            let dimension: Dimension = dimension.parse()?;
            CorrectionTarget::Breakdown(BreakdownRequest::new(line, dimension)?)
        };
        let label = match target {
            CorrectionTarget::Line(_) => String::new(),
            _ => self.label.trim().to_string(),
        };
        Ok(Correction {
            target,
            row: AggregateRow::new(label, period, self.amount),
        })
    }
}

/// All loaded corrections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrectionSet {
    corrections: Vec<Correction>,
}

impl CorrectionSet {
    pub fn new(corrections: Vec<Correction>) -> Self {
        Self { corrections }
    }

    /// Load corrections from a CSV file
    pub fn load_from_csv(path: &Path) -> Result<Self> {
        let rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_path(path)
            .with_context(|| format!("Failed to open corrections file: {}", path.display()))?;
        Self::from_reader(rdr)
    }

    pub fn from_csv_str(content: &str) -> Result<Self> {
        let rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(content.as_bytes());
        Self::from_reader(rdr)
    }

    fn from_reader<R: std::io::Read>(mut rdr: csv::Reader<R>) -> Result<Self> {
        let mut corrections = Vec::new();
        for (index, result) in rdr.deserialize::<CorrectionRecord>().enumerate() {
            // Header is line 1
            let line = index + 2;
            let record = result.with_context(|| format!("Malformed correction on line {}", line))?;
            let correction = record
                .parse()
                .with_context(|| format!("Invalid correction on line {}", line))?;
            corrections.push(correction);
        }
        Ok(Self { corrections })
    }

    pub fn len(&self) -> usize {
        self.corrections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }

    /// Correction rows for one target within one year
    pub fn rows_for(&self, target: CorrectionTarget, year: i32) -> Vec<AggregateRow> {
        self.corrections
            .iter()
            .filter(|c| c.target == target && c.row.period.year() == year)
            .map(|c| c.row.clone())
            .collect()
    }

    /// Merge this set's corrections for `target` and `year` into fetched rows
    pub fn apply(&self, target: CorrectionTarget, year: i32, rows: Vec<AggregateRow>) -> Vec<AggregateRow> {
        let corrections = self.rows_for(target, year);
        if corrections.is_empty() {
            return rows;
        }
        match target {
            CorrectionTarget::Breakdown(request) => match request.dimension() {
                Dimension::Product => merge_products(rows, &corrections),
                Dimension::VolumeProduct => merge_volume_products(rows, &corrections),
                Dimension::Family | Dimension::VolumeFamily => merge_exact(rows, &corrections),
            },
            CorrectionTarget::Line(_) | CorrectionTarget::Taxes(_) => merge_exact(rows, &corrections),
        }
    }
}

// =============================================================================
// Reloadable Source
// =============================================================================

/// Correction file re-read whenever its modification time changes
pub struct CorrectionSource {
    path: Option<PathBuf>,
    cached: Mutex<Option<(SystemTime, Arc<CorrectionSet>)>>,
}

impl CorrectionSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            cached: Mutex::new(None),
        }
    }

    /// A source with no file, always empty
    pub fn none() -> Self {
        Self {
            path: None,
            cached: Mutex::new(None),
        }
    }

    /// Current corrections; a missing file means none
    pub fn current(&self) -> Result<Arc<CorrectionSet>> {
        let Some(path) = &self.path else {
            return Ok(Arc::default());
        };

        let modified = match std::fs::metadata(path) {
            Ok(meta) => meta.modified().context("Corrections file has no modification time")?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Arc::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to stat corrections file: {}", path.display()));
            }
        };

        let mut cached = self
            .cached
            .lock()
            .map_err(|_| anyhow::anyhow!("corrections cache lock poisoned"))?;
        if let Some((stamp, set)) = cached.as_ref() {
            if *stamp == modified {
                return Ok(Arc::clone(set));
            }
        }

        match CorrectionSet::load_from_csv(path) {
            Ok(set) => {
                info!(path = %path.display(), corrections = set.len(), "corrections loaded");
                let set = Arc::new(set);
                *cached = Some((modified, Arc::clone(&set)));
                Ok(set)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %format!("{:#}", err), "corrections file rejected");
                Err(err)
            }
        }
    }
}
