use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::accrual::AccrualPeriod;
use super::domain::{DealerId, Program};

/// Source of qualifying purchase volume. Volumes are derived outside this
/// crate from order data filtered by product eligibility rules; the batch
/// runner only consumes the resulting scalar per dealer and period.
pub trait VolumeSource: Send + Sync {
    fn qualifying_volume(
        &self,
        program: &Program,
        dealer_id: &DealerId,
        period: &AccrualPeriod,
    ) -> Result<Decimal, VolumeError>;
}

/// Lookup failures reported per dealer inside a batch run.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("no qualifying volume on file for dealer {0}")]
    Missing(String),
    #[error("volume source unavailable: {0}")]
    Unavailable(String),
}

/// Volume feed hydrated from an order-system CSV extract with
/// `program,dealer,period_start,volume` columns. Rows sharing a key are
/// summed so concatenated extracts load cleanly.
#[derive(Debug, Default, Clone)]
pub struct CsvVolumeFeed {
    volumes: HashMap<(String, String, NaiveDate), Decimal>,
}

#[derive(Debug, thiserror::Error)]
pub enum VolumeImportError {
    #[error("failed to read volume extract: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid volume CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: cannot parse '{value}' as a volume")]
    InvalidVolume { row: usize, value: String },
    #[error("row {row}: cannot parse '{value}' as a period start date")]
    InvalidDate { row: usize, value: String },
}

#[derive(Debug, Deserialize)]
struct VolumeRow {
    program: String,
    dealer: String,
    period_start: String,
    volume: String,
}

impl CsvVolumeFeed {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, VolumeImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, VolumeImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut volumes: HashMap<(String, String, NaiveDate), Decimal> = HashMap::new();

        for (index, record) in csv_reader.deserialize::<VolumeRow>().enumerate() {
            let row = record?;
            // header occupies the first line of the extract
            let row_number = index + 2;

            let period_start = NaiveDate::parse_from_str(&row.period_start, "%Y-%m-%d").map_err(
                |_| VolumeImportError::InvalidDate {
                    row: row_number,
                    value: row.period_start.clone(),
                },
            )?;
            let volume: Decimal =
                row.volume
                    .parse()
                    .map_err(|_| VolumeImportError::InvalidVolume {
                        row: row_number,
                        value: row.volume.clone(),
                    })?;

            let entry = volumes
                .entry((row.program, row.dealer, period_start))
                .or_insert(Decimal::ZERO);
            *entry += volume;
        }

        Ok(Self { volumes })
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

impl VolumeSource for CsvVolumeFeed {
    fn qualifying_volume(
        &self,
        program: &Program,
        dealer_id: &DealerId,
        period: &AccrualPeriod,
    ) -> Result<Decimal, VolumeError> {
        self.volumes
            .get(&(program.code.clone(), dealer_id.0.clone(), period.start))
            .copied()
            .ok_or_else(|| VolumeError::Missing(dealer_id.0.clone()))
    }
}
