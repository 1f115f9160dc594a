//! Bar loading: CSV files, deterministic synthetic series, dataset hashing.
//!
//! CSV layout is one header row then `timestamp,open,high,low,close,volume`.
//! Timestamps are RFC 3339 or bare `YYYY-MM-DD` (midnight UTC). Prices are
//! parsed straight into `Decimal` from their text, never through a float.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use wyckoff_core::domain::{Bar, Timeframe};
use wyckoff_core::EngineConfig;

use crate::settings::ReplaySettings;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: bad timestamp '{value}'")]
    Timestamp { row: usize, value: String },

    #[error("row {row}: bad {field} '{value}'")]
    Price {
        row: usize,
        field: &'static str,
        value: String,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct CsvBar {
    timestamp: String,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: u64,
}

/// Load one symbol's bars from a CSV file.
///
/// Rows are returned in file order; ordering and OHLCV sanity are the replay
/// driver's job.
pub fn load_csv(path: &Path, symbol: &str, timeframe: Timeframe) -> Result<Vec<Bar>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = read_csv(file, symbol, timeframe)?;
    debug!(path = %path.display(), bars = bars.len(), "loaded csv");
    Ok(bars)
}

pub fn read_csv<R: Read>(reader: R, symbol: &str, timeframe: Timeframe) -> Result<Vec<Bar>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();
    for (i, row) in rdr.deserialize::<CsvBar>().enumerate() {
        // header is row 1
        let row_no = i + 2;
        let row = row?;
        let price = |field: &'static str, value: &str| {
            Decimal::from_str_exact(value).map_err(|_| LoadError::Price {
                row: row_no,
                field,
                value: value.to_string(),
            })
        };
        bars.push(Bar::new(
            symbol,
            timeframe,
            parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::Timestamp {
                row: row_no,
                value: row.timestamp.clone(),
            })?,
            price("open", &row.open)?,
            price("high", &row.high)?,
            price("low", &row.low)?,
            price("close", &row.close)?,
            row.volume,
        ));
    }
    Ok(bars)
}

pub fn write_csv<W: Write>(writer: W, bars: &[Bar]) -> Result<(), LoadError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for bar in bars {
        wtr.serialize(CsvBar {
            timestamp: bar.timestamp.to_rfc3339(),
            open: bar.open.to_string(),
            high: bar.high.to_string(),
            low: bar.low.to_string(),
            close: bar.close.to_string(),
            volume: bar.volume,
        })?;
    }
    wtr.flush().map_err(|e| LoadError::Csv(e.into()))?;
    Ok(())
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::from_str(value).ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Deterministic random-walk bars seeded from the symbol name.
///
/// Prices move in whole cents; daily bars skip weekends. Roughly one bar in
/// twenty-five carries a volume spike so the climax detectors have something
/// to find.
pub fn generate_synthetic_bars(
    symbol: &str,
    timeframe: Timeframe,
    start: DateTime<Utc>,
    count: usize,
) -> Vec<Bar> {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut bars = Vec::with_capacity(count);
    let mut cents: i64 = 10_000;
    let mut ts = start;
    while bars.len() < count {
        if timeframe == Timeframe::D1 && matches!(ts.weekday(), Weekday::Sat | Weekday::Sun) {
            ts += timeframe.bar_duration();
            continue;
        }

        let open = cents;
        let close = (open + rng.gen_range(-300..=300)).max(100);
        let high = open.max(close) + rng.gen_range(0..=150);
        let low = (open.min(close) - rng.gen_range(0..=150)).max(50);
        let mut volume = rng.gen_range(500_000..5_000_000u64);
        if rng.gen_ratio(1, 25) {
            volume *= 3;
        }

        bars.push(Bar::new(
            symbol,
            timeframe,
            ts,
            Decimal::new(open, 2),
            Decimal::new(high, 2),
            Decimal::new(low, 2),
            Decimal::new(close, 2),
            volume,
        ));
        cents = close;
        ts += timeframe.bar_duration();
    }
    bars
}

/// Content hash of a bar series.
pub fn compute_dataset_hash(bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(bar.symbol.as_bytes());
        hasher.update(bar.timeframe.as_str().as_bytes());
        hasher.update(&bar.timestamp.timestamp().to_le_bytes());
        for price in [bar.open, bar.high, bar.low, bar.close] {
            hasher.update(price.normalize().to_string().as_bytes());
        }
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Stable id for a replay: same data and configs give the same id.
pub fn run_id(
    dataset_hash: &str,
    settings: &ReplaySettings,
    current: &EngineConfig,
    proposed: &EngineConfig,
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(dataset_hash.as_bytes());
    hasher.update(&serde_json::to_vec(settings).unwrap_or_default());
    hasher.update(&serde_json::to_vec(current).unwrap_or_default());
    hasher.update(&serde_json::to_vec(proposed).unwrap_or_default());
    hasher.finalize().to_hex().as_str()[..16].to_string()
}
