//! Offline least-squares fitting of the fare model

use crate::error::TrainingError;
use crate::models::linear::Model;
use std::path::Path;
use tracing::{debug, info};

/// One historical observation used for fitting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSample {
    pub distance_km: f64,
    pub fare_amount: f64,
}

impl TrainingSample {
    pub fn new(distance_km: f64, fare_amount: f64) -> Self {
        Self {
            distance_km,
            fare_amount,
        }
    }
}

/// Fits `fare ≈ coefficient * distance_km + intercept` by ordinary least squares
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelTrainer;

impl ModelTrainer {
    pub fn new() -> Self {
        Self
    }

    pub fn fit(&self, samples: &[TrainingSample]) -> Result<Model, TrainingError> {
        if samples.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }

        let n = samples.len() as f64;
        let mean_x = samples.iter().map(|s| s.distance_km).sum::<f64>() / n;
        let mean_y = samples.iter().map(|s| s.fare_amount).sum::<f64>() / n;

        let (sxx, sxy) = samples.iter().fold((0.0, 0.0), |(sxx, sxy), s| {
            let dx = s.distance_km - mean_x;
            (sxx + dx * dx, sxy + dx * (s.fare_amount - mean_y))
        });

        let rows = samples.len();
        if !sxx.is_finite() {
            return Err(TrainingError::NonFiniteFit { rows });
        }
        if sxx == 0.0 {
            return Err(TrainingError::ZeroVariance { rows });
        }

        let coefficient = sxy / sxx;
        let intercept = mean_y - coefficient * mean_x;
        if !coefficient.is_finite() || !intercept.is_finite() {
            return Err(TrainingError::NonFiniteFit { rows });
        }
        let model = Model::new(coefficient, intercept).with_training_rows(samples.len());

        info!(
            rows = samples.len(),
            coefficient = model.coefficient,
            intercept = model.intercept,
            version = %model.version,
            "Fare model fitted"
        );

        Ok(model)
    }

    /// Load the dataset at `path` and fit it
    pub fn fit_file<P: AsRef<Path>>(&self, path: P) -> Result<Model, TrainingError> {
        let samples = load_dataset(path)?;
        self.fit(&samples)
    }
}

/// Read a header-delimited CSV file with `distance_km` and `fare_amount` columns.
///
/// Columns are located by header name; any others are ignored. Quoted
/// fields containing commas are not supported.
pub fn load_dataset<P: AsRef<Path>>(path: P) -> Result<Vec<TrainingSample>, TrainingError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| TrainingError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let samples = parse_dataset(&contents)?;
    debug!(path = %path.display(), rows = samples.len(), "Training dataset loaded");
    Ok(samples)
}

pub fn parse_dataset(contents: &str) -> Result<Vec<TrainingSample>, TrainingError> {
    let mut lines = contents
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let Some((_, header)) = lines.next() else {
        return Err(TrainingError::EmptyDataset);
    };

    let columns: Vec<&str> = header.split(',').map(clean_cell).collect();
    let distance_idx = column_index(&columns, "distance_km")?;
    let fare_idx = column_index(&columns, "fare_amount")?;

    lines
        .map(|(line_no, line)| -> Result<TrainingSample, TrainingError> {
            let cells: Vec<&str> = line.split(',').map(clean_cell).collect();
            Ok(TrainingSample {
                distance_km: numeric_cell(&cells, distance_idx, "distance_km", line_no)?,
                fare_amount: numeric_cell(&cells, fare_idx, "fare_amount", line_no)?,
            })
        })
        .collect()
}

fn clean_cell(cell: &str) -> &str {
    cell.trim().trim_matches('"')
}

fn column_index(columns: &[&str], name: &'static str) -> Result<usize, TrainingError> {
    columns
        .iter()
        .position(|c| *c == name)
        .ok_or(TrainingError::MissingColumn(name))
}

fn numeric_cell(
    cells: &[&str],
    idx: usize,
    name: &str,
    line: usize,
) -> Result<f64, TrainingError> {
    let cell = cells.get(idx).ok_or_else(|| TrainingError::InvalidRow {
        line,
        reason: format!("missing {name} value"),
    })?;

    match cell.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(TrainingError::InvalidRow {
            line,
            reason: format!("{name} `{cell}` is not a finite number"),
        }),
    }
}
