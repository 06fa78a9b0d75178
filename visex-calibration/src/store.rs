use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StoreError;
use crate::measurement::MeasurementSeries;

/// Calibration measurements of one display
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DisplayRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub intensity_measurement: MeasurementSeries,
    #[serde(default)]
    pub spectral_measurement: MeasurementSeries,
}

/// Display records keyed by display id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayStore {
    displays: BTreeMap<String, DisplayRecord>,
}

impl DisplayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store; a missing file is an empty store.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved {} display record(s) to {}", self.displays.len(), path.display());
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&DisplayRecord> {
        self.displays.get(id)
    }

    pub fn len(&self) -> usize {
        self.displays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.displays.is_empty()
    }

    /// Merges `record` in. An existing record only has the series replaced that
    /// `record` actually carries data for.
    pub fn merge(&mut self, record: DisplayRecord) {
        match self.displays.get_mut(&record.id) {
            Some(existing) => {
                if !record.intensity_measurement.is_empty() {
                    existing.intensity_measurement = record.intensity_measurement;
                }
                if !record.spectral_measurement.is_empty() {
                    existing.spectral_measurement = record.spectral_measurement;
                }
            }
            None => {
                self.displays.insert(record.id.clone(), record);
            }
        }
    }

    /// Copy of this store with `record` replacing any record of the same id.
    pub fn with_replaced(&self, record: DisplayRecord) -> DisplayStore {
        let mut out = self.clone();
        out.displays.insert(record.id.clone(), record);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{MeasureValue, Measurement};
    use tempfile::tempdir;
    use visex_core::Color;

    fn series(y: f64) -> MeasurementSeries {
        let mut s = MeasurementSeries::new();
        s.record(
            Measurement::from([("Y".to_string(), MeasureValue::Scalar(y))]),
            Color::rgb(1.0, 0.0, 0.0),
        );
        s
    }

    fn record(id: &str, intensity: MeasurementSeries, spectral: MeasurementSeries) -> DisplayRecord {
        DisplayRecord {
            id: id.into(),
            intensity_measurement: intensity,
            spectral_measurement: spectral,
        }
    }

    #[test]
    fn merge_keeps_existing_series_when_new_one_is_empty() {
        let mut store = DisplayStore::new();
        store.merge(record("lcd", series(1.0), series(2.0)));
        store.merge(record("lcd", series(3.0), MeasurementSeries::new()));

        let r = store.get("lcd").unwrap();
        assert_eq!(r.intensity_measurement, series(3.0));
        assert_eq!(r.spectral_measurement, series(2.0));
    }

    #[test]
    fn with_replaced_overwrites_whole_record() {
        let mut store = DisplayStore::new();
        store.merge(record("lcd", series(1.0), series(2.0)));
        let out = store.with_replaced(record("lcd", series(3.0), MeasurementSeries::new()));
        assert!(out.get("lcd").unwrap().spectral_measurement.is_empty());
        assert_eq!(store.get("lcd").unwrap().spectral_measurement, series(2.0));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("displays.json");
        let mut store = DisplayStore::new();
        store.merge(record("crt", series(0.5), MeasurementSeries::new()));
        store.merge(record("lcd", series(4.0), series(8.0)));
        store.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"IntensityMeasurement\""));
        assert_eq!(DisplayStore::load(&path).unwrap(), store);
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempdir().unwrap();
        assert!(DisplayStore::load(dir.path().join("none.json")).unwrap().is_empty());
    }
}
