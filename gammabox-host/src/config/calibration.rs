//! Calibration file persistence
//!
//! Files live in the data directory as
//! `[<prefix>_]Calibration_<device>_<yyyyMMdd>.txt`. Undated names are still
//! recognised when listing. A file that fails to load never replaces the
//! active baseline.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use log::{debug, info, warn};

use gammabox_core::config::{CalibrationBaseline, DeviceConfig};

use crate::error::HostError;

/// Version written into calibration headers
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const FILE_STEM: &str = "Calibration_";

/// File name for a device's calibration written on `date`
pub fn calibration_file_name(prefix: Option<&str>, device_name: &str, date: NaiveDate) -> String {
    let stamp = date.format("%Y%m%d");
    match prefix {
        Some(prefix) if !prefix.is_empty() => {
            format!("{}_{}{}_{}.txt", prefix, FILE_STEM, device_name, stamp)
        }
        _ => format!("{}{}_{}.txt", FILE_STEM, device_name, stamp),
    }
}

/// Whether `file_name` is a calibration file for `device_name`
fn is_calibration_for(file_name: &str, device_name: &str) -> bool {
    let Some(stem) = file_name.strip_suffix(".txt") else {
        return false;
    };
    let marker = format!("{}{}", FILE_STEM, device_name);
    let Some(at) = stem.rfind(&marker) else {
        return false;
    };
    let (before, after) = (&stem[..at], &stem[at + marker.len()..]);
    let prefix_ok = before.is_empty() || before.ends_with('_');
    let date_ok = after.is_empty()
        || after
            .strip_prefix('_')
            .is_some_and(|d| d.len() == 8 && d.bytes().all(|b| b.is_ascii_digit()));
    prefix_ok && date_ok
}

/// Write `baseline` for `device` into `dir`, returning the file path
pub fn save_calibration(
    dir: &Path,
    prefix: Option<&str>,
    device: &DeviceConfig,
    baseline: &CalibrationBaseline,
) -> Result<PathBuf, HostError> {
    fs::create_dir_all(dir)?;
    let today = Local::now().date_naive();
    let path = dir.join(calibration_file_name(prefix, device.device_name(), today));
    fs::write(&path, baseline.render(device.device_name(), APP_VERSION))?;
    info!("Saved calibration for {} to {}", device.device_name(), path.display());
    Ok(path)
}

/// Read a calibration file for `device`
///
/// A different application version in the header is accepted with a
/// warning. Every other mismatch is an error.
pub fn load_calibration(path: &Path, device: &DeviceConfig) -> Result<CalibrationBaseline, HostError> {
    let text = fs::read_to_string(path)?;
    let loaded = CalibrationBaseline::parse(&text, device).map_err(|error| HostError::Calibration {
        path: path.to_path_buf(),
        error,
    })?;

    if loaded.app_version.as_str() != APP_VERSION {
        warn!(
            "{} was written by version {}, running {}",
            path.display(),
            loaded.app_version,
            APP_VERSION
        );
    }
    info!("Loaded calibration for {} from {}", device.device_name(), path.display());
    Ok(loaded.baseline)
}

/// Load `path` if given, falling back to the uncalibrated baseline
pub fn load_calibration_or_default(path: Option<&Path>, device: &DeviceConfig) -> CalibrationBaseline {
    let Some(path) = path else {
        debug!("No calibration file, using device minimums");
        return CalibrationBaseline::for_device(device);
    };
    match load_calibration(path, device) {
        Ok(baseline) => baseline,
        Err(e) => {
            warn!("Failed to load calibration: {}, using device minimums", e);
            CalibrationBaseline::for_device(device)
        }
    }
}

/// Calibration files for `device_name` in `dir`, sorted by name
pub fn list_calibrations(dir: &Path, device_name: &str) -> Result<Vec<PathBuf>, HostError> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| is_calibration_for(n, device_name));
        if matches && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gammabox_core::config::CalibrationError;

    use crate::config::{parse_config, DEFAULT_CONFIG};

    fn sleeve() -> DeviceConfig {
        parse_config(DEFAULT_CONFIG)
            .unwrap()
            .device("sleeve")
            .unwrap()
            .clone()
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gammabox-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_file_names() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            calibration_file_name(None, "glove", date),
            "Calibration_glove_20240307.txt"
        );
        assert_eq!(
            calibration_file_name(Some(""), "glove", date),
            "Calibration_glove_20240307.txt"
        );
        assert_eq!(
            calibration_file_name(Some("alice"), "glove", date),
            "alice_Calibration_glove_20240307.txt"
        );
    }

    #[test]
    fn test_calibration_name_matching() {
        assert!(is_calibration_for("Calibration_glove_20240307.txt", "glove"));
        assert!(is_calibration_for("alice_Calibration_glove_20240307.txt", "glove"));
        assert!(is_calibration_for("Calibration_glove.txt", "glove"));
        assert!(is_calibration_for("bob_Calibration_glove.txt", "glove"));

        assert!(!is_calibration_for("Calibration_glove2_20240307.txt", "glove"));
        assert!(!is_calibration_for("Calibration_glove_2024.txt", "glove"));
        assert!(!is_calibration_for("aliceCalibration_glove.txt", "glove"));
        assert!(!is_calibration_for("Calibration_glove_20240307.csv", "glove"));
    }

    #[test]
    fn test_lists_dated_and_undated_files() {
        let dir = scratch_dir("list");
        fs::create_dir_all(&dir).unwrap();
        for name in [
            "Calibration_sleeve_20231201.txt",
            "carol_Calibration_sleeve_20240115.txt",
            "Calibration_sleeve.txt",
            "Calibration_glove_20240115.txt",
            "notes.txt",
        ] {
            fs::write(dir.join(name), "").unwrap();
        }
        let names: Vec<_> = list_calibrations(&dir, "sleeve")
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            [
                "Calibration_sleeve.txt",
                "Calibration_sleeve_20231201.txt",
                "carol_Calibration_sleeve_20240115.txt",
            ]
        );
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_save_then_load() {
        let dir = scratch_dir("save");
        let device = sleeve();
        let mut baseline = CalibrationBaseline::for_device(&device);
        baseline.set_pad(3, 2.5, 220).unwrap();

        let path = save_calibration(&dir, Some("bob"), &device, &baseline).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("bob_Calibration_sleeve_"));
        assert!(name.ends_with(".txt"));
        assert_eq!(load_calibration(&path, &device).unwrap(), baseline);
        assert_eq!(list_calibrations(&dir, "sleeve").unwrap(), [path]);
        assert!(list_calibrations(&dir, "glove").unwrap().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_other_version_is_accepted() {
        let dir = scratch_dir("version");
        fs::create_dir_all(&dir).unwrap();
        let device = sleeve();
        let path = dir.join("Calibration_sleeve.txt");
        fs::write(&path, CalibrationBaseline::for_device(&device).render("sleeve", "0.0.1")).unwrap();
        assert!(load_calibration(&path, &device).is_ok());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bad_file_falls_back() {
        let dir = scratch_dir("bad");
        fs::create_dir_all(&dir).unwrap();
        let device = sleeve();
        let path = dir.join("Calibration_sleeve.txt");
        fs::write(&path, "sleeve, 0.1.0\n1,100\n").unwrap();

        assert!(matches!(
            load_calibration(&path, &device),
            Err(HostError::Calibration {
                error: CalibrationError::PadCountMismatch { expected: 16, found: 1 },
                ..
            })
        ));
        assert_eq!(
            load_calibration_or_default(Some(&path), &device),
            CalibrationBaseline::for_device(&device)
        );
        let _ = fs::remove_dir_all(&dir);
    }
}
