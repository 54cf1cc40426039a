//! Device registry: discovers deep-sleep devices from their YAML
//! configuration files.

use std::collections::BTreeMap;

use serde_yaml::Value;
use tracing::debug;

use otawake_shared::settings::Settings;

use crate::errors::ConsoleError;

/// Scan the configuration directory for `*.yaml` device files.
///
/// A file yields a device only when its `esphome.name` matches the file
/// stem and its `deep_sleep` section carries a parseable `sleep_duration`;
/// a file missing any of that is discarded without disturbing the scan of
/// its siblings. A file that cannot be read or parsed at the YAML level
/// aborts the whole load instead: the caller gets an error and keeps an
/// empty table, never a partial one.
pub fn scan(settings: &Settings) -> Result<BTreeMap<String, u64>, ConsoleError> {
    let mut devices = BTreeMap::new();

    let entries = std::fs::read_dir(&settings.esphome_dir).map_err(|e| {
        ConsoleError::Registry(format!(
            "Unable to scan {}: {}",
            settings.esphome_dir.display(),
            e
        ))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConsoleError::Registry(e.to_string()))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("yaml") {
            continue;
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConsoleError::Registry(format!("{}: {}", path.display(), e)))?;
        let doc: Value = serde_yaml::from_str(&content)
            .map_err(|e| ConsoleError::Registry(format!("{}: {}", path.display(), e)))?;

        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        match device_entry(&doc, stem) {
            Some(duration) => {
                debug!("Found device {} (sleep duration {}s)", stem, duration);
                devices.insert(stem.to_string(), duration);
            }
            None => debug!("Discarding {}", path.display()),
        }
    }

    Ok(devices)
}

/// Apply the per-file validation rules and extract the sleep duration.
fn device_entry(doc: &Value, stem: &str) -> Option<u64> {
    let name = doc.get("esphome")?.get("name")?.as_str()?;
    if name != stem {
        return None;
    }

    // A multi-entry deep_sleep list is trusted to carry its longest
    // duration first.
    let deep_sleep = match doc.get("deep_sleep")? {
        Value::Sequence(entries) => entries.first()?,
        other => other,
    };

    let duration = deep_sleep
        .get("sleep_duration")?
        .as_str()
        .map(parse_sleep_duration)
        .unwrap_or(0);

    // Zero covers both a malformed duration and a literal zero; neither
    // device can be woken on a schedule, so both are discarded.
    if duration == 0 {
        return None;
    }
    Some(duration)
}

/// Parse `<digits><unit>` with unit `s`, `min` or `h` into seconds.
/// Anything else yields 0.
pub fn parse_sleep_duration(text: &str) -> u64 {
    let digits_end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(digits_end);
    let Ok(value) = digits.parse::<u64>() else {
        return 0;
    };
    match unit {
        "s" => value,
        "min" => value * 60,
        "h" => value * 3600,
        _ => 0,
    }
}
