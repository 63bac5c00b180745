//! Build script for gammabox-host
//!
//! Validates the embedded gammabox.toml at compile time

use std::fs;
use std::path::Path;

/// Pads addressable by one command
const MAX_PADS: i64 = 64;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    validate_config();
}

/// Validate gammabox.toml configuration at compile time
fn validate_config() {
    println!("cargo:rerun-if-changed=gammabox.toml");

    let config_path = Path::new("gammabox.toml");

    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: gammabox.toml not found!                                 ║\n\
            ║                                                                  ║\n\
            ║  The host binary embeds a default gammabox.toml.                 ║\n\
            ║  Please create one in the gammabox-host directory.               ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read gammabox.toml                             ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let config: toml::Value = match toml::from_str(&config_content) {
        Ok(value) => value,
        Err(e) => {
            let error_msg = e.to_string();
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in gammabox.toml                     ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                ║                                                                  ║\n\
                {}\n\
                ║                                                                  ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&error_msg)
            );
        }
    };

    validate_required_sections(&config);
    validate_controller(&config);
    validate_devices(&config);

    println!("cargo:warning=gammabox.toml validated successfully");
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Panic with a boxed list of validation errors
fn report(title: &str, errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title,
        errors
            .iter()
            .map(|e| format!("║  • {:<62} ║", e))
            .collect::<Vec<_>>()
            .join("\n")
    );
}

/// Validate that required sections exist
fn validate_required_sections(config: &toml::Value) {
    let mut errors = Vec::new();

    match config.get("device") {
        Some(toml::Value::Array(devices)) if !devices.is_empty() => {}
        Some(_) => errors.push("[[device]] must be a non-empty array of tables".to_string()),
        None => errors.push("Missing [[device]] section - at least one device is required".to_string()),
    }

    if let Some(controller) = config.get("controller") {
        if !controller.is_table() {
            errors.push("[controller] must be a table".to_string());
        }
    }

    report("Missing required sections in gammabox.toml", &errors);
}

/// Validate controller tuning values
fn validate_controller(config: &toml::Value) {
    let controller = match config.get("controller") {
        Some(toml::Value::Table(t)) => t,
        _ => return,
    };

    let mut errors = Vec::new();

    for key in [
        "update_interval_ms",
        "message_delay_ms",
        "greeting_timeout_ms",
        "heartbeat_timeout_ms",
        "battery_poll_interval_ms",
    ] {
        if let Some(value) = controller.get(key) {
            match value.as_integer() {
                Some(v) if v >= 0 => {}
                _ => errors.push(format!("[controller] {} must be a non-negative integer", key)),
            }
        }
    }

    if let Some(toml::Value::Integer(size)) = controller.get("max_queue_size") {
        if *size < 1 {
            errors.push("[controller] max_queue_size must be at least 1".to_string());
        }
    }

    if let Some(toml::Value::Integer(interval)) = controller.get("update_interval_ms") {
        if *interval == 0 {
            errors.push("[controller] update_interval_ms must be above 0".to_string());
        }
    }

    report("Invalid controller configuration", &errors);
}

/// Float or integer value as f64
fn as_number(value: &toml::Value) -> Option<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|i| i as f64))
}

/// Validate device descriptors
fn validate_devices(config: &toml::Value) {
    let devices = match config.get("device") {
        Some(toml::Value::Array(d)) => d,
        _ => return,
    };

    let mut errors = Vec::new();
    let mut names: Vec<String> = Vec::new();

    for (i, device) in devices.iter().enumerate() {
        let device = match device.as_table() {
            Some(t) => t,
            None => {
                errors.push(format!("device {} must be a table", i));
                continue;
            }
        };

        let name = match device.get("device_name") {
            Some(toml::Value::String(name)) => name.clone(),
            _ => {
                errors.push(format!("device {} missing 'device_name'", i));
                format!("#{}", i)
            }
        };
        if names.contains(&name) {
            errors.push(format!("device '{}' is defined twice", name));
        }
        names.push(name.clone());

        for key in [
            "num_pads",
            "min_width",
            "max_width",
            "base_freq",
            "min_freq",
            "max_freq",
        ] {
            if device.get(key).and_then(|v| v.as_integer()).is_none() {
                errors.push(format!("device '{}' missing integer '{}'", name, key));
            }
        }
        for key in ["min_amp", "max_amp"] {
            if device.get(key).and_then(as_number).is_none() {
                errors.push(format!("device '{}' missing number '{}'", name, key));
            }
        }

        let int = |key: &str| device.get(key).and_then(|v| v.as_integer());
        let float = |key: &str| device.get(key).and_then(as_number);

        let num_pads = int("num_pads").unwrap_or(0);
        if !(1..=MAX_PADS).contains(&num_pads) {
            errors.push(format!("device '{}' num_pads must be 1-{}", name, MAX_PADS));
        }
        if let (Some(min), Some(max)) = (float("min_amp"), float("max_amp")) {
            if min < 0.0 || min > max {
                errors.push(format!("device '{}' needs 0 <= min_amp <= max_amp", name));
            }
        }
        if let (Some(min), Some(max)) = (int("min_width"), int("max_width")) {
            if min < 0 || min > max {
                errors.push(format!("device '{}' needs 0 <= min_width <= max_width", name));
            }
        }
        if let (Some(min), Some(base), Some(max)) = (int("min_freq"), int("base_freq"), int("max_freq")) {
            if min < 0 || !(min <= base && base <= max) {
                errors.push(format!("device '{}' needs min_freq <= base_freq <= max_freq", name));
            }
        }

        match device.get("anode_indices") {
            Some(toml::Value::Array(anodes)) => {
                for anode in anodes {
                    match anode.as_integer() {
                        Some(a) if a >= 0 && a < num_pads => {}
                        _ => errors.push(format!("device '{}' has anode outside 0-{}", name, num_pads - 1)),
                    }
                }
            }
            Some(_) => errors.push(format!("device '{}' anode_indices must be an array", name)),
            None => {}
        }
    }

    report("Invalid device configuration", &errors);
}
