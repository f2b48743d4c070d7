use std::collections::HashMap;
use std::process::Command;

use serde::Deserialize;

use crate::error::{Error, Result};

/// A simulator device as reported by `simctl list devices --json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub name: String,
    pub udid: String,
    pub state: String,
    #[serde(rename = "isAvailable", default)]
    pub is_available: bool,
}

impl Device {
    pub fn is_booted(&self) -> bool {
        self.state == "Booted"
    }
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    /// Keyed by runtime identifier, e.g.
    /// "com.apple.CoreSimulator.SimRuntime.iOS-17-0".
    devices: HashMap<String, Vec<Device>>,
}

/// Parses the JSON produced by `xcrun simctl list devices --json` into a
/// flat device list. Pure function so selection logic is testable without
/// a toolchain.
pub fn parse_device_list(json: &str) -> Result<Vec<Device>> {
    let list: DeviceList = serde_json::from_str(json)?;
    let mut devices: Vec<Device> = list
        .devices
        .into_values()
        .flatten()
        .filter(|d| d.is_available)
        .collect();
    devices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(devices)
}

/// Picks a device by UDID, exact name, or the "booted" keyword.
pub fn select_device(devices: &[Device], query: &str) -> Result<Device> {
    if query.eq_ignore_ascii_case("booted") {
        return devices
            .iter()
            .find(|d| d.is_booted())
            .cloned()
            .ok_or(Error::NoBootedSimulator);
    }

    if let Some(device) = devices.iter().find(|d| d.udid.eq_ignore_ascii_case(query)) {
        return Ok(device.clone());
    }

    // Prefer a booted device when several share the name.
    let named: Vec<&Device> = devices.iter().filter(|d| d.name == query).collect();
    if let Some(device) = named.iter().find(|d| d.is_booted()).or(named.first()) {
        return Ok((*device).clone());
    }

    Err(Error::DeviceNotFound(query.to_string()))
}

/// Device lookup via the platform toolchain. Each `resolve` call shells
/// out once; nothing is cached across invocations.
#[derive(Debug, Default)]
pub struct DeviceQuery;

impl DeviceQuery {
    pub fn new() -> Self {
        DeviceQuery
    }

    pub fn resolve(&self, query: &str) -> Result<Device> {
        let output = Command::new("xcrun")
            .args(["simctl", "list", "devices", "--json"])
            .output()?;

        if !output.status.success() {
            return Err(Error::Spawn(format!(
                "simctl list failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        let devices = parse_device_list(&json)?;
        select_device(&devices, query)
    }
}
