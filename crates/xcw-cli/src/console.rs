use owo_colors::OwoColorize;

use xcw_simulator::Device;

/// Stderr startup banner for text-format runs. NDJSON runs announce
/// themselves through the `ready` event instead.
pub fn print_watching(device: &Device, app: &str, mode: &str) {
    eprintln!(
        "{} {} ({}) [{}]",
        "Watching:".bright_cyan(),
        device.name,
        device.udid,
        mode
    );
    eprintln!("App: {}", app);
    eprintln!("Press Ctrl+C to stop");
}

pub fn print_trigger(label: &str, command: &str) {
    eprintln!("{} '{}' -> {}", "On".bright_cyan(), label, command);
}
