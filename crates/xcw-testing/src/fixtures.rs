/// One canned `log stream --style json` line with the default image UUID.
pub fn raw_line(pid: i64, level: &str, subsystem: &str, message: &str) -> String {
    raw_line_with(pid, "UUID-1", level, subsystem, message)
}

/// Canned stream line with an explicit binary image UUID, for reinstall
/// rollover scenarios.
pub fn raw_line_with(pid: i64, uuid: &str, level: &str, subsystem: &str, message: &str) -> String {
    format!(
        "{{\"timestamp\":\"2025-12-11 10:00:00.123456+0000\",\
         \"eventMessage\":\"{message}\",\"messageType\":\"{level}\",\
         \"processImagePath\":\"/Containers/Bundle/App/MyApp.app/MyApp\",\
         \"processID\":{pid},\"processImageUUID\":\"{uuid}\",\
         \"subsystem\":\"{subsystem}\",\"category\":\"app\"}}"
    )
}

/// A `simctl list devices --json` document holding one booted device.
pub fn device_list_json(name: &str, udid: &str) -> String {
    format!(
        "{{\"devices\":{{\"com.apple.CoreSimulator.SimRuntime.iOS-17-0\":[\
         {{\"name\":\"{name}\",\"udid\":\"{udid}\",\"state\":\"Booted\",\
         \"isAvailable\":true}}]}}}}"
    )
}
