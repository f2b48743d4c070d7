use std::io::Write;
use std::path::Path;

/// Installs an executable `xcrun` shell stub into `dir` so CLI
/// integration tests can run the real binary without a toolchain.
/// Prepend `dir` to PATH for the test process.
///
/// The stub answers `simctl list devices --json` with `devices_json` and
/// any `log stream` invocation with `stream_lines` followed by a short
/// sleep that keeps the stream open. `log show` emits the lines and ends.
#[cfg(unix)]
pub fn install_stub_xcrun(
    dir: &Path,
    devices_json: &str,
    stream_lines: &[String],
) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let devices_file = dir.join("devices.json");
    std::fs::write(&devices_file, devices_json)?;

    let lines_file = dir.join("stream_lines.ndjson");
    let mut body = stream_lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    std::fs::write(&lines_file, body)?;

    let script = format!(
        "#!/bin/sh\n\
         case \"$*\" in\n\
           *\"list devices\"*)\n\
             cat \"{devices}\"\n\
             ;;\n\
           *\"log stream\"*)\n\
             cat \"{lines}\"\n\
             sleep 5\n\
             ;;\n\
           *\"log show\"*)\n\
             cat \"{lines}\"\n\
             ;;\n\
         esac\n",
        devices = devices_file.display(),
        lines = lines_file.display(),
    );

    let stub = dir.join("xcrun");
    let mut file = std::fs::File::create(&stub)?;
    file.write_all(script.as_bytes())?;
    file.sync_all()?;
    drop(file);

    let mut perms = std::fs::metadata(&stub)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&stub, perms)?;
    Ok(())
}
