use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Per-session output file rotation. The configured path template gains a
/// `.s<N>` suffix before its extension for each session; opening session
/// N+1 flushes and closes session N's file first.
#[derive(Debug, Default)]
pub struct Rotation {
    template: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
}

impl Rotation {
    pub fn new(template: Option<PathBuf>) -> Self {
        Rotation {
            template,
            writer: None,
            current_path: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.template.is_some()
    }

    /// Opens the file for `session`, closing the previous one.
    pub fn open_for_session(&mut self, session: u64) -> std::io::Result<Option<PathBuf>> {
        let Some(template) = self.template.clone() else {
            return Ok(None);
        };

        self.close();

        let path = session_path(&template, session);
        let file = File::create(&path)?;
        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path.clone());
        Ok(Some(path))
    }

    /// Writes one already-serialized NDJSON line, if a file is open.
    pub fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        if let Some(writer) = &mut self.writer {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        if let Some(writer) = &mut self.writer {
            writer.flush()?;
        }
        Ok(())
    }

    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
        self.current_path = None;
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }
}

fn session_path(template: &Path, session: u64) -> PathBuf {
    let stem = template
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match template.extension() {
        Some(ext) => format!("{}.s{}.{}", stem, session, ext.to_string_lossy()),
        None => format!("{}.s{}", stem, session),
    };
    template.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn session_suffix_lands_before_extension() {
        assert_eq!(
            session_path(Path::new("/tmp/out.ndjson"), 2),
            PathBuf::from("/tmp/out.s2.ndjson")
        );
        assert_eq!(
            session_path(Path::new("/tmp/out"), 1),
            PathBuf::from("/tmp/out.s1")
        );
    }

    #[test]
    fn rotates_across_sessions() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("tail.ndjson");

        let mut rotation = Rotation::new(Some(template.clone()));
        let first = rotation.open_for_session(1).unwrap().unwrap();
        rotation.write_line("{\"session\":1}").unwrap();

        let second = rotation.open_for_session(2).unwrap().unwrap();
        rotation.write_line("{\"session\":2}").unwrap();
        rotation.close();

        assert_ne!(first, second);
        let one = std::fs::read_to_string(&first).unwrap();
        let two = std::fs::read_to_string(&second).unwrap();
        assert_eq!(one.trim(), "{\"session\":1}");
        assert_eq!(two.trim(), "{\"session\":2}");
    }

    #[test]
    fn unconfigured_rotation_is_inert() {
        let mut rotation = Rotation::new(None);
        assert!(!rotation.is_configured());
        assert!(rotation.open_for_session(1).unwrap().is_none());
        rotation.write_line("ignored").unwrap();
        rotation.close();
    }
}
