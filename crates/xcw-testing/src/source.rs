use std::collections::VecDeque;
use std::io::{BufReader, Cursor, Read};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use xcw_simulator::{Error, Result, StreamHandle, StreamOptions, StreamSource};

/// Stream source handing out one canned line script per `open` call.
/// When the scripts run out, further opens fail, which exercises the
/// supervisor's respawn budget.
pub struct ScriptedSource {
    scripts: Mutex<VecDeque<Vec<String>>>,
}

impl ScriptedSource {
    pub fn new(scripts: Vec<Vec<String>>) -> Self {
        ScriptedSource {
            scripts: Mutex::new(scripts.into_iter().collect()),
        }
    }
}

impl StreamSource for ScriptedSource {
    fn open(&self, _udid: &str, _opts: &StreamOptions) -> Result<StreamHandle> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Spawn("scripted source exhausted".to_string()))?;
        let mut body = script.join("\n");
        body.push('\n');
        Ok(StreamHandle {
            reader: Box::new(Cursor::new(body.into_bytes())),
            child: None,
        })
    }
}

/// Stream source fed line-by-line from the test thread. The stream stays
/// open until the [`LineFeeder`] is dropped, which reads as EOF.
pub struct ChannelSource {
    receiver: Mutex<Option<Receiver<String>>>,
}

/// Test-side handle pushing lines into a [`ChannelSource`]. Drop it to
/// close the stream.
pub struct LineFeeder {
    tx: Sender<String>,
}

impl LineFeeder {
    pub fn push(&self, line: impl Into<String>) {
        let _ = self.tx.send(line.into());
    }
}

impl ChannelSource {
    pub fn new() -> (Self, LineFeeder) {
        let (tx, rx) = channel();
        (
            ChannelSource {
                receiver: Mutex::new(Some(rx)),
            },
            LineFeeder { tx },
        )
    }
}

impl StreamSource for ChannelSource {
    fn open(&self, _udid: &str, _opts: &StreamOptions) -> Result<StreamHandle> {
        let rx = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::Spawn("channel source already streaming".to_string()))?;
        Ok(StreamHandle {
            reader: Box::new(BufReader::new(ChannelReader {
                rx,
                pending: Vec::new(),
                offset: 0,
            })),
            child: None,
        })
    }
}

struct ChannelReader {
    rx: Receiver<String>,
    pending: Vec<u8>,
    offset: usize,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.offset >= self.pending.len() {
            match self.rx.recv() {
                Ok(line) => {
                    self.pending = line.into_bytes();
                    self.pending.push(b'\n');
                    self.offset = 0;
                }
                // Feeder dropped: end of stream.
                Err(_) => return Ok(0),
            }
        }

        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }
}
