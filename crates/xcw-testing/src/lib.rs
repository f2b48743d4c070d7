//! Test support for the xcw workspace: canned simctl fixtures, scripted
//! stream sources that stand in for the platform subprocess, and a stub
//! `xcrun` for end-to-end CLI tests.

pub mod buffer;
pub mod fixtures;
pub mod source;
pub mod stub;

pub use buffer::SharedBuf;
pub use fixtures::{device_list_json, raw_line, raw_line_with};
pub use source::{ChannelSource, LineFeeder, ScriptedSource};
pub use stub::install_stub_xcrun;
