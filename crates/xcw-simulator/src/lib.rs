pub mod device;
pub mod error;
pub mod schema;
pub mod stream;
pub mod supervisor;

pub use device::{Device, DeviceQuery};
pub use error::{Error, Result};
pub use schema::RawLogRecord;
pub use stream::{SimctlSource, StreamHandle, StreamMode, StreamOptions, StreamSource};
pub use supervisor::{StreamNotice, Supervisor, SupervisorPolicy};
