//! Line I/O over a pre-configured tty.
//!
//! The UWB module enumerates as a CDC-ACM serial device; baud rate and line
//! discipline are assumed to be set up (udev rule or `stty`) before `rovos`
//! starts. This keeps the binary free of platform serial stacks while still
//! talking to real hardware.

use async_trait::async_trait;
use rovos_radio::transport::LineIo;
use rovos_types::RadioError;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};

#[derive(Debug)]
pub struct TtyLineIo {
    path: String,
    lines: Lines<BufReader<File>>,
    writer: File,
}

impl TtyLineIo {
    /// Open the tty for reading and writing.
    pub async fn open(path: &str) -> Result<Self, RadioError> {
        let reader = File::open(path).await.map_err(|e| RadioError::ConnectFailed {
            device: path.to_string(),
            details: format!("open for read: {e}"),
        })?;
        let writer = OpenOptions::new()
            .write(true)
            .open(path)
            .await
            .map_err(|e| RadioError::ConnectFailed {
                device: path.to_string(),
                details: format!("open for write: {e}"),
            })?;
        Ok(Self {
            path: path.to_string(),
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }
}

#[async_trait]
impl LineIo for TtyLineIo {
    async fn read_line(&mut self) -> Result<Option<String>, RadioError> {
        self.lines
            .next_line()
            .await
            .map_err(|e| RadioError::LinkLost(format!("{}: {e}", self.path)))
    }

    async fn write_command(&mut self, bytes: &[u8]) -> Result<(), RadioError> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|e| RadioError::LinkLost(format!("{}: {e}", self.path)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| RadioError::LinkLost(format!("{}: {e}", self.path)))
    }

    fn port(&self) -> String {
        self.path.clone()
    }
}
