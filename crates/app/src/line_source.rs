//! Line source — turns the device byte stream into newline-delimited lines.
//!
//! A background task reads the stream through a [`BufReader`], splits on
//! `\n`, strips a trailing `\r` and forwards each line over a bounded
//! channel. Lines longer than [`LineSourceConfig::max_line_bytes`] and lines
//! that are not UTF-8 are discarded. End of stream or a read error is
//! reported once on the fault channel and ends the task.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use soilgate_domain::error::GatewayError;

use crate::ports::Device;

/// Tunables for line framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSourceConfig {
    /// Longest line accepted, excluding the terminator.
    pub max_line_bytes: usize,
}

impl Default for LineSourceConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: 1024,
        }
    }
}

/// An open input device and the task reading from it.
pub struct LineSource {
    description: String,
    task: Option<JoinHandle<()>>,
}

impl LineSource {
    /// Claim `device` and start emitting lines.
    ///
    /// # Errors
    ///
    /// Propagates the device's open error, typically
    /// [`GatewayError::DeviceUnavailable`].
    pub async fn open<D: Device>(
        device: &D,
        config: LineSourceConfig,
        lines: mpsc::Sender<String>,
        faults: mpsc::Sender<GatewayError>,
    ) -> Result<Self, GatewayError> {
        let description = device.describe();
        let stream = device.open().await.inspect_err(|err| {
            tracing::error!(device = %description, error = %err, "failed to open input device");
        })?;
        tracing::info!(device = %description, "input device opened");
        Ok(Self::spawn(description, stream, config, lines, faults))
    }

    /// Start emitting lines from an already opened stream.
    pub fn spawn<R>(
        description: impl Into<String>,
        stream: R,
        config: LineSourceConfig,
        lines: mpsc::Sender<String>,
        faults: mpsc::Sender<GatewayError>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let description = description.into();
        let task = tokio::spawn(pump(
            description.clone(),
            stream,
            config.max_line_bytes,
            lines,
            faults,
        ));
        Self {
            description,
            task: Some(task),
        }
    }

    /// Stop reading and release the device. Calling it again is a no-op.
    pub async fn close(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        // The stream is owned by the task and dropped with it.
        let _ = task.await;
        tracing::info!(device = %self.description, "input device closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for LineSource {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum LineRead {
    Line,
    Overlong,
    Eof { partial: bool },
}

/// Read one `\n`-terminated line into `buf`, never buffering more than `max`
/// bytes of it.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut overlong = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(LineRead::Eof {
                partial: overlong || !buf.is_empty(),
            });
        }

        let (chunk, consumed, complete) = match available.iter().position(|b| *b == b'\n') {
            Some(pos) => (&available[..pos], pos + 1, true),
            None => (available, available.len(), false),
        };
        if !overlong {
            if buf.len() + chunk.len() <= max {
                buf.extend_from_slice(chunk);
            } else {
                overlong = true;
                buf.clear();
            }
        }
        reader.consume(consumed);

        if complete {
            return Ok(if overlong {
                LineRead::Overlong
            } else {
                LineRead::Line
            });
        }
    }
}

async fn pump<R>(
    description: String,
    stream: R,
    max_line_bytes: usize,
    lines: mpsc::Sender<String>,
    faults: mpsc::Sender<GatewayError>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(max_line_bytes.min(256));

    let fault = loop {
        match read_line(&mut reader, &mut buf, max_line_bytes).await {
            Ok(LineRead::Line) => {
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                let Ok(line) = std::str::from_utf8(&buf) else {
                    tracing::debug!(device = %description, "discarding non UTF-8 line");
                    continue;
                };
                if lines.send(line.to_owned()).await.is_err() {
                    tracing::debug!(device = %description, "line consumer dropped, stopping");
                    return;
                }
            }
            Ok(LineRead::Overlong) => {
                tracing::warn!(device = %description, max_line_bytes, "discarding overlong line");
            }
            Ok(LineRead::Eof { partial }) => {
                if partial {
                    tracing::debug!(device = %description, "discarding unterminated trailing data");
                }
                break io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "input device reached end of stream",
                );
            }
            Err(err) => break err,
        }
    };

    tracing::error!(device = %description, error = %fault, "input device failed");
    let _ = faults.send(GatewayError::DeviceIo(fault)).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};

    use super::*;

    struct Harness {
        source: LineSource,
        writer: DuplexStream,
        lines: mpsc::Receiver<String>,
        faults: mpsc::Receiver<GatewayError>,
    }

    fn harness(max_line_bytes: usize) -> Harness {
        let (writer, reader) = duplex(256);
        let (line_tx, lines) = mpsc::channel(16);
        let (fault_tx, faults) = mpsc::channel(1);
        let source = LineSource::spawn(
            "test",
            reader,
            LineSourceConfig { max_line_bytes },
            line_tx,
            fault_tx,
        );
        Harness {
            source,
            writer,
            lines,
            faults,
        }
    }

    async fn next_line(rx: &mut mpsc::Receiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn should_emit_one_line_per_terminator() {
        let mut h = harness(1024);
        h.writer
            .write_all(b"Soil Moisture: 42\nSoil Moisture: 43\n")
            .await
            .unwrap();

        assert_eq!(next_line(&mut h.lines).await, "Soil Moisture: 42");
        assert_eq!(next_line(&mut h.lines).await, "Soil Moisture: 43");
    }

    #[tokio::test]
    async fn should_join_line_split_across_writes() {
        let mut h = harness(1024);
        h.writer.write_all(b"Soil Mois").await.unwrap();
        h.writer.flush().await.unwrap();
        tokio::task::yield_now().await;
        h.writer.write_all(b"ture: 7\r\n").await.unwrap();

        assert_eq!(next_line(&mut h.lines).await, "Soil Moisture: 7");
    }

    #[tokio::test]
    async fn should_discard_overlong_line_and_keep_going() {
        let mut h = harness(8);
        h.writer
            .write_all(b"this line is far too long\nshort\n")
            .await
            .unwrap();

        assert_eq!(next_line(&mut h.lines).await, "short");
    }

    #[tokio::test]
    async fn should_discard_non_utf8_line() {
        let mut h = harness(64);
        h.writer.write_all(b"\xff\xfe\nok\n").await.unwrap();

        assert_eq!(next_line(&mut h.lines).await, "ok");
    }

    #[tokio::test]
    async fn should_emit_empty_lines() {
        let mut h = harness(64);
        h.writer.write_all(b"\n").await.unwrap();

        assert_eq!(next_line(&mut h.lines).await, "");
    }

    #[tokio::test]
    async fn should_report_end_of_stream_as_fault() {
        let mut h = harness(64);
        h.writer.write_all(b"last\npartial").await.unwrap();
        drop(h.writer);

        assert_eq!(next_line(&mut h.lines).await, "last");
        let fault = tokio::time::timeout(Duration::from_secs(1), h.faults.recv())
            .await
            .unwrap()
            .unwrap();
        match fault {
            GatewayError::DeviceIo(err) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected fault {other:?}"),
        }
    }

    #[tokio::test]
    async fn should_release_device_on_close() {
        let mut h = harness(64);
        h.source.close().await;
        assert!(h.source.is_closed());

        // Reader half is gone, so the device side sees a broken pipe.
        let result = h.writer.write_all(b"Soil Moisture: 1\n").await;
        assert!(result.is_err());
        // Closing never reports a fault.
        assert!(h.faults.recv().await.is_none());
    }

    #[tokio::test]
    async fn should_close_twice_without_effect() {
        let mut h = harness(64);
        h.source.close().await;
        h.source.close().await;
        assert!(h.source.is_closed());
    }
}
