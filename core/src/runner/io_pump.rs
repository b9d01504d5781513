use encoding_rs::Encoding;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::RunnerError;

use super::events::LineStream;

/// Longest run of bytes delivered as one line when no newline arrives.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug)]
pub struct LineTap {
    pub line: String,
    pub stream: LineStream,
    /// Raw bytes consumed for this line, terminator included.
    pub bytes: u64,
}

#[derive(Debug)]
pub enum PumpEvent {
    Line(LineTap),
    Failed { stream: LineStream, error: RunnerError },
}

/// Decodes raw child output lines into text.
#[derive(Debug, Clone, Copy)]
pub struct LineDecoder {
    encoding: &'static Encoding,
}

impl LineDecoder {
    pub fn for_label(label: &str) -> Result<Self, RunnerError> {
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| RunnerError::Config(format!("unknown output encoding: {label}")))?;
        // Lines are split on b'\n' before decoding.
        if !encoding.is_ascii_compatible() {
            return Err(RunnerError::Config(format!(
                "output encoding {} is not ascii compatible",
                encoding.name()
            )));
        }
        Ok(Self { encoding })
    }

    pub fn utf8() -> Self {
        Self {
            encoding: encoding_rs::UTF_8,
        }
    }

    pub fn decode(&self, raw: &[u8]) -> String {
        if self.encoding == encoding_rs::UTF_8 {
            return String::from_utf8_lossy(raw).into_owned();
        }
        let (text, _had_errors) = self.encoding.decode_without_bom_handling(raw);
        text.into_owned()
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::utf8()
    }
}

pub fn pump_stdout<R>(
    rd: R,
    decoder: LineDecoder,
    max_line: usize,
    tx: mpsc::Sender<PumpEvent>,
) -> JoinHandle<u64>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    pump(rd, decoder, max_line, tx, LineStream::Stdout)
}

pub fn pump_stderr<R>(
    rd: R,
    decoder: LineDecoder,
    max_line: usize,
    tx: mpsc::Sender<PumpEvent>,
) -> JoinHandle<u64>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    pump(rd, decoder, max_line, tx, LineStream::Stderr)
}

/// Lines longer than `max_line` are split so a child writing without
/// newlines still produces events the supervisor can count.
fn pump<R>(
    mut rd: R,
    decoder: LineDecoder,
    max_line: usize,
    tx: mpsc::Sender<PumpEvent>,
    stream: LineStream,
) -> JoinHandle<u64>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 16 * 1024];
        let mut total = 0u64;
        let max_line = max_line.max(1);
        let mut line_buf: Vec<u8> = Vec::with_capacity(max_line.min(8 * 1024));

        loop {
            let n = match rd.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    let error = RunnerError::StreamIo {
                        stream: stream.label(),
                        source: e,
                    };
                    let _ = tx.send(PumpEvent::Failed { stream, error }).await;
                    return total;
                }
            };
            if n == 0 {
                break;
            }
            total += n as u64;

            line_buf.extend_from_slice(&buf[..n]);
            loop {
                let (cut, terminated) = match line_buf.iter().position(|&b| b == b'\n') {
                    Some(pos) if pos < max_line => (pos + 1, true),
                    _ if line_buf.len() >= max_line => (max_line, false),
                    _ => break,
                };
                let mut one = line_buf.drain(..cut).collect::<Vec<u8>>();
                let bytes = one.len() as u64;
                if terminated {
                    trim_newline(&mut one);
                }
                let line = decoder.decode(&one);
                if tx
                    .send(PumpEvent::Line(LineTap {
                        line,
                        stream,
                        bytes,
                    }))
                    .await
                    .is_err()
                {
                    // Supervisor stopped listening.
                    return total;
                }
            }
        }

        // EOF flush: deliver the last partial line if it doesn't end with '\n'.
        if !line_buf.is_empty() {
            let bytes = line_buf.len() as u64;
            trim_newline(&mut line_buf);
            if !line_buf.is_empty() {
                let line = decoder.decode(&line_buf);
                let _ = tx
                    .send(PumpEvent::Line(LineTap {
                        line,
                        stream,
                        bytes,
                    }))
                    .await;
            }
        }

        total
    })
}

fn trim_newline(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
}
