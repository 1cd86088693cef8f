use std::fmt::Display;
use std::io::{BufRead, BufReader, Read};
use std::thread;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, error, warn};

use crate::config::ServiceName;

/// Complete lines buffered per stream before the oldest is dropped.
const OUTPUT_BUFFER_LINES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

impl Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attaches one child output stream to the structured logger. A reader
/// thread line-buffers raw chunks and feeds a bounded queue; a logger thread
/// drains the queue into log records tagged with service and stream. The
/// child's writes are decoupled from the logger: when the queue is full the
/// oldest buffered line is dropped and the drop is reported.
pub(crate) fn spawn_output_forwarder<R>(service: ServiceName, stream: OutputStream, reader: R)
where
    R: Read + Send + 'static,
{
    let (tx, rx) = bounded::<String>(OUTPUT_BUFFER_LINES);
    let drain = rx.clone();

    let reader_service = service.clone();
    thread::Builder::new()
        .name(format!("{service}-{stream}-reader"))
        .spawn(move || read_lines(reader, &reader_service, stream, &tx, &drain))
        .expect("thread spawn should succeed");
    thread::Builder::new()
        .name(format!("{service}-{stream}-logger"))
        .spawn(move || log_lines(&rx, &service, stream))
        .expect("thread spawn should succeed");
}

fn read_lines<R>(
    reader: R,
    service: &ServiceName,
    stream: OutputStream,
    tx: &Sender<String>,
    drain: &Receiver<String>,
) where
    R: Read,
{
    let mut buf = BufReader::new(reader);
    let mut bytes = Vec::new();
    let mut dropped: u64 = 0;

    loop {
        bytes.clear();
        match buf.read_until(b'\n', &mut bytes) {
            // EOF: the child exited or closed the stream. A trailing partial
            // line was already delivered by the previous iteration.
            Ok(0) => break,
            Ok(_) => {
                if bytes.last() == Some(&b'\n') {
                    bytes.pop();
                    if bytes.last() == Some(&b'\r') {
                        bytes.pop();
                    }
                }
                let line = String::from_utf8_lossy(&bytes).into_owned();
                if !send_dropping_oldest(tx, drain, line, &mut dropped) {
                    return;
                }
                if dropped > 0 {
                    warn!(
                        service = %service,
                        stream = %stream,
                        "dropped {dropped} lines of output, logger could not keep up"
                    );
                    dropped = 0;
                }
            }
            Err(err) => {
                debug!(service = %service, stream = %stream, "stopped reading output: {err}");
                break;
            }
        }
    }
}

/// Queues one line, displacing the oldest buffered line when the queue is
/// full. Returns false only when the logger side is gone.
fn send_dropping_oldest(
    tx: &Sender<String>,
    drain: &Receiver<String>,
    line: String,
    dropped: &mut u64,
) -> bool {
    let mut pending = line;
    loop {
        match tx.try_send(pending) {
            Ok(()) => return true,
            Err(TrySendError::Full(line)) => {
                if drain.try_recv().is_ok() {
                    *dropped += 1;
                }
                pending = line;
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}

fn log_lines(rx: &Receiver<String>, service: &ServiceName, stream: OutputStream) {
    for line in rx.iter() {
        match stream {
            OutputStream::Stdout => {
                debug!(service = %service, stream = %stream, "{line}")
            }
            OutputStream::Stderr => {
                error!(service = %service, stream = %stream, "{line}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tracing_test::traced_test;

    fn name(s: &str) -> ServiceName {
        ServiceName::new(s).unwrap()
    }

    #[test]
    fn reader_splits_chunks_into_lines() {
        let (tx, rx) = bounded::<String>(16);
        let drain = rx.clone();

        read_lines(
            Cursor::new(b"first\nsec".to_vec()),
            &name("svc1"),
            OutputStream::Stdout,
            &tx,
            &drain,
        );
        drop(tx);

        let lines: Vec<String> = rx.iter().collect();
        // The trailing partial line is flushed at EOF.
        assert_eq!(lines, vec!["first".to_string(), "sec".to_string()]);
    }

    #[test]
    fn reader_strips_carriage_returns() {
        let (tx, rx) = bounded::<String>(16);
        let drain = rx.clone();

        read_lines(
            Cursor::new(b"windows line\r\n".to_vec()),
            &name("svc1"),
            OutputStream::Stdout,
            &tx,
            &drain,
        );
        drop(tx);

        assert_eq!(rx.iter().collect::<Vec<_>>(), vec!["windows line"]);
    }

    #[traced_test]
    #[test]
    fn full_queue_drops_the_oldest_line() {
        let (tx, rx) = bounded::<String>(2);
        let drain = rx.clone();

        read_lines(
            Cursor::new(b"one\ntwo\nthree\n".to_vec()),
            &name("svc1"),
            OutputStream::Stdout,
            &tx,
            &drain,
        );
        drop(tx);

        let lines: Vec<String> = rx.iter().collect();
        assert_eq!(lines, vec!["two".to_string(), "three".to_string()]);
        assert!(logs_contain("dropped 1 lines of output"));
    }

    #[test]
    fn reader_stops_once_logger_is_gone() {
        let (tx, rx) = bounded::<String>(1);
        let drain = rx.clone();
        drop(rx);

        let mut dropped = 0;
        assert!(!send_dropping_oldest(
            &tx,
            &drain,
            "line".to_string(),
            &mut dropped
        ));
    }

    #[traced_test]
    #[test]
    fn logger_tags_records_with_service_and_stream() {
        let (tx, rx) = bounded::<String>(4);
        tx.send("hello from child".to_string()).unwrap();
        drop(tx);

        log_lines(&rx, &name("svc1"), OutputStream::Stdout);

        assert!(logs_contain("hello from child"));
        assert!(logs_contain("svc1"));
    }

    #[traced_test]
    #[test]
    fn stderr_lines_are_logged_as_errors() {
        let (tx, rx) = bounded::<String>(4);
        tx.send("boom".to_string()).unwrap();
        drop(tx);

        log_lines(&rx, &name("svc1"), OutputStream::Stderr);

        assert!(logs_contain("ERROR"));
        assert!(logs_contain("boom"));
    }
}
