//! Streaming response body fed by the reverse scanner
//!
//! The scanner runs on the blocking pool and pushes owned line copies
//! through a capacity-1 channel, so it never gets more than one line ahead
//! of the network. The [`LineBody`] half implements hyper's `Body` trait and
//! hands one line to the transport per poll.

use bytes::Bytes;
use hyper::body::{Body, Frame};
use std::convert::Infallible;
use std::io::{self, Read, Seek};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::tail_scanner::{TailParams, TailScanner};

/// Start scanning `source` for the last `n` lines (optionally filtered by
/// `grep`) and return the receiving end of the line stream.
///
/// Each received item is one line, newest first. An `Err` item reports a
/// failed scan and is always the last item. Dropping the receiver stops the
/// scan at its next line.
pub fn spawn_line_stream<R>(
    source: R,
    n: usize,
    grep: Option<String>,
    params: TailParams,
) -> mpsc::Receiver<io::Result<Bytes>>
where
    R: Read + Seek + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);

    tokio::task::spawn_blocking(move || {
        let mut scanner = TailScanner::with_params(source, n, grep, params);
        loop {
            let item = match scanner.next_line() {
                Ok(Some(line)) => Ok(Bytes::copy_from_slice(line)),
                Ok(None) => break,
                Err(err) => {
                    let _ = tx.blocking_send(Err(err));
                    break;
                }
            };
            if tx.blocking_send(item).is_err() {
                // Receiver dropped: client went away or the session was
                // cancelled mid-stream.
                break;
            }
        }
    });

    rx
}

/// Response body that yields one scanned line per frame.
///
/// The caller pulls the first line before constructing the body (an early
/// failure must still become a 500), so the body starts with that line and
/// then drains the channel. A mid-stream scan error is logged and turns
/// into a clean early end-of-body: the status is already on the wire and
/// cannot be amended.
pub struct LineBody {
    first: Option<Bytes>,
    rx: mpsc::Receiver<io::Result<Bytes>>,
}

impl LineBody {
    pub fn new(first: Bytes, rx: mpsc::Receiver<io::Result<Bytes>>) -> Self {
        Self {
            first: Some(first),
            rx,
        }
    }
}

impl Body for LineBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if let Some(line) = this.first.take() {
            return Poll::Ready(Some(Ok(Frame::data(line))));
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(line))) => Poll::Ready(Some(Ok(Frame::data(line)))),
            Poll::Ready(Some(Err(err))) => {
                tracing::error!("Tail scan failed mid-stream: {}", err);
                this.rx.close();
                Poll::Ready(None)
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::io::{Cursor, SeekFrom};

    fn stream_from(content: &str, n: usize, grep: Option<&str>) -> mpsc::Receiver<io::Result<Bytes>> {
        spawn_line_stream(
            Cursor::new(content.as_bytes().to_vec()),
            n,
            grep.map(str::to_string),
            TailParams::default(),
        )
    }

    #[tokio::test]
    async fn lines_arrive_newest_first() {
        let mut rx = stream_from("a\nb\nc\n", 2, None);
        assert_eq!(rx.recv().await.unwrap().unwrap(), Bytes::from("c\n"));
        assert_eq!(rx.recv().await.unwrap().unwrap(), Bytes::from("b\n"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn empty_source_closes_immediately() {
        let mut rx = stream_from("", 5, None);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn body_concatenates_the_streamed_lines() {
        let mut rx = stream_from("one\ntwo\nthree\n", 3, None);
        let first = rx.recv().await.unwrap().unwrap();

        let body = LineBody::new(first, rx);
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from("three\ntwo\none\n"));
    }

    #[tokio::test]
    async fn grep_is_applied_by_the_producer() {
        let mut rx = stream_from("keep 1\ndrop\nkeep 2\n", 5, Some("keep"));
        assert_eq!(rx.recv().await.unwrap().unwrap(), Bytes::from("keep 2\n"));
        assert_eq!(rx.recv().await.unwrap().unwrap(), Bytes::from("keep 1\n"));
        assert!(rx.recv().await.is_none());
    }

    /// Seekable source whose reads always fail, to exercise the error path.
    struct BrokenSource;

    impl Read for BrokenSource {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }
    }

    impl Seek for BrokenSource {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Ok(1024)
        }
    }

    #[tokio::test]
    async fn scan_failure_is_reported_then_the_stream_ends() {
        let mut rx = spawn_line_stream(BrokenSource, 5, None, TailParams::default());
        let err = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn mid_stream_error_truncates_the_body_cleanly() {
        let (tx, rx) = mpsc::channel(1);
        tx.send(Ok(Bytes::from("second\n"))).await.unwrap();
        tokio::spawn(async move {
            let _ = tx
                .send(Err(io::Error::new(io::ErrorKind::Other, "seek failed")))
                .await;
        });

        let body = LineBody::new(Bytes::from("third\n"), rx);
        let collected = body.collect().await.unwrap().to_bytes();
        // The error is swallowed into an early end-of-body.
        assert_eq!(collected, Bytes::from("third\nsecond\n"));
    }
}
