// Copyright 2025 Radio Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Duplicate one byte stream into N independent readers.
//!
//! A single producer task pulls chunks from the source and hands a cheap
//! reference-counted copy to every consumer queue. The producer does not
//! read ahead of the slowest consumer: every queue must accept the current
//! chunk before the next one is pulled. A source error is delivered to all
//! consumers verbatim; dropping any consumer tears the whole pipeline down.
//!
//! Callers MUST drain or drop all returned readers, otherwise the producer
//! stalls on the abandoned queue.

use bytes::Bytes;
use std::io::{Error, ErrorKind, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;

const CHUNK_SIZE: usize = 64 * 1024;

// Per-consumer queue depth. Small on purpose: the queues only smooth out
// scheduling jitter, the slowest consumer still paces the producer.
const QUEUE_DEPTH: usize = 4;

/// Reader endpoint handed out by [`new`]. Implements `AsyncRead` and yields
/// exactly the bytes of the source, in order.
pub type DupReader = StreamReader<ReceiverStream<Result<Bytes>>, Bytes>;

/// Split `reader` into `count` independent readers.
///
/// Must be called from within a tokio runtime; the producer task is spawned
/// immediately and runs until the source is exhausted, the source errors,
/// or a consumer goes away.
pub fn new<R>(mut reader: R, count: usize) -> Result<Vec<DupReader>>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    if count == 0 {
        return Err(Error::new(ErrorKind::InvalidInput, "stream duplication requires at least one reader"));
    }

    let mut senders = Vec::with_capacity(count);
    let mut readers = Vec::with_capacity(count);
    for _ in 0..count {
        let (tx, rx) = mpsc::channel::<Result<Bytes>>(QUEUE_DEPTH);
        senders.push(tx);
        readers.push(StreamReader::new(ReceiverStream::new(rx)));
    }

    tokio::spawn(async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                // End of stream: dropping the senders closes every queue.
                Ok(0) => return,
                Ok(n) => {
                    let chunk = Bytes::copy_from_slice(&buf[..n]);
                    for (index, tx) in senders.iter().enumerate() {
                        if tx.send(Ok(chunk.clone())).await.is_err() {
                            poison(&senders, index).await;
                            return;
                        }
                    }
                }
                Err(err) => {
                    for tx in senders.iter() {
                        let _ = tx.send(Err(Error::new(err.kind(), err.to_string()))).await;
                    }
                    return;
                }
            }
        }
    });

    Ok(readers)
}

// A consumer was dropped mid-stream; the remaining readers must not see a
// clean end of stream.
async fn poison(senders: &[mpsc::Sender<Result<Bytes>>], dropped: usize) {
    for (index, tx) in senders.iter().enumerate() {
        if index == dropped {
            continue;
        }
        let _ = tx
            .send(Err(Error::new(ErrorKind::BrokenPipe, "duplicated stream reader dropped")))
            .await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    #[tokio::test]
    async fn test_all_readers_see_identical_bytes() {
        let mut body = vec![0u8; 1 << 20];
        for (i, b) in body.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }

        let readers = new(Cursor::new(body.clone()), 3).unwrap();
        let mut tasks = Vec::new();
        for mut r in readers {
            tasks.push(tokio::spawn(async move {
                let mut out = Vec::new();
                r.read_to_end(&mut out).await.unwrap();
                out
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), body);
        }
    }

    #[tokio::test]
    async fn test_slow_reader_still_sees_everything() {
        let body = vec![7u8; 512 * 1024];
        let mut readers = new(Cursor::new(body.clone()), 2).unwrap();
        let slow = readers.pop().unwrap();
        let mut fast = readers.pop().unwrap();

        let fast_task = tokio::spawn(async move {
            let mut out = Vec::new();
            fast.read_to_end(&mut out).await.unwrap();
            out
        });

        let mut slow = slow;
        let mut out = Vec::new();
        let mut chunk = vec![0u8; 1024];
        loop {
            tokio::time::sleep(std::time::Duration::from_micros(50)).await;
            let n = slow.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(out, body);
        assert_eq!(fast_task.await.unwrap(), body);
    }

    struct FailingReader {
        remaining: usize,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<Result<()>> {
            if self.remaining == 0 {
                return Poll::Ready(Err(Error::new(ErrorKind::ConnectionReset, "source failed")));
            }
            let n = self.remaining.min(buf.remaining()).min(1024);
            buf.put_slice(&vec![1u8; n]);
            self.remaining -= n;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_source_error_reaches_every_reader() {
        let readers = new(FailingReader { remaining: 8 * 1024 }, 2).unwrap();
        for mut r in readers {
            let mut out = Vec::new();
            let err = r.read_to_end(&mut out).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConnectionReset);
            assert_eq!(out.len(), 8 * 1024);
        }
    }

    #[tokio::test]
    async fn test_dropped_reader_poisons_the_rest() {
        let body = vec![9u8; 4 << 20];
        let mut readers = new(Cursor::new(body), 2).unwrap();
        let mut kept = readers.pop().unwrap();
        drop(readers.pop().unwrap());

        let mut out = Vec::new();
        let err = kept.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_zero_readers_rejected() {
        assert!(new(Cursor::new(Vec::new()), 0).is_err());
    }

    #[tokio::test]
    async fn test_empty_source() {
        let readers = new(Cursor::new(Vec::new()), 2).unwrap();
        for mut r in readers {
            let mut out = Vec::new();
            r.read_to_end(&mut out).await.unwrap();
            assert!(out.is_empty());
        }
    }
}
