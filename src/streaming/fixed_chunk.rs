//! Re-chunks an arbitrary byte stream into fixed-size buffers, the shape
//! S3 chunked-streaming uploads sign over (64 KiB chunks with one final,
//! possibly-shorter chunk).
//!
//! Grounded on the `ImplAsyncRead` buffering in [`super::ByteStream`]: same
//! "accumulate into a `BytesMut`, split off once enough is buffered" idea,
//! generalized from "yield whatever `read` asked for" to "yield exactly
//! `chunk_size` bytes until the source runs dry".

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use pin_project::pin_project;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::ByteStream;

/// Default S3 chunk size (64 KiB), matching the published SigV4
/// chunked-upload examples.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[pin_project]
pub struct FixedSizeByteBufferSequence {
    chunk_size: usize,
    buffer: BytesMut,
    #[pin]
    inner: ByteStream,
    inner_done: bool,
}

impl FixedSizeByteBufferSequence {
    pub fn new(inner: ByteStream, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be positive");
        FixedSizeByteBufferSequence {
            chunk_size,
            buffer: BytesMut::new(),
            inner,
            inner_done: false,
        }
    }
}

impl Stream for FixedSizeByteBufferSequence {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if this.buffer.len() >= *this.chunk_size {
                let chunk = this.buffer.split_to(*this.chunk_size);
                return Poll::Ready(Some(Ok(chunk.freeze())));
            }
            if *this.inner_done {
                if this.buffer.is_empty() {
                    return Poll::Ready(None);
                }
                let chunk = std::mem::replace(&mut *this.buffer, BytesMut::new());
                return Poll::Ready(Some(Ok(chunk.freeze())));
            }
            match futures::ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(bytes)) => this.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => *this.inner_done = true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on_stream;

    fn stream_of(data: Vec<&'static [u8]>) -> ByteStream {
        ByteStream::new(futures::stream::iter(
            data.into_iter().map(|d| Ok(Bytes::from_static(d))),
        ))
    }

    #[test]
    fn splits_into_full_chunks_plus_one_partial() {
        let data = vec![&[b'a'; 40][..], &[b'a'; 40][..], &[b'a'; 20][..]];
        let seq = FixedSizeByteBufferSequence::new(stream_of(data), 30);
        let chunks: Vec<_> = block_on_stream(seq).map(|c| c.unwrap().len()).collect();
        assert_eq!(chunks, vec![30, 30, 30, 10]);
    }

    #[test]
    fn exact_multiple_yields_no_trailing_empty_chunk() {
        let seq = FixedSizeByteBufferSequence::new(stream_of(vec![&[b'x'; 60][..]]), 30);
        let chunks: Vec<_> = block_on_stream(seq).map(|c| c.unwrap().len()).collect();
        assert_eq!(chunks, vec![30, 30]);
    }

    #[test]
    fn empty_source_yields_no_chunks() {
        let seq = FixedSizeByteBufferSequence::new(stream_of(vec![]), 30);
        let chunks: Vec<_> = block_on_stream(seq).collect();
        assert!(chunks.is_empty());
    }
}
