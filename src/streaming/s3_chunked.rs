//! Frames a fixed-chunk byte sequence into S3's chunked-streaming wire
//! format, chaining a SigV4 signature across every chunk.
//!
//! Each frame is `{hex(size)};chunk-signature={sig}\r\n{body}\r\n`; the
//! sequence ends with a zero-length terminator chunk carrying the final
//! chunk signature, per the published "Signature Calculations for the
//! Authorization Header: Transferring Payload in Multiple Chunks" example.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use pin_project::pin_project;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::signature::signer::{sign_chunk, ChunkSigningData};
use crate::streaming::fixed_chunk::FixedSizeByteBufferSequence;

#[pin_project]
pub struct ChunkedSigningStream {
    #[pin]
    inner: FixedSizeByteBufferSequence,
    signing_data: Option<ChunkSigningData>,
    terminated: bool,
}

impl ChunkedSigningStream {
    pub fn new(inner: FixedSizeByteBufferSequence, seed: ChunkSigningData) -> Self {
        ChunkedSigningStream {
            inner,
            signing_data: Some(seed),
            terminated: false,
        }
    }
}

fn frame(body: &[u8], signature: &str) -> Bytes {
    let mut out = BytesMut::with_capacity(body.len() + signature.len() + 32);
    out.extend_from_slice(format!("{:x};chunk-signature={}\r\n", body.len(), signature).as_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n");
    out.freeze()
}

impl Stream for ChunkedSigningStream {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.terminated {
            return Poll::Ready(None);
        }
        match futures::ready!(this.inner.as_mut().poll_next(cx)) {
            Some(Ok(body)) => {
                let data = this.signing_data.take().expect("signing_data present until terminated");
                let (signature, next) = sign_chunk(&body, &data);
                *this.signing_data = Some(next);
                Poll::Ready(Some(Ok(frame(&body, &signature))))
            }
            Some(Err(e)) => Poll::Ready(Some(Err(e))),
            None => {
                *this.terminated = true;
                let data = this.signing_data.take().expect("signing_data present until terminated");
                let (signature, _) = sign_chunk(&[], &data);
                Poll::Ready(Some(Ok(frame(&[], &signature))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::AwsCredentials;
    use crate::region::Region;
    use crate::signature::signer::{start_signing_chunks, SignedRequest};
    use chrono::TimeZone;
    use futures::executor::block_on_stream;
    use futures::stream;
    use crate::streaming::ByteStream;

    fn test_date() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.ymd(2015, 8, 30).and_hms(12, 36, 0)
    }

    #[test]
    fn three_chunk_upload_terminates_with_a_zero_length_frame() {
        let creds = AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY", None, None);
        let mut req = SignedRequest::new("PUT", "s3", &Region::UsEast1, "/examplebucket/chunkObject.txt");
        let total = 66560u64;
        let seed = start_signing_chunks(&mut req, &creds, &test_date(), total);

        let first = vec![b'a'; 65536];
        let second = vec![b'a'; 1024];
        let source = ByteStream::new(stream::iter(vec![
            Ok::<_, io::Error>(Bytes::from(first)),
            Ok(Bytes::from(second)),
        ]));
        let chunked = FixedSizeByteBufferSequence::new(source, 65536);
        let signed = ChunkedSigningStream::new(chunked, seed);

        let frames: Vec<Bytes> = block_on_stream(signed).map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 3);
        let last = std::str::from_utf8(&frames[2]).unwrap();
        assert!(last.starts_with("0;chunk-signature="));
        assert!(last.ends_with("\r\n\r\n"));
    }
}
