//! Retriable Request
//!
//! Makes a request body re-sendable across attempts.

use bytes::Bytes;
use tracing::trace;

use crate::core::transport::{read_stream, Body, HttpRequest};
use crate::error::AzureResult;

/// Wraps a request so each attempt gets an unconsumed copy of its body.
///
/// Factory bodies are kept and re-invoked per attempt. One-shot streams are
/// read into memory on the first `prepare` and replayed from the buffer.
#[derive(Debug)]
pub struct RetriableRequest {
    request: HttpRequest,
    prepared: bool,
}

impl RetriableRequest {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request,
            prepared: false,
        }
    }

    /// Produce the request for the next attempt.
    ///
    /// A failure to read a stream body is fatal and is returned as is.
    pub fn prepare(&mut self) -> AzureResult<HttpRequest> {
        if !self.prepared {
            if let Body::Stream(stream) = &self.request.body {
                let buffer: Bytes = read_stream(stream)?;
                trace!(bytes = buffer.len(), "Buffered request body for retries");
                self.request.body = Body::Bytes(buffer);
            }
            self.prepared = true;
        }
        Ok(self.request.clone())
    }

    /// The wrapped request.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn into_inner(self) -> HttpRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::HttpMethod;
    use std::io::{self, Cursor, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn post() -> HttpRequest {
        HttpRequest::parse(HttpMethod::Post, "https://example.com/upload").unwrap()
    }

    #[test]
    fn test_stream_body_replayed_each_attempt() {
        let request = post().with_body(Body::from_reader(Cursor::new(b"hello".to_vec()), Some(5)));
        let mut retriable = RetriableRequest::new(request);
        for _ in 0..3 {
            let attempt = retriable.prepare().unwrap();
            assert_eq!(attempt.body.into_bytes().unwrap(), Bytes::from_static(b"hello"));
        }
    }

    #[test]
    fn test_factory_body_reinvoked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let request = post().with_body(Body::from_factory(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(b"x"))
        }));
        let mut retriable = RetriableRequest::new(request);
        retriable.prepare().unwrap().body.into_bytes().unwrap();
        retriable.prepare().unwrap().body.into_bytes().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk gone"))
        }
    }

    #[test]
    fn test_read_failure_is_fatal() {
        let request = post().with_body(Body::from_reader(FailingReader, None));
        let mut retriable = RetriableRequest::new(request);
        let err = retriable.prepare().unwrap_err();
        assert!(err.to_string().contains("disk gone"));
    }

    #[test]
    fn test_empty_body_passes_through() {
        let mut retriable = RetriableRequest::new(post());
        assert!(retriable.prepare().unwrap().body.is_empty());
    }
}
