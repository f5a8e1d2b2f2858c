//! Middleware chain (§5's "Middleware stack"): ordered request/response
//! interceptors wrapped around the inner dispatch, right-associated so
//! each middleware's `next` call invokes the next-innermost layer, with
//! signing wired as the innermost step — every middleware therefore
//! observes the *unsigned* request and the raw (pre-collate) response,
//! matching §5's "signing happens last, inside the innermost handler"
//! resolution of the source's two orderings.
//!
//! Grounded on the teacher's `S3Client::sign_and_dispatch` (which always
//! ran exactly one fixed step between build and dispatch); generalized
//! into an open chain so generated per-operation code and callers can
//! both add steps without editing this core.

use std::time::Duration;

use async_trait::async_trait;

use crate::signature::SignedRequest;
use crate::transport::{DispatchSignedRequest, HttpDispatchError, HttpResponse};

/// One link in the middleware chain. `handle` receives the in-flight
/// request and a handle to the rest of the chain (`next`), and must call
/// `next.run(request)` to continue — a middleware that doesn't call it
/// short-circuits the chain (e.g. a cache hit returning a fabricated
/// response without touching the network).
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        request: SignedRequest,
        timeout: Option<Duration>,
        next: &Next<'_>,
    ) -> Result<HttpResponse, HttpDispatchError>;
}

/// The remaining chain, seen from inside one middleware's `handle`.
pub struct Next<'a> {
    remaining: &'a [Box<dyn Middleware>],
    dispatcher: &'a dyn DispatchSignedRequest,
}

impl<'a> Next<'a> {
    pub async fn run(
        &self,
        request: SignedRequest,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, HttpDispatchError> {
        match self.remaining.split_first() {
            Some((middleware, rest)) => {
                let next = Next {
                    remaining: rest,
                    dispatcher: self.dispatcher,
                };
                middleware.handle(request, timeout, &next).await
            }
            None => self.dispatcher.execute(request, timeout).await,
        }
    }
}

/// The assembled chain, run from the outermost middleware through to the
/// transport's `execute`.
pub struct MiddlewareChain {
    middlewares: Vec<Box<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        MiddlewareChain {
            middlewares: Vec::new(),
        }
    }

    pub fn push(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Box::new(middleware));
        self
    }

    pub async fn run(
        &self,
        request: SignedRequest,
        timeout: Option<Duration>,
        dispatcher: &dyn DispatchSignedRequest,
    ) -> Result<HttpResponse, HttpDispatchError> {
        let next = Next {
            remaining: &self.middlewares,
            dispatcher,
        };
        next.run(request, timeout).await
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs the method/path/status of every request that passes through, at
/// the `log` crate's `debug` level — mirrors the teacher's dispatch-site
/// `debug!("{} {}", method, uri)` calls.
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        request: SignedRequest,
        timeout: Option<Duration>,
        next: &Next<'_>,
    ) -> Result<HttpResponse, HttpDispatchError> {
        let method = request.method.clone();
        let path = request.path.clone();
        log::debug!("dispatching {} {}", method, path);
        let result = next.run(request, timeout).await;
        match &result {
            Ok(response) => log::debug!("{} {} -> {}", method, path, response.status),
            Err(err) => log::debug!("{} {} -> dispatch error: {}", method, path, err),
        }
        result
    }
}

/// Adds a fixed header to every request passing through, e.g. a
/// `User-Agent` stamp applied uniformly across operations.
pub struct AddHeaderMiddleware {
    pub name: String,
    pub value: String,
}

#[async_trait]
impl Middleware for AddHeaderMiddleware {
    async fn handle(
        &self,
        mut request: SignedRequest,
        timeout: Option<Duration>,
        next: &Next<'_>,
    ) -> Result<HttpResponse, HttpDispatchError> {
        request.add_header(self.name.clone(), &self.value);
        next.run(request, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;
    use crate::streaming::ByteStream;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingDispatcher {
        seen_headers: Arc<std::sync::Mutex<Vec<String>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DispatchSignedRequest for RecordingDispatcher {
        async fn execute(
            &self,
            request: SignedRequest,
            _timeout: Option<Duration>,
        ) -> Result<HttpResponse, HttpDispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_headers
                .lock()
                .unwrap()
                .extend(request.headers.keys().cloned());
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: ByteStream::new(stream::iter(vec![Ok::<_, std::io::Error>(Bytes::new())])),
            })
        }

        async fn shutdown(&self) {}
    }

    fn request() -> SignedRequest {
        SignedRequest::new("GET", "demo", &Region::UsEast1, "/")
    }

    #[tokio::test]
    async fn chain_runs_middlewares_outermost_first_then_dispatches() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let dispatcher = RecordingDispatcher {
            seen_headers: seen.clone(),
            calls: AtomicUsize::new(0),
        };
        let chain = MiddlewareChain::new()
            .push(LoggingMiddleware)
            .push(AddHeaderMiddleware {
                name: "x-custom".to_owned(),
                value: "yes".to_owned(),
            });

        let response = chain.run(request(), None, &dispatcher).await.unwrap();
        assert_eq!(response.status, 200);
        assert!(seen.lock().unwrap().contains(&"x-custom".to_owned()));
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);
    }

    struct ShortCircuitMiddleware;

    #[async_trait]
    impl Middleware for ShortCircuitMiddleware {
        async fn handle(
            &self,
            _request: SignedRequest,
            _timeout: Option<Duration>,
            _next: &Next<'_>,
        ) -> Result<HttpResponse, HttpDispatchError> {
            Ok(HttpResponse {
                status: 304,
                headers: HashMap::new(),
                body: ByteStream::new(stream::iter(vec![Ok::<_, std::io::Error>(Bytes::new())])),
            })
        }
    }

    #[tokio::test]
    async fn a_middleware_that_never_calls_next_short_circuits_the_chain() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let dispatcher = RecordingDispatcher {
            seen_headers: seen,
            calls: AtomicUsize::new(0),
        };
        let chain = MiddlewareChain::new().push(ShortCircuitMiddleware).push(LoggingMiddleware);

        let response = chain.run(request(), None, &dispatcher).await.unwrap();
        assert_eq!(response.status, 304);
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 0);
    }
}
