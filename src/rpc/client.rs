//! Correlating JSON-RPC client over a child process's stdio.
//!
//! One [`RpcClient`] drives one transport. Calls may be issued concurrently
//! from any number of tasks: each call registers a waiter under a fresh
//! [`RequestId`], writes its frame, and suspends until the single background
//! reader delivers the matching response, the call times out, or the
//! transport closes. Responses are matched by id, so arrival order does not
//! matter.

use super::codec::{Frame, FrameError, JsonLineCodec};
use super::envelope::{EnvelopeKind, ErrorObject, RequestId, RpcEnvelope};
use super::error::{RemoteError, RpcError, RpcResult};
use super::mcp::{self, ToolOutput};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex as AsyncMutex, OnceCell, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Timeout applied by the convenience operations when none is given.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

type Waiter = oneshot::Sender<RpcResult<Value>>;
type BoxedWriter = FramedWrite<Pin<Box<dyn AsyncWrite + Send>>, JsonLineCodec>;

#[derive(Default)]
struct PendingCalls {
    closed: bool,
    waiters: HashMap<RequestId, Waiter>,
}

struct Shared {
    label: String,
    next_id: AtomicU64,
    pending: Mutex<PendingCalls>,
    writer: AsyncMutex<BoxedWriter>,
    closed: CancellationToken,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, PendingCalls> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, id: RequestId, waiter: Waiter) -> RpcResult<()> {
        let mut pending = self.pending();
        if pending.closed {
            return Err(RpcError::TransportClosed);
        }
        pending.waiters.insert(id, waiter);
        Ok(())
    }

    fn forget(&self, id: &RequestId) {
        self.pending().waiters.remove(id);
    }

    fn resolve(&self, id: &RequestId, outcome: RpcResult<Value>) {
        let waiter = self.pending().waiters.remove(id);
        match waiter {
            Some(waiter) => {
                if waiter.send(outcome).is_err() {
                    debug!(backend = %self.label, request_id = %id, "caller stopped waiting");
                }
            }
            None => warn!(
                backend = %self.label,
                request_id = %id,
                "discarding response with unknown or duplicate id"
            ),
        }
    }

    fn close(&self) {
        let drained: Vec<Waiter> = {
            let mut pending = self.pending();
            pending.closed = true;
            pending.waiters.drain().map(|(_, waiter)| waiter).collect()
        };
        self.closed.cancel();
        if !drained.is_empty() {
            debug!(backend = %self.label, failed = drained.len(), "failing pending calls");
        }
        for waiter in drained {
            // A dropped receiver means the caller already gave up.
            drop(waiter.send(Err(RpcError::TransportClosed)));
        }
    }

    async fn send(&self, envelope: RpcEnvelope) -> RpcResult<()> {
        let mut writer = self.writer.lock().await;
        writer.send(envelope).await.map_err(|err| match err {
            FrameError::Io(io) => match Arc::try_unwrap(io) {
                Ok(io) => RpcError::io(io),
                Err(shared) => RpcError::Io(shared),
            },
            FrameError::Encode(encode) => RpcError::Encode(encode),
            FrameError::FrameTooLong { length, max } => RpcError::FrameTooLarge { length, max },
        })
    }

    async fn dispatch(self: &Arc<Self>, envelope: RpcEnvelope) {
        match envelope.kind() {
            EnvelopeKind::Response => {
                if let (Some(id), Some(result)) = (envelope.id, envelope.result) {
                    self.resolve(&id, Ok(result));
                }
            }
            EnvelopeKind::ErrorResponse => {
                let Some(error) = envelope.error else { return };
                match envelope.id {
                    Some(id) => {
                        self.resolve(&id, Err(RemoteError::new(error.code, error.message).into()));
                    }
                    None => warn!(
                        backend = %self.label,
                        code = error.code,
                        message = %error.message,
                        "backend reported an uncorrelated error"
                    ),
                }
            }
            EnvelopeKind::Request => {
                let method = envelope.method.unwrap_or_default();
                debug!(backend = %self.label, method = %method, "rejecting server-initiated request");
                let reply = RpcEnvelope::failure(
                    envelope.id,
                    ErrorObject::new(mcp::METHOD_NOT_FOUND, format!("method not found: {method}")),
                );
                let shared = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(err) = shared.send(reply).await {
                        debug!(backend = %shared.label, error = %err, "failed to reject request");
                    }
                });
            }
            EnvelopeKind::Notification => {
                trace!(
                    backend = %self.label,
                    method = envelope.method.as_deref().unwrap_or_default(),
                    "ignoring notification"
                );
            }
            EnvelopeKind::Invalid => {
                warn!(backend = %self.label, "discarding malformed envelope");
            }
        }
    }
}

/// Removes a pending call when its caller finishes or is cancelled.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.forget(&self.id);
    }
}

async fn read_loop<R>(shared: Arc<Shared>, mut frames: FramedRead<R, JsonLineCodec>)
where
    R: AsyncRead + Unpin,
{
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Frame::Envelope(envelope)) => shared.dispatch(envelope).await,
            Ok(Frame::Garbage(line)) => {
                debug!(backend = %shared.label, line = %line, "skipping non-protocol output");
            }
            Ok(Frame::Oversized) => {
                warn!(backend = %shared.label, "skipping oversized output line");
            }
            Err(err) => {
                warn!(backend = %shared.label, error = %err, "transport read failed");
                break;
            }
        }
    }
    debug!(backend = %shared.label, "transport closed");
    shared.close();
}

/// JSON-RPC client bound to one transport.
pub struct RpcClient {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
    initialized: OnceCell<Value>,
    default_timeout: Duration,
}

impl RpcClient {
    /// Attaches a client to a transport and starts its background reader.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<R, W>(label: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let boxed: Pin<Box<dyn AsyncWrite + Send>> = Box::pin(writer);
        let shared = Arc::new(Shared {
            label: label.into(),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(PendingCalls::default()),
            writer: AsyncMutex::new(FramedWrite::new(boxed, JsonLineCodec::new())),
            closed: CancellationToken::new(),
        });
        let frames = FramedRead::new(reader, JsonLineCodec::new());
        let reader = tokio::spawn(read_loop(Arc::clone(&shared), frames));
        Self {
            shared,
            reader,
            initialized: OnceCell::new(),
            default_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Sets the timeout used by [`Self::call_tool`] and [`Self::read_resource`].
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Returns the label used in log records.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Returns the timeout used by the convenience operations.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Returns the number of calls still awaiting a response.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.shared.pending().waiters.len()
    }

    /// Returns whether the transport has closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.pending().closed
    }

    /// Completes once the transport has closed for any reason.
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await;
    }

    /// Issues a request and waits for its response.
    ///
    /// The timeout covers writing the request as well as waiting for the
    /// answer, so a backend that stops reading its stdin cannot stall the
    /// caller. Dropping the returned future abandons the call; a late response is
    /// then discarded by the reader.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::TransportClosed`] when the transport is or
    /// becomes closed, [`RpcError::Timeout`] when no response arrives in
    /// time, [`RpcError::FrameTooLarge`] when the request cannot be framed,
    /// and [`RpcError::Remote`] for error responses.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> RpcResult<Value> {
        let id = RequestId::from(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = oneshot::channel();
        self.shared.register(id.clone(), sender)?;
        let _guard = PendingGuard {
            shared: &self.shared,
            id: id.clone(),
        };

        trace!(backend = %self.shared.label, request_id = %id, method, "sending request");
        let exchange = async {
            self.shared
                .send(RpcEnvelope::request(id, method, params))
                .await?;
            receiver.await.unwrap_or(Err(RpcError::TransportClosed))
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .unwrap_or_else(|_| {
                Err(RpcError::Timeout {
                    method: method.to_owned(),
                    after: timeout,
                })
            })
    }

    /// Sends a notification.
    ///
    /// # Errors
    ///
    /// Returns transport errors from writing the frame.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> RpcResult<()> {
        if self.is_closed() {
            return Err(RpcError::TransportClosed);
        }
        self.shared
            .send(RpcEnvelope::notification(method, params))
            .await
    }

    /// Performs the `initialize` handshake once; later calls return the
    /// cached server answer.
    ///
    /// # Errors
    ///
    /// Returns any error from the handshake call.
    pub async fn initialize(&self, timeout: Duration) -> RpcResult<&Value> {
        self.initialized
            .get_or_try_init(|| {
                self.call(mcp::INITIALIZE, Some(mcp::initialize_params()), timeout)
            })
            .await
    }

    /// Returns whether the handshake has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Invokes a tool through `tools/call`.
    ///
    /// # Errors
    ///
    /// Returns handshake and call errors, [`RpcError::InvalidToolPayload`]
    /// for malformed results, and [`RpcError::Remote`] when the tool reports
    /// failure.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> RpcResult<ToolOutput> {
        self.initialize(self.default_timeout).await?;
        let result = self
            .call(
                mcp::TOOLS_CALL,
                Some(mcp::tool_call_params(name, arguments)),
                self.default_timeout,
            )
            .await?;
        mcp::parse_tool_output(result)
    }

    /// Reads a resource and normalises inline text or base64 content to
    /// text.
    ///
    /// # Errors
    ///
    /// Returns handshake and call errors, and
    /// [`RpcError::InvalidResourcePayload`] for unusable payloads.
    pub async fn read_resource(&self, uri: &str) -> RpcResult<String> {
        self.initialize(self.default_timeout).await?;
        let result = self
            .call(
                mcp::RESOURCES_READ,
                Some(serde_json::json!({ "uri": uri })),
                self.default_timeout,
            )
            .await?;
        mcp::resource_text(&result)
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RpcClient")
            .field("label", &self.shared.label)
            .field("pending_calls", &self.pending_calls())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.shared.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::codec::MAX_FRAME_LENGTH;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};

    /// Far end of a client transport, playing the backend.
    struct FakeBackend {
        requests: tokio::io::Lines<BufReader<DuplexStream>>,
        responses: DuplexStream,
    }

    impl FakeBackend {
        async fn next_request(&mut self) -> RpcEnvelope {
            let line = self
                .requests
                .next_line()
                .await
                .expect("request stream readable")
                .expect("request line present");
            serde_json::from_str(&line).expect("request is an envelope")
        }

        async fn reply(&mut self, envelope: &RpcEnvelope) {
            let mut line = serde_json::to_string(envelope).expect("envelope serialises");
            line.push('\n');
            self.responses
                .write_all(line.as_bytes())
                .await
                .expect("response written");
        }

        async fn write_raw(&mut self, raw: &[u8]) {
            self.responses
                .write_all(raw)
                .await
                .expect("raw line written");
        }
    }

    fn connect() -> (Arc<RpcClient>, FakeBackend) {
        let (client_reader, backend_writer) = duplex(64 * 1024);
        let (backend_reader, client_writer) = duplex(64 * 1024);
        let client = RpcClient::spawn("test", client_reader, client_writer)
            .with_default_timeout(Duration::from_secs(5));
        let backend = FakeBackend {
            requests: BufReader::new(backend_reader).lines(),
            responses: backend_writer,
        };
        (Arc::new(client), backend)
    }

    async fn wait_for_pending(client: &RpcClient, expected: usize) {
        for _ in 0..200 {
            if client.pending_calls() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {expected} pending calls, saw {}", client.pending_calls());
    }

    #[tokio::test]
    async fn out_of_order_responses_reach_their_own_waiters() {
        let (client, mut backend) = connect();

        let first = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("first", None, Duration::from_secs(5)).await }
        });
        let first_request = backend.next_request().await;
        let second = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("second", None, Duration::from_secs(5)).await }
        });
        let second_request = backend.next_request().await;

        let second_id = second_request.id.expect("second request has an id");
        let first_id = first_request.id.expect("first request has an id");
        assert_ne!(first_id, second_id);

        backend
            .reply(&RpcEnvelope::success(second_id, json!("for second")))
            .await;
        backend
            .reply(&RpcEnvelope::success(first_id, json!("for first")))
            .await;

        let first_result = first.await.expect("task joins").expect("first succeeds");
        let second_result = second.await.expect("task joins").expect("second succeeds");
        assert_eq!(first_result, json!("for first"));
        assert_eq!(second_result, json!("for second"));
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn remote_errors_are_typed() {
        let (client, mut backend) = connect();

        let call = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("boom", None, Duration::from_secs(5)).await }
        });
        let request = backend.next_request().await;
        backend
            .reply(&RpcEnvelope::failure(
                request.id,
                ErrorObject::new(-32601, "method not found"),
            ))
            .await;

        let result = call.await.expect("task joins");
        assert!(matches!(
            result,
            Err(RpcError::Remote(RemoteError { code: -32601, .. }))
        ));
    }

    #[tokio::test]
    async fn transport_close_fails_every_pending_call() {
        let (client, mut backend) = connect();

        let calls: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|method| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.call(method, None, Duration::from_secs(30)).await })
            })
            .collect();
        for _ in 0..3 {
            backend.next_request().await;
        }
        wait_for_pending(&client, 3).await;

        drop(backend);

        for call in calls {
            let result = call.await.expect("task joins");
            assert!(matches!(result, Err(RpcError::TransportClosed)));
        }
        assert!(client.is_closed());

        let after_close = client.call("late", None, Duration::from_secs(1)).await;
        assert!(matches!(after_close, Err(RpcError::TransportClosed)));
    }

    #[tokio::test]
    async fn timed_out_calls_release_their_slot() {
        let (client, mut backend) = connect();

        let result = tokio::join!(
            client.call("slow", None, Duration::from_millis(50)),
            backend.next_request()
        )
        .0;

        assert!(matches!(result, Err(RpcError::Timeout { .. })));
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn abandoned_calls_leave_no_pending_entry() {
        let (client, mut backend) = connect();

        let call = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("abandoned", None, Duration::from_secs(30)).await }
        });
        let request = backend.next_request().await;
        wait_for_pending(&client, 1).await;

        call.abort();
        wait_for_pending(&client, 0).await;

        backend
            .reply(&RpcEnvelope::success(
                request.id.expect("request has an id"),
                json!(null),
            ))
            .await;
        let follow_up = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("follow_up", None, Duration::from_secs(5)).await }
        });
        let follow_up_request = backend.next_request().await;
        backend
            .reply(&RpcEnvelope::success(
                follow_up_request.id.expect("request has an id"),
                json!(1),
            ))
            .await;

        assert_eq!(
            follow_up.await.expect("task joins").expect("call succeeds"),
            json!(1)
        );
    }

    #[tokio::test]
    async fn unmatched_ids_and_garbage_lines_are_ignored() {
        let (client, mut backend) = connect();

        let call = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("ping", None, Duration::from_secs(5)).await }
        });
        let request = backend.next_request().await;
        backend.write_raw(b"not json at all\n").await;
        backend
            .reply(&RpcEnvelope::success(RequestId::from(999), json!("stray")))
            .await;
        backend
            .reply(&RpcEnvelope::success(
                request.id.expect("request has an id"),
                json!("pong"),
            ))
            .await;

        assert_eq!(
            call.await.expect("task joins").expect("call succeeds"),
            json!("pong")
        );
    }

    #[tokio::test]
    async fn non_utf8_output_does_not_close_the_transport() {
        let (client, mut backend) = connect();

        let call = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("ping", None, Duration::from_secs(5)).await }
        });
        let request = backend.next_request().await;
        backend.write_raw(b"log \xff\xfe latin1 noise\n").await;
        backend
            .reply(&RpcEnvelope::success(
                request.id.expect("request has an id"),
                json!("pong"),
            ))
            .await;

        assert_eq!(
            call.await.expect("task joins").expect("call succeeds"),
            json!("pong")
        );
        assert!(!client.is_closed());
    }

    #[tokio::test]
    async fn timeout_covers_a_stalled_write() {
        let (client_reader, _backend_writer) = duplex(1024);
        // Nobody reads this end, so writes stall once the buffer fills.
        let (_backend_reader, client_writer) = duplex(16);
        let client = RpcClient::spawn("stalled", client_reader, client_writer);

        let result = client
            .call(
                "slow_write",
                Some(json!({"padding": "x".repeat(4096)})),
                Duration::from_millis(100),
            )
            .await;

        assert!(matches!(result, Err(RpcError::Timeout { .. })));
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn oversized_requests_fail_without_touching_the_transport() {
        let (client, _backend) = connect();

        let result = client
            .call(
                "huge",
                Some(json!({"padding": "x".repeat(MAX_FRAME_LENGTH)})),
                Duration::from_secs(5),
            )
            .await;

        assert!(matches!(
            result,
            Err(RpcError::FrameTooLarge { max: MAX_FRAME_LENGTH, .. })
        ));
        assert!(!client.is_closed());
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn closed_resolves_when_the_backend_hangs_up() {
        let (client, backend) = connect();

        drop(backend);

        tokio::time::timeout(Duration::from_secs(5), client.closed())
            .await
            .expect("closure is observed");
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn handshake_precedes_tool_calls_and_runs_once() {
        let (client, mut backend) = connect();

        let calls = tokio::spawn({
            let client = Arc::clone(&client);
            async move {
                let first = client.call_tool("search", json!({"query": "a"})).await;
                let second = client.call_tool("search", json!({"query": "b"})).await;
                (first, second)
            }
        });

        let handshake = backend.next_request().await;
        assert_eq!(handshake.method.as_deref(), Some(mcp::INITIALIZE));
        backend
            .reply(&RpcEnvelope::success(
                handshake.id.expect("handshake has an id"),
                json!({"protocolVersion": mcp::PROTOCOL_VERSION}),
            ))
            .await;

        for _ in 0..2 {
            let request = backend.next_request().await;
            assert_eq!(request.method.as_deref(), Some(mcp::TOOLS_CALL));
            backend
                .reply(&RpcEnvelope::success(
                    request.id.expect("tool call has an id"),
                    json!({"content": [{"type": "text", "text": "hit"}]}),
                ))
                .await;
        }

        let (first, second) = calls.await.expect("task joins");
        assert_eq!(first.expect("first call succeeds").text(), "hit");
        assert_eq!(second.expect("second call succeeds").text(), "hit");
        assert!(client.is_initialized());
    }

    #[tokio::test]
    async fn read_resource_decodes_blob_content() {
        let (client, mut backend) = connect();
        let read = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.read_resource("gdrive:///file1").await }
        });

        let handshake = backend.next_request().await;
        backend
            .reply(&RpcEnvelope::success(
                handshake.id.expect("handshake has an id"),
                json!({}),
            ))
            .await;
        let request = backend.next_request().await;
        assert_eq!(
            request.params,
            Some(json!({"uri": "gdrive:///file1"}))
        );
        backend
            .reply(&RpcEnvelope::success(
                request.id.expect("read has an id"),
                json!({"contents": [{"uri": "gdrive:///file1", "blob": "aGVsbG8gZHJpdmU="}]}),
            ))
            .await;

        assert_eq!(
            read.await.expect("task joins").expect("read succeeds"),
            "hello drive"
        );
    }

    #[tokio::test]
    async fn server_requests_are_rejected_with_method_not_found() {
        let (client, mut backend) = connect();

        backend
            .reply(&RpcEnvelope::request(
                RequestId::Text("srv-1".to_owned()),
                "sampling/createMessage",
                None,
            ))
            .await;
        let reply = backend.next_request().await;

        assert_eq!(reply.kind(), EnvelopeKind::ErrorResponse);
        assert_eq!(reply.id, Some(RequestId::Text("srv-1".to_owned())));
        assert_eq!(
            reply.error.map(|error| error.code),
            Some(mcp::METHOD_NOT_FOUND)
        );
        drop(client);
    }
}
