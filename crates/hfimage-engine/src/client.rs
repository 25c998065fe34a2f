use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use hfimage_contracts::request::GenerationRequest;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConcurrencyPolicy, EngineConfig};
use crate::error::{truncate_text, GenerationError, TransportError, DIAGNOSTIC_BODY_MAX_CHARS};
use crate::image::ImageHandle;
use crate::progress::ProgressTracker;
use crate::transport::{HttpTransport, ResponseBody, Transport, TransportRequest};

/// Upper bound on the buffer reserved up front from a declared length.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Receives download percentages in `[0, 100]`.
pub type ProgressFn<'a> = &'a mut (dyn FnMut(u8) + Send);

/// Terminal result of one generation attempt.
#[derive(Debug)]
pub enum GenerationOutcome {
    Success(ImageHandle),
    /// Aborted by the user. Not an error.
    Cancelled,
    Failure(GenerationError),
}

impl GenerationOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationOutcome::Success(_) => "success",
            GenerationOutcome::Cancelled => "cancelled",
            GenerationOutcome::Failure(_) => "failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GenerationOutcome::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerationOutcome::Cancelled)
    }

    pub fn image(&self) -> Option<&ImageHandle> {
        match self {
            GenerationOutcome::Success(image) => Some(image),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&GenerationError> {
        match self {
            GenerationOutcome::Failure(err) => Some(err),
            _ => None,
        }
    }
}

/// Caller-owned way to abort one specific generation, independent of what
/// the client currently tracks.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
struct ActiveSlot {
    id: u64,
    token: CancellationToken,
}

/// Issues image generation requests and tracks the one in flight.
pub struct GenerationClient<T: Transport = HttpTransport> {
    config: EngineConfig,
    pub(crate) transport: T,
    active: Mutex<Option<ActiveSlot>>,
    next_id: AtomicU64,
}

impl GenerationClient<HttpTransport> {
    pub fn new(config: EngineConfig) -> Result<Self, GenerationError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> GenerationClient<T> {
    pub fn with_transport(config: EngineConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// True while a ticket is registered as the active generation.
    pub fn is_busy(&self) -> bool {
        self.slot().is_some()
    }

    /// Registers a fresh cancellation token as the active generation.
    ///
    /// Under `ConcurrencyPolicy::Reject` this fails with `Busy` while another
    /// ticket is tracked. Under `Replace` the earlier ticket is forgotten
    /// (not cancelled); `cancel()` can no longer reach it.
    pub fn begin(&self) -> Result<GenerationTicket<'_, T>, GenerationError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        {
            let mut slot = self.slot();
            if let Some(previous) = slot.as_ref() {
                match self.config.concurrency {
                    ConcurrencyPolicy::Reject => return Err(GenerationError::Busy),
                    ConcurrencyPolicy::Replace => {
                        warn!(
                            previous = previous.id,
                            next = id,
                            "replacing tracked generation; previous request is orphaned"
                        );
                    }
                }
            }
            *slot = Some(ActiveSlot {
                id,
                token: token.clone(),
            });
        }
        Ok(GenerationTicket {
            client: self,
            id,
            token,
        })
    }

    /// `begin` followed by `run`.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        on_progress: Option<ProgressFn<'_>>,
    ) -> GenerationOutcome {
        match self.begin() {
            Ok(ticket) => ticket.run(request, on_progress).await,
            Err(err) => {
                warn!(error = %err, "generation refused");
                GenerationOutcome::Failure(err)
            }
        }
    }

    /// Signals the tracked generation, if any, and stops tracking it.
    /// Returns whether there was something to cancel.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot();
        let Some(active) = slot.take() else {
            return false;
        };
        active.token.cancel();
        drop(slot);
        info!(request = active.id, "cancelling image generation");
        true
    }

    /// Settles ticket `id` as a success unless `token` has already been
    /// cancelled. Runs under the slot lock so it is ordered against `cancel()`.
    fn settle(&self, id: u64, token: &CancellationToken) -> bool {
        let mut slot = self.slot();
        if token.is_cancelled() {
            return false;
        }
        if slot.as_ref().map(|active| active.id) == Some(id) {
            *slot = None;
        }
        true
    }

    fn release(&self, id: u64) {
        let mut slot = self.slot();
        if slot.as_ref().map(|active| active.id) == Some(id) {
            *slot = None;
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ActiveSlot>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Why a run stopped before producing an image.
enum Interrupt {
    Cancelled,
    Failed(GenerationError),
}

impl From<GenerationError> for Interrupt {
    fn from(err: GenerationError) -> Self {
        Interrupt::Failed(err)
    }
}

impl From<TransportError> for Interrupt {
    fn from(err: TransportError) -> Self {
        Interrupt::Failed(err.into())
    }
}

/// One registered generation. Dropping it, settled or not, clears the
/// client's active slot if the slot still refers to this ticket.
pub struct GenerationTicket<'a, T: Transport> {
    client: &'a GenerationClient<T>,
    id: u64,
    token: CancellationToken,
}

impl<'a, T: Transport> GenerationTicket<'a, T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.token.clone(),
        }
    }

    pub async fn run(
        self,
        request: &GenerationRequest,
        on_progress: Option<ProgressFn<'_>>,
    ) -> GenerationOutcome {
        let outcome = match self.execute(request, on_progress).await {
            Ok(_) if !self.client.settle(self.id, &self.token) => {
                info!(
                    request = self.id,
                    "image generation was cancelled after the download finished"
                );
                GenerationOutcome::Cancelled
            }
            Ok(image) => {
                info!(
                    request = self.id,
                    bytes = image.len(),
                    mime = image.mime_type(),
                    "image generated"
                );
                GenerationOutcome::Success(image)
            }
            Err(Interrupt::Cancelled) => {
                info!(request = self.id, "image generation was cancelled");
                GenerationOutcome::Cancelled
            }
            Err(Interrupt::Failed(err)) => {
                warn!(request = self.id, error = %err, "image generation failed");
                GenerationOutcome::Failure(err)
            }
        };
        drop(self);
        outcome
    }

    async fn execute(
        &self,
        request: &GenerationRequest,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<ImageHandle, Interrupt> {
        request.validate().map_err(GenerationError::InvalidRequest)?;
        if self.token.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }

        let body = serde_json::to_vec(&request.payload())
            .map_err(|err| GenerationError::InvalidRequest(err.to_string()))?;
        let url = self.client.config.model_url(&request.model_id);
        info!(
            request = self.id,
            model = %request.model_id,
            width = request.width,
            height = request.height,
            steps = request.num_inference_steps,
            guidance = request.guidance_scale,
            negative_prompt = request.effective_negative_prompt().is_some(),
            seeded = request.seed.is_some(),
            "generating image"
        );
        debug!(request = self.id, %url, "sending generation request");

        let transport_request = TransportRequest::post_json(url, request.auth_token.clone(), body);
        let response = self
            .until_cancelled(self.client.transport.send(transport_request))
            .await??;
        debug!(
            request = self.id,
            status = response.status,
            content_length = ?response.content_length,
            "response received"
        );

        if !response.is_success() {
            // The body is diagnostic only; a failed read leaves it blank.
            let text = self
                .until_cancelled(response.body.text())
                .await?
                .unwrap_or_default();
            return Err(GenerationError::HttpStatus {
                status: response.status,
                reason: response.reason,
                body: truncate_text(text.trim(), DIAGNOSTIC_BODY_MAX_CHARS),
            }
            .into());
        }

        let declared = response.content_length.filter(|length| *length > 0);
        let bytes = match (on_progress, declared) {
            (Some(on_progress), Some(declared)) => {
                self.read_streaming(response.body, declared, on_progress)
                    .await?
            }
            _ => self.until_cancelled(response.body.collect()).await??,
        };
        if bytes.is_empty() {
            return Err(GenerationError::EmptyBody.into());
        }
        Ok(ImageHandle::new(bytes, response.content_type.as_deref()))
    }

    async fn read_streaming(
        &self,
        mut body: Box<dyn ResponseBody>,
        declared: u64,
        on_progress: ProgressFn<'_>,
    ) -> Result<Bytes, Interrupt> {
        let mut tracker = ProgressTracker::new(declared);
        let mut buffer = BytesMut::with_capacity(declared.min(MAX_PREALLOCATION) as usize);
        while let Some(chunk) = self.until_cancelled(body.chunk()).await?? {
            buffer.extend_from_slice(&chunk);
            let percent = tracker.advance(chunk.len());
            if self.token.is_cancelled() {
                return Err(Interrupt::Cancelled);
            }
            on_progress(percent);
        }
        if !tracker.is_complete() {
            return Err(GenerationError::Truncated {
                received: tracker.received(),
                declared,
            }
            .into());
        }
        Ok(buffer.freeze())
    }

    /// Races `future` against this ticket's token. Losing the race drops the
    /// future, which aborts the underlying transport operation.
    async fn until_cancelled<F: Future>(&self, future: F) -> Result<F::Output, Interrupt> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Interrupt::Cancelled),
            output = future => Ok(output),
        }
    }
}

impl<T: Transport> Drop for GenerationTicket<'_, T> {
    fn drop(&mut self) {
        self.client.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, OnceLock, Weak};
    use std::time::Duration;

    use async_trait::async_trait;

    use hfimage_contracts::request::BearerToken;
    use serde_json::{json, Value};

    use super::*;
    use crate::transport::scripted::{Reply, ScriptedTransport};
    use crate::transport::{Method, TransportResponse};

    fn request() -> GenerationRequest {
        GenerationRequest::new("m1", "a cat", BearerToken::new("hf_token"))
            .with_size(512, 512)
            .with_steps(20)
            .with_guidance_scale(7.5)
    }

    fn client(replies: Vec<Reply>) -> GenerationClient<ScriptedTransport> {
        GenerationClient::with_transport(
            EngineConfig::default().with_inference_base("http://inference.test/models"),
            ScriptedTransport::new(replies),
        )
    }

    /// Serves one 4-byte image whose body calls `client.cancel()` at the moment
    /// it reports end of stream.
    #[derive(Default)]
    struct CancelAtEndOfBody {
        client: OnceLock<Weak<GenerationClient<CancelAtEndOfBody>>>,
        acknowledged: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for CancelAtEndOfBody {
        async fn send(
            &self,
            _request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            Ok(TransportResponse {
                status: 200,
                reason: "OK".to_string(),
                content_type: Some("image/png".to_string()),
                content_length: Some(4),
                body: Box::new(CancellingBody {
                    chunks: VecDeque::from([Bytes::from_static(&[1, 2, 3, 4])]),
                    client: self.client.get().cloned(),
                    acknowledged: self.acknowledged.clone(),
                }),
            })
        }
    }

    struct CancellingBody {
        chunks: VecDeque<Bytes>,
        client: Option<Weak<GenerationClient<CancelAtEndOfBody>>>,
        acknowledged: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ResponseBody for CancellingBody {
        async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
            if let Some(chunk) = self.chunks.pop_front() {
                return Ok(Some(chunk));
            }
            if let Some(client) = self.client.take().and_then(|client| client.upgrade()) {
                self.acknowledged.store(client.cancel(), Ordering::SeqCst);
            }
            Ok(None)
        }
    }

    fn replace_client(replies: Vec<Reply>) -> GenerationClient<ScriptedTransport> {
        GenerationClient::with_transport(
            EngineConfig::default().with_concurrency(ConcurrencyPolicy::Replace),
            ScriptedTransport::new(replies),
        )
    }

    #[tokio::test]
    async fn streams_four_chunks_with_progress() {
        let chunks = vec![vec![7u8; 512]; 4];
        let client = client(vec![Reply::ok("image/png", chunks)]);
        let mut seen = Vec::new();

        let outcome = client
            .generate(&request(), Some(&mut |percent| seen.push(percent)))
            .await;

        assert_eq!(seen, vec![25, 50, 75, 100]);
        let image = outcome.image().cloned().unwrap_or_else(|| panic!("{outcome:?}"));
        assert_eq!(image.len(), 2048);
        assert_eq!(image.mime_type(), "image/png");
        assert!(!client.is_busy());
    }

    #[tokio::test]
    async fn two_uneven_chunks_report_forty_then_hundred() {
        let client = client(vec![Reply::ok(
            "image/jpeg",
            vec![vec![1u8; 400], vec![2u8; 600]],
        )]);
        let mut seen = Vec::new();

        let outcome = client
            .generate(&request(), Some(&mut |percent| seen.push(percent)))
            .await;

        assert_eq!(seen, vec![40, 100]);
        let image = outcome.image().cloned().unwrap_or_else(|| panic!("{outcome:?}"));
        assert_eq!(image.len(), 1000);
        assert_eq!(&image.bytes()[..400], &[1u8; 400][..]);
        assert_eq!(&image.bytes()[400..], &[2u8; 600][..]);
    }

    #[tokio::test]
    async fn posts_expected_request() -> anyhow::Result<()> {
        let client = client(vec![Reply::ok("image/png", vec![vec![1u8; 8]])]);
        let outcome = client.generate(&request(), None).await;
        assert!(outcome.is_success());

        let sent = client.transport().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::Post);
        assert_eq!(sent[0].url, "http://inference.test/models/m1");
        assert_eq!(sent[0].bearer_token.expose(), "hf_token");

        let body: Value = serde_json::from_slice(sent[0].json_body.as_deref().unwrap_or_default())?;
        assert_eq!(
            body,
            json!({
                "inputs": "a cat",
                "parameters": {
                    "width": 512,
                    "height": 512,
                    "num_inference_steps": 20,
                    "guidance_scale": 7.5
                }
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn bulk_mode_without_progress_or_length() {
        let client = client(vec![
            Reply::ok("image/png", vec![vec![1u8; 10], vec![2u8; 5]]),
            Reply::ok("", vec![vec![3u8; 4]]).declared_length(None),
        ]);

        let first = client.generate(&request(), None).await;
        assert_eq!(first.image().map(ImageHandle::len), Some(15));

        let mut calls = 0;
        let second = client
            .generate(&request(), Some(&mut |_: u8| calls += 1))
            .await;
        assert_eq!(calls, 0);
        let image = second.image().cloned().unwrap_or_else(|| panic!("{second:?}"));
        assert_eq!(image.len(), 4);
        assert_eq!(image.mime_type(), crate::image::DEFAULT_IMAGE_MIME);
    }

    #[tokio::test]
    async fn non_success_status_is_failure_with_code() {
        let client = client(vec![Reply::status(
            503,
            "Service Unavailable",
            "Model m1 is currently loading",
        )]);

        let outcome = client.generate(&request(), None).await;

        let err = outcome.error().unwrap_or_else(|| panic!("{outcome:?}"));
        assert_eq!(err.status(), Some(503));
        let text = err.to_string();
        assert!(text.contains("503"));
        assert!(text.contains("currently loading"));
        assert!(!client.is_busy());
    }

    #[tokio::test]
    async fn empty_success_body_is_failure() {
        let client = client(vec![
            Reply::ok("image/png", Vec::new()),
            Reply::ok("image/png", vec![Vec::new()]).declared_length(Some(0)),
        ]);
        let mut seen = Vec::new();

        let first = client
            .generate(&request(), Some(&mut |percent| seen.push(percent)))
            .await;
        let second = client.generate(&request(), None).await;

        assert!(matches!(first, GenerationOutcome::Failure(GenerationError::EmptyBody)));
        assert!(matches!(second, GenerationOutcome::Failure(GenerationError::EmptyBody)));
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn short_stream_is_truncated_without_fake_hundred() {
        let client = client(vec![
            Reply::ok("image/png", vec![vec![0u8; 300]]).declared_length(Some(1000))
        ]);
        let mut seen = Vec::new();

        let outcome = client
            .generate(&request(), Some(&mut |percent| seen.push(percent)))
            .await;

        assert_eq!(seen, vec![30]);
        assert!(matches!(
            outcome,
            GenerationOutcome::Failure(GenerationError::Truncated {
                received: 300,
                declared: 1000
            })
        ));
    }

    #[tokio::test]
    async fn transport_error_is_failure() {
        let client = client(vec![Reply {
            send_error: Some("connection reset".to_string()),
            ..Reply::default()
        }]);

        let outcome = client.generate(&request(), None).await;

        assert!(matches!(
            outcome,
            GenerationOutcome::Failure(GenerationError::Transport(TransportError::Connect(_)))
        ));
        assert!(!client.is_busy());
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_transport() {
        let client = client(Vec::new());
        let outcome = client
            .generate(&request().with_size(0, 512), None)
            .await;
        assert!(matches!(
            outcome,
            GenerationOutcome::Failure(GenerationError::InvalidRequest(_))
        ));
        assert!(client.transport().sent().is_empty());
    }

    #[tokio::test]
    async fn cancel_mid_stream_stops_progress() {
        let client = client(vec![
            Reply::ok("image/png", vec![vec![0u8; 100], vec![0u8; 100]])
                .declared_length(Some(400))
                .hanging(),
        ]);
        let mut seen = Vec::new();
        let mut cancelled = None;

        let outcome = client
            .generate(
                &request(),
                Some(&mut |percent| {
                    seen.push(percent);
                    if cancelled.is_none() {
                        cancelled = Some(client.cancel());
                    }
                }),
            )
            .await;

        assert!(outcome.is_cancelled(), "{outcome:?}");
        assert_eq!(seen, vec![25]);
        assert_eq!(cancelled, Some(true));
        assert!(!client.is_busy());
    }

    #[tokio::test]
    async fn cancel_while_waiting_for_response() -> anyhow::Result<()> {
        let client = Arc::new(client(vec![Reply {
            hang_on_send: true,
            ..Reply::ok("image/png", vec![vec![0u8; 4]])
        }]));

        let task = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.generate(&request(), None).await }
        });
        while client.transport().sent().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(client.cancel());
        let outcome = tokio::time::timeout(Duration::from_secs(5), task).await??;
        assert!(outcome.is_cancelled(), "{outcome:?}");
        assert!(!client.cancel());
        Ok(())
    }

    #[tokio::test]
    async fn cancel_when_idle_is_a_no_op() {
        let client = client(vec![Reply::ok("image/png", vec![vec![1u8; 4]])]);
        assert!(!client.cancel());

        assert!(client.generate(&request(), None).await.is_success());
        assert!(!client.cancel());
        assert!(!client.is_busy());
    }

    #[tokio::test]
    async fn caller_handle_cancels_before_send() {
        let client = client(vec![Reply::ok("image/png", vec![vec![1u8; 4]])]);
        let ticket = client.begin().unwrap_or_else(|err| panic!("{err}"));
        ticket.cancel_handle().cancel();

        let outcome = ticket.run(&request(), None).await;

        assert!(outcome.is_cancelled());
        assert!(client.transport().sent().is_empty());
        assert!(!client.is_busy());
    }

    #[test]
    fn reject_policy_refuses_overlap() {
        let client = client(Vec::new());
        let first = client.begin().unwrap_or_else(|err| panic!("{err}"));

        assert!(matches!(client.begin(), Err(GenerationError::Busy)));

        drop(first);
        assert!(!client.is_busy());
        assert!(client.begin().is_ok());
    }

    #[tokio::test]
    async fn reject_policy_generate_reports_busy() {
        let client = client(Vec::new());
        let _held = client.begin().unwrap_or_else(|err| panic!("{err}"));

        let outcome = client.generate(&request(), None).await;

        assert!(matches!(
            outcome,
            GenerationOutcome::Failure(GenerationError::Busy)
        ));
        assert!(client.is_busy());
    }

    #[test]
    fn replace_policy_orphans_previous_ticket() {
        let client = replace_client(Vec::new());
        let first = client.begin().unwrap_or_else(|err| panic!("{err}"));
        let first_handle = first.cancel_handle();
        let second = client.begin().unwrap_or_else(|err| panic!("{err}"));
        let second_handle = second.cancel_handle();

        assert!(client.cancel());
        assert!(second_handle.is_cancelled());
        assert!(!first_handle.is_cancelled());
        assert!(!client.cancel());

        drop(second);
        drop(first);
        assert!(!client.is_busy());
    }

    #[test]
    fn settling_an_orphan_keeps_the_newer_slot() {
        let client = replace_client(Vec::new());
        let first = client.begin().unwrap_or_else(|err| panic!("{err}"));
        let _second = client.begin().unwrap_or_else(|err| panic!("{err}"));

        drop(first);

        assert!(client.is_busy());
        assert!(client.cancel());
    }

    #[tokio::test]
    async fn cancel_acknowledged_at_end_of_body_wins_over_success() {
        for streaming in [false, true] {
            let client = Arc::new(GenerationClient::with_transport(
                EngineConfig::default(),
                CancelAtEndOfBody::default(),
            ));
            let _ = client.transport().client.set(Arc::downgrade(&client));
            let mut seen = Vec::new();
            let mut report = |percent: u8| seen.push(percent);

            let outcome = if streaming {
                client.generate(&request(), Some(&mut report)).await
            } else {
                client.generate(&request(), None).await
            };

            assert!(client.transport().acknowledged.load(Ordering::SeqCst));
            assert!(outcome.is_cancelled(), "streaming={streaming}: {outcome:?}");
            assert!(!client.is_busy());
            assert!(!client.cancel());
        }
    }

    #[tokio::test]
    async fn cancel_after_settlement_is_refused_and_keeps_success() {
        let client = client(vec![Reply::ok("image/png", vec![vec![7u8; 16]])]);

        let outcome = client.generate(&request(), None).await;

        assert!(outcome.is_success());
        assert!(!client.cancel());
    }

    #[tokio::test]
    async fn overlapping_generations_under_replace_both_settle() {
        let client = replace_client(vec![
            Reply::ok("image/png", vec![vec![1u8; 32]]).delayed(Duration::from_millis(60)),
            Reply::ok("image/png", vec![vec![2u8; 8]])
                .declared_length(Some(64))
                .hanging(),
        ]);
        let first_request = request();
        let second_request = request().with_seed(Some(2));

        let (first, second, cancelled) = tokio::join!(
            client.generate(&first_request, None),
            client.generate(&second_request, None),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                client.cancel()
            }
        );

        assert!(cancelled);
        assert!(second.is_cancelled(), "{second:?}");
        assert_eq!(first.image().map(ImageHandle::len), Some(32));
        assert_eq!(client.transport().sent().len(), 2);
        assert!(!client.is_busy());
        assert!(!client.cancel());
    }

    #[tokio::test]
    async fn dropping_an_in_flight_future_releases_the_slot() {
        let client = client(vec![Reply {
            hang_on_send: true,
            ..Reply::default()
        }]);

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            client.generate(&request(), None),
        )
        .await;

        assert!(timed_out.is_err());
        assert!(!client.is_busy());
    }
}
