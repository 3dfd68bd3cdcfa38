use crate::api::logging::emit_record_parse_error;
use crate::api::stream::{FrameDecoder, StreamRecord};
use crate::api::ByteStream;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Active,
    Done,
    Errored,
    Cancelled,
}

/// The outcome surface of one generation request. `accumulated` grows as
/// content fragments arrive; on failure the error message is appended so
/// the terminal content stays renderable.
#[derive(Debug, Clone)]
pub struct GenerationHandle {
    pub epoch: u64,
    pub accumulated: String,
    pub state: GenerationState,
}

/// Incremental messages for the live-typing display. Every update carries
/// the producing epoch; consumers drop updates from superseded requests
/// before touching shared state.
#[derive(Debug, Clone)]
pub enum GenerationUpdate {
    Delta { epoch: u64, text: String },
    Finished { handle: GenerationHandle },
}

/// Process-wide request stamp. Starting a request takes the next value;
/// a request is live only while its stamp still equals `latest()`.
/// Superseded requests stop mutating shared state and drain quietly, so
/// no transport-level cancellation is needed.
#[derive(Clone, Default)]
pub struct EpochCounter(Arc<AtomicU64>);

impl EpochCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the next epoch, superseding every request started before.
    pub fn begin(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_latest(&self, epoch: u64) -> bool {
        self.latest() == epoch
    }
}

/// Drives one `FrameDecoder` over one chunk stream and settles into a
/// terminal `GenerationHandle`.
pub struct ResponseAggregator {
    epochs: EpochCounter,
    decoder: FrameDecoder,
    handle: GenerationHandle,
}

impl ResponseAggregator {
    /// Claims the next epoch from the shared counter. Any aggregator
    /// started earlier is superseded from this point on.
    pub fn start(epochs: &EpochCounter) -> Self {
        let epoch = epochs.begin();
        Self {
            epochs: epochs.clone(),
            decoder: FrameDecoder::new(),
            handle: GenerationHandle {
                epoch,
                accumulated: String::new(),
                state: GenerationState::Active,
            },
        }
    }

    pub fn epoch(&self) -> u64 {
        self.handle.epoch
    }

    /// Consumes the stream to completion. Content fragments accumulate and
    /// are mirrored as `Delta` updates; an error payload or transport error
    /// settles the handle as `Errored`; a superseded epoch settles it as
    /// `Cancelled` without emitting anything further.
    pub async fn consume(
        mut self,
        mut stream: ByteStream,
        update_tx: Option<&mpsc::UnboundedSender<GenerationUpdate>>,
    ) -> GenerationHandle {
        while let Some(chunk_result) = stream.next().await {
            if !self.epochs.is_latest(self.handle.epoch) {
                self.handle.state = GenerationState::Cancelled;
                return self.handle;
            }

            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(error) => return self.fail(error.to_string(), update_tx),
            };

            for payload in self.decoder.process(&chunk) {
                match serde_json::from_str::<StreamRecord>(&payload) {
                    Ok(record) => {
                        if let Some(message) = record.error {
                            return self.fail(message, update_tx);
                        }
                        if let Some(fragment) = record.content {
                            if fragment.is_empty() {
                                continue;
                            }
                            self.handle.accumulated.push_str(&fragment);
                            emit_update(
                                update_tx,
                                GenerationUpdate::Delta {
                                    epoch: self.handle.epoch,
                                    text: fragment,
                                },
                            );
                        }
                    }
                    Err(parse_error) => emit_record_parse_error(&payload, &parse_error),
                }
            }

            if self.decoder.is_finished() {
                break;
            }
        }

        // Transport end without a sentinel counts as a normal early end.
        if !self.epochs.is_latest(self.handle.epoch) {
            self.handle.state = GenerationState::Cancelled;
            return self.handle;
        }
        self.handle.state = GenerationState::Done;
        emit_update(
            update_tx,
            GenerationUpdate::Finished {
                handle: self.handle.clone(),
            },
        );
        self.handle
    }

    /// Settles the handle as `Errored`, appending the message so the caller
    /// can render the failure inline instead of losing it.
    pub fn fail(
        mut self,
        message: impl Into<String>,
        update_tx: Option<&mpsc::UnboundedSender<GenerationUpdate>>,
    ) -> GenerationHandle {
        if !self.handle.accumulated.is_empty() {
            self.handle.accumulated.push('\n');
        }
        self.handle.accumulated.push_str(&message.into());
        self.handle.state = GenerationState::Errored;

        if self.epochs.is_latest(self.handle.epoch) {
            emit_update(
                update_tx,
                GenerationUpdate::Finished {
                    handle: self.handle.clone(),
                },
            );
        } else {
            self.handle.state = GenerationState::Cancelled;
        }
        self.handle
    }
}

fn emit_update(
    update_tx: Option<&mpsc::UnboundedSender<GenerationUpdate>>,
    update: GenerationUpdate,
) {
    if let Some(tx) = update_tx {
        let _ = tx.send(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_client::MockApiClient;
    use crate::api::ApiClient;
    use anyhow::Result;
    use bytes::Bytes;
    use futures::stream;

    fn chunk_stream(chunks: &[&str]) -> ByteStream {
        let items: Vec<Result<Bytes>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn test_fragmented_frames_reassemble_across_chunks() {
        let epochs = EpochCounter::new();
        let aggregator = ResponseAggregator::start(&epochs);
        let stream = chunk_stream(&[
            "data: {\"content\":\"Hel",
            "lo\"}\n",
            "data: {\"content\":\" World\"}\n",
            "data: [DONE]\n",
        ]);

        let handle = aggregator.consume(stream, None).await;
        assert_eq!(handle.accumulated, "Hello World");
        assert_eq!(handle.state, GenerationState::Done);
    }

    #[tokio::test]
    async fn test_mock_client_feeds_aggregator_end_to_end() {
        let mock = MockApiClient::new(vec![vec![
            "data: {\"content\":\"Draft \"}\n".to_string(),
            "data: {\"content\":\"text\"}\n".to_string(),
            "data: [DONE]\n".to_string(),
        ]]);
        let client = ApiClient::new_mock(std::sync::Arc::new(mock));
        let stream = client.create_stream("extend", "").await.unwrap();

        let epochs = EpochCounter::new();
        let handle = ResponseAggregator::start(&epochs).consume(stream, None).await;
        assert_eq!(handle.accumulated, "Draft text");
        assert_eq!(handle.state, GenerationState::Done);
    }

    #[tokio::test]
    async fn test_unparseable_payload_is_skipped_not_fatal() {
        let epochs = EpochCounter::new();
        let aggregator = ResponseAggregator::start(&epochs);
        let stream = chunk_stream(&[
            "data: {\"content\":\"a\"}\n",
            "data: {not json at all}\n",
            "data: {\"content\":\"b\"}\n",
            "data: [DONE]\n",
        ]);

        let handle = aggregator.consume(stream, None).await;
        assert_eq!(handle.accumulated, "ab");
        assert_eq!(handle.state, GenerationState::Done);
    }

    #[tokio::test]
    async fn test_error_record_short_circuits_remaining_content() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let epochs = EpochCounter::new();
        let aggregator = ResponseAggregator::start(&epochs);
        let stream = chunk_stream(&[
            "data: {\"content\":\"A\"}\n",
            "data: {\"error\":\"boom\"}\n",
            "data: {\"content\":\"B\"}\n",
        ]);

        let handle = aggregator.consume(stream, Some(&tx)).await;
        assert_eq!(handle.state, GenerationState::Errored);
        assert!(handle.accumulated.contains('A'));
        assert!(handle.accumulated.contains("boom"));
        assert!(!handle.accumulated.contains('B'));

        let mut deltas = Vec::new();
        while let Ok(update) = rx.try_recv() {
            if let GenerationUpdate::Delta { text, .. } = update {
                deltas.push(text);
            }
        }
        assert_eq!(deltas, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_transport_end_without_sentinel_is_normal_end() {
        let epochs = EpochCounter::new();
        let aggregator = ResponseAggregator::start(&epochs);
        let stream = chunk_stream(&["data: {\"content\":\"partial\"}\n"]);

        let handle = aggregator.consume(stream, None).await;
        assert_eq!(handle.accumulated, "partial");
        assert_eq!(handle.state, GenerationState::Done);
    }

    #[tokio::test]
    async fn test_transport_error_settles_as_errored() {
        let epochs = EpochCounter::new();
        let aggregator = ResponseAggregator::start(&epochs);
        let items: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from("data: {\"content\":\"x\"}\n")),
            Err(anyhow::anyhow!("connection reset")),
        ];
        let stream: ByteStream = Box::pin(stream::iter(items));

        let handle = aggregator.consume(stream, None).await;
        assert_eq!(handle.state, GenerationState::Errored);
        assert!(handle.accumulated.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_superseded_request_stops_emitting() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let epochs = EpochCounter::new();
        let first = ResponseAggregator::start(&epochs);
        let second = ResponseAggregator::start(&epochs);
        assert!(epochs.is_latest(second.epoch()));

        let stale = first
            .consume(
                chunk_stream(&["data: {\"content\":\"old\"}\n", "data: [DONE]\n"]),
                Some(&tx),
            )
            .await;
        assert_eq!(stale.state, GenerationState::Cancelled);
        assert!(rx.try_recv().is_err());

        let fresh = second
            .consume(
                chunk_stream(&["data: {\"content\":\"new\"}\n", "data: [DONE]\n"]),
                Some(&tx),
            )
            .await;
        assert_eq!(fresh.state, GenerationState::Done);
        assert_eq!(fresh.accumulated, "new");
    }

    #[tokio::test]
    async fn test_delta_updates_carry_their_epoch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let epochs = EpochCounter::new();
        let aggregator = ResponseAggregator::start(&epochs);
        let epoch = aggregator.epoch();

        aggregator
            .consume(
                chunk_stream(&["data: {\"content\":\"hi\"}\n", "data: [DONE]\n"]),
                Some(&tx),
            )
            .await;

        match rx.try_recv().unwrap() {
            GenerationUpdate::Delta { epoch: seen, text } => {
                assert_eq!(seen, epoch);
                assert_eq!(text, "hi");
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }
}
