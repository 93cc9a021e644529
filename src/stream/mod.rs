//! `StreamMultiplexer` (§4.7): formats a raw token channel as OpenAI
//! chat-completion-chunk SSE. Ordering is preserved by construction — each
//! chunk is produced and flushed from the same single forward pass over the
//! upstream channel, never buffered or reordered.

use crate::error::GatewayError;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tensorgate_schema::{ChatCompletionChunk, ChunkChoice, Delta};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const DONE: &str = "data: [DONE]\n\n";

enum Phase {
    Role,
    Tokens,
    Error(GatewayError),
    Finished,
    Done,
}

/// Converts a per-token `mpsc::Receiver` into `text/event-stream` bytes:
/// an initial role-only chunk, one delta chunk per token, a final chunk
/// carrying `finish_reason`, then the literal `[DONE]` sentinel. A backend
/// error mid-stream emits one terminal error event and closes without
/// `[DONE]`, matching a genuine upstream failure rather than a clean stop.
pub struct StreamMultiplexer {
    id: String,
    model: String,
    created: i64,
    inner: ReceiverStream<Result<String, GatewayError>>,
    phase: Phase,
}

impl StreamMultiplexer {
    pub fn new(
        id: String,
        model: String,
        created: i64,
        rx: mpsc::Receiver<Result<String, GatewayError>>,
    ) -> Self {
        Self {
            id,
            model,
            created,
            inner: ReceiverStream::new(rx),
            phase: Phase::Role,
        }
    }

    fn chunk(&self, delta: Delta, finish_reason: Option<String>) -> String {
        let chunk = ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        };
        let body = serde_json::to_string(&chunk).unwrap_or_default();
        format!("data: {body}\n\n")
    }
}

impl Stream for StreamMultiplexer {
    type Item = Result<String, GatewayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match &this.phase {
                Phase::Role => {
                    this.phase = Phase::Tokens;
                    let chunk = this.chunk(
                        Delta {
                            role: Some("assistant".to_string()),
                            content: None,
                        },
                        None,
                    );
                    return Poll::Ready(Some(Ok(chunk)));
                }
                Phase::Tokens => match Pin::new(&mut this.inner).poll_next(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(None) => {
                        this.phase = Phase::Finished;
                        continue;
                    }
                    Poll::Ready(Some(Ok(token))) => {
                        let chunk = this.chunk(
                            Delta {
                                role: None,
                                content: Some(token),
                            },
                            None,
                        );
                        return Poll::Ready(Some(Ok(chunk)));
                    }
                    Poll::Ready(Some(Err(e))) => {
                        this.phase = Phase::Error(e);
                        continue;
                    }
                },
                Phase::Finished => {
                    this.phase = Phase::Done;
                    let chunk = this.chunk(Delta::default(), Some("stop".to_string()));
                    return Poll::Ready(Some(Ok(format!("{chunk}{DONE}"))));
                }
                Phase::Error(_) => {
                    let Phase::Error(e) = std::mem::replace(&mut this.phase, Phase::Done) else {
                        unreachable!()
                    };
                    return Poll::Ready(Some(Err(e)));
                }
                Phase::Done => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(rx: mpsc::Receiver<Result<String, GatewayError>>) -> Vec<String> {
        let mux = StreamMultiplexer::new("c1".into(), "gpt-4".into(), 0, rx);
        tokio_stream::StreamExt::collect::<Vec<_>>(mux)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect()
    }

    #[tokio::test]
    async fn happy_path_ends_with_done_sentinel() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok("hi".to_string())).await.unwrap();
        tx.send(Ok(" there".to_string())).await.unwrap();
        drop(tx);

        let chunks = drain(rx).await;
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].contains("\"role\":\"assistant\""));
        assert!(chunks[1].contains("\"content\":\"hi\""));
        assert!(chunks[2].contains("\"finish_reason\":\"stop\""));
        assert!(chunks[2].ends_with(DONE));
    }

    #[tokio::test]
    async fn backend_error_closes_without_done() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok("partial".to_string())).await.unwrap();
        tx.send(Err(GatewayError::Backend("upstream died".to_string())))
            .await
            .unwrap();
        drop(tx);

        let mux = StreamMultiplexer::new("c1".into(), "gpt-4".into(), 0, rx);
        let items: Vec<_> = tokio_stream::StreamExt::collect(mux).await;
        assert_eq!(items.len(), 3);
        assert!(items[2].is_err());
    }
}
