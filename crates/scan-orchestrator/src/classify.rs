use tracing::{debug, warn};

use relay_bridge::{ClassifierRelay, RelayError};
use sentinel_core_types::Classification;

/// Results for one pass and whether they came from per-sentence calls.
#[derive(Clone, Debug, PartialEq)]
pub struct Classified {
    pub results: Vec<Classification>,
    pub fallback: bool,
}

/// One batch request for every text. A failed or malformed batch falls back to one
/// call per text; only a failing single call is returned as an error.
pub async fn classify_all(
    relay: &dyn ClassifierRelay,
    texts: &[String],
) -> Result<Classified, RelayError> {
    let batch = relay
        .classify_batch(texts)
        .await
        .and_then(|response| response.checked(texts.len()));
    match batch {
        Ok(results) => Ok(Classified {
            results,
            fallback: false,
        }),
        Err(err) => {
            warn!(target: "scan.orchestrator", error = %err, sentences = texts.len(), "batch classification failed, falling back to single requests");
            let mut results = Vec::with_capacity(texts.len());
            for text in texts {
                results.push(relay.classify_single(text).await?);
            }
            debug!(target: "scan.orchestrator", sentences = results.len(), "single-request fallback completed");
            Ok(Classified {
                results,
                fallback: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use relay_bridge::BatchResponse;

    use super::*;

    struct Relay {
        batch: Result<usize, RelayError>,
        single_fails: bool,
        singles: AtomicUsize,
    }

    #[async_trait]
    impl ClassifierRelay for Relay {
        async fn classify_single(&self, text: &str) -> Result<Classification, RelayError> {
            self.singles.fetch_add(1, Ordering::SeqCst);
            if self.single_fails {
                return Err(RelayError::Transport("down".into()));
            }
            Ok(Classification::new("HATE", text.len() as f64 / 100.0))
        }

        async fn classify_batch(&self, _texts: &[String]) -> Result<BatchResponse, RelayError> {
            let count = self.batch.clone()?;
            Ok(BatchResponse {
                results: vec![Classification::new("NOT_HATE", 0.1); count],
            })
        }
    }

    fn texts() -> Vec<String> {
        vec!["first one.".into(), "second sentence.".into()]
    }

    #[tokio::test]
    async fn well_formed_batch_does_not_fall_back() {
        let relay = Relay {
            batch: Ok(2),
            single_fails: false,
            singles: AtomicUsize::new(0),
        };
        let classified = classify_all(&relay, &texts()).await.unwrap();
        assert!(!classified.fallback);
        assert_eq!(classified.results.len(), 2);
        assert_eq!(relay.singles.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_batch_is_reclassified_one_by_one() {
        let relay = Relay {
            batch: Ok(1),
            single_fails: false,
            singles: AtomicUsize::new(0),
        };
        let classified = classify_all(&relay, &texts()).await.unwrap();
        assert!(classified.fallback);
        assert_eq!(relay.singles.load(Ordering::SeqCst), 2);
        assert_eq!(classified.results[1].score, 0.16);
    }

    #[tokio::test]
    async fn failing_single_call_is_an_error() {
        let relay = Relay {
            batch: Err(RelayError::Transport("reset".into())),
            single_fails: true,
            singles: AtomicUsize::new(0),
        };
        let err = classify_all(&relay, &texts()).await.unwrap_err();
        assert_eq!(err, RelayError::Transport("down".into()));
        assert_eq!(relay.singles.load(Ordering::SeqCst), 1);
    }
}
