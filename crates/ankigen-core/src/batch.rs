//! Sequential batch driver.
//!
//! Cards are enriched one at a time, in input order, with ids `1..=N`. A card
//! is only pushed once fully built, so cancellation never leaves a
//! half-written card in the output.

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::enrich::EnrichError;
use crate::model::{Flashcard, RawFlashcard};
use crate::ProgressEvent;

/// Anything that can enrich one raw card.
pub trait CardEnricher: Send + Sync {
    fn enrich_card<'a>(
        &'a self,
        raw: &'a RawFlashcard,
        id: usize,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Flashcard, EnrichError>>;
}

/// The batch was cancelled; `partial` holds the cards finished before that.
#[derive(Error, Debug)]
#[error("enrichment cancelled after {} of {} flashcards", .partial.len(), .total)]
pub struct BatchCancelled {
    pub partial: Vec<Flashcard>,
    pub total: usize,
}

/// Enrich every card in `raws`.
///
/// A card whose enrichment fails is replaced by a bare card, so on success
/// the output has the same length and order as the input.
pub async fn enrich_all(
    enricher: &dyn CardEnricher,
    raws: &[RawFlashcard],
    progress: &(dyn Fn(ProgressEvent) + Send + Sync),
    cancel: &CancellationToken,
) -> Result<Vec<Flashcard>, BatchCancelled> {
    let total = raws.len();
    let mut cards = Vec::with_capacity(total);

    for (index, raw) in raws.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(BatchCancelled {
                partial: cards,
                total,
            });
        }

        let id = index + 1;
        progress(ProgressEvent::Enriching {
            index,
            total,
            english: raw.english.clone(),
        });

        let card = match enricher.enrich_card(raw, id, cancel).await {
            Ok(card) => card,
            Err(EnrichError::Cancelled(_)) => {
                return Err(BatchCancelled {
                    partial: cards,
                    total,
                });
            }
            Err(err) => {
                progress(ProgressEvent::ItemFailed {
                    index,
                    english: raw.english.clone(),
                    error: err.to_string(),
                });
                Flashcard::bare(id, raw)
            }
        };

        progress(ProgressEvent::Enriched {
            index,
            total,
            english: card.english.clone(),
            has_dictionary_data: card.has_dictionary_data(),
        });
        cards.push(card);
    }

    Ok(cards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cancelled;
    use std::sync::{Arc, Mutex};

    /// Fills `definition` with the English word, fails on "bad" and cancels
    /// the shared token on "stop".
    struct ScriptedEnricher {
        cancel: CancellationToken,
    }

    impl CardEnricher for ScriptedEnricher {
        fn enrich_card<'a>(
            &'a self,
            raw: &'a RawFlashcard,
            id: usize,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, Result<Flashcard, EnrichError>> {
            Box::pin(async move {
                match raw.english.as_str() {
                    "bad" => Err(EnrichError::Failed {
                        english: raw.english.clone(),
                        reason: "boom".into(),
                    }),
                    "stop" => {
                        self.cancel.cancel();
                        Err(Cancelled.into())
                    }
                    _ => {
                        let mut card = Flashcard::bare(id, raw);
                        card.definition = format!("def of {}", raw.english);
                        Ok(card)
                    }
                }
            })
        }
    }

    fn raws(words: &[&str]) -> Vec<RawFlashcard> {
        words
            .iter()
            .enumerate()
            .map(|(i, w)| RawFlashcard::new(format!("ru{}", i), *w))
            .collect()
    }

    #[tokio::test]
    async fn preserves_order_identity_and_length() {
        let cancel = CancellationToken::new();
        let enricher = ScriptedEnricher {
            cancel: cancel.clone(),
        };
        let input = raws(&["house", "bad", "cat"]);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        let cards = enrich_all(
            &enricher,
            &input,
            &move |e| sink.lock().unwrap().push(e),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(cards.len(), input.len());
        for (i, (card, raw)) in cards.iter().zip(&input).enumerate() {
            assert_eq!(card.id, i + 1);
            assert_eq!(card.english, raw.english);
            assert_eq!(card.russian, raw.russian);
        }
        assert_eq!(cards[0].definition, "def of house");
        // Failed item becomes a bare card.
        assert_eq!(cards[1].definition, "");
        assert_eq!(cards[2].definition, "def of cat");

        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::ItemFailed { index: 1, .. }
        )));
        let enriched = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Enriched { .. }))
            .count();
        assert_eq!(enriched, 3);
    }

    #[tokio::test]
    async fn cancellation_returns_partial_results() {
        let cancel = CancellationToken::new();
        let enricher = ScriptedEnricher {
            cancel: cancel.clone(),
        };
        let input = raws(&["house", "cat", "stop", "dog"]);

        let err = enrich_all(&enricher, &input, &|_| {}, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.total, 4);
        assert_eq!(err.partial.len(), 2);
        assert_eq!(err.partial[1].english, "cat");
        assert_eq!(
            err.to_string(),
            "enrichment cancelled after 2 of 4 flashcards"
        );
    }

    #[tokio::test]
    async fn cancelled_before_start_returns_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let enricher = ScriptedEnricher {
            cancel: cancel.clone(),
        };
        let err = enrich_all(&enricher, &raws(&["house"]), &|_| {}, &cancel)
            .await
            .unwrap_err();
        assert!(err.partial.is_empty());
    }

    #[tokio::test]
    async fn empty_input_is_empty_output() {
        let cancel = CancellationToken::new();
        let enricher = ScriptedEnricher {
            cancel: cancel.clone(),
        };
        let cards = enrich_all(&enricher, &[], &|_| {}, &cancel).await.unwrap();
        assert!(cards.is_empty());
    }
}
