//! Playback scheduler: drains the reassembly buffer strictly in sequence
//! order, driving the voice pool so consecutive chunks play back-to-back.
//!
//! The loop has exactly three suspension points: waiting for the next
//! contiguous chunk (woken by the buffer on every insert), waiting out the
//! current chunk's playback duration, and waiting for cancellation. After
//! each chunk it immediately re-checks the buffer before yielding — that
//! back-to-back check is what removes audible gaps when the next id is
//! already buffered.

use crate::audio::voice::{VoicePool, VoiceSink};
use crate::stream::buffer::ReassemblyBuffer;
use crate::stream::events::SessionEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

pub struct PlaybackScheduler<V: VoiceSink> {
    buffer: Arc<ReassemblyBuffer>,
    pool: Arc<VoicePool<V>>,
    events: mpsc::Sender<SessionEvent>,
    /// How long the head id may stay missing (with later ids buffered)
    /// before the scheduler skips ahead instead of stalling forever.
    missing_chunk_wait: Duration,
}

impl<V: VoiceSink + 'static> PlaybackScheduler<V> {
    pub fn new(
        buffer: Arc<ReassemblyBuffer>,
        pool: Arc<VoicePool<V>>,
        events: mpsc::Sender<SessionEvent>,
        missing_chunk_wait: Duration,
    ) -> Self {
        Self {
            buffer,
            pool,
            events,
            missing_chunk_wait,
        }
    }

    /// Runs until the session completes or is cancelled. Returns the number
    /// of chunks fully played.
    ///
    /// `complete` turns true once the server signalled end of production;
    /// `AllCompleted` is emitted only after that AND a fully drained buffer.
    pub async fn run(
        self,
        cancel: CancellationToken,
        mut complete: watch::Receiver<bool>,
    ) -> u64 {
        let mut chunks_played: u64 = 0;
        let mut complete_closed = false;
        // One skip deadline per missing head id. Re-arming on every wake
        // would let frequent later-chunk arrivals defer the skip forever.
        let mut skip_deadline: Option<(u64, tokio::time::Instant)> = None;

        loop {
            if cancel.is_cancelled() {
                self.pool.stop_all();
                return chunks_played;
            }

            if let Some(chunk) = self.buffer.try_take_next() {
                let sequence_id = chunk.sequence_id;
                let duration = chunk.duration();
                let voice = self.pool.acquire();

                if let Err(e) = voice.begin(&chunk) {
                    // Keep cadence even when the device misbehaves; silence
                    // for one chunk beats desynchronizing the sequence.
                    self.emit(SessionEvent::Warning {
                        message: format!("playback error on chunk {sequence_id}: {e}"),
                    })
                    .await;
                }
                self.emit(SessionEvent::ChunkStarted {
                    sequence_id,
                    text: chunk.text.clone(),
                    duration_ms: duration.as_millis() as u64,
                })
                .await;
                drop(chunk); // decoded buffer is single-use; the voice holds its own copy

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        self.pool.stop_all();
                        return chunks_played;
                    }
                    _ = tokio::time::sleep(duration) => {}
                }

                voice.stop();
                chunks_played += 1;
                self.emit(SessionEvent::ChunkCompleted { sequence_id }).await;
                self.buffer.advance();
                continue; // gapless: re-check before yielding
            }

            if *complete.borrow() && self.buffer.is_empty() {
                self.emit(SessionEvent::AllCompleted { chunks_played }).await;
                return chunks_played;
            }

            // Head id is not available. Wake on insert or completion; once
            // later ids sit waiting behind a hole, arm the skip deadline for
            // this head id and keep it — subsequent wakes must not push the
            // running timer back.
            let head = self.buffer.next_expected();
            let can_skip = !self.buffer.is_empty();
            if !can_skip {
                skip_deadline = None;
            } else if skip_deadline.map(|(id, _)| id) != Some(head) {
                skip_deadline =
                    Some((head, tokio::time::Instant::now() + self.missing_chunk_wait));
            }
            let deadline = skip_deadline
                .map(|(_, at)| at)
                .unwrap_or_else(tokio::time::Instant::now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.pool.stop_all();
                    return chunks_played;
                }
                _ = self.buffer.added() => {}
                changed = complete.changed(), if !complete_closed => {
                    if changed.is_err() {
                        complete_closed = true;
                    }
                }
                _ = tokio::time::sleep_until(deadline), if can_skip => {
                    self.skip_gap().await;
                    skip_deadline = None;
                }
            }
        }
    }

    /// Skips `next_expected` forward to the smallest buffered id.
    async fn skip_gap(&self) {
        let head = self.buffer.next_expected();
        if let Some(min_id) = self.buffer.min_buffered_id() {
            if min_id > head {
                tracing::warn!(
                    "chunk {head} missing for {:?}, skipping to {min_id}",
                    self.missing_chunk_wait
                );
                self.emit(SessionEvent::Warning {
                    message: format!("chunk {head} never arrived, skipping to {min_id}"),
                })
                .await;
                self.buffer.skip_to(min_id);
            }
        }
    }

    async fn emit(&self, event: SessionEvent) {
        // A caller that dropped its receiver forfeits events, not playback.
        let _ = self.events.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chunk::AudioChunk;
    use crate::audio::voice::{MockVoice, mock_pool};

    /// 10ms of 16kHz mono audio.
    fn chunk(id: u64) -> AudioChunk {
        AudioChunk::new(id, vec![0.0; 160], 16000, 1, format!("s{id}"))
    }

    struct Fixture {
        buffer: Arc<ReassemblyBuffer>,
        pool: Arc<VoicePool<MockVoice>>,
        complete_tx: watch::Sender<bool>,
        cancel: CancellationToken,
        events: mpsc::Receiver<SessionEvent>,
        task: tokio::task::JoinHandle<u64>,
    }

    fn start_scheduler(missing_wait_ms: u64) -> Fixture {
        let buffer = Arc::new(ReassemblyBuffer::new(10));
        let pool = Arc::new(mock_pool(3));
        let (event_tx, events) = mpsc::channel(64);
        let (complete_tx, complete_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        let scheduler = PlaybackScheduler::new(
            buffer.clone(),
            pool.clone(),
            event_tx,
            Duration::from_millis(missing_wait_ms),
        );
        let task = tokio::spawn(scheduler.run(cancel.clone(), complete_rx));

        Fixture {
            buffer,
            pool,
            complete_tx,
            cancel,
            events,
            task,
        }
    }

    async fn collect_until_terminal(events: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("event before timeout")
                .expect("channel open until terminal");
            let terminal = event.is_terminal();
            out.push(event);
            if terminal {
                return out;
            }
        }
    }

    fn started_ids(events: &[SessionEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::ChunkStarted { sequence_id, .. } => Some(*sequence_id),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_in_order_and_completes() {
        let mut fx = start_scheduler(2000);
        for id in [2, 1, 3] {
            fx.buffer.add(chunk(id));
        }
        fx.complete_tx.send(true).expect("send complete");

        let events = collect_until_terminal(&mut fx.events).await;
        assert_eq!(started_ids(&events), vec![1, 2, 3]);

        let completed: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::ChunkCompleted { sequence_id } => Some(*sequence_id),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec![1, 2, 3]);
        assert_eq!(
            events.last(),
            Some(&SessionEvent::AllCompleted { chunks_played: 3 })
        );
        assert_eq!(fx.task.await.expect("join"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_n_completions_before_single_all_completed() {
        let mut fx = start_scheduler(2000);
        // Completion signalled before any chunk drains: AllCompleted must
        // still wait for the last chunk's playback.
        fx.buffer.add(chunk(1));
        fx.buffer.add(chunk(2));
        fx.complete_tx.send(true).expect("send complete");

        let events = collect_until_terminal(&mut fx.events).await;
        let all_completed: Vec<&SessionEvent> = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::AllCompleted { .. }))
            .collect();
        assert_eq!(all_completed.len(), 1);
        assert_eq!(
            events.last(),
            Some(&SessionEvent::AllCompleted { chunks_played: 2 }),
            "AllCompleted comes after every ChunkCompleted"
        );
        let completions = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ChunkCompleted { .. }))
            .count();
        assert_eq!(completions, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_added_while_playing_are_picked_up() {
        let mut fx = start_scheduler(2000);
        fx.buffer.add(chunk(1));

        // First chunk starts.
        let first = tokio::time::timeout(Duration::from_secs(5), fx.events.recv())
            .await
            .expect("event")
            .expect("open");
        assert!(matches!(first, SessionEvent::ChunkStarted { sequence_id: 1, .. }));

        // Arrives mid-playback of 1.
        fx.buffer.add(chunk(2));
        fx.complete_tx.send(true).expect("send complete");

        let mut events = vec![first];
        events.extend(collect_until_terminal(&mut fx.events).await);
        assert_eq!(started_ids(&events), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_playback_stops_voices_without_completion() {
        let mut fx = start_scheduler(2000);
        fx.buffer.add(chunk(1));

        let first = tokio::time::timeout(Duration::from_secs(5), fx.events.recv())
            .await
            .expect("event")
            .expect("open");
        assert!(matches!(first, SessionEvent::ChunkStarted { .. }));

        fx.cancel.cancel();
        let played = fx.task.await.expect("join");
        assert_eq!(played, 0, "interrupted chunk does not count");

        // Channel drains without AllCompleted.
        fx.events.close();
        while let Some(event) = fx.events.recv().await {
            assert!(!matches!(event, SessionEvent::AllCompleted { .. }));
        }
        fx.pool.stop_all(); // safe to repeat after the scheduler stopped
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_head_is_skipped_after_bounded_wait() {
        let mut fx = start_scheduler(500);
        // Head id 1 never arrives.
        fx.buffer.add(chunk(2));
        fx.buffer.add(chunk(3));
        fx.complete_tx.send(true).expect("send complete");

        let events = collect_until_terminal(&mut fx.events).await;
        assert_eq!(started_ids(&events), vec![2, 3], "skips the hole, stays ordered");
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SessionEvent::Warning { message } if message.contains("chunk 1"))),
            "the skip is surfaced"
        );
        assert_eq!(
            events.last(),
            Some(&SessionEvent::AllCompleted { chunks_played: 2 }),
            "skipped ids do not count as played"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_frequent_arrivals_do_not_defer_the_skip() {
        let mut fx = start_scheduler(500);
        fx.buffer.add(chunk(2));
        let t0 = tokio::time::Instant::now();

        // Later ids keep arriving faster than the skip wait. The deadline
        // for missing chunk 1 must hold from its first arming.
        let buffer = fx.buffer.clone();
        tokio::spawn(async move {
            for id in 3..=12u64 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                buffer.add(chunk(id));
            }
        });

        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), fx.events.recv())
                .await
                .expect("event before timeout")
                .expect("channel open");
            match event {
                SessionEvent::Warning { message } => {
                    assert!(message.contains("chunk 1"));
                }
                SessionEvent::ChunkStarted { sequence_id, .. } => {
                    assert_eq!(sequence_id, 2, "playback resumes at the first buffered id");
                    break;
                }
                other => panic!("unexpected event before the skip: {other:?}"),
            }
        }
        assert!(
            t0.elapsed() < Duration::from_millis(900),
            "skip fires at the original deadline, not after arrivals stop"
        );

        fx.cancel.cancel();
        let _ = fx.task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_session_completes_with_zero() {
        let mut fx = start_scheduler(2000);
        fx.complete_tx.send(true).expect("send complete");
        let events = collect_until_terminal(&mut fx.events).await;
        assert_eq!(
            events,
            vec![SessionEvent::AllCompleted { chunks_played: 0 }]
        );
    }
}
