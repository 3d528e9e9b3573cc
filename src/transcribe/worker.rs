//! Dedicated transcription task and its message protocol

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, oneshot, watch};

use crate::{Error, Result};

use super::SpeechEngine;

/// Depth of the command channel; the single-slot guard keeps it near-empty
const COMMAND_DEPTH: usize = 4;

/// Observable worker lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Worker spawned, engine not yet loaded
    Idle,
    /// Engine load in progress
    Loading {
        /// Human-readable progress message
        message: String,
    },
    /// Engine loaded, accepting transcription requests
    Ready,
    /// Engine load failed; the ready gate stays closed
    Failed {
        /// Failure reason
        message: String,
    },
}

/// Commands crossing the worker boundary; each carries its reply slot
enum Command {
    Init {
        reply: oneshot::Sender<Result<()>>,
    },
    Transcribe {
        samples: Vec<f32>,
        reply: oneshot::Sender<Result<String>>,
    },
}

/// Handle to the transcription worker
///
/// Cloneable; all clones share the single-slot guard, so at most one
/// transcription request is in flight at a time.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<WorkerStatus>,
    slot: Arc<Semaphore>,
}

impl WorkerHandle {
    /// Whether the engine has loaded
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(*self.status_rx.borrow(), WorkerStatus::Ready)
    }

    /// Current worker status
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch handle for status changes (load progress display)
    #[must_use]
    pub fn status_watch(&self) -> watch::Receiver<WorkerStatus> {
        self.status_rx.clone()
    }

    /// Initialize the engine. Idempotent: resolves immediately when the
    /// worker is already ready.
    ///
    /// # Errors
    ///
    /// Returns `Error::ModelLoad` if the engine fails to load or the worker
    /// has terminated
    pub async fn init(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Init { reply })
            .await
            .map_err(|_| Error::ModelLoad("transcription worker terminated".to_string()))?;

        rx.await
            .map_err(|_| Error::ModelLoad("transcription worker dropped the request".to_string()))?
    }

    /// Transcribe a mono 16 kHz buffer.
    ///
    /// Rejects a second concurrent request rather than racing; the caller
    /// is expected to await the prior result first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transcription` when not initialized, busy, or the
    /// engine faults; `Error::EmptyAudio` for a zero-length buffer
    pub async fn transcribe(&self, samples: Vec<f32>) -> Result<String> {
        let _permit = self.slot.try_acquire().map_err(|_| {
            Error::Transcription("a transcription request is already in flight".to_string())
        })?;

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Transcribe { samples, reply })
            .await
            .map_err(|_| Error::Transcription("transcription worker terminated".to_string()))?;

        rx.await
            .map_err(|_| Error::Transcription("transcription worker dropped the request".to_string()))?
    }
}

/// Spawn the transcription worker task owning the given engine
#[must_use]
pub fn spawn(engine: Arc<dyn SpeechEngine>) -> WorkerHandle {
    let (tx, rx) = mpsc::channel(COMMAND_DEPTH);
    let (status_tx, status_rx) = watch::channel(WorkerStatus::Idle);

    tokio::spawn(run_worker(engine, rx, status_tx));

    WorkerHandle {
        tx,
        status_rx,
        slot: Arc::new(Semaphore::new(1)),
    }
}

/// Worker loop: owns the engine, serves commands until all handles drop
async fn run_worker(
    engine: Arc<dyn SpeechEngine>,
    mut rx: mpsc::Receiver<Command>,
    status_tx: watch::Sender<WorkerStatus>,
) {
    let mut initialized = false;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Init { reply } => {
                if initialized {
                    let _ = reply.send(Ok(()));
                    continue;
                }

                let _ = status_tx.send(WorkerStatus::Loading {
                    message: "loading transcription engine".to_string(),
                });

                match engine.load().await {
                    Ok(()) => {
                        initialized = true;
                        let _ = status_tx.send(WorkerStatus::Ready);
                        tracing::info!("transcription engine ready");
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        let message = e.to_string();
                        tracing::error!(error = %message, "transcription engine failed to load");
                        let _ = status_tx.send(WorkerStatus::Failed {
                            message: message.clone(),
                        });
                        let _ = reply.send(Err(Error::ModelLoad(message)));
                    }
                }
            }
            Command::Transcribe { samples, reply } => {
                if !initialized {
                    let _ = reply.send(Err(Error::Transcription(
                        "engine not initialized".to_string(),
                    )));
                    continue;
                }
                if samples.is_empty() {
                    let _ = reply.send(Err(Error::EmptyAudio(
                        "zero-length sample buffer".to_string(),
                    )));
                    continue;
                }

                // Run the engine call in its own task so a panic becomes an
                // error reply instead of killing the worker loop
                let task_engine = Arc::clone(&engine);
                let join =
                    tokio::spawn(async move { task_engine.transcribe(&samples).await });

                let result = match join.await {
                    Ok(Ok(text)) => Ok(text.trim().to_string()),
                    Ok(Err(e)) => Err(e),
                    Err(e) if e.is_panic() => {
                        tracing::error!("transcription task panicked");
                        Err(Error::Transcription("transcription task panicked".to_string()))
                    }
                    Err(e) => Err(Error::Transcription(e.to_string())),
                };

                let _ = reply.send(result);
            }
        }
    }

    tracing::debug!("transcription worker shut down");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    /// Engine whose behavior is scripted per test
    struct StubEngine {
        load_result: Option<String>,
        transcript: String,
        delay: Duration,
        loads: AtomicUsize,
        panics: bool,
    }

    impl StubEngine {
        fn ok(transcript: &str) -> Self {
            Self {
                load_result: None,
                transcript: transcript.to_string(),
                delay: Duration::ZERO,
                loads: AtomicUsize::new(0),
                panics: false,
            }
        }
    }

    #[async_trait]
    impl SpeechEngine for StubEngine {
        async fn load(&self) -> Result<()> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            match &self.load_result {
                None => Ok(()),
                Some(message) => Err(Error::ModelLoad(message.clone())),
            }
        }

        async fn transcribe(&self, _samples: &[f32]) -> Result<String> {
            assert!(!self.panics, "scripted engine panic");
            tokio::time::sleep(self.delay).await;
            Ok(self.transcript.clone())
        }
    }

    #[tokio::test]
    async fn init_then_transcribe() {
        let handle = spawn(Arc::new(StubEngine::ok("  hello there  ")));
        assert_eq!(handle.status(), WorkerStatus::Idle);

        handle.init().await.unwrap();
        assert!(handle.is_ready());

        let text = handle.transcribe(vec![0.5; 1600]).await.unwrap();
        assert_eq!(text, "hello there");
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let engine = Arc::new(StubEngine::ok("hi"));
        let handle = spawn(Arc::clone(&engine) as Arc<dyn SpeechEngine>);

        handle.init().await.unwrap();
        handle.init().await.unwrap();
        handle.init().await.unwrap();

        assert_eq!(engine.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn load_failure_closes_the_gate() {
        let handle = spawn(Arc::new(StubEngine {
            load_result: Some("model fetch failed".to_string()),
            ..StubEngine::ok("")
        }));

        let err = handle.init().await.unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
        assert!(!handle.is_ready());
        assert!(matches!(handle.status(), WorkerStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn transcribe_before_init_fails_fast() {
        let handle = spawn(Arc::new(StubEngine::ok("hi")));

        let err = handle.transcribe(vec![0.5; 100]).await.unwrap_err();
        assert!(matches!(err, Error::Transcription(_)));
    }

    #[tokio::test]
    async fn empty_buffer_is_rejected() {
        let handle = spawn(Arc::new(StubEngine::ok("hi")));
        handle.init().await.unwrap();

        let err = handle.transcribe(Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::EmptyAudio(_)));
    }

    #[tokio::test]
    async fn second_concurrent_request_is_rejected() {
        let handle = spawn(Arc::new(StubEngine {
            delay: Duration::from_millis(200),
            ..StubEngine::ok("slow")
        }));
        handle.init().await.unwrap();

        let busy = handle.clone();
        let first = tokio::spawn(async move { busy.transcribe(vec![0.5; 100]).await });

        // Give the first request time to occupy the slot
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = handle.transcribe(vec![0.5; 100]).await.unwrap_err();
        assert!(matches!(err, Error::Transcription(_)));

        let text = first.await.unwrap().unwrap();
        assert_eq!(text, "slow");
    }

    #[tokio::test]
    async fn engine_panic_becomes_error_reply() {
        let handle = spawn(Arc::new(StubEngine {
            panics: true,
            ..StubEngine::ok("")
        }));
        handle.init().await.unwrap();

        let err = handle.transcribe(vec![0.5; 100]).await.unwrap_err();
        assert!(matches!(err, Error::Transcription(_)));

        // The worker survives and serves later requests
        assert!(handle.is_ready());
    }
}
