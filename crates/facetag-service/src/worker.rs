use facetag_core::{
    Classification, EngineError, FaceEngine, GroupClassification, RecognizeError, Recognizer, RowId,
};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Recognize(#[from] RecognizeError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from async callers to the engine thread.
enum Request {
    Enroll {
        path: PathBuf,
        identity: String,
        reply: oneshot::Sender<Result<RowId, RecognizeError>>,
    },
    Classify {
        path: PathBuf,
        reply: oneshot::Sender<Result<Classification, RecognizeError>>,
    },
    ClassifyMultiples {
        path: PathBuf,
        reply: oneshot::Sender<Result<GroupClassification, RecognizeError>>,
    },
    SaveDataset {
        path: PathBuf,
        reply: oneshot::Sender<Result<(), RecognizeError>>,
    },
    LoadDataset {
        path: PathBuf,
        reply: oneshot::Sender<Result<usize, RecognizeError>>,
    },
    GalleryLen {
        reply: oneshot::Sender<usize>,
    },
}

/// Clone-safe handle to the engine thread.
///
/// Requests run one at a time on the thread that owns the recognizer, so a
/// gallery mutation and its index rebuild are never observed half done.
/// The engine is released once every handle is dropped and the queue drains.
#[derive(Clone)]
pub struct RecognizerHandle {
    tx: mpsc::Sender<Request>,
}

impl RecognizerHandle {
    /// Enroll the single face on `path` under `identity`.
    pub async fn enroll(
        &self,
        path: impl Into<PathBuf>,
        identity: impl Into<String>,
    ) -> Result<RowId, ServiceError> {
        let (path, identity) = (path.into(), identity.into());
        Ok(self
            .call(|reply| Request::Enroll {
                path,
                identity,
                reply,
            })
            .await??)
    }

    /// Classify the single face on `path`.
    pub async fn classify(&self, path: impl Into<PathBuf>) -> Result<Classification, ServiceError> {
        let path = path.into();
        Ok(self.call(|reply| Request::Classify { path, reply }).await??)
    }

    /// Classify every face on `path`, dropping the ones that match nobody.
    pub async fn classify_multiples(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<GroupClassification, ServiceError> {
        let path = path.into();
        Ok(self
            .call(|reply| Request::ClassifyMultiples { path, reply })
            .await??)
    }

    pub async fn save_dataset(&self, path: impl Into<PathBuf>) -> Result<(), ServiceError> {
        let path = path.into();
        Ok(self.call(|reply| Request::SaveDataset { path, reply }).await??)
    }

    /// Append the records in `path` to the gallery (merge, not replace).
    pub async fn load_dataset(&self, path: impl Into<PathBuf>) -> Result<usize, ServiceError> {
        let path = path.into();
        Ok(self.call(|reply| Request::LoadDataset { path, reply }).await??)
    }

    pub async fn gallery_len(&self) -> Result<usize, ServiceError> {
        self.call(|reply| Request::GalleryLen { reply }).await
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(request(reply_tx))
            .await
            .map_err(|_| ServiceError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ServiceError::ChannelClosed)
    }
}

/// Move `recognizer` onto a dedicated OS thread and return a handle to it.
pub fn spawn_recognizer<E>(
    recognizer: Recognizer<E>,
    queue_depth: usize,
) -> Result<RecognizerHandle, ServiceError>
where
    E: FaceEngine + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Request>(queue_depth.max(1));
    let mut recognizer = recognizer;

    std::thread::Builder::new()
        .name("facetag-engine".into())
        .spawn(move || {
            tracing::info!(samples = recognizer.gallery().len(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                handle(&mut recognizer, req);
            }
            drop(recognizer);
            tracing::info!("engine thread exiting, engine released");
        })
        .map_err(ServiceError::Spawn)?;

    Ok(RecognizerHandle { tx })
}

/// Run one request. A caller that went away just loses its reply.
fn handle<E: FaceEngine>(recognizer: &mut Recognizer<E>, req: Request) {
    match req {
        Request::Enroll {
            path,
            identity,
            reply,
        } => {
            let _ = reply.send(recognizer.enroll(&path, &identity));
        }
        Request::Classify { path, reply } => {
            let _ = reply.send(recognizer.classify(&path));
        }
        Request::ClassifyMultiples { path, reply } => {
            let _ = reply.send(recognizer.classify_multiples(&path));
        }
        Request::SaveDataset { path, reply } => {
            let _ = reply.send(recognizer.save_dataset(&path));
        }
        Request::LoadDataset { path, reply } => {
            let _ = reply.send(recognizer.load_dataset(&path));
        }
        Request::GalleryLen { reply } => {
            let _ = reply.send(recognizer.gallery().len());
        }
    }
}
