use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use atlas_slots::SlotTicket;
use crossbeam_channel::{Sender, unbounded};
use log::{debug, error};
use thiserror::Error;

use crate::ThumbnailKey;
use crate::cache::CacheShared;
use crate::decode::{DecodeError, ThumbnailDecoder};
use crate::source::ThumbnailSource;
use crate::upload::UploadItem;

pub type DecodeJob = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("decode executor is no longer accepting jobs")]
pub struct ExecutorClosed;

/// Runs decode jobs somewhere other than the calling thread.
pub trait DecodeExecutor: Send + Sync {
    fn execute(&self, job: DecodeJob) -> Result<(), ExecutorClosed>;
}

/// Fixed set of named worker threads fed through one job channel.
///
/// Dropping the pool lets queued jobs finish, then joins every worker.
pub struct DecodeWorkerPool {
    sender: Option<Sender<DecodeJob>>,
    workers: Vec<JoinHandle<()>>,
}

impl DecodeWorkerPool {
    pub fn new(worker_count: usize) -> std::io::Result<Self> {
        let (sender, receiver) = unbounded::<DecodeJob>();
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let receiver = receiver.clone();
            let worker = std::thread::Builder::new()
                .name(format!("thumbnail-decode-{index}"))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                })?;
            workers.push(worker);
        }
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl DecodeExecutor for DecodeWorkerPool {
    fn execute(&self, job: DecodeJob) -> Result<(), ExecutorClosed> {
        let Some(sender) = &self.sender else {
            return Err(ExecutorClosed);
        };
        sender.send(job).map_err(|_| ExecutorClosed)
    }
}

impl Drop for DecodeWorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("thumbnail decode worker panicked");
            }
        }
    }
}

/// One outstanding decode: what to read and which slot claim it feeds.
#[derive(Debug, Clone)]
pub struct PendingDecode<K> {
    pub key: K,
    pub path: PathBuf,
    pub ticket: SlotTicket,
}

pub(crate) struct DecodePipeline<K> {
    shared: Arc<CacheShared<K>>,
    source: Arc<dyn ThumbnailSource<K>>,
    decoder: Arc<dyn ThumbnailDecoder>,
    executor: Arc<dyn DecodeExecutor>,
}

impl<K: ThumbnailKey> DecodePipeline<K> {
    pub(crate) fn new(
        shared: Arc<CacheShared<K>>,
        source: Arc<dyn ThumbnailSource<K>>,
        decoder: Arc<dyn ThumbnailDecoder>,
        executor: Arc<dyn DecodeExecutor>,
    ) -> Self {
        Self {
            shared,
            source,
            decoder,
            executor,
        }
    }

    pub(crate) fn source(&self) -> &dyn ThumbnailSource<K> {
        self.source.as_ref()
    }

    pub(crate) fn request_load(&self, request: PendingDecode<K>) -> Result<(), ExecutorClosed> {
        debug!(
            "dispatching thumbnail decode for {:?} into {}",
            request.key, request.ticket
        );
        let shared = Arc::clone(&self.shared);
        let source = Arc::clone(&self.source);
        let decoder = Arc::clone(&self.decoder);
        self.executor.execute(Box::new(move || {
            run_decode(&shared, source.as_ref(), decoder.as_ref(), request);
        }))
    }
}

/// Body of a decode job. Never touches the atlas; the result leaves through
/// the upload queue or, on failure, by releasing the claim.
pub(crate) fn run_decode<K: ThumbnailKey>(
    shared: &CacheShared<K>,
    source: &dyn ThumbnailSource<K>,
    decoder: &dyn ThumbnailDecoder,
    request: PendingDecode<K>,
) {
    let PendingDecode { key, path, ticket } = request;
    let result = if source.exists(&path) {
        decoder.decode(&path)
    } else {
        Err(DecodeError::Missing(path))
    };

    match result {
        Ok(image) => shared.uploads.enqueue(UploadItem { key, image, ticket }),
        Err(decode_error) => {
            error!("thumbnail load failed for {key:?}: {decode_error}");
            if !shared.lock_table().release(&key, ticket) {
                debug!("{key:?} no longer holds {ticket}; nothing to release");
            }
        }
    }
}
