use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::BackupError;

pub enum WorkerMessage<R> {
    Event(ProgressEvent),
    Finished(Result<R, BackupError>),
}

struct ChannelSink<R> {
    tx: Sender<WorkerMessage<R>>,
}

impl<R: Send> ProgressSink for ChannelSink<R> {
    fn event(&self, event: ProgressEvent) {
        // The receiver may already be gone when the surface quit early.
        let _ = self.tx.send(WorkerMessage::Event(event));
    }
}

/// Runs one backup on a dedicated thread. Progress and the final result arrive
/// as messages; the worker never touches presentation state.
pub struct Worker<R> {
    rx: Receiver<WorkerMessage<R>>,
    handle: Option<JoinHandle<()>>,
}

impl<R: Send + 'static> Worker<R> {
    pub fn spawn<F>(f: F) -> Self
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, BackupError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let sink = ChannelSink { tx: tx.clone() };
            let result = f(&sink);
            let _ = tx.send(WorkerMessage::Finished(result));
        });
        Self {
            rx,
            handle: Some(handle),
        }
    }

    pub fn try_recv(&self) -> Option<WorkerMessage<R>> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(WorkerMessage::Finished(Err(disconnected()))),
        }
    }

    /// Forwards events to `sink` on the calling thread until the run finishes.
    pub fn wait(mut self, sink: &dyn ProgressSink) -> Result<R, BackupError> {
        loop {
            match self.rx.recv() {
                Ok(WorkerMessage::Event(event)) => sink.event(event),
                Ok(WorkerMessage::Finished(result)) => {
                    self.join();
                    return result;
                }
                Err(_) => {
                    self.join();
                    return Err(disconnected());
                }
            }
        }
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("backup worker panicked");
            }
        }
    }
}

fn disconnected() -> BackupError {
    BackupError::Transfer("backup worker stopped without a result".to_string())
}
