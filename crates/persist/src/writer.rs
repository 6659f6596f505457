use buildworld_kernel::{SpawnPoint, WorldRecord};
use crossbeam_channel::{Receiver, Sender};
use std::thread::JoinHandle;

use crate::store::{PersistError, RecordStore};

enum Job {
    Save(Box<WorldRecord>),
    Delete(String),
    SaveSpawn(Option<SpawnPoint>),
    Flush(Sender<()>),
}

/// Background writer owning a [`RecordStore`].
///
/// Jobs are applied strictly in submission order. Failures are logged and
/// never reported back to the submitter.
pub struct PersistWriter {
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl PersistWriter {
    pub fn spawn(store: Box<dyn RecordStore>) -> Result<Self, PersistError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = std::thread::Builder::new()
            .name("buildworld-persist".into())
            .spawn(move || run(store, rx))?;
        Ok(Self {
            jobs: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn save(&self, record: &WorldRecord) {
        self.submit(Job::Save(Box::new(record.clone())));
    }

    pub fn delete(&self, name: &str) {
        self.submit(Job::Delete(name.to_string()));
    }

    pub fn save_spawn(&self, spawn: Option<&SpawnPoint>) {
        self.submit(Job::SaveSpawn(spawn.cloned()));
    }

    /// Block until every job submitted so far has been applied.
    pub fn flush(&self) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.submit(Job::Flush(tx));
        if rx.recv().is_err() {
            tracing::warn!("persistence writer exited before flush completed");
        }
    }

    fn submit(&self, job: Job) {
        let Some(jobs) = &self.jobs else {
            return;
        };
        if jobs.send(job).is_err() {
            tracing::warn!("persistence writer is gone; change dropped");
        }
    }
}

impl Drop for PersistWriter {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop after the backlog drains.
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("persistence writer panicked");
            }
        }
    }
}

fn run(mut store: Box<dyn RecordStore>, jobs: Receiver<Job>) {
    for job in jobs {
        match job {
            Job::Save(record) => {
                if let Err(e) = store.save(&record) {
                    tracing::warn!(world = record.name(), error = %e, "failed to save world record");
                }
            }
            Job::Delete(name) => {
                if let Err(e) = store.delete(&name) {
                    tracing::warn!(world = %name, error = %e, "failed to delete world record");
                }
            }
            Job::SaveSpawn(spawn) => {
                if let Err(e) = store.save_spawn(spawn.as_ref()) {
                    tracing::warn!(error = %e, "failed to save spawn point");
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("persistence writer stopped");
}
