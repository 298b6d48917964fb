//! The set of configured syncs, in creation order.
//!
//! Task operations hold the read lock for their whole duration and `delete`
//! holds the write lock while it stops the task, so nobody can observe or
//! restart a sync that is halfway through being deleted.

use std::sync::Arc;

use tokio::sync::RwLock;

use leadable_core::{Frequency, SyncName, SyncSpec};
use leadable_sync::{RecordSource, SheetStore};

use crate::error::EngineError;
use crate::status::StatusSink;
use crate::task::{Collaborators, EngineTiming, SyncSnapshot, SyncTask};

pub struct SyncRegistry {
    tasks: RwLock<Vec<Arc<SyncTask>>>,
    deps: Collaborators,
}

impl SyncRegistry {
    pub fn new(
        source: Arc<dyn RecordSource>,
        store: Arc<dyn SheetStore>,
        sink: StatusSink,
        timing: EngineTiming,
    ) -> Self {
        Self {
            tasks: RwLock::new(Vec::new()),
            deps: Collaborators {
                source,
                store,
                sink,
                timing,
            },
        }
    }

    pub fn sink(&self) -> &StatusSink {
        &self.deps.sink
    }

    /// Validate and register a sync. It starts idle.
    ///
    /// A missing name becomes `Sync_<n>`, counting from the current size.
    pub async fn create(&self, spec: SyncSpec) -> Result<SyncSnapshot, EngineError> {
        let valid = spec.validate()?;
        let mut tasks = self.tasks.write().await;

        let name = match valid.name.clone() {
            Some(name) => {
                if tasks.iter().any(|t| t.name() == &name) {
                    return Err(leadable_core::ValidationError::DuplicateName(name.0).into());
                }
                name
            }
            None => generate_name(&tasks),
        };

        let frequency = valid.frequency;
        let task = Arc::new(SyncTask::new(
            valid.into_settings(name),
            frequency,
            self.deps.clone(),
        ));
        tracing::info!(sync = %task.name(), minutes = frequency.minutes(), "sync created");
        let snapshot = task.snapshot();
        tasks.push(task);
        Ok(snapshot)
    }

    pub async fn list(&self) -> Vec<SyncSnapshot> {
        self.tasks.read().await.iter().map(|t| t.snapshot()).collect()
    }

    pub async fn get(&self, name: &SyncName) -> Result<SyncSnapshot, EngineError> {
        let tasks = self.tasks.read().await;
        Ok(find(&tasks, name)?.snapshot())
    }

    pub async fn start(&self, name: &SyncName) -> Result<SyncSnapshot, EngineError> {
        let tasks = self.tasks.read().await;
        let task = find(&tasks, name)?;
        task.start().await;
        Ok(task.snapshot())
    }

    pub async fn stop(&self, name: &SyncName) -> Result<SyncSnapshot, EngineError> {
        let tasks = self.tasks.read().await;
        let task = find(&tasks, name)?;
        task.stop().await;
        Ok(task.snapshot())
    }

    pub async fn set_frequency(
        &self,
        name: &SyncName,
        frequency: Frequency,
    ) -> Result<SyncSnapshot, EngineError> {
        let tasks = self.tasks.read().await;
        let task = find(&tasks, name)?;
        task.set_frequency(frequency);
        Ok(task.snapshot())
    }

    /// Stop the sync and remove it, atomically with respect to every other
    /// registry operation.
    pub async fn delete(&self, name: &SyncName) -> Result<(), EngineError> {
        let mut tasks = self.tasks.write().await;
        let index = tasks
            .iter()
            .position(|t| t.name() == name)
            .ok_or_else(|| not_found(name))?;
        tasks[index].stop().await;
        tasks.remove(index);
        tracing::info!(sync = %name, "sync deleted");
        Ok(())
    }

    /// Stop every running sync; used on daemon shutdown.
    pub async fn stop_all(&self) {
        let tasks = self.tasks.read().await;
        for task in tasks.iter() {
            task.stop().await;
        }
    }

    pub async fn running_count(&self) -> usize {
        self.tasks
            .read()
            .await
            .iter()
            .filter(|t| t.is_running())
            .count()
    }
}

fn find<'a>(tasks: &'a [Arc<SyncTask>], name: &SyncName) -> Result<&'a SyncTask, EngineError> {
    tasks
        .iter()
        .find(|t| t.name() == name)
        .map(Arc::as_ref)
        .ok_or_else(|| not_found(name))
}

fn not_found(name: &SyncName) -> EngineError {
    EngineError::NotFound {
        name: name.0.clone(),
    }
}

fn generate_name(tasks: &[Arc<SyncTask>]) -> SyncName {
    let mut n = tasks.len() + 1;
    loop {
        let candidate = SyncName(format!("Sync_{n}"));
        if !tasks.iter().any(|t| t.name() == &candidate) {
            return candidate;
        }
        n += 1;
    }
}
