use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::task::{TaskId, TaskRecord, TaskStatus};

/// Registro en memoria de tareas, compartido entre las consultas de estado
/// y la ejecución en segundo plano. Clonar comparte el mismo mapa.
///
/// Cada mutación toca un único registro bajo el lock de escritura, así que
/// una transición nunca afecta a otras tareas.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Arc<RwLock<HashMap<TaskId, TaskRecord>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TaskId, TaskRecord>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TaskId, TaskRecord>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserta un registro nuevo. Devuelve false si el id ya existía.
    pub fn insert(&self, record: TaskRecord) -> bool {
        let mut tasks = self.write();
        if tasks.contains_key(&record.task_id) {
            return false;
        }
        tasks.insert(record.task_id.clone(), record);
        true
    }

    pub fn get(&self, id: &str) -> Option<TaskRecord> {
        self.read().get(id).cloned()
    }

    /// Aplica `f` al registro `id`. `None` si la tarea ya no existe
    /// (por ejemplo, se limpió mientras se ejecutaba).
    pub fn update<T>(&self, id: &str, f: impl FnOnce(&mut TaskRecord) -> T) -> Option<T> {
        self.write().get_mut(id).map(f)
    }

    pub fn remove(&self, id: &str) -> Option<TaskRecord> {
        self.write().remove(id)
    }

    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.read()
            .values()
            .filter(|r| r.status() == status)
            .count()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
