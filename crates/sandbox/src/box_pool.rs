//! Bounded pool of `isolate` box identifiers.
//!
//! Replaces the source's "3 hex chars mod 1000" allocator with a fixed-size
//! free list guarded by a semaphore: acquiring an id can never collide with
//! one already in use, and a full pool makes callers wait instead of racing
//! `isolate --init` against another box holding the same id.

use std::collections::VecDeque;
use std::process::Command;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct Inner {
    free: Mutex<VecDeque<u32>>,
}

/// Pool of box ids in `0..capacity`, handed out one at a time.
#[derive(Clone)]
pub struct BoxPool {
    inner: Arc<Inner>,
    semaphore: Arc<Semaphore>,
}

impl BoxPool {
    pub fn new(capacity: u32) -> Self {
        let free = (0..capacity).collect::<VecDeque<_>>();
        Self {
            inner: Arc::new(Inner {
                free: Mutex::new(free),
            }),
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
        }
    }

    /// Acquire a box id, waiting if the pool is fully checked out.
    pub async fn acquire(&self) -> BoxHandle {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("box pool semaphore is never closed");
        let id = self
            .inner
            .free
            .lock()
            .expect("box pool free-list lock poisoned")
            .pop_front()
            .expect("semaphore permit count matches free-list length");
        BoxHandle {
            id,
            free: self.inner.clone(),
            _permit: permit,
            cleaned_up: false,
        }
    }
}

/// Owns one box id for its lifetime. `isolate --cleanup` runs unconditionally
/// on drop, mirroring the reference `IsolateRunner::drop` guarantee, so a
/// panic or early return can never leak a box.
pub struct BoxHandle {
    id: u32,
    free: Arc<Inner>,
    _permit: OwnedSemaphorePermit,
    cleaned_up: bool,
}

impl BoxHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Record that cleanup already ran through the active sandbox backend,
    /// so the drop-guard backstop below does not redundantly invoke the
    /// real `isolate` binary.
    pub fn mark_cleaned(&mut self) {
        self.cleaned_up = true;
    }
}

impl Drop for BoxHandle {
    fn drop(&mut self) {
        if !self.cleaned_up {
            let id = self.id.to_string();
            let out = Command::new("isolate").args(["-b", &id, "--cg", "--cleanup"]).output();
            match out {
                Ok(o) if o.status.success() => {
                    tracing::debug!(box_id = self.id, "box cleaned up on drop");
                }
                Ok(o) => {
                    tracing::warn!(
                        box_id = self.id,
                        stderr = %String::from_utf8_lossy(&o.stderr),
                        "isolate --cleanup exited non-zero on drop"
                    );
                }
                Err(e) => {
                    tracing::warn!(box_id = self.id, error = %e, "failed to spawn isolate --cleanup on drop");
                }
            }
        }

        self.free.free.lock().expect("box pool free-list lock poisoned").push_back(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_blocks_past_capacity_until_release() {
        let pool = BoxPool::new(1);
        let first = pool.acquire().await;
        assert_eq!(first.id(), 0);

        let pool2 = pool.clone();
        let acquired_second = tokio::spawn(async move { pool2.acquire().await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!acquired_second.is_finished());

        drop(first);
        let second = acquired_second.await.unwrap();
        assert_eq!(second.id(), 0);
    }
}
