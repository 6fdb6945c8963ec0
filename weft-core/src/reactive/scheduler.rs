//! Job Scheduler
//!
//! Batches effect re-runs so that any number of synchronous triggers of the
//! same effect collapse into a single execution at the next cooperative
//! yield point.
//!
//! There is no host microtask queue here, so the yield point is explicit:
//! callers invoke [`Runtime::flush_jobs`] once the current synchronous turn
//! is done. The flush drains the queue in insertion order and is atomic with
//! respect to the code that enqueued it; jobs queued while the flush runs
//! are drained by the same call.

use std::rc::Rc;

use tracing::trace;

use super::effect::Effect;
use super::runtime::{JobFn, Runtime};

impl Runtime {
    /// Queue a job keyed by identity. A job already pending under the same
    /// id is left in place, keeping its original position.
    pub(crate) fn queue_job(&self, id: u64, job: JobFn) {
        self.inner.queue.borrow_mut().entry(id).or_insert(job);
    }

    /// Queue an effect re-run, deduplicated by the effect's id. Intended as
    /// the body of a batching scheduler:
    ///
    /// ```ignore
    /// let options = EffectOptions {
    ///     scheduler: Some(Rc::new(|rt, fx| rt.queue_effect(fx))),
    ///     ..Default::default()
    /// };
    /// ```
    pub fn queue_effect(&self, effect: &Effect) {
        let raw = Rc::clone(effect.raw());
        let id = raw.id().raw();
        self.queue_job(id, Rc::new(move |rt: &Runtime| {
            raw.run(rt);
        }));
    }

    /// Number of jobs currently pending.
    pub fn pending_jobs(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Drain the pending set in insertion order. Reentrant calls while a
    /// flush is already draining return immediately; the outer flush picks
    /// up anything queued in the meantime.
    pub fn flush_jobs(&self) {
        if self.inner.flushing.replace(true) {
            return;
        }
        // A panicking job aborts the rest of the batch; the flag still has
        // to clear so a later flush can drain what remains.
        struct ResetFlushing(Rc<crate::reactive::runtime::RuntimeInner>);
        impl Drop for ResetFlushing {
            fn drop(&mut self) {
                self.0.flushing.set(false);
            }
        }
        let _reset = ResetFlushing(Rc::clone(&self.inner));

        trace!(pending = self.pending_jobs(), "flush");
        loop {
            let next = {
                let mut queue = self.inner.queue.borrow_mut();
                queue.shift_remove_index(0).map(|(_, job)| job)
            };
            let Some(job) = next else {
                break;
            };
            job(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn duplicate_jobs_collapse_into_one_run() {
        let rt = Runtime::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let log_in = Rc::clone(&log);
        let job: JobFn = Rc::new(move |_| log_in.borrow_mut().push("a"));
        rt.queue_job(1, Rc::clone(&job));
        rt.queue_job(1, Rc::clone(&job));
        rt.queue_job(1, job);

        assert_eq!(rt.pending_jobs(), 1);
        rt.flush_jobs();
        assert_eq!(*log.borrow(), vec!["a"]);
        assert_eq!(rt.pending_jobs(), 0);
    }

    #[test]
    fn flush_runs_jobs_in_insertion_order() {
        let rt = Runtime::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for (id, name) in [(1u64, "a"), (2, "b"), (3, "c")] {
            let log_in = Rc::clone(&log);
            rt.queue_job(id, Rc::new(move |_| log_in.borrow_mut().push(name)));
        }
        // Re-queueing an earlier id must not move it to the back.
        rt.queue_job(1, Rc::new(|_| {}));

        rt.flush_jobs();
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn jobs_queued_during_flush_run_in_the_same_flush() {
        let rt = Runtime::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let log_a = Rc::clone(&log);
        let rt_a = rt.clone();
        rt.queue_job(
            1,
            Rc::new(move |_: &Runtime| {
                log_a.borrow_mut().push("a");
                let log_b = Rc::clone(&log_a);
                rt_a.queue_job(2, Rc::new(move |_| log_b.borrow_mut().push("b")));
            }),
        );

        rt.flush_jobs();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn reentrant_flush_is_a_noop() {
        let rt = Runtime::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let log_in = Rc::clone(&log);
        let rt_in = rt.clone();
        rt.queue_job(
            1,
            Rc::new(move |_: &Runtime| {
                log_in.borrow_mut().push("once");
                // A flush from inside a job must not re-enter the drain loop.
                rt_in.flush_jobs();
            }),
        );

        rt.flush_jobs();
        assert_eq!(*log.borrow(), vec!["once"]);
    }
}
