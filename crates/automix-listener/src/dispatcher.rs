use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, trace, warn};

/// Unit of work executed on the owning thread
pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("owning thread task queue is closed")]
    QueueClosed,
}

/// How `run_on_owning_thread` handled a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Ran synchronously on the calling (owning) thread
    Inline,
    /// Queued for the owning thread
    Queued,
    /// The queue was closed; the task was dropped without running
    Dropped,
}

/// Sends work to the single thread allowed to call into the script environment.
///
/// Cheap to clone; every clone targets the same queue.
#[derive(Clone)]
pub struct Dispatcher {
    tx: UnboundedSender<Task>,
    owner: ThreadId,
}

impl Dispatcher {
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn is_owning_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Queue `task` for the owning thread without running it inline
    pub fn submit<F>(&self, task: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Box::new(task))
            .map_err(|_| DispatchError::QueueClosed)
    }

    /// Run `task` now if called on the owning thread, otherwise queue it and return at once.
    ///
    /// Queued tasks run in the order their submissions were accepted. The caller gets no
    /// completion signal.
    pub fn run_on_owning_thread<F>(&self, task: F) -> Dispatch
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_owning_thread() {
            run_guarded(Box::new(task));
            return Dispatch::Inline;
        }

        match self.submit(task) {
            Ok(()) => Dispatch::Queued,
            Err(e) => {
                warn!(target: "automix", "Dropping task for owning thread: {}", e);
                Dispatch::Dropped
            }
        }
    }
}

/// Receiving end of the owning thread's queue
pub struct TaskQueue {
    rx: UnboundedReceiver<Task>,
    owner: ThreadId,
}

impl TaskQueue {
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Run every task queued so far and return how many ran.
    ///
    /// Intended to be called from the owning thread's frame loop.
    pub fn pump(&mut self) -> usize {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "task queue pumped off its owning thread"
        );

        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            run_guarded(task);
            ran += 1;
        }
        if ran > 0 {
            trace!(target: "automix", "Pumped {} owning-thread task(s)", ran);
        }
        ran
    }

    /// Block running tasks until every `Dispatcher` has been dropped
    pub fn run(mut self) {
        while let Some(task) = self.rx.blocking_recv() {
            run_guarded(task);
        }
    }

    /// Refuse further submissions. Tasks already queued can still be pumped.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Create a queue owned by the calling thread
pub fn owning_thread_queue() -> (Dispatcher, TaskQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    let owner = thread::current().id();
    (Dispatcher { tx, owner }, TaskQueue { rx, owner })
}

/// Spawn a dedicated owning thread that runs queued tasks until every dispatcher is dropped
pub fn spawn_owning_thread(name: &str) -> std::io::Result<(Dispatcher, JoinHandle<()>)> {
    let (tx, rx) = mpsc::unbounded_channel::<Task>();
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let queue = TaskQueue {
                rx,
                owner: thread::current().id(),
            };
            queue.run();
        })?;
    let owner = handle.thread().id();
    Ok((Dispatcher { tx, owner }, handle))
}

fn run_guarded(task: Task) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
        error!(
            target: "automix",
            "Owning-thread task panicked: {}",
            panic_message(panic.as_ref())
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_owning_thread_runs_inline() {
        let (dispatcher, mut queue) = owning_thread_queue();
        let ran = Arc::new(Mutex::new(false));

        let flag = ran.clone();
        let dispatch = dispatcher.run_on_owning_thread(move || *flag.lock() = true);

        assert_eq!(dispatch, Dispatch::Inline);
        assert!(*ran.lock());
        assert_eq!(queue.pump(), 0);
    }

    #[test]
    fn test_other_threads_queue_in_submission_order() {
        let (dispatcher, mut queue) = owning_thread_queue();
        let order = Arc::new(Mutex::new(Vec::new()));

        let worker_dispatcher = dispatcher.clone();
        let worker_order = order.clone();
        let dispatches = thread::spawn(move || {
            (0..5)
                .map(|i| {
                    let order = worker_order.clone();
                    let owner = worker_dispatcher.owner();
                    worker_dispatcher.run_on_owning_thread(move || {
                        assert_eq!(thread::current().id(), owner);
                        order.lock().push(i);
                    })
                })
                .collect::<Vec<_>>()
        })
        .join()
        .unwrap();

        assert!(dispatches.iter().all(|d| *d == Dispatch::Queued));
        assert!(order.lock().is_empty());
        assert_eq!(queue.pump(), 5);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_closed_queue_drops_submissions() {
        let (dispatcher, mut queue) = owning_thread_queue();
        queue.close();

        let dispatch = thread::spawn(move || dispatcher.run_on_owning_thread(|| {}))
            .join()
            .unwrap();
        assert_eq!(dispatch, Dispatch::Dropped);
    }

    #[test]
    fn test_panicking_task_does_not_stop_the_queue() {
        let (dispatcher, mut queue) = owning_thread_queue();
        let ran = Arc::new(Mutex::new(0));

        dispatcher.submit(|| panic!("script blew up")).unwrap();
        let counter = ran.clone();
        dispatcher.submit(move || *counter.lock() += 1).unwrap();

        assert_eq!(queue.pump(), 2);
        assert_eq!(*ran.lock(), 1);
    }

    #[test]
    fn test_spawned_owning_thread_drains_until_dispatchers_drop() {
        let (dispatcher, handle) = spawn_owning_thread("automix-test-owner").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let seen = seen.clone();
            let dispatch = dispatcher.run_on_owning_thread(move || {
                seen.lock().push((i, thread::current().name().map(str::to_string)));
            });
            assert_eq!(dispatch, Dispatch::Queued);
        }
        drop(dispatcher);
        handle.join().unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen
            .iter()
            .all(|(_, name)| name.as_deref() == Some("automix-test-owner")));
        assert_eq!(
            seen.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }
}
