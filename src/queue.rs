use crossbeam::channel::{self, Receiver, Sender};

/// What travels on the queue: work to run, or the order to stop.
pub(crate) enum Item {
    Run(Box<dyn FnOnce() + Send + 'static>),
    Shutdown,
}

/// Adapter over the MPMC transport shared by the pool, its workers and the
/// shutdown drainers.
///
/// The pool keeps both channel halves alive for its whole lifetime, so sends
/// and receives cannot observe a disconnected channel while the pool exists.
pub(crate) struct TaskQueue {
    tx: Sender<Item>,
    rx: Receiver<Item>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    pub(crate) fn enqueue(&self, item: Item) {
        self.tx.send(item).expect("task queue disconnected");
    }

    pub(crate) fn enqueue_bulk<I>(&self, items: I)
    where
        I: IntoIterator<Item = Item>,
    {
        for item in items {
            self.enqueue(item);
        }
    }

    /// Hands out the per-consumer handle a worker or drainer dequeues with.
    pub(crate) fn consumer_token(&self) -> ConsumerToken {
        ConsumerToken {
            rx: self.rx.clone(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Per-consumer receive handle. Each worker and drainer owns one; cloned
/// receivers dequeue from the same underlying queue.
pub(crate) struct ConsumerToken {
    rx: Receiver<Item>,
}

impl ConsumerToken {
    /// Blocks until an item is available.
    pub(crate) fn wait_dequeue(&self) -> Item {
        self.rx.recv().expect("task queue disconnected")
    }

    /// Non-blocking probe.
    pub(crate) fn try_dequeue(&self) -> Option<Item> {
        self.rx.try_recv().ok()
    }
}
