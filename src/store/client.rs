use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use super::{BookmarkStore, StoreOp, StoreOutput, execute};
use crate::error::StoreError;

pub type RequestId = u64;

#[derive(Debug)]
pub struct StoreReply {
    pub id: RequestId,
    pub result: Result<StoreOutput, StoreError>,
}

/// Carries requests to a store and hands back replies in whatever order they complete.
pub trait StoreTransport {
    fn send(&mut self, id: RequestId, op: StoreOp) -> Result<(), StoreError>;
    fn try_recv(&mut self) -> Option<StoreReply>;
}

pub struct StoreClient {
    transport: Box<dyn StoreTransport>,
    next_id: RequestId,
}

impl StoreClient {
    pub fn new(transport: impl StoreTransport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            next_id: 1,
        }
    }

    pub fn submit(&mut self, op: StoreOp) -> Result<RequestId, StoreError> {
        let id = self.next_id;
        self.next_id += 1;
        tracing::debug!(request = id, op = op.name(), "store request");
        self.transport.send(id, op)?;
        Ok(id)
    }

    pub fn try_recv(&mut self) -> Option<StoreReply> {
        self.transport.try_recv()
    }
}

/// Runs the store on its own thread, like a language server behind a pipe.
pub struct ThreadedTransport {
    tx: Sender<(RequestId, StoreOp)>,
    rx: Receiver<StoreReply>,
}

impl ThreadedTransport {
    pub fn spawn<S: BookmarkStore + Send + 'static>(store: S) -> Self {
        let (tx, worker_rx) = mpsc::channel::<(RequestId, StoreOp)>();
        let (worker_tx, rx) = mpsc::channel::<StoreReply>();
        thread::spawn(move || store_worker_loop(store, worker_rx, worker_tx));
        Self { tx, rx }
    }
}

impl StoreTransport for ThreadedTransport {
    fn send(&mut self, id: RequestId, op: StoreOp) -> Result<(), StoreError> {
        self.tx.send((id, op)).map_err(|_| StoreError::Disconnected)
    }

    fn try_recv(&mut self) -> Option<StoreReply> {
        self.rx.try_recv().ok()
    }
}

fn store_worker_loop<S: BookmarkStore>(
    mut store: S,
    rx: Receiver<(RequestId, StoreOp)>,
    tx: Sender<StoreReply>,
) {
    while let Ok((id, op)) = rx.recv() {
        let result = execute(&mut store, op);
        if let Err(err) = &result {
            tracing::warn!(request = id, %err, "store request failed");
        }
        if tx.send(StoreReply { id, result }).is_err() {
            return;
        }
    }
}

struct InlineState<S> {
    store: S,
    queue: VecDeque<(RequestId, StoreOp)>,
    auto: bool,
    history: Vec<StoreOp>,
}

/// Same-thread transport. In auto mode each `try_recv` runs the oldest queued request;
/// otherwise requests wait until the [`InlineHandle`] runs them.
pub struct InlineTransport<S> {
    state: Rc<RefCell<InlineState<S>>>,
}

pub struct InlineHandle<S> {
    state: Rc<RefCell<InlineState<S>>>,
}

impl<S: BookmarkStore> InlineTransport<S> {
    pub fn new(store: S) -> (Self, InlineHandle<S>) {
        let state = Rc::new(RefCell::new(InlineState {
            store,
            queue: VecDeque::new(),
            auto: true,
            history: Vec::new(),
        }));
        (
            Self {
                state: Rc::clone(&state),
            },
            InlineHandle { state },
        )
    }
}

impl<S: BookmarkStore> StoreTransport for InlineTransport<S> {
    fn send(&mut self, id: RequestId, op: StoreOp) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        state.history.push(op.clone());
        state.queue.push_back((id, op));
        Ok(())
    }

    fn try_recv(&mut self) -> Option<StoreReply> {
        let mut state = self.state.borrow_mut();
        if !state.auto {
            return None;
        }
        let (id, op) = state.queue.pop_front()?;
        let result = execute(&mut state.store, op);
        Some(StoreReply { id, result })
    }
}

impl<S: BookmarkStore> InlineHandle<S> {
    pub fn set_auto(&self, auto: bool) {
        self.state.borrow_mut().auto = auto;
    }

    pub fn queued(&self) -> Vec<RequestId> {
        self.state.borrow().queue.iter().map(|(id, _)| *id).collect()
    }

    /// Runs one queued request now and returns its reply to the caller instead of the client.
    pub fn execute(&self, id: RequestId) -> Option<StoreReply> {
        let mut state = self.state.borrow_mut();
        let pos = state.queue.iter().position(|(queued, _)| *queued == id)?;
        let (id, op) = state.queue.remove(pos)?;
        let result = execute(&mut state.store, op);
        Some(StoreReply { id, result })
    }

    pub fn history(&self) -> Vec<StoreOp> {
        self.state.borrow().history.clone()
    }

    pub fn count(&self, op_name: &str) -> usize {
        self.state
            .borrow()
            .history
            .iter()
            .filter(|op| op.name() == op_name)
            .count()
    }

    pub fn with_store<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.state.borrow_mut().store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;
    use crate::store::MemoryStore;
    use std::time::{Duration, Instant};

    #[test]
    fn threaded_transport_answers_requests() {
        let mut client = StoreClient::new(ThreadedTransport::spawn(MemoryStore::new()));
        let id = client.submit(StoreOp::GetTree).expect("submit");
        let deadline = Instant::now() + Duration::from_secs(2);
        let reply = loop {
            if let Some(reply) = client.try_recv() {
                break reply;
            }
            assert!(Instant::now() < deadline, "store worker never replied");
            thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(reply.id, id);
        match reply.result {
            Ok(StoreOutput::Node(root)) => assert_eq!(root.children.map(|c| c.len()), Some(2)),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn inline_handle_controls_completion_order() {
        let (transport, handle) = InlineTransport::new(MemoryStore::new());
        handle.set_auto(false);
        let mut client = StoreClient::new(transport);
        let first = client.submit(StoreOp::Get(NodeId::from("1"))).expect("first");
        let second = client.submit(StoreOp::Get(NodeId::from("2"))).expect("second");
        assert!(client.try_recv().is_none());
        assert_eq!(handle.queued(), vec![first, second]);

        let reply = handle.execute(second).expect("second runs first");
        assert_eq!(reply.id, second);
        assert_eq!(handle.queued(), vec![first]);

        handle.set_auto(true);
        assert_eq!(client.try_recv().map(|r| r.id), Some(first));
        assert_eq!(handle.count("get"), 2);
    }
}
