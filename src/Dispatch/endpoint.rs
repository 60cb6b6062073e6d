// One side of a ring pair: serves inbound CALLs and issues outbound ones.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::{bounded, Sender};

use super::marshal::{FlatBuffer, Marshal, Unmarshal};
use super::pool::WorkerPool;
use crate::error::{Error, Result};
use crate::Ring::{Guard, Payload, PayloadKind, Queue, QueueMeta, RingBuilder, WriteQueue};
use crate::Slab::MultiSlab;

/// A response kept alive until the peer sends the matching DROP.
///
/// Holds both the value and its flat encoding: the encoding may reference
/// the value's heap storage in place.
pub struct StoredReply {
    ptr: usize,
    _buffer: FlatBuffer,
    _value: Box<dyn Any + Send>,
}

impl StoredReply {
    pub fn new<R: Marshal + Send + 'static>(value: R) -> Self {
        let buffer = value.to_flat();
        Self {
            ptr: buffer.ref_ptr(),
            _buffer: buffer,
            _value: Box::new(value),
        }
    }

    /// Address carried in the REPLY record.
    #[inline]
    pub fn ptr(&self) -> usize {
        self.ptr
    }
}

type Handler = Arc<dyn Fn(usize) -> StoredReply + Send + Sync>;
type Fallback = Arc<dyn Fn(u32, usize) -> StoredReply + Send + Sync>;

struct Shared {
    outbound: WriteQueue<Payload>,
    handlers: Vec<Option<Handler>>,
    fallback: Option<Fallback>,
    stored: MultiSlab<StoredReply>,
    pending: MultiSlab<Sender<Payload>>,
}

/// Collects handlers, then starts an [`Endpoint`] over a pair of rings.
pub struct EndpointBuilder {
    config: RingBuilder,
    handlers: Vec<Option<Handler>>,
    fallback: Option<Fallback>,
}

impl Default for EndpointBuilder {
    fn default() -> Self {
        Self::with_config(RingBuilder::default())
    }
}

impl EndpointBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RingBuilder) -> Self {
        Self {
            config,
            handlers: Vec::new(),
            fallback: None,
        }
    }

    pub fn config(&self) -> &RingBuilder {
        &self.config
    }

    /// Serve `call_id` with a typed handler. The request is decoded from the
    /// CALL pointer and the response is encoded into a stored reply.
    pub fn register<Req, Resp, F>(self, call_id: u32, handler: F) -> Self
    where
        Req: Unmarshal,
        Resp: Marshal + Send + 'static,
        F: Fn(Req) -> Resp + Send + Sync + 'static,
    {
        self.register_raw(call_id, move |ptr| {
            let req = unsafe { Req::read_at(ptr) };
            StoredReply::new(handler(req))
        })
    }

    /// Serve `call_id` with a handler that sees the raw CALL pointer.
    pub fn register_raw<F>(mut self, call_id: u32, handler: F) -> Self
    where
        F: Fn(usize) -> StoredReply + Send + Sync + 'static,
    {
        let idx = call_id as usize;
        if self.handlers.len() <= idx {
            self.handlers.resize_with(idx + 1, || None);
        }
        self.handlers[idx] = Some(Arc::new(handler));
        self
    }

    /// Serve every call id that has no registered handler.
    pub fn fallback<F>(mut self, handler: F) -> Self
    where
        F: Fn(u32, usize) -> StoredReply + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(handler));
        self
    }

    /// Start serving `inbound` and sending on `outbound`.
    pub fn start(self, inbound: Queue<Payload>, outbound: Queue<Payload>) -> Result<Endpoint> {
        self.config.validate()?;
        let shards = self.config.slab_shards();
        let pool = Arc::new(WorkerPool::new(
            self.config.workers(),
            self.config.queue_depth(),
        )?);
        let shared = Arc::new(Shared {
            outbound: outbound.write()?,
            handlers: self.handlers,
            fallback: self.fallback,
            stored: MultiSlab::new(shards)?,
            pending: MultiSlab::new(shards)?,
        });

        let loop_shared = shared.clone();
        let loop_pool = pool.clone();
        let guard = inbound.read().run_handler_with_waiter(
            move |payload| dispatch(&loop_shared, &loop_pool, payload),
            self.config.waiter().build(),
        )?;

        tracing::debug!(
            handlers = shared.handlers.iter().filter(|h| h.is_some()).count(),
            fallback = shared.fallback.is_some(),
            "endpoint started"
        );
        Ok(Endpoint {
            guard,
            pool,
            shared,
        })
    }
}

/// Handles one inbound record on the ring reader thread.
fn dispatch(shared: &Arc<Shared>, pool: &WorkerPool, payload: Payload) {
    match payload.kind() {
        Some(PayloadKind::Call) => {
            let shared = shared.clone();
            if let Err(e) = pool.submit(move || shared.serve_call(payload)) {
                tracing::error!(error = %e, call_id = payload.call_id, "failed to queue call");
            }
        }
        Some(PayloadKind::Reply) => match shared.pending.pop(payload.user_data) {
            Some(waiter) => {
                // the caller may have given up; nothing to do then
                let _ = waiter.send(payload);
            }
            None => tracing::warn!(
                call_id = payload.call_id,
                user_data = payload.user_data,
                "reply for unknown pending call"
            ),
        },
        Some(PayloadKind::Drop) => {
            if shared.stored.pop(payload.user_data).is_none() {
                tracing::warn!(
                    call_id = payload.call_id,
                    handle = payload.user_data,
                    "drop for unknown slab handle"
                );
            }
        }
        None => tracing::warn!(flag = payload.flag, "unknown record flag"),
    }
}

impl Shared {
    fn serve_call(&self, call: Payload) {
        let handler = self
            .handlers
            .get(call.call_id as usize)
            .and_then(Option::as_ref);
        let result = panic::catch_unwind(AssertUnwindSafe(|| match handler {
            Some(h) => Some(h(call.ptr)),
            None => self.fallback.as_ref().map(|f| f(call.call_id, call.ptr)),
        }));

        let record = match result {
            Ok(Some(reply)) => {
                let ptr = reply.ptr();
                let handle = self.stored.push(reply);
                Payload::new_reply(call.call_id, call.user_data, handle, ptr)
            }
            Ok(None) => {
                tracing::warn!(call_id = call.call_id, "no handler registered, replying empty");
                Payload::new_reply(call.call_id, call.user_data, 0, 0)
            }
            Err(_) => {
                tracing::error!(call_id = call.call_id, "handler panicked, replying empty");
                Payload::new_reply(call.call_id, call.user_data, 0, 0)
            }
        };
        self.outbound.push(record);
    }
}

/// A running endpoint. Dropping it stops the reader, then the workers.
pub struct Endpoint {
    guard: Guard,
    pool: Arc<WorkerPool>,
    shared: Arc<Shared>,
}

impl Endpoint {
    /// Call `call_id` on the peer and wait for the decoded response.
    ///
    /// An empty reply (no handler on the peer side) yields
    /// [`Error::UnknownCall`].
    pub fn call<Req, Resp>(&self, call_id: u32, req: &Req) -> Result<Resp>
    where
        Req: Marshal,
        Resp: Unmarshal,
    {
        let flat = req.to_flat();
        let reply = self.call_raw(call_id, flat.ref_ptr())?;
        if reply.is_empty() {
            return Err(Error::UnknownCall(call_id));
        }
        let resp = unsafe { Resp::read_at(reply.ptr()) };
        reply.release();
        Ok(resp)
    }

    /// Send a CALL carrying `ptr` and block until its REPLY arrives.
    /// Whatever `ptr` addresses must stay valid until then.
    pub fn call_raw(&self, call_id: u32, ptr: usize) -> Result<ReplyView> {
        let (tx, rx) = bounded(1);
        let ticket = self.shared.pending.push(tx);
        tracing::trace!(call_id, ticket, "sending call");
        self.shared
            .outbound
            .push(Payload::new_call(call_id, ticket, ptr));
        let reply = rx.recv().map_err(|_| Error::Disconnected)?;
        Ok(ReplyView {
            call_id,
            ptr: reply.ptr,
            handle: reply.next_user_data,
            outbound: self.shared.outbound.clone(),
        })
    }

    /// Replies this side still holds for the peer.
    pub fn stored_replies(&self) -> usize {
        self.shared.stored.len()
    }

    /// Outbound calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.len()
    }

    /// Descriptor of the ring this endpoint writes to.
    pub fn outbound_meta(&self) -> QueueMeta {
        self.shared.outbound.meta()
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }
}

/// A received REPLY. Dropping it sends the DROP that frees the peer's
/// stored response, so read through [`ptr`](Self::ptr) first.
pub struct ReplyView {
    call_id: u32,
    ptr: usize,
    handle: usize,
    outbound: WriteQueue<Payload>,
}

impl ReplyView {
    #[inline]
    pub fn ptr(&self) -> usize {
        self.ptr
    }

    /// Slab handle the peer stored the response under. 0 for empty replies.
    #[inline]
    pub fn handle(&self) -> usize {
        self.handle
    }

    #[inline]
    pub fn call_id(&self) -> u32 {
        self.call_id
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handle == 0
    }

    /// Let the peer free the response now.
    pub fn release(self) {}
}

impl Drop for ReplyView {
    fn drop(&mut self) {
        if self.handle != 0 {
            self.outbound
                .push(Payload::new_drop(self.call_id, self.handle));
        }
    }
}
