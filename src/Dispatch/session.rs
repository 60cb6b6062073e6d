use std::ffi::c_void;

use super::endpoint::{Endpoint, EndpointBuilder};
use crate::error::Result;
use crate::Gate::{call_func_g0_p2, ExternFn2};
use crate::Ring::{Payload, Queue};

/// Sets up the ring pair between two runtimes.
pub struct Session;

impl Session {
    /// Two endpoints in this process wired back to back. Each side's
    /// outbound ring is sized by its own builder.
    pub fn pair(a: EndpointBuilder, b: EndpointBuilder) -> Result<(Endpoint, Endpoint)> {
        let a_to_b = a.config().build_queue::<Payload>()?;
        let b_to_a = b.config().build_queue::<Payload>()?;
        let a_inbound = b_to_a.share();
        let b_inbound = a_to_b.share();

        let left = a.start(a_inbound, a_to_b)?;
        let right = b.start(b_inbound, b_to_a)?;
        tracing::debug!("loopback session established");
        Ok((left, right))
    }

    /// Create both rings, hand their descriptors to the peer and start the
    /// local endpoint.
    ///
    /// `peer_init` runs on the isolated gate stack as
    /// `peer_init(&local_outbound_meta, &local_inbound_meta)`: the first ring
    /// is the peer's inbound, the second its outbound. The peer must stop
    /// using both rings before the returned endpoint is dropped.
    ///
    /// # Safety
    /// `peer_init` must be a valid C-ABI function that only reads the two
    /// `QueueMeta` records during the call.
    pub unsafe fn connect(builder: EndpointBuilder, peer_init: ExternFn2) -> Result<Endpoint> {
        let outbound = builder.config().build_queue::<Payload>()?;
        let inbound: Queue<Payload> = builder.config().build_queue()?;
        let outbound_meta = outbound.meta();
        let inbound_meta = inbound.meta();

        tracing::debug!(
            capacity = outbound_meta.buffer_len,
            "handing ring descriptors to peer"
        );
        call_func_g0_p2(
            peer_init,
            &outbound_meta as *const _ as *const c_void,
            &inbound_meta as *const _ as *const c_void,
        );
        builder.start(inbound, outbound)
    }
}
