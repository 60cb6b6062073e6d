use crate::error::Error;
use crate::Dispatch::{Endpoint, EndpointBuilder, StoredReply};
use crate::Gate::{call_func_p3, ExternFn3};
use crate::Ring::{Payload, Queue, QueueMeta, RingBuilder};
use std::ffi::c_void;
use std::ptr;

// Error codes
pub const MEMCALL_SUCCESS: i32 = 0;
pub const MEMCALL_ERROR_NULL_POINTER: i32 = -1;
pub const MEMCALL_ERROR_INVALID_ARG: i32 = -2;
pub const MEMCALL_ERROR_ALLOCATION_FAILED: i32 = -3;
pub const MEMCALL_ERROR_UNKNOWN_CALL: i32 = -4;
pub const MEMCALL_ERROR_DISCONNECTED: i32 = -5;
pub const MEMCALL_ERROR_INTERNAL: i32 = -6;

/// Handle to an attached endpoint (opaque pointer)
pub struct EndpointHandle {
    inner: Endpoint,
}

fn error_code(e: &Error) -> i32 {
    match e {
        Error::Io(_) => MEMCALL_ERROR_ALLOCATION_FAILED,
        Error::InvalidCapacity(_) | Error::InvalidShardCount(_) => MEMCALL_ERROR_INVALID_ARG,
        Error::UnknownCall(_) => MEMCALL_ERROR_UNKNOWN_CALL,
        Error::Disconnected => MEMCALL_ERROR_DISCONNECTED,
        Error::Unsupported(_) => MEMCALL_ERROR_INTERNAL,
    }
}

// -----------------------------------------------------------------------------
// Layout
// -----------------------------------------------------------------------------

/// Size in bytes of `QueueMeta`, for peers checking the handshake layout.
#[no_mangle]
pub extern "C" fn memcall_queue_meta_size() -> usize {
    std::mem::size_of::<QueueMeta>()
}

/// Size in bytes of one ring record.
#[no_mangle]
pub extern "C" fn memcall_payload_size() -> usize {
    std::mem::size_of::<Payload>()
}

// -----------------------------------------------------------------------------
// Endpoint API
// -----------------------------------------------------------------------------

/// Attach to a ring pair created by the other runtime.
///
/// # Arguments
/// * `inbound` - Ring this side reads CALLs/REPLYs/DROPs from.
/// * `outbound` - Ring this side writes to.
/// * `handler` - Optional. Invoked for every inbound CALL as
///   `handler(call_id, request_ptr, response_out)` on the caller's stack;
///   the `u64` written to `response_out` becomes the reply.
///
/// Sizing comes from `RingBuilder::from_env()`.
///
/// # Returns
/// * Pointer to `EndpointHandle`, or NULL on failure.
///
/// # Safety
/// Both descriptors must describe live rings that outlive the handle.
#[no_mangle]
pub unsafe extern "C" fn memcall_endpoint_attach(
    inbound: *const QueueMeta,
    outbound: *const QueueMeta,
    handler: Option<ExternFn3>,
) -> *mut EndpointHandle {
    if inbound.is_null() || outbound.is_null() {
        return ptr::null_mut();
    }

    let queues = Queue::<Payload>::from_meta(&*inbound)
        .and_then(|rx| Queue::<Payload>::from_meta(&*outbound).map(|tx| (rx, tx)));
    let (rx, tx) = match queues {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(error = %e, "rejected queue descriptors");
            return ptr::null_mut();
        }
    };

    let mut builder = EndpointBuilder::with_config(RingBuilder::from_env());
    if let Some(handler) = handler {
        builder = builder.fallback(move |call_id, request| {
            let mut out = 0u64;
            call_func_p3(
                handler,
                call_id as usize as *const c_void,
                request as *const c_void,
                &mut out as *mut u64 as *const c_void,
            );
            StoredReply::new(out)
        });
    }

    match builder.start(rx, tx) {
        Ok(endpoint) => Box::into_raw(Box::new(EndpointHandle { inner: endpoint })),
        Err(e) => {
            tracing::error!(error = %e, "failed to start endpoint");
            ptr::null_mut()
        }
    }
}

/// Call the other side and read back a `u64` response.
///
/// # Arguments
/// * `handle` - Pointer to `EndpointHandle`.
/// * `call_id` - Handler id on the other side.
/// * `request` - Opaque request pointer, must stay valid until return.
/// * `response_out` - Receives the response.
///
/// # Returns
/// * 0 on success, negative error code otherwise.
///
/// # Safety
/// `handle` must come from `memcall_endpoint_attach`, and the peer's reply
/// for `call_id` must encode a `u64`.
#[no_mangle]
pub unsafe extern "C" fn memcall_endpoint_call(
    handle: *mut EndpointHandle,
    call_id: u32,
    request: *const c_void,
    response_out: *mut u64,
) -> i32 {
    if handle.is_null() || response_out.is_null() {
        return MEMCALL_ERROR_NULL_POINTER;
    }

    let endpoint = &(*handle).inner;
    match endpoint.call_raw(call_id, request as usize) {
        Ok(reply) if reply.is_empty() => MEMCALL_ERROR_UNKNOWN_CALL,
        Ok(reply) => {
            *response_out = (reply.ptr() as *const u64).read_unaligned();
            reply.release();
            MEMCALL_SUCCESS
        }
        Err(e) => error_code(&e),
    }
}

/// Number of replies this side holds until the peer drops them.
///
/// # Safety
/// `handle` must be NULL or come from `memcall_endpoint_attach`.
#[no_mangle]
pub unsafe extern "C" fn memcall_endpoint_stored_replies(handle: *const EndpointHandle) -> i64 {
    if handle.is_null() {
        return MEMCALL_ERROR_NULL_POINTER as i64;
    }
    (*handle).inner.stored_replies() as i64
}

/// Stop the endpoint and free its handle.
///
/// # Safety
/// `handle` must be NULL or come from `memcall_endpoint_attach`, and must not
/// be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn memcall_endpoint_free(handle: *mut EndpointHandle) {
    if !handle.is_null() {
        let _ = Box::from_raw(handle); // Dropped automatically
    }
}
