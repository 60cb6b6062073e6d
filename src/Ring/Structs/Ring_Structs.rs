// Fixed-width ring record. Plain integers only so the layout is identical on
// both sides of the boundary.

/// One CALL, REPLY or DROP record.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Payload {
    /// Request or response pointer. Opaque to the transport: either the
    /// caller's original input or the tail of a flat response buffer.
    pub ptr: usize,
    /// Caller-chosen correlation tag. A REPLY echoes the CALL's value; a DROP
    /// carries the slab handle the REPLY advertised.
    pub user_data: usize,
    /// REPLY only: slab handle of the stored response, to be returned in the
    /// DROP. 0 means nothing to release.
    pub next_user_data: usize,
    /// Identifies the handler; one id per call signature.
    pub call_id: u32,
    /// bit0: carries request, bit1: carries response, bit2: wants reply,
    /// bit3: peer may drop the previous payload.
    pub flag: u32,
}

/// Decoded record kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    Call,
    Reply,
    Drop,
}

impl Payload {
    pub const CALL: u32 = 0b0101;
    pub const REPLY: u32 = 0b1110;
    pub const DROP: u32 = 0b1000;

    #[inline]
    pub const fn new_call(call_id: u32, user_data: usize, ptr: usize) -> Self {
        Self {
            ptr,
            user_data,
            next_user_data: 0,
            call_id,
            flag: Self::CALL,
        }
    }

    #[inline]
    pub const fn new_reply(call_id: u32, user_data: usize, next_user_data: usize, ptr: usize) -> Self {
        Self {
            ptr,
            user_data,
            next_user_data,
            call_id,
            flag: Self::REPLY,
        }
    }

    #[inline]
    pub const fn new_drop(call_id: u32, user_data: usize) -> Self {
        Self {
            ptr: 0,
            user_data,
            next_user_data: 0,
            call_id,
            flag: Self::DROP,
        }
    }

    /// `None` for flag values this side does not understand.
    #[inline]
    pub const fn kind(&self) -> Option<PayloadKind> {
        match self.flag {
            Self::CALL => Some(PayloadKind::Call),
            Self::REPLY => Some(PayloadKind::Reply),
            Self::DROP => Some(PayloadKind::Drop),
            _ => None,
        }
    }
}
