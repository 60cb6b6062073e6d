// Layout conformance tests for ABI stability across runtimes.
// These tests assert sizes, alignments, and field offsets for
// QueueMeta and Payload. They also print the observed values
// to aid debugging when a mismatch occurs on a given platform.
use memcall::ffi::{memcall_payload_size, memcall_queue_meta_size};
use memcall::{Payload, QueueMeta};
use memoffset::offset_of;
use std::mem::{align_of, size_of};

const W: usize = size_of::<usize>();

#[test]
fn test_queue_meta_layout() {
    // 6 address-sized fields, then 2 i32 descriptors, padded to word alignment
    let raw = 6 * W + 4 + 4;
    let aligned = (raw + W - 1) & !(W - 1);

    let size = size_of::<QueueMeta>();
    let align = align_of::<QueueMeta>();
    let off_buffer_ptr = offset_of!(QueueMeta, buffer_ptr);
    let off_buffer_len = offset_of!(QueueMeta, buffer_len);
    let off_head_ptr = offset_of!(QueueMeta, head_ptr);
    let off_tail_ptr = offset_of!(QueueMeta, tail_ptr);
    let off_working_ptr = offset_of!(QueueMeta, working_ptr);
    let off_stuck_ptr = offset_of!(QueueMeta, stuck_ptr);
    let off_working_fd = offset_of!(QueueMeta, working_fd);
    let off_unstuck_fd = offset_of!(QueueMeta, unstuck_fd);

    println!(
        "QueueMeta => size: {size}, expected: {aligned}, align: {align}, offsets: [buffer_ptr:{off_buffer_ptr}, buffer_len:{off_buffer_len}, head_ptr:{off_head_ptr}, tail_ptr:{off_tail_ptr}, working_ptr:{off_working_ptr}, stuck_ptr:{off_stuck_ptr}, working_fd:{off_working_fd}, unstuck_fd:{off_unstuck_fd}]"
    );

    assert_eq!(size, aligned);
    assert_eq!(align, align_of::<usize>());
    assert_eq!(off_buffer_ptr, 0);
    assert_eq!(off_buffer_len, W);
    assert_eq!(off_head_ptr, 2 * W);
    assert_eq!(off_tail_ptr, 3 * W);
    assert_eq!(off_working_ptr, 4 * W);
    assert_eq!(off_stuck_ptr, 5 * W);
    assert_eq!(off_working_fd, 6 * W);
    assert_eq!(off_unstuck_fd, 6 * W + 4);
    assert_eq!(memcall_queue_meta_size(), size);
}

#[test]
fn test_payload_layout() {
    let raw = 3 * W + 4 + 4;
    let aligned = (raw + W - 1) & !(W - 1);

    let size = size_of::<Payload>();
    let off_ptr = offset_of!(Payload, ptr);
    let off_user_data = offset_of!(Payload, user_data);
    let off_next_user_data = offset_of!(Payload, next_user_data);
    let off_call_id = offset_of!(Payload, call_id);
    let off_flag = offset_of!(Payload, flag);

    println!(
        "Payload => size: {size}, expected: {aligned}, offsets: [ptr:{off_ptr}, user_data:{off_user_data}, next_user_data:{off_next_user_data}, call_id:{off_call_id}, flag:{off_flag}]"
    );

    assert_eq!(size, aligned);
    assert_eq!(off_ptr, 0);
    assert_eq!(off_user_data, W);
    assert_eq!(off_next_user_data, 2 * W);
    assert_eq!(off_call_id, 3 * W);
    assert_eq!(off_flag, 3 * W + 4);
    assert_eq!(memcall_payload_size(), size);
}

#[test]
fn test_payload_flags_are_distinct() {
    let flags = [Payload::CALL, Payload::REPLY, Payload::DROP];
    for (i, a) in flags.iter().enumerate() {
        for b in &flags[i + 1..] {
            assert_ne!(a, b);
        }
    }
    assert_eq!(Payload::CALL, 0b0101);
    assert_eq!(Payload::REPLY, 0b1110);
    assert_eq!(Payload::DROP, 0b1000);
}
