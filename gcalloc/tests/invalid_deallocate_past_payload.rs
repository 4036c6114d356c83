//! Scenario: `deallocate(payload + header_size)` — one header's worth
//! past a live payload, landing outside any allocated range — is fatal.

use gcalloc::Gc;
use std::ptr::NonNull;

#[test]
#[should_panic(expected = "outside the heap")]
fn deallocating_a_pointer_one_header_past_payload_terminates() {
    let gc = Gc::instance();
    let ptr = gc.allocate(32).unwrap().unwrap();
    let past_payload = unsafe { NonNull::new_unchecked(ptr.as_ptr().add(32)) };
    gc.deallocate(Some(past_payload));
}
