//! Scenario: `deallocate` of an interior (non-payload) pointer is fatal,
//! not silently accepted.

use gcalloc::Gc;
use std::ptr::NonNull;

#[test]
#[should_panic(expected = "outside the heap")]
fn deallocating_an_interior_pointer_terminates() {
    let gc = Gc::instance();
    let ptr = gc.allocate(32).unwrap().unwrap();
    let interior = unsafe { NonNull::new_unchecked(ptr.as_ptr().add(4)) };
    gc.deallocate(Some(interior));
}
