//! Scenario: chunks reachable only through interior pointers stored in a
//! rooted chunk's payload survive collection; once those pointers are
//! cleared, a second collection reclaims them.

use gcalloc::Gc;
use std::ptr::NonNull;

#[test]
fn collect_follows_interior_pointers_and_then_reclaims_once_cleared() {
    let gc = Gc::instance();
    let word = std::mem::size_of::<usize>();

    let mut root_var: *mut u8 = std::ptr::null_mut();
    let r = gc
        .allocate_rooted(3 * word, NonNull::from(&mut root_var))
        .unwrap()
        .unwrap();

    let l1 = gc.allocate(8).unwrap().unwrap();
    let l2 = gc.allocate(8).unwrap().unwrap();
    let l3 = gc.allocate(8).unwrap().unwrap();

    unsafe {
        let words = r.as_ptr().cast::<usize>();
        words.write_unaligned(l1.as_ptr() as usize);
        words.add(1).write_unaligned(l2.as_ptr() as usize);
        words.add(2).write_unaligned(l3.as_ptr() as usize);
    }

    gc.collect();
    let chunks = gc.chunks();
    for ptr in [r, l1, l2, l3] {
        let chunk = chunks.iter().find(|c| c.addr == ptr.as_ptr() as usize).unwrap();
        assert!(!chunk.is_free, "transitively reachable chunk was swept");
    }

    unsafe {
        r.as_ptr().write_bytes(0, 3 * word);
    }
    gc.collect();
    let chunks = gc.chunks();
    for ptr in [l1, l2, l3] {
        let chunk = chunks.iter().find(|c| c.addr == ptr.as_ptr() as usize).unwrap();
        assert!(chunk.is_free, "chunk survived after its only reference was cleared");
    }
    let r_chunk = chunks.iter().find(|c| c.addr == r.as_ptr() as usize).unwrap();
    assert!(!r_chunk.is_free, "rooted chunk was incorrectly swept");
}
