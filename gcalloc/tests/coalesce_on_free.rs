//! Scenario: filling a split remainder exactly, then freeing both
//! halves, must merge them back into the original single free chunk.

use gcalloc::Gc;

const HEADER_SIZE: usize = 32;

#[test]
fn freeing_both_halves_of_a_split_chunk_restores_the_original() {
    let gc = Gc::instance();

    let p = gc.allocate(100).unwrap().unwrap();
    gc.deallocate(Some(p));

    let first = gc.allocate(40).unwrap().unwrap();
    let remainder = 100 - 40 - HEADER_SIZE;
    let second = gc.allocate(remainder).unwrap().unwrap();

    let chunks = gc.chunks();
    assert_eq!(chunks.len(), 2, "exact-fit allocation must not split further");
    assert!(!chunks[0].is_free);
    assert!(!chunks[1].is_free);

    gc.deallocate(Some(first));
    gc.deallocate(Some(second));

    let chunks = gc.chunks();
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].is_free);
    assert_eq!(chunks[0].size, 100);
}
