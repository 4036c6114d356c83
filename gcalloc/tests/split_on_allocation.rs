//! Scenario: allocating into a single large free chunk splits it when the
//! remainder is big enough to hold its own header.

use gcalloc::Gc;

/// Header size for the reference design's field layout (see
/// `gcalloc::ChunkInfo`'s companion header type): two `usize` fields plus
/// two booleans plus two niche-optimized `Option<NonNull<_>>` links,
/// rounded up to 8-byte alignment.
const HEADER_SIZE: usize = 32;

#[test]
fn allocate_into_large_free_chunk_splits_off_the_remainder() {
    let gc = Gc::instance();

    let p = gc.allocate(100).unwrap().unwrap();
    gc.deallocate(Some(p));

    let chunks = gc.chunks();
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].is_free);
    assert_eq!(chunks[0].size, 100);

    let used = gc.allocate(40).unwrap().unwrap();
    assert_eq!(used.as_ptr() as usize, p.as_ptr() as usize);

    let chunks = gc.chunks();
    assert_eq!(chunks.len(), 2);
    assert!(!chunks[0].is_free);
    assert_eq!(chunks[0].size, 40);
    assert!(chunks[1].is_free);
    assert_eq!(chunks[1].size, 100 - 40 - HEADER_SIZE);
}
