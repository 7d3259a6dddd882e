#![no_main]
use blockfs::core::allocator::{ChainAllocator, InodeAllocator};
use blockfs::core::catalog::{encode_entries, EntryTable};
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes must decode to a table or fail cleanly, and whatever
// decodes must encode back to the same bytes.
fuzz_target!(|data: &[u8]| {
    let chain = ChainAllocator::new(16, 8);
    if let Ok(table) = EntryTable::decode(data, &chain) {
        let encoded = encode_entries(table.iter()).expect("decoded names are valid");
        let reparsed = EntryTable::decode(&encoded, &chain).expect("re-decode");
        assert_eq!(reparsed, table);
    }

    // Inode records point at nothing here, so they must all be rejected
    let inodes = InodeAllocator::new(16, 8, 8);
    let _ = EntryTable::decode(data, &inodes);
});
