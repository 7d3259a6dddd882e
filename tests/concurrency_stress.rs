//! Several threads sharing one filesystem through `SharedFileSystem`

use blockfs::{FileSystemBuilder, StrategyKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_concurrent_readers_and_writers() {
    for kind in [StrategyKind::Chain, StrategyKind::Inode] {
        let fs = FileSystemBuilder::new()
            .strategy(kind)
            .num_blocks(8192)
            .block_size(64)
            .build_shared()
            .unwrap();

        // Pre-populate
        {
            let mut guard = fs.lock();
            for i in 0..20 {
                guard
                    .make_file(&format!("/file{}", i), format!("data{}", i).as_bytes())
                    .unwrap();
            }
        }

        let reads = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|thread_id| {
                let fs = Arc::clone(&fs);
                let reads = Arc::clone(&reads);
                std::thread::spawn(move || {
                    if thread_id < 2 {
                        let dir = format!("/writer{}", thread_id);
                        fs.lock().make_directory(&dir).unwrap();
                        for i in 0..50 {
                            fs.lock()
                                .make_file(&format!("{}/f{}", dir, i), b"new data")
                                .unwrap();
                        }
                    } else {
                        for _ in 0..200 {
                            let idx = rand::random::<usize>() % 20;
                            let data = fs.lock().read_file(&format!("/file{}", idx)).unwrap();
                            assert_eq!(data, format!("data{}", idx).as_bytes());
                            reads.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(reads.load(Ordering::Relaxed), 4 * 200);

        let guard = fs.lock();
        assert_eq!(guard.list(Some("/writer0")).unwrap().len(), 50);
        assert_eq!(guard.list(Some("/writer1")).unwrap().len(), 50);
        assert!(guard.check().unwrap().is_clean());
    }
}
