//! Buffer Pool Manager Tests
//!
//! These tests exercise the public `BufferPoolManager` API end to end:
//! page allocation, read/write guards, pinning, eviction, and deletion.

use sundial::buffer::BufferPoolManager;
use sundial::common::PageId;
use sundial::storage::DiskManager;
use std::sync::Arc;
use tempfile::tempdir;

const FRAMES: usize = 10;
const PAGE_SIZE: u32 = 4096;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let dm = DiskManager::create(&path, PAGE_SIZE).unwrap();
    (BufferPoolManager::new(pool_size, dm), dir)
}

/// Helper to write a string to page data.
fn copy_string(data: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    data[..bytes.len()].copy_from_slice(bytes);
    data[bytes.len()] = 0; // null terminator
}

/// Helper to read a null-terminated string from page data.
fn read_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

#[test]
fn test_very_basic() {
    let (bpm, _dir) = create_bpm(FRAMES);
    let str_data = "Hello, world!";

    let pid;
    {
        let mut guard = bpm.new_page().unwrap();
        pid = guard.page_id();
        copy_string(guard.as_mut_slice(), str_data);
        assert_eq!(read_string(guard.as_slice()), str_data);
    }

    {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(read_string(guard.as_slice()), str_data);
    }

    {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(read_string(guard.as_slice()), str_data);
    }

    assert!(bpm.delete_page(pid).is_ok());
}

#[test]
fn test_page_pin_easy() {
    let (bpm, _dir) = create_bpm(2);

    let str0 = "page0";
    let str1 = "page1";
    let str0_updated = "page0updated";
    let str1_updated = "page1updated";

    let pageid0;
    let pageid1;
    {
        let mut page0_write = bpm.new_page().unwrap();
        pageid0 = page0_write.page_id();
        copy_string(page0_write.as_mut_slice(), str0);
    }
    {
        let mut page1_write = bpm.new_page().unwrap();
        pageid1 = page1_write.page_id();
        copy_string(page1_write.as_mut_slice(), str1);
    }

    // With only 2 frames and both pages now unpinned (guards dropped), a new
    // page evicts one of them.
    {
        let mut page0_write = bpm.fetch_page_write(pageid0).unwrap();
        assert_eq!(read_string(page0_write.as_slice()), str0);
        copy_string(page0_write.as_mut_slice(), str0_updated);
    }
    {
        let mut page1_write = bpm.fetch_page_write(pageid1).unwrap();
        assert_eq!(read_string(page1_write.as_slice()), str1);
        copy_string(page1_write.as_mut_slice(), str1_updated);
    }

    {
        let page0_read = bpm.fetch_page_read(pageid0).unwrap();
        assert_eq!(read_string(page0_read.as_slice()), str0_updated);

        let page1_read = bpm.fetch_page_read(pageid1).unwrap();
        assert_eq!(read_string(page1_read.as_slice()), str1_updated);
    }
}

#[test]
fn test_page_pin_medium() {
    let (bpm, _dir) = create_bpm(FRAMES);

    let mut page0 = bpm.new_page().unwrap();
    let pid0 = page0.page_id();

    let hello = "Hello";
    copy_string(page0.as_mut_slice(), hello);
    assert_eq!(read_string(page0.as_slice()), hello);
    drop(page0);

    // Fill the pool.
    let mut pages = Vec::new();
    for _ in 0..FRAMES {
        pages.push(bpm.new_page().unwrap());
    }

    assert_eq!(bpm.free_frame_count(), 0);

    // Drop half of them to unpin.
    for _ in 0..(FRAMES / 2) {
        pages.remove(0);
    }

    assert_eq!(bpm.free_frame_count(), FRAMES / 2);

    // We should be able to fetch the data we wrote earlier; it may have been
    // evicted and reloaded from disk along the way.
    let original_page = bpm.fetch_page_read(pid0).unwrap();
    assert_eq!(read_string(original_page.as_slice()), hello);
}

#[test]
fn test_drop() {
    let (bpm, _dir) = create_bpm(FRAMES);

    {
        let pid0;
        {
            let page0 = bpm.new_page().unwrap();
            pid0 = page0.page_id();
        }
        // Guard dropped: frame should be evictable again.
        assert_eq!(bpm.free_frame_count(), FRAMES - 1);
        let _ = pid0;
    }

    let pid1 = bpm.new_page().unwrap().page_id();
    let pid2 = bpm.new_page().unwrap().page_id();

    {
        let _read_guarded_page = bpm.fetch_page_read(pid1).unwrap();
        let _write_guarded_page = bpm.fetch_page_write(pid2).unwrap();
    }

    // Refetching should not hang if guards correctly unpinned above.
    {
        let _write_test1 = bpm.fetch_page_write(pid1).unwrap();
        let _write_test2 = bpm.fetch_page_write(pid2).unwrap();
    }

    let mutable_page_id;
    {
        let mut guard = bpm.new_page().unwrap();
        mutable_page_id = guard.page_id();
        copy_string(guard.as_mut_slice(), "data");
    }

    // Fill up the pool again (evicts the mutable page).
    {
        let mut guards = Vec::new();
        for _ in 0..FRAMES {
            guards.push(bpm.new_page().unwrap());
        }
    }

    // Retrieve the page we edited earlier.
    {
        let guard = bpm.fetch_page_read(mutable_page_id).unwrap();
        assert_eq!(read_string(guard.as_slice()), "data");
    }
}

/// Core invariant: a pinned page cannot be evicted, so concurrent readers
/// of a pinned page never observe a different page's contents.
#[test]
fn test_evictable() {
    use std::sync::{Condvar, Mutex};
    use std::thread;

    const ROUNDS: usize = 20;
    const NUM_READERS: usize = 4;

    let (bpm, _dir) = create_bpm(1); // Only 1 frame
    let bpm = Arc::new(bpm);

    for round in 0..ROUNDS {
        let winner_pid = bpm.new_page().unwrap().page_id();
        let loser_pid = bpm.new_page().unwrap().page_id();
        // At this point: frame has loser, winner is on disk.

        let signal = Arc::new((Mutex::new(false), Condvar::new()));
        let mut readers = Vec::new();

        for _ in 0..NUM_READERS {
            let bpm_clone = Arc::clone(&bpm);
            let signal_clone = Arc::clone(&signal);
            let winner = winner_pid;

            readers.push(thread::spawn(move || {
                let (lock, cvar) = &*signal_clone;
                {
                    let mut started = lock.lock().unwrap();
                    while !*started {
                        started = cvar.wait(started).unwrap();
                    }
                }
                let _read_guard = bpm_clone.fetch_page_read(winner).unwrap();
            }));
        }

        let winner_guard = bpm.fetch_page_read(winner_pid).unwrap();

        {
            let (lock, cvar) = &*signal;
            let mut started = lock.lock().unwrap();
            *started = true;
            cvar.notify_all();
        }

        for reader in readers {
            reader.join().unwrap();
        }

        drop(winner_guard);
        let _ = (round, loser_pid);
    }
}

/// Holding a write lock on one page must not block acquiring a write lock
/// on a different page.
#[test]
fn test_page_access() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    let (bpm, _dir) = create_bpm(FRAMES);
    let bpm = Arc::new(bpm);

    let pid0 = bpm.new_page().unwrap().page_id();
    let pid1 = bpm.new_page().unwrap().page_id();

    let guard0 = bpm.fetch_page_write(pid0).unwrap();

    let start = Arc::new(AtomicBool::new(false));
    let start_clone = Arc::clone(&start);
    let bpm_clone = Arc::clone(&bpm);

    let child = thread::spawn(move || {
        start_clone.store(true, Ordering::SeqCst);
        let _guard0 = bpm_clone.fetch_page_write(pid0).unwrap();
    });

    while !start.load(Ordering::SeqCst) {
        thread::yield_now();
    }
    thread::sleep(Duration::from_millis(50));

    // If latching is incorrect, this deadlocks.
    let _guard1 = bpm.fetch_page_write(pid1).unwrap();

    drop(guard0);
    child.join().unwrap();
}

#[test]
fn test_new_page_convenience() {
    let (bpm, _dir) = create_bpm(FRAMES);
    let data = b"Hello, world!";

    let pid = {
        let mut guard = bpm.new_page().unwrap();
        assert_eq!(guard.page_id(), PageId::new(0));
        guard.as_mut_slice()[..data.len()].copy_from_slice(data);
        guard.page_id()
    };

    {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(&guard.as_slice()[..data.len()], data);
    }

    bpm.delete_page(pid).unwrap();
    assert_eq!(bpm.page_count(), 0);
}
