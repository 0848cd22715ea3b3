//! Concurrent writers: contended pins both succeed and converge.

use std::sync::Arc;
use std::thread;

use mnemo_core::{MemoryDraft, MemoryKind};
use mnemo_e2e_tests::stack;

#[tokio::test]
async fn concurrent_pins_on_same_id_converge() {
    let (stack, _dir) = stack();
    let stored = stack
        .storage
        .insert_memory(&MemoryDraft::new("contended row"))
        .unwrap();

    let storage = stack.storage.clone();
    let id = stored.id.clone();
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let storage = Arc::clone(&storage);
            let id = id.clone();
            thread::spawn(move || storage.set_pinned(&id, true))
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().is_ok());
    }
    assert!(stack.storage.require_memory(&id).unwrap().pinned);
}

#[tokio::test]
async fn parallel_inserts_are_all_visible() {
    let (stack, _dir) = stack();
    let storage = stack.storage.clone();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let storage = Arc::clone(&storage);
            thread::spawn(move || {
                let mut draft = MemoryDraft::new(format!("parallel insert {i}"));
                draft.kind = MemoryKind::Episodic;
                storage.insert_memory(&draft).map(|m| m.id)
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.join().unwrap().unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);

    for id in &ids {
        assert!(stack.storage.get_memory(id).unwrap().is_some());
    }
}
