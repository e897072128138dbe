use fmbridge_infra_engine_sim::Arena;
use fmbridge_ports::types::ArenaPtr;
use pretty_assertions::assert_eq;

#[test]
fn allocations_do_not_overlap() {
    let mut arena = Arena::new(256, 4096);
    let a = arena.alloc(10).expect("a");
    let b = arena.alloc(20).expect("b");

    assert_eq!(a, ArenaPtr { offset: 0, len: 10 });
    assert_eq!(b.offset, 16);
    assert_eq!(arena.generation(), 0);
}

#[test]
fn freed_block_is_reused() {
    let mut arena = Arena::new(256, 4096);
    let a = arena.alloc(64).expect("a");
    let _b = arena.alloc(64).expect("b");

    arena.free(a);
    let c = arena.alloc(32).expect("c");
    assert_eq!(c.offset, a.offset);

    let d = arena.alloc(32).expect("d");
    assert_eq!(d.offset, 32);
}

#[test]
fn freeing_the_top_block_shrinks_the_bump_pointer() {
    let mut arena = Arena::new(256, 4096);
    let a = arena.alloc(64).expect("a");
    let b = arena.alloc(64).expect("b");
    arena.free(b);
    arena.free(a);

    let c = arena.alloc(128).expect("c");
    assert_eq!(c.offset, 0);
}

#[test]
fn double_free_is_ignored() {
    let mut arena = Arena::new(256, 4096);
    let a = arena.alloc(16).expect("a");
    let _b = arena.alloc(16).expect("b");
    arena.free(a);
    arena.free(a);

    let c = arena.alloc(16).expect("c");
    let d = arena.alloc(16).expect("d");
    assert_eq!(c.offset, 0);
    assert_eq!(d.offset, 32);
}

#[test]
fn growth_moves_memory_and_keeps_contents() {
    let mut arena = Arena::new(64, 1 << 20);
    let data: Vec<u8> = (0..48).collect();
    let ptr = arena.copy_in(&data).expect("copy");
    let before = arena.view().base_addr();

    let big = arena.alloc(1000).expect("grows");
    assert!(arena.len() >= 1048);
    assert_eq!(arena.generation(), 1);
    assert_ne!(arena.view().base_addr(), before);
    assert_eq!(arena.slice(ptr), Some(&data[..]));
    assert_eq!(arena.slice(big).map(|s| s.len()), Some(1000));
}

#[test]
fn limit_is_enforced() {
    let mut arena = Arena::new(64, 128);
    assert!(arena.alloc(100).is_some());
    assert!(arena.alloc(100).is_none());
    assert_eq!(arena.len(), 128);
}

#[test]
fn out_of_range_slice_is_none() {
    let arena = Arena::new(64, 64);
    assert!(arena.slice(ArenaPtr { offset: 60, len: 8 }).is_none());
    assert!(arena
        .slice(ArenaPtr {
            offset: usize::MAX,
            len: 2
        })
        .is_none());
}
