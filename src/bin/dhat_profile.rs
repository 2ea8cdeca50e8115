//! DHAT heap profile of the cache's node layouts.
//!
//! Run with: cargo run --bin dhat_profile --release --features dhat-heap
//! View results: Open dhat-heap.json in <https://nnethercote.github.io/dh_view/dh_view.html>

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::time::Duration;

use s3cache::{Builder, Cache, Clock};

const CAPACITY: u64 = 4096;
const OPERATIONS: u64 = 100_000;
const UNIVERSE: u64 = 16_384;

/// Simple XorShift64 RNG for deterministic workloads.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

/// 90% of accesses hit 10% of the keys; misses are filled.
fn hotset(cache: &Cache<u64, u64>, seed: u64) {
    let mut rng = XorShift64::new(seed);
    let hot = UNIVERSE / 10;
    for _ in 0..OPERATIONS {
        let key = if rng.next_u64() % 10 != 0 {
            rng.next_u64() % hot
        } else {
            hot + rng.next_u64() % (UNIVERSE - hot)
        };
        if cache.get(&key).is_none() {
            cache.set(key, key);
        }
    }
}

fn churn(cache: &Cache<u64, u64>) {
    for i in 0..OPERATIONS / 4 {
        cache.set(UNIVERSE + i, i);
    }
}

fn profile(name: &str, cache: Cache<u64, u64>) {
    println!("=== Profiling {name} ===");
    for i in 0..CAPACITY {
        cache.set(i, i);
    }
    hotset(&cache, 42);
    churn(&cache);
    cache.flush();
    println!("  Final size: {}", cache.len());
    println!("  {}", cache.stats());
    cache.close();
}

fn main() {
    let _profiler = dhat::Profiler::new_heap();

    println!("s3cache DHAT Heap Profiling");
    println!("===========================\n");

    let clock = Clock::manual();
    profile("base layout", Builder::new(CAPACITY).clock(clock.clone()).build());
    profile(
        "cost layout",
        Builder::new(CAPACITY)
            .clock(clock.clone())
            .cost(|_, _| 1)
            .build(),
    );
    profile(
        "expiration layout",
        Builder::new(CAPACITY)
            .clock(clock.clone())
            .ttl(Duration::from_secs(3600))
            .build(),
    );
    profile(
        "expiration + cost layout",
        Builder::new(CAPACITY)
            .clock(clock)
            .variable_ttl()
            .cost(|_, _| 1)
            .build(),
    );

    println!("\n===========================");
    println!("Profile written to dhat-heap.json");
}
