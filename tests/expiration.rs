// ==============================================
// EXPIRATION TESTS (integration)
// ==============================================
//
// Time is driven by a manual clock, so every assertion is deterministic.
// The maintenance thread only sweeps after it observes the clock change, so
// tests that rely on the sweep rather than on `get` poll for the outcome.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use s3cache::{Builder, Cache, Clock, DeletionCause};

fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    check()
}

// ==============================================
// Per-Entry TTL
// ==============================================

mod variable_ttl {
    use super::*;

    fn cache(clock: &Clock) -> Cache<&'static str, u32> {
        Builder::new(100).clock(clock.clone()).variable_ttl().build()
    }

    #[test]
    fn zero_ttl_never_expires() {
        let clock = Clock::manual();
        let cache = cache(&clock);
        assert!(cache.set_with_ttl("forever", 1, Duration::ZERO));
        assert!(cache.set_with_ttl("short", 2, Duration::from_secs(1)));

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get(&"short"), None);
        assert_eq!(cache.get(&"forever"), Some(1));
    }

    #[test]
    fn entry_lives_until_its_deadline() {
        let clock = Clock::manual();
        let cache = cache(&clock);
        cache.set_with_ttl("a", 1, Duration::from_secs(3));

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get(&"a"), Some(1));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn fractional_ttl_rounds_up() {
        let clock = Clock::manual();
        let cache = cache(&clock);
        cache.set_with_ttl("a", 1, Duration::from_millis(1100));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&"a"), Some(1));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn default_ttl_applies_to_plain_set() {
        let clock = Clock::manual();
        let cache: Cache<u32, u32> = Builder::new(100)
            .clock(clock.clone())
            .variable_ttl()
            .ttl(Duration::from_secs(5))
            .build();
        cache.set(1, 1);
        cache.set_with_ttl(2, 2, Duration::from_secs(60));

        clock.advance(Duration::from_secs(5));
        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
    }

    #[test]
    fn set_if_absent_with_ttl_respects_live_entry() {
        let clock = Clock::manual();
        let cache = cache(&clock);
        assert!(cache.set_if_absent_with_ttl("a", 1, Duration::from_secs(2)));
        assert!(!cache.set_if_absent_with_ttl("a", 2, Duration::from_secs(2)));
        clock.advance(Duration::from_secs(2));
        assert!(cache.set_if_absent_with_ttl("a", 3, Duration::from_secs(2)));
        assert_eq!(cache.get(&"a"), Some(3));
    }
}

// ==============================================
// Background Sweep
// ==============================================

mod sweep {
    use super::*;

    #[test]
    fn fixed_ttl_entries_are_reaped_without_reads() {
        let clock = Clock::manual();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let cache: Cache<u32, u32> = Builder::new(100)
            .clock(clock.clone())
            .ttl(Duration::from_secs(10))
            .deletion_listener(move |k, _, cause| sink.lock().unwrap().push((*k, cause)))
            .build();
        for k in 0..20 {
            cache.set(k, k);
        }
        cache.flush();

        clock.advance(Duration::from_secs(10));
        assert!(eventually(|| cache.is_empty()));
        assert!(eventually(|| events.lock().unwrap().len() == 20));
        assert!(events
            .lock()
            .unwrap()
            .iter()
            .all(|(_, cause)| *cause == DeletionCause::Expired));
        assert!(eventually(|| cache.stats().evicted_count() == 20));
    }

    #[test]
    fn wheel_reaps_only_expired_entries() {
        let clock = Clock::manual();
        let cache: Cache<u32, u32> = Builder::new(1000)
            .clock(clock.clone())
            .variable_ttl()
            .build();
        for k in 0..100 {
            cache.set_with_ttl(k, k, Duration::from_secs(u64::from(k % 10) + 1));
        }
        cache.flush();

        clock.advance(Duration::from_secs(5));
        assert!(eventually(|| cache.len() == 50));
        for k in 0..100 {
            assert_eq!(cache.contains(&k), k % 10 >= 5, "key {k}");
        }
    }

    #[test]
    fn long_ttl_cascades_through_levels() {
        let clock = Clock::manual();
        let cache: Cache<u32, u32> = Builder::new(100)
            .clock(clock.clone())
            .variable_ttl()
            .build();
        cache.set_with_ttl(1, 1, Duration::from_secs(5_000));
        cache.flush();

        clock.advance(Duration::from_secs(4_999));
        cache.flush();
        assert!(cache.contains(&1));

        clock.advance(Duration::from_secs(1));
        assert!(eventually(|| cache.is_empty()));
    }
}
