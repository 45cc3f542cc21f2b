//! Property tests for the selection algorithms' fairness guarantees.

use alicia_balancer::{select, Algorithm, InstancePool, InstanceRecord};
use proptest::prelude::*;

fn pool_of(n: usize) -> InstancePool {
    let mut pool = InstancePool::new();
    for i in 0..n {
        pool.upsert(InstanceRecord::new(format!("i{i}"), "addr", 1, u32::MAX));
    }
    pool
}

proptest! {
    /// Round Robin over a stable pool of size k selects each instance
    /// within any window of k selections.
    #[test]
    fn round_robin_covers_every_instance_within_one_window(k in 1usize..12, windows in 1usize..5) {
        let mut pool = pool_of(k);
        for _ in 0..windows {
            let mut seen = std::collections::HashSet::new();
            for _ in 0..k {
                let picked = select(&mut pool, Algorithm::RoundRobin).unwrap();
                seen.insert(picked);
            }
            prop_assert_eq!(seen.len(), k);
        }
    }

    /// Weighted Round Robin over instances with weights w_i produces
    /// selection counts within +/-1 of w_i * n / sum(w_j) across n
    /// selections — checked here at n = sum(w_j) * rounds, where the ratio
    /// is exact in the smooth-WRR scheme this implements.
    #[test]
    fn weighted_round_robin_distributes_proportionally(weights in prop::collection::vec(1u32..8, 1..6), rounds in 1u32..6) {
        let mut pool = InstancePool::new();
        for (i, w) in weights.iter().enumerate() {
            pool.upsert(InstanceRecord::new(format!("i{i}"), "addr", *w, u32::MAX));
        }
        let total_weight: u32 = weights.iter().sum();
        let n = total_weight * rounds;

        let mut counts = std::collections::HashMap::new();
        for _ in 0..n {
            let picked = select(&mut pool, Algorithm::WeightedRoundRobin).unwrap();
            *counts.entry(picked).or_insert(0u32) += 1;
        }

        for (i, w) in weights.iter().enumerate() {
            let expected = (*w as f64) * (n as f64) / (total_weight as f64);
            let actual = *counts.get(&format!("i{i}")).unwrap_or(&0) as f64;
            prop_assert!((actual - expected).abs() <= 1.0001,
                "instance i{i}: expected ~{expected}, got {actual}");
        }
    }
}
