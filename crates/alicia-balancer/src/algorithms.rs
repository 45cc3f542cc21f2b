//! Selection algorithms, chosen per logical service: Round Robin, Least
//! Connections, (smooth) Weighted Round Robin, Random. All skip
//! `open`-breaker instances; all return `Busy` when every eligible
//! instance is at its `max_inflight` cap.

use rand::Rng;

use crate::pool::InstancePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    RoundRobin,
    LeastConnections,
    WeightedRoundRobin,
    Random,
}

#[derive(Debug, thiserror::Error)]
pub enum BalancerError {
    #[error("no instances registered for this service")]
    NoInstances,
    #[error("all eligible instances are at capacity")]
    Busy,
}

pub fn select(pool: &mut InstancePool, algorithm: Algorithm) -> Result<String, BalancerError> {
    if pool.instances.is_empty() {
        return Err(BalancerError::NoInstances);
    }
    match algorithm {
        Algorithm::RoundRobin => round_robin(pool),
        Algorithm::LeastConnections => least_connections(pool),
        Algorithm::WeightedRoundRobin => weighted_round_robin(pool),
        Algorithm::Random => random(pool),
    }
}

fn eligible_ids(pool: &InstancePool) -> Vec<String> {
    pool.ordered_ids()
        .into_iter()
        .filter(|id| {
            pool.instances
                .get(id)
                .map(|i| i.breaker.state() != crate::breaker::BreakerState::Open)
                .unwrap_or(false)
        })
        .collect()
}

fn round_robin(pool: &mut InstancePool) -> Result<String, BalancerError> {
    let ids = eligible_ids(pool);
    if ids.is_empty() {
        return Err(BalancerError::Busy);
    }
    for offset in 0..ids.len() {
        let idx = (pool.round_robin_cursor + offset) % ids.len();
        let id = &ids[idx];
        if !pool.instances[id].is_at_capacity() {
            pool.round_robin_cursor = (idx + 1) % ids.len();
            return Ok(id.clone());
        }
    }
    Err(BalancerError::Busy)
}

fn least_connections(pool: &InstancePool) -> Result<String, BalancerError> {
    eligible_ids(pool)
        .into_iter()
        .filter(|id| !pool.instances[id].is_at_capacity())
        .min_by(|a, b| {
            let ia = &pool.instances[a];
            let ib = &pool.instances[b];
            ia.inflight()
                .cmp(&ib.inflight())
                .then_with(|| ia.avg_rtt_ms.partial_cmp(&ib.avg_rtt_ms).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.cmp(b))
        })
        .ok_or(BalancerError::Busy)
}

/// Nginx-style smooth weighted round robin: each instance's current
/// weight accumulates by its effective weight every pick; the highest
/// current weight wins and is reduced by the sum of all weights.
fn weighted_round_robin(pool: &mut InstancePool) -> Result<String, BalancerError> {
    let ids = eligible_ids(pool);
    let available: Vec<String> = ids
        .into_iter()
        .filter(|id| !pool.instances[id].is_at_capacity())
        .collect();
    if available.is_empty() {
        return Err(BalancerError::Busy);
    }

    let total_weight: i64 = available.iter().map(|id| pool.instances[id].weight as i64).sum();

    for id in &available {
        let record = pool.instances.get_mut(id).unwrap();
        record.current_weight += record.weight as i64;
    }

    let winner = available
        .iter()
        .max_by_key(|id| pool.instances[*id].current_weight)
        .unwrap()
        .clone();

    let record = pool.instances.get_mut(&winner).unwrap();
    record.current_weight -= total_weight;

    Ok(winner)
}

fn random(pool: &InstancePool) -> Result<String, BalancerError> {
    let available: Vec<String> = eligible_ids(pool)
        .into_iter()
        .filter(|id| !pool.instances[id].is_at_capacity())
        .collect();
    if available.is_empty() {
        return Err(BalancerError::Busy);
    }
    let idx = rand::thread_rng().gen_range(0..available.len());
    Ok(available[idx].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::InstanceRecord;

    fn pool_with(n: usize) -> InstancePool {
        let mut pool = InstancePool::new();
        for i in 0..n {
            pool.upsert(InstanceRecord::new(format!("i{i}"), "addr", 1, 10));
        }
        pool
    }

    #[test]
    fn round_robin_cycles_through_all_instances() {
        let mut pool = pool_with(3);
        let mut picks = Vec::new();
        for _ in 0..3 {
            picks.push(select(&mut pool, Algorithm::RoundRobin).unwrap());
        }
        picks.sort();
        assert_eq!(picks, vec!["i0".to_string(), "i1".to_string(), "i2".to_string()]);
    }

    #[test]
    fn least_connections_prefers_the_idlest_instance() {
        let mut pool = pool_with(2);
        pool.instances.get_mut("i0").unwrap().acquire();
        pool.instances.get_mut("i0").unwrap().acquire();
        let picked = select(&mut pool, Algorithm::LeastConnections).unwrap();
        assert_eq!(picked, "i1");
    }

    #[test]
    fn weighted_round_robin_favors_higher_weight_over_many_picks() {
        let mut pool = InstancePool::new();
        pool.upsert(InstanceRecord::new("heavy", "addr", 3, 100));
        pool.upsert(InstanceRecord::new("light", "addr", 1, 100));

        let mut heavy_count = 0;
        for _ in 0..8 {
            let picked = select(&mut pool, Algorithm::WeightedRoundRobin).unwrap();
            if picked == "heavy" {
                heavy_count += 1;
            }
        }
        assert_eq!(heavy_count, 6);
    }

    #[test]
    fn open_breaker_instance_is_skipped() {
        let mut pool = pool_with(2);
        pool.instances.get_mut("i0").unwrap().breaker.on_failure();
        for _ in 0..10 {
            pool.instances.get_mut("i0").unwrap().breaker.on_failure();
        }
        let picked = select(&mut pool, Algorithm::RoundRobin).unwrap();
        assert_eq!(picked, "i1");
    }

    #[test]
    fn all_at_capacity_reports_busy() {
        let mut pool = InstancePool::new();
        pool.upsert(InstanceRecord::new("i0", "addr", 1, 1));
        pool.instances.get_mut("i0").unwrap().acquire();
        let result = select(&mut pool, Algorithm::RoundRobin);
        assert!(matches!(result, Err(BalancerError::Busy)));
    }
}
