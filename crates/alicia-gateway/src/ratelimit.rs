//! Fixed-window per-source-IP rate limiting for the admission API.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    buckets: HashMap<IpAddr, (Instant, u32)>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            buckets: HashMap::new(),
        }
    }

    /// Returns `true` if the request is allowed, incrementing the bucket.
    pub fn check(&mut self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let entry = self.buckets.entry(ip).or_insert((now, 0));
        if now.duration_since(entry.0) >= self.window {
            *entry = (now, 0);
        }
        if entry.1 >= self.max_requests {
            return false;
        }
        entry.1 += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    #[test]
    fn allows_up_to_the_limit_then_denies() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60), 3);
        assert!(limiter.check(ip()));
        assert!(limiter.check(ip()));
        assert!(limiter.check(ip()));
        assert!(!limiter.check(ip()));
    }

    #[test]
    fn different_ips_get_independent_buckets() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.check(ip()));
        assert!(limiter.check(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2))));
    }
}
