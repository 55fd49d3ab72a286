//! Identity pool
//!
//! An identity is a network egress point (direct or proxied) paired with a
//! stable browser header profile. The pool tracks success and failure per
//! identity, excludes blocked and cooling identities from selection, and
//! picks randomly among the best few candidates so request patterns stay
//! non-deterministic.

use crate::config::{IdentityConfig, ProxyEntry, ProxyKind};
use crate::identity::headers::{random_profile, HeaderProfile};
use crate::StatlineError;
use rand::seq::SliceRandom;
use std::time::{Duration, Instant};

/// Candidates considered for the random pick
const SELECTION_POOL: usize = 3;

/// Network egress point
#[derive(Debug, Clone)]
pub enum Egress {
    /// No proxy; connect directly
    Direct,
    /// Connect through the configured proxy
    Proxy(ProxyEntry),
}

/// One selectable identity with its running counters
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: usize,
    pub egress: Egress,
    pub profile: &'static HeaderProfile,
    pub success_count: u32,
    pub failure_count: u32,
    pub blocked: bool,
    pub last_used: Option<Instant>,
}

impl Identity {
    fn new(id: usize, egress: Egress) -> Self {
        Self {
            id,
            egress,
            profile: random_profile(),
            success_count: 0,
            failure_count: 0,
            blocked: false,
            last_used: None,
        }
    }

    /// Whether this identity egresses through a residential proxy
    pub fn residential(&self) -> bool {
        match &self.egress {
            Egress::Direct => false,
            Egress::Proxy(entry) => entry.residential,
        }
    }

    /// Success rate; an unused identity counts as fully successful so fresh
    /// identities sort ahead of known-bad ones
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            return 1.0;
        }
        self.success_count as f64 / total as f64
    }

    /// Whether the identity is still inside its cooldown window
    pub fn is_cooling(&self, cooldown: Duration, now: Instant) -> bool {
        match self.last_used {
            Some(last) => now.duration_since(last) < cooldown,
            None => false,
        }
    }

    /// Proxy URL for the HTTP client, if this identity uses one
    pub fn proxy_url(&self) -> Option<String> {
        let entry = match &self.egress {
            Egress::Direct => return None,
            Egress::Proxy(entry) => entry,
        };

        let scheme = match entry.kind {
            ProxyKind::Http => "http",
            ProxyKind::Https => "https",
            ProxyKind::Socks5 => "socks5",
        };

        let url = match (&entry.username, &entry.password) {
            (Some(user), Some(pass)) => {
                format!("{}://{}:{}@{}:{}", scheme, user, pass, entry.host, entry.port)
            }
            _ => format!("{}://{}:{}", scheme, entry.host, entry.port),
        };

        Some(url)
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match &self.egress {
            Egress::Direct => format!("direct/{}", self.profile.name),
            Egress::Proxy(entry) => {
                format!("{}:{}/{}", entry.host, entry.port, self.profile.name)
            }
        }
    }
}

/// Pool of identities with cooldown and blocking rules
pub struct IdentityPool {
    identities: Vec<Identity>,
    config: IdentityConfig,
}

impl IdentityPool {
    /// Builds the pool from configured proxies
    ///
    /// With no proxies configured the pool degrades to a single direct
    /// identity, so the rest of the system is indifferent to whether
    /// proxies exist.
    pub fn from_config(proxies: &[ProxyEntry], config: IdentityConfig) -> Self {
        let identities = if proxies.is_empty() {
            vec![Identity::new(0, Egress::Direct)]
        } else {
            proxies
                .iter()
                .enumerate()
                .map(|(id, entry)| Identity::new(id, Egress::Proxy(entry.clone())))
                .collect()
        };

        tracing::info!("Identity pool initialized with {} identities", identities.len());
        Self { identities, config }
    }

    /// Selects the best available identity and marks it used
    ///
    /// Blocked identities and identities inside their cooldown are excluded;
    /// the remainder are ordered residential-first, then by success rate
    /// descending, then failure count ascending, and one of the top three is
    /// picked at random.
    pub fn next_identity(&mut self) -> Result<usize, StatlineError> {
        let now = Instant::now();
        let cooldown = Duration::from_secs(self.config.cooldown_secs);

        let mut candidates: Vec<usize> = self
            .identities
            .iter()
            .filter(|i| !i.blocked && !i.is_cooling(cooldown, now))
            .map(|i| i.id)
            .collect();

        if candidates.is_empty() {
            return Err(StatlineError::IdentityPoolExhausted);
        }

        candidates.sort_by(|&a, &b| {
            let ia = &self.identities[a];
            let ib = &self.identities[b];
            ib.residential()
                .cmp(&ia.residential())
                .then_with(|| {
                    ib.success_rate()
                        .partial_cmp(&ia.success_rate())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| ia.failure_count.cmp(&ib.failure_count))
        });

        candidates.truncate(SELECTION_POOL);
        let chosen = *candidates
            .choose(&mut rand::thread_rng())
            .expect("candidates verified non-empty");

        self.identities[chosen].last_used = Some(now);
        tracing::debug!("Selected identity {}", self.identities[chosen].describe());
        Ok(chosen)
    }

    /// Records the outcome of a request made through `id`
    ///
    /// Once an identity has accumulated enough failures and its success rate
    /// has dropped below the floor it is blocked until an explicit unblock.
    pub fn record_result(&mut self, id: usize, success: bool, latency: Duration) {
        let config = self.config.clone();
        let identity = match self.identities.get_mut(id) {
            Some(i) => i,
            None => return,
        };

        if success {
            identity.success_count += 1;
            tracing::trace!(
                "Identity {} succeeded in {:?}",
                identity.describe(),
                latency
            );
        } else {
            identity.failure_count += 1;
        }

        if !identity.blocked
            && identity.failure_count >= config.block_min_failures
            && identity.success_rate() < config.block_success_floor
        {
            identity.blocked = true;
            tracing::warn!(
                "Blocking identity {} ({} failures, {:.2} success rate)",
                identity.describe(),
                identity.failure_count,
                identity.success_rate()
            );
        }
    }

    /// Operator reset: clears every blocked flag
    pub fn unblock_all(&mut self) {
        let blocked = self.identities.iter().filter(|i| i.blocked).count();
        for identity in &mut self.identities {
            identity.blocked = false;
        }
        if blocked > 0 {
            tracing::warn!("Operator unblocked {} identities", blocked);
        }
    }

    /// Access an identity by id
    pub fn identity(&self, id: usize) -> Option<&Identity> {
        self.identities.get(id)
    }

    /// Total identities in the pool
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Identities currently selectable
    pub fn available_count(&self) -> usize {
        let now = Instant::now();
        let cooldown = Duration::from_secs(self.config.cooldown_secs);
        self.identities
            .iter()
            .filter(|i| !i.blocked && !i.is_cooling(cooldown, now))
            .count()
    }
}
