//! Identity rotation: network egress points paired with header profiles
//!
//! The remote source fingerprints clients, so each identity presents a
//! consistent pairing of egress (direct or proxy) and browser headers, and
//! the pool rotates between them under cooldown and blocking rules.

mod headers;
mod pool;

pub use headers::{profile_by_name, random_profile, BrowsingSession, HeaderProfile, PROFILES};
pub use pool::{Egress, Identity, IdentityPool};
