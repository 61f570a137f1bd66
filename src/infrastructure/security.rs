//! Static token screen: configured denylist plus the zero address

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::warn;

use crate::domain::external::SecurityChecker;
use crate::shared::errors::AppError;
use crate::shared::types::{Address, AddressExt};

pub struct DenylistSecurityChecker {
    denied: HashSet<Address>,
    /// Base asset and other tokens that are never entry candidates
    reserved: HashSet<Address>,
}

impl DenylistSecurityChecker {
    pub fn new(denylist: &[Address], reserved: &[Address]) -> Self {
        Self {
            denied: denylist.iter().copied().collect(),
            reserved: reserved.iter().copied().collect(),
        }
    }
}

#[async_trait]
impl SecurityChecker for DenylistSecurityChecker {
    async fn is_safe(&self, token: Address) -> Result<bool, AppError> {
        if token.is_zero() || self.reserved.contains(&token) {
            warn!("⚠️ {} is not a tradable candidate", token.short());
            return Ok(false);
        }
        if self.denied.contains(&token) {
            warn!("🚫 {} is denylisted", token.short());
            return Ok(false);
        }
        Ok(true)
    }
}
