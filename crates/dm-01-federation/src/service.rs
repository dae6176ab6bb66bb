//! Federation Service - trust gate for cross-division traffic
//!
//! ## Algorithm
//!
//! 1. Same division: allow unconditionally.
//! 2. No trust entry for (source, target): deny `untrusted_division`.
//! 3. Action not in the entry: deny `action_not_permitted`.
//! 4. Target policy restricts the agent: deny `agent_restricted`.
//! 5. Target policy disables invocation: deny `invocation_disabled`.
//! 6. Source over the target's request budget: deny `rate_limited`.
//! 7. Otherwise allow.
//!
//! Only messages that pass 1-5 consume a rate-limit token.

use crate::domain::{AuthorizationDecision, DenyReason, FederationError, FederationResult};
use crate::ports::inbound::FederationApi;
use crate::ports::outbound::PermissionsProvider;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_types::{RateLimiter, SystemTimeSource, TimeSource, Timestamp, TrustEntry};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

type DivisionPair = (String, String);

fn pair(source: &str, target: &str) -> DivisionPair {
    (source.to_string(), target.to_string())
}

/// Federation Authorizer implementation.
///
/// The trust table is read on every cross-division message and written only
/// by register/unregister, so it sits behind a reader/writer lock.
pub struct FederationAuthorizer<P>
where
    P: PermissionsProvider,
{
    trust: RwLock<HashMap<DivisionPair, TrustEntry>>,
    limiters: Mutex<HashMap<DivisionPair, Arc<RateLimiter>>>,
    permissions: Arc<P>,
    time: Arc<dyn TimeSource>,
}

impl<P> FederationAuthorizer<P>
where
    P: PermissionsProvider,
{
    /// Create an authorizer using the system clock.
    pub fn new(permissions: Arc<P>) -> Self {
        Self::with_time_source(permissions, Arc::new(SystemTimeSource))
    }

    /// Create an authorizer with an explicit clock.
    pub fn with_time_source(permissions: Arc<P>, time: Arc<dyn TimeSource>) -> Self {
        Self {
            trust: RwLock::new(HashMap::new()),
            limiters: Mutex::new(HashMap::new()),
            permissions,
            time,
        }
    }

    /// Number of registered trust relationships.
    pub fn trust_count(&self) -> usize {
        self.trust.read().len()
    }

    /// Take one token from the (source, target) bucket.
    ///
    /// The bucket is rebuilt when the target changes its budget.
    fn consume_budget(&self, key: DivisionPair, per_minute: u64, now: Timestamp) -> bool {
        let limiter = {
            let mut limiters = self.limiters.lock();
            let limiter = limiters
                .entry(key)
                .or_insert_with(|| Arc::new(RateLimiter::per_minute(per_minute, now)));
            if limiter.capacity() != per_minute {
                *limiter = Arc::new(RateLimiter::per_minute(per_minute, now));
            }
            Arc::clone(limiter)
        };
        limiter.try_acquire(now)
    }

    async fn evaluate(
        &self,
        source_division: &str,
        target_division: &str,
        target_agent_id: &str,
        action: &str,
    ) -> FederationResult<(AuthorizationDecision, bool)> {
        if source_division == target_division {
            return Ok((AuthorizationDecision::Allow, false));
        }

        let key = pair(source_division, target_division);
        let entry = self.trust.read().get(&key).cloned();
        let Some(entry) = entry else {
            return Ok((AuthorizationDecision::Deny(DenyReason::UntrustedDivision), false));
        };
        if !entry.permits(action) {
            return Ok((AuthorizationDecision::Deny(DenyReason::ActionNotPermitted), false));
        }

        let Some(policy) = self.permissions.get_permissions(target_division).await? else {
            return Ok((AuthorizationDecision::Allow, false));
        };
        let audit = policy.audit_cross_division_access;

        if policy.is_restricted(target_agent_id) {
            return Ok((AuthorizationDecision::Deny(DenyReason::AgentRestricted), audit));
        }
        if !policy.allow_cross_division_invocation {
            return Ok((AuthorizationDecision::Deny(DenyReason::InvocationDisabled), audit));
        }
        if !self.consume_budget(key, policy.max_requests_per_minute, self.time.now()) {
            return Ok((AuthorizationDecision::Deny(DenyReason::RateLimited), audit));
        }
        Ok((AuthorizationDecision::Allow, audit))
    }
}

#[async_trait]
impl<P> FederationApi for FederationAuthorizer<P>
where
    P: PermissionsProvider + 'static,
{
    async fn authorize(
        &self,
        source_division: &str,
        target_division: &str,
        target_agent_id: &str,
        action: &str,
    ) -> FederationResult<AuthorizationDecision> {
        let (decision, audit) = self
            .evaluate(source_division, target_division, target_agent_id, action)
            .await?;

        if audit {
            info!(
                target: "dm_audit",
                source_division,
                target_division,
                target_agent_id,
                action,
                allowed = decision.is_allowed(),
                reason = decision.deny_reason().map(|r| r.as_str()),
                "Cross-division access"
            );
        }
        if let AuthorizationDecision::Deny(reason) = decision {
            debug!(source_division, target_division, target_agent_id, action, %reason, "Authorization denied");
        }
        Ok(decision)
    }

    fn register_trusted_division(
        &self,
        source_division: &str,
        target_division: &str,
        endpoint: &str,
        permissions: Vec<String>,
    ) -> FederationResult<TrustEntry> {
        let invalid = |reason: &str| FederationError::InvalidTrust {
            source_division: source_division.to_string(),
            target_division: target_division.to_string(),
            reason: reason.to_string(),
        };
        if source_division.trim().is_empty() || target_division.trim().is_empty() {
            return Err(invalid("division ids must not be empty"));
        }
        if source_division == target_division {
            return Err(invalid("a division always trusts itself"));
        }

        let entry = TrustEntry::new(endpoint, permissions, self.time.now());
        self.trust
            .write()
            .insert(pair(source_division, target_division), entry.clone());

        info!(
            source_division,
            target_division,
            endpoint,
            permissions = ?entry.permissions,
            "Trusted division registered"
        );
        Ok(entry)
    }

    fn unregister_trusted_division(&self, source_division: &str, target_division: &str) -> bool {
        let key = pair(source_division, target_division);
        let removed = self.trust.write().remove(&key).is_some();
        self.limiters.lock().remove(&key);
        if removed {
            info!(source_division, target_division, "Trusted division unregistered");
        }
        removed
    }

    fn trust_entry(&self, source_division: &str, target_division: &str) -> Option<TrustEntry> {
        self.trust
            .read()
            .get(&pair(source_division, target_division))
            .cloned()
    }

    fn trusted_divisions(&self, target_division: &str) -> Vec<(String, TrustEntry)> {
        let mut trusted: Vec<_> = self
            .trust
            .read()
            .iter()
            .filter(|((_, target), _)| target == target_division)
            .map(|((source, _), entry)| (source.clone(), entry.clone()))
            .collect();
        trusted.sort_by(|a, b| a.0.cmp(&b.0));
        trusted
    }
}
