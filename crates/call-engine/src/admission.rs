//! Admission control seam
//!
//! Pre-setup policy gate consulted before any resources are allocated for
//! an internal call. The rule tables themselves (schedules, holiday lists,
//! VIP numbers) live behind this trait in an external collaborator; the
//! engine only composes the boolean answers.

use async_trait::async_trait;

use crate::error::Result;

/// Rule categories the gate understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    /// Is the current time inside the service schedule?
    Schedule,
    /// Is today a holiday?
    Holiday,
    /// Is the given number a VIP?
    Vip,
}

/// External admission-control collaborator
#[async_trait]
pub trait AdmissionControl: Send + Sync {
    /// Evaluate one rule; `value` carries the subject where the rule needs
    /// one (e.g. the calling number for a VIP lookup)
    async fn check_rule(&self, rule: RuleType, value: Option<&str>) -> Result<bool>;
}

/// Gate that admits everything; the default for deployments without rule
/// tables and for tests
pub struct AllowAll;

#[async_trait]
impl AdmissionControl for AllowAll {
    async fn check_rule(&self, rule: RuleType, _value: Option<&str>) -> Result<bool> {
        // Not a holiday, not a VIP, always inside the schedule
        Ok(matches!(rule, RuleType::Schedule))
    }
}

/// Canonical gate composition for internal calls
///
/// VIP callers are always admitted; otherwise holidays deny and the
/// schedule decides.
pub async fn admit_internal_call(
    gate: &dyn AdmissionControl,
    ani: &str,
) -> Result<bool> {
    if gate.check_rule(RuleType::Vip, Some(ani)).await? {
        return Ok(true);
    }
    if gate.check_rule(RuleType::Holiday, None).await? {
        return Ok(false);
    }
    gate.check_rule(RuleType::Schedule, None).await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        vip: bool,
        holiday: bool,
        schedule: bool,
    }

    #[async_trait]
    impl AdmissionControl for Scripted {
        async fn check_rule(&self, rule: RuleType, _value: Option<&str>) -> Result<bool> {
            Ok(match rule {
                RuleType::Vip => self.vip,
                RuleType::Holiday => self.holiday,
                RuleType::Schedule => self.schedule,
            })
        }
    }

    #[tokio::test]
    async fn vip_overrides_holiday() {
        let gate = Scripted { vip: true, holiday: true, schedule: false };
        assert!(admit_internal_call(&gate, "1002").await.unwrap());
    }

    #[tokio::test]
    async fn holiday_denies_non_vip() {
        let gate = Scripted { vip: false, holiday: true, schedule: true };
        assert!(!admit_internal_call(&gate, "1002").await.unwrap());
    }

    #[tokio::test]
    async fn schedule_decides_ordinary_days() {
        let open = Scripted { vip: false, holiday: false, schedule: true };
        let closed = Scripted { vip: false, holiday: false, schedule: false };
        assert!(admit_internal_call(&open, "1002").await.unwrap());
        assert!(!admit_internal_call(&closed, "1002").await.unwrap());
    }
}
