//! Canonical status derivation for access links.
//!
//! This is the single source of truth for a link's status. Every code path
//! that needs to know whether a link is usable derives it from here; the
//! persisted status column is a cache of this function's last result.

use chrono::{DateTime, Utc};

use crate::link::AccessLink;
use crate::types::{InactiveReason, LinkStatus};

/// Derive the canonical status for a link at `now`. First match wins:
///
/// 1. Manually disabled links stay disabled until explicitly enabled.
/// 2. Deleted links are frozen; no recalculation applies.
/// 3. Before `active_on` the link is not yet active.
/// 4. Past `expiration` the link is expired.
/// 5. With `max_uses` reached the link is exhausted.
/// 6. Otherwise the link is active.
///
/// Pure: no side effects, no ambient clock. The caller persists and audits
/// the result only if it differs from the stored status.
#[must_use]
pub fn calculate(link: &AccessLink, now: DateTime<Utc>) -> LinkStatus {
    if link.status.is_disabled() {
        return LinkStatus::Disabled;
    }

    if link.status.is_deleted() {
        return LinkStatus::Deleted;
    }

    if let Some(active_on) = link.active_on {
        if now < active_on {
            return LinkStatus::Inactive(InactiveReason::NotYetActive);
        }
    }

    if let Some(expiration) = link.expiration {
        if now > expiration {
            return LinkStatus::Inactive(InactiveReason::Expired);
        }
    }

    if let Some(max_uses) = link.max_uses {
        if link.granted_count >= max_uses {
            return LinkStatus::Inactive(InactiveReason::Exhausted);
        }
    }

    LinkStatus::Active
}

/// Recompute the status, returning it only when it differs from the stored
/// one.
#[must_use]
pub fn recalculate(link: &AccessLink, now: DateTime<Utc>) -> Option<LinkStatus> {
    let computed = calculate(link, now);
    (computed != link.status).then_some(computed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::link::AccessLink;
    use crate::types::{Actor, LinkId, LinkPurpose};

    fn base_link(now: DateTime<Utc>) -> AccessLink {
        AccessLink {
            id: LinkId::new(),
            name: "Front gate".to_string(),
            notes: None,
            purpose: LinkPurpose::Other,
            code: "A1B2C3D4".to_string(),
            status: LinkStatus::Active,
            active_on: None,
            expiration: None,
            max_uses: None,
            granted_count: 0,
            denied_count: 0,
            last_granted_at: None,
            deleted_at: None,
            auto_open: false,
            owner: Actor::new("operator"),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unconstrained_link_is_active() {
        let now = Utc::now();
        assert_eq!(calculate(&base_link(now), now), LinkStatus::Active);
    }

    #[test]
    fn disabled_override_beats_every_other_rule() {
        let now = Utc::now();
        let mut link = base_link(now);
        link.status = LinkStatus::Disabled;
        link.expiration = Some(now - Duration::hours(1));
        link.max_uses = Some(0);

        assert_eq!(calculate(&link, now), LinkStatus::Disabled);
    }

    #[test]
    fn deleted_is_terminal_regardless_of_other_fields() {
        let now = Utc::now();
        let mut link = base_link(now);
        link.status = LinkStatus::Deleted;
        link.deleted_at = Some(now);
        link.active_on = Some(now - Duration::hours(1));
        link.expiration = Some(now + Duration::hours(1));

        assert_eq!(calculate(&link, now), LinkStatus::Deleted);
        assert_eq!(
            calculate(&link, now + Duration::days(365)),
            LinkStatus::Deleted
        );
    }

    #[test]
    fn future_activation_wins_over_expiration() {
        let now = Utc::now();
        let mut link = base_link(now);
        link.active_on = Some(now + Duration::hours(1));
        link.expiration = Some(now - Duration::hours(1));

        assert_eq!(
            calculate(&link, now),
            LinkStatus::Inactive(InactiveReason::NotYetActive)
        );
    }

    #[test]
    fn activation_boundary_is_inclusive() {
        let now = Utc::now();
        let mut link = base_link(now);
        link.active_on = Some(now);

        assert_eq!(calculate(&link, now), LinkStatus::Active);
    }

    #[test]
    fn expiration_boundary_is_inclusive() {
        let now = Utc::now();
        let mut link = base_link(now);
        link.expiration = Some(now);

        assert_eq!(calculate(&link, now), LinkStatus::Active);
        assert_eq!(
            calculate(&link, now + Duration::seconds(1)),
            LinkStatus::Inactive(InactiveReason::Expired)
        );
    }

    #[test]
    fn exhaustion_at_and_past_the_limit() {
        let now = Utc::now();
        let mut link = base_link(now);
        link.max_uses = Some(2);
        link.granted_count = 1;
        assert_eq!(calculate(&link, now), LinkStatus::Active);

        link.granted_count = 2;
        assert_eq!(
            calculate(&link, now),
            LinkStatus::Inactive(InactiveReason::Exhausted)
        );

        link.granted_count = 3;
        assert_eq!(
            calculate(&link, now),
            LinkStatus::Inactive(InactiveReason::Exhausted)
        );
    }

    #[test]
    fn zero_max_uses_is_exhausted_from_the_start() {
        let now = Utc::now();
        let mut link = base_link(now);
        link.max_uses = Some(0);

        assert_eq!(
            calculate(&link, now),
            LinkStatus::Inactive(InactiveReason::Exhausted)
        );
    }

    #[test]
    fn recalculate_returns_only_changes() {
        let now = Utc::now();
        let mut link = base_link(now);
        assert_eq!(recalculate(&link, now), None);

        link.expiration = Some(now - Duration::minutes(5));
        assert_eq!(
            recalculate(&link, now),
            Some(LinkStatus::Inactive(InactiveReason::Expired))
        );

        link.status = LinkStatus::Inactive(InactiveReason::Expired);
        assert_eq!(recalculate(&link, now), None);
    }
}
