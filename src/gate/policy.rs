//! Pure gating policies.
//!
//! Every enforcement point goes through [`decide`] so the activation, route
//! and bypass rules cannot drift apart. All functions here are synchronous
//! and free of I/O.

use chrono::{DateTime, Utc};

use crate::gate::settings::MaintenanceSettings;

/// Paths reachable regardless of maintenance state. Exact matches only, and
/// checked before the blocked prefixes, so an exact entry wins even when a
/// blocked prefix would also match.
pub const ALWAYS_ALLOWED: &[&str] = &["/", "/auth", "/admin", "/health", "/ready"];

/// Path prefixes reachable only while maintenance is inactive or the actor
/// may bypass it.
pub const BLOCKED_PREFIXES: &[&str] = &[
    "/shop",
    "/product/",
    "/cart",
    "/checkout",
    "/orders",
    "/account",
    "/payment-success",
    "/finish-payment",
    "/payment-error",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Admin,
    Customer,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Self::Admin),
            "customer" => Some(Self::Customer),
            _ => None,
        }
    }
}

/// The requesting actor as the gate sees it. `preview_requested` is set by
/// the `?test_maintenance=true` query parameter and forces the notice even
/// for privileged roles, so the notice can be verified while logged in.
#[derive(Clone, Debug, Default)]
pub struct Actor {
    pub role: Option<Role>,
    pub preview_requested: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    ShowNotice,
}

/// Whether the maintenance window covers `now`.
///
/// The window is half-open: active on `[starts_at, ends_at)`, inactive at
/// `ends_at` itself. A missing start means the window opened the moment the
/// switch was enabled; a missing end means it never closes on its own. An
/// inverted window (`starts_at > ends_at`) is an empty interval and is never
/// active.
pub fn is_active(settings: &MaintenanceSettings, now: DateTime<Utc>) -> bool {
    if !settings.enabled {
        return false;
    }
    let Some(start) = settings.starts_at else {
        return true;
    };
    if now < start {
        return false;
    }
    match settings.ends_at {
        None => true,
        Some(end) => now < end,
    }
}

/// Whether `path` belongs to the conditionally blocked surface. Paths on
/// neither list are allowed, so routes added without updating the tables do
/// not silently go dark.
pub fn is_blocked(path: &str) -> bool {
    classify(path, ALWAYS_ALLOWED, BLOCKED_PREFIXES)
}

fn classify(path: &str, allowed: &[&str], blocked: &[&str]) -> bool {
    if allowed.contains(&path) {
        return false;
    }
    blocked.iter().any(|prefix| path.starts_with(prefix))
}

pub fn can_bypass(actor: &Actor) -> bool {
    if actor.preview_requested {
        return false;
    }
    actor.role == Some(Role::Admin)
}

/// Single verdict for a request: the notice is shown iff the window is
/// active, the path is blocked, and the actor cannot bypass.
pub fn decide(
    settings: &MaintenanceSettings,
    path: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Verdict {
    if is_active(settings, now) && is_blocked(path) && !can_bypass(actor) {
        Verdict::ShowNotice
    } else {
        Verdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings(enabled: bool, starts_at: Option<&str>, ends_at: Option<&str>) -> MaintenanceSettings {
        MaintenanceSettings {
            enabled,
            starts_at: starts_at.map(|s| s.parse().unwrap()),
            ends_at: ends_at.map(|s| s.parse().unwrap()),
            ..MaintenanceSettings::fail_open()
        }
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn disabled_is_never_active() {
        let s = settings(false, None, None);
        assert!(!is_active(&s, Utc::now()));
    }

    #[test]
    fn enabled_without_bounds_is_active() {
        let s = settings(true, None, None);
        assert!(is_active(&s, Utc::now()));
    }

    #[test]
    fn window_is_half_open() {
        let s = settings(true, Some("2024-01-01T00:00:00Z"), Some("2024-01-02T00:00:00Z"));
        assert!(!is_active(&s, at("2023-12-31T23:59:59Z")));
        assert!(is_active(&s, at("2024-01-01T00:00:00Z")));
        assert!(is_active(&s, at("2024-01-01T23:59:59Z")));
        assert!(!is_active(&s, at("2024-01-02T00:00:00Z")));
        assert!(!is_active(&s, at("2024-01-03T00:00:00Z")));
    }

    #[test]
    fn open_ended_window_stays_active() {
        let s = settings(true, Some("2024-01-01T00:00:00Z"), None);
        assert!(is_active(&s, at("2030-01-01T00:00:00Z")));
    }

    #[test]
    fn inverted_window_is_never_active() {
        let s = settings(true, Some("2024-01-02T00:00:00Z"), Some("2024-01-01T00:00:00Z"));
        assert!(!is_active(&s, at("2023-12-31T00:00:00Z")));
        assert!(!is_active(&s, at("2024-01-01T12:00:00Z")));
        assert!(!is_active(&s, at("2024-01-03T00:00:00Z")));
    }

    #[test]
    fn route_tables_classify_as_shipped() {
        assert!(!is_blocked("/"));
        assert!(!is_blocked("/auth"));
        assert!(!is_blocked("/admin"));
        assert!(is_blocked("/cart"));
        assert!(is_blocked("/cart/abc123"));
        assert!(is_blocked("/product/42"));
        assert!(is_blocked("/checkout"));
    }

    #[test]
    fn exact_allow_list_wins_over_prefix_match() {
        // A path on both surfaces resolves to allowed: the exact list is
        // checked first.
        assert!(!classify("/cart", &["/cart"], &["/cart"]));
        assert!(classify("/cart/abc", &["/cart"], &["/cart"]));
    }

    #[test]
    fn unlisted_paths_default_to_allowed() {
        assert!(!is_blocked("/admin/products"));
        assert!(!is_blocked("/payments/webhook"));
        assert!(!is_blocked("/completely-unknown"));
    }

    #[test]
    fn bypass_truth_table() {
        let admin = Actor { role: Some(Role::Admin), preview_requested: false };
        let admin_preview = Actor { role: Some(Role::Admin), preview_requested: true };
        let customer = Actor { role: Some(Role::Customer), preview_requested: false };
        let anonymous = Actor::default();
        assert!(can_bypass(&admin));
        assert!(!can_bypass(&admin_preview));
        assert!(!can_bypass(&customer));
        assert!(!can_bypass(&anonymous));
    }

    #[test]
    fn blocked_path_during_open_window_shows_notice() {
        let s = settings(true, None, None);
        let verdict = decide(&s, "/cart", &Actor::default(), Utc::now());
        assert_eq!(verdict, Verdict::ShowNotice);
    }

    #[test]
    fn expired_window_allows_blocked_path() {
        let s = settings(true, Some("2024-01-01T00:00:00Z"), Some("2024-01-02T00:00:00Z"));
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        assert_eq!(decide(&s, "/shop", &Actor::default(), now), Verdict::Allow);
    }

    #[test]
    fn disabled_allows_regardless_of_actor() {
        let s = settings(false, None, None);
        assert_eq!(decide(&s, "/checkout", &Actor::default(), Utc::now()), Verdict::Allow);
    }

    #[test]
    fn allowed_route_wins_even_without_bypass() {
        let s = settings(true, None, None);
        let customer = Actor { role: Some(Role::Customer), preview_requested: false };
        assert_eq!(decide(&s, "/admin", &customer, Utc::now()), Verdict::Allow);
    }

    #[test]
    fn admin_bypasses_but_preview_overrides() {
        let s = settings(true, None, None);
        let admin = Actor { role: Some(Role::Admin), preview_requested: false };
        let preview = Actor { role: Some(Role::Admin), preview_requested: true };
        assert_eq!(decide(&s, "/orders", &admin, Utc::now()), Verdict::Allow);
        assert_eq!(decide(&s, "/orders", &preview, Utc::now()), Verdict::ShowNotice);
    }
}
