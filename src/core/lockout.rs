// src/core/lockout.rs

use chrono::{DateTime, Duration, Utc};

use crate::config::AuthPolicy;
use crate::models::user::{STATUS_ACTIVE, User};

/// Result of evaluating one authentication attempt.
///
/// All variants except storage faults are expected, recoverable outcomes:
/// the caller branches on the tag, it never re-derives counters itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    /// Unknown username. Must be presented to clients with the same message
    /// as `InvalidSecret` so usernames cannot be enumerated.
    NotFound,
    /// Account is suspended or disabled; checked before any counter logic.
    Disabled { status: String },
    /// Lockout window still open. Minutes are truncated for display.
    Locked { remaining_minutes: i64 },
    /// Wrong password, account not (yet) locked.
    InvalidSecret { remaining_attempts: i32 },
    /// This attempt crossed the threshold and created the lock.
    LockedJustNow { lockout_minutes: i64 },
}

/// Counter/lock mutation produced by an evaluation.
///
/// `expected_*` carry the values read when the decision was made; the store
/// applies the update only if the row still matches them (optimistic CAS).
/// Zero rows updated means a concurrent attempt won the race and the whole
/// evaluation must be retried, otherwise two simultaneous failures could
/// both apply non-locking counts and sneak past the attempt limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialUpdate {
    pub failed_login_count: i32,
    pub locked_until: Option<DateTime<Utc>>,
    /// Set on success only; stored into `last_login`.
    pub record_login_at: Option<DateTime<Utc>>,

    pub expected_failed_count: i32,
    pub expected_locked_until: Option<DateTime<Utc>>,
}

/// Outcome plus the update the caller must apply atomically with the read
/// that produced `credential`. `update` is `None` when nothing changes
/// (unknown user, disabled account, attempt inside an open lock window).
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub outcome: LoginOutcome,
    pub update: Option<CredentialUpdate>,
}

/// Evaluates an authentication attempt against the stored counters and lock
/// state. Pure: reads `now` from the caller, touches no storage.
///
/// The per-credential states are derived, not stored: a row is "locked"
/// exactly while `locked_until > now`. Lock expiry is lazy; the first
/// evaluation at or past `locked_until` proceeds from a zero counter and its
/// update clears the lock, so no background sweep is needed.
pub fn evaluate(
    credential: Option<&User>,
    secret_ok: bool,
    now: DateTime<Utc>,
    policy: &AuthPolicy,
) -> Evaluation {
    let Some(user) = credential else {
        return Evaluation {
            outcome: LoginOutcome::NotFound,
            update: None,
        };
    };

    if user.status != STATUS_ACTIVE {
        return Evaluation {
            outcome: LoginOutcome::Disabled {
                status: user.status.clone(),
            },
            update: None,
        };
    }

    let expected_failed_count = user.failed_login_count;
    let expected_locked_until = user.locked_until;

    // Lock window check; an attempt while locked never touches the counter.
    let mut failed_count = user.failed_login_count;
    if let Some(locked_until) = user.locked_until {
        if now < locked_until {
            return Evaluation {
                outcome: LoginOutcome::Locked {
                    remaining_minutes: (locked_until - now).num_minutes(),
                },
                update: None,
            };
        }
        // Lock expired: this same evaluation restarts from a clean counter.
        failed_count = 0;
    }

    if secret_ok {
        return Evaluation {
            outcome: LoginOutcome::Success,
            update: Some(CredentialUpdate {
                failed_login_count: 0,
                locked_until: None,
                record_login_at: Some(now),
                expected_failed_count,
                expected_locked_until,
            }),
        };
    }

    let new_failed_count = failed_count + 1;
    if new_failed_count >= policy.max_login_attempts {
        Evaluation {
            outcome: LoginOutcome::LockedJustNow {
                lockout_minutes: policy.lockout_minutes,
            },
            update: Some(CredentialUpdate {
                failed_login_count: new_failed_count,
                locked_until: Some(now + Duration::minutes(policy.lockout_minutes)),
                record_login_at: None,
                expected_failed_count,
                expected_locked_until,
            }),
        }
    } else {
        Evaluation {
            outcome: LoginOutcome::InvalidSecret {
                remaining_attempts: policy.max_login_attempts - new_failed_count,
            },
            update: Some(CredentialUpdate {
                failed_login_count: new_failed_count,
                locked_until: None,
                record_login_at: None,
                expected_failed_count,
                expected_locked_until,
            }),
        }
    }
}

impl LoginOutcome {
    /// 'success' or 'failed', for the attempt ledger.
    pub fn ledger_tag(&self) -> &'static str {
        match self {
            LoginOutcome::Success => "success",
            _ => "failed",
        }
    }

    /// Free-text reason stored in the attempt ledger. Detailed here on
    /// purpose; the client-facing message is built separately.
    pub fn ledger_reason(&self) -> Option<String> {
        match self {
            LoginOutcome::Success => None,
            LoginOutcome::NotFound => Some("user not found".to_string()),
            LoginOutcome::Disabled { status } => Some(format!("account status: {}", status)),
            LoginOutcome::Locked { remaining_minutes } => {
                Some(format!("account locked ({} minutes left)", remaining_minutes))
            }
            LoginOutcome::InvalidSecret { remaining_attempts } => Some(format!(
                "invalid password ({} attempts left)",
                remaining_attempts
            )),
            LoginOutcome::LockedJustNow { lockout_minutes } => Some(format!(
                "invalid password - account locked for {} minutes",
                lockout_minutes
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy(max: i32, minutes: i64) -> AuthPolicy {
        AuthPolicy {
            max_login_attempts: max,
            lockout_minutes: minutes,
        }
    }

    fn user(failed: i32, locked_until: Option<DateTime<Utc>>) -> User {
        User {
            id: 1,
            username: "alice".to_string(),
            password_hash: "hash".to_string(),
            email: None,
            full_name: None,
            role: "student".to_string(),
            status: STATUS_ACTIVE.to_string(),
            failed_login_count: failed,
            locked_until,
            created_at: None,
            last_login: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn unknown_user_is_not_found_with_no_update() {
        let eval = evaluate(None, false, t0(), &policy(5, 30));
        assert_eq!(eval.outcome, LoginOutcome::NotFound);
        assert!(eval.update.is_none());
    }

    #[test]
    fn disabled_status_short_circuits_even_with_correct_password() {
        let mut u = user(0, None);
        u.status = "suspended".to_string();
        let eval = evaluate(Some(&u), true, t0(), &policy(5, 30));
        assert_eq!(
            eval.outcome,
            LoginOutcome::Disabled {
                status: "suspended".to_string()
            }
        );
        assert!(eval.update.is_none());
    }

    #[test]
    fn wrong_password_counts_down_remaining_attempts() {
        let p = policy(5, 30);
        for n in 0..4 {
            let u = user(n, None);
            let eval = evaluate(Some(&u), false, t0(), &p);
            assert_eq!(
                eval.outcome,
                LoginOutcome::InvalidSecret {
                    remaining_attempts: 5 - (n + 1)
                }
            );
            let update = eval.update.unwrap();
            assert_eq!(update.failed_login_count, n + 1);
            assert_eq!(update.locked_until, None);
            assert_eq!(update.expected_failed_count, n);
        }
    }

    #[test]
    fn reaching_the_limit_locks_for_the_configured_window() {
        let p = policy(3, 30);
        let u = user(2, None);
        let eval = evaluate(Some(&u), false, t0(), &p);
        assert_eq!(
            eval.outcome,
            LoginOutcome::LockedJustNow {
                lockout_minutes: 30
            }
        );
        let update = eval.update.unwrap();
        assert_eq!(update.failed_login_count, 3);
        assert_eq!(update.locked_until, Some(t0() + Duration::minutes(30)));
    }

    #[test]
    fn locked_account_rejects_even_the_correct_password() {
        // 3 wrong attempts at t0, then the right password one minute later.
        let p = policy(3, 30);
        let locked = user(3, Some(t0() + Duration::minutes(30)));
        let one_minute_later = t0() + Duration::minutes(1);

        let eval = evaluate(Some(&locked), true, one_minute_later, &p);
        assert_eq!(
            eval.outcome,
            LoginOutcome::Locked {
                remaining_minutes: 29
            }
        );
        // Already locked: no further increment, no update at all.
        assert!(eval.update.is_none());
    }

    #[test]
    fn lock_expiry_resets_the_counter_before_evaluating() {
        let p = policy(3, 30);
        let locked = user(3, Some(t0() + Duration::minutes(30)));
        let after_expiry = t0() + Duration::minutes(30);

        // Wrong password right at expiry: counter restarts from zero.
        let eval = evaluate(Some(&locked), false, after_expiry, &p);
        assert_eq!(
            eval.outcome,
            LoginOutcome::InvalidSecret {
                remaining_attempts: 2
            }
        );
        let update = eval.update.unwrap();
        assert_eq!(update.failed_login_count, 1);
        assert_eq!(update.locked_until, None);
        // CAS expectations still reflect the values actually read.
        assert_eq!(update.expected_failed_count, 3);
        assert!(update.expected_locked_until.is_some());
    }

    #[test]
    fn lock_expiry_is_idempotent_for_a_successful_login() {
        let p = policy(3, 30);
        let locked = user(3, Some(t0() + Duration::minutes(30)));
        let later = t0() + Duration::hours(2);

        let eval = evaluate(Some(&locked), true, later, &p);
        assert_eq!(eval.outcome, LoginOutcome::Success);
        let update = eval.update.unwrap();
        assert_eq!(update.failed_login_count, 0);
        assert_eq!(update.locked_until, None);
        assert_eq!(update.record_login_at, Some(later));
    }

    #[test]
    fn success_resets_counter_and_clears_lock() {
        let p = policy(5, 30);
        let u = user(4, None);
        let eval = evaluate(Some(&u), true, t0(), &p);
        assert_eq!(eval.outcome, LoginOutcome::Success);
        let update = eval.update.unwrap();
        assert_eq!(update.failed_login_count, 0);
        assert_eq!(update.locked_until, None);
        assert_eq!(update.record_login_at, Some(t0()));
    }
}
