// src/core/session.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One in-progress timed quiz attempt for a (user, course) pair.
///
/// `started_at` is fixed at creation from the server clock and is the only
/// source of elapsed time; a client-reported timer is never consulted.
/// `time_limit_seconds` is copied from the course at start, so editing the
/// course later cannot stretch or shrink an attempt already underway.
///
/// Expiry is cooperative: it is discovered the next time the session is
/// touched (poll, answer or submit), not by a background task. A session the
/// user never revisits stays "in progress" until a new start overwrites it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSession {
    pub user_id: i64,
    pub course_id: i64,
    pub question_ids: Vec<i64>,
    pub started_at: DateTime<Utc>,
    pub time_limit_seconds: i64,

    /// question id -> selected letters. Mutable until submission.
    pub answers: HashMap<i64, Vec<String>>,

    /// Set once by the submission that wins the freeze; answers are frozen
    /// from then on.
    pub submitted: bool,
}

/// Expected, recoverable failures when touching a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    Expired,
    AlreadySubmitted,
    UnknownQuestion(i64),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Expired => write!(f, "quiz time limit exceeded"),
            SessionError::AlreadySubmitted => write!(f, "quiz already submitted"),
            SessionError::UnknownQuestion(id) => {
                write!(f, "question {} is not part of this quiz", id)
            }
        }
    }
}

impl std::error::Error for SessionError {}

impl QuizSession {
    pub fn start(
        user_id: i64,
        course_id: i64,
        question_ids: Vec<i64>,
        time_limit_seconds: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            course_id,
            question_ids,
            started_at: now,
            time_limit_seconds,
            answers: HashMap::new(),
            submitted: false,
        }
    }

    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds()
    }

    /// May go negative once the deadline has passed; display code clamps.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        self.time_limit_seconds - self.elapsed_seconds(now)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining_seconds(now) <= 0
    }

    /// Records (or replaces) the selection for one question.
    /// Rejected without mutating once submitted or past the deadline.
    pub fn record_answer(
        &mut self,
        question_id: i64,
        selected_letters: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if self.submitted {
            return Err(SessionError::AlreadySubmitted);
        }
        if self.is_expired(now) {
            return Err(SessionError::Expired);
        }
        if !self.question_ids.contains(&question_id) {
            return Err(SessionError::UnknownQuestion(question_id));
        }
        self.answers.insert(question_id, selected_letters);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn session() -> QuizSession {
        QuizSession::start(7, 3, vec![1, 2, 3], 300, t0())
    }

    #[test]
    fn remaining_time_is_non_increasing() {
        let s = session();
        let mut last = s.remaining_seconds(t0());
        for secs in [1, 60, 299, 300, 301, 500] {
            let remaining = s.remaining_seconds(t0() + Duration::seconds(secs));
            assert!(remaining <= last);
            last = remaining;
        }
    }

    #[test]
    fn expires_exactly_when_remaining_hits_zero_and_stays_expired() {
        let s = session();
        assert!(!s.is_expired(t0() + Duration::seconds(299)));
        assert!(s.is_expired(t0() + Duration::seconds(300)));
        assert!(s.is_expired(t0() + Duration::seconds(301)));
        assert!(s.is_expired(t0() + Duration::hours(5)));
    }

    #[test]
    fn answers_can_be_recorded_and_replaced_before_the_deadline() {
        let mut s = session();
        s.record_answer(1, vec!["A".to_string()], t0() + Duration::seconds(10))
            .unwrap();
        s.record_answer(1, vec!["B".to_string()], t0() + Duration::seconds(20))
            .unwrap();
        assert_eq!(s.answers[&1], vec!["B".to_string()]);
    }

    #[test]
    fn answer_past_the_deadline_is_rejected_without_mutation() {
        let mut s = session();
        s.record_answer(1, vec!["A".to_string()], t0() + Duration::seconds(5))
            .unwrap();

        // 300 second limit, touched at +301s.
        let result = s.record_answer(
            2,
            vec!["C".to_string()],
            t0() + Duration::seconds(301),
        );
        assert_eq!(result, Err(SessionError::Expired));
        assert_eq!(s.answers.len(), 1);
        assert_eq!(s.answers[&1], vec!["A".to_string()]);
    }

    #[test]
    fn frozen_session_rejects_further_answers() {
        let mut s = session();
        s.submitted = true;
        let result = s.record_answer(1, vec!["A".to_string()], t0() + Duration::seconds(1));
        assert_eq!(result, Err(SessionError::AlreadySubmitted));
        assert!(s.answers.is_empty());
    }

    #[test]
    fn unknown_question_is_rejected() {
        let mut s = session();
        let result = s.record_answer(99, vec!["A".to_string()], t0() + Duration::seconds(1));
        assert_eq!(result, Err(SessionError::UnknownQuestion(99)));
    }
}
