//! Candidate selection for the pairing queues
//!
//! Matching is deliberately one-sided and runs from the joiner's point of
//! view: "find someone who is waiting for what I am". A joiner with a
//! specific preference draws from the `any` queue plus the queue named after
//! the joiner's own gender, because the users in that queue asked for exactly
//! this gender. A joiner with preference `any` takes the first waiting user
//! from any queue. The candidate's own gender is never inspected.

use crate::protocol::messages::{ConnectionId, Gender, Preference};

use super::queues::PreferenceQueues;

/// Pick a waiting partner for a joining user, oldest entry first.
///
/// Returns `None` when nobody eligible is waiting; the caller then enqueues
/// the joiner instead.
pub fn find_candidate(
    queues: &PreferenceQueues,
    joiner: &ConnectionId,
    joiner_gender: Gender,
    preference: Preference,
) -> Option<ConnectionId> {
    let pools: &[Preference] = match preference {
        Preference::Any => &[Preference::Any, Preference::Male, Preference::Female],
        Preference::Male | Preference::Female => match joiner_gender {
            Gender::Male => &[Preference::Any, Preference::Male],
            Gender::Female => &[Preference::Any, Preference::Female],
            // No queue is named after an unspecified gender
            Gender::Unspecified => &[Preference::Any],
        },
    };

    for pool in pools {
        for entry in queues.entries(*pool) {
            if entry.connection_id != *joiner {
                return Some(entry.connection_id.clone());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(s: &str) -> ConnectionId {
        s.to_string()
    }

    #[test]
    fn test_empty_queues_yield_nothing() {
        let queues = PreferenceQueues::new();
        assert!(find_candidate(&queues, &conn("c-1"), Gender::Male, Preference::Any).is_none());
    }

    #[test]
    fn test_any_preference_takes_oldest_across_queues() {
        let mut queues = PreferenceQueues::new();
        queues.enqueue(&conn("c-male"), Preference::Male);
        queues.enqueue(&conn("c-any"), Preference::Any);

        // Any queue is scanned before male and female
        let found =
            find_candidate(&queues, &conn("c-joiner"), Gender::Unspecified, Preference::Any);
        assert_eq!(found, Some(conn("c-any")));
    }

    #[test]
    fn test_specific_preference_uses_own_gender_queue() {
        let mut queues = PreferenceQueues::new();
        // c-wants-male asked for a male partner
        queues.enqueue(&conn("c-wants-male"), Preference::Male);

        // A male joiner with a specific preference draws from the male queue
        let found =
            find_candidate(&queues, &conn("c-joiner"), Gender::Male, Preference::Female);
        assert_eq!(found, Some(conn("c-wants-male")));

        // A female joiner does not
        let found =
            find_candidate(&queues, &conn("c-joiner"), Gender::Female, Preference::Female);
        assert_eq!(found, None);
    }

    #[test]
    fn test_matching_is_one_sided() {
        let mut queues = PreferenceQueues::new();
        // Waiting user asked for a female partner
        queues.enqueue(&conn("c-wants-female"), Preference::Female);

        // A male joiner asking for a female does not see them: the waiting
        // user's queue is not named after the joiner's gender
        let found =
            find_candidate(&queues, &conn("c-male"), Gender::Male, Preference::Female);
        assert_eq!(found, None);

        // A female joiner does, whatever she asked for
        let found = find_candidate(&queues, &conn("c-female"), Gender::Female, Preference::Male);
        assert_eq!(found, Some(conn("c-wants-female")));
    }

    #[test]
    fn test_unspecified_gender_with_specific_preference() {
        let mut queues = PreferenceQueues::new();
        queues.enqueue(&conn("c-male-q"), Preference::Male);
        queues.enqueue(&conn("c-any-q"), Preference::Any);

        // Only the any queue is eligible
        let found = find_candidate(
            &queues,
            &conn("c-joiner"),
            Gender::Unspecified,
            Preference::Male,
        );
        assert_eq!(found, Some(conn("c-any-q")));
    }

    #[test]
    fn test_any_joiner_reaches_specific_queues() {
        let mut queues = PreferenceQueues::new();
        // Waiting user asked for a male partner
        queues.enqueue(&conn("c-wants-male"), Preference::Male);

        // A joiner with preference any scans every queue
        let found = find_candidate(&queues, &conn("c-joiner"), Gender::Male, Preference::Any);
        assert_eq!(found, Some(conn("c-wants-male")));
    }

    #[test]
    fn test_never_matches_self() {
        let mut queues = PreferenceQueues::new();
        queues.enqueue(&conn("c-1"), Preference::Any);

        let found = find_candidate(&queues, &conn("c-1"), Gender::Male, Preference::Any);
        assert_eq!(found, None);
    }

    #[test]
    fn test_fifo_within_pool() {
        let mut queues = PreferenceQueues::new();
        queues.enqueue(&conn("c-old"), Preference::Any);
        queues.enqueue(&conn("c-new"), Preference::Any);

        let found = find_candidate(&queues, &conn("c-joiner"), Gender::Female, Preference::Any);
        assert_eq!(found, Some(conn("c-old")));
    }
}
