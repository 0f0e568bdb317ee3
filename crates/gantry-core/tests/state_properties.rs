//! Property tests for the job lifecycle state machine.

use gantry_core::{Job, JobId, JobState};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Enqueue,
    Start,
    Finish,
    Fail,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Enqueue),
        Just(Op::Start),
        Just(Op::Finish),
        Just(Op::Fail),
    ]
}

fn apply(job: &mut Job, op: Op) -> bool {
    match op {
        Op::Enqueue => job.mark_enqueued().is_ok(),
        Op::Start => job.mark_started().is_ok(),
        Op::Finish => job.mark_finished().is_ok(),
        Op::Fail => job.mark_failed().is_ok(),
    }
}

/// Progress rank of a state; transitions may only move it forward.
fn rank(state: JobState) -> u8 {
    match state {
        JobState::Pending => 0,
        JobState::Enqueued => 1,
        JobState::Running => 2,
        JobState::Succeeded | JobState::Failed => 3,
    }
}

proptest! {
    /// Any sequence of transition attempts leaves the job monotonic: the
    /// state rank never decreases, set stamps are never cleared or changed,
    /// and a rejected transition changes nothing.
    #[test]
    fn transitions_are_monotonic(ops in proptest::collection::vec(op_strategy(), 0..32)) {
        let mut job = Job::new("Any", JobId::new());

        for op in ops {
            let before = job.clone();
            let accepted = apply(&mut job, op);

            prop_assert!(rank(job.state()) >= rank(before.state()));

            if let Some(t) = before.enqueued_at {
                prop_assert_eq!(job.enqueued_at, Some(t));
            }
            if let Some(t) = before.started_at {
                prop_assert_eq!(job.started_at, Some(t));
            }
            if let Some(t) = before.finished_at {
                prop_assert_eq!(job.finished_at, Some(t));
            }
            if let Some(t) = before.failed_at {
                prop_assert_eq!(job.failed_at, Some(t));
            }

            if !accepted {
                prop_assert_eq!(job.state(), before.state());
            }

            // The terminal states are mutually exclusive.
            prop_assert!(!(job.finished_at.is_some() && job.failed_at.is_some()));
        }
    }

    /// Whatever was attempted, a terminal job stays terminal in the same
    /// state.
    #[test]
    fn terminal_states_are_sticky(ops in proptest::collection::vec(op_strategy(), 0..32)) {
        let mut job = Job::new("Any", JobId::new());
        job.mark_enqueued().unwrap();
        job.mark_started().unwrap();
        job.mark_finished().unwrap();

        for op in ops {
            apply(&mut job, op);
            prop_assert_eq!(job.state(), JobState::Succeeded);
        }
    }
}
