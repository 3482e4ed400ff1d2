//! FSM unit tests

use deployctl::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use deployctl::errors::DeployError;
use deployctl::models::status::DeploymentState;

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), DeploymentState::Pending);
    assert!(fsm.error().is_none());
    assert!(!fsm.rollback_triggered());
}

#[test]
fn test_fsm_success_flow() {
    let mut fsm = DeploymentFsm::new();

    // Pending -> InProgress
    fsm.process(DeploymentEvent::Start).unwrap();
    assert_eq!(fsm.state(), DeploymentState::InProgress);

    // InProgress -> Completed
    fsm.process(DeploymentEvent::Complete).unwrap();
    assert_eq!(fsm.state(), DeploymentState::Completed);
}

#[test]
fn test_fsm_rejected_request() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::Reject("threshold too high".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), DeploymentState::Failed);
    assert_eq!(fsm.error(), Some("threshold too high"));
}

#[test]
fn test_fsm_terminal_states_are_final() {
    let terminal = [
        vec![DeploymentEvent::Start, DeploymentEvent::Complete],
        vec![DeploymentEvent::Start, DeploymentEvent::Fail("boom".to_string())],
        vec![DeploymentEvent::Reject("bad".to_string())],
    ];

    for events in terminal {
        let mut fsm = DeploymentFsm::new();
        for event in events {
            fsm.process(event).unwrap();
        }
        let state = fsm.state();
        assert!(state.is_terminal());

        for event in [
            DeploymentEvent::Start,
            DeploymentEvent::Complete,
            DeploymentEvent::Fail("again".to_string()),
            DeploymentEvent::RolledBack,
        ] {
            assert!(matches!(
                fsm.process(event),
                Err(DeployError::InvalidTransition(_))
            ));
            assert_eq!(fsm.state(), state);
        }
    }
}

#[test]
fn test_fsm_rollback_flag_is_monotonic() {
    let mut fsm = DeploymentFsm::new();
    fsm.process(DeploymentEvent::Start).unwrap();

    assert!(fsm.mark_rollback_triggered());
    fsm.process(DeploymentEvent::Fail("rollback failed".to_string()))
        .unwrap();

    assert!(fsm.rollback_triggered());
    assert!(!fsm.mark_rollback_triggered());
    assert!(fsm.rollback_triggered());
}

#[test]
fn test_fsm_cannot_skip_start() {
    let mut fsm = DeploymentFsm::new();
    assert!(fsm.process(DeploymentEvent::Complete).is_err());
    assert!(fsm.process(DeploymentEvent::Fail("x".to_string())).is_err());
    assert_eq!(fsm.state(), DeploymentState::Pending);
}
