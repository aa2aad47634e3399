use dapp_bridge_core::state_machine::{approval_transition, TransitionError};
use dapp_bridge_core::{ApprovalAction as A, ApprovalState as S};

#[test]
fn signing_path_with_password() {
    let (s, t) = approval_transition(S::Idle, A::BeginWithoutCredential).expect("begin");
    assert_eq!(s, S::AwaitingPassword);
    assert_eq!(t.reason, "password_required");
    let (s, _) = approval_transition(s, A::PasswordAccepted).expect("password");
    assert_eq!(s, S::AwaitingConfirmation);
    let (s, _) = approval_transition(s, A::Confirm).expect("confirm");
    assert_eq!(s, S::Signing);
    let (s, t) = approval_transition(s, A::SigningFinished).expect("finish");
    assert_eq!(s, S::Idle);
    assert_eq!(t.from, S::Signing);
}

#[test]
fn cached_credential_skips_password() {
    let (s, _) = approval_transition(S::Idle, A::BeginWithCredential).expect("begin");
    assert_eq!(s, S::AwaitingConfirmation);
    let (s, _) = approval_transition(s, A::CredentialExpired).expect("expired");
    assert_eq!(s, S::AwaitingPassword);
}

#[test]
fn cancel_is_legal_only_while_awaiting_the_user() {
    for from in [
        S::AwaitingPassword,
        S::AwaitingConfirmation,
        S::AwaitingChainApproval,
    ] {
        let (to, t) = approval_transition(from, A::Cancel).expect("cancel");
        assert_eq!(to, S::Idle);
        assert_eq!(t.reason, "canceled");
    }
    for from in [S::Idle, S::Signing] {
        let err = approval_transition(from, A::Cancel).expect_err("cancel refused");
        assert_eq!(
            err,
            TransitionError {
                from,
                action: A::Cancel
            }
        );
    }
}

#[test]
fn chain_flow_resolves_back_to_idle() {
    let (s, _) = approval_transition(S::Idle, A::BeginChainApproval).expect("begin");
    assert_eq!(s, S::AwaitingChainApproval);
    assert!(approval_transition(s, A::Confirm).is_err());
    assert!(approval_transition(s, A::PasswordAccepted).is_err());
    let (s, _) = approval_transition(s, A::ChainResolved).expect("resolved");
    assert_eq!(s, S::Idle);
}

#[test]
fn nothing_starts_while_busy() {
    let busy = [
        S::AwaitingPassword,
        S::AwaitingConfirmation,
        S::Signing,
        S::AwaitingChainApproval,
    ];
    let begins = [
        A::BeginWithoutCredential,
        A::BeginWithCredential,
        A::BeginChainApproval,
    ];
    for from in busy {
        for action in begins {
            assert!(
                approval_transition(from, action).is_err(),
                "{action:?} from {from:?} must be refused"
            );
        }
    }
}

#[test]
fn confirm_requires_confirmation_state() {
    for from in [S::Idle, S::AwaitingPassword, S::Signing, S::AwaitingChainApproval] {
        let err = approval_transition(from, A::Confirm).expect_err("confirm refused");
        assert!(err.to_string().contains("illegal approval transition"));
    }
}
