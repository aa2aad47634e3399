use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalState {
    Idle,
    AwaitingPassword,
    AwaitingConfirmation,
    Signing,
    AwaitingChainApproval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalAction {
    BeginWithoutCredential,
    BeginWithCredential,
    BeginChainApproval,
    PasswordAccepted,
    CredentialExpired,
    Confirm,
    SigningFinished,
    ChainResolved,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ApprovalState,
    pub to: ApprovalState,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal approval transition: {from:?} --{action:?}-->")]
pub struct TransitionError {
    pub from: ApprovalState,
    pub action: ApprovalAction,
}

pub fn approval_transition(
    from: ApprovalState,
    action: ApprovalAction,
) -> Result<(ApprovalState, StateTransition), TransitionError> {
    use ApprovalAction as A;
    use ApprovalState as S;

    let (to, reason) = match (from, action) {
        (S::Idle, A::BeginWithoutCredential) => (S::AwaitingPassword, "password_required"),
        (S::Idle, A::BeginWithCredential) => (S::AwaitingConfirmation, "credential_cached"),
        (S::Idle, A::BeginChainApproval) => (S::AwaitingChainApproval, "chain_approval"),
        (S::AwaitingPassword, A::PasswordAccepted) => (S::AwaitingConfirmation, "password_ok"),
        (S::AwaitingConfirmation, A::CredentialExpired) => {
            (S::AwaitingPassword, "credential_expired")
        }
        (S::AwaitingConfirmation, A::Confirm) => (S::Signing, "confirmed"),
        (S::Signing, A::SigningFinished) => (S::Idle, "signing_finished"),
        (S::AwaitingChainApproval, A::ChainResolved) => (S::Idle, "chain_resolved"),
        (S::AwaitingPassword | S::AwaitingConfirmation | S::AwaitingChainApproval, A::Cancel) => {
            (S::Idle, "canceled")
        }
        _ => return Err(TransitionError { from, action }),
    };
    Ok((to, StateTransition { from, to, reason }))
}
