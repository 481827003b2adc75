//! Turn resolver.
//!
//! A user's turn is their own stored value if set, otherwise the value
//! stored under [`DEFAULT_USER`], otherwise absent.

use crate::error::{DatabaseError, ValidationError};
use crate::relay::action::{OutboundAction, Reaction};
use crate::relay::router::MessageContext;
use crate::store::{DEFAULT_USER, PreferenceStore, SetOutcome};

/// Where a resolved turn came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnSource {
    User,
    Default,
}

/// Parse a turn argument. Only positive integers are accepted.
pub fn parse_turn(value: &str) -> Result<u32, ValidationError> {
    let value = value.trim();
    let n: i64 = value.parse().map_err(|_| ValidationError::NotANumber {
        value: value.to_string(),
    })?;
    if n <= 0 {
        return Err(ValidationError::NotPositive {
            value: value.to_string(),
        });
    }
    u32::try_from(n).map_err(|_| ValidationError::OutOfRange {
        value: value.to_string(),
    })
}

/// Resolve the turn that applies to `user_id`.
pub async fn effective_turn(
    store: &dyn PreferenceStore,
    user_id: &str,
) -> Result<Option<(u32, TurnSource)>, DatabaseError> {
    if let Some(turn) = store.get_turn(user_id).await? {
        return Ok(Some((turn, TurnSource::User)));
    }
    Ok(store
        .get_turn(DEFAULT_USER)
        .await?
        .map(|turn| (turn, TurnSource::Default)))
}

fn acknowledge(outcome: SetOutcome) -> OutboundAction {
    match outcome {
        SetOutcome::Created => OutboundAction::React(Reaction::Confirmed),
        SetOutcome::Updated => OutboundAction::React(Reaction::Updated),
    }
}

fn unauthorized() -> Vec<OutboundAction> {
    vec![
        OutboundAction::Reply("Only server managers can change the default turn.".into()),
        OutboundAction::React(Reaction::Unauthorized),
    ]
}

/// `turn <n>`
pub async fn set(ctx: &MessageContext<'_>, turn: u32) -> Result<Vec<OutboundAction>, DatabaseError> {
    let outcome = ctx.store.set_turn(ctx.sender_id(), turn).await?;
    tracing::info!(user_id = ctx.sender_id(), turn, "Turn set");
    Ok(vec![acknowledge(outcome)])
}

/// `turn clear`
pub async fn clear(ctx: &MessageContext<'_>) -> Result<Vec<OutboundAction>, DatabaseError> {
    let removed = ctx.store.clear_turn(ctx.sender_id()).await?;
    tracing::info!(user_id = ctx.sender_id(), removed, "Turn cleared");
    Ok(vec![OutboundAction::React(Reaction::Confirmed)])
}

/// `turn check`
pub async fn check(ctx: &MessageContext<'_>) -> Result<Vec<OutboundAction>, DatabaseError> {
    let reply = match effective_turn(ctx.store, ctx.sender_id()).await? {
        Some((turn, TurnSource::User)) => format!("Your turn is {turn}."),
        Some((turn, TurnSource::Default)) => format!("Your turn is {turn} (default)."),
        None => "No turn data.".to_string(),
    };
    Ok(vec![OutboundAction::Reply(reply)])
}

/// `turn default <n>`
pub async fn set_default(
    ctx: &MessageContext<'_>,
    turn: u32,
) -> Result<Vec<OutboundAction>, DatabaseError> {
    if !ctx.can_manage_defaults() {
        return Ok(unauthorized());
    }
    let outcome = ctx.store.set_turn(DEFAULT_USER, turn).await?;
    tracing::info!(by = ctx.sender_id(), turn, "Default turn set");
    Ok(vec![acknowledge(outcome)])
}

/// `turn default clear`
pub async fn clear_default(ctx: &MessageContext<'_>) -> Result<Vec<OutboundAction>, DatabaseError> {
    if !ctx.can_manage_defaults() {
        return Ok(unauthorized());
    }
    let removed = ctx.store.clear_turn(DEFAULT_USER).await?;
    tracing::info!(by = ctx.sender_id(), removed, "Default turn cleared");
    Ok(vec![OutboundAction::React(Reaction::Confirmed)])
}
