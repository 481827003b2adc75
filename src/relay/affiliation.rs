//! Affiliation resolver.
//!
//! A stored override beats the platform's top role. There is no
//! server-wide default affiliation.

use crate::error::DatabaseError;
use crate::relay::action::{OutboundAction, Reaction};
use crate::relay::router::MessageContext;
use crate::store::SetOutcome;

/// Pick the affiliation an order is filed under.
///
/// Precedence: declared bracket override, stored override, platform role,
/// sender identity. Blank candidates are skipped so the result is never
/// empty unless `identity` itself is.
pub fn effective_affiliation(
    declared: Option<&str>,
    stored: Option<&str>,
    platform_role: Option<&str>,
    identity: &str,
) -> String {
    [declared, stored, platform_role]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(identity)
        .to_string()
}

/// `affil <name...>`
pub async fn set(
    ctx: &MessageContext<'_>,
    name: &str,
) -> Result<Vec<OutboundAction>, DatabaseError> {
    let outcome = ctx.store.set_affiliation(ctx.sender_id(), name).await?;
    tracing::info!(user_id = ctx.sender_id(), affiliation = name, "Affiliation set");
    let reaction = match outcome {
        SetOutcome::Created => Reaction::Confirmed,
        SetOutcome::Updated => Reaction::Updated,
    };
    Ok(vec![OutboundAction::React(reaction)])
}

/// `affil clear`
pub async fn clear(ctx: &MessageContext<'_>) -> Result<Vec<OutboundAction>, DatabaseError> {
    let removed = ctx.store.clear_affiliation(ctx.sender_id()).await?;
    tracing::info!(user_id = ctx.sender_id(), removed, "Affiliation cleared");
    Ok(vec![OutboundAction::React(Reaction::Confirmed)])
}

/// `affil check`
pub async fn check(ctx: &MessageContext<'_>) -> Result<Vec<OutboundAction>, DatabaseError> {
    let stored = ctx.store.get(ctx.sender_id()).await?.affiliation;
    let reply = match (stored, ctx.platform_role()) {
        (Some(custom), _) => format!("Your affiliation is {custom} (custom)."),
        (None, Some(role)) => format!("Your affiliation is {role} (platform role)."),
        (None, None) => "No affiliation.".to_string(),
    };
    Ok(vec![OutboundAction::Reply(reply)])
}
