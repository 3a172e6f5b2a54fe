//! Admin commands and whole-table loads.
//!
//! Every command takes the acting admin's profile and refuses to run for
//! anyone else. Account deletion and verification lookups are privileged and
//! only work when the server holds the service-role key.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{Backend, Query};
use crate::errors::AppError;
use crate::models::profile::{Profile, ProfilePatch, Tier};
use crate::models::quote::Quote;
use crate::models::tier::{TierPlan, TierPlanPatch};
use crate::models::{decode_row, decode_rows, Record};

pub struct AdminTables {
    pub profiles: Vec<Profile>,
    pub quotes: Vec<Quote>,
    pub tiers: Vec<TierPlan>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VerificationStatus {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub verified: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
}

fn ensure_admin(acting: &Profile) -> Result<(), AppError> {
    if acting.is_admin {
        Ok(())
    } else {
        warn!(user_id = %acting.id, "Non-admin attempted an admin command");
        Err(AppError::Forbidden)
    }
}

fn newest_first(table: &str) -> Query {
    Query::table(table).order("created_at", false)
}

/// Downloads the three admin tables in full, concurrently.
pub async fn load_tables(backend: &dyn Backend, token: &str) -> Result<AdminTables, AppError> {
    let profiles_query = newest_first(Profile::TABLE);
    let quotes_query = newest_first(Quote::TABLE);
    let tiers_query = Query::table(TierPlan::TABLE).order("price_kes", true);

    let (profiles, quotes, tiers) = tokio::try_join!(
        backend.select(Some(token), &profiles_query),
        backend.select(Some(token), &quotes_query),
        backend.select(Some(token), &tiers_query),
    )?;

    Ok(AdminTables {
        profiles: decode_rows(profiles),
        quotes: decode_rows(quotes),
        tiers: decode_rows(tiers),
    })
}

pub async fn list_profiles(backend: &dyn Backend, token: &str) -> Result<Vec<Profile>, AppError> {
    let rows = backend
        .select(Some(token), &newest_first(Profile::TABLE))
        .await?;
    Ok(decode_rows(rows))
}

pub async fn list_quotes(backend: &dyn Backend, token: &str) -> Result<Vec<Quote>, AppError> {
    let rows = backend
        .select(Some(token), &newest_first(Quote::TABLE))
        .await?;
    Ok(decode_rows(rows))
}

pub async fn list_tier_plans(backend: &dyn Backend, token: &str) -> Result<Vec<TierPlan>, AppError> {
    let rows = backend
        .select(
            Some(token),
            &Query::table(TierPlan::TABLE).order("price_kes", true),
        )
        .await?;
    Ok(decode_rows(rows))
}

async fn patch_profile(
    backend: &dyn Backend,
    token: &str,
    user_id: Uuid,
    body: Value,
) -> Result<Profile, AppError> {
    let rows = backend
        .update(
            Some(token),
            &Query::table(Profile::TABLE).eq("id", user_id),
            body,
        )
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("Profile {user_id} not found")))?;
    Ok(decode_row(row)?)
}

/// Moves a user to `tier`. The quote limit follows the plan when one is
/// configured, including clearing it for unlimited plans.
pub async fn set_user_tier(
    backend: &dyn Backend,
    token: &str,
    acting: &Profile,
    user_id: Uuid,
    tier: Tier,
) -> Result<Profile, AppError> {
    ensure_admin(acting)?;

    let plan_rows = backend
        .select(
            Some(token),
            &Query::table(TierPlan::TABLE).eq("name", tier).limit(1),
        )
        .await?;
    let plan: Option<TierPlan> = decode_rows(plan_rows).into_iter().next();

    let mut patch = ProfilePatch::new();
    patch.tier = Some(tier);
    let mut body = json!(patch);
    if let Some(plan) = plan {
        body["quote_limit"] = json!(plan.quote_limit);
    }

    let profile = patch_profile(backend, token, user_id, body).await?;
    info!(admin_id = %acting.id, %user_id, %tier, "User tier changed");
    Ok(profile)
}

pub async fn set_admin(
    backend: &dyn Backend,
    token: &str,
    acting: &Profile,
    user_id: Uuid,
    is_admin: bool,
) -> Result<Profile, AppError> {
    ensure_admin(acting)?;
    if user_id == acting.id && !is_admin {
        return Err(AppError::BadRequest(
            "You cannot remove your own admin access".to_string(),
        ));
    }

    let mut patch = ProfilePatch::new();
    patch.is_admin = Some(is_admin);
    let profile = patch_profile(backend, token, user_id, json!(patch)).await?;
    info!(admin_id = %acting.id, %user_id, is_admin, "Admin flag changed");
    Ok(profile)
}

pub async fn update_tier_plan(
    backend: &dyn Backend,
    token: &str,
    acting: &Profile,
    plan_id: Uuid,
    patch: &TierPlanPatch,
) -> Result<TierPlan, AppError> {
    ensure_admin(acting)?;
    if patch.is_empty() {
        return Err(AppError::BadRequest("Nothing to update".to_string()));
    }
    if patch.price_kes.map(|p| p < 0.0).unwrap_or(false) {
        return Err(AppError::BadRequest("Price cannot be negative".to_string()));
    }
    if matches!(patch.quote_limit, Some(Some(limit)) if limit < 0) {
        return Err(AppError::BadRequest(
            "Quote limit cannot be negative".to_string(),
        ));
    }

    let mut body = json!(patch);
    body["updated_at"] = json!(Utc::now());
    let rows = backend
        .update(
            Some(token),
            &Query::table(TierPlan::TABLE).eq("id", plan_id),
            body,
        )
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("Tier plan {plan_id} not found")))?;
    let plan: TierPlan = decode_row(row)?;
    info!(admin_id = %acting.id, tier = %plan.name, "Tier plan updated");
    Ok(plan)
}

/// Removes the auth account, then the profile row. Fails before touching
/// any row if the service-role key is missing.
pub async fn delete_account(
    backend: &dyn Backend,
    token: &str,
    acting: &Profile,
    user_id: Uuid,
) -> Result<(), AppError> {
    ensure_admin(acting)?;
    if user_id == acting.id {
        return Err(AppError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }

    backend.admin_delete_user(user_id).await?;
    backend
        .delete(
            Some(token),
            &Query::table(Profile::TABLE).eq("id", user_id),
        )
        .await?;
    info!(admin_id = %acting.id, %user_id, "Account deleted");
    Ok(())
}

pub async fn verification_status(
    backend: &dyn Backend,
    acting: &Profile,
    user_id: Uuid,
) -> Result<VerificationStatus, AppError> {
    ensure_admin(acting)?;
    let user = backend.admin_get_user(user_id).await?;
    Ok(VerificationStatus {
        user_id: user.id,
        verified: user.is_email_verified(),
        email: user.email,
        confirmed_at: user.email_confirmed_at,
    })
}
