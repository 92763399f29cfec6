//! Identity merging and canonicalization
//!
//! A merge folds one identity's touchpoints and conversions into another and
//! leaves the source behind as a tombstone pointing at its successor.
//! Canonicalization follows `merged_into` pointers to the terminal identity,
//! healing cycles it encounters along the way instead of crashing on them.

use std::collections::HashMap;
use touchmark_common::db::{self, Identity};
use touchmark_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Chains longer than this are treated as corrupt rather than walked forever
const MAX_MERGE_CHAIN_DEPTH: usize = 32;

/// Merge `source` into `target` in a single transaction: reassign all of
/// source's touchpoints and conversions, set its merge pointer, and mirror
/// target's user link onto the tombstone.
///
/// Self-merges and re-merges of an already-merged source are warned no-ops.
pub async fn merge_identities(pool: &SqlitePool, source: &Identity, target: &Identity) -> Result<()> {
    if source.guid == target.guid {
        warn!(identity = %source.guid, "Refusing to merge identity into itself");
        return Ok(());
    }
    if source.is_merged() {
        warn!(identity = %source.guid, "Identity already merged - skipping re-merge");
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    let touchpoints = db::touchpoints::reassign_touchpoints(&mut tx, source.guid, target.guid).await?;
    let conversions = db::conversions::reassign_conversions(&mut tx, source.guid, target.guid).await?;
    db::identities::mark_merged(&mut tx, source.guid, target.guid, target.linked_user.as_deref()).await?;
    tx.commit().await?;

    info!(
        source = %source.guid,
        target = %target.guid,
        touchpoints,
        conversions,
        "Merged identity"
    );
    Ok(())
}

/// Follow the merge chain from `identity` to its canonical identity.
///
/// - A null pointer terminates the walk at the canonical identity.
/// - A revisited node means a merge cycle: the earliest-created member
///   (guid tie-break) becomes canonical, every other member is repointed
///   directly at it with its rows reassigned, and the chosen node's own
///   pointer is cleared. Idempotent; logged at warn severity.
/// - A chain deeper than `MAX_MERGE_CHAIN_DEPTH` is treated as corrupt:
///   logged, and the original identity is returned unresolved rather than
///   guessing at an owner.
pub async fn canonicalize(pool: &SqlitePool, identity: Identity) -> Result<Identity> {
    let origin = identity.clone();

    let mut path: Vec<Identity> = Vec::new();
    let mut seen: HashMap<Uuid, usize> = HashMap::new();
    let mut current = identity;

    while path.len() < MAX_MERGE_CHAIN_DEPTH {
        seen.insert(current.guid, path.len());
        path.push(current.clone());

        let Some(next_guid) = current.merged_into else {
            return Ok(current);
        };

        if let Some(&cycle_start) = seen.get(&next_guid) {
            return heal_cycle(pool, &path[cycle_start..]).await;
        }

        match db::identities::get_identity(pool, next_guid).await? {
            Some(next) => current = next,
            None => {
                // Dangling pointer; keep the last live node rather than failing
                warn!(
                    identity = %current.guid,
                    missing = %next_guid,
                    "Merge pointer references a missing identity - treating holder as canonical"
                );
                return Ok(current);
            }
        }
    }

    error!(
        identity = %origin.guid,
        max_depth = MAX_MERGE_CHAIN_DEPTH,
        "Merge chain exceeds maximum depth - returning identity unresolved"
    );
    Ok(origin)
}

/// Repoint every cycle member at the earliest-created one, in one transaction
async fn heal_cycle(pool: &SqlitePool, cycle: &[Identity]) -> Result<Identity> {
    let chosen = cycle
        .iter()
        .min_by_key(|i| (i.created_at, i.guid))
        .ok_or_else(|| Error::Internal("empty merge cycle".to_string()))?
        .clone();

    let mut tx = pool.begin().await?;
    for member in cycle {
        if member.guid == chosen.guid {
            continue;
        }
        db::touchpoints::reassign_touchpoints(&mut tx, member.guid, chosen.guid).await?;
        db::conversions::reassign_conversions(&mut tx, member.guid, chosen.guid).await?;
        db::identities::mark_merged(&mut tx, member.guid, chosen.guid, chosen.linked_user.as_deref()).await?;
    }
    db::identities::clear_merged_into(&mut tx, chosen.guid).await?;
    tx.commit().await?;

    warn!(
        canonical = %chosen.guid,
        cycle_size = cycle.len(),
        "Detected and healed merge cycle"
    );

    let mut healed = chosen;
    healed.merged_into = None;
    Ok(healed)
}

/// Unmerged identities linked to a user, oldest first
pub async fn find_unmerged_user_identities(pool: &SqlitePool, user_id: &str) -> Result<Vec<Identity>> {
    db::identities::find_unmerged_for_user(pool, user_id).await
}

/// Collapse duplicate canonical identities for one user into the oldest
pub async fn collapse_duplicates(pool: &SqlitePool, unmerged: Vec<Identity>) -> Result<Identity> {
    let mut iter = unmerged.into_iter();
    let canonical = iter
        .next()
        .ok_or_else(|| Error::Internal("no identities to collapse".to_string()))?;

    for duplicate in iter {
        merge_identities(pool, &duplicate, &canonical).await?;
        warn!(
            duplicate = %duplicate.guid,
            canonical = %canonical.guid,
            "Found duplicate user identity - merged into canonical"
        );
    }
    Ok(canonical)
}

/// Fold the current identity into the user's established canonical identity,
/// healing duplicate user identities on the way
pub async fn establish_canonical(
    pool: &SqlitePool,
    unmerged: Vec<Identity>,
    current: &Identity,
) -> Result<Identity> {
    let canonical = collapse_duplicates(pool, unmerged).await?;
    merge_identities(pool, current, &canonical).await?;
    Ok(canonical)
}

/// Link an identity to an authenticated user, returning the updated record
pub async fn link_identity_to_user(
    pool: &SqlitePool,
    identity: &Identity,
    user_id: &str,
) -> Result<Identity> {
    db::identities::link_user(pool, identity.guid, user_id).await?;
    info!(identity = %identity.guid, user = user_id, "Linked identity to user");

    let mut linked = identity.clone();
    linked.linked_user = Some(user_id.to_string());
    Ok(linked)
}
