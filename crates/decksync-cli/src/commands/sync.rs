use decksync_core::models::{ConflictId, ConflictResolution, SyncResult};
use decksync_core::SyncSettings;

use crate::commands::common::{
    conflict_to_item, format_conflict_lines, match_prefix, normalize_identifier, open_engine,
    open_store, ConflictItem,
};
use crate::error::CliError;

pub async fn run_sync(as_json: bool, settings: &SyncSettings) -> Result<(), CliError> {
    let engine = open_engine(settings).await?;
    let result = engine.sync_all().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in format_sync_summary(&result) {
            println!("{line}");
        }
    }

    if result.success {
        Ok(())
    } else {
        Err(CliError::SyncFailed(result.errors.len()))
    }
}

pub async fn run_conflicts(
    include_resolved: bool,
    clear: bool,
    as_json: bool,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let store = open_store(settings).await?;

    if clear {
        let removed = store.clear_resolved_conflicts().await?;
        println!("Removed {removed} resolved conflict(s)");
        return Ok(());
    }

    let conflicts = store.list_conflicts(include_resolved).await?;
    if as_json {
        let json_items = conflicts
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_resolve(
    id: &str,
    resolution: ConflictResolution,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let engine = open_engine(settings).await?;
    let conflict_id = resolve_conflict_id(engine.store(), id).await?;

    let entity = engine
        .resolver()
        .resolve_conflict_by_id(&conflict_id, resolution)
        .await?;
    println!(
        "Resolved {conflict_id}: {} {} is now v{} ({})",
        entity.entity_type(),
        entity.id(),
        entity.version(),
        entity.sync_status()
    );
    Ok(())
}

async fn resolve_conflict_id(
    store: &decksync_core::LocalStore,
    query: &str,
) -> Result<ConflictId, CliError> {
    let query = normalize_identifier(query, "Conflict")?;
    if let Ok(id) = query.parse::<ConflictId>() {
        return Ok(id);
    }

    let conflicts = store.list_conflicts(true).await?;
    let conflict = match_prefix(conflicts, &query, "Conflict", |conflict| {
        conflict.id.to_string()
    })?;
    Ok(conflict.id)
}

pub fn format_sync_summary(result: &SyncResult) -> Vec<String> {
    let mut lines = vec![format!(
        "Sync {}: {} synced, {} conflict(s), {} error(s)",
        if result.success { "completed" } else { "finished with errors" },
        result.synced,
        result.conflicts.len(),
        result.errors.len()
    )];

    lines.extend(result.conflicts.iter().map(|conflict| {
        format!(
            "  conflict {} on {} {} (local v{}, remote v{})",
            conflict.id,
            conflict.entity_type,
            conflict.entity_id,
            conflict.local_version.version(),
            conflict.remote_version.version()
        )
    }));
    lines.extend(result.errors.iter().map(|error| format!("  error: {error}")));
    lines
}

#[cfg(test)]
mod tests {
    use decksync_core::models::{EntityType, SyncError};
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn run_sync_requires_sync_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SyncSettings::default().with_db_path(Some(dir.path().join("decks.db")));

        let error = run_sync(false, &settings).await.unwrap_err();
        assert!(matches!(error, CliError::SyncNotConfigured));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_resolve_requires_sync_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SyncSettings::default().with_db_path(Some(dir.path().join("decks.db")));

        let error = run_resolve("abc", ConflictResolution::Local, &settings)
            .await
            .unwrap_err();
        assert!(matches!(error, CliError::SyncNotConfigured));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_conflicts_works_without_remote() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SyncSettings::default().with_db_path(Some(dir.path().join("decks.db")));

        run_conflicts(false, false, true, &settings).await.unwrap();
        run_conflicts(true, true, false, &settings).await.unwrap();
    }

    #[test]
    fn format_sync_summary_lists_errors() {
        let result = SyncResult {
            success: false,
            synced: 2,
            conflicts: Vec::new(),
            errors: vec![SyncError::new(
                EntityType::Deck,
                Some("deck-1".to_string()),
                "Remote API error (503): unavailable",
            )],
        };

        let lines = format_sync_summary(&result);
        assert_eq!(
            lines,
            vec![
                "Sync finished with errors: 2 synced, 0 conflict(s), 1 error(s)".to_string(),
                "  error: deck deck-1: Remote API error (503): unavailable".to_string(),
            ]
        );
    }

    #[test]
    fn format_sync_summary_clean_run() {
        let result = SyncResult {
            success: true,
            synced: 0,
            ..SyncResult::default()
        };
        assert_eq!(
            format_sync_summary(&result),
            vec!["Sync completed: 0 synced, 0 conflict(s), 0 error(s)".to_string()]
        );
    }
}
