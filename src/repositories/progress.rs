use crate::errors::ImportError;
use crate::models::ProgressStatus;
use deadpool_postgres::Object;

/// Per-country import state machine, persisted so that multi-country runs
/// can resume. Re-starting a country resets its counters; completed
/// countries are skipped by the orchestrator.
pub struct ProgressRepository;

impl ProgressRepository {
    pub async fn start(
        client: &Object,
        country_code: &str,
        min_level: u8,
    ) -> Result<(), ImportError> {
        let sql = r#"
            INSERT INTO import_progress
                (country_code, current_admin_level, status, relations_fetched, errors,
                 started_at, completed_at, last_error)
            VALUES ($1, $2, $3, 0, 0, NOW(), NULL, NULL)
            ON CONFLICT (country_code) DO UPDATE SET
                current_admin_level = EXCLUDED.current_admin_level,
                status = EXCLUDED.status,
                relations_fetched = 0,
                errors = 0,
                started_at = NOW(),
                completed_at = NULL,
                last_error = NULL
        "#;
        client
            .execute(
                sql,
                &[
                    &country_code,
                    &i32::from(min_level),
                    &ProgressStatus::InProgress.as_str(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn level_completed(
        client: &Object,
        country_code: &str,
        level: u8,
        relations_fetched: usize,
    ) -> Result<(), ImportError> {
        let sql = r#"
            UPDATE import_progress
            SET current_admin_level = $2,
                relations_fetched = relations_fetched + $3
            WHERE country_code = $1
        "#;
        client
            .execute(
                sql,
                &[&country_code, &i32::from(level), &(relations_fetched as i32)],
            )
            .await?;
        Ok(())
    }

    pub async fn add_errors(
        client: &Object,
        country_code: &str,
        count: usize,
    ) -> Result<(), ImportError> {
        client
            .execute(
                "UPDATE import_progress SET errors = errors + $2 WHERE country_code = $1",
                &[&country_code, &(count as i32)],
            )
            .await?;
        Ok(())
    }

    pub async fn mark_completed(client: &Object, country_code: &str) -> Result<(), ImportError> {
        let sql = r#"
            UPDATE import_progress
            SET status = $2, completed_at = NOW()
            WHERE country_code = $1
        "#;
        client
            .execute(sql, &[&country_code, &ProgressStatus::Completed.as_str()])
            .await?;
        Ok(())
    }

    pub async fn mark_failed(
        client: &Object,
        country_code: &str,
        reason: &str,
    ) -> Result<(), ImportError> {
        let sql = r#"
            UPDATE import_progress
            SET status = $2, errors = errors + 1, last_error = $3
            WHERE country_code = $1
        "#;
        client
            .execute(
                sql,
                &[&country_code, &ProgressStatus::Failed.as_str(), &reason],
            )
            .await?;
        Ok(())
    }

    pub async fn status(
        client: &Object,
        country_code: &str,
    ) -> Result<Option<ProgressStatus>, ImportError> {
        let row = client
            .query_opt(
                "SELECT status FROM import_progress WHERE country_code = $1",
                &[&country_code],
            )
            .await?;
        Ok(row.and_then(|r| ProgressStatus::parse(r.get(0))))
    }

    /// Catalogue entries that still need a run: everything not yet completed.
    pub async fn filter_pending(
        client: &Object,
        catalogue: &[&str],
    ) -> Result<Vec<String>, ImportError> {
        let codes: Vec<&str> = catalogue.to_vec();
        let rows = client
            .query(
                "SELECT country_code FROM import_progress WHERE status = $1 AND country_code = ANY($2)",
                &[&ProgressStatus::Completed.as_str(), &codes],
            )
            .await?;
        let completed: std::collections::HashSet<String> =
            rows.iter().map(|row| row.get(0)).collect();

        Ok(catalogue
            .iter()
            .filter(|code| !completed.contains(**code))
            .map(|code| code.to_string())
            .collect())
    }
}
