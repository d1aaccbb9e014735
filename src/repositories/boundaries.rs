use crate::config::DB_BATCH;
use crate::errors::ImportError;
use crate::models::{EnrichedBoundary, InsertStats, RowError};
use deadpool_postgres::{Object, Pool};

const UPSERT: &str = r#"
    INSERT INTO commons_boundaries
        (wikidata_id, commons_category, admin_level, name, geom, created_at)
    VALUES ($1, $2, $3, $4, ST_GeomFromEWKT($5), NOW())
    ON CONFLICT (wikidata_id) DO UPDATE SET
        commons_category = EXCLUDED.commons_category,
        admin_level = EXCLUDED.admin_level,
        name = EXCLUDED.name,
        geom = EXCLUDED.geom
"#;

pub struct BoundaryRepository;

impl BoundaryRepository {
    /// Upsert enriched records in transactional batches. A failing row is
    /// captured and rolled back to its savepoint without poisoning the rest
    /// of the batch; a failing batch is rolled back whole and the remaining
    /// batches still run.
    pub async fn persist(pool: &Pool, records: &[EnrichedBoundary]) -> Result<InsertStats, ImportError> {
        let mut stats = InsertStats::default();

        for (index, batch) in records.chunks(DB_BATCH).enumerate() {
            let mut client = pool.get().await?;
            match Self::persist_batch(&mut client, batch).await {
                Ok((inserted, mut errors)) => {
                    stats.inserted += inserted;
                    stats.errors.append(&mut errors);
                }
                Err(err) => {
                    log::error!("boundary batch {} rolled back: {}", index + 1, err);
                }
            }
        }

        Ok(stats)
    }

    async fn persist_batch(
        client: &mut Object,
        batch: &[EnrichedBoundary],
    ) -> Result<(usize, Vec<RowError>), ImportError> {
        let txn = client.transaction().await?;
        let stmt = txn.prepare_cached(UPSERT).await?;

        let mut inserted = 0;
        let mut errors = Vec::new();
        for record in batch {
            txn.batch_execute("SAVEPOINT boundary_row").await?;
            let result = txn
                .execute(
                    &stmt,
                    &[
                        &record.wikidata_id,
                        &record.commons_category,
                        &record.admin_level,
                        &record.name,
                        &record.geom,
                    ],
                )
                .await;

            match result {
                Ok(_) => {
                    txn.batch_execute("RELEASE SAVEPOINT boundary_row").await?;
                    inserted += 1;
                }
                Err(err) => {
                    errors.push(RowError {
                        name: record.name.clone(),
                        error: err.to_string(),
                    });
                    txn.batch_execute("ROLLBACK TO SAVEPOINT boundary_row").await?;
                }
            }
        }

        txn.commit().await?;
        Ok((inserted, errors))
    }

    /// Verifier: enriched rows violating the everything-non-null invariant.
    pub async fn null_field_count(client: &Object) -> Result<i64, ImportError> {
        let sql = r#"
            SELECT COUNT(*)
            FROM commons_boundaries
            WHERE wikidata_id IS NULL OR commons_category IS NULL
               OR admin_level IS NULL OR name IS NULL OR geom IS NULL
        "#;
        let row = client.query_one(sql, &[]).await?;
        Ok(row.get(0))
    }

    /// Verifier: enriched rows whose geometry the storage engine rejects.
    pub async fn invalid_geometry_count(client: &Object) -> Result<i64, ImportError> {
        let row = client
            .query_one(
                "SELECT COUNT(*) FROM commons_boundaries WHERE NOT ST_IsValid(geom)",
                &[],
            )
            .await?;
        Ok(row.get(0))
    }
}
