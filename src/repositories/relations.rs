use crate::errors::ImportError;
use crate::models::BoundaryRelation;
use deadpool_postgres::Object;

pub struct RelationRepository;

impl RelationRepository {
    /// Upsert one geometry batch. Re-running a country refreshes rows in
    /// place; `fetched_at` always moves forward.
    pub async fn upsert_batch(
        client: &mut Object,
        relations: &[BoundaryRelation],
    ) -> Result<(), ImportError> {
        let sql = r#"
            INSERT INTO osm_relations
                (relation_id, country_code, admin_level, name, wikidata_id, geometry, tags, fetched_at)
            VALUES ($1, $2, $3, $4, $5, ST_GeomFromEWKT($6), $7, NOW())
            ON CONFLICT (relation_id, country_code) DO UPDATE SET
                admin_level = EXCLUDED.admin_level,
                name = EXCLUDED.name,
                wikidata_id = EXCLUDED.wikidata_id,
                geometry = EXCLUDED.geometry,
                tags = EXCLUDED.tags,
                fetched_at = NOW()
        "#;

        let txn = client.transaction().await?;
        let stmt = txn.prepare_cached(sql).await?;
        for relation in relations {
            let tags = tags_json(relation);
            txn.execute(
                &stmt,
                &[
                    &relation.relation_id,
                    &relation.country_code,
                    &relation.admin_level,
                    &relation.name,
                    &relation.wikidata_id,
                    &relation.geometry,
                    &tags,
                ],
            )
            .await?;
        }
        txn.commit().await?;
        Ok(())
    }

    /// Everything C6 needs, ordered so that duplicate wikidata ids resolve
    /// to the coarsest admin level first.
    pub async fn fetch_for_enrichment(
        client: &Object,
        country_code: &str,
    ) -> Result<Vec<BoundaryRelation>, ImportError> {
        let sql = r#"
            SELECT relation_id, country_code, admin_level, name, wikidata_id,
                   COALESCE(ST_AsEWKT(geometry), ''), tags
            FROM osm_relations
            WHERE country_code = $1
            ORDER BY admin_level ASC, name ASC
        "#;

        let rows = client.query(sql, &[&country_code]).await?;
        Ok(rows
            .iter()
            .map(|row| BoundaryRelation {
                relation_id: row.get(0),
                country_code: row.get(1),
                admin_level: row.get(2),
                name: row.get(3),
                wikidata_id: row.get(4),
                geometry: row.get(5),
                tags: tags_map(row.get(6)),
            })
            .collect())
    }

    /// Raw-table counts per admin level for the verifier.
    pub async fn level_counts(
        client: &Object,
        country_code: &str,
    ) -> Result<Vec<(i32, i64)>, ImportError> {
        let sql = r#"
            SELECT admin_level, COUNT(*)
            FROM osm_relations
            WHERE country_code = $1
            GROUP BY admin_level
            ORDER BY admin_level
        "#;

        let rows = client.query(sql, &[&country_code]).await?;
        Ok(rows.iter().map(|row| (row.get(0), row.get(1))).collect())
    }
}

fn tags_json(relation: &BoundaryRelation) -> serde_json::Value {
    serde_json::Value::Object(
        relation
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}

fn tags_map(value: serde_json::Value) -> std::collections::HashMap<String, String> {
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect(),
        _ => Default::default(),
    }
}
