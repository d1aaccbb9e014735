use crate::config::{COUNTRY_BATCH, COUNTRY_BATCH_DELAY, GEOMETRY_BATCH, GEOMETRY_BATCH_DELAY};
use crate::errors::ImportError;
use crate::models::{CountrySummary, ProgressStatus};
use crate::overpass::{discover, geometry, LevelRange, OverpassClient};
use crate::repositories::{BoundaryRepository, ProgressRepository, RelationRepository};
use crate::transform;
use crate::wikidata::WikidataClient;
use deadpool_postgres::Pool;
use futures::future::join_all;

/// ISO3166-1 alpha-3 catalogue walked in multi-country mode.
pub const COUNTRY_CATALOGUE: &[&str] = &[
    "AFG", "ALB", "DZA", "AND", "AGO", "ATG", "ARG", "ARM",
    "AUS", "AUT", "AZE", "BHS", "BHR", "BGD", "BRB", "BLR",
    "BEL", "BLZ", "BEN", "BTN", "BOL", "BIH", "BWA", "BRA",
    "BRN", "BGR", "BFA", "BDI", "CPV", "KHM", "CMR", "CAN",
    "CAF", "TCD", "CHL", "CHN", "COL", "COM", "COG", "COD",
    "CRI", "CIV", "HRV", "CUB", "CYP", "CZE", "DNK", "DJI",
    "DMA", "DOM", "ECU", "EGY", "SLV", "GNQ", "ERI", "EST",
    "SWZ", "ETH", "FJI", "FIN", "FRA", "GAB", "GMB", "GEO",
    "DEU", "GHA", "GRC", "GRD", "GTM", "GIN", "GNB", "GUY",
    "HTI", "HND", "HUN", "ISL", "IND", "IDN", "IRN", "IRQ",
    "IRL", "ISR", "ITA", "JAM", "JPN", "JOR", "KAZ", "KEN",
    "KIR", "PRK", "KOR", "KWT", "KGZ", "LAO", "LVA", "LBN",
    "LSO", "LBR", "LBY", "LIE", "LTU", "LUX", "MDG", "MWI",
    "MYS", "MDV", "MLI", "MLT", "MHL", "MRT", "MUS", "MEX",
    "FSM", "MDA", "MCO", "MNG", "MNE", "MAR", "MOZ", "MMR",
    "NAM", "NRU", "NPL", "NLD", "NZL", "NIC", "NER", "NGA",
    "MKD", "NOR", "OMN", "PAK", "PLW", "PAN", "PNG", "PRY",
    "PER", "PHL", "POL", "PRT", "QAT", "ROU", "RUS", "RWA",
    "KNA", "LCA", "VCT", "WSM", "SMR", "STP", "SAU", "SEN",
    "SRB", "SYC", "SLE", "SGP", "SVK", "SVN", "SLB", "SOM",
    "ZAF", "SSD", "ESP", "LKA", "SDN", "SUR", "SWE", "CHE",
    "SYR", "TJK", "TZA", "THA", "TLS", "TGO", "TON", "TTO",
    "TUN", "TUR", "TKM", "TUV", "UGA", "UKR", "ARE", "GBR",
    "USA", "URY", "UZB", "VUT", "VEN", "VNM", "XKX", "YEM",
    "ZMB", "ZWE",
];

pub struct Importer {
    pool: Pool,
    overpass: OverpassClient,
    wikidata: WikidataClient,
}

impl Importer {
    pub fn new(pool: Pool, overpass: OverpassClient, wikidata: WikidataClient) -> Self {
        Self { pool, overpass, wikidata }
    }

    /// Full single-country pipeline: discovery, geometry, raw persistence,
    /// enrichment, transform, enriched persistence, verification. Progress
    /// moves to completed or failed accordingly.
    pub async fn run_country(
        &self,
        iso3: &str,
        range: LevelRange,
    ) -> Result<CountrySummary, ImportError> {
        {
            let client = self.pool.get().await?;
            if ProgressRepository::status(&client, iso3).await? == Some(ProgressStatus::InProgress)
            {
                log::info!(
                    "{}: previous run never finished, restarting from level {}",
                    iso3,
                    range.min
                );
            }
            ProgressRepository::start(&client, iso3, range.min).await?;
        }
        log::info!("{}: import started (levels {}-{})", iso3, range.min, range.max);

        match self.import_country(iso3, range).await {
            Ok(summary) => {
                let client = self.pool.get().await?;
                if !summary.row_errors.is_empty() {
                    ProgressRepository::add_errors(&client, iso3, summary.row_errors.len()).await?;
                }
                ProgressRepository::mark_completed(&client, iso3).await?;
                print_summary(&summary);
                Ok(summary)
            }
            Err(err) => {
                log::error!("{}: import failed: {}", iso3, err);
                let marked = match self.pool.get().await {
                    Ok(client) => {
                        ProgressRepository::mark_failed(&client, iso3, &err.to_string()).await
                    }
                    Err(pool_err) => Err(pool_err.into()),
                };
                if let Err(mark_err) = marked {
                    log::error!("{}: could not record failure: {}", iso3, mark_err);
                }
                Err(err)
            }
        }
    }

    async fn import_country(
        &self,
        iso3: &str,
        range: LevelRange,
    ) -> Result<CountrySummary, ImportError> {
        let levels = discover(&self.overpass, iso3, range).await?;
        let relations_discovered: usize = levels.values().map(Vec::len).sum();
        for (level, ids) in &levels {
            log::info!("{}: level {} has {} relations", iso3, level, ids.len());
        }

        // Geometry batches, level by level; level L is fully persisted
        // before L+1 is fetched.
        let mut geometries_parsed = 0;
        for (&level, ids) in &levels {
            let mut level_count = 0;
            for (index, chunk) in ids.chunks(GEOMETRY_BATCH).enumerate() {
                if index > 0 {
                    tokio::time::sleep(GEOMETRY_BATCH_DELAY).await;
                }
                let response = self.overpass.relation_geometry(chunk).await?;
                let relations = geometry::parse_relations(&response, iso3);

                let mut client = self.pool.get().await?;
                RelationRepository::upsert_batch(&mut client, &relations).await?;
                level_count += relations.len();
            }

            let client = self.pool.get().await?;
            ProgressRepository::level_completed(&client, iso3, level, level_count).await?;
            geometries_parsed += level_count;
            log::info!("{}: level {} assembled {} geometries", iso3, level, level_count);
        }

        let rows = {
            let client = self.pool.get().await?;
            RelationRepository::fetch_for_enrichment(&client, iso3).await?
        };
        let wikidata_ids: Vec<String> =
            rows.iter().filter_map(|row| row.wikidata_id.clone()).collect();
        let categories = self.wikidata.fetch_categories(&wikidata_ids).await;
        log::info!(
            "{}: {} of {} wikidata ids have a commons category",
            iso3,
            categories.len(),
            wikidata_ids.len()
        );

        let (records, drops) = transform::transform(rows, &categories);
        let stats = BoundaryRepository::persist(&self.pool, &records).await?;

        let client = self.pool.get().await?;
        let level_counts = RelationRepository::level_counts(&client, iso3).await?;
        let null_fields = BoundaryRepository::null_field_count(&client).await?;
        let invalid_geometries = BoundaryRepository::invalid_geometry_count(&client).await?;

        Ok(CountrySummary {
            country_code: iso3.to_string(),
            relations_discovered,
            geometries_parsed,
            wikidata_matches: categories.len(),
            transformed: records.len(),
            inserted: stats.inserted,
            drops,
            row_errors: stats.errors,
            level_counts,
            null_fields,
            invalid_geometries,
        })
    }

    /// Multi-country mode: pending catalogue entries in concurrent batches
    /// of five, pausing between batches. One country's failure never stops
    /// the others. Returns true when every country finished cleanly.
    pub async fn run_all(&self, range: LevelRange) -> Result<bool, ImportError> {
        let pending = {
            let client = self.pool.get().await?;
            ProgressRepository::filter_pending(&client, COUNTRY_CATALOGUE).await?
        };
        log::info!("{} of {} countries pending", pending.len(), COUNTRY_CATALOGUE.len());

        let mut failed = 0;
        let mut row_errors = 0;
        for (index, group) in pending.chunks(COUNTRY_BATCH).enumerate() {
            if index > 0 {
                tokio::time::sleep(COUNTRY_BATCH_DELAY).await;
            }

            let runs = group.iter().map(|code| self.run_country(code, range));
            for (code, result) in group.iter().zip(join_all(runs).await) {
                match result {
                    Ok(summary) => row_errors += summary.row_errors.len(),
                    Err(err) => {
                        log::error!("{}: giving up on this run: {}", code, err);
                        failed += 1;
                    }
                }
            }
        }

        if failed > 0 {
            log::warn!("{} countries failed this run", failed);
        }
        Ok(failed == 0 && row_errors == 0)
    }
}

fn print_summary(summary: &CountrySummary) {
    log::info!("{}: import completed", summary.country_code);
    log::info!(
        "{}: discovered {}, parsed {}, wikidata matches {}, transformed {}, inserted {}",
        summary.country_code,
        summary.relations_discovered,
        summary.geometries_parsed,
        summary.wikidata_matches,
        summary.transformed,
        summary.inserted,
    );
    log::info!(
        "{}: dropped {} (no wikidata {}, no category {}, invalid geometry {}, duplicates {})",
        summary.country_code,
        summary.drops.total(),
        summary.drops.missing_wikidata,
        summary.drops.missing_category,
        summary.drops.invalid_geometry,
        summary.drops.duplicates,
    );
    for (level, count) in &summary.level_counts {
        log::info!("{}: raw level {} holds {} rows", summary.country_code, level, count);
    }
    log::info!(
        "{}: verifier: {} null-field rows, {} invalid geometries",
        summary.country_code,
        summary.null_fields,
        summary.invalid_geometries,
    );
    for row_error in summary.row_errors.iter().take(10) {
        log::warn!(
            "{}: row '{}' failed: {}",
            summary.country_code,
            row_error.name,
            row_error.error
        );
    }
    if summary.row_errors.len() > 10 {
        log::warn!(
            "{}: {} further row errors not shown",
            summary.country_code,
            summary.row_errors.len() - 10
        );
    }
}
