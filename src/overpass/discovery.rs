use crate::errors::ImportError;
use crate::overpass::OverpassClient;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;

#[derive(Debug, Clone, Copy)]
pub struct LevelRange {
    pub min: u8,
    pub max: u8,
}

/// Walk admin levels from `min` to `max` and return the discovered relation
/// ids per level.
///
/// Until the first populated level, each level is probed with the country-root
/// query (there is no parent area to search within yet). Afterwards every
/// level fans out over the previous populated level's relations as search
/// areas. An empty level keeps the parent set unchanged, since admin-level
/// numbering is not dense in all countries.
pub async fn discover(
    client: &OverpassClient,
    iso3: &str,
    range: LevelRange,
) -> Result<BTreeMap<u8, Vec<i64>>, ImportError> {
    walk(range, move |level, parents| async move {
        if parents.is_empty() {
            return client.root_relation_ids(iso3, level).await;
        }
        let mut ids = Vec::new();
        for parent in parents {
            ids.extend(client.child_relation_ids(parent, level).await?);
        }
        Ok(ids)
    })
    .await
}

async fn walk<F, Fut>(
    range: LevelRange,
    mut probe: F,
) -> Result<BTreeMap<u8, Vec<i64>>, ImportError>
where
    F: FnMut(u8, Vec<i64>) -> Fut,
    Fut: Future<Output = Result<Vec<i64>, ImportError>>,
{
    let mut levels = BTreeMap::new();
    let mut parents: Vec<i64> = Vec::new();

    for level in range.min..=range.max {
        let ids = dedup_keep_order(probe(level, parents.clone()).await?);
        if ids.is_empty() {
            log::debug!("admin level {} is empty, probing deeper", level);
            continue;
        }
        parents = ids.clone();
        levels.insert(level, ids);
    }

    if levels.is_empty() {
        return Err(ImportError::Validation("no relations found".to_string()));
    }
    Ok(levels)
}

// The same boundary can be returned under multiple parents at land borders.
fn dedup_keep_order(ids: Vec<i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
