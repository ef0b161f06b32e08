//! Master roster loading.

use std::collections::BTreeMap;
use tracing::warn;

use crate::sheet;
use crate::store::ObjectStore;

/// Canonical student list: batch -> section -> names in sheet order.
#[derive(Debug, Default, Clone)]
pub struct MasterRoster {
    groups: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl MasterRoster {
    pub fn insert(&mut self, batch: &str, section: &str, name: &str) {
        self.groups
            .entry(batch.to_string())
            .or_default()
            .entry(section.to_string())
            .or_default()
            .push(name.to_string());
    }

    /// Students registered for `(batch, section)`; empty when the group is
    /// unknown.
    pub fn students_for(&self, batch: &str, section: &str) -> &[String] {
        self.groups
            .get(batch)
            .and_then(|sections| sections.get(section))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total enrolled names across all groups.
    pub fn total_students(&self) -> usize {
        self.groups
            .values()
            .flat_map(|sections| sections.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Loads the roster spreadsheet. Requires `Batch`, `Section` and `Name`
/// columns; a missing column, a missing object, or a parse failure all
/// degrade to the empty roster so aggregation still runs (it will just track
/// zero students per group).
pub async fn load_master_roster(store: &dyn ObjectStore, key: &str) -> MasterRoster {
    let bytes = match store.get(key).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(key, error = %e, "Could not fetch master roster");
            return MasterRoster::default();
        }
    };

    let table = match sheet::parse_xlsx(&bytes) {
        Ok(table) => table,
        Err(e) => {
            warn!(key, error = %e, "Could not parse master roster");
            return MasterRoster::default();
        }
    };

    if ["Batch", "Section", "Name"]
        .iter()
        .any(|column| table.column_index(column).is_none())
    {
        warn!(key, "Master roster is missing required columns");
        return MasterRoster::default();
    }

    let mut roster = MasterRoster::default();
    for row in 0..table.rows.len() {
        let (Some(batch), Some(section), Some(name)) = (
            table.cell(row, "Batch"),
            table.cell(row, "Section"),
            table.cell(row, "Name"),
        ) else {
            continue;
        };
        roster.insert(batch, section, name);
    }

    roster
}
