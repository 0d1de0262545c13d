use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};

use sha2::{Digest, Sha256};

use crate::discover::{TableNode, discover_tables};
use crate::document::DocumentTree;

/// SHA-256 over the grid shape and trimmed cell text of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableFingerprint([u8; 32]);

impl TableFingerprint {
    #[must_use]
    pub fn of<C>(table: &TableNode<C>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((table.rows.len() as u64).to_le_bytes());
        for row in &table.rows {
            hasher.update((row.len() as u64).to_le_bytes());
            for cell in row {
                let text = cell.text();
                hasher.update((text.len() as u64).to_le_bytes());
                hasher.update(text.as_bytes());
                hasher.update((cell.span.rows as u64).to_le_bytes());
                hasher.update((cell.span.cols as u64).to_le_bytes());
            }
        }
        let mut digest = [0_u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Self(digest)
    }
}

impl Display for TableFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueTable<C> {
    /// 1-based, in first-discovered order.
    pub ordinal: usize,
    pub fingerprint: TableFingerprint,
    pub table: TableNode<C>,
    /// Later tables with the same fingerprint, in discovery order.
    pub duplicates: Vec<TableNode<C>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deduplicated<C> {
    pub tables: Vec<UniqueTable<C>>,
}

impl<C> Deduplicated<C> {
    #[must_use]
    pub fn get(&self, ordinal: usize) -> Option<&UniqueTable<C>> {
        self.tables.get(ordinal.checked_sub(1)?)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Canonical ordinal to the hierarchical id of the table that claimed it.
    #[must_use]
    pub fn ordinal_ids(&self) -> BTreeMap<usize, String> {
        self.tables
            .iter()
            .map(|unique| (unique.ordinal, unique.table.id.clone()))
            .collect()
    }
}

/// Collapses tables with equal fingerprints, keeping the first occurrence.
pub fn deduplicate<C>(tables: Vec<TableNode<C>>) -> Deduplicated<C> {
    let mut seen: HashMap<TableFingerprint, usize> = HashMap::new();
    let mut unique: Vec<UniqueTable<C>> = Vec::new();

    for table in tables {
        let fingerprint = TableFingerprint::of(&table);
        if let Some(&index) = seen.get(&fingerprint) {
            tracing::debug!(
                id = %table.id,
                ordinal = unique[index].ordinal,
                "table duplicates an earlier table"
            );
            unique[index].duplicates.push(table);
            continue;
        }

        seen.insert(fingerprint, unique.len());
        unique.push(UniqueTable {
            ordinal: unique.len() + 1,
            fingerprint,
            table,
            duplicates: Vec::new(),
        });
    }

    Deduplicated { tables: unique }
}

/// Discovery followed by deduplication.
pub fn unique_tables<T: DocumentTree>(tree: &T) -> Deduplicated<T::CellRef> {
    deduplicate(discover_tables(tree))
}
