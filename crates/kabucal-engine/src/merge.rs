//! Outer merge of per-source observations by company code.

use std::collections::BTreeMap;

use kabucal_core::{CompanyCode, CompanyObservation, SourceDatetime};

/// Every source's view of one company. `source_datetimes` has one entry per
/// requested source, in request order, whether or not that source reported
/// the company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedCompany {
    pub code: CompanyCode,
    pub name: String,
    pub source_datetimes: Vec<SourceDatetime>,
}

/// Merges `per_source` (one `(source name, rows)` pair per requested source,
/// in priority order) into one record per distinct code, sorted by code.
///
/// The name comes from the first source, in priority order, that supplied a
/// non-empty one. When a source lists a code more than once, its first
/// non-null datetime is kept.
#[must_use]
pub fn outer_merge(per_source: &[(String, Vec<CompanyObservation>)]) -> Vec<MergedCompany> {
    let empty_columns: Vec<SourceDatetime> = per_source
        .iter()
        .map(|(source, _)| SourceDatetime {
            source: source.clone(),
            datetime: None,
        })
        .collect();

    let mut merged: BTreeMap<CompanyCode, MergedCompany> = BTreeMap::new();

    for (column, (_, rows)) in per_source.iter().enumerate() {
        for row in rows {
            let entry = merged
                .entry(row.code.clone())
                .or_insert_with(|| MergedCompany {
                    code: row.code.clone(),
                    name: String::new(),
                    source_datetimes: empty_columns.clone(),
                });

            if entry.name.is_empty() && !row.name.trim().is_empty() {
                entry.name = row.name.trim().to_string();
            }

            let slot = &mut entry.source_datetimes[column].datetime;
            if slot.is_none() {
                *slot = row.datetime;
            }
        }
    }

    merged.into_values().collect()
}
