//! EAV pivot engine.
//!
//! Long-format cells become one row per entity and one column per
//! dictionary field. When several values land on the same
//! (entity, attribute) pair the smallest value wins, so the result never
//! depends on input order. Attributes missing from the dictionary are
//! dropped and counted; dictionary fields with no data become all-null
//! columns.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use cohort_common::format_date;
use cohort_model::{
    AttributeId, Crosswalk, EavCell, EntityId, FieldDictionary, Observation, PatientNum,
    WideTable,
};

/// Counts describing one pivot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PivotReport {
    pub cell_count: usize,
    pub entity_count: usize,
    /// Attributes present in data but not in the dictionary.
    pub unknown_attributes: BTreeSet<AttributeId>,
    pub unknown_cell_count: usize,
    /// (entity, attribute) pairs that had more than one distinct value.
    pub collision_count: usize,
    /// Dictionary fields without any value.
    pub empty_columns: Vec<String>,
}

impl PivotReport {
    fn absorb(&mut self, other: PivotReport) {
        self.cell_count += other.cell_count;
        self.unknown_attributes.extend(other.unknown_attributes);
        self.unknown_cell_count += other.unknown_cell_count;
        self.collision_count += other.collision_count;
    }
}

/// Pivot cells into a wide table keyed by entity.
pub fn pivot(
    name: &str,
    key_column: &str,
    cells: &[EavCell],
    dictionary: &FieldDictionary,
) -> Result<(WideTable, PivotReport)> {
    let mut report = PivotReport {
        cell_count: cells.len(),
        ..PivotReport::default()
    };
    let mut grouped: BTreeMap<(&EntityId, &AttributeId), BTreeSet<&str>> = BTreeMap::new();
    for cell in cells {
        let value = cell.value.trim();
        if value.is_empty() {
            continue;
        }
        if dictionary.get(&cell.attribute).is_none() {
            report.unknown_attributes.insert(cell.attribute.clone());
            report.unknown_cell_count += 1;
            continue;
        }
        grouped
            .entry((&cell.entity_id, &cell.attribute))
            .or_default()
            .insert(value);
    }

    let mut rows: BTreeMap<&EntityId, BTreeMap<String, String>> = BTreeMap::new();
    for ((entity, attribute), values) in grouped {
        if values.len() > 1 {
            report.collision_count += 1;
        }
        let (Some(def), Some(value)) = (dictionary.get(attribute), values.first()) else {
            continue;
        };
        rows.entry(entity)
            .or_default()
            .insert(def.field_name.clone(), (*value).to_string());
    }

    let mut table = WideTable::new(name, key_column, dictionary.field_names());
    for (entity, row) in rows {
        table.insert_row(entity.clone(), row)?;
    }
    report.entity_count = table.len();
    report.empty_columns = table
        .columns()
        .iter()
        .filter(|column| table.non_null_count(column) == 0)
        .cloned()
        .collect();
    if report.unknown_cell_count > 0 {
        tracing::warn!(
            table = name,
            unknown_cells = report.unknown_cell_count,
            unknown_attributes = report.unknown_attributes.len(),
            "dropped cells with attributes missing from the field dictionary"
        );
    }
    if report.collision_count > 0 {
        tracing::debug!(
            table = name,
            collisions = report.collision_count,
            "kept minimum value for colliding cells"
        );
    }
    Ok((table, report))
}

/// Inverse of [`pivot`]: every non-null dictionary cell as an EAV cell.
pub fn melt(table: &WideTable, dictionary: &FieldDictionary) -> Vec<EavCell> {
    let mut cells: Vec<EavCell> = table
        .melt()
        .into_iter()
        .filter_map(|(entity, field, value)| {
            let def = dictionary.field(&field)?;
            Some(EavCell::new(entity, def.attribute.clone(), value))
        })
        .collect();
    cells.sort();
    cells
}

/// Cells for coded observations.
pub fn coded_cells(observations: &[Observation]) -> Vec<EavCell> {
    observations
        .iter()
        .filter_map(|obs| {
            obs.code()
                .map(|code| EavCell::new(obs.entity_id.clone(), obs.attribute.clone(), code))
        })
        .collect()
}

/// Date cells for dated observations, shifted per subject.
#[derive(Debug, Clone, Default)]
pub struct DatedCells {
    pub cells: Vec<EavCell>,
    /// Subjects with dated observations but no crosswalk entry.
    pub unshifted_subjects: BTreeSet<PatientNum>,
    pub unshifted_count: usize,
}

/// De-identify dated observations: `date - shift`, formatted `YYYY-MM-DD`.
///
/// Observations of subjects missing from the crosswalk are dropped and
/// counted.
pub fn dated_cells(observations: &[Observation], crosswalk: &Crosswalk) -> DatedCells {
    let mut dated = DatedCells::default();
    for obs in observations.iter().filter(|obs| obs.is_dated()) {
        let shifted = crosswalk
            .shift(obs.subject_id)
            .zip(obs.timestamp)
            .and_then(|(shift, ts)| shift.apply(ts));
        match shifted {
            Some(ts) => dated.cells.push(EavCell::new(
                obs.entity_id.clone(),
                obs.attribute.clone(),
                format_date(ts),
            )),
            None => {
                dated.unshifted_subjects.insert(obs.subject_id);
                dated.unshifted_count += 1;
            }
        }
    }
    if dated.unshifted_count > 0 {
        tracing::warn!(
            observations = dated.unshifted_count,
            subjects = dated.unshifted_subjects.len(),
            "dated observations without a date shift dropped"
        );
    }
    dated
}

/// Result of pivoting coded and dated registry observations together.
#[derive(Debug, Clone)]
pub struct RegistryPivot {
    pub table: WideTable,
    pub report: PivotReport,
    pub unshifted_subjects: BTreeSet<PatientNum>,
    /// Attributes observed both coded and dated; the coded values are kept.
    pub mixed_attributes: BTreeSet<AttributeId>,
}

/// Pivot coded and dated observations independently and left-join both
/// onto the entities that have at least one registry item observation,
/// coded or dated. Every dictionary field is a column of the result.
pub fn pivot_registry(
    name: &str,
    key_column: &str,
    observations: &[Observation],
    dictionary: &FieldDictionary,
    crosswalk: &Crosswalk,
) -> Result<RegistryPivot> {
    let coded = coded_cells(observations);
    let coded_attributes: BTreeSet<AttributeId> =
        coded.iter().map(|cell| cell.attribute.clone()).collect();
    let dated = dated_cells(observations, crosswalk);
    let mut mixed_attributes = BTreeSet::new();
    let dated_only: Vec<EavCell> = dated
        .cells
        .into_iter()
        .filter(|cell| {
            let mixed = coded_attributes.contains(&cell.attribute);
            if mixed {
                mixed_attributes.insert(cell.attribute.clone());
            }
            !mixed
        })
        .collect();
    let dated_attributes: BTreeSet<AttributeId> =
        dated_only.iter().map(|cell| cell.attribute.clone()).collect();

    let (coded_table, mut report) = pivot(
        name,
        key_column,
        &coded,
        &dictionary.restricted_to(&coded_attributes),
    )?;
    let (dated_table, dated_report) = pivot(
        name,
        key_column,
        &dated_only,
        &dictionary.restricted_to(&dated_attributes),
    )?;
    report.absorb(dated_report);

    let entities: BTreeSet<&EntityId> = observations
        .iter()
        .filter(|obs| matches!(obs.attribute, AttributeId::Item(_)))
        .map(|obs| &obs.entity_id)
        .collect();
    let mut base = WideTable::new(name, key_column, Vec::new());
    for entity in entities {
        base.insert_row(entity.clone(), BTreeMap::new())?;
    }
    let table = base
        .left_join(&coded_table)?
        .left_join(&dated_table)?
        .with_columns(&dictionary.field_names());
    report.entity_count = table.len();
    report.empty_columns = table
        .columns()
        .iter()
        .filter(|column| table.non_null_count(column) == 0)
        .cloned()
        .collect();
    tracing::info!(
        table = name,
        entity_count = report.entity_count,
        coded_cells = coded.len(),
        dated_cells = dated_only.len(),
        "pivoted registry observations"
    );
    Ok(RegistryPivot {
        table,
        report,
        unshifted_subjects: dated.unshifted_subjects,
        mixed_attributes,
    })
}
