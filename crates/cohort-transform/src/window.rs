//! Temporal windowing of repeated measurements around an index event.
//!
//! For every index event (a tumor's date of diagnosis), every target offset
//! in years and both directions, the resolver picks the same-subject
//! measurement closest to the anchor `index + offset years`. A candidate
//! qualifies when its signed distance from the anchor has the direction's
//! sign (zero qualifies for neither) and its magnitude is strictly below the
//! tolerance. Equal distances go to the measurement seen first in input
//! order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDateTime;
use cohort_common::{add_years, day_delta, format_date, format_numeric};
use cohort_model::{Crosswalk, EntityId, Fact, PatientNum, VitalsConfig, WideTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Pre,
    Post,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Pre, Direction::Post];

    pub fn sign(self) -> i32 {
        match self {
            Self::Pre => -1,
            Self::Post => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => f.write_str("pre"),
            Self::Post => f.write_str("post"),
        }
    }
}

/// Index event of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEvent {
    pub subject: PatientNum,
    pub entity: EntityId,
    pub date: NaiveDateTime,
}

/// One numeric measurement of a subject.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub subject: PatientNum,
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    pub offsets_years: Vec<u32>,
    /// Exclusive bound on `|distance|` in days.
    pub tolerance_days: i64,
}

impl From<&VitalsConfig> for WindowSpec {
    fn from(config: &VitalsConfig) -> Self {
        Self {
            offsets_years: config.offsets_years.clone(),
            tolerance_days: config.tolerance_days,
        }
    }
}

/// Winning measurement for (entity, offset, direction).
#[derive(Debug, Clone, PartialEq)]
pub struct WindowHit {
    pub subject: PatientNum,
    pub entity: EntityId,
    pub offset_years: u32,
    pub direction: Direction,
    pub value: f64,
    pub observed: NaiveDateTime,
    /// Signed distance from the anchor in days.
    pub distance_days: f64,
}

/// Resolve the closest measurement per (entity, offset, direction).
///
/// Missing windows are simply absent from the result.
pub fn resolve_windows(
    events: &[IndexEvent],
    measurements: &[Measurement],
    spec: &WindowSpec,
) -> Vec<WindowHit> {
    let mut by_subject: BTreeMap<PatientNum, Vec<&Measurement>> = BTreeMap::new();
    for measurement in measurements {
        by_subject
            .entry(measurement.subject)
            .or_default()
            .push(measurement);
    }
    let tolerance = spec.tolerance_days as f64;

    let mut hits = Vec::new();
    for event in events {
        let Some(candidates) = by_subject.get(&event.subject) else {
            continue;
        };
        for &offset in &spec.offsets_years {
            let Some(anchor) = add_years(event.date, offset) else {
                continue;
            };
            for direction in Direction::ALL {
                let sign = f64::from(direction.sign());
                let mut best: Option<(&Measurement, f64)> = None;
                for &candidate in candidates {
                    let delta = day_delta(anchor, candidate.timestamp);
                    if delta.abs() >= tolerance || delta * sign <= 0.0 {
                        continue;
                    }
                    let closer = best.is_none_or(|(_, d)| delta.abs() < d.abs());
                    if closer {
                        best = Some((candidate, delta));
                    }
                }
                if let Some((winner, delta)) = best {
                    hits.push(WindowHit {
                        subject: event.subject,
                        entity: event.entity.clone(),
                        offset_years: offset,
                        direction,
                        value: winner.value,
                        observed: winner.timestamp,
                        distance_days: delta,
                    });
                }
            }
        }
    }
    hits
}

/// Generated field names for windowed measurements.
///
/// Fields are numbered from `base`: each offset uses four numbers (pre
/// value, pre date, post value, post date), e.g. `v116_bmi_pre_0yr` and
/// `v117_bmi_pre_0yr_date`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNaming {
    pub measure: String,
    pub base: u32,
}

impl FieldNaming {
    fn number(&self, offset_years: u32, direction: Direction) -> u32 {
        let slot = match direction {
            Direction::Pre => 0,
            Direction::Post => 2,
        };
        self.base + offset_years * 4 + slot
    }

    pub fn value_field(&self, offset_years: u32, direction: Direction) -> String {
        format!(
            "v{}_{}_{}_{}yr",
            self.number(offset_years, direction),
            self.measure,
            direction,
            offset_years
        )
    }

    pub fn date_field(&self, offset_years: u32, direction: Direction) -> String {
        format!(
            "v{}_{}_{}_{}yr_date",
            self.number(offset_years, direction) + 1,
            self.measure,
            direction,
            offset_years
        )
    }

    /// All fields for the given offsets, sorted.
    pub fn all_fields(&self, offsets_years: &[u32]) -> Vec<String> {
        let mut fields: Vec<String> = offsets_years
            .iter()
            .flat_map(|&offset| {
                Direction::ALL.into_iter().flat_map(move |direction| {
                    [
                        self.value_field(offset, direction),
                        self.date_field(offset, direction),
                    ]
                })
            })
            .collect();
        fields.sort();
        fields.dedup();
        fields
    }
}

impl From<&VitalsConfig> for FieldNaming {
    fn from(config: &VitalsConfig) -> Self {
        Self {
            measure: config.measure.clone(),
            base: config.base_field_number,
        }
    }
}

/// Index events: earliest start date per entity of facts with `concept_cd`.
pub fn index_events(facts: &[Fact], concept_cd: &str) -> Vec<IndexEvent> {
    let mut earliest: BTreeMap<EntityId, IndexEvent> = BTreeMap::new();
    for fact in facts.iter().filter(|f| f.concept_cd == concept_cd) {
        let Some(date) = fact.start_date else {
            continue;
        };
        let event = IndexEvent {
            subject: fact.patient_num,
            entity: fact.encounter_num.clone(),
            date,
        };
        earliest
            .entry(event.entity.clone())
            .and_modify(|current| {
                if date < current.date {
                    *current = event.clone();
                }
            })
            .or_insert(event);
    }
    earliest.into_values().collect()
}

/// Distinct measurements of facts whose concept code is in `concept_codes`,
/// in input order.
pub fn measurements(facts: &[Fact], concept_codes: &BTreeSet<String>) -> Vec<Measurement> {
    let mut seen = BTreeSet::new();
    facts
        .iter()
        .filter(|f| concept_codes.contains(&f.concept_cd))
        .filter_map(|f| {
            let timestamp = f.start_date?;
            let value = f.nval_num?;
            seen.insert((f.patient_num, timestamp, value.to_bits()))
                .then_some(Measurement {
                    subject: f.patient_num,
                    timestamp,
                    value,
                })
        })
        .collect()
}

/// Wide vitals table keyed by entity: value and de-identified date columns.
///
/// Hits for subjects missing from the crosswalk are dropped; the count is
/// returned alongside the table.
pub fn vitals_table(
    hits: &[WindowHit],
    crosswalk: &Crosswalk,
    naming: &FieldNaming,
    offsets_years: &[u32],
    key_column: &str,
) -> (WideTable, usize) {
    let mut table = WideTable::new("vitals", key_column, naming.all_fields(offsets_years));
    let mut dropped = 0usize;
    for hit in hits {
        let Some(observed) = crosswalk
            .shift(hit.subject)
            .and_then(|shift| shift.apply(hit.observed))
        else {
            dropped += 1;
            continue;
        };
        table.set(
            &hit.entity,
            &naming.value_field(hit.offset_years, hit.direction),
            format_numeric(hit.value),
        );
        table.set(
            &hit.entity,
            &naming.date_field(hit.offset_years, hit.direction),
            format_date(observed),
        );
    }
    if dropped > 0 {
        tracing::warn!(dropped, "windowed measurements without a date shift dropped");
    }
    (table, dropped)
}
