//! Crosswalk building: consented roster -> MRNs -> warehouse patients.
//!
//! The roster must not repeat an MRN (or a study id), since every later
//! join would fan out. Identity lookups are batched; the batch size only
//! bounds the size of each lookup and never changes the result. Roster
//! subjects the identity source does not know are left out of the
//! crosswalk and reported.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use cohort_model::{
    ConsentedMrn, Crosswalk, CrosswalkEntry, IdentityRecord, ModelError, Mrn, RosterEntry,
    StudyId, SurveyOrderEntry,
};

/// Reject rosters with repeated MRNs or study ids.
pub fn validate_roster(roster: &[RosterEntry]) -> Result<(), ModelError> {
    let duplicates = |values: Vec<String>| -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut dups = BTreeSet::new();
        for value in values {
            if !seen.insert(value.clone()) {
                dups.insert(value);
            }
        }
        dups.into_iter().collect()
    };
    let dup_mrns = duplicates(roster.iter().map(|e| e.mrn.to_string()).collect());
    if !dup_mrns.is_empty() {
        tracing::error!(duplicate_count = dup_mrns.len(), "duplicate MRNs in roster");
        return Err(ModelError::DuplicateIdentifier {
            kind: "MRN in roster".to_string(),
            values: dup_mrns,
        });
    }
    let dup_studies = duplicates(roster.iter().map(|e| e.study_id.to_string()).collect());
    if !dup_studies.is_empty() {
        tracing::error!(duplicate_count = dup_studies.len(), "duplicate study ids in roster");
        return Err(ModelError::DuplicateIdentifier {
            kind: "study_id in roster".to_string(),
            values: dup_studies,
        });
    }
    Ok(())
}

/// Join survey orders to the roster on MRN, ordered by study id.
pub fn mix_survey_order(orders: &[SurveyOrderEntry], roster: &[RosterEntry]) -> Vec<ConsentedMrn> {
    let by_mrn: BTreeMap<&Mrn, &RosterEntry> = roster.iter().map(|e| (&e.mrn, e)).collect();
    let mut consented: Vec<ConsentedMrn> = orders
        .iter()
        .filter_map(|order| {
            by_mrn.get(&order.mrn).map(|entry| ConsentedMrn {
                study_id: entry.study_id.clone(),
                order_id: order.order_id.clone(),
                mrn: order.mrn.clone(),
            })
        })
        .collect();
    consented.sort();
    consented.dedup();
    tracing::info!(
        order_count = orders.len(),
        roster_count = roster.len(),
        consented_count = consented.len(),
        "joined survey orders to roster"
    );
    consented
}

/// MRN -> patient lookups against an identity store.
pub trait IdentitySource {
    /// Identity rows for the given MRNs. Unknown MRNs are simply absent.
    fn lookup(&self, mrns: &[Mrn]) -> Result<Vec<IdentityRecord>>;
}

/// Identity source backed by an exported identity table.
#[derive(Debug, Clone, Default)]
pub struct IdentityTable {
    by_mrn: BTreeMap<Mrn, BTreeSet<IdentityRecord>>,
}

impl IdentityTable {
    pub fn new(records: impl IntoIterator<Item = IdentityRecord>) -> Self {
        let mut by_mrn: BTreeMap<Mrn, BTreeSet<IdentityRecord>> = BTreeMap::new();
        for record in records {
            by_mrn.entry(record.mrn.clone()).or_default().insert(record);
        }
        Self { by_mrn }
    }

    pub fn len(&self) -> usize {
        self.by_mrn.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mrn.is_empty()
    }
}

impl IdentitySource for IdentityTable {
    fn lookup(&self, mrns: &[Mrn]) -> Result<Vec<IdentityRecord>> {
        Ok(mrns
            .iter()
            .filter_map(|mrn| self.by_mrn.get(mrn))
            .flatten()
            .cloned()
            .collect())
    }
}

/// Crosswalk plus the roster subjects it could not cover.
#[derive(Debug, Clone)]
pub struct CrosswalkResolution {
    pub crosswalk: Crosswalk,
    pub unresolved: Vec<StudyId>,
    pub lookup_count: usize,
}

/// Resolve consented MRNs to `{patient_num, study_id, date_shift}`.
///
/// Distinct MRNs are looked up in sorted batches of at most `batch_size`.
/// The combined result is validated as a [`Crosswalk`], so an identity
/// source that maps two study ids to one patient is an error.
pub fn resolve_crosswalk(
    source: &dyn IdentitySource,
    consented: &[ConsentedMrn],
    batch_size: usize,
) -> Result<CrosswalkResolution> {
    let batch_size = batch_size.max(1);
    let mrns: Vec<Mrn> = consented
        .iter()
        .map(|c| c.mrn.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut identities: BTreeSet<IdentityRecord> = BTreeSet::new();
    let mut lookup_count = 0usize;
    for batch in mrns.chunks(batch_size) {
        lookup_count += 1;
        let found = source
            .lookup(batch)
            .with_context(|| format!("identity lookup batch {lookup_count}"))?;
        tracing::debug!(
            batch = lookup_count,
            requested = batch.len(),
            found = found.len(),
            "identity lookup"
        );
        identities.extend(found);
    }

    let mut by_mrn: BTreeMap<&Mrn, Vec<&IdentityRecord>> = BTreeMap::new();
    for identity in &identities {
        by_mrn.entry(&identity.mrn).or_default().push(identity);
    }

    let mut entries = BTreeSet::new();
    let mut unresolved = BTreeSet::new();
    for subject in consented {
        match by_mrn.get(&subject.mrn) {
            Some(records) => {
                for record in records {
                    entries.insert(CrosswalkEntry {
                        patient_num: record.patient_num,
                        study_id: subject.study_id.clone(),
                        date_shift: record.date_shift,
                    });
                }
            }
            None => {
                unresolved.insert(subject.study_id.clone());
            }
        }
    }
    let crosswalk = Crosswalk::from_entries(entries)?;
    if !unresolved.is_empty() {
        tracing::warn!(
            unresolved_count = unresolved.len(),
            "consented subjects without a warehouse patient"
        );
    }
    tracing::info!(
        crosswalk_count = crosswalk.len(),
        lookup_count,
        "resolved crosswalk"
    );
    Ok(CrosswalkResolution {
        crosswalk,
        unresolved: unresolved.into_iter().collect(),
        lookup_count,
    })
}
