//! Warehouse concept-code parsing.
//!
//! Registry facts carry their attribute and value inside `concept_cd`:
//! `NAACCR|380:01` is item 380 with code `01`, `NAACCR|390:` is item 390
//! whose datum is the fact's start date, and `SEER_SITE:26000` is the
//! `SEER_SITE` concept with code `26000`.

use cohort_model::{AttributeId, Fact, Observation, ObservationValue};

/// A parsed concept code. `code` is `None` for dated (empty-code) concepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptCode {
    pub attribute: AttributeId,
    pub code: Option<String>,
}

impl ConceptCode {
    /// Parse `concept_cd`. Codes starting with `item_prefix` must have a
    /// numeric item; anything else needs a `SCHEME:CODE` form.
    pub fn parse(concept_cd: &str, item_prefix: &str) -> Option<Self> {
        let concept_cd = concept_cd.trim();
        if let Some(rest) = concept_cd.strip_prefix(item_prefix) {
            let (item, code) = rest.split_once(':')?;
            let item = item.trim().parse::<u32>().ok()?;
            return Some(Self {
                attribute: AttributeId::Item(item),
                code: non_blank(code),
            });
        }
        let (scheme, code) = concept_cd.split_once(':')?;
        if scheme.trim().is_empty() {
            return None;
        }
        Some(Self {
            attribute: AttributeId::Concept(scheme.trim().to_string()),
            code: non_blank(code),
        })
    }
}

fn non_blank(code: &str) -> Option<String> {
    let code = code.trim();
    (!code.is_empty()).then(|| code.to_string())
}

/// Code part after the first `:` (`SEER_SITE:26000` -> `26000`).
pub fn code_suffix(concept_cd: &str) -> &str {
    concept_cd
        .split_once(':')
        .map_or(concept_cd, |(_, code)| code)
}

/// Turn a fact into an observation when its concept code parses.
///
/// Coded facts yield `Code`, empty-code facts with a numeric value yield
/// `Number`, and other empty-code facts yield a dated `Marker`.
pub fn observation_from_fact(fact: &Fact, item_prefix: &str) -> Option<Observation> {
    let parsed = ConceptCode::parse(&fact.concept_cd, item_prefix)?;
    let value = match (parsed.code, fact.nval_num) {
        (Some(code), _) => ObservationValue::Code(code),
        (None, Some(number)) => ObservationValue::Number(number),
        (None, None) => ObservationValue::Marker,
    };
    Some(Observation {
        subject_id: fact.patient_num,
        entity_id: fact.encounter_num.clone(),
        attribute: parsed.attribute,
        value,
        timestamp: fact.start_date,
    })
}

/// Parse every fact whose concept code starts with one of `prefixes`.
///
/// Returns the observations and the number of matching facts whose codes
/// could not be parsed.
pub fn facts_to_observations(
    facts: &[Fact],
    item_prefix: &str,
    prefixes: &[&str],
) -> (Vec<Observation>, usize) {
    let mut observations = Vec::new();
    let mut unparsed = 0usize;
    for fact in facts {
        if !prefixes.iter().any(|p| fact.concept_cd.starts_with(p)) {
            continue;
        }
        match observation_from_fact(fact, item_prefix) {
            Some(observation) => observations.push(observation),
            None => unparsed += 1,
        }
    }
    if unparsed > 0 {
        tracing::warn!(unparsed, "concept codes could not be parsed");
    }
    (observations, unparsed)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use cohort_model::{EntityId, PatientNum};

    use super::*;

    const NAACCR: &str = "NAACCR|";

    #[test]
    fn naaccr_coded_and_dated() {
        assert_eq!(
            ConceptCode::parse("NAACCR|380:01", NAACCR),
            Some(ConceptCode {
                attribute: AttributeId::Item(380),
                code: Some("01".to_string()),
            })
        );
        assert_eq!(
            ConceptCode::parse("NAACCR|390:", NAACCR),
            Some(ConceptCode {
                attribute: AttributeId::Item(390),
                code: None,
            })
        );
        assert_eq!(ConceptCode::parse("NAACCR|abc:1", NAACCR), None);
        assert_eq!(ConceptCode::parse("NAACCR|380", NAACCR), None);
    }

    #[test]
    fn scheme_codes() {
        assert_eq!(
            ConceptCode::parse("SEER_SITE:26000", NAACCR),
            Some(ConceptCode {
                attribute: AttributeId::Concept("SEER_SITE".to_string()),
                code: Some("26000".to_string()),
            })
        );
        assert_eq!(ConceptCode::parse("no-colon", NAACCR), None);
        assert_eq!(ConceptCode::parse(":x", NAACCR), None);
        assert_eq!(code_suffix("DEM|LANGUAGE:eng"), "eng");
        assert_eq!(code_suffix("plain"), "plain");
    }

    #[test]
    fn facts_become_observations() {
        let ts = NaiveDate::from_ymd_opt(2014, 6, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
        let fact = |concept_cd: &str, nval_num: Option<f64>| Fact {
            patient_num: PatientNum::new(7),
            encounter_num: EntityId::from("70"),
            concept_cd: concept_cd.to_string(),
            start_date: ts,
            end_date: None,
            instance_num: None,
            nval_num,
        };
        let facts = vec![
            fact("NAACCR|380:01", None),
            fact("NAACCR|390:", None),
            fact("NAACCR|bad", None),
            fact("RXCUI:123", None),
        ];
        let (observations, unparsed) = facts_to_observations(&facts, NAACCR, &[NAACCR]);
        assert_eq!(observations.len(), 2);
        assert_eq!(unparsed, 1);
        assert_eq!(observations[0].code(), Some("01"));
        assert!(observations[1].is_dated());

        let numeric = observation_from_fact(&fact("LOINC:39156-5", None), NAACCR).unwrap();
        assert_eq!(numeric.code(), Some("39156-5"));
        let measured = observation_from_fact(&fact("VITAL:", Some(27.5)), NAACCR).unwrap();
        assert_eq!(measured.value, ObservationValue::Number(27.5));
    }
}
