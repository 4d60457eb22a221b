//! Tests for cohort-model types.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use cohort_model::{
    Crosswalk, CrosswalkEntry, DateShift, EntityId, ImportTemplate, PatientNum, RunConfig,
    StudyId, WideTable,
};
use proptest::prelude::*;

fn timestamp() -> impl Strategy<Value = NaiveDateTime> {
    (1950i32..2040, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60).prop_map(|(y, m, d, h, min)| {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid generated timestamp")
    })
}

proptest! {
    #[test]
    fn date_shift_is_invertible(ts in timestamp(), days in -3650i64..3650) {
        let shift = DateShift::days(days);
        let deidentified = shift.apply(ts).expect("in range");
        prop_assert_eq!(shift.invert(deidentified), Some(ts));
        prop_assert_eq!((ts - deidentified).num_days(), days);
    }

    #[test]
    fn melt_lists_every_cell(cells in prop::collection::btree_map(
        (1u32..50, 0usize..4),
        "[a-z0-9]{1,6}",
        0..40,
    )) {
        let columns: Vec<String> = (0..4).map(|c| format!("f{c}")).collect();
        let mut table = WideTable::new("t", "encounter_num", columns);
        let mut rows: BTreeMap<u32, BTreeMap<String, String>> = BTreeMap::new();
        for ((entity, column), value) in &cells {
            rows.entry(*entity).or_default().insert(format!("f{column}"), value.clone());
        }
        for (entity, row) in rows {
            table.insert_row(EntityId::from(i64::from(entity)), row).expect("unique keys");
        }
        let melted: Vec<(u32, String, String)> = table
            .melt()
            .into_iter()
            .map(|(key, field, value)| (key.as_str().parse().expect("numeric key"), field, value))
            .collect();
        let expected: Vec<(u32, String, String)> = cells
            .iter()
            .map(|((entity, column), value)| (*entity, format!("f{column}"), value.clone()))
            .collect();
        prop_assert_eq!(melted, expected);
    }
}

#[test]
fn crosswalk_rejects_reused_study_id() {
    let entries = vec![
        CrosswalkEntry {
            patient_num: PatientNum::new(1),
            study_id: StudyId::new("S1").unwrap(),
            date_shift: DateShift::days(3),
        },
        CrosswalkEntry {
            patient_num: PatientNum::new(2),
            study_id: StudyId::new("S1").unwrap(),
            date_shift: DateShift::days(5),
        },
    ];
    assert!(Crosswalk::from_entries(entries).is_err());
}

#[test]
fn template_conform_after_join() {
    let mut tumors = WideTable::new("tumor", "v00_tumorid", vec!["v01_studyid".to_string()]);
    tumors
        .insert_row(
            EntityId::from("S1:01"),
            BTreeMap::from([("v01_studyid".to_string(), "S1".to_string())]),
        )
        .unwrap();
    let mut items = WideTable::new("items", "v00_tumorid", vec!["v99_extra".to_string()]);
    items
        .insert_row(
            EntityId::from("S1:01"),
            BTreeMap::from([("v99_extra".to_string(), "x".to_string())]),
        )
        .unwrap();
    let joined = tumors.left_join(&items).unwrap();
    let template =
        ImportTemplate::from_headers(["v00_tumorid", "v01_studyid", "admin_complete"]).unwrap();
    let (conformed, report) = template.conform(&joined).unwrap();
    assert_eq!(conformed.records(), vec![vec!["S1:01", "S1", ""]]);
    assert_eq!(report.dropped_columns, ["v99_extra"]);
    assert_eq!(report.missing_in_data, ["admin_complete"]);
}

#[test]
fn config_toml_round_trip() {
    let config = RunConfig::default();
    let text = toml::to_string(&config).expect("serialize config");
    let back: RunConfig = toml::from_str(&text).expect("parse config");
    assert_eq!(back, config);
}
