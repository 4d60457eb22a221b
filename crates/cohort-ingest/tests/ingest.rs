//! Integration tests for cohort-ingest readers.

use std::collections::BTreeMap;
use std::fs;

use cohort_ingest::{
    ConceptCode, FixedWidthReader, LayoutItem, RecordLayout, facts_to_observations,
    read_concepts, read_facts, read_records, read_validations,
};
use cohort_model::{AttributeId, FieldDictionary};
use proptest::prelude::*;

#[test]
fn naaccr_extract_from_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout_path = dir.path().join("layout.csv");
    fs::write(
        &layout_path,
        "item,name,column_start,column_end\n\
         20,Patient ID Number,1,8\n\
         380,Sequence Number--Central,9,10\n\
         390,Date of Diagnosis,11,18\n\
         9999,Reserved,,\n",
    )
    .expect("write layout");
    let dd_path = dir.path().join("dd.csv");
    fs::write(
        &dd_path,
        "field_name,text_validation_type_or_show_slider_number\n\
         v15_0380_sequence_numbercentral,\n\
         v21_0390_date_of_diagnosis,date_ymd\n",
    )
    .expect("write dictionary");
    let data_path = dir.path().join("naaccr.dat");
    fs::write(&data_path, "000001230120150410\n0000045602\n").expect("write data");

    let layout = RecordLayout::read(&layout_path).expect("layout");
    assert_eq!(layout.len(), 3);

    let field_names: Vec<String> = read_records(&dd_path, &["field_name"])
        .expect("records")
        .into_iter()
        .filter_map(|row| row.get("field_name").cloned())
        .collect();
    let dictionary = FieldDictionary::from_template_columns(&field_names)
        .expect("dictionary")
        .with_validations(&read_validations(&dd_path).expect("validations"));

    let reader =
        FixedWidthReader::new(&layout_path, &layout, &dictionary, 20, "mrn").expect("reader");
    let read = reader.read_file(&data_path).expect("read");
    assert_eq!(read.line_count, 2);
    let by_key: BTreeMap<(String, String), String> = read
        .cells
        .iter()
        .map(|c| {
            (
                (c.entity_id.to_string(), c.attribute.to_string()),
                c.value.clone(),
            )
        })
        .collect();
    assert_eq!(by_key[&("00000123".into(), "380".into())], "01");
    assert_eq!(by_key[&("00000123".into(), "390".into())], "2015-04-10");
    assert_eq!(by_key[&("00000456".into(), "380".into())], "02");
    assert!(!by_key.contains_key(&("00000456".into(), "390".into())));
}

#[test]
fn facts_and_concepts_exports() {
    let dir = tempfile::tempdir().expect("tempdir");
    let facts_path = dir.path().join("observation_fact.csv");
    fs::write(
        &facts_path,
        "patient_num,encounter_num,concept_cd,start_date,end_date,instance_num,nval_num\n\
         1,10,NAACCR|380:01,2014-03-02,,,\n\
         1,10,SEER_SITE:26000,2014-03-02,,,\n\
         1,55,RXCUI:123,2014-05-01 08:00,2014-05-02 08:00,3,\n",
    )
    .expect("write facts");
    let facts = read_facts(&facts_path).expect("facts");
    assert_eq!(facts[2].instance_num, Some(3));

    let (observations, unparsed) =
        facts_to_observations(&facts, "NAACCR|", &["NAACCR|", "SEER_SITE:"]);
    assert_eq!(unparsed, 0);
    assert_eq!(observations.len(), 2);
    assert_eq!(
        observations[1].attribute,
        AttributeId::Concept("SEER_SITE".to_string())
    );

    let concepts_path = dir.path().join("concept_dimension.csv");
    fs::write(
        &concepts_path,
        "concept_path,concept_cd,name_char\n\
         \\i2b2\\Medications\\[AN000] ANTINEOPLASTICS\\,,[AN000] ANTINEOPLASTICS\n\
         \\i2b2\\Medications\\[AN000] ANTINEOPLASTICS\\RXCUI:1\\,RXCUI:1,drug\n",
    )
    .expect("write concepts");
    let concepts = read_concepts(&concepts_path).expect("concepts");
    assert_eq!(concepts.len(), 2);
    assert_eq!(concepts[1].parent_path(), concepts[0].concept_path);
}

proptest! {
    #[test]
    fn registry_codes_carry_item_and_code(item in 1u32..10_000, code in "[0-9A-Z]{0,5}") {
        let parsed = ConceptCode::parse(&format!("NAACCR|{item}:{code}"), "NAACCR|").unwrap();
        prop_assert_eq!(parsed.attribute, AttributeId::Item(item));
        prop_assert_eq!(parsed.code, (!code.is_empty()).then_some(code));
    }

    #[test]
    fn short_lines_have_no_value_for_the_item(line in "[0-9 ]{0,30}", start in 1usize..20, width in 1usize..10) {
        let item = LayoutItem {
            item: 380,
            name: String::new(),
            column_start: start,
            column_end: start + width - 1,
        };
        match item.slice(line.as_bytes()) {
            Some(text) => {
                prop_assert!(line.len() >= item.column_end);
                prop_assert_eq!(text.as_ref(), &line[start - 1..item.column_end]);
            }
            None => prop_assert!(line.len() < item.column_end),
        }
    }
}
