//! Chunked output against the single-file encoding.

use std::fs;

use cohort_output::{encode_csv, write_chunked, write_frame};
use cohort_transform::{RecordFrame, read_record_frame, string_frame};
use proptest::prelude::*;

fn frame(values: &[(String, Option<String>)]) -> RecordFrame {
    let header = vec!["record_id".to_string(), "note".to_string()];
    let ids = values.iter().map(|(id, _)| Some(id.clone())).collect();
    let notes = values.iter().map(|(_, note)| note.clone()).collect();
    RecordFrame::new("notes", "record_id", string_frame(&header, vec![ids, notes]).unwrap())
}

proptest! {
    #[test]
    fn chunks_concatenate_to_the_single_file(
        values in prop::collection::vec(
            ("[a-z0-9]{1,4}", prop::option::of("[a-z ,\"]{1,6}")),
            1..40,
        ),
        chunk_size in 1usize..50,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let frame = frame(&values);
        let output = write_chunked(&frame, &dir.path().join("notes.csv"), chunk_size).unwrap();
        prop_assert_eq!(output.paths.len(), values.len().div_ceil(chunk_size));

        let mut joined = String::new();
        for (idx, path) in output.paths.iter().enumerate() {
            let text = fs::read_to_string(path).unwrap();
            if idx == 0 {
                joined.push_str(&text);
            } else {
                let (_, body) = text.split_once('\n').unwrap();
                joined.push_str(body);
            }
        }
        let whole = String::from_utf8(encode_csv(&frame.data).unwrap()).unwrap();
        prop_assert_eq!(joined, whole);
    }
}

#[test]
fn written_frame_reads_back_with_its_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("site").join("per_tumor.csv");
    let frame = frame(&[
        ("S1:01".to_string(), Some("english".to_string())),
        ("S1:02".to_string(), None),
    ]);
    write_frame(&frame, &path).unwrap();

    let read = read_record_frame(&path, None).unwrap();
    assert_eq!(read.key_column, "record_id");
    assert_eq!(read.key_values().unwrap(), vec!["S1:01", "S1:02"]);
    assert_eq!(read.name, "per_tumor");
}
