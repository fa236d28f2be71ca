// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════
mod segment_tests {
    use crate::accessor::{Accessor, FieldStrategy, accessor_for, accessor_with};
    use crate::binary::{read_vec, write_bytes};
    use crate::error::CodecError;
    use crate::formatter::{Formatter, FormatterResolver};
    use crate::record;
    use crate::schema::{FieldType, Schema};
    use crate::segment::{ObjectSegment, Segment, decode_record, encode_record, migrate_bytes};
    use crate::tracker::MutationTracker;
    use crate::types::BufferView;
    use crate::value::{FieldMap, FieldValue};
    use proptest::prelude::*;
    use smol_str::SmolStr;
    use std::cell::Cell;
    use std::sync::Arc;

    fn person() -> Arc<Accessor> {
        let schema = Schema::new("Person")
            .field(0, "id", FieldType::I32)
            .field(1, "name", FieldType::Text)
            .field(2, "age", FieldType::I32);
        accessor_for(&schema).unwrap()
    }

    fn person_bytes() -> Vec<u8> {
        encode_record(&person(), &record!({ "id" => 7i32, "name" => "ok", "age" => 30i32 })).unwrap()
    }

    fn player_v1() -> Schema {
        Schema::new("Player")
            .field(0, "id", FieldType::I32)
            .field(1, "name", FieldType::Text)
    }

    fn player_v2() -> Schema {
        player_v1()
            .field(2, "score", FieldType::I64)
            .field(3, "tag", FieldType::Text)
            .field(4, "level", FieldType::U32)
    }

    fn address_schema() -> Schema {
        Schema::new("Address")
            .field(0, "street", FieldType::Text)
            .field(1, "zip", FieldType::U32)
    }

    fn resident() -> Arc<Accessor> {
        let schema = Schema::new("Resident")
            .field(0, "id", FieldType::I32)
            .field(1, "address", FieldType::Object(Box::new(address_schema())))
            .field(2, "age", FieldType::I32);
        accessor_for(&schema).unwrap()
    }

    fn le(v: i32) -> [u8; 4] {
        v.to_le_bytes()
    }

    fn header(bytes: &[u8]) -> (i32, i32) {
        let size = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let last = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
        (size, last)
    }

    fn offsets(bytes: &[u8], count: usize) -> Vec<i32> {
        (0..count)
            .map(|i| i32::from_le_bytes(bytes[8 + i * 4..12 + i * 4].try_into().unwrap()))
            .collect()
    }

    /// `[a: i32 @0][note: text @1][gap: i32 @2][d: i32 @3]`, assembled by hand.
    fn gapped() -> Arc<Accessor> {
        let schema = Schema::new("Gapped")
            .field(0, "a", FieldType::I32)
            .field(1, "note", FieldType::Text)
            .field(2, "gap", FieldType::I32)
            .field(3, "d", FieldType::I32);
        accessor_for(&schema).unwrap()
    }

    fn gapped_bytes(table: [i32; 4], byte_size: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&le(byte_size));
        buf.extend_from_slice(&le(3));
        for offset in table {
            buf.extend_from_slice(&le(offset));
        }
        buf.extend_from_slice(&le(1)); // a @24
        buf.extend_from_slice(&le(5)); // note @28
        buf.extend_from_slice(b"hello");
        if table[3] != 0 {
            buf.extend_from_slice(&le(9)); // d @37
        }
        assert_eq!(buf.len(), byte_size as usize);
        buf
    }

    #[derive(Debug)]
    struct UuidFormatter;

    impl Formatter for UuidFormatter {
        fn type_name(&self) -> &str {
            "uuid"
        }

        fn fixed_length(&self) -> Option<usize> {
            Some(16)
        }

        fn default_value(&self) -> FieldValue {
            FieldValue::Bytes(vec![0; 16])
        }

        fn accepts(&self, value: &FieldValue) -> bool {
            matches!(value, FieldValue::Bytes(b) if b.len() == 16)
        }

        fn serialize(&self, buf: &mut Vec<u8>, offset: usize, value: &FieldValue) -> Result<usize, CodecError> {
            match value {
                FieldValue::Bytes(b) if b.len() == 16 => write_bytes(buf, offset, b),
                other => Err(CodecError::TypeMismatch {
                    expected: SmolStr::new_static("uuid"),
                    actual: other.kind_name(),
                }),
            }
        }

        fn deserialize(
            &self,
            bytes: &[Cell<u8>],
            offset: usize,
            _tracker: &MutationTracker,
        ) -> Result<(FieldValue, usize), CodecError> {
            Ok((FieldValue::Bytes(read_vec(bytes, offset, 16)?), 16))
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Layout
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_encode_exact_layout() {
        let bytes = person_bytes();

        let mut expected = Vec::new();
        expected.extend_from_slice(&le(34));
        expected.extend_from_slice(&le(2));
        expected.extend_from_slice(&le(20));
        expected.extend_from_slice(&le(24));
        expected.extend_from_slice(&le(30));
        expected.extend_from_slice(&le(7));
        expected.extend_from_slice(&le(2));
        expected.extend_from_slice(b"ok");
        expected.extend_from_slice(&le(30));

        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_empty_schema_is_header_only() {
        let acc = accessor_for(&Schema::new("Unit")).unwrap();
        let bytes = ObjectSegment::new_default(acc).unwrap().to_bytes().unwrap();
        assert_eq!(bytes, [8, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_wrap_reads_fields() {
        let mut bytes = person_bytes();
        let seg = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap();

        assert_eq!(seg.byte_size(), 34);
        assert_eq!(seg.binary_last_index(), 2);
        assert!(!seg.has_extra_region());
        assert!(!seg.is_detached());
        assert_eq!(seg.get_i32("id").unwrap(), 7);
        assert_eq!(seg.get_text("name").unwrap(), "ok");
        assert_eq!(seg.get_i32("age").unwrap(), 30);
        assert_eq!(seg.get_at(1).unwrap(), FieldValue::from("ok"));
        assert!(seg.has_field("age"));
        assert!(!seg.has_field("email"));
    }

    #[test]
    fn test_wrap_clamps_to_byte_size() {
        let mut bytes = person_bytes();
        bytes.extend_from_slice(&[0xaa; 6]);
        let seg = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap();

        assert_eq!(seg.byte_size(), 34);
        assert_eq!(seg.get_i32("age").unwrap(), 30);
        assert_eq!(seg.to_bytes().unwrap(), person_bytes());
    }

    #[test]
    fn test_variable_decodes_lazily() {
        let mut bytes = person_bytes();
        let seg = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap();

        assert!(!seg.is_cached("name").unwrap());
        assert_eq!(seg.get_i32("age").unwrap(), 30);
        assert!(!seg.is_cached("name").unwrap());
        assert_eq!(seg.get_text("name").unwrap(), "ok");
        assert!(seg.is_cached("name").unwrap());
    }

    #[test]
    fn test_serialize_at_offset() {
        let mut bytes = person_bytes();
        let seg = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap();

        let mut out = vec![0xee; 16];
        let written = seg.serialize(&mut out, 16).unwrap();
        assert_eq!(written, 34);
        assert_eq!(&out[..16], &[0xee; 16]);
        assert_eq!(&out[16..], person_bytes().as_slice());

        let cells = Cell::from_mut(out.as_mut_slice()).as_slice_of_cells();
        let view = BufferView::from_cells(cells, 16, 34).unwrap();
        assert!(BufferView::from_cells(cells, 16, 35).is_err());
        let copy = ObjectSegment::wrap(person(), view).unwrap();
        assert_eq!(copy.get_text("name").unwrap(), "ok");
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutation and write-back
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_fixed_set_in_place_stays_clean() {
        let mut bytes = person_bytes();
        {
            let mut seg = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap();
            seg.set("age", 31i32).unwrap();

            assert!(seg.can_direct_copy());
            assert!(!seg.tracker().is_dirty());
            assert_eq!(seg.get_i32("age").unwrap(), 31);

            let out = seg.to_bytes().unwrap();
            let mut expected = person_bytes();
            expected[30..34].copy_from_slice(&le(31));
            assert_eq!(out, expected);
        }
        // The wrapped buffer itself was overwritten.
        assert_eq!(&bytes[30..34], &le(31));
    }

    #[test]
    fn test_variable_set_forces_rebuild() {
        let mut bytes = person_bytes();
        let mut seg = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap();
        seg.set("name", "changed").unwrap();

        assert!(!seg.can_direct_copy());
        let mut out = seg.to_bytes().unwrap();
        assert_eq!(out.len(), 39);
        assert_eq!(header(&out), (39, 2));
        assert_eq!(offsets(&out, 3), vec![20, 24, 35]);

        let rewrapped = ObjectSegment::wrap(person(), BufferView::new(&mut out)).unwrap();
        assert_eq!(rewrapped.get_i32("id").unwrap(), 7);
        assert_eq!(rewrapped.get_text("name").unwrap(), "changed");
        assert_eq!(rewrapped.get_i32("age").unwrap(), 30);
    }

    #[test]
    fn test_serialize_twice_rebuilds_again() {
        let mut bytes = person_bytes();
        let mut seg = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap();
        seg.set("name", "changed").unwrap();

        let first = seg.to_bytes().unwrap();
        assert!(!seg.can_direct_copy());
        seg.set("age", 44i32).unwrap();
        let second = seg.to_bytes().unwrap();

        assert_eq!(first.len(), second.len());
        assert_eq!(&second[35..39], &le(44));
    }

    #[test]
    fn test_set_at_index() {
        let mut bytes = person_bytes();
        let mut seg = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap();
        seg.set_at(0, 99i32).unwrap();
        assert_eq!(seg.get_i32("id").unwrap(), 99);
    }

    #[test]
    fn test_shared_view_aliasing() {
        let mut bytes = person_bytes();
        let view = BufferView::new(&mut bytes);
        let mut writer = ObjectSegment::wrap(person(), view).unwrap();
        let reader = ObjectSegment::wrap(person(), view).unwrap();

        writer.set("age", 31i32).unwrap();
        assert_eq!(reader.get_i32("age").unwrap(), 31);
    }

    #[test]
    fn test_to_record() {
        let mut bytes = person_bytes();
        let seg = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap();
        let map = seg.to_record().unwrap();
        assert_eq!(map, record!({ "id" => 7i32, "name" => "ok", "age" => 30i32 }));
    }

    #[test]
    fn test_encode_fills_missing_with_defaults() {
        let mut bytes = encode_record(&person(), &record!({ "name" => "solo" })).unwrap();
        let map = decode_record(&person(), &mut bytes).unwrap();
        assert_eq!(map, record!({ "id" => 0i32, "name" => "solo", "age" => 0i32 }));
    }

    #[test]
    fn test_json_field() {
        let schema = Schema::new("Doc")
            .field(0, "id", FieldType::I32)
            .field(1, "body", FieldType::Json);
        let acc = accessor_for(&schema).unwrap();
        let body = serde_json::json!({ "tags": ["a", "b"], "n": 3 });

        let mut bytes = encode_record(&acc, &record!({ "id" => 1i32, "body" => (body.clone()) })).unwrap();
        let seg = ObjectSegment::wrap(acc, BufferView::new(&mut bytes)).unwrap();
        assert_eq!(seg.get_json("body").unwrap(), &body);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Absent fields and slicing
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_slice_skips_absent_successor() {
        let mut bytes = gapped_bytes([24, 28, 0, 37], 41);
        let seg = ObjectSegment::wrap(gapped(), BufferView::new(&mut bytes)).unwrap();

        let note = seg.raw_field("note").unwrap().unwrap();
        assert_eq!(note.len(), 9);
        assert_eq!(seg.get_text("note").unwrap(), "hello");
        assert_eq!(seg.get_i32("gap").unwrap(), 0);
        assert!(!seg.is_present("gap").unwrap());
        assert!(seg.raw_field("gap").unwrap().is_none());
        assert_eq!(seg.get_i32("d").unwrap(), 9);
        assert_eq!(seg.raw_field("d").unwrap().unwrap().len(), 4);
    }

    #[test]
    fn test_slice_runs_to_end_without_successor() {
        let mut bytes = gapped_bytes([24, 28, 0, 0], 37);
        let seg = ObjectSegment::wrap(gapped(), BufferView::new(&mut bytes)).unwrap();

        assert_eq!(seg.raw_field("note").unwrap().unwrap().len(), 9);
        assert_eq!(seg.get_text("note").unwrap(), "hello");
        assert_eq!(seg.get_i32("d").unwrap(), 0);
    }

    #[test]
    fn test_absent_fixed_field_cannot_be_set() {
        let mut bytes = gapped_bytes([24, 28, 0, 37], 41);
        let mut seg = ObjectSegment::wrap(gapped(), BufferView::new(&mut bytes)).unwrap();

        let err = seg.set("gap", 5i32).unwrap_err();
        assert!(matches!(err, CodecError::SchemaViolation(_)));
    }

    #[test]
    fn test_rebuild_materializes_absent_fields() {
        let mut bytes = gapped_bytes([24, 28, 0, 37], 41);
        let mut seg = ObjectSegment::wrap(gapped(), BufferView::new(&mut bytes)).unwrap();
        seg.set("note", "hi").unwrap();

        let mut out = seg.to_bytes().unwrap();
        let rewrapped = ObjectSegment::wrap(gapped(), BufferView::new(&mut out)).unwrap();
        assert!(rewrapped.is_present("gap").unwrap());
        assert_eq!(rewrapped.get_i32("gap").unwrap(), 0);
        assert_eq!(rewrapped.get_text("note").unwrap(), "hi");
        assert_eq!(rewrapped.get_i32("d").unwrap(), 9);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Schema evolution
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_older_binary_reads_new_fields_as_defaults() {
        let v1 = accessor_for(&player_v1()).unwrap();
        let v2 = accessor_for(&player_v2()).unwrap();
        let mut bytes = encode_record(&v1, &record!({ "id" => 5i32, "name" => "old" })).unwrap();
        assert_eq!(bytes.len(), 27);

        let seg = ObjectSegment::wrap(v2, BufferView::new(&mut bytes)).unwrap();
        assert!(seg.has_extra_region());
        assert!(seg.needs_migration());
        assert_eq!(seg.binary_last_index(), 1);
        assert_eq!(seg.get_i32("id").unwrap(), 5);
        assert_eq!(seg.get_text("name").unwrap(), "old");
        assert_eq!(seg.get_i64("score").unwrap(), 0);
        assert_eq!(seg.get_text("tag").unwrap(), "");
        assert_eq!(seg.get_u32("level").unwrap(), 0);
        assert!(!seg.is_present("score").unwrap());
    }

    #[test]
    fn test_older_binary_rebuilds_to_current_layout() {
        let v1 = accessor_for(&player_v1()).unwrap();
        let v2 = accessor_for(&player_v2()).unwrap();
        let mut bytes = encode_record(&v1, &record!({ "id" => 5i32, "name" => "old" })).unwrap();
        let seg = ObjectSegment::wrap(Arc::clone(&v2), BufferView::new(&mut bytes)).unwrap();

        // Clean, but the extra region has to be folded in.
        assert!(seg.can_direct_copy());
        let mut out = seg.to_bytes().unwrap();
        assert_eq!(header(&out), (55, 4));

        let current = ObjectSegment::wrap(v2, BufferView::new(&mut out)).unwrap();
        assert!(!current.has_extra_region());
        assert_eq!(current.get_text("name").unwrap(), "old");
        assert_eq!(current.get_i64("score").unwrap(), 0);
        assert_eq!(current.get_u32("level").unwrap(), 0);
    }

    #[test]
    fn test_extra_region_write_marks_dirty() {
        let v1 = accessor_for(&player_v1()).unwrap();
        let v2 = accessor_for(&player_v2()).unwrap();
        let mut bytes = encode_record(&v1, &record!({ "id" => 5i32, "name" => "old" })).unwrap();
        let mut seg = ObjectSegment::wrap(Arc::clone(&v2), BufferView::new(&mut bytes)).unwrap();

        seg.set("score", 99i64).unwrap();
        assert!(!seg.can_direct_copy());
        assert_eq!(seg.get_i64("score").unwrap(), 99);

        let mut out = seg.to_bytes().unwrap();
        let map = decode_record(&v2, &mut out).unwrap();
        assert_eq!(map.get("score"), Some(&FieldValue::I64(99)));
        assert_eq!(map.get("id"), Some(&FieldValue::I32(5)));
    }

    #[test]
    fn test_newer_binary_copies_unknown_fields() {
        let v1 = accessor_for(&player_v1()).unwrap();
        let v2 = accessor_for(&player_v2()).unwrap();
        let original = encode_record(
            &v2,
            &record!({ "id" => 5i32, "name" => "new", "score" => 12i64, "tag" => "x", "level" => 3u32 }),
        )
        .unwrap();

        let mut bytes = original.clone();
        let seg = ObjectSegment::wrap(v1, BufferView::new(&mut bytes)).unwrap();
        assert_eq!(seg.binary_last_index(), 4);
        assert!(!seg.has_extra_region());
        assert_eq!(seg.get_text("name").unwrap(), "new");
        assert_eq!(seg.to_bytes().unwrap(), original);
    }

    #[test]
    fn test_newer_binary_rebuild_drops_unknown_fields() {
        let v1 = accessor_for(&player_v1()).unwrap();
        let v2 = accessor_for(&player_v2()).unwrap();
        let mut bytes = encode_record(
            &v2,
            &record!({ "id" => 5i32, "name" => "new", "score" => 12i64, "tag" => "x", "level" => 3u32 }),
        )
        .unwrap();

        let mut seg = ObjectSegment::wrap(Arc::clone(&v1), BufferView::new(&mut bytes)).unwrap();
        seg.set("name", "renamed").unwrap();
        let mut out = seg.to_bytes().unwrap();
        assert_eq!(header(&out).1, 1);

        let seen_by_v2 = ObjectSegment::wrap(v2, BufferView::new(&mut out)).unwrap();
        assert_eq!(seen_by_v2.get_text("name").unwrap(), "renamed");
        assert_eq!(seen_by_v2.get_i64("score").unwrap(), 0);
    }

    #[test]
    fn test_migrate_bytes() {
        let v1 = accessor_for(&player_v1()).unwrap();
        let v2 = accessor_for(&player_v2()).unwrap();
        let mut bytes = encode_record(&v1, &record!({ "id" => 5i32, "name" => "old" })).unwrap();

        let mut migrated = migrate_bytes(&v2, &mut bytes).unwrap();
        assert_eq!(header(&migrated).1, 4);

        let again = migrate_bytes(&v2, &mut migrated.clone()).unwrap();
        assert_eq!(again, migrated);
        assert_eq!(decode_record(&v2, &mut migrated).unwrap().get("name"), Some(&FieldValue::from("old")));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Nested segments
    // ═══════════════════════════════════════════════════════════════════════

    fn resident_bytes() -> Vec<u8> {
        encode_record(
            &resident(),
            &record!({
                "id" => 1i32,
                "address" => { "street" => "Main", "zip" => 1010u32 },
                "age" => 40i32
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_nested_layout_is_relative() {
        let bytes = resident_bytes();
        assert_eq!(header(&bytes), (56, 2));
        assert_eq!(offsets(&bytes, 3), vec![20, 24, 52]);

        let nested = &bytes[24..52];
        assert_eq!(header(nested), (28, 1));
        assert_eq!(offsets(nested, 2), vec![16, 24]);
    }

    #[test]
    fn test_nested_reads() {
        let mut bytes = resident_bytes();
        let seg = ObjectSegment::wrap(resident(), BufferView::new(&mut bytes)).unwrap();

        let address = seg.nested("address").unwrap();
        assert_eq!(address.get_text("street").unwrap(), "Main");
        assert_eq!(address.get_u32("zip").unwrap(), 1010);
        assert_eq!(
            seg.get("address").unwrap(),
            FieldValue::Object(record!({ "street" => "Main", "zip" => 1010u32 }))
        );
        assert_eq!(seg.get_i32("age").unwrap(), 40);
    }

    #[test]
    fn test_nested_fixed_set_keeps_parent_clean() {
        let mut bytes = resident_bytes();
        let mut seg = ObjectSegment::wrap(resident(), BufferView::new(&mut bytes)).unwrap();
        seg.nested_mut("address").unwrap().set("zip", 2020u32).unwrap();

        assert!(seg.can_direct_copy());
        let mut out = seg.to_bytes().unwrap();
        let copy = ObjectSegment::wrap(resident(), BufferView::new(&mut out)).unwrap();
        assert_eq!(copy.nested("address").unwrap().get_u32("zip").unwrap(), 2020);
    }

    #[test]
    fn test_nested_variable_set_dirties_parent() {
        let mut bytes = resident_bytes();
        let mut seg = ObjectSegment::wrap(resident(), BufferView::new(&mut bytes)).unwrap();
        seg.nested_mut("address").unwrap().set("street", "Broadway").unwrap();

        assert!(!seg.can_direct_copy());
        assert!(seg.tracker().is_dirty());

        let mut out = seg.to_bytes().unwrap();
        let copy = ObjectSegment::wrap(resident(), BufferView::new(&mut out)).unwrap();
        let address = copy.nested("address").unwrap();
        assert_eq!(address.get_text("street").unwrap(), "Broadway");
        assert_eq!(address.get_u32("zip").unwrap(), 1010);
        assert_eq!(copy.get_i32("age").unwrap(), 40);
    }

    #[test]
    fn test_clean_nested_survives_shift() {
        let schema = Schema::new("Label")
            .field(0, "title", FieldType::Text)
            .field(1, "address", FieldType::Object(Box::new(address_schema())));
        let acc = accessor_for(&schema).unwrap();
        let mut bytes = encode_record(
            &acc,
            &record!({ "title" => "a", "address" => { "street" => "Main", "zip" => 7u32 } }),
        )
        .unwrap();

        let mut seg = ObjectSegment::wrap(Arc::clone(&acc), BufferView::new(&mut bytes)).unwrap();
        seg.set("title", "a much longer title").unwrap();
        assert!(seg.nested("address").unwrap().can_direct_copy());

        let mut out = seg.to_bytes().unwrap();
        let copy = ObjectSegment::wrap(acc, BufferView::new(&mut out)).unwrap();
        assert_eq!(copy.get_text("title").unwrap(), "a much longer title");
        assert_eq!(copy.nested("address").unwrap().get_text("street").unwrap(), "Main");
        assert_eq!(copy.nested("address").unwrap().get_u32("zip").unwrap(), 7);
    }

    #[test]
    fn test_absent_nested_is_default() {
        let v1 = Schema::new("Contact").field(0, "id", FieldType::I32);
        let v2 = v1
            .clone()
            .field(1, "address", FieldType::Object(Box::new(address_schema())));
        v1.check_evolution(&v2).unwrap();

        let mut bytes = encode_record(&accessor_for(&v1).unwrap(), &record!({ "id" => 3i32 })).unwrap();
        let acc = accessor_for(&v2).unwrap();
        let mut seg = ObjectSegment::wrap(Arc::clone(&acc), BufferView::new(&mut bytes)).unwrap();

        let address = seg.nested("address").unwrap();
        assert!(address.is_detached());
        assert_eq!(address.get_text("street").unwrap(), "");
        assert_eq!(address.get_u32("zip").unwrap(), 0);

        seg.nested_mut("address").unwrap().set("zip", 5u32).unwrap();
        assert!(!seg.can_direct_copy());

        let mut out = seg.to_bytes().unwrap();
        let copy = ObjectSegment::wrap(acc, BufferView::new(&mut out)).unwrap();
        assert_eq!(copy.get_i32("id").unwrap(), 3);
        assert_eq!(copy.nested("address").unwrap().get_u32("zip").unwrap(), 5);
    }

    #[test]
    fn test_set_nested_replaces_record() {
        let mut bytes = resident_bytes();
        let mut seg = ObjectSegment::wrap(resident(), BufferView::new(&mut bytes)).unwrap();

        let address = accessor_for(&address_schema()).unwrap();
        let replacement =
            ObjectSegment::from_record(address, &record!({ "street" => "Elm", "zip" => 9u32 })).unwrap();
        seg.set_nested("address", replacement).unwrap();
        assert!(!seg.can_direct_copy());

        let mut out = seg.to_bytes().unwrap();
        let map = decode_record(&resident(), &mut out).unwrap();
        assert_eq!(
            map.get("address"),
            Some(&FieldValue::Object(record!({ "street" => "Elm", "zip" => 9u32 })))
        );
    }

    #[test]
    fn test_set_nested_rejects_other_schema() {
        let mut bytes = resident_bytes();
        let mut seg = ObjectSegment::wrap(resident(), BufferView::new(&mut bytes)).unwrap();
        let other = ObjectSegment::new_default(person()).unwrap();

        let err = seg.set_nested("address", other).unwrap_err();
        assert!(matches!(err, CodecError::SchemaViolation(_)));
    }

    #[test]
    fn test_set_object_from_map() {
        let mut bytes = resident_bytes();
        let mut seg = ObjectSegment::wrap(resident(), BufferView::new(&mut bytes)).unwrap();
        assert!(matches!(seg.set("address", "Oak"), Err(CodecError::TypeMismatch { .. })));
        seg.set("address", record!({ "street" => "Oak" })).unwrap();

        let address = seg.nested("address").unwrap();
        assert_eq!(address.get_text("street").unwrap(), "Oak");
        assert_eq!(address.get_u32("zip").unwrap(), 0);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Errors
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_short_buffer_is_corrupt() {
        let mut bytes = vec![1, 0, 0];
        let err = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap_err();
        assert!(matches!(err, CodecError::CorruptData(_)));
    }

    #[test]
    fn test_byte_size_past_buffer_is_corrupt() {
        let mut bytes = person_bytes();
        bytes[0..4].copy_from_slice(&le(100));
        let err = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap_err();
        assert!(matches!(err, CodecError::CorruptData(_)));
    }

    #[test]
    fn test_last_index_overflow_is_corrupt() {
        let mut bytes = vec![0u8; 16];
        bytes[0..4].copy_from_slice(&le(16));
        bytes[4..8].copy_from_slice(&le(i32::MAX));
        let err = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap_err();
        assert!(matches!(err, CodecError::CorruptData(_)));
    }

    #[test]
    fn test_negative_fixed_offset_is_corrupt() {
        let mut bytes = person_bytes();
        bytes[8..12].copy_from_slice(&le(-4));
        let mut seg = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap();

        assert!(matches!(seg.get_i32("id"), Err(CodecError::CorruptData(_))));
        assert!(matches!(seg.set("id", 1i32), Err(CodecError::CorruptData(_))));
        assert!(matches!(seg.raw_field("id"), Err(CodecError::CorruptData(_))));

        // The rebuild copies `id` from its stored offset.
        seg.set("name", "x").unwrap();
        assert!(matches!(seg.to_bytes(), Err(CodecError::CorruptData(_))));
    }

    #[test]
    fn test_fixed_offset_past_payload_is_corrupt() {
        let mut bytes = person_bytes();
        bytes[16..20].copy_from_slice(&le(32));
        let mut seg = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap();

        assert!(matches!(seg.get_i32("age"), Err(CodecError::CorruptData(_))));
        assert!(matches!(seg.set("age", 31i32), Err(CodecError::CorruptData(_))));
        assert!(matches!(seg.to_record(), Err(CodecError::CorruptData(_))));
    }

    #[test]
    fn test_negative_variable_offset_is_corrupt() {
        let mut bytes = person_bytes();
        bytes[12..16].copy_from_slice(&le(-8));
        let err = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap_err();
        assert!(matches!(err, CodecError::CorruptData(_)));
    }

    #[test]
    fn test_variable_offset_past_payload_is_corrupt() {
        let mut bytes = person_bytes();
        bytes[12..16].copy_from_slice(&le(40));
        let err = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap_err();
        assert!(matches!(err, CodecError::CorruptData(_)));
    }

    #[test]
    fn test_index_out_of_range() {
        let mut bytes = person_bytes();
        let mut seg = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap();

        assert!(matches!(seg.get_at(3), Err(CodecError::SchemaViolation(_))));
        assert!(matches!(seg.get_at(-1), Err(CodecError::SchemaViolation(_))));
        assert!(matches!(seg.set_at(7, 1i32), Err(CodecError::SchemaViolation(_))));
    }

    #[test]
    fn test_unknown_name() {
        let mut bytes = person_bytes();
        let seg = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap();
        assert!(matches!(seg.get("email"), Err(CodecError::FieldNotFound(_))));
    }

    #[test]
    fn test_type_mismatch() {
        let mut bytes = person_bytes();
        let mut seg = ObjectSegment::wrap(person(), BufferView::new(&mut bytes)).unwrap();

        assert!(matches!(seg.set("name", 5i32), Err(CodecError::TypeMismatch { .. })));
        assert!(matches!(seg.set("age", "x"), Err(CodecError::TypeMismatch { .. })));
        assert!(matches!(seg.get_text("age"), Err(CodecError::TypeMismatch { .. })));
        assert!(matches!(seg.get_i64("age"), Err(CodecError::TypeMismatch { .. })));
        assert!(matches!(seg.nested("name"), Err(CodecError::TypeMismatch { .. })));
        // Failed writes leave the instance clean.
        assert!(seg.can_direct_copy());
    }

    #[test]
    fn test_unregistered_custom_type() {
        let schema = Schema::new("Ticket").field(0, "key", FieldType::Custom(SmolStr::new("uuid")));
        let err = accessor_for(&schema).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFieldType { .. }));
    }

    #[test]
    fn test_registered_custom_type() {
        let schema = Schema::new("Session")
            .field(0, "key", FieldType::Custom(SmolStr::new("uuid")))
            .field(1, "user", FieldType::Text);
        let resolver = FormatterResolver::new().with_formatter("uuid", Arc::new(UuidFormatter));
        let acc = accessor_with(&schema, &resolver).unwrap();
        assert!(matches!(acc.fields()[0].strategy, FieldStrategy::Fixed { size: 16, .. }));

        let key: Vec<u8> = (0..16).collect();
        let mut bytes = encode_record(&acc, &record!({ "key" => (key.clone()), "user" => "u1" })).unwrap();
        let mut seg = ObjectSegment::wrap(Arc::clone(&acc), BufferView::new(&mut bytes)).unwrap();
        assert_eq!(seg.get("key").unwrap(), FieldValue::Bytes(key));

        seg.set("key", vec![0xffu8; 16]).unwrap();
        assert!(seg.can_direct_copy());
        assert_eq!(seg.get("key").unwrap(), FieldValue::Bytes(vec![0xff; 16]));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Registry
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_registry_memoizes() {
        let a = person();
        let b = person();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_registry_first_resolver_wins() {
        let schema = Schema::new("Badge").field(0, "key", FieldType::Custom(SmolStr::new("uuid")));
        let resolver = FormatterResolver::new().with_formatter("uuid", Arc::new(UuidFormatter));
        let first = accessor_with(&schema, &resolver).unwrap();

        // Same fingerprint: the registered accessor comes back even though
        // this resolver cannot resolve `uuid`.
        let again = accessor_with(&schema, &FormatterResolver::new()).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(Arc::ptr_eq(&first, &accessor_for(&schema).unwrap()));

        // Outside the registry the resolver is always consulted.
        let err = Accessor::build(&schema, &FormatterResolver::new()).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFieldType { .. }));
    }

    #[test]
    fn test_nested_accessor_shared() {
        let outer = resident();
        let address = accessor_for(&address_schema()).unwrap();
        match &outer.fields()[1].strategy {
            FieldStrategy::NestedSegment { accessor } => assert!(Arc::ptr_eq(accessor, &address)),
            other => panic!("expected nested strategy, got {other:?}"),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Property tests
    // ═══════════════════════════════════════════════════════════════════════

    fn sample() -> Arc<Accessor> {
        let schema = Schema::new("Sample")
            .field(0, "id", FieldType::I32)
            .field(1, "name", FieldType::Text)
            .field(2, "score", FieldType::I64)
            .field(3, "active", FieldType::Bool)
            .field(4, "blob", FieldType::Bytes)
            .field(5, "ratio", FieldType::F64);
        accessor_for(&schema).unwrap()
    }

    proptest! {
        #[test]
        fn prop_encode_decode(
            id in any::<i32>(),
            name in ".{0,24}",
            score in any::<i64>(),
            active in any::<bool>(),
            blob in prop::collection::vec(any::<u8>(), 0..32),
            ratio in -1.0e6f64..1.0e6f64,
        ) {
            let acc = sample();
            let mut values = FieldMap::new();
            values.insert(SmolStr::new("id"), FieldValue::from(id));
            values.insert(SmolStr::new("name"), FieldValue::from(name));
            values.insert(SmolStr::new("score"), FieldValue::from(score));
            values.insert(SmolStr::new("active"), FieldValue::from(active));
            values.insert(SmolStr::new("blob"), FieldValue::from(blob));
            values.insert(SmolStr::new("ratio"), FieldValue::from(ratio));

            let mut bytes = encode_record(&acc, &values).unwrap();
            let (size, last) = header(&bytes);
            prop_assert_eq!(size as usize, bytes.len());
            prop_assert_eq!(last, 5);
            prop_assert_eq!(decode_record(&acc, &mut bytes).unwrap(), values);
        }

        #[test]
        fn prop_untouched_copy_is_identical(id in any::<i32>(), name in ".{0,24}") {
            let acc = sample();
            let mut values = FieldMap::new();
            values.insert(SmolStr::new("id"), FieldValue::from(id));
            values.insert(SmolStr::new("name"), FieldValue::from(name));

            let original = encode_record(&acc, &values).unwrap();
            let mut bytes = original.clone();
            let seg = ObjectSegment::wrap(acc, BufferView::new(&mut bytes)).unwrap();
            prop_assert!(seg.can_direct_copy());
            prop_assert_eq!(seg.to_bytes().unwrap(), original);
        }
    }
}
