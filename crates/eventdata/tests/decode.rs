use std::sync::Arc;

use assert_matches::assert_matches;
use eventdata::{
    ByteOrder, Catalog, DecodeConfig, DecodeError, DecodePlan, Decoder, ElementType, Error, FieldMeta,
    PointerWidth, Record, RecordSchema, Scalar, ScalarRepr, SchemaError, Target, Value,
};
use proptest::prelude::*;

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Transfer {
    len: u16,
    #[event_data(length = "len")]
    data: Vec<u8>,
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Pair {
    #[event_data(count = 2)]
    items: Vec<u32>,
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Header {
    kind: u16,
    flags: u16,
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Framed {
    header: Header,
    tail: u16,
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Signed {
    count: i8,
    #[event_data(length = "count")]
    values: Vec<i16>,
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Handles {
    #[event_data(pointer)]
    object: u64,
    n: u8,
    #[event_data(pointer, length = "n")]
    extra: Vec<u64>,
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Sample {
    id: u8,
    temperature: f32,
    offset: i32,
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Batch {
    n: u8,
    #[event_data(length = "n")]
    samples: Vec<Sample>,
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct SamplePair {
    samples: [Sample; 2],
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Chunk {
    n: u8,
    #[event_data(length = "n")]
    bytes: Vec<u8>,
    tail: u16,
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct ChunkPair {
    chunks: [Chunk; 2],
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Oversized {
    tag: u8,
    #[event_data(count = 1u64 << 40)]
    data: Vec<u8>,
}

#[test]
fn test_variable_array() {
    let data = [0x03, 0x00, 0xAA, 0xBB, 0xCC];

    let (t, consumed) = eventdata::decode::<Transfer>(&data, 0, data.len()).unwrap();
    assert_eq!(t.len, 3);
    assert_eq!(t.data, vec![0xAA, 0xBB, 0xCC]);
    assert_eq!(consumed, 5);

    let fields = eventdata::decode_to_mapping::<Transfer>(&data, 0, data.len()).unwrap();
    assert_eq!(fields.get("len"), Some(&Value::Scalar(Scalar::U16(3))));
    assert_eq!(
        fields.get("data").and_then(Value::to_bytes),
        Some(vec![0xAA, 0xBB, 0xCC])
    );
    assert_eq!(fields.consumed(), 5);
}

#[test]
fn test_zero_length_array() {
    let data = [0x00, 0x00, 0xFF];
    let (t, consumed) = eventdata::decode::<Transfer>(&data, 0, data.len()).unwrap();
    assert!(t.data.is_empty());
    assert_eq!(consumed, 2);
}

#[test]
fn test_decode_into_reuses_instance() {
    let mut t = Transfer {
        len: 9,
        data: vec![1; 9],
    };
    let data = [0x01, 0x00, 0x42];
    let consumed = eventdata::decode_into(&mut t, &data, 0, data.len()).unwrap();
    assert_eq!(consumed, 3);
    assert_eq!(t, Transfer { len: 1, data: vec![0x42] });
}

#[test]
fn test_fixed_array() {
    let data = [0x01, 0, 0, 0, 0x02, 0, 0, 0];
    let (p, consumed) = eventdata::decode::<Pair>(&data, 0, data.len()).unwrap();
    assert_eq!(p.items, vec![1, 2]);
    assert_eq!(consumed, 8);

    let fields = eventdata::decode_to_mapping::<Pair>(&data, 0, data.len()).unwrap();
    assert_eq!(fields.get("items").unwrap().to_vec::<u32>(), Ok(vec![1, 2]));
}

#[test]
fn test_nested_record_advances_cursor() {
    let data = [0x01, 0x00, 0x02, 0x00, 0x03, 0x00];
    let (f, consumed) = eventdata::decode::<Framed>(&data, 0, data.len()).unwrap();
    assert_eq!(f.header, Header { kind: 1, flags: 2 });
    assert_eq!(f.tail, 3);
    assert_eq!(consumed, 6);

    let fields = eventdata::decode_to_mapping::<Framed>(&data, 0, data.len()).unwrap();
    let header = fields.get("header").and_then(Value::as_record).unwrap();
    assert_eq!(header.consumed(), 4);
    assert_eq!(fields.get_as::<u16>("tail"), Some(3));
}

#[test]
fn test_offset_and_length_select_span() {
    let data = [0xEE, 0xEE, 0x02, 0x00, 0x10, 0x20, 0xEE];
    let (t, consumed) = eventdata::decode::<Transfer>(&data, 2, 4).unwrap();
    assert_eq!(t.data, vec![0x10, 0x20]);
    assert_eq!(consumed, 4);

    assert_matches!(
        eventdata::decode::<Transfer>(&data, 2, 10),
        Err(Error::Decode(DecodeError::InvalidSpan {
            offset: 2,
            length: 10,
            buffer_len: 7
        }))
    );
}

#[test]
fn test_short_buffer_names_field() {
    let data = [0x01, 0x00, 0x02];
    let err = eventdata::decode::<Framed>(&data, 0, data.len()).unwrap_err();
    assert_matches!(
        &err,
        Error::Decode(DecodeError::OutOfBounds {
            field,
            offset: 2,
            needed: 2,
            available: 1,
        }) if field == "header.flags"
    );
    assert_eq!(
        err.to_string(),
        "decode error: header.flags: need 2 bytes at offset 2, only 1 available"
    );

    let err = eventdata::decode_to_mapping::<Framed>(&[1, 0, 2, 0, 3], 0, 5).unwrap_err();
    assert_matches!(err, Error::Decode(DecodeError::OutOfBounds { field, .. }) if field == "tail");
}

#[test]
fn test_array_element_paths() {
    // The second chunk is missing the last byte of its tail.
    let data = [1, 0xAA, 0x01, 0x00, 0, 0x02];

    assert_matches!(
        eventdata::decode::<ChunkPair>(&data, 0, data.len()),
        Err(Error::Decode(DecodeError::OutOfBounds { field, .. })) if field == "chunks[1].tail"
    );
    assert_matches!(
        eventdata::decode_to_mapping::<ChunkPair>(&data, 0, data.len()),
        Err(Error::Decode(DecodeError::OutOfBounds { field, .. })) if field == "chunks[1].tail"
    );

    let mut data = vec![1, 0, 0, 0x80, 0x3F, 1, 0, 0, 0];
    data.extend_from_slice(&[2, 0, 0, 0, 0x40, 2, 0, 0, 0]);
    let (pair, consumed) = eventdata::decode::<SamplePair>(&data, 0, data.len()).unwrap();
    assert_eq!(consumed, 18);
    assert_eq!(pair.samples[0].temperature, 1.0);
    assert_eq!(pair.samples[1].temperature, 2.0);
    assert_eq!(pair.samples[1].offset, 2);

    // A fixed array the remaining bytes cannot hold fails before decoding.
    data.pop();
    assert_matches!(
        eventdata::decode::<SamplePair>(&data, 0, data.len()),
        Err(Error::Decode(DecodeError::TooManyElements { field, count: 2, limit: 1 }))
            if field == "samples"
    );

    // So does a variable count.
    let mut data = vec![2];
    data.extend_from_slice(&[1, 0, 0, 0x80, 0x3F, 1, 0, 0, 0]);
    assert_matches!(
        eventdata::decode::<Batch>(&data, 0, data.len()),
        Err(Error::Decode(DecodeError::TooManyElements { count: 2, limit: 1, .. }))
    );
}

#[test]
fn test_oversized_fixed_array_without_limit() {
    let data = [7, 1, 2, 3];
    let count = 1u128 << 40;

    assert_matches!(
        eventdata::decode::<Oversized>(&data, 0, data.len()),
        Err(Error::Decode(DecodeError::TooManyElements { field, count: c, limit: 3 }))
            if field == "data" && c == count
    );
    assert_matches!(
        eventdata::decode_to_mapping::<Oversized>(&data, 0, data.len()),
        Err(Error::Decode(DecodeError::TooManyElements { field, count: c, limit: 3 }))
            if field == "data" && c == count
    );

    // Hand-written schemas take the same path for both targets.
    let mut builder = RecordSchema::builder("Huge");
    builder
        .scalar("len", ScalarRepr::U16)
        .fixed_array("data", ElementType::Scalar(ScalarRepr::U8), 1 << 40);
    let schema = builder.build().unwrap();
    let config = DecodeConfig::default();

    let plan = DecodePlan::compile(&schema, Target::OrderedMapping);
    assert_matches!(
        plan.decode_to_mapping(&data, 0, data.len(), &config),
        Err(DecodeError::TooManyElements { field, count: c, limit: 2 })
            if field == "data" && c == count
    );

    let plan = DecodePlan::compile(&schema, Target::TypedInstance);
    let mut t = Transfer::default();
    assert_matches!(
        plan.decode_into(&mut t, &data, 0, data.len(), &config),
        Err(DecodeError::TooManyElements { field, count: c, limit: 2 })
            if field == "data" && c == count
    );
    assert!(t.data.is_empty());
}

#[test]
fn test_negative_length() {
    let data = [0xFF, 0x01, 0x00];
    assert_matches!(
        eventdata::decode::<Signed>(&data, 0, data.len()),
        Err(Error::Decode(DecodeError::NegativeLength { field, value: -1, .. })) if field == "values"
    );

    let data = [0x01, 0xFE, 0xFF];
    let (s, _) = eventdata::decode::<Signed>(&data, 0, data.len()).unwrap();
    assert_eq!(s.values, vec![-2]);
}

#[test]
fn test_max_array_elements() {
    let decoder = Decoder::new(DecodeConfig::default().with_max_array_elements(2));
    let data = [0x03, 0x00, 0xAA, 0xBB, 0xCC];
    assert_matches!(
        decoder.decode::<Transfer>(&data, 0, data.len()),
        Err(Error::Decode(DecodeError::TooManyElements { count: 3, limit: 2, .. }))
    );

    // Fixed arrays are subject to the same limit.
    let data = [0u8; 8];
    let decoder = Decoder::new(DecodeConfig::default().with_max_array_elements(1));
    assert_matches!(
        decoder.decode_to_mapping::<Pair>(&data, 0, data.len()),
        Err(Error::Decode(DecodeError::TooManyElements { count: 2, limit: 1, .. }))
    );
}

#[test]
fn test_big_endian() {
    let decoder = Decoder::new(DecodeConfig::default().with_byte_order(ByteOrder::Big));
    let data = [0x00, 0x02, 0xAA, 0xBB];
    let (t, _) = decoder.decode::<Transfer>(&data, 0, data.len()).unwrap();
    assert_eq!(t.len, 2);

    let data = [0, 0, 0, 1, 0, 0, 0, 2];
    let (p, _) = decoder.decode::<Pair>(&data, 0, data.len()).unwrap();
    assert_eq!(p.items, vec![1, 2]);
}

#[test]
fn test_pointer_width() {
    let mut data = Vec::new();
    data.extend_from_slice(&0xFFFF_8000_0000_1000u64.to_le_bytes());
    data.push(1);
    data.extend_from_slice(&7u64.to_le_bytes());

    let (h, consumed) = eventdata::decode::<Handles>(&data, 0, data.len()).unwrap();
    assert_eq!(h.object, 0xFFFF_8000_0000_1000);
    assert_eq!(h.extra, vec![7]);
    assert_eq!(consumed, 17);

    let decoder = Decoder::new(DecodeConfig::default().with_pointer_width(PointerWidth::Four));
    let data = [0x00, 0x10, 0x00, 0x00, 0x02, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
    let (h, consumed) = decoder.decode::<Handles>(&data, 0, data.len()).unwrap();
    assert_eq!(h.object, 0x1000);
    assert_eq!(h.extra, vec![1, 2]);
    assert_eq!(consumed, 13);

    let fields = decoder.decode_to_mapping::<Handles>(&data, 0, data.len()).unwrap();
    assert_eq!(fields.get("object"), Some(&Value::Scalar(Scalar::Pointer(0x1000))));
}

#[test]
fn test_decoder_from_json_config() {
    let config = DecodeConfig::from_json(r#"{"byte_order": "big"}"#).unwrap();
    let decoder = Decoder::new(config);
    assert_eq!(decoder.config().byte_order, ByteOrder::Big);
    assert_eq!(decoder.config().pointer_width, PointerWidth::Eight);

    let data = [0x00, 0x01, 0xAA];
    let (t, _) = decoder.decode::<Transfer>(&data, 0, data.len()).unwrap();
    assert_eq!(t.data, vec![0xAA]);
}

#[test]
fn test_repeated_decodes_are_identical() {
    let data = [0x02, 0x00, 0x01, 0x02];
    let first = eventdata::decode_to_mapping::<Transfer>(&data, 0, data.len()).unwrap();
    for _ in 0..10 {
        let again = eventdata::decode_to_mapping::<Transfer>(&data, 0, data.len()).unwrap();
        assert_eq!(again, first);
    }
}

#[test]
fn test_mapping_serializes_in_field_order() {
    let data = [0x01, 0x00, 0x02, 0x00, 0x03, 0x00];
    let fields = eventdata::decode_to_mapping::<Framed>(&data, 0, data.len()).unwrap();
    let json = serde_json::to_string(&fields).unwrap();
    assert_eq!(json, r#"{"header":{"kind":1,"flags":2},"tail":3}"#);
}

#[test]
fn test_concurrent_decodes() {
    let data: Vec<u8> = [4, 0, 1, 2, 3, 4].to_vec();
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..100 {
                    let (t, n) = eventdata::decode::<Transfer>(&data, 0, data.len()).unwrap();
                    assert_eq!(t.data, vec![1, 2, 3, 4]);
                    assert_eq!(n, 6);
                    let m = eventdata::decode_to_mapping::<Transfer>(&data, 0, data.len()).unwrap();
                    assert_eq!(m.consumed(), 6);
                }
            });
        }
    });
}

// === Runtime schemas ===

fn header_schema() -> Arc<RecordSchema> {
    let mut builder = RecordSchema::builder("Header");
    builder
        .declared("kind", "UInt16", FieldMeta::None)
        .declared("flags", "UInt16", FieldMeta::None);
    Arc::new(builder.build().unwrap())
}

#[test]
fn test_runtime_schema_with_catalog() {
    let mut catalog = Catalog::new();
    catalog.insert(header_schema());

    let mut builder = RecordSchema::builder("Packet").with_catalog(&catalog);
    builder
        .declared("header", "Header", FieldMeta::None)
        .declared("count", "Byte", FieldMeta::None)
        .declared("words", "UInt16[]", FieldMeta::Length("count".into()))
        .declared("pad", "Byte[]", FieldMeta::Count(2));
    let schema = builder.build().unwrap();
    assert_eq!(schema.min_size(), 4 + 1 + 2);

    let plan = DecodePlan::compile(&schema, Target::OrderedMapping);
    let data = [1, 0, 2, 0, 2, 0x34, 0x12, 0x78, 0x56, 0, 0];
    let fields = plan
        .decode_to_mapping(&data, 0, data.len(), &DecodeConfig::default())
        .unwrap();
    assert_eq!(fields.consumed(), 11);
    assert_eq!(
        fields.get("words").unwrap().to_vec::<u16>(),
        Ok(vec![0x1234, 0x5678])
    );
    let header = fields.get("header").and_then(Value::as_record).unwrap();
    assert_eq!(header.get_as::<u16>("flags"), Some(2));
}

#[test]
fn test_runtime_plan_into_typed_instance() {
    let mut builder = RecordSchema::builder("Transfer");
    builder
        .scalar("len", ScalarRepr::U16)
        .variable_array("data", ElementType::Scalar(ScalarRepr::U8), "len");
    let schema = builder.build().unwrap();

    let plan = DecodePlan::compile(&schema, Target::TypedInstance);
    let mut t = Transfer::default();
    let consumed = plan
        .decode_into(&mut t, &[1, 0, 9], 0, 3, &DecodeConfig::default())
        .unwrap();
    assert_eq!(consumed, 3);
    assert_eq!(t.data, vec![9]);

    assert_matches!(
        plan.decode_to_mapping(&[1, 0, 9], 0, 3, &DecodeConfig::default()),
        Err(DecodeError::TargetMismatch { .. })
    );
}

#[test]
fn test_typed_instance_type_mismatch() {
    // A u8 length read into a struct whose first slot is a nested record.
    let mut builder = RecordSchema::builder("Framed");
    builder.scalar("header", ScalarRepr::U8);
    let schema = builder.build().unwrap();
    let plan = DecodePlan::compile(&schema, Target::TypedInstance);

    let mut framed = Framed::default();
    assert_matches!(
        plan.decode_into(&mut framed, &[1], 0, 1, &DecodeConfig::default()),
        Err(DecodeError::TypeMismatch { field, expected: "record", .. }) if field == "header"
    );
}

#[test]
fn test_forward_length_reference_fails_at_build() {
    let mut builder = RecordSchema::builder("Forward");
    builder
        .variable_array("data", ElementType::Scalar(ScalarRepr::U8), "len")
        .scalar("len", ScalarRepr::U16);
    assert_matches!(
        builder.build(),
        Err(SchemaError::LengthFieldNotDeclared { field, length_field, .. })
            if field == "data" && length_field == "len"
    );
}

proptest! {
    #[test]
    fn prop_typed_and_mapping_agree(
        id in any::<u8>(),
        temperature in any::<f32>().prop_filter("comparable", |t| !t.is_nan()),
        offset in any::<i32>(),
        count in 0u8..8,
    ) {
        let mut data = vec![count];
        for i in 0..count {
            data.push(id.wrapping_add(i));
            data.extend_from_slice(&temperature.to_le_bytes());
            data.extend_from_slice(&offset.to_le_bytes());
        }

        let (batch, consumed) = eventdata::decode::<Batch>(&data, 0, data.len()).unwrap();
        let fields = eventdata::decode_to_mapping::<Batch>(&data, 0, data.len()).unwrap();

        prop_assert_eq!(consumed, data.len());
        prop_assert_eq!(fields.consumed(), consumed);
        prop_assert_eq!(fields.get_as::<u8>("n"), Some(batch.n));

        let samples = fields.get("samples").and_then(Value::as_array).unwrap();
        prop_assert_eq!(samples.len(), batch.samples.len());
        for (value, sample) in samples.iter().zip(&batch.samples) {
            let record = value.as_record().unwrap();
            prop_assert_eq!(record.names().collect::<Vec<_>>(), vec!["id", "temperature", "offset"]);
            prop_assert_eq!(record.get_as::<u8>("id"), Some(sample.id));
            prop_assert_eq!(record.get_as::<f32>("temperature"), Some(sample.temperature));
            prop_assert_eq!(record.get_as::<i32>("offset"), Some(sample.offset));
        }
    }

    #[test]
    fn prop_truncation_never_panics(len in 0usize..40, fill in any::<u8>()) {
        let data = vec![fill; len];
        match eventdata::decode::<Batch>(&data, 0, data.len()) {
            Ok((_, consumed)) => prop_assert!(consumed <= len),
            Err(Error::Decode(_)) => {}
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }
}
