use binform::{
    byte, container, field, items, le_u16, le_u32, len_, padding, this, Aligned, Array, Bytes,
    Const, ConstructExt, GreedyBytes, GreedyRange, Prefixed, PrefixedArray, Rebuild, Struct,
    Value,
};

#[test]
fn static_sizes_compose() {
    let d = Struct::new(vec![
        field("magic", Const::bytes(b"HDR\0")),
        field("version", le_u16()),
        Box::new(padding(2)),
        field("entries", Array::new(4, le_u32())),
    ]);
    assert_eq!(d.static_size().unwrap(), 4 + 2 + 2 + 16);
}

#[test]
fn dynamic_member_breaks_static_size() {
    let d = Struct::new(vec![
        field("len", byte()),
        field("data", Bytes::new(this().f("len"))),
    ]);
    let err = d.static_size().unwrap_err();
    assert!(err.is_unknown_size());

    let v = Value::Struct(container! {
        "len" => 3,
        "data" => Value::Bytes(vec![1, 2, 3]),
    });
    assert_eq!(d.size_of(&v).unwrap(), 4);
}

#[test]
fn greedy_constructs_have_no_static_size() {
    assert!(GreedyBytes.static_size().unwrap_err().is_unknown_size());
    assert!(GreedyRange::new(byte())
        .static_size()
        .unwrap_err()
        .is_unknown_size());

    let v = Value::List(items![1, 2, 3]);
    assert_eq!(GreedyRange::new(le_u16()).size_of(&v).unwrap(), 6);
}

#[test]
fn aligned_rounds_up() {
    let d = Aligned::new(4, Struct::new(vec![field("a", byte()), field("b", le_u16())]));
    assert_eq!(d.static_size().unwrap(), 4);
}

#[test]
fn prefixed_sizes_include_the_prefix() {
    let d = Prefixed::new(byte(), GreedyBytes);
    let v = Value::Bytes(vec![9; 10]);
    assert_eq!(d.size_of(&v).unwrap(), 11);
}

#[test]
fn prefixed_array_sizes_from_value() {
    let d = PrefixedArray::new(byte(), le_u32());
    let v = Value::List(items![1, 2, 3]);
    assert_eq!(d.size_of(&v).unwrap(), 13);
}

#[test]
fn rebuild_defers_to_inner_size() {
    let d = Struct::new(vec![
        field("count", Rebuild::new(le_u16(), len_(this().f("items")))),
        field("items", Array::new(this().f("count"), byte())),
    ]);
    let (pre, meta) = d
        .preprocessed(Value::Struct(container! { "items" => items![7, 8] }))
        .unwrap();
    assert_eq!(meta.size, 4);
    let con = pre.as_struct().unwrap();
    assert_eq!(con.meta("count").unwrap().size, 2);
    assert_eq!(con.meta("items").unwrap().offset, 2);
    assert_eq!(con.meta("items").unwrap().end_offset, 4);
}

#[test]
fn parse_build_roundtrip_with_rebuilds() {
    let d = Struct::new(vec![
        field("count", Rebuild::new(byte(), len_(this().f("items")))),
        field("items", Array::new(this().f("count"), le_u16())),
        field("tail", byte()),
    ]);
    let input = Value::Struct(container! {
        "items" => items![10, 20, 30],
        "tail" => 0xee,
    });
    let built = d.build_bytes(&input).unwrap();
    assert_eq!(built, vec![3, 10, 0, 20, 0, 30, 0, 0xee]);

    let v = d.parse_bytes(&built).unwrap();
    assert_eq!(v.as_struct().unwrap().get("count"), Some(&Value::Int(3)));
    assert_eq!(d.build_bytes(&v).unwrap(), built);
}
