use binform::{
    byte, container, field, items, le_u16, le_u32, this, Array, ConstructExt, Element, Enum,
    FlagsEnum, FocusedSeq, IfThenElse, Pointer, Rebuild, Struct, Value,
};

#[test]
fn struct_fields_become_attributes() {
    let d = Struct::new(vec![field("a", le_u32()), field("b", le_u32())]);
    let v = Value::Struct(container! { "a" => 1, "b" => 2 });
    let elem = d.to_xml(&v, "test").unwrap();

    let mut expected = Element::new("test");
    expected.set_attr("a", "1");
    expected.set_attr("b", "2");
    assert_eq!(elem, expected);
}

#[test]
fn nested_struct_becomes_child_element() {
    let d = Struct::new(vec![
        field("a", le_u32()),
        field("b", le_u32()),
        field(
            "s",
            Struct::new(vec![field("c", le_u32()), field("d", le_u32())]),
        ),
    ]);
    let v = Value::Struct(container! {
        "a" => 1,
        "b" => 2,
        "s" => container! { "c" => 3, "d" => 4 },
    });
    let elem = d.to_xml(&v, "test").unwrap();

    assert_eq!(elem.attr("a"), Some("1"));
    let s = elem.find("s").unwrap();
    assert_eq!(s.attr("c"), Some("3"));
    assert_eq!(s.attr("d"), Some("4"));

    let back = d.from_xml(&elem).unwrap();
    assert_eq!(back, v);
}

#[test]
fn simple_arrays_collapse_into_one_attribute() {
    let d = Struct::new(vec![
        field("a", Array::new(2, le_u32())),
        field("b", le_u32()),
    ]);
    let v = Value::Struct(container! { "a" => items![1, 2], "b" => 2 });
    let elem = d.to_xml(&v, "test").unwrap();
    assert_eq!(elem.attr("a"), Some("[1,2]"));
    assert_eq!(elem.attr("b"), Some("2"));

    let back = d.from_xml(&elem).unwrap();
    assert_eq!(back, v);
}

#[test]
fn unnamed_struct_arrays_use_the_type_tag() {
    let d = Struct::new(vec![
        field("a", Array::new(1, Struct::new(vec![field("value", le_u32())]))),
        field("b", Array::new(3, le_u32())),
    ]);
    let v = Value::Struct(container! {
        "a" => items![container! { "value" => 1 }],
        "b" => items![1, 2, 2],
    });
    let elem = d.to_xml(&v, "test").unwrap();
    assert_eq!(elem.attr("b"), Some("[1,2,2]"));
    let child = elem.find("Struct").unwrap();
    assert_eq!(child.attr("value"), Some("1"));

    let back = d.from_xml(&elem).unwrap();
    assert_eq!(back, v);
}

#[test]
fn named_struct_arrays_use_the_member_name() {
    let d = Struct::new(vec![
        field(
            "b",
            Array::new(3, field("b_item", Struct::new(vec![field("value", le_u32())]))),
        ),
        field(
            "c",
            Array::new(1, field("c_item", Struct::new(vec![field("value", le_u32())]))),
        ),
    ]);
    let v = Value::Struct(container! {
        "b" => items![
            container! { "value" => 1 },
            container! { "value" => 2 },
            container! { "value" => 3 }
        ],
        "c" => items![container! { "value" => 5 }],
    });
    let elem = d.to_xml(&v, "test").unwrap();
    assert_eq!(elem.find_all("b_item").count(), 3);
    assert_eq!(elem.find_all("c_item").count(), 1);

    let back = d.from_xml(&elem).unwrap();
    assert_eq!(back, v);
}

#[test]
fn byte_fields_serialize_as_hex() {
    let d = Struct::new(vec![field("data", binform::Bytes::new(2))]);
    let v = Value::Struct(container! { "data" => Value::Bytes(vec![0x01, 0xff]) });
    let elem = d.to_xml(&v, "test").unwrap();
    assert_eq!(elem.attr("data"), Some("01ff"));
    assert_eq!(d.from_xml(&elem).unwrap(), v);
}

#[test]
fn enum_serializes_labels() {
    let d = Struct::new(vec![field("animal", Enum::new(byte(), &[("giraffe", 1)]))]);
    let v = Value::Struct(container! { "animal" => "giraffe" });
    let elem = d.to_xml(&v, "test").unwrap();
    assert_eq!(elem.attr("animal"), Some("giraffe"));
    assert_eq!(d.from_xml(&elem).unwrap(), v);

    // unmapped discriminants pass through as integers
    let v = Value::Struct(container! { "animal" => 9 });
    let elem = d.to_xml(&v, "test").unwrap();
    assert_eq!(elem.attr("animal"), Some("9"));
    assert_eq!(d.from_xml(&elem).unwrap(), v);
}

#[test]
fn flags_serialize_as_joined_labels() {
    let d = Struct::new(vec![field(
        "flags",
        FlagsEnum::new(byte(), &[("one", 1), ("two", 2), ("four", 4)]),
    )]);
    let v = Value::Struct(container! {
        "flags" => container! { "one" => true, "two" => false, "four" => true },
    });
    let elem = d.to_xml(&v, "test").unwrap();
    assert_eq!(elem.attr("flags"), Some("one|four"));
    assert_eq!(d.from_xml(&elem).unwrap(), v);
}

#[test]
fn conditional_rebuild_hack_selects_branch_by_tag() {
    let d = Struct::new(vec![
        field("kind", byte()),
        field(
            "body",
            IfThenElse::new(
                this().f("kind").eq_(1),
                field("big", Struct::new(vec![field("x", le_u32())])),
                field("small", Struct::new(vec![field("x", le_u16())])),
            )
            .with_rebuild_hack(),
        ),
    ]);

    let mut elem = Element::new("test");
    elem.set_attr("kind", "0");
    let mut small = Element::new("small");
    small.set_attr("x", "7");
    elem.append(small);

    let back = d.from_xml(&elem).unwrap();
    let con = back.as_struct().unwrap();
    assert_eq!(
        con.get("body").unwrap().as_struct().unwrap().get("x"),
        Some(&Value::Int(7))
    );
}

#[test]
fn optional_branch_absence_means_skipped() {
    let d = Struct::new(vec![
        field("kind", byte()),
        field(
            "body",
            IfThenElse::when(
                this().f("kind").eq_(1),
                field("big", Struct::new(vec![field("x", le_u32())])),
            )
            .with_rebuild_hack(),
        ),
    ]);

    let mut elem = Element::new("test");
    elem.set_attr("kind", "0");
    let back = d.from_xml(&elem).unwrap();
    let con = back.as_struct().unwrap();
    assert_eq!(con.get("kind"), Some(&Value::Int(0)));
    assert_eq!(con.get("body"), None);
}

fn focused_header() -> FocusedSeq {
    FocusedSeq::new(
        "b",
        vec![
            field("a", Rebuild::new(le_u32(), this().f("b").f("value"))),
            field("b", Struct::new(vec![field("value", le_u32())])),
            field("c", Rebuild::new(le_u32(), this().f("b").f("value"))),
        ],
    )
}

#[test]
fn focused_seq_serializes_under_the_given_name() {
    let d = focused_header();
    let v = Value::Struct(container! { "value" => 2 });
    let elem = d.to_xml(&v, "test").unwrap();

    let mut expected = Element::new("test");
    expected.set_attr("value", "2");
    assert_eq!(elem, expected);

    assert_eq!(d.from_xml(&elem).unwrap(), v);
}

#[test]
fn focused_seq_member_name_wins_over_the_focus_name() {
    let d = Struct::new(vec![field("a", focused_header())]);
    let v = Value::Struct(container! { "a" => container! { "value" => 2 } });
    let elem = d.to_xml(&v, "test").unwrap();

    let child = elem.find("a").expect("child element a");
    assert_eq!(child.attr("value"), Some("2"));
    assert!(elem.find("b").is_none());

    assert_eq!(d.from_xml(&elem).unwrap(), v);
}

#[test]
fn focused_seq_array_items_fall_back_to_the_focus_name() {
    let d = Struct::new(vec![field("arr", Array::new(2, focused_header()))]);
    let v = Value::Struct(container! {
        "arr" => items![container! { "value" => 4 }, container! { "value" => 2 }],
    });
    let elem = d.to_xml(&v, "test").unwrap();
    assert_eq!(elem.find_all("b").count(), 2);

    assert_eq!(d.from_xml(&elem).unwrap(), v);
}

#[test]
fn pointer_serializes_its_target() {
    let d = Struct::new(vec![
        field("b", le_u32()),
        field(
            "a",
            Pointer::new(8, field("Property", Struct::new(vec![field("x", le_u32())]))),
        ),
    ]);

    let v = Value::Struct(container! {
        "b" => 2,
        "a" => container! { "x" => 0 },
    });
    let elem = d.to_xml(&v, "test").unwrap();
    assert_eq!(elem.attr("b"), Some("2"));
    let target = elem.find("Property").expect("pointer target element");
    assert_eq!(target.attr("x"), Some("0"));

    let mut wire = Element::new("test");
    wire.set_attr("b", "2");
    let mut target = Element::new("Property");
    target.set_attr("x", "4");
    wire.append(target);

    let back = d.from_xml(&wire).unwrap();
    let expected = Value::Struct(container! {
        "b" => 2,
        "a" => container! { "x" => 4 },
    });
    assert_eq!(back, expected);
}

#[test]
fn missing_attribute_is_an_element_error() {
    let d = Struct::new(vec![field("a", le_u32())]);
    let elem = Element::new("test");
    let err = d.from_xml(&elem).unwrap_err();
    assert!(err.to_string().contains("missing attribute"));
}

#[test]
fn unparseable_literal_is_an_element_error() {
    let d = Struct::new(vec![field("a", le_u32())]);
    let mut elem = Element::new("test");
    elem.set_attr("a", "twelve");
    let err = d.from_xml(&elem).unwrap_err();
    assert!(err.to_string().contains("unparseable"));
}
