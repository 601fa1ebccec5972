use super::*;
use crate::endian::ByteOrder;
use std::str::FromStr;
use test_case::test_case;

#[test_case("byte", MagicType::Byte)]
#[test_case("beshort", MagicType::Beshort)]
#[test_case("leqldate", MagicType::Leqldate)]
#[test_case("bestring16", MagicType::Bestring16)]
#[test_case("melong", MagicType::Melong)]
#[test_case("beid3", MagicType::Beid3)]
#[test_case("use", MagicType::Use)]
#[test_case("default", MagicType::Default)]
fn type_names_parse(name: &str, exp: MagicType) {
    assert_eq!(Ok(exp), MagicType::from_str(name));
}

#[test_case("clear")]
#[test_case("der")]
#[test_case("ubyte")]
#[test_case("ulelong")]
#[test_case("BYTE")]
fn names_outside_the_closed_set_fail(name: &str) {
    assert!(MagicType::from_str(name).is_err());
}

#[test_case(MagicType::Beshort, ByteOrder::Big, 2, NumFlavor::Int)]
#[test_case(MagicType::Lequad, ByteOrder::Little, 8, NumFlavor::Int)]
#[test_case(MagicType::Melong, ByteOrder::Middle, 4, NumFlavor::Int)]
#[test_case(MagicType::Leid3, ByteOrder::Little, 4, NumFlavor::Id3)]
#[test_case(MagicType::Befloat, ByteOrder::Big, 4, NumFlavor::Float)]
#[test_case(MagicType::Qdate, ByteOrder::Native, 8, NumFlavor::Int)]
fn numeric_type_classes(typ: MagicType, order: ByteOrder, width: u8, flavor: NumFlavor) {
    assert_eq!(
        TypeClass::Num(NumType::new(order, width, flavor)),
        typ.class()
    );
}

#[test]
fn offset_op_arithmetic() {
    assert_eq!(Some(12), OffsetOp::Add.apply(4, 8));
    assert_eq!(Some(-4), OffsetOp::Sub.apply(4, 8));
    assert_eq!(Some(32), OffsetOp::Mul.apply(4, 8));
    assert_eq!(Some(2), OffsetOp::Div.apply(16, 8));
    assert_eq!(None, OffsetOp::Div.apply(16, 0));
    assert_eq!(Some(1), OffsetOp::Mod.apply(9, 8));
    assert_eq!(None, OffsetOp::Mod.apply(9, 0));
    assert_eq!(Some(0x0f), OffsetOp::And.apply(0xff, 0x0f));
    assert_eq!(Some(0xff), OffsetOp::Or.apply(0xf0, 0x0f));
    assert_eq!(Some(0xff), OffsetOp::Xor.apply(0xf0, 0x0f));
}

#[test]
fn indirect_read_type_chars() {
    let r = IndirectRead::from_type_char(b'B').unwrap();
    assert_eq!((ByteOrder::Big, 1, false), (r.order, r.width, r.id3));
    let r = IndirectRead::from_type_char(b's').unwrap();
    assert_eq!((ByteOrder::Little, 2, false), (r.order, r.width, r.id3));
    let r = IndirectRead::from_type_char(b'I').unwrap();
    assert_eq!((ByteOrder::Big, 4, true), (r.order, r.width, r.id3));
    let r = IndirectRead::from_type_char(b'm').unwrap();
    assert_eq!((ByteOrder::Middle, 4, false), (r.order, r.width, r.id3));
    assert_eq!(None, IndirectRead::from_type_char(b'z'));
    // no type char reads a little-endian long
    assert_eq!(
        IndirectRead {
            order: ByteOrder::Little,
            width: 4,
            id3: false
        },
        IndirectRead::default()
    );
}
