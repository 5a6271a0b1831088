//! Driver-independent slices of the round-trip properties: the payload
//! codecs and the staging conversions the binder and decoder run on each
//! side of the ODBC calls.

use sqlbus::odbc::convert::{
    numeric_to_payload, stage_numeric, stage_timestamp, timestamp_to_payload,
};
use sqlbus::scheme::view;
use sqlbus::scheme::{Field, FieldType, Message, TimeResolution};
use sqlbus::value::decimal::{self, Unpacked};

mod offset_string_tests {
    use super::*;

    #[test]
    fn text_lands_in_the_tail_with_a_trailing_nul() {
        // Log { text: offset_string }, text = "hello".
        let msg = Message::builder("Log", 1)
            .field(Field::offset_string("text"))
            .build()
            .unwrap();
        let mut payload = vec![0u8; msg.size()];
        view::append_string(&mut payload, msg.fields()[0].offset(), b"hello").unwrap();

        let region = view::read_string_region(&payload, 0).unwrap().unwrap();
        assert_eq!(region, b"hello\0", "region SHOULD include the NUL");

        let ptr = view::read_offset_ptr(&payload, 0).unwrap();
        assert_eq!(ptr.size(), 6);
        assert_eq!(ptr.entity(), 1);
    }

    #[test]
    fn second_string_lands_after_the_first() {
        let msg = Message::builder("Pair", 2)
            .field(Field::offset_string("a"))
            .field(Field::offset_string("b"))
            .build()
            .unwrap();
        let mut payload = vec![0u8; msg.size()];
        view::append_string(&mut payload, 0, b"one").unwrap();
        view::append_string(&mut payload, 8, b"three").unwrap();

        assert_eq!(
            view::read_string_region(&payload, 0).unwrap().unwrap(),
            b"one\0"
        );
        assert_eq!(
            view::read_string_region(&payload, 8).unwrap().unwrap(),
            b"three\0"
        );
    }
}

mod pmap_tests {
    use super::*;

    #[test]
    fn clear_bit_means_absent_set_bit_means_present() {
        // Order { id: i64; note: bytes[16] optional(0) }
        let msg = Message::builder("Order", 3)
            .pmap_field("_pmap", 1)
            .field(Field::scalar("id", FieldType::Int64))
            .field(Field::byte_string("note", 16).optional(0))
            .build()
            .unwrap();
        let pmap = msg.pmap_field().unwrap();
        let mut payload = vec![0u8; msg.size()];

        assert!(!view::pmap_get(&payload, pmap, 0).unwrap());
        view::pmap_set(&mut payload, pmap, 0).unwrap();
        assert!(view::pmap_get(&payload, pmap, 0).unwrap());
        view::pmap_zero(&mut payload, pmap).unwrap();
        assert!(!view::pmap_get(&payload, pmap, 0).unwrap());
    }
}

mod decimal_tests {
    use super::*;

    fn price_field() -> (Message, Field) {
        let msg = Message::builder("Trade", 1)
            .field(Field::scalar("price", FieldType::Decimal128))
            .build()
            .unwrap();
        let f = msg.fields()[0].clone();
        (msg, f)
    }

    #[test]
    fn staging_roundtrips_for_the_full_exponent_window() {
        let (msg, f) = price_field();
        for exponent in (-33..=0).step_by(3) {
            for &(negative, mantissa) in &[
                (false, 0u128),
                (false, 12345),
                (true, 9_999_999_999_999_999_999_999_999_999_999_999),
            ] {
                let value = Unpacked::new(negative, mantissa, exponent);
                let mut payload = vec![0u8; msg.size()];
                payload.copy_from_slice(&decimal::pack(&value).unwrap().to_le_bytes());

                let staged = stage_numeric(&f, &payload).unwrap();
                let mut back = vec![0u8; msg.size()];
                numeric_to_payload(&staged, &f, &mut back).unwrap();

                let got = decimal::unpack(u128::from_le_bytes(back.try_into().unwrap())).unwrap();
                assert_eq!(got, value, "roundtrip of {:?}", value);
            }
        }
    }

    #[test]
    fn price_123_45_stages_as_scale_2() {
        let (msg, f) = price_field();
        let mut payload = vec![0u8; msg.size()];
        payload.copy_from_slice(
            &decimal::pack(&Unpacked::new(false, 12345, -2))
                .unwrap()
                .to_le_bytes(),
        );
        let staged = stage_numeric(&f, &payload).unwrap();
        assert_eq!(staged.precision, 34);
        assert_eq!(staged.scale, 2);
        assert_eq!(staged.sign, 1);
        assert_eq!(u128::from_le_bytes(staged.val), 12345);
    }

    #[test]
    fn infinity_in_the_payload_is_a_hard_error() {
        let (msg, f) = price_field();
        let mut payload = vec![0u8; msg.size()];
        let inf: u128 = 0b11110 << 122;
        payload.copy_from_slice(&inf.to_le_bytes());
        assert!(stage_numeric(&f, &payload).is_err());
    }
}

mod timestamp_tests {
    use super::*;

    #[test]
    fn millisecond_resolution_roundtrips_exactly() {
        let msg = Message::builder("Event", 1)
            .field(Field::time_point("ts", FieldType::Int64, TimeResolution::Ms))
            .build()
            .unwrap();
        let f = msg.fields()[0].clone();

        let mut payload = vec![0u8; msg.size()];
        payload.copy_from_slice(&1_700_000_000_123i64.to_le_bytes());

        let ts = stage_timestamp(&f, &payload).unwrap();
        let mut back = vec![0u8; msg.size()];
        timestamp_to_payload(&ts, &f, &mut back).unwrap();
        assert_eq!(
            i64::from_le_bytes(back.try_into().unwrap()),
            1_700_000_000_123
        );
    }

    #[test]
    fn each_resolution_roundtrips_a_representative_value() {
        let cases = [
            (TimeResolution::Ns, 1_700_000_000_123_456_789i64),
            (TimeResolution::Us, 1_700_000_000_123_456),
            (TimeResolution::Ms, 1_700_000_000_123),
            (TimeResolution::Second, 1_700_000_000),
            (TimeResolution::Minute, 28_333_333),
            (TimeResolution::Hour, 472_222),
            (TimeResolution::Day, 19_675),
        ];
        for (resolution, value) in cases {
            let msg = Message::builder("Event", 1)
                .field(Field::time_point("ts", FieldType::Int64, resolution))
                .build()
                .unwrap();
            let f = msg.fields()[0].clone();
            let mut payload = vec![0u8; msg.size()];
            payload.copy_from_slice(&value.to_le_bytes());

            let ts = stage_timestamp(&f, &payload).unwrap();
            let mut back = vec![0u8; msg.size()];
            timestamp_to_payload(&ts, &f, &mut back).unwrap();
            assert_eq!(
                i64::from_le_bytes(back.try_into().unwrap()),
                value,
                "resolution {:?}",
                resolution
            );
        }
    }

    #[test]
    fn pre_epoch_values_survive_the_calendar_hop() {
        let msg = Message::builder("Event", 1)
            .field(Field::time_point("ts", FieldType::Int64, TimeResolution::Us))
            .build()
            .unwrap();
        let f = msg.fields()[0].clone();
        let value = -1_000_001i64; // 1969-12-31 23:59:58.999999
        let mut payload = vec![0u8; msg.size()];
        payload.copy_from_slice(&value.to_le_bytes());

        let ts = stage_timestamp(&f, &payload).unwrap();
        assert_eq!((ts.year, ts.month, ts.day), (1969, 12, 31));
        let mut back = vec![0u8; msg.size()];
        timestamp_to_payload(&ts, &f, &mut back).unwrap();
        assert_eq!(i64::from_le_bytes(back.try_into().unwrap()), value);
    }
}
