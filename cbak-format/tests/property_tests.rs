//! Property-based tests for cbak format primitives

use cbak_format::{decode_blob, encode_blob, Limits, PhoneNumber, Photo, Record};
use proptest::prelude::*;

fn opt_text() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[ -~]{0,24}")
}

fn phone() -> impl Strategy<Value = PhoneNumber> {
    (any::<bool>(), opt_text(), opt_text()).prop_map(|(is_primary, label, number)| PhoneNumber {
        is_primary,
        label,
        number,
        number_key: None,
        phone_type: Some("2".to_string()),
    })
}

fn record() -> impl Strategy<Value = Record> {
    (
        prop::option::of(0i64..1_000_000),
        opt_text(),
        opt_text(),
        prop::option::of(any::<bool>()),
        prop::option::of(any::<u32>()),
        prop::collection::vec(phone(), 0..4),
        prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..3),
    )
        .prop_map(|(id, name, notes, starred, times_contacted, phones, photos)| Record {
            id,
            name,
            notes,
            starred,
            times_contacted,
            phone_numbers: phones,
            photos: photos.into_iter().map(Photo).collect(),
            ..Record::default()
        })
}

proptest! {
    #[test]
    fn blob_roundtrip_property(blob in prop::collection::vec(any::<u8>(), 0..512)) {
        let text = encode_blob(&blob);
        prop_assert!(text.is_ascii());
        prop_assert_eq!(decode_blob(&text).unwrap(), blob);
    }

    #[test]
    fn record_json_roundtrip_property(rec in record()) {
        let text = serde_json::to_string_pretty(&rec).unwrap();
        let decoded: Record = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(&decoded, &rec);
        prop_assert!(rec.validate(&Limits::default()).is_ok());
    }

    #[test]
    fn every_field_is_always_present(rec in record()) {
        let value = serde_json::to_value(&rec).unwrap();
        let object = value.as_object().unwrap();
        prop_assert_eq!(object.len(), 14);
        for key in ["contact_methods", "phone_numbers", "organizations", "photos"] {
            prop_assert!(object[key].is_array());
        }
    }
}
