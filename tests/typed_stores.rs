// Typed stores driven through the type-erased proxy.
use flatbatch::core::error::ErrorKind;
use flatbatch::core::kind::{Column, Kind};
use flatbatch::core::proxy::{StoreData, TypeDataProxy};
use flatbatch::core::type_data::StoreOptions;

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

#[test]
fn bloom_filter_has_no_false_negatives() {
    let column = Column::scalar("id", Kind::Long).with_bloom_filter(true);
    let mut store =
        TypeDataProxy::for_column(&column, 4_096, &StoreOptions::default()).expect("store");
    assert!(store.has_bloom_filter());

    let mut rng = XorShift64::new(0x51_7CC1_B727_220A);
    let values: Vec<i64> = (0..4_096).map(|_| rng.next_u64() as i64).collect();
    for (index, value) in values.iter().enumerate() {
        store.add(index, *value).expect("add");
    }
    for value in &values {
        assert!(store.probably(*value).expect("probe"));
    }

    let misses = (0..2_000)
        .map(|_| rng.next_u64() as i64)
        .filter(|value| !values.contains(value))
        .filter(|value| store.probably(*value).expect("probe"))
        .count();
    // 1% target rate; leave generous slack.
    assert!(misses < 100, "false positives: {misses}");
}

#[test]
fn voids_and_values_interleave() {
    let column = Column::scalar("score", Kind::Double).with_default("2.5");
    let mut store =
        TypeDataProxy::for_column(&column, 16, &StoreOptions::default()).expect("store");
    store.add(0, 1.25f64).expect("add");
    store.add_void(1).expect("void");
    store.add(2, -8.0f64).expect("add");

    assert_eq!(store.value_or_default::<f64>(0).expect("0"), Some(1.25));
    assert_eq!(store.value_or_default::<f64>(1).expect("1"), Some(2.5));
    assert_eq!(store.read::<f64>(1).expect("zero"), 0.0);
    assert_eq!(store.read::<f64>(2).expect("2"), -8.0);
    assert_eq!(
        store.read::<i32>(0).expect_err("wrong type").kind(),
        ErrorKind::TypeMismatch
    );
    assert_eq!(store.read::<f64>(3).expect_err("past end").kind(), ErrorKind::OutOfRange);
}

#[test]
fn string_stores_keep_values_and_voids() {
    let column = Column::scalar("event", Kind::String).with_default("none");
    let mut store =
        TypeDataProxy::for_column(&column, 8, &StoreOptions::default()).expect("store");
    store.add_str(0, "open").expect("add");
    store.add_void(1).expect("void");
    store.add_str(2, "").expect("empty");

    assert_eq!(store.read_str(0).expect("0"), "open");
    assert_eq!(store.str_or_default(1).expect("1"), Some("none"));
    assert_eq!(store.str_or_default(2).expect("2"), Some(""));
    assert!(store.probably_str("anything").expect("probe"));
    assert_eq!(store.add::<i32>(3, 1).expect_err("wrong type").kind(), ErrorKind::TypeMismatch);
}

#[test]
fn list_columns_have_no_store() {
    let column = Column::list("items", Kind::String);
    let err = TypeDataProxy::for_column(&column, 8, &StoreOptions::default()).expect_err("list");
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[test]
fn dictionary_stores_each_distinct_string_once() {
    let column = Column::scalar("event", Kind::String).with_dictionary(true);
    let mut store =
        TypeDataProxy::for_column(&column, 512, &StoreOptions::default()).expect("store");
    let words = ["open", "close", "retry", "timeout", "ok"];
    let mut rng = XorShift64::new(0xD1C7_0000_5EED);
    let picks: Vec<&str> = (0..512)
        .map(|_| words[(rng.next_u64() % words.len() as u64) as usize])
        .collect();
    for (index, word) in picks.iter().enumerate() {
        store.add_str(index, word).expect("add");
    }
    for (index, word) in picks.iter().enumerate() {
        assert_eq!(store.read_str(index).expect("read"), *word);
    }

    let mut distinct: Vec<&str> = picks.clone();
    distinct.sort_unstable();
    distinct.dedup();
    let expected: usize = distinct.iter().map(|word| word.len()).sum();
    match store.data() {
        StoreData::String(inner) => assert_eq!(inner.size(), expected),
        other => panic!("unexpected store {:?}", other.kind()),
    }
    assert_eq!(store.histogram().count(), 512);
}
