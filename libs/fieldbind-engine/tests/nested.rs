use fieldbind_api::{Bind, BindError, Value, map};
use fieldbind_engine::Binder;

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Address {
    pub city: String,
    pub zip: u32,
}

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Person {
    pub name: String,
    pub address: Address,
    pub previous: Vec<Address>,
    pub home: Option<Box<Address>>,
}

fn field_of(err: &BindError) -> Option<&str> {
    match err {
        BindError::Field { field, .. } => Some(field.as_str()),
        _ => None,
    }
}

#[test]
fn nested_structs_bind_from_nested_maps() {
    let binder = Binder::default();
    let source = map! {
        "name" => "ann",
        "address" => map! { "city" => "Oslo", "zip" => "0150" },
        "previous" => Value::Array(vec![
            map! { "city" => "Rome", "zip" => 1 },
            map! { "City" => "Nice" },
        ]),
        "home" => map! { "city" => "Bergen" },
    };

    let mut person = Person::default();
    binder.bind(&source, &mut person).unwrap();

    assert_eq!(person.address, Address { city: "Oslo".into(), zip: 150 });
    assert_eq!(
        person.previous,
        [
            Address { city: "Rome".into(), zip: 1 },
            Address { city: "Nice".into(), zip: 0 },
        ]
    );
    assert_eq!(person.home, Some(Box::new(Address { city: "Bergen".into(), zip: 0 })));
}

#[test]
fn nested_struct_from_json_text() {
    let binder = Binder::default();
    let mut person = Person::default();
    binder
        .bind(&map! { "address" => r#"{"city": "Lund", "zip": 22}"# }, &mut person)
        .unwrap();
    assert_eq!(person.address.zip, 22);
}

#[test]
fn failed_nested_conversion_leaves_pointer_unallocated() {
    let binder = Binder::default();
    let mut person = Person::default();

    let err = binder
        .bind(
            &map! { "name" => "ann", "home" => map! { "city" => "X", "zip" => "not-a-number" } },
            &mut person,
        )
        .unwrap_err();

    // Nested failures surface unchanged, naming the innermost field.
    assert_eq!(field_of(&err), Some("zip"));
    assert_eq!(person.home, None);
    assert_eq!(person.name, "ann");
}

#[test]
fn failed_top_level_conversion_leaves_option_empty() {
    let binder = Binder::default();

    let mut dest: Option<Address> = None;
    assert!(binder.bind(&map! { "zip" => "x" }, &mut dest).is_err());
    assert_eq!(dest, None);

    binder.bind(&map! { "city" => "Oslo" }, &mut dest).unwrap();
    assert_eq!(dest, Some(Address { city: "Oslo".into(), zip: 0 }));
}

#[test]
fn existing_value_is_not_reset_on_failure() {
    let binder = Binder::default();
    let mut dest = Some(Address { city: "A".into(), zip: 1 });

    assert!(binder.bind(&map! { "zip" => "x" }, &mut dest).is_err());
    assert_eq!(dest, Some(Address { city: "A".into(), zip: 1 }));
}

#[test]
fn boxed_option_destination() {
    let binder = Binder::default();
    let mut dest: Option<Box<Address>> = None;
    binder.bind(&map! { "zip" => 5 }, &mut dest).unwrap();
    assert_eq!(dest.map(|a| a.zip), Some(5));
}

#[test]
fn same_type_source_fills_an_option_destination() {
    let binder = Binder::default();
    let source = Address { city: "Oslo".into(), zip: 1 };

    let mut dest: Option<Address> = None;
    binder.bind(&source, &mut dest).unwrap();
    assert_eq!(dest, Some(source));
}

#[test]
fn non_map_value_for_a_struct_field_fails() {
    let binder = Binder::default();
    let mut person = Person::default();
    let err = binder.bind(&map! { "address" => 5 }, &mut person).unwrap_err();
    assert!(matches!(err, BindError::UnnormalizableSource("int")));
}
