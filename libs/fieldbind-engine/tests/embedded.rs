use fieldbind_api::{Bind, BindError, map};
use fieldbind_engine::Binder;

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Left {
    pub id: i64,
    pub left: String,
}

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Right {
    pub id: i64,
    pub right: String,
}

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Both {
    #[bind(embed)]
    pub l: Left,
    #[bind(embed)]
    pub r: Right,
}

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Deep {
    #[bind(embed)]
    pub both: Both,
    pub id: i64,
}

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Meta {
    pub version: u32,
}

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct WithOptionalMeta {
    #[bind(embed)]
    pub meta: Option<Meta>,
    pub name: String,
}

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Envelope {
    #[tag(json = "meta")]
    #[bind(embed)]
    pub meta: Meta,
    pub name: String,
}

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Num {
    pub code: i64,
}

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Text {
    pub code: String,
}

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Mixed {
    #[bind(embed)]
    pub num: Num,
    #[bind(embed)]
    pub text: Text,
}

#[test]
fn every_promoted_field_with_the_same_name_is_set() {
    let binder = Binder::default();
    let mut both = Both::default();
    binder
        .bind(&map! { "id" => 7, "left" => "l", "right" => "r" }, &mut both)
        .unwrap();

    assert_eq!(both.l.id, 7);
    assert_eq!(both.r.id, 7);
    assert_eq!(both.l.left, "l");
    assert_eq!(both.r.right, "r");
}

#[test]
fn duplicates_at_different_depths_are_all_set() {
    let binder = Binder::default();
    let mut deep = Deep::default();
    binder.bind(&map! { "id" => 9 }, &mut deep).unwrap();

    assert_eq!(deep.id, 9);
    assert_eq!(deep.both.l.id, 9);
    assert_eq!(deep.both.r.id, 9);
}

#[test]
fn optional_embedded_struct_is_allocated_on_demand() {
    let binder = Binder::default();

    let mut dest = WithOptionalMeta::default();
    binder.bind(&map! { "name" => "x" }, &mut dest).unwrap();
    assert_eq!(dest.meta, None);

    binder.bind(&map! { "version" => 2, "name" => "y" }, &mut dest).unwrap();
    assert_eq!(dest.meta, Some(Meta { version: 2 }));
    assert_eq!(dest.name, "y");
}

#[test]
fn tagged_embedded_struct_binds_whole_or_promoted() {
    let binder = Binder::default();

    let mut envelope = Envelope::default();
    binder
        .bind(&map! { "meta" => map! { "version" => 3 }, "name" => "a" }, &mut envelope)
        .unwrap();
    assert_eq!(envelope.meta.version, 3);

    binder.bind(&map! { "version" => 4 }, &mut envelope).unwrap();
    assert_eq!(envelope.meta.version, 4);
    assert_eq!(envelope.name, "a");
}

#[test]
fn duplicates_convert_independently() {
    let binder = Binder::default();
    let mut mixed = Mixed::default();

    let err = binder.bind(&map! { "code" => "A1" }, &mut mixed).unwrap_err();
    assert!(matches!(err, BindError::Field { ref field, .. } if field == "code"));
    assert_eq!(mixed.num.code, 0);
    assert_eq!(mixed.text.code, "A1");

    binder.bind(&map! { "code" => 12 }, &mut mixed).unwrap();
    assert_eq!(mixed.num.code, 12);
    assert_eq!(mixed.text.code, "12");
}

#[test]
fn struct_source_exposes_promoted_fields() {
    let binder = Binder::default();
    let source = Both {
        l: Left {
            id: 1,
            left: "l".into(),
        },
        r: Right {
            id: 2,
            right: "r".into(),
        },
    };

    let mut deep = Deep::default();
    binder.bind(&source, &mut deep).unwrap();
    // The first occurrence of a duplicated name is the one published.
    assert_eq!(deep.id, 1);
    assert_eq!(deep.both.r.id, 1);
    assert_eq!(deep.both.r.right, "r");
}

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Audit {
    pub note: String,
    pub count: u8,
}

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Holder {
    pub id: i64,
    #[bind(embed)]
    pub audit: Option<Audit>,
}

#[test]
fn failed_bind_releases_allocated_embedded_struct() {
    let binder = Binder::default();
    let mut holder = Holder::default();

    let err = binder
        .bind(&map! { "id" => 1, "note" => "n", "count" => "oops" }, &mut holder)
        .unwrap_err();
    assert!(matches!(err, BindError::Field { ref field, .. } if field == "count"));
    assert_eq!(holder.audit, None);

    binder.bind(&map! { "id" => 2, "note" => "n" }, &mut holder).unwrap();
    assert_eq!(holder.id, 2);
    assert_eq!(holder.audit, Some(Audit { note: "n".into(), count: 0 }));
}

#[test]
fn failed_bind_keeps_existing_embedded_struct() {
    let binder = Binder::default();
    let mut holder = Holder {
        id: 1,
        audit: Some(Audit { note: "old".into(), count: 3 }),
    };

    assert!(binder.bind(&map! { "count" => "oops" }, &mut holder).is_err());
    assert_eq!(holder.audit, Some(Audit { note: "old".into(), count: 3 }));
}
