use std::sync::Arc;

use fieldbind_api::{Bind, FieldType, map};
use fieldbind_engine::{BindOptions, Binder};

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Point {
    #[tag(json = "px", db = "x_pos")]
    pub x: i64,
    pub y: i64,
}

#[derive(Bind, Clone, Default, Debug, PartialEq)]
pub struct Account {
    pub user_name: String,
}

#[test]
fn metadata_is_built_once_per_type() {
    let binder = Binder::default();
    for i in 0..100 {
        let mut point = Point::default();
        binder.bind(&map! { "px" => i, "y" => i }, &mut point).unwrap();
        assert_eq!(point, Point { x: i, y: i });
    }
    assert_eq!(binder.cache().builds(), 1);
    assert_eq!(binder.cache().len(), 1);
}

#[test]
fn each_tag_list_gets_its_own_table() {
    let binder = Binder::default();
    let source = map! { "px" => 1, "x_pos" => 2 };

    let mut point = Point::default();
    binder.bind(&source, &mut point).unwrap();
    assert_eq!(point.x, 1);

    binder
        .convert(&source, &mut point, &BindOptions::new().with_tags(["db"]))
        .unwrap();
    assert_eq!(point.x, 2);

    binder.bind(&source, &mut point).unwrap();
    assert_eq!(point.x, 1);
    assert_eq!(binder.cache().builds(), 2);
}

#[test]
fn binders_do_not_share_caches() {
    let first = Binder::default();
    let second = Binder::default();

    first.bind(&map! { "y" => 1 }, &mut Point::default()).unwrap();
    assert_eq!(first.cache().builds(), 1);
    assert!(second.cache().is_empty());
}

#[test]
fn concurrent_binds_share_one_table() {
    let binder = Arc::new(Binder::default());

    std::thread::scope(|scope| {
        for t in 0..8i64 {
            let binder = Arc::clone(&binder);
            scope.spawn(move || {
                for i in 0..50 {
                    let mut point = Point::default();
                    binder.bind(&map! { "px" => t, "y" => i }, &mut point).unwrap();
                    assert_eq!(point, Point { x: t, y: i });
                }
            });
        }
    });

    assert_eq!(binder.cache().len(), 1);
    assert!(binder.cache().builds() >= 1);
}

#[test]
fn fuzzy_hint_follows_the_last_matched_key() {
    let binder = Binder::default();
    let tags = binder.config().effective_tags(&[]);
    let shape = Account::static_shape().unwrap();

    let mut account = Account::default();
    binder.bind(&map! { "UserName" => "a" }, &mut account).unwrap();
    let metadata = binder.metadata(shape, &tags);
    let field = metadata.by_key("user_name").unwrap();
    assert_eq!(field.last_fuzzy_key().as_deref().map(String::as_str), Some("UserName"));

    binder.bind(&map! { "USER-NAME" => "b" }, &mut account).unwrap();
    assert_eq!(account.user_name, "b");
    assert_eq!(field.last_fuzzy_key().as_deref().map(String::as_str), Some("USER-NAME"));

    // An exact match leaves the hint alone.
    binder.bind(&map! { "user_name" => "c" }, &mut account).unwrap();
    assert_eq!(account.user_name, "c");
    assert_eq!(field.last_fuzzy_key().as_deref().map(String::as_str), Some("USER-NAME"));
}
