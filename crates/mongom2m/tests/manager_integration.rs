//! Integration tests for the relationship manager and the query-set emulator.
//!
//! Each test runs against a fresh `MemoryStore` and checks both the in-memory
//! cells and what actually lands in the host's stored record.

mod common;

use std::sync::{Arc, Mutex};

use bson::oid::ObjectId;
use bson::{doc, Bson};
use common::Fixture;
use mongom2m::related::queryset::ValuesListRow;
use mongom2m::store::DocumentStore;
use mongom2m::{
    Database, Document, Lookup, M2MAction, M2MChanged, M2MError, QueryOptions, Related, Value,
    M2M_CHANGED, Q,
};
use mongom2m_core::{Settings, SETTINGS};

// ── Add / remove / clear ──────────────────────────────────────────────

#[test]
fn test_add_is_idempotent() {
    let f = Fixture::new("mgr_idem", false);
    let rust = f.tag("rust");
    let go = f.tag("go");
    let mut article = f.article("first");

    let mut tags = f.db.related(&mut article, "tags").unwrap();
    tags.add(
        [
            Related::from(&rust),
            Related::from(&go),
            Related::from(rust.pk().unwrap()),
        ],
        true,
    )
    .unwrap();
    tags.add([&go], true).unwrap();
    assert_eq!(tags.count(), 2);
    assert_eq!(tags.ids(), vec![rust.pk().unwrap(), go.pk().unwrap()]);

    let mut stored = f.reload(&article);
    let tags = f.db.related(&mut stored, "tags").unwrap();
    assert_eq!(tags.ids(), vec![rust.pk().unwrap(), go.pk().unwrap()]);
}

#[test]
fn test_add_rejects_unsaved_and_foreign_documents() {
    let f = Fixture::new("mgr_reject", false);
    let mut article = f.article("first");
    let other_article = f.article("second");

    let mut tags = f.db.related(&mut article, "tags").unwrap();
    let unsaved = Document::new(&f.tag).with("name", "draft");
    let err = tags.add([unsaved], false).unwrap_err();
    assert!(matches!(err, M2MError::UnsavedInstance(_)));

    let err = tags.add([&other_article], false).unwrap_err();
    assert!(matches!(err, M2MError::InvalidArgument(_)));
    assert!(tags.is_empty());
}

#[test]
fn test_clear_then_add_restores_ids() {
    let f = Fixture::new("mgr_reset", false);
    let tags_in: Vec<Document> = ["a", "b", "c"].iter().map(|n| f.tag(n)).collect();
    let mut article = f.article("first");

    let mut tags = f.db.related(&mut article, "tags").unwrap();
    tags.add(&tags_in, true).unwrap();
    let original = tags.ids();

    tags.clear(true).unwrap();
    assert!(tags.is_empty());
    assert!(f.reload(&article).cells("tags").is_empty());

    let mut tags = f.db.related(&mut article, "tags").unwrap();
    tags.add(&tags_in, true).unwrap();
    let mut restored = tags.ids();
    let mut expected = original;
    restored.sort();
    expected.sort();
    assert_eq!(restored, expected);
}

#[test]
fn test_remove_keeps_order_of_the_rest() {
    let f = Fixture::new("mgr_remove", false);
    let a = f.tag("a");
    let b = f.tag("b");
    let c = f.tag("c");
    let mut article = f.article("first");

    let mut tags = f.db.related(&mut article, "tags").unwrap();
    tags.add([&a, &b, &c], false).unwrap();
    tags.remove([b.pk().unwrap()], true).unwrap();
    assert_eq!(tags.ids(), vec![a.pk().unwrap(), c.pk().unwrap()]);
    assert!(!tags.contains(&b));
    assert!(tags.contains(&a));
    assert!(!tags.contains(Document::new(&f.tag)));

    assert_eq!(f.reload(&article).cells("tags").len(), 2);
}

#[test]
fn test_auto_save_false_leaves_storage_untouched() {
    let f = Fixture::new("mgr_nosave", false);
    let a = f.tag("a");
    let mut article = f.article("first");

    f.db.related(&mut article, "tags")
        .unwrap()
        .add([&a], false)
        .unwrap();
    assert_eq!(article.cells("tags").len(), 1);
    assert!(f.reload(&article).cells("tags").is_empty());

    f.db.save(&mut article).unwrap();
    assert_eq!(f.reload(&article).cells("tags").len(), 1);
}

#[test]
fn test_create_saves_and_adds_target() {
    let f = Fixture::new("mgr_create", true);
    let mut article = f.article("first");

    let created = f
        .db
        .related(&mut article, "tags")
        .unwrap()
        .create([("name", "fresh")], true)
        .unwrap();
    let pk = created.pk().expect("created target has a primary key");

    assert!(f.db.find_by_pk(&f.tag, pk).unwrap().is_some());
    let mut stored = f.reload(&article);
    let tags = f.db.related(&mut stored, "tags").unwrap();
    assert_eq!(tags.ids(), vec![pk]);
}

#[test]
fn test_remove_nonexists_repairs_dangling_ids() {
    let f = Fixture::new("mgr_repair", false);
    let a = f.tag("a");
    let b = f.tag("b");
    let mut article = f.article("first");
    f.db.related(&mut article, "tags")
        .unwrap()
        .add([&a, &b], true)
        .unwrap();

    assert!(f.db.delete(&a).unwrap());
    let mut stored = f.reload(&article);
    let mut tags = f.db.related(&mut stored, "tags").unwrap();
    assert_eq!(tags.remove_nonexists(true).unwrap(), 1);
    assert_eq!(tags.ids(), vec![b.pk().unwrap()]);
    assert_eq!(f.reload(&article).cells("tags").len(), 1);
}

// ── Signals ───────────────────────────────────────────────────────────

type EventLog = Arc<Mutex<Vec<(M2MAction, Vec<String>, usize)>>>;

fn listen(f: &Fixture, receiver_id: &str) -> EventLog {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    M2M_CHANGED.connect_to(
        f.through_label(),
        receiver_id,
        Arc::new(move |event: &M2MChanged| {
            sink.lock().unwrap().push((
                event.action,
                event.pk_set.clone(),
                event.instance.cells("tags").len(),
            ));
            None
        }),
    );
    log
}

#[test]
fn test_signals_bracket_every_mutation() {
    let f = Fixture::new("mgr_signals", false);
    let log = listen(&f, "mgr_signals.recorder");
    let a = f.tag("a");
    let b = f.tag("b");
    let mut article = f.article("first");

    let mut tags = f.db.related(&mut article, "tags").unwrap();
    tags.add([&a, &b, &a], false).unwrap();
    tags.remove([&b], false).unwrap();
    tags.clear(false).unwrap();
    M2M_CHANGED.disconnect("mgr_signals.recorder");

    let (a_hex, b_hex) = (a.pk().unwrap().to_hex(), b.pk().unwrap().to_hex());
    let events = log.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            (M2MAction::PreAdd, vec![a_hex.clone(), b_hex.clone()], 0),
            (M2MAction::PostAdd, vec![a_hex.clone(), b_hex.clone()], 2),
            (M2MAction::PreRemove, vec![b_hex.clone()], 2),
            (M2MAction::PostRemove, vec![b_hex], 1),
            (M2MAction::PreClear, vec![a_hex.clone()], 1),
            (M2MAction::PostClear, vec![a_hex], 0),
        ]
    );
}

#[test]
fn test_removing_non_member_still_signals_empty_set() {
    let f = Fixture::new("mgr_noop", false);
    let log = listen(&f, "mgr_noop.recorder");
    let a = f.tag("a");
    let stranger = f.tag("stranger");
    let mut article = f.article("first");

    let mut tags = f.db.related(&mut article, "tags").unwrap();
    tags.add([&a], false).unwrap();
    tags.remove([&stranger], false).unwrap();
    M2M_CHANGED.disconnect("mgr_noop.recorder");

    assert_eq!(tags.ids(), vec![a.pk().unwrap()]);
    let events = log.lock().unwrap().clone();
    assert_eq!(events[2], (M2MAction::PreRemove, vec![], 1));
    assert_eq!(events[3], (M2MAction::PostRemove, vec![], 1));
}

#[test]
fn test_clear_signals_carry_every_held_id() {
    let f = Fixture::new("mgr_clear_set", false);
    let log = listen(&f, "mgr_clear_set.recorder");
    let a = f.tag("a");
    let b = f.tag("b");
    let mut article = f.article("first");

    let mut tags = f.db.related(&mut article, "tags").unwrap();
    tags.add([&a, &b], false).unwrap();
    tags.clear(false).unwrap();
    M2M_CHANGED.disconnect("mgr_clear_set.recorder");

    let held = vec![a.pk().unwrap().to_hex(), b.pk().unwrap().to_hex()];
    let events = log.lock().unwrap().clone();
    assert_eq!(events[2], (M2MAction::PreClear, held.clone(), 2));
    assert_eq!(events[3], (M2MAction::PostClear, held, 0));
}

#[test]
fn test_reload_from_db_signals_clear_then_add() {
    let f = Fixture::new("mgr_reload_sig", false);
    let a = f.tag("a");
    let b = f.tag("b");
    let mut article = f.article("first");
    f.db.related(&mut article, "tags")
        .unwrap()
        .add([&a, &b], true)
        .unwrap();
    f.db.delete(&b).unwrap();

    let log = listen(&f, "mgr_reload_sig.recorder");
    f.db.related(&mut article, "tags")
        .unwrap()
        .reload_from_db(false)
        .unwrap();
    M2M_CHANGED.disconnect("mgr_reload_sig.recorder");

    let (a_hex, b_hex) = (a.pk().unwrap().to_hex(), b.pk().unwrap().to_hex());
    let events = log.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            (M2MAction::PreClear, vec![a_hex.clone(), b_hex.clone()], 2),
            (M2MAction::PostClear, vec![a_hex.clone(), b_hex], 0),
            (M2MAction::PreAdd, vec![a_hex.clone()], 0),
            (M2MAction::PostAdd, vec![a_hex], 1),
        ]
    );
}

#[test]
fn test_remove_nonexists_without_dangling_ids_signals_empty_set() {
    let f = Fixture::new("mgr_repair_noop", false);
    let a = f.tag("a");
    let mut article = f.article("first");
    let mut tags = f.db.related(&mut article, "tags").unwrap();
    tags.add([&a], false).unwrap();

    let log = listen(&f, "mgr_repair_noop.recorder");
    assert_eq!(tags.remove_nonexists(false).unwrap(), 0);
    M2M_CHANGED.disconnect("mgr_repair_noop.recorder");

    assert_eq!(
        log.lock().unwrap().clone(),
        vec![
            (M2MAction::PreRemove, vec![], 1),
            (M2MAction::PostRemove, vec![], 1),
        ]
    );
}

#[test]
fn test_signal_payload_fields() {
    let f = Fixture::new("mgr_payload", false);
    let seen: Arc<Mutex<Vec<M2MChanged>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    M2M_CHANGED.connect_to(
        f.through_label(),
        "mgr_payload.recorder",
        Arc::new(move |event: &M2MChanged| {
            sink.lock().unwrap().push(event.clone());
            None
        }),
    );
    let a = f.tag("a");
    let mut article = f.article("first");
    f.db.related(&mut article, "tags")
        .unwrap()
        .add([&a], false)
        .unwrap();
    M2M_CHANGED.disconnect("mgr_payload.recorder");

    let events = seen.lock().unwrap();
    let post = &events[1];
    assert_eq!(post.action.as_str(), "post_add");
    assert!(!post.reverse);
    assert_eq!(post.using, "default");
    assert_eq!(post.model.object_name, "TestTag");
    assert_eq!(post.instance, article);
    assert_eq!(
        post.sender.as_ref().unwrap().object_name,
        "TestArticleTestTagRelationship"
    );
}

// ── Storage encoding and legacy shapes ────────────────────────────────

#[test]
fn test_reference_field_stores_bare_ids() {
    let f = Fixture::new("enc_ref", false);
    let a = f.tag("a");
    let mut article = f.article("first");
    f.db.related(&mut article, "tags")
        .unwrap()
        .add([&a], true)
        .unwrap();

    let record = f
        .store
        .find_one(&f.article.db_table, &doc! { "_id": article_id(&article) })
        .unwrap()
        .unwrap();
    assert_eq!(
        record.get_array("tags").unwrap(),
        &vec![Bson::ObjectId(a.pk().unwrap())]
    );
    assert_eq!(record.get_str("title").unwrap(), "first");
}

#[test]
fn test_embedded_field_round_trip() {
    let f = Fixture::new("enc_embed", true);
    let a = f.tag("a");
    let b = f.tag("b");
    let mut article = f.article("first");
    f.db.related(&mut article, "tags")
        .unwrap()
        .add([a.pk().unwrap(), b.pk().unwrap()], true)
        .unwrap();

    let record = f
        .store
        .find_one(&f.article.db_table, &doc! { "_id": article_id(&article) })
        .unwrap()
        .unwrap();
    let stored = record.get_array("tags").unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].as_document().unwrap().get_str("name").unwrap(), "a");

    let mut loaded = f.reload(&article);
    let mut tags = f.db.related(&mut loaded, "tags").unwrap();
    assert_eq!(tags.ids(), vec![a.pk().unwrap(), b.pk().unwrap()]);
    assert!(loaded_cells_are_cached(&tags.all().documents().unwrap()));
    assert_eq!(Fixture::names(&tags.objects().unwrap()), vec!["a", "b"]);
}

fn article_id(article: &Document) -> ObjectId {
    article.pk().unwrap()
}

fn loaded_cells_are_cached(docs: &[Document]) -> bool {
    docs.iter().all(|doc| doc.get("name").is_some())
}

#[test]
fn test_migrates_id_list_into_embedded_field() {
    let f = Fixture::new("mig_ids", true);
    let a = f.tag("a");
    let b = f.tag("b");
    let article_pk = ObjectId::new();
    let a_hex = a.pk().unwrap().to_hex();
    let b_pk = b.pk().unwrap();
    f.store
        .save(
            &f.article.db_table,
            doc! {
                "_id": article_pk,
                "title": "legacy",
                "tags": [a_hex, b_pk],
            },
        )
        .unwrap();

    let mut article = f.db.get_by_pk(&f.article, article_pk).unwrap();
    assert!(article.cells("tags").iter().all(|cell| !cell.is_loaded()));
    f.db.save(&mut article).unwrap();

    let record = f
        .store
        .find_one(&f.article.db_table, &doc! { "_id": article_pk })
        .unwrap()
        .unwrap();
    let names: Vec<&str> = record
        .get_array("tags")
        .unwrap()
        .iter()
        .map(|element| element.as_document().unwrap().get_str("name").unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_migrates_embedded_list_into_reference_field() {
    let f = Fixture::new("mig_embed", false);
    let a = f.tag("a");
    let article_pk = ObjectId::new();
    let a_pk = a.pk().unwrap();
    f.store
        .save(
            &f.article.db_table,
            doc! {
                "_id": article_pk,
                "tags": [{ "_id": a_pk, "name": "a" }],
            },
        )
        .unwrap();

    let mut article = f.db.get_by_pk(&f.article, article_pk).unwrap();
    assert_eq!(article.cells("tags")[0].pk(), a.pk().unwrap());
    f.db.save(&mut article).unwrap();

    let record = f
        .store
        .find_one(&f.article.db_table, &doc! { "_id": article_pk })
        .unwrap()
        .unwrap();
    assert_eq!(
        record.get_array("tags").unwrap(),
        &vec![Bson::ObjectId(a.pk().unwrap())]
    );
}

#[test]
fn test_decodes_construction_tuples() {
    let f = Fixture::new("mig_tuple", true);
    let a = f.tag("a");
    let b = f.tag("b");
    let article_pk = ObjectId::new();
    let a_hex = a.pk().unwrap().to_hex();
    let b_pk = b.pk().unwrap();
    f.store
        .save(
            &f.article.db_table,
            doc! {
                "_id": article_pk,
                "tags": [
                    { "_model": "mig_tuple.TestTag", "id": a_hex },
                    { "_model": "mig_tuple.TestTag", "id": b_pk, "name": "b" },
                    42,
                ],
            },
        )
        .unwrap();

    let article = f.db.get_by_pk(&f.article, article_pk).unwrap();
    let cells = article.cells("tags");
    assert_eq!(cells.len(), 2);
    assert!(!cells[0].is_loaded());
    assert_eq!(
        cells[1].document().unwrap().get("name"),
        Some(Value::from("b"))
    );
}

#[test]
fn test_relationship_edit_keeps_other_host_columns_intact() {
    let f = Fixture::new("keep_cols", false);
    let a = f.tag("a");
    let article_pk = ObjectId::new();
    let seen = Bson::Timestamp(bson::Timestamp { time: 5, increment: 1 });
    let blob = Bson::Binary(bson::Binary {
        subtype: bson::spec::BinarySubtype::UserDefined(0x80),
        bytes: vec![1, 2, 3],
    });
    let count = Bson::Int64(3);
    f.store
        .save(
            &f.article.db_table,
            doc! {
                "_id": article_pk,
                "title": "first",
                "seen": seen.clone(),
                "blob": blob.clone(),
                "count": count.clone(),
            },
        )
        .unwrap();

    let mut article = f.db.get_by_pk(&f.article, article_pk).unwrap();
    f.db.related(&mut article, "tags")
        .unwrap()
        .add([&a], true)
        .unwrap();

    let record = f
        .store
        .find_one(&f.article.db_table, &doc! { "_id": article_pk })
        .unwrap()
        .unwrap();
    assert_eq!(record.get("seen"), Some(&seen));
    assert_eq!(record.get("blob"), Some(&blob));
    assert_eq!(record.get("count"), Some(&count));
    assert_eq!(record.get_str("title").unwrap(), "first");
}

#[test]
fn test_embedded_copies_keep_storage_types() {
    let f = Fixture::new("keep_embed", true);
    let tag_pk = ObjectId::new();
    let seen = Bson::Timestamp(bson::Timestamp { time: 9, increment: 2 });
    f.store
        .save(
            &f.tag.db_table,
            doc! { "_id": tag_pk, "name": "a", "seen": seen.clone() },
        )
        .unwrap();
    let tag = f.db.get_by_pk(&f.tag, tag_pk).unwrap();

    let mut article = f.article("first");
    f.db.related(&mut article, "tags")
        .unwrap()
        .add([&tag], true)
        .unwrap();

    let record = f
        .store
        .find_one(&f.article.db_table, &doc! { "_id": article_id(&article) })
        .unwrap()
        .unwrap();
    let embedded = record.get_array("tags").unwrap()[0].as_document().unwrap();
    assert_eq!(embedded.get("seen"), Some(&seen));
    assert_eq!(embedded.get_str("name").unwrap(), "a");
}

// ── Cached versus fresh reads ─────────────────────────────────────────

#[test]
fn test_cached_embedded_copies_survive_target_deletion() {
    let f = Fixture::new("qs_cached", true);
    let x = f.tag("x");
    let y = f.tag("y");
    let mut article = f.article("first");
    f.db.related(&mut article, "tags")
        .unwrap()
        .add([&x, &y], true)
        .unwrap();
    f.db.delete(&x).unwrap();

    let mut stored = f.reload(&article);
    let tags = f.db.related(&mut stored, "tags").unwrap();
    let cached = tags.all().documents().unwrap();
    assert_eq!(Fixture::names(&cached), vec!["x", "y"]);

    let fresh = tags
        .all_with(QueryOptions::fresh())
        .unwrap()
        .documents()
        .unwrap();
    assert_eq!(Fixture::names(&fresh), vec!["y"]);

    let existing = tags
        .all_with(QueryOptions {
            use_cached: true,
            exists_in_db_only: true,
        })
        .unwrap();
    assert_eq!(existing.ids(), vec![y.pk().unwrap()]);
}

#[test]
fn test_reload_from_db_refreshes_stale_copies() {
    let f = Fixture::new("qs_stale", true);
    let mut x = f.tag("old");
    let mut article = f.article("first");
    f.db.related(&mut article, "tags")
        .unwrap()
        .add([&x], true)
        .unwrap();

    x.set("name", "new").unwrap();
    f.db.save(&mut x).unwrap();

    let mut stored = f.reload(&article);
    let mut tags = f.db.related(&mut stored, "tags").unwrap();
    assert_eq!(Fixture::names(&tags.objects().unwrap()), vec!["old"]);

    tags.reload_from_db(true).unwrap();
    assert_eq!(Fixture::names(&tags.objects().unwrap()), vec!["new"]);

    let mut again = f.reload(&article);
    let mut tags = f.db.related(&mut again, "tags").unwrap();
    assert_eq!(Fixture::names(&tags.objects().unwrap()), vec!["new"]);
}

#[test]
fn test_reload_from_db_drops_deleted_targets() {
    let f = Fixture::new("qs_reload", false);
    let x = f.tag("x");
    let y = f.tag("y");
    let mut article = f.article("first");
    f.db.related(&mut article, "tags")
        .unwrap()
        .add([&x, &y], true)
        .unwrap();
    f.db.delete(&x).unwrap();

    f.db.related(&mut article, "tags")
        .unwrap()
        .reload_from_db(true)
        .unwrap();
    assert_eq!(f.reload(&article).cells("tags").len(), 1);
    assert_eq!(f.reload(&article).cells("tags")[0].pk(), y.pk().unwrap());
}

#[test]
fn test_dangling_ids_are_skipped_on_read() {
    let f = Fixture::new("qs_dangling", false);
    let x = f.tag("x");
    let y = f.tag("y");
    let mut article = f.article("first");
    f.db.related(&mut article, "tags")
        .unwrap()
        .add([&x, &y], true)
        .unwrap();
    f.db.delete(&x).unwrap();

    let mut stored = f.reload(&article);
    let mut tags = f.db.related(&mut stored, "tags").unwrap();
    let mut qs = tags.all();
    assert_eq!(qs.len(), 2);
    assert!(qs.get_index(0).unwrap().is_none());
    assert_eq!(qs.entries().unwrap().len(), 1);
    assert!(qs.get_index(5).unwrap().is_none());
    assert_eq!(Fixture::names(&tags.objects().unwrap()), vec!["y"]);
}

// ── Query-set narrowing and projection ────────────────────────────────

#[test]
fn test_queryset_filter_and_exclude() {
    let f = Fixture::new("qs_filter", false);
    let rust = f.tag("rust");
    let go = f.tag("go");
    let ruby = f.tag("ruby");
    let mut article = f.article("first");
    let mut tags = f.db.related(&mut article, "tags").unwrap();
    tags.add([&rust, &go], true).unwrap();

    let mut matching = tags
        .filter(&Q::filter("name", Lookup::StartsWith("r".into())))
        .unwrap();
    assert_eq!(matching.ids(), vec![rust.pk().unwrap()]);
    assert_eq!(Fixture::names(&matching.documents().unwrap()), vec!["rust"]);

    let excluded = tags.all().exclude(&Q::eq("name", "rust")).unwrap();
    assert_eq!(excluded.ids(), vec![go.pk().unwrap()]);

    // Documents outside the relationship never leak in.
    let all_r = tags.filter(&Q::filter("name", Lookup::IStartsWith("R".into()))).unwrap();
    assert!(!all_r.ids().contains(&ruby.pk().unwrap()));
    assert!(tags.all().none().is_empty());
}

#[test]
fn test_queryset_get_and_values_list() {
    let f = Fixture::new("qs_values", false);
    let rust = f.tag("rust");
    let go = f.tag("go");
    let stranger = f.tag("stranger");
    let mut article = f.article("first");
    let mut tags = f.db.related(&mut article, "tags").unwrap();
    tags.add([&rust, &go], true).unwrap();

    let found = tags.get(&go).unwrap().unwrap();
    assert_eq!(found.get("name"), Some(Value::from("go")));
    assert!(tags.get(&stranger).unwrap().is_none());

    let mut qs = tags.all();
    assert_eq!(
        qs.values_list(&["name"], true).unwrap(),
        vec![
            ValuesListRow::Flat(Value::from("rust")),
            ValuesListRow::Flat(Value::from("go")),
        ]
    );
    assert_eq!(
        qs.values_list(&["name", "missing"], false).unwrap()[0],
        ValuesListRow::Tuple(vec![Value::from("rust"), Value::Null])
    );
    match qs.values_list(&["name", "id"], true).unwrap_err() {
        M2MError::InvalidArgument(msg) => assert_eq!(
            msg,
            "'flat' is not valid when values_list is called with more than one field."
        ),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_queryset_display_is_truncated() {
    let f = Fixture::new("qs_repr", false);
    let settings = Settings {
        repr_output_size: 2,
        ..Settings::default()
    };
    let db = Database::from_settings(&settings, f.store.clone(), Arc::new(mongom2m::Registry::new()))
        .unwrap();
    assert_eq!(db.repr_output_size(), 2);

    let tags: Vec<Document> = ["a", "b", "c"].iter().map(|n| f.tag(n)).collect();
    let mut article = f.article("first");
    let mut manager = f.db.related(&mut article, "tags").unwrap();
    manager.add(&tags, false).unwrap();

    let shown = manager.all().to_string();
    assert!(shown.starts_with("[TestTag object ("));
    assert!(!shown.contains("truncated"));

    let mut many: Vec<Document> = Vec::new();
    for i in 0..25 {
        many.push(f.tag(&format!("t{i}")));
    }
    manager.add(&many, false).unwrap();
    let shown = manager.all().to_string();
    assert!(shown.ends_with("...(remaining elements truncated)...]"));
    assert_eq!(shown.matches("TestTag object").count(), 20);
}

#[test]
fn test_queryset_using_alias() {
    let f = Fixture::new("qs_using", false);
    let mut article = f.article("first");
    let tags = f.db.related(&mut article, "tags").unwrap();
    let qs = tags.all();
    assert_eq!(qs.db(), "default");
    assert_eq!(qs.using("replica").db(), "replica");
}

#[test]
fn test_from_settings_requires_configured_alias() {
    let settings = Settings {
        default_database: "missing".to_string(),
        ..Settings::default()
    };
    let err = Database::from_settings(
        &settings,
        Arc::new(mongom2m::MemoryStore::new()),
        Arc::new(mongom2m::Registry::new()),
    )
    .unwrap_err();
    assert!(matches!(err, M2MError::ConfigurationError(_)));
}

#[test]
fn test_from_global_settings() {
    let err = Database::from_global_settings(
        Arc::new(mongom2m::MemoryStore::new()),
        Arc::new(mongom2m::Registry::new()),
    )
    .unwrap_err();
    assert!(matches!(err, M2MError::ConfigurationError(_)));

    SETTINGS.configure(Settings {
        repr_output_size: 7,
        ..Settings::default()
    });
    let db = Database::from_global_settings(
        Arc::new(mongom2m::MemoryStore::new()),
        Arc::new(mongom2m::Registry::new()),
    )
    .unwrap();
    assert_eq!(db.repr_output_size(), 7);
    assert_eq!(db.alias(), "default");
}
