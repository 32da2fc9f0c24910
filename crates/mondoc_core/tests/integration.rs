//! End-to-end scenarios over an in-memory store.

use mondoc_core::{
    downcast, CancelToken, Config, Document, DocumentBase, DocumentContext, DocumentId,
    DocumentState, DocumentStore, DocumentType, Filter, FindOptions, InMemoryStore, MondocError,
    PropertySpec, RefIds, StateMask, Value, WriteError,
};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

const PERSON_LAYOUT: &[PropertySpec] = &[
    PropertySpec::scalar("name"),
    PropertySpec::scalar("age"),
    PropertySpec::complex("profile"),
    PropertySpec::reference("parent", "Person"),
    PropertySpec::collection("items", "Item"),
];

struct Person {
    base: DocumentBase,
}

impl Person {
    fn new(name: &str) -> Arc<Self> {
        let person = Self::create(DocumentId::generate());
        person.set_name(name);
        person
    }

    fn name(&self) -> String {
        self.base
            .value("name")
            .and_then(|value| value.as_text().map(String::from))
            .unwrap_or_default()
    }

    fn set_name(&self, name: &str) {
        self.base
            .set_value("name", Value::Text(name.to_string()))
            .unwrap();
    }
}

impl Document for Person {
    fn base(&self) -> &DocumentBase {
        &self.base
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl DocumentType for Person {
    fn collection_name() -> &'static str {
        "Person"
    }

    fn layout() -> &'static [PropertySpec] {
        PERSON_LAYOUT
    }

    fn create(id: DocumentId) -> Arc<Self> {
        Arc::new(Self {
            base: DocumentBase::with_id(id, "Person", PERSON_LAYOUT),
        })
    }
}

const ITEM_LAYOUT: &[PropertySpec] = &[PropertySpec::scalar("label")];

struct Item {
    base: DocumentBase,
}

impl Item {
    fn new(label: i64) -> Arc<Self> {
        let item = Self::create(DocumentId::generate());
        item.base.set_value("label", Value::Int(label)).unwrap();
        item
    }
}

impl Document for Item {
    fn base(&self) -> &DocumentBase {
        &self.base
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl DocumentType for Item {
    fn collection_name() -> &'static str {
        "Item"
    }

    fn layout() -> &'static [PropertySpec] {
        ITEM_LAYOUT
    }

    fn create(id: DocumentId) -> Arc<Self> {
        Arc::new(Self {
            base: DocumentBase::with_id(id, "Item", ITEM_LAYOUT),
        })
    }
}

/// A context over a fresh in-memory store. The cleaner bounds are
/// hours so background cleanups never interfere with cache assertions.
fn create_context() -> (Arc<InMemoryStore>, DocumentContext) {
    let store = Arc::new(InMemoryStore::new());
    let config = Config::new()
        .with_cleanup_lower_bound(Duration::from_secs(3600))
        .with_cleanup_upper_bound(Duration::from_secs(7200));
    let store_handle: Arc<dyn DocumentStore> = Arc::clone(&store) as Arc<dyn DocumentStore>;
    let context = DocumentContext::with_config(store_handle, config).unwrap();
    (store, context)
}

#[test]
fn s1_add_save_mutate_save_reload() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    let person = Person::new("x");
    let id = person.base().id();
    let entry = people.add(&person).unwrap();
    assert_eq!(entry.state(), DocumentState::Added);

    assert_eq!(context.save_changes().unwrap(), 1);
    assert_eq!(entry.state(), DocumentState::Unchanged);

    let found = people.find(id).unwrap().unwrap();
    assert_eq!(found.name(), "x");

    // A controlled write dirties the entry.
    person.set_name("y");
    assert_eq!(entry.state(), DocumentState::Modified);

    assert_eq!(context.save_changes().unwrap(), 1);
    assert_eq!(entry.state(), DocumentState::Unchanged);

    context.reload(entry.entry()).unwrap();
    assert_eq!(person.name(), "y");
    assert_eq!(entry.state(), DocumentState::Unchanged);
}

#[test]
fn s2_identity_preserved_across_reads() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    let first = Person::new("a");
    let second = Person::new("b");
    let id = first.base().id();
    people.add(&first).unwrap();
    people.add(&second).unwrap();
    context.save_changes().unwrap();

    let by_id = people.find(id).unwrap().unwrap();
    let by_filter = people
        .find_one(Filter::new(move |record| record.id() == Some(id)))
        .unwrap()
        .unwrap();

    assert!(Arc::ptr_eq(&by_id, &by_filter));
    assert!(Arc::ptr_eq(&by_id, &first));
}

#[test]
fn s3_reference_load() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    let parent = Person::new("parent");
    let child = Person::new("child");
    let child_id = child.base().id();
    let referent: Arc<dyn Document> = parent.clone();
    child.base().set_reference("parent", Some(referent)).unwrap();

    people.add(&parent).unwrap();
    people.add(&child).unwrap();
    context.save_changes().unwrap();

    // Drop the in-memory child; keep the parent tracked and alive.
    drop(child);

    let reread = people.find(child_id).unwrap().unwrap();
    let entry = context.entry(child_id).unwrap();
    let reference = entry.reference("parent").unwrap();

    // The typed slot is null until loaded.
    assert!(reread.base().reference("parent").is_none());
    assert!(!reference.is_loaded());

    reference.load().unwrap();
    assert!(reference.is_loaded());
    let loaded = reference.current_value().unwrap();
    let parent_dyn: Arc<dyn Document> = parent.clone();
    assert!(Arc::ptr_eq(&loaded, &parent_dyn));

    // Loading is hydration, not a user edit.
    assert_eq!(entry.state(), DocumentState::Unchanged);

    // A second load is a no-op.
    reference.load().unwrap();
    assert!(Arc::ptr_eq(&reference.current_value().unwrap(), &parent_dyn));
}

#[test]
fn s4_collection_load() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();
    let items = context.set::<Item>();

    let person = Person::new("owner");
    let person_id = person.base().id();
    let mut item_ids = Vec::new();
    for label in 0..10 {
        let item = Item::new(label);
        item_ids.push(item.base().id());
        items.add(&item).unwrap();
    }
    person
        .base()
        .set_reference_ids("items", RefIds::Many(item_ids.clone()));
    people.add(&person).unwrap();
    context.save_changes().unwrap();

    drop(person);

    let reread = people.find(person_id).unwrap().unwrap();
    assert!(reread.base().reference_list("items").is_none());

    let entry = context.entry(person_id).unwrap();
    let collection = entry.collection("items").unwrap();
    assert!(!collection.is_loaded());

    collection.load().unwrap();
    assert!(collection.is_loaded());
    assert_eq!(collection.len().unwrap(), 10);
    for id in &item_ids {
        assert!(collection.contains(*id).unwrap());
    }
    assert_eq!(entry.state(), DocumentState::Unchanged);
}

#[test]
fn s5_cache_reclamation() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    let count = 16;
    let mut kept = Vec::new();
    for i in 0..count {
        let person = Person::new(&format!("p{i}"));
        people.add(&person).unwrap();
        kept.push(person);
    }
    context.save_changes().unwrap();

    let cache = context.state().unchanged();
    assert_eq!(cache.exact_count(), count);
    assert_eq!(cache.capacity(), count);

    // Release every strong reference; the weakly held documents are
    // reclaimed.
    kept.clear();

    assert_eq!(cache.exact_count(), 0);
    assert_eq!(cache.capacity(), count);

    assert_eq!(cache.flush(usize::MAX), count);
    assert_eq!(cache.capacity(), 0);
}

#[test]
fn s6_partial_write_failure() {
    let (store, context) = create_context();
    let people = context.set::<Person>();

    let docs = [Person::new("a"), Person::new("b"), Person::new("c")];
    let mut entries = Vec::new();
    for doc in &docs {
        entries.push(people.add(doc).unwrap());
    }
    store.script_insert_errors(vec![WriteError::new(1, 121, "validation failed")]);

    // The failure never raises and never aborts the batch.
    assert_eq!(context.save_changes().unwrap(), 2);

    assert_eq!(entries[0].state(), DocumentState::Unchanged);
    assert_eq!(entries[1].state(), DocumentState::Added);
    assert_eq!(entries[2].state(), DocumentState::Unchanged);

    // The failed entry commits on a later save.
    assert_eq!(context.save_changes().unwrap(), 1);
    assert_eq!(entries[1].state(), DocumentState::Unchanged);
}

#[test]
fn insert_batches_are_sliced_at_one_thousand() {
    let (store, context) = create_context();
    let people = context.set::<Person>();

    let mut kept = Vec::new();
    for i in 0..1500 {
        let person = Person::new(&format!("p{i}"));
        people.add(&person).unwrap();
        kept.push(person);
    }

    assert_eq!(context.save_changes().unwrap(), 1500);
    assert_eq!(store.insert_batch_sizes(), vec![1000, 500]);
}

#[test]
fn save_on_empty_dirty_set_issues_no_commands() {
    let (store, context) = create_context();
    context.set::<Person>();

    assert_eq!(context.save_changes().unwrap(), 0);
    assert_eq!(store.write_command_count(), 0);
}

#[test]
fn save_order_is_adds_then_modifies_then_deletes() {
    let (store, context) = create_context();
    let people = context.set::<Person>();

    // Seed two persisted documents.
    let modified = Person::new("m");
    let deleted = Person::new("d");
    people.add(&modified).unwrap();
    people.add(&deleted).unwrap();
    context.save_changes().unwrap();

    // One of each dirty state.
    let added = Person::new("a");
    people.add(&added).unwrap();
    modified.set_name("m2");
    people.remove(&deleted).unwrap();

    let commands_before = store.write_command_count();
    assert_eq!(context.save_changes().unwrap(), 3);
    assert_eq!(store.write_command_count() - commands_before, 3);

    // Deleted entries end Detached and are removed from tracking.
    assert!(context.entry(deleted.base().id()).is_none());
    assert_eq!(store.count("Person").unwrap(), 2);
}

#[test]
fn update_tracks_whole_document_as_modified() {
    let (store, context) = create_context();
    let people = context.set::<Person>();

    // A document the store already holds, tracked fresh via update.
    let person = Person::new("original");
    let id = person.base().id();
    people.add(&person).unwrap();
    context.save_changes().unwrap();

    let replacement = Person::create(id);
    replacement.set_name("replaced");
    let entry = people.update(&replacement).unwrap();

    assert_eq!(entry.state(), DocumentState::Modified);
    assert!(!entry.entry().modified_properties().is_empty());

    assert_eq!(context.save_changes().unwrap(), 1);
    let record = store.find_one("Person", id).unwrap().unwrap();
    assert_eq!(record.get("name").and_then(Value::as_text), Some("replaced"));
}

#[test]
fn dirty_entries_hold_strong_wrappers_unchanged_hold_weak() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    let person = Person::new("w");
    let entry = people.add(&person).unwrap();
    assert!(entry.entry().has_strong_wrapper());

    context.save_changes().unwrap();
    assert!(!entry.entry().has_strong_wrapper());

    person.set_name("w2");
    assert!(entry.entry().has_strong_wrapper());
}

#[test]
fn unregistered_type_raises_serializer_missing() {
    let (_store, context) = create_context();

    // Track directly without obtaining a document set.
    let person: Arc<dyn Document> = Person::new("untyped");
    context
        .track_object(person, DocumentState::Added)
        .unwrap();

    let result = context.save_changes();
    assert!(matches!(result, Err(MondocError::SerializerMissing { .. })));
}

#[test]
fn command_failure_propagates_and_keeps_entries_dirty() {
    let (store, context) = create_context();
    let people = context.set::<Person>();

    let person = Person::new("a");
    let entry = people.add(&person).unwrap();
    store.fail_next_command("primary stepped down");

    let result = context.save_changes();
    assert!(matches!(result, Err(MondocError::Store(_))));
    assert_eq!(entry.state(), DocumentState::Added);

    // The next save succeeds.
    assert_eq!(context.save_changes().unwrap(), 1);
}

#[test]
fn save_entry_targets_exactly_one_entry() {
    let (store, context) = create_context();
    let people = context.set::<Person>();

    let first = Person::new("one");
    let second = Person::new("two");
    let first_entry = people.add(&first).unwrap();
    people.add(&second).unwrap();

    assert_eq!(context.save_entry(first_entry.entry()).unwrap(), 1);
    assert_eq!(first_entry.state(), DocumentState::Unchanged);
    assert_eq!(store.count("Person").unwrap(), 1);

    // Saving a clean entry commits nothing.
    assert_eq!(context.save_entry(first_entry.entry()).unwrap(), 0);
}

#[test]
fn detached_entry_rejects_save_and_reload() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    let person = Person::new("gone");
    let entry = people.add(&person).unwrap();
    context.save_changes().unwrap();
    people.remove(&person).unwrap();
    context.save_changes().unwrap();

    assert_eq!(entry.state(), DocumentState::Detached);
    assert!(matches!(
        context.save_entry(entry.entry()),
        Err(MondocError::InvalidState { .. })
    ));
    assert!(matches!(
        context.reload(entry.entry()),
        Err(MondocError::InvalidState { .. })
    ));
}

#[test]
fn reload_of_missing_document_raises_not_found() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    let person = Person::new("never saved");
    let entry = people.attach(&person).unwrap();

    let result = context.reload(entry.entry());
    assert!(matches!(result, Err(MondocError::DocumentNotFound { .. })));
}

#[test]
fn reload_discards_concurrent_edits() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    let person = Person::new("stored");
    let entry = people.add(&person).unwrap();
    context.save_changes().unwrap();

    // Edits made while the reload is in flight lose to the store.
    person.set_name("local edit");
    assert_eq!(entry.state(), DocumentState::Modified);

    context.reload(entry.entry()).unwrap();
    assert_eq!(person.name(), "stored");
    assert_eq!(entry.state(), DocumentState::Unchanged);
    assert!(entry.entry().modified_properties().is_empty());
}

#[test]
fn delete_bypasses_tracked_set() {
    let (store, context) = create_context();
    let people = context.set::<Person>();

    let person = Person::new("zombie");
    people.add(&person).unwrap();
    context.save_changes().unwrap();

    assert_eq!(people.delete_all().unwrap(), 1);
    assert_eq!(store.count("Person").unwrap(), 0);

    // The tracked copy stays live and Unchanged; a replace finds no
    // row and resurrects nothing.
    person.set_name("back");
    assert_eq!(context.save_changes().unwrap(), 1);
    assert_eq!(store.count("Person").unwrap(), 0);

    // Re-adding the tracked copy resurrects the row as an insert.
    people.add(&person).unwrap();
    assert_eq!(context.save_changes().unwrap(), 1);
    assert_eq!(store.count("Person").unwrap(), 1);
}

#[test]
fn cancelled_find_completes_empty_without_raising() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    for i in 0..5 {
        let person = Person::new(&format!("p{i}"));
        people.add(&person).unwrap();
    }
    context.save_changes().unwrap();

    // Cancelled up front.
    let token = CancelToken::new();
    token.cancel();
    let found = people
        .find_where(Filter::all(), FindOptions::new().with_cancel(token))
        .unwrap();
    assert!(found.is_empty());

    // Cancelled mid-query: the filter fires the token, the decode
    // loop observes it.
    let token = CancelToken::new();
    let trigger = token.clone();
    let found = people
        .find_where(
            Filter::new(move |_| {
                trigger.cancel();
                true
            }),
            FindOptions::new().with_cancel(token),
        )
        .unwrap();
    assert!(found.is_empty());
}

#[test]
fn push_find_streams_and_refuses_overlap() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    let mut kept = Vec::new();
    for i in 0..5 {
        let person = Person::new(&format!("p{i}"));
        people.add(&person).unwrap();
        kept.push(person);
    }
    context.save_changes().unwrap();

    // A slow filter keeps the first subscription active while the
    // second is attempted.
    let receiver = people
        .find_push(
            Filter::new(|_| {
                std::thread::sleep(Duration::from_millis(20));
                true
            }),
            FindOptions::new(),
        )
        .unwrap();

    let overlap = people.find_push(Filter::all(), FindOptions::new());
    assert!(matches!(overlap, Err(MondocError::InvalidState { .. })));

    let received: Vec<Arc<Person>> = receiver.into_iter().collect();
    assert_eq!(received.len(), 5);

    // Once the worker finished, a new subscription is accepted.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match people.find_push(Filter::all(), FindOptions::new()) {
            Ok(receiver) => {
                assert_eq!(receiver.into_iter().count(), 5);
                break;
            }
            Err(_) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(5))
            }
            Err(error) => panic!("push find never became available: {error}"),
        }
    }
}

#[test]
fn cancelled_push_find_ends_stream_silently() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    let person = Person::new("p");
    people.add(&person).unwrap();
    context.save_changes().unwrap();

    let token = CancelToken::new();
    token.cancel();
    let receiver = people
        .find_push(Filter::all(), FindOptions::new().with_cancel(token))
        .unwrap();
    assert_eq!(receiver.into_iter().count(), 0);
}

#[test]
fn property_entry_reads_and_writes() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    let person = Person::new("before");
    let entry = people.add(&person).unwrap();
    context.save_changes().unwrap();

    let property = entry.property("name").unwrap();
    assert_eq!(property.current_value(), Some(Value::Text("before".into())));

    property.set_value(Value::Text("after".into())).unwrap();
    assert_eq!(person.name(), "after");
    assert_eq!(entry.state(), DocumentState::Modified);
    assert!(entry.entry().is_property_changed("name"));

    // Navigation properties are rejected by the property view.
    assert!(matches!(
        entry.property("parent"),
        Err(MondocError::Argument { .. })
    ));
}

#[test]
fn collection_entry_mutation_dirties_owner() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();
    let items = context.set::<Item>();

    let person = Person::new("owner");
    let item = Item::new(1);
    items.add(&item).unwrap();
    person
        .base()
        .set_reference_ids("items", RefIds::Many(vec![item.base().id()]));
    people.add(&person).unwrap();
    context.save_changes().unwrap();

    let entry = context.entry(person.base().id()).unwrap();
    let collection = entry.collection("items").unwrap();
    collection.load().unwrap();
    assert_eq!(entry.state(), DocumentState::Unchanged);

    let extra = Item::new(2);
    items.add(&extra).unwrap();
    context.save_changes().unwrap();

    let extra_dyn: Arc<dyn Document> = extra.clone();
    collection.add(extra_dyn).unwrap();
    assert_eq!(entry.state(), DocumentState::Modified);
    assert_eq!(collection.len().unwrap(), 2);

    assert!(collection.remove(extra.base().id()).unwrap());
    assert_eq!(collection.len().unwrap(), 1);
}

#[test]
fn dead_entry_is_invisible_until_revived() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    let person = Person::new("fleeting");
    let id = person.base().id();
    people.add(&person).unwrap();
    context.save_changes().unwrap();

    drop(person);
    // The Unchanged entry is dead: untracked as far as lookups go.
    assert!(context.entry(id).is_none());

    // Reading the identity again revives the entry with the fresh
    // instance.
    let reread = people.find(id).unwrap().unwrap();
    assert_eq!(reread.base().id(), id);
    let entry = context.entry(id).unwrap();
    assert_eq!(entry.state(), DocumentState::Unchanged);
    let held = entry.document().unwrap();
    assert!(Arc::ptr_eq(&downcast::<Person>(held).unwrap(), &reread));
}

#[test]
fn statistics_snapshot_reflects_state() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    let kept_unchanged = Person::new("u");
    people.add(&kept_unchanged).unwrap();
    context.save_changes().unwrap();

    let added = Person::new("a");
    people.add(&added).unwrap();
    let deleted = Person::new("d");
    people.add(&deleted).unwrap();
    context.save_changes().unwrap();
    people.remove(&deleted).unwrap();
    kept_unchanged.set_name("u2");

    let stats = context.statistics();
    assert_eq!(stats.added, 0);
    assert_eq!(stats.modified, 1);
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.unchanged_live, 1);
    assert_eq!(stats.cache_capacity, 1);

    // A manual full cleanup shows up in the counters.
    context.state().clean_up(true);
    let stats = context.statistics();
    assert_eq!(stats.full_cleanups, 1);
    assert!(stats.last_cleanup_age.is_some());
}

#[test]
fn single_entry_per_identity_across_sets_and_finds() {
    let (_store, context) = create_context();
    let people = context.set::<Person>();

    let person = Person::new("solo");
    let id = person.base().id();
    people.add(&person).unwrap();
    context.save_changes().unwrap();

    people.find(id).unwrap().unwrap();
    people
        .find_where(Filter::all(), FindOptions::new())
        .unwrap();
    people.attach(&person).unwrap();

    assert_eq!(context.state().count(StateMask::ALL), 1);
}

#[test]
fn dropping_context_shuts_down_cleaner() {
    let (_store, context) = create_context();
    assert!(context.cleaner().is_running());
    // Drop joins the worker; returning from this test means the
    // shutdown handshake completed.
    drop(context);
}

#[test]
fn persisted_record_layout_follows_declaration_order() {
    let (store, context) = create_context();
    let people = context.set::<Person>();

    let person = Person::new("ordered");
    person.base().set_value("age", Value::Int(30)).unwrap();
    people.add(&person).unwrap();
    context.save_changes().unwrap();

    let record = store.find_one("Person", person.base().id()).unwrap().unwrap();
    let names: Vec<&str> = record.fields().iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec!["_id", "name", "age", "profile", "parent", "items"]
    );
}
