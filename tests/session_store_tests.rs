use std::collections::HashSet;
use terramark_storage::SessionStore;

#[test]
fn test_create_session_idempotent() {
    let store = SessionStore::new();
    store.create_session("s1");
    store.add_image("s1", "a.png", "uploads/a.png", None, None);
    store.create_session("s1");

    assert!(store.session_exists("s1"));
    assert_eq!(store.get_images("s1", 0, 10).len(), 1);
    assert_eq!(store.session_count(), 1);
}

#[test]
fn test_add_image_auto_creates_session() {
    let store = SessionStore::new();
    let image = store.add_image("fresh", "a.png", "uploads/a.png", Some("640x480".to_string()), None);

    assert!(store.session_exists("fresh"));
    assert_eq!(image.file_name, "a.png");
    assert_eq!(image.source.as_deref(), Some("user_upload"));
    assert_eq!(store.get_image("fresh", &image.image_id).unwrap().image_id, image.image_id);
}

#[test]
fn test_get_images_pagination_preserves_order() {
    let store = SessionStore::new();
    let mut ids = vec![];
    for i in 0..5 {
        let image = store.add_image("s1", &format!("img{}.png", i), "uploads/x.png", None, None);
        ids.push(image.image_id);
    }

    let page = store.get_images("s1", 1, 2);
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].image_id, ids[1]);
    assert_eq!(page[1].image_id, ids[2]);

    assert!(store.get_images("unknown", 0, 10).is_empty());
    assert!(store.get_images("s1", 10, 10).is_empty());
}

#[test]
fn test_remove_image_cascades_only_its_annotations() {
    let store = SessionStore::new();
    let image_a = store.add_image("s1", "a.png", "uploads/a.png", None, None);
    let image_b = store.add_image("s1", "b.png", "uploads/b.png", None, None);

    for i in 0..3 {
        store
            .add_annotation("s1", &image_a.image_id, &format!("ann_a{}.geojson", i), true, None, None)
            .unwrap();
    }
    let kept: HashSet<String> = (0..2)
        .map(|i| {
            store
                .add_annotation("s1", &image_b.image_id, &format!("ann_b{}.geojson", i), false, None, None)
                .unwrap()
                .annotation_id
        })
        .collect();

    assert!(store.remove_image("s1", &image_a.image_id));
    assert!(store.get_image("s1", &image_a.image_id).is_none());

    // Annotations for the removed image are gone; the others are untouched
    let remaining: HashSet<String> = store
        .get_annotations("s1", None)
        .into_iter()
        .map(|a| a.annotation_id)
        .collect();
    assert_eq!(remaining, kept);

    assert!(!store.remove_image("s1", &image_a.image_id));
    assert!(!store.remove_image("unknown", &image_b.image_id));
}

#[test]
fn test_add_annotation_sentinels() {
    let store = SessionStore::new();
    assert!(store
        .add_annotation("no-session", "no-image", "x.geojson", true, None, None)
        .is_none());

    store.create_session("s1");
    assert!(store
        .add_annotation("s1", "no-image", "x.geojson", true, None, None)
        .is_none());
}

#[test]
fn test_add_annotation_caller_id_resaves() {
    let store = SessionStore::new();
    let image = store.add_image("s1", "a.png", "uploads/a.png", None, None);

    let first = store
        .add_annotation("s1", &image.image_id, "v1.geojson", false, None, Some("manual-1".to_string()))
        .unwrap();
    assert_eq!(first.annotation_id, "manual-1");

    let second = store
        .add_annotation("s1", &image.image_id, "v2.geojson", false, None, Some("manual-1".to_string()))
        .unwrap();
    assert_eq!(second.annotation_id, "manual-1");

    let annotations = store.get_annotations("s1", Some(&image.image_id));
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].file_path, "v2.geojson");
}

#[test]
fn test_get_annotations_image_filter() {
    let store = SessionStore::new();
    let image_a = store.add_image("s1", "a.png", "uploads/a.png", None, None);
    let image_b = store.add_image("s1", "b.png", "uploads/b.png", None, None);
    store
        .add_annotation("s1", &image_a.image_id, "a.geojson", true, Some("m1".to_string()), None)
        .unwrap();
    store
        .add_annotation("s1", &image_b.image_id, "b.geojson", false, None, None)
        .unwrap();

    assert_eq!(store.get_annotations("s1", None).len(), 2);
    let filtered = store.get_annotations("s1", Some(&image_b.image_id));
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].file_path, "b.geojson");
    assert!(store.get_annotations("unknown", None).is_empty());
}

#[test]
fn test_remove_annotation() {
    let store = SessionStore::new();
    let image = store.add_image("s1", "a.png", "uploads/a.png", None, None);
    let annotation = store
        .add_annotation("s1", &image.image_id, "a.geojson", true, None, None)
        .unwrap();

    assert!(store.remove_annotation("s1", &annotation.annotation_id));
    assert!(store.get_annotation("s1", &annotation.annotation_id).is_none());
    assert!(!store.remove_annotation("s1", &annotation.annotation_id));
}

#[test]
fn test_get_session_summary_counts() {
    let store = SessionStore::new();
    assert!(store.get_session("nope").is_none());

    let image = store.add_image("s1", "a.png", "uploads/a.png", None, None);
    store
        .add_annotation("s1", &image.image_id, "a.geojson", true, None, None)
        .unwrap();

    let summary = store.get_session("s1").unwrap();
    assert_eq!(summary.session_id, "s1");
    assert_eq!(summary.images_count, 1);
    assert_eq!(summary.annotations_count, 1);
}

#[test]
fn test_delete_session_cascades() {
    let store = SessionStore::new();
    let image = store.add_image("s1", "a.png", "uploads/a.png", None, None);
    store
        .add_annotation("s1", &image.image_id, "a.geojson", true, None, None)
        .unwrap();

    assert!(store.delete_session("s1"));
    assert!(!store.session_exists("s1"));
    assert!(store.get_images("s1", 0, 10).is_empty());
    assert!(!store.delete_session("s1"));
}

#[test]
fn test_export_import_round_trip() {
    let store = SessionStore::new();
    let image = store.add_image("s1", "a.png", "uploads/a.png", Some("1024x768".to_string()), None);
    store
        .add_annotation("s1", &image.image_id, "a.geojson", true, Some("m1".to_string()), None)
        .unwrap();

    let export = store.export_session("s1").unwrap();
    let json = serde_json::to_string(&export).unwrap();

    // Restore the dump into a fresh store under a new id
    let restored: terramark_storage::SessionExport = serde_json::from_str(&json).unwrap();
    let other = SessionStore::new();
    assert!(other.import_session("s2", restored));

    let images = other.get_images("s2", 0, 10);
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].image_id, image.image_id);
    assert_eq!(other.get_annotations("s2", Some(&image.image_id)).len(), 1);
}
