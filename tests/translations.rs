mod support;

use docmap::{Document, DocumentsExt, MongoConfig, OdmError, Value};
use support::Post;

#[test]
fn translated_reads_fall_back_to_the_first_language() {
    let conn = support::connect();
    let repo = conn.documents::<Post>().unwrap();

    let mut post = Document::<Post>::new();
    post.set("id", 1);
    post.set("title", "Hello"); // stored under "en", the connection default
    repo.save(&mut post).unwrap();

    let mut reloaded = (*repo.get(1).unwrap().unwrap()).clone();
    reloaded.set_language("ja");
    // No "ja" entry yet: the "en" value is the fallback.
    assert_eq!(reloaded.get("title"), Some(Value::String("Hello".into())));

    // Writing a scalar under "ja" does not disturb the "en" entry.
    reloaded.set("title", "こんにちは");
    assert_eq!(reloaded.get("title"), Some(Value::String("こんにちは".into())));
    assert_eq!(
        reloaded.get_translation("title", Some("en")).unwrap(),
        Some(Value::String("Hello".into()))
    );
}

#[test]
fn translations_survive_a_save_reload_cycle() {
    let conn = support::connect();
    let repo = conn.documents::<Post>().unwrap();

    let mut post = Document::<Post>::new();
    post.set("id", 2);
    post.set("title", "Hello");
    post.set_translation("title", "Hallo", "nl").unwrap();
    repo.save(&mut post).unwrap();

    let reloaded = repo.get(2).unwrap().unwrap();
    let langs = reloaded.translations("title").unwrap().unwrap();
    assert_eq!(langs.get("en"), Some(&Value::String("Hello".into())));
    assert_eq!(langs.get("nl"), Some(&Value::String("Hallo".into())));
}

#[test]
fn documents_hydrate_with_the_connection_language() {
    let mut config = MongoConfig::with_database("app");
    config.language = "nl".to_string();
    let conn = support::connect_with_config(config);
    let repo = conn.documents::<Post>().unwrap();

    let mut post = Document::<Post>::new();
    post.set_language("nl");
    post.set("id", 3);
    post.set("title", "Hallo");
    repo.save(&mut post).unwrap();

    let reloaded = repo.get(3).unwrap().unwrap();
    assert_eq!(reloaded.language(), "nl");
    assert_eq!(reloaded.get("title"), Some(Value::String("Hallo".into())));
}

#[test]
fn translation_api_rejects_undeclared_fields() {
    let conn = support::connect();
    let _ = conn.documents::<Post>().unwrap();

    let mut post = Document::<Post>::new();
    let err = post.set_translation("status", "x", "en").unwrap_err();
    assert!(matches!(err, OdmError::NotTranslated { .. }));
    let err = post.translations("status").unwrap_err();
    assert!(matches!(err, OdmError::NotTranslated { .. }));
}
