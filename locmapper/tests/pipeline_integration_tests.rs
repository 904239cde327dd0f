//! End-to-end flows over real files: merge localization sources into a
//! table, attach mappings, round-trip the table through disk, merge again.

use std::fs;

use indoc::indoc;
use tempfile::TempDir;

use locmapper::{
    FileFormat, KeyMapping, LineKey, LineValue, LocFile, MergeStyle, ValueTransformer,
    transformers::{Gender, gender_variant_pick},
};

fn write_fixture(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_merge_two_languages_then_resolve() {
    let dir = TempDir::new().unwrap();
    let english = write_fixture(
        &dir,
        "en.lproj/Localizable.strings",
        indoc! {r#"
            /* Shown on the landing screen */
            "welcome" = "Welcome!";
            "farewell" = "Goodbye";
        "#},
    );
    let french = write_fixture(
        &dir,
        "fr.lproj/Localizable.strings",
        indoc! {r#"
            "welcome" = "Bienvenue !";
            "farewell" = "Au revoir";
        "#},
    );

    let mut table = LocFile::new();
    let report = table.merge_xcode_strings_files(
        "Xcode",
        &[
            (english, "English".to_string()),
            (french, "French".to_string()),
        ],
        MergeStyle::Replace,
    );
    assert!(report.skipped_files.is_empty());
    assert!(report.duplicates.is_empty());

    // the per-language copies feed the same entry, keyed by file name
    assert_eq!(table.len(), 2);
    let key = LineKey::new("welcome", "Xcode", "Localizable.strings");
    assert_eq!(table.resolve(&key, "English").unwrap(), "Welcome!");
    assert_eq!(table.resolve(&key, "French").unwrap(), "Bienvenue !");
    assert_eq!(table.find_key(&key).unwrap().comment, "Shown on the landing screen");
    assert_eq!(table.languages(), ["English", "French"]);
}

#[test]
fn test_same_origin_merge_unions_languages() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "Localizable.strings", r#""hello" = "Hello";"#);
    let origin = "Localizable.strings";

    let mut table = LocFile::new();
    table.merge_xcode_strings_files(
        "Xcode",
        &[(path.clone(), "English".to_string())],
        MergeStyle::Replace,
    );
    fs::write(&path, r#""hello" = "Hallo";"#).unwrap();
    table.merge_xcode_strings_files("Xcode", &[(path, "German".to_string())], MergeStyle::Replace);

    let key = LineKey::new("hello", "Xcode", origin);
    assert_eq!(table.resolve(&key, "English").unwrap(), "Hello");
    assert_eq!(table.resolve(&key, "German").unwrap(), "Hallo");
    assert_eq!(table.len(), 1);
}

#[test]
fn test_mapping_survives_disk_roundtrip_and_reimport() {
    let dir = TempDir::new().unwrap();
    let source = write_fixture(
        &dir,
        "app.strings",
        indoc! {r#"
            "greeting" = "hi `sir¦madam´ friend";
        "#},
    );
    let origin = "app.strings";

    let mut table = LocFile::new();
    table.merge_xcode_strings_files(
        "Xcode",
        &[(source.clone(), "English".to_string())],
        MergeStyle::Replace,
    );

    // derived key: pick the non-male gender variant, then upper-case
    let derived = LineKey::new("greeting_loud", "Xcode", origin);
    table.set_value(
        derived.clone(),
        LineValue::Mapping(KeyMapping::transforms(
            LineKey::new("greeting", "Xcode", origin),
            vec![gender_variant_pick(Gender::Other), ValueTransformer::ToUpper],
        )),
    );
    assert_eq!(table.resolve(&derived, "English").unwrap(), "HI MADAM FRIEND");

    let loc_path = dir.path().join("Loc.csv");
    table.write_to(&loc_path).unwrap();
    let mut reloaded = LocFile::read_from(&loc_path).unwrap();
    assert_eq!(reloaded.resolve(&derived, "English").unwrap(), "HI MADAM FRIEND");

    // a re-import with a changed source value flows through the mapping
    fs::write(&source, "\"greeting\" = \"bye `pal¦gal´ now\";").unwrap();
    reloaded.merge_xcode_strings_files(
        "Xcode",
        &[(source, "English".to_string())],
        MergeStyle::Replace,
    );
    assert_eq!(reloaded.resolve(&derived, "English").unwrap(), "BYE GAL NOW");
}

#[test]
fn test_android_sources_merge_with_attributes() {
    let dir = TempDir::new().unwrap();
    let xml = write_fixture(
        &dir,
        "strings.xml",
        indoc! {r#"
            <?xml version="1.0" encoding="utf-8"?>
            <resources>
                <string name="app_name" translatable="false">LocMapper</string>
                <string name="greeting">Hello</string>
                <plurals name="apples">
                    <item quantity="one">an apple</item>
                    <item quantity="other">%d apples</item>
                </plurals>
            </resources>
        "#},
    );
    let origin = "strings.xml";

    let mut table = LocFile::new();
    let report = table.merge_android_strings_files(
        "Android",
        &[(xml, "English".to_string())],
        MergeStyle::Replace,
    );
    assert!(report.skipped_files.is_empty());
    assert_eq!(table.len(), 4);

    let plural_one = LineKey::new("apples:one", "Android", origin);
    assert_eq!(table.resolve(&plural_one, "English").unwrap(), "an apple");
    assert_eq!(
        table.find_key(&plural_one).unwrap().attributes.get("quantity").unwrap(),
        "one"
    );

    let app_name = LineKey::new("app_name", "Android", origin);
    assert_eq!(
        table.find_key(&app_name).unwrap().attributes.get("translatable").unwrap(),
        "false"
    );
}

#[test]
fn test_unparsable_file_is_skipped_not_fatal() {
    let dir = TempDir::new().unwrap();
    let good = write_fixture(&dir, "good.strings", r#""a" = "1";"#);
    let bad = write_fixture(&dir, "bad.strings", r#""a" = ;"#);

    let mut table = LocFile::new();
    let report = table.merge_xcode_strings_files(
        "Xcode",
        &[
            (good, "English".to_string()),
            (bad, "English".to_string()),
        ],
        MergeStyle::Replace,
    );
    assert_eq!(report.skipped_files.len(), 1);
    assert_eq!(table.len(), 1);
    let key = LineKey::new("a", "Xcode", "good.strings");
    assert_eq!(table.resolve(&key, "English").unwrap(), "1");
}
