use std::collections::BTreeMap;

use locmapper::formats::strings::{
    escape_plist_string, parse, serialize, unescape_plist_string,
};
use locmapper::{FileFormat, StringsFile};
use proptest::prelude::*;

fn key_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z][a-z0-9_./:-]{0,15}").expect("valid key regex")
}

fn value_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z0-9 _\\-\\.,!\\?]{1,30}").expect("valid value regex")
}

proptest! {
    #[test]
    fn parser_never_panics(input in any::<String>()) {
        let _ = parse(&input);
    }

    #[test]
    fn accepted_input_serializes_back_identically(input in any::<String>()) {
        if let Ok(components) = parse(&input) {
            prop_assert_eq!(serialize(&components), input);
        }
    }

    #[test]
    fn escape_then_unescape_is_identity(value in "[ -~\t\n]{0,40}") {
        prop_assert_eq!(unescape_plist_string(&escape_plist_string(&value)), value);
    }

    #[test]
    fn generated_entries_parse_back(
        entries in prop::collection::btree_map(key_strategy(), value_strategy(), 1..8)
    ) {
        let mut source = String::new();
        for (key, value) in &entries {
            source.push_str(&format!(
                "\"{}\" = \"{}\";\n",
                escape_plist_string(key),
                escape_plist_string(value)
            ));
        }
        let file = StringsFile::from_str(&source).unwrap();
        let parsed: BTreeMap<String, String> = file.entries().collect();
        prop_assert_eq!(parsed, entries);
        prop_assert_eq!(file.to_string_lossy().unwrap(), source);
    }
}
