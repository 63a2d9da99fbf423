//! Records and the field extractor.
//!
//! A [`Record`] is a struct with a table name and a static, declaration-ordered
//! table of [`FieldDescriptor`]s. Each descriptor carries the raw tags of the
//! field (one per namespace) and an accessor. The table is normally generated by
//! `#[derive(Record)]`:
//!
//! ```ignore
//! use tagsql::Record;
//! use tagsql::types::NullString;
//!
//! #[derive(Record)]
//! #[record(table = "ref_game")]
//! struct Game {
//!     #[tag(sql = "game_id", json = "game_id")]
//!     id: i64,
//!     #[tag(sql = "game_title")]
//!     title: String,
//!     #[tag(sql = "game_description")]
//!     description: NullString,
//!     #[tag(sql = "enabled")]
//!     enabled: bool,
//! }
//! ```
//!
//! [`extract`] flattens a record into the non-zero, tagged fields of one
//! namespace.

use crate::value::{ToValue, Value};

/// Compile-time description of one struct field.
pub struct FieldDescriptor<R> {
    /// Rust field name.
    pub ident: &'static str,
    /// `(namespace, raw tag)` pairs, e.g. `("sql", "game_id,omitempty")`.
    pub tags: &'static [(&'static str, &'static str)],
    /// Field accessor.
    pub get: fn(&R) -> &dyn ToValue,
}

impl<R> FieldDescriptor<R> {
    /// Raw tag for `namespace`, if the field carries one.
    pub fn tag(&self, namespace: &str) -> Option<&'static str> {
        self.tags
            .iter()
            .find(|(ns, _)| *ns == namespace)
            .map(|(_, tag)| *tag)
    }
}

impl<R> std::fmt::Debug for FieldDescriptor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("ident", &self.ident)
            .field("tags", &self.tags)
            .finish()
    }
}

/// A struct the statement builder can operate on.
pub trait Record: Sized + 'static {
    /// Table name, e.g. `ref_game`.
    const TABLE: &'static str;

    /// Field table in declaration order.
    fn fields() -> &'static [FieldDescriptor<Self>];
}

/// Options following the name in a tag (`name,opt1,opt2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TagOptions<'a>(&'a str);

impl<'a> TagOptions<'a> {
    /// Whether `option` is present. Matching is exact; the empty option never matches.
    pub fn contains(&self, option: &str) -> bool {
        !option.is_empty() && self.iter().any(|o| o == option)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> + use<'a> {
        let raw = self.0;
        raw.split(',').filter(|o| !o.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &'a str {
        self.0
    }
}

/// Split a tag into its name and options.
pub fn parse_tag(tag: &str) -> (&str, TagOptions<'_>) {
    match tag.split_once(',') {
        Some((name, options)) => (name, TagOptions(options)),
        None => (tag, TagOptions("")),
    }
}

/// Whether `name` is usable as a field name.
///
/// Letters and the digits `0-9` are allowed, as is punctuation from
/// ``!#$%&()*+-./:<=>?@[]^_{|}~`` and space. Backslash and quotes are reserved.
pub fn is_valid_tag(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    name.chars().all(|c| {
        "!#$%&()*+-./:<=>?@[]^_{|}~ ".contains(c)
            || c.is_ascii_digit()
            || (c.is_alphabetic() && !c.is_numeric())
    })
}

/// One extracted field.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedField {
    pub name: &'static str,
    pub value: Value,
    pub options: TagOptions<'static>,
}

impl ExtractedField {
    /// String encoding of the value.
    pub fn encoded(&self) -> String {
        self.value.encode()
    }
}

/// The tagged, non-zero fields of a record, in declaration order.
///
/// Fields are grouped by name: when two fields share a tag name the first one
/// wins.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    fields: Vec<ExtractedField>,
}

impl Extracted {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ExtractedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExtractedField> {
        self.fields.iter()
    }

    /// Field names in declaration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Fields ordered by name (byte-wise), the order statements use.
    pub fn sorted(&self) -> Vec<&ExtractedField> {
        let mut sorted: Vec<_> = self.fields.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(b.name));
        sorted
    }
}

impl IntoIterator for Extracted {
    type Item = ExtractedField;
    type IntoIter = std::vec::IntoIter<ExtractedField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Extract the fields of `record` tagged under `namespace`.
///
/// Untagged fields, fields whose tag name fails [`is_valid_tag`], and zero
/// fields (see [`ToValue::is_zero`]) are skipped.
pub fn extract<R: Record>(namespace: &str, record: &R) -> Extracted {
    let descriptors = R::fields();
    let mut fields: Vec<ExtractedField> = Vec::with_capacity(descriptors.len());

    for desc in descriptors {
        let Some(tag) = desc.tag(namespace) else {
            continue;
        };
        let (name, options) = parse_tag(tag);
        if !is_valid_tag(name) {
            continue;
        }
        let field = (desc.get)(record);
        if field.is_zero() {
            continue;
        }
        if fields.iter().any(|f| f.name == name) {
            continue;
        }
        fields.push(ExtractedField {
            name,
            value: field.to_value(),
            options,
        });
    }

    Extracted { fields }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NullInt64, NullString};

    struct Game {
        id: i64,
        code: String,
        title: String,
        description: NullString,
        enabled: bool,
        rate: NullInt64,
        created_by: String,
    }

    fn game_id(g: &Game) -> &dyn ToValue {
        &g.id
    }
    fn game_code(g: &Game) -> &dyn ToValue {
        &g.code
    }
    fn game_title(g: &Game) -> &dyn ToValue {
        &g.title
    }
    fn game_description(g: &Game) -> &dyn ToValue {
        &g.description
    }
    fn game_enabled(g: &Game) -> &dyn ToValue {
        &g.enabled
    }
    fn game_rate(g: &Game) -> &dyn ToValue {
        &g.rate
    }
    fn game_created_by(g: &Game) -> &dyn ToValue {
        &g.created_by
    }

    static GAME_FIELDS: [FieldDescriptor<Game>; 7] = [
        FieldDescriptor {
            ident: "id",
            tags: &[("json", "game_id"), ("sql", "game_id")],
            get: game_id,
        },
        FieldDescriptor {
            ident: "code",
            tags: &[("sql", "game_code,omitempty")],
            get: game_code,
        },
        FieldDescriptor {
            ident: "title",
            tags: &[("sql", "game_title")],
            get: game_title,
        },
        FieldDescriptor {
            ident: "description",
            tags: &[("sql", "game_description")],
            get: game_description,
        },
        FieldDescriptor {
            ident: "enabled",
            tags: &[("sql", "enabled")],
            get: game_enabled,
        },
        FieldDescriptor {
            ident: "rate",
            tags: &[("sql", "rate")],
            get: game_rate,
        },
        FieldDescriptor {
            ident: "created_by",
            tags: &[("json", "created_by,omitempty")],
            get: game_created_by,
        },
    ];

    impl Record for Game {
        const TABLE: &'static str = "ref_game";

        fn fields() -> &'static [FieldDescriptor<Self>] {
            &GAME_FIELDS
        }
    }

    fn game() -> Game {
        Game {
            id: 507,
            code: String::new(),
            title: "DOTA2".to_string(),
            description: NullString::null(),
            enabled: true,
            rate: NullInt64::new(0),
            created_by: "budi".to_string(),
        }
    }

    #[test]
    fn parse_tag_splits_name_and_options() {
        let (name, opts) = parse_tag("game_code,omitempty,string");
        assert_eq!(name, "game_code");
        assert!(opts.contains("omitempty"));
        assert!(opts.contains("string"));
        assert!(!opts.contains("omit"));
        assert!(!opts.contains(""));

        let (name, opts) = parse_tag("game_id");
        assert_eq!(name, "game_id");
        assert!(opts.is_empty());
    }

    #[test]
    fn tag_name_validation() {
        assert!(is_valid_tag("game_id"));
        assert!(is_valid_tag("a-b.c:d"));
        assert!(is_valid_tag("näme1"));
        assert!(!is_valid_tag(""));
        assert!(!is_valid_tag("bad\\name"));
        assert!(!is_valid_tag("bad\"name"));
        assert!(!is_valid_tag("bad'name"));
    }

    #[test]
    fn tag_name_digits_are_decimal_only() {
        assert!(is_valid_tag("game_id2"));
        assert!(!is_valid_tag("price½"));
        assert!(!is_valid_tag("act_Ⅻ"));
        assert!(!is_valid_tag("x²"));
    }

    #[test]
    fn extract_skips_zero_and_untagged_fields() {
        let fields = extract("sql", &game());
        // code is empty, description is invalid, created_by has no sql tag
        assert_eq!(fields.names(), vec!["game_id", "game_title", "enabled", "rate"]);
        assert_eq!(fields.get("game_id").unwrap().encoded(), "507");
        assert_eq!(fields.get("enabled").unwrap().encoded(), "true");
        // a valid nullable is kept even when its payload is zero
        assert_eq!(fields.get("rate").unwrap().value, Value::Int(0));
    }

    #[test]
    fn extract_uses_requested_namespace() {
        let fields = extract("json", &game());
        assert_eq!(fields.names(), vec!["game_id", "created_by"]);
        assert!(fields.get("created_by").unwrap().options.contains("omitempty"));
    }

    #[test]
    fn sorted_orders_by_name() {
        let fields = extract("sql", &game());
        let names: Vec<_> = fields.sorted().iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["enabled", "game_id", "game_title", "rate"]);
    }

    #[test]
    fn unknown_namespace_extracts_nothing() {
        assert!(extract("db", &game()).is_empty());
    }
}
