//! Tests for type loading, typedef resolution and size closure

use memtype_core::catalog::{ArchitectureProfile, ProfileTag, TypeCatalog, TypeDescriptor, PRIMITIVE_NAMES};
use memtype_core::MemtypeError;

const DATABASE: &str = r#"{
    "u8":     { "flags": ["unsigned"], "size": 1 },
    "u32le":  { "flags": ["unsigned"], "size": 4 },
    "u64le":  { "flags": ["unsigned"], "size": 8 },
    "S":      { "flags": ["struct"], "members": [["a", "u32le"], ["b", "u8"]] },
    "U":      { "flags": ["union"], "members": [["a", "u8"], ["b", "u32le"], ["c", "u64le"]] },
    "Node":   { "flags": ["struct"], "members": [["value", "u32le"], ["next", "PNode"]] },
    "PNode":  { "flags": ["pointer"], "ref": "Node" },
    "Words":  { "flags": ["array"], "element": "u32le", "length": 6 },
    "Color":  { "flags": ["enum"], "size": 1 },
    "Handle": { "flags": ["typedef", "pointer"], "typedef": "PNode" },
    "Empty":  { "flags": ["struct"], "members": [] },
    "PChar":  { "flags": ["pointer"], "ref": "cstring" },
    "PPChar": { "flags": ["pointer"], "ref": "PChar" },
    "Opaque": { "flags": ["pointer"], "ref": "" },
    "PEmpty": { "flags": ["pointer"], "ref": "Empty" }
}"#;

fn catalog(tag: &str) -> TypeCatalog
{
    let mut catalog = TypeCatalog::with_profile(tag.parse().unwrap());
    catalog.load_json(DATABASE).unwrap();
    catalog
}

#[test]
fn test_primitive_sizes_are_stable()
{
    for tag in ProfileTag::ALL {
        let catalog = catalog(tag.as_str());
        for name in PRIMITIVE_NAMES {
            let first = catalog.resolve_size(name).unwrap();
            for _ in 0..3 {
                assert_eq!(catalog.resolve_size(name).unwrap(), first, "{tag} {name}");
            }
        }
    }
}

#[test]
fn test_struct_has_no_padding_under_every_profile()
{
    for tag in ProfileTag::ALL {
        assert_eq!(catalog(tag.as_str()).resolve_size("S").unwrap(), 5, "{tag}");
    }
}

#[test]
fn test_union_is_largest_member()
{
    assert_eq!(catalog("64le").resolve_size("U").unwrap(), 8);
}

#[test]
fn test_profile_switch_recomputes_sizes()
{
    let mut catalog = catalog("64le");
    assert_eq!(catalog.resolve_size("pointer").unwrap(), 8);
    assert_eq!(catalog.resolve_size("Node").unwrap(), 12);

    catalog.set_profile_tag("32be").unwrap();
    assert_eq!(catalog.resolve_size("pointer").unwrap(), 4);
    assert_eq!(catalog.resolve_size("Node").unwrap(), 8);
    assert_eq!(catalog.resolve_size("size_t").unwrap(), 4);
    assert_eq!(catalog.resolve_size("long").unwrap(), 8);
}

#[test]
fn test_unknown_profile_is_rejected()
{
    let mut catalog = catalog("64le");
    let err = catalog.set_profile_tag("16le").unwrap_err();
    assert!(matches!(err, MemtypeError::UnknownProfile(tag) if tag == "16le"));
    assert_eq!(catalog.profile().tag, ProfileTag::Le64);
}

#[test]
fn test_array_enum_and_typedef_sizes()
{
    let catalog = catalog("32le");
    assert_eq!(catalog.resolve_size("Words").unwrap(), 24);
    assert_eq!(catalog.resolve_size("Color").unwrap(), 4);
    assert_eq!(catalog.resolve_size("Handle").unwrap(), 4);
}

#[test]
fn test_zero_sized_struct_occupies_one_byte()
{
    assert_eq!(catalog("64le").resolve_size("Empty").unwrap(), 1);
}

#[test]
fn test_typedef_chain_resolves_to_first_non_typedef()
{
    let catalog = catalog("64le");
    let (name, descriptor) = catalog.resolve("Handle").unwrap();
    assert_eq!(name, "PNode");
    assert_eq!(descriptor, &TypeDescriptor::Pointer {
        pointee: Some("Node".to_string()),
    });
}

#[test]
fn test_unknown_type_fails()
{
    let mut catalog = catalog("64le");
    assert!(matches!(catalog.resolve_size("Missing"), Err(MemtypeError::UnknownType(name)) if name == "Missing"));

    catalog
        .load_json(r#"{"Broken": {"flags": ["struct"], "members": [["x", "Nope"]]}}"#)
        .unwrap();
    assert!(matches!(catalog.resolve_size("Broken"), Err(MemtypeError::UnknownType(name)) if name == "Nope"));
}

#[test]
fn test_value_cycles_are_rejected()
{
    let mut catalog = catalog("64le");
    catalog
        .load_json(
            r#"{
            "Outer": { "flags": ["struct"], "members": [["inner", "Inner"]] },
            "Inner": { "flags": ["struct"], "members": [["again", "OuterArray"]] },
            "OuterArray": { "flags": ["array"], "element": "Outer", "length": 2 },
            "Loop1": { "flags": ["typedef"], "typedef": "Loop2" },
            "Loop2": { "flags": ["typedef"], "typedef": "Loop1" }
        }"#,
        )
        .unwrap();
    assert!(matches!(catalog.resolve_size("Outer"), Err(MemtypeError::CyclicType(_))));
    assert!(matches!(catalog.resolve_size("Loop1"), Err(MemtypeError::CyclicType(_))));
    assert!(matches!(catalog.resolve("Loop1"), Err(MemtypeError::CyclicType(_))));
}

#[test]
fn test_profile_primitives_override_database_entries()
{
    let mut catalog = catalog("64le");
    catalog
        .load_json(r#"{"int": {"flags": ["unsigned"], "size": 2}, "cstring": {"flags": ["unsigned"], "size": 9}}"#)
        .unwrap();
    assert_eq!(catalog.resolve_size("int").unwrap(), 4);
    assert_eq!(catalog.get("cstring").unwrap(), &TypeDescriptor::CString);
}

#[test]
fn test_later_entries_overwrite_earlier()
{
    let mut catalog = catalog("64le");
    catalog
        .load_json(r#"{"S": {"flags": ["struct"], "members": [["only", "u8"]]}}"#)
        .unwrap();
    assert_eq!(catalog.resolve_size("S").unwrap(), 1);
}

#[test]
fn test_followable_pointers()
{
    let catalog = catalog("64le");
    assert!(catalog.is_followable("PNode").unwrap());
    assert!(catalog.is_followable("Handle").unwrap());
    assert!(catalog.is_followable("PChar").unwrap());
    assert!(catalog.is_followable("PPChar").unwrap());
    assert!(catalog.is_followable("PEmpty").unwrap());
    assert!(!catalog.is_followable("Opaque").unwrap());
    assert!(!catalog.is_followable("pointer").unwrap());
    assert!(!catalog.is_followable("S").unwrap());
    assert_eq!(catalog.underlying_size("PPChar").unwrap(), Some(0));
    assert_eq!(catalog.underlying_size("Handle").unwrap(), Some(12));
    assert_eq!(catalog.underlying_size("Opaque").unwrap(), None);
}

#[test]
fn test_malformed_database_fails_load()
{
    let mut catalog = TypeCatalog::new();
    let err = catalog
        .load_json(r#"{"Half": {"flags": ["array"], "element": "u8"}}"#)
        .unwrap_err();
    assert!(matches!(err, MemtypeError::MalformedInput(msg) if msg.contains("Half")));
    assert!(matches!(catalog.load_json("[1, 2]"), Err(MemtypeError::Json(_))));
    assert!(!catalog.contains("Half"));
}

#[test]
fn test_load_file()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("types.json");
    std::fs::write(&path, DATABASE).unwrap();

    let mut catalog = TypeCatalog::with_profile(ArchitectureProfile::from_tag(ProfileTag::Le32));
    assert_eq!(catalog.load_file(&path).unwrap(), 15);
    assert_eq!(catalog.resolve_size("Node").unwrap(), 8);
    assert!(matches!(
        catalog.load_file(dir.path().join("missing.json")),
        Err(MemtypeError::Io(_))
    ));
}
