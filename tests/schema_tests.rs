//! Integration tests for loading declaration schemas
//!
//! Each test builds a hierarchy from JSON and checks what the loaded
//! declarations resolve to and how their members dispatch.

use reify::schema::{self, Schema, SchemaError};
use reify::{Receiver, ReifyError, ReifyOptions, TypeSystem, Value};

const REDIRECT_SCHEMA: &str = r#"{
  "declarations": [
    { "name": "Base", "params": [{ "name": "T" }],
      "members": [{ "name": "check", "kind": "alias_aware", "action": "receiver" }] },
    { "name": "Child", "params": [{ "name": "U" }],
      "bases": [{ "decl": "Base", "args": ["U"] }],
      "members": [
        { "name": "check", "kind": "alias_aware", "action": "redirect" },
        { "name": "base_args", "kind": "alias_aware", "action": "resolve", "ancestor": "Base" },
        { "name": "who", "kind": "plain", "action": "receiver" },
        { "name": "size", "kind": "attribute", "value": "int" }
      ] }
  ]
}"#;

fn load(sys: &TypeSystem, text: &str) -> schema::LoadedSchema {
    let parsed = Schema::from_json_str(text).expect("schema should parse");
    schema::load(sys, &parsed).expect("schema should load")
}

#[test]
fn test_loads_declarations_in_order() {
    let sys = TypeSystem::new();
    let loaded = load(&sys, REDIRECT_SCHEMA);
    let base = loaded.get("Base").unwrap();
    let child = loaded.get("Child").unwrap();
    assert_eq!(loaded.declarations(), &[base, child]);
    assert_eq!(&*sys.mro(child).unwrap(), &[child, base]);
    assert_eq!(sys.formatter().signature(child), "Child[U](Base[U])");
}

#[test]
fn test_redirect_action_sees_base_specialization() {
    let sys = TypeSystem::new();
    let loaded = load(&sys, REDIRECT_SCHEMA);
    let base = loaded.get("Base").unwrap();
    let child = loaded.get("Child").unwrap();
    let int = sys.intrinsic("int");

    let proxy = sys.apply(child, &[int.clone()]).unwrap().into_proxy().unwrap();
    assert_eq!(
        proxy.call("check", &[]).unwrap(),
        Value::applied(base, vec![int.clone()])
    );
    assert_eq!(
        proxy.call("base_args", &[]).unwrap(),
        Value::applied(base, vec![int])
    );
    assert_eq!(proxy.call("who", &[]).unwrap(), Value::Decl(child));
    assert_eq!(
        proxy.member("size").unwrap().value(),
        Some(&sys.intrinsic("int"))
    );
}

#[test]
fn test_defaults_bounds_and_nested_arguments() {
    let text = r#"{
      "declarations": [
        { "name": "List", "params": [{ "name": "E" }] },
        { "name": "Base", "params": [{ "name": "T", "default": "str", "bound": "object" }] },
        { "name": "Wrapper", "params": [{ "name": "X" }],
          "bases": [{ "decl": "Base", "args": [{ "decl": "List", "args": ["X"] }] }] },
        { "name": "Loose", "params": [{ "name": "Y" }],
          "bases": [{ "decl": "Base", "args": ["Y"] }] }
      ]
    }"#;
    let sys = TypeSystem::new();
    let loaded = load(&sys, text);
    let list = loaded.get("List").unwrap();
    let base = loaded.get("Base").unwrap();
    let wrapper = loaded.get("Wrapper").unwrap();
    let loose = loaded.get("Loose").unwrap();

    let spec = sys.specialize(wrapper, &[sys.intrinsic("int")]).unwrap();
    assert_eq!(
        sys.resolve(&Receiver::Specialization(spec), base)
            .unwrap()
            .as_ref(),
        &[Some(Value::applied(list, vec![sys.intrinsic("int")]))]
    );

    // A bare declaration with no default of its own stays unresolved.
    assert_eq!(
        sys.resolve(&Receiver::Declaration(loose), base)
            .unwrap()
            .as_ref(),
        &[None]
    );
    let bounded = TypeSystem::with_options(ReifyOptions::default().with_fallback_to_bound(true));
    let loaded = load(&bounded, text);
    assert_eq!(
        bounded
            .resolve(
                &Receiver::Declaration(loaded.get("Loose").unwrap()),
                loaded.get("Base").unwrap()
            )
            .unwrap()
            .as_ref(),
        &[Some(bounded.intrinsic("object"))]
    );
}

#[test]
fn test_parse_args_resolves_declarations() {
    let sys = TypeSystem::new();
    let loaded = load(&sys, REDIRECT_SCHEMA);
    let base = loaded.get("Base").unwrap();
    let values = loaded.parse_args(&sys, "int, Base[str], Base").unwrap();
    assert_eq!(
        values,
        vec![
            sys.intrinsic("int"),
            Value::applied(base, vec![sys.intrinsic("str")]),
            Value::Decl(base),
        ]
    );
}

#[test]
fn test_unknown_base_is_reported() {
    let sys = TypeSystem::new();
    let parsed = Schema::from_json_str(
        r#"{"declarations": [{ "name": "Child", "bases": [{ "decl": "Missing" }] }]}"#,
    )
    .unwrap();
    let err = schema::load(&sys, &parsed).unwrap_err();
    assert!(matches!(err, SchemaError::UnknownDeclaration { ref name } if name == "Missing"));
    assert_eq!(err.to_string(), "unknown declaration `Missing`");
}

#[test]
fn test_missing_member_fields_are_reported() {
    let sys = TypeSystem::new();
    for (member, field) in [
        (r#"{ "name": "m", "kind": "alias_aware" }"#, "action"),
        (r#"{ "name": "m", "kind": "attribute" }"#, "value"),
        (r#"{ "name": "m", "kind": "plain", "action": "resolve" }"#, "ancestor"),
    ] {
        let text = format!(
            r#"{{"declarations": [{{ "name": "A", "params": [{{ "name": "T" }}], "members": [{member}] }}]}}"#
        );
        let parsed = Schema::from_json_str(&text).unwrap();
        let err = schema::load(&sys, &parsed).unwrap_err();
        assert!(
            matches!(err, SchemaError::MissingField { field: f, .. } if f == field),
            "expected missing {field}, got {err}"
        );
    }
}

#[test]
fn test_invalid_declaration_is_wrapped() {
    let sys = TypeSystem::new();
    let parsed = Schema::from_json_str(
        r#"{"declarations": [{ "name": "Twice", "params": [{ "name": "T" }, { "name": "T" }] }]}"#,
    )
    .unwrap();
    let err = schema::load(&sys, &parsed).unwrap_err();
    assert!(matches!(
        err,
        SchemaError::Declaration {
            error: ReifyError::InvalidDeclaration { .. },
            ..
        }
    ));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_foreign_declarations_are_not_wrapped() {
    let sys = TypeSystem::new();
    let loaded = load(
        &sys,
        r#"{"declarations": [{ "name": "Model", "foreign": true, "params": [{ "name": "T" }],
             "members": [{ "name": "check", "kind": "alias_aware", "action": "receiver" }] }]}"#,
    );
    let model = loaded.get("Model").unwrap();
    assert!(sys.is_foreign(model));
    assert!(!sys.apply(model, &[sys.intrinsic("int")]).unwrap().is_proxy());
}
