use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use graphql_jit::CompiledQuery;
use graphql_jit::Compiler;
use graphql_jit::Configuration;
use graphql_jit::Context;
use graphql_jit::FieldError;
use graphql_jit::Resolvers;
use graphql_jit::Response;
use graphql_jit::TypeMap;
use graphql_jit::graphql::Location;
use graphql_jit::json_ext::Object;
use graphql_jit::json_ext::Path;
use graphql_jit::json_ext::Value;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;
use test_log::test;

fn compile(sdl: &str, resolvers: Resolvers, query: &str) -> Arc<CompiledQuery> {
    let type_map = TypeMap::parse(sdl, resolvers).unwrap();
    let compiler = Compiler::new(Arc::new(type_map), Configuration::default());
    compiler
        .compile(query, None)
        .unwrap()
        .compiled()
        .cloned()
        .unwrap()
}

fn run(query: &CompiledQuery, root: Value, variables: Value) -> Response {
    let variables: Object = variables.as_object().cloned().unwrap_or_default();
    query.execute_sync(&root, &variables, &Context::new())
}

fn messages(response: &Response) -> Vec<&str> {
    response
        .errors
        .iter()
        .map(|error| error.message.as_str())
        .collect()
}

#[test]
fn resolver_error_nulls_nearest_nullable_ancestor() {
    let query = compile(
        "type Query { user: User } type User { name: String! }",
        Resolvers::new().field("User", "name", |_| Err(FieldError::new("boom"))),
        "{ user { name } }",
    );
    let response = run(&query, json!({"user": {}}), json!({}));

    assert_eq!(response.data, Some(json!({"user": null})));
    assert_eq!(response.errors.len(), 1);
    let error = &response.errors[0];
    assert_eq!(error.message, "boom");
    assert_eq!(error.path, Some(Path::from("user/name")));
    assert_eq!(error.locations, vec![Location { line: 1, column: 10 }]);
}

#[test]
fn null_propagation_reaches_the_root() {
    let query = compile(
        "type Query { user: User! other: String } type User { name: String! }",
        Resolvers::new().field("User", "name", |_| Err(FieldError::new("boom"))),
        "{ other user { name } }",
    );
    let response = run(&query, json!({"user": {}, "other": "kept?"}), json!({}));

    assert_eq!(response.data, Some(Value::Null));
    assert_eq!(messages(&response), vec!["boom"]);
}

#[test]
fn null_for_non_null_field_is_an_error() {
    let query = compile(
        "type Query { user: User } type User { id: ID! name: String }",
        Resolvers::new(),
        "{ user { id name } }",
    );
    let response = run(&query, json!({"user": {"name": "Ada"}}), json!({}));

    assert_eq!(response.data, Some(json!({"user": null})));
    assert_eq!(
        messages(&response),
        vec!["Cannot return null for non-nullable field User.id."]
    );
    assert_eq!(response.errors[0].path, Some(Path::from("user/id")));
}

#[test]
fn resolver_error_extensions_are_reported() {
    let query = compile(
        "type Query { secret: String public: String }",
        Resolvers::new().field("Query", "secret", |_| {
            Err(FieldError::new("forbidden").with_extension("code", "FORBIDDEN"))
        }),
        "{ secret public }",
    );
    let response = run(&query, json!({"public": "hello"}), json!({}));

    assert_eq!(
        response.data,
        Some(json!({"secret": null, "public": "hello"}))
    );
    assert_eq!(response.errors[0].extension_code().as_deref(), Some("FORBIDDEN"));
}

#[test]
fn list_items() {
    let sdl = "type Query { strict: [String!] loose: [String] notAList: [Int] }";
    let query = compile(sdl, Resolvers::new(), "{ strict loose notAList }");
    let response = run(
        &query,
        json!({
            "strict": ["a", null],
            "loose": ["a", 5, true, {"x": 1}],
            "notAList": "nope",
        }),
        json!({}),
    );

    assert_eq!(
        response.data,
        Some(json!({
            "strict": null,
            "loose": ["a", "5", "true", null],
            "notAList": null,
        }))
    );
    assert_eq!(
        messages(&response),
        vec![
            "Cannot return null for non-nullable field Query.strict.",
            "String cannot represent value: {\"x\":1}",
            "Expected Iterable, but did not find one for field \"Query.notAList\".",
        ]
    );
    assert_eq!(response.errors[0].path, Some(Path::from("strict/1")));
    assert_eq!(response.errors[1].path, Some(Path::from("loose/3")));
}

#[test]
fn leaf_values() {
    let sdl = r#"
        scalar Date
        enum Role { ADMIN USER }
        type Query { count: Int big: Int ratio: Float id: ID role: Role badRole: Role date: Date flag: Boolean }
    "#;
    let resolvers = Resolvers::new().scalar("Date", |value| {
        value
            .as_i64()
            .map(|day| Value::from(format!("day {day}")))
            .ok_or_else(|| FieldError::new("Date cannot represent value"))
    });
    let query = compile(sdl, resolvers, "{ count big ratio id role badRole date flag }");
    let response = run(
        &query,
        json!({
            "count": 3.0,
            "big": 3_000_000_000i64,
            "ratio": 2,
            "id": 42,
            "role": "ADMIN",
            "badRole": "ROOT",
            "date": 12,
            "flag": true,
        }),
        json!({}),
    );

    assert_eq!(
        response.data,
        Some(json!({
            "count": 3,
            "big": null,
            "ratio": 2,
            "id": "42",
            "role": "ADMIN",
            "badRole": null,
            "date": "day 12",
            "flag": true,
        }))
    );
    assert_eq!(
        messages(&response),
        vec![
            "Int cannot represent non 32-bit signed integer value: 3000000000",
            "Enum \"Role\" cannot represent value: \"ROOT\"",
        ]
    );
}

#[test]
fn skip_and_include() {
    let query = compile(
        "type Query { field: String other: String }",
        Resolvers::new(),
        "query($b: Boolean!) { field @skip(if: $b) other @include(if: true) }",
    );
    let root = json!({"field": "f", "other": "o"});

    let skipped = run(&query, root.clone(), json!({"b": true}));
    assert_eq!(skipped.data, Some(json!({"other": "o"})));

    let included = run(&query, root, json!({"b": false}));
    assert_eq!(included.data, Some(json!({"field": "f", "other": "o"})));
}

#[test]
fn literal_directives_are_applied_at_compile_time() {
    let query = compile(
        "type Query { field: String other: String }",
        Resolvers::new().field("Query", "field", |_| panic!("skipped field resolved")),
        "{ field @include(if: false) other @skip(if: false) }",
    );
    let response = run(&query, json!({"other": "o"}), json!({}));
    assert_eq!(response.data, Some(json!({"other": "o"})));
}

#[test]
fn union_dispatch_selects_the_runtime_type() {
    let sdl = r#"
        type Query { search: [SearchResult] }
        union SearchResult = Book | Author
        type Book { title: String }
        type Author { name: String }
    "#;
    let query = compile(
        sdl,
        Resolvers::new(),
        "{ search { __typename ... on Book { title } ... on Author { name } } }",
    );
    let response = run(
        &query,
        json!({"search": [
            {"__typename": "Book", "title": "Dune", "name": "not selected"},
            {"__typename": "Author", "name": "Herbert", "title": "not selected"},
            {"__typename": "Magazine"},
            {"title": "untyped"},
        ]}),
        json!({}),
    );

    assert_eq!(
        response.data,
        Some(json!({"search": [
            {"__typename": "Book", "title": "Dune"},
            {"__typename": "Author", "name": "Herbert"},
            null,
            null,
        ]}))
    );
    assert_eq!(
        messages(&response),
        vec![
            "Abstract type \"SearchResult\" was resolved to a type \"Magazine\" that does not exist inside the schema.",
            "Abstract type \"SearchResult\" must resolve to an Object type at runtime for field \"Query.search\". \
             Either the \"SearchResult\" type should provide a \"resolveType\" function or each possible type should provide an \"isTypeOf\" function.",
        ]
    );
    assert_eq!(response.errors[0].path, Some(Path::from("search/2")));
}

#[test]
fn interface_dispatch_with_type_resolver() {
    let sdl = r#"
        type Query { nodes: [Node!]! }
        interface Node { id: ID! }
        type User implements Node { id: ID! name: String }
        type Post implements Node { id: ID! title: String }
        type Other { id: ID! }
    "#;
    let resolvers = Resolvers::new().type_resolver("Node", |value, _context| {
        let id = value.as_object()?.get("id")?.as_str()?;
        Some(
            match id.split(':').next()? {
                "u" => "User",
                "p" => "Post",
                _ => "Other",
            }
            .to_string(),
        )
    });
    let query = compile(
        sdl,
        resolvers,
        "{ nodes { id ... on User { name } ... on Post { title } } }",
    );

    let response = run(
        &query,
        json!({"nodes": [
            {"id": "u:1", "name": "Ada", "title": "ignored"},
            {"id": "p:1", "title": "Notes"},
        ]}),
        json!({}),
    );
    assert_eq!(
        response.data,
        Some(json!({"nodes": [
            {"id": "u:1", "name": "Ada"},
            {"id": "p:1", "title": "Notes"},
        ]}))
    );

    let response = run(&query, json!({"nodes": [{"id": "o:1"}]}), json!({}));
    assert_eq!(response.data, Some(Value::Null));
    assert_eq!(
        messages(&response),
        vec!["Runtime Object type \"Other\" is not a possible type for \"Node\"."]
    );
}

#[test]
fn aliases_that_collide_after_sanitizing_keep_separate_slots() {
    let query = compile(
        "type Query { field(suffix: String = \"\"): String }",
        Resolvers::new().field("Query", "field", |info| {
            let suffix = info.argument("suffix").and_then(|v| v.as_str()).unwrap_or("");
            Ok(Value::from(format!("value{suffix}")))
        }),
        r#"{ a: field aField: field(suffix: "-1") a_field: field(suffix: "-2") field }"#,
    );
    let response = run(&query, json!({}), json!({}));
    assert_eq!(
        serde_json::to_string(&response.data).unwrap(),
        r#"{"a":"value","aField":"value-1","a_field":"value-2","field":"value"}"#
    );
}

#[test]
fn fields_are_merged_across_fragments() {
    let sdl = r#"
        type Query { user: User }
        type User { id: ID! name: String friends: [User] }
    "#;
    let query = compile(
        sdl,
        Resolvers::new(),
        r#"
        query {
            user { id }
            ...UserFields
            user { friends { name } }
        }
        fragment UserFields on Query {
            user { name friends { id } }
        }
        "#,
    );
    let response = run(
        &query,
        json!({"user": {"id": 1, "name": "Ada", "friends": [{"id": 2, "name": "Bob"}]}}),
        json!({}),
    );
    assert_eq!(
        serde_json::to_string(&response.data).unwrap(),
        r#"{"user":{"id":"1","name":"Ada","friends":[{"id":"2","name":"Bob"}]}}"#
    );
}

#[test]
fn repeated_selections_resolve_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let resolvers = Resolvers::new()
        .field("Query", "hello", {
            let calls = calls.clone();
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!("world"))
            }
        })
        .field("Query", "user", |_| Ok(json!({"id": 1, "name": "Ada"})));
    let query = compile(
        "type Query { hello: String user: User } type User { id: ID! name: String }",
        resolvers,
        "{ hello hello ... on Query { hello user { id } } greeting: hello user { name } }",
    );
    let response = run(&query, json!({}), json!({}));

    assert_eq!(
        serde_json::to_string(&response.data).unwrap(),
        r#"{"hello":"world","user":{"id":"1","name":"Ada"},"greeting":"world"}"#
    );
    // `greeting` is a separate response key and resolves on its own
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn arguments_and_variables() {
    let sdl = r#"
        input Filter { prefix: String! limit: Int = 2 }
        type Query { books(filter: Filter, ids: [ID!]): [String] }
    "#;
    let resolvers = Resolvers::new().field("Query", "books", |info| {
        Ok(json!([
            serde_json::to_string(&info.argument("filter")).unwrap(),
            serde_json::to_string(&info.argument("ids")).unwrap(),
        ]))
    });
    let query = compile(
        sdl,
        resolvers,
        r#"query($prefix: String!, $id: ID) { books(filter: {prefix: $prefix}, ids: [$id, 7]) }"#,
    );

    let response = run(&query, json!({}), json!({"prefix": "A", "id": 3}));
    assert_eq!(
        response.data,
        Some(json!({"books": [
            "{\"prefix\":\"A\",\"limit\":2}",
            "[\"3\",\"7\"]",
        ]}))
    );

    let response = run(&query, json!({}), json!({}));
    assert_eq!(response.data, None);
    assert_eq!(
        messages(&response),
        vec!["Variable \"$prefix\" of required type \"String!\" was not provided."]
    );
    assert_eq!(
        response.errors[0].extension_code().as_deref(),
        Some("VALIDATION_INVALID_TYPE_VARIABLE")
    );

    let response = run(&query, json!({}), json!({"prefix": {"not": "a string"}}));
    assert_eq!(response.data, None);
    assert_eq!(
        messages(&response),
        vec!["invalid type for variable: 'prefix'"]
    );
}

#[test]
fn typename_and_context() {
    #[derive(Clone)]
    struct Viewer(String);

    let query = compile(
        "type Query { me: String }",
        Resolvers::new().field("Query", "me", |info| {
            Ok(info
                .context
                .get::<Viewer>()
                .map_or(Value::Null, |viewer| Value::from(viewer.0)))
        }),
        "{ __typename me }",
    );
    let context = Context::new();
    context.insert(Viewer("ada".to_string()));
    let response = query.execute_sync(&json!({}), &Object::new(), &context);
    assert_eq!(
        response.data,
        Some(json!({"__typename": "Query", "me": "ada"}))
    );
}

#[test]
fn compiled_plans_are_reusable() {
    let query = compile(
        "type Query { echo(value: Int): Int }",
        Resolvers::new().field("Query", "echo", |info| {
            Ok(info.argument("value").cloned().unwrap_or(Value::Null))
        }),
        "query($v: Int) { echo(value: $v) }",
    );
    for v in 0..3 {
        let response = run(&query, json!({}), json!({"v": v}));
        assert_eq!(response.data, Some(json!({"echo": v})));
    }
}
