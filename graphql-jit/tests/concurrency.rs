use std::sync::Arc;
use std::thread;
use std::time::Duration;

use futures::FutureExt;
use graphql_jit::Compiler;
use graphql_jit::Configuration;
use graphql_jit::Context;
use graphql_jit::FieldError;
use graphql_jit::Jit;
use graphql_jit::Resolvers;
use graphql_jit::TypeMap;
use graphql_jit::json_ext::Object;
use parking_lot::Mutex;
use serde_json_bytes::json;
use test_log::test;

type Log = Arc<Mutex<Vec<String>>>;

/// An async resolver for `type_name.field` recording when it starts and ends.
fn delayed(
    resolvers: Resolvers,
    log: &Log,
    type_name: &str,
    field: &'static str,
    delay_ms: u64,
) -> Resolvers {
    let log = log.clone();
    resolvers.field_async(type_name, field, move |_| {
        let log = log.clone();
        async move {
            log.lock().push(format!("start {field}"));
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            log.lock().push(format!("end {field}"));
            Ok(json!(field))
        }
        .boxed()
    })
}

fn compiler(sdl: &str, resolvers: Resolvers, jit: Jit) -> Compiler {
    Compiler::new(
        Arc::new(TypeMap::parse(sdl, resolvers).unwrap()),
        Configuration::builder().jit(jit).build(),
    )
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

#[test(tokio::test)]
async fn response_order_follows_the_query() {
    let log = Log::default();
    let resolvers = delayed(Resolvers::new(), &log, "Query", "b", 60);
    let resolvers = delayed(resolvers, &log, "Query", "a", 5);
    let compiler = compiler("type Query { a: String b: String }", resolvers, Jit::default());
    let query = compiler.compile("{ b a }", None).unwrap();
    let query = query.compiled().unwrap();
    assert!(query.is_async());

    let response = query
        .execute(&json!({}), &Object::new(), &Context::new())
        .await;

    assert_eq!(
        serde_json::to_string(&response.data).unwrap(),
        r#"{"b":"b","a":"a"}"#
    );
    assert_eq!(entries(&log), vec!["start b", "start a", "end a", "end b"]);
}

#[test(tokio::test)]
async fn sequential_scheduling_when_parallel_is_disabled() {
    let log = Log::default();
    let resolvers = delayed(Resolvers::new(), &log, "Query", "b", 20);
    let resolvers = delayed(resolvers, &log, "Query", "a", 5);
    let compiler = compiler(
        "type Query { a: String b: String }",
        resolvers,
        Jit::builder().parallel(false).build(),
    );
    let query = compiler.compile("{ b a }", None).unwrap();

    let response = query
        .compiled()
        .unwrap()
        .execute(&json!({}), &Object::new(), &Context::new())
        .await;

    assert_eq!(response.data, Some(json!({"b": "b", "a": "a"})));
    assert_eq!(entries(&log), vec!["start b", "end b", "start a", "end a"]);
}

#[test(tokio::test)]
async fn mutation_fields_run_one_after_the_other() {
    let log = Log::default();
    let resolvers = delayed(Resolvers::new(), &log, "Mutation", "first", 30);
    let resolvers = delayed(resolvers, &log, "Mutation", "second", 1);
    let resolvers = resolvers.field("Mutation", "third", {
        let log = log.clone();
        move |_| {
            log.lock().push("third".to_string());
            Ok(json!("third"))
        }
    });
    let compiler = compiler(
        "type Query { ok: Boolean } type Mutation { first: String second: String third: String }",
        resolvers,
        Jit::default(),
    );
    let query = compiler
        .compile("mutation { first third second }", None)
        .unwrap();

    let response = query
        .compiled()
        .unwrap()
        .execute(&json!({}), &Object::new(), &Context::new())
        .await;

    assert_eq!(
        serde_json::to_string(&response.data).unwrap(),
        r#"{"first":"first","third":"third","second":"second"}"#
    );
    assert_eq!(
        entries(&log),
        vec!["start first", "end first", "third", "start second", "end second"]
    );
}

#[test(tokio::test)]
async fn async_list_items_keep_their_order() {
    let sdl = "type Query { users: [User!]! } type User { id: Int! name: String }";
    let resolvers = Resolvers::new().field_async("User", "name", |info| {
        let id = info
            .parent
            .as_object()
            .and_then(|parent| parent.get("id"))
            .and_then(|id| id.as_u64())
            .unwrap_or_default();
        async move {
            // later items finish first
            tokio::time::sleep(Duration::from_millis(40 - id * 10)).await;
            Ok(json!(format!("user {id}")))
        }
        .boxed()
    });
    let compiler = compiler(sdl, resolvers, Jit::default());
    let query = compiler.compile("{ users { id name } }", None).unwrap();

    let response = query
        .compiled()
        .unwrap()
        .execute(
            &json!({"users": [{"id": 1}, {"id": 2}, {"id": 3}]}),
            &Object::new(),
            &Context::new(),
        )
        .await;

    assert_eq!(
        response.data,
        Some(json!({"users": [
            {"id": 1, "name": "user 1"},
            {"id": 2, "name": "user 2"},
            {"id": 3, "name": "user 3"},
        ]}))
    );
}

#[test(tokio::test)]
async fn failing_async_sibling_does_not_cancel_the_others() {
    let log = Log::default();
    let resolvers = delayed(Resolvers::new(), &log, "Query", "slow", 20);
    let resolvers = resolvers.field_async("Query", "failing", |_| {
        async { Err(FieldError::new("failed early")) }.boxed()
    });
    let compiler = compiler(
        "type Query { failing: String slow: String }",
        resolvers,
        Jit::default(),
    );
    let query = compiler.compile("{ failing slow }", None).unwrap();

    let response = query
        .compiled()
        .unwrap()
        .execute(&json!({}), &Object::new(), &Context::new())
        .await;

    assert_eq!(
        response.data,
        Some(json!({"failing": null, "slow": "slow"}))
    );
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "failed early");
    assert_eq!(entries(&log), vec!["start slow", "end slow"]);
}

#[test(tokio::test)]
async fn non_null_async_failure_nulls_the_parent() {
    let resolvers = Resolvers::new()
        .field_async("User", "name", |_| {
            async { Err(FieldError::new("no name")) }.boxed()
        })
        .field_async("User", "email", |_| async { Ok(json!("a@b.c")) }.boxed());
    let compiler = compiler(
        "type Query { user: User } type User { name: String! email: String }",
        resolvers,
        Jit::default(),
    );
    let query = compiler.compile("{ user { email name } }", None).unwrap();

    let response = query
        .compiled()
        .unwrap()
        .execute(&json!({"user": {}}), &Object::new(), &Context::new())
        .await;

    assert_eq!(response.data, Some(json!({"user": null})));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].path,
        Some(graphql_jit::json_ext::Path::from("user/name"))
    );
}

#[test]
fn concurrent_first_compilations_are_coalesced() {
    let compiler = compiler(
        "type Query { hello: String }",
        Resolvers::new(),
        Jit::default(),
    );
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let compiler = compiler.clone();
            thread::spawn(move || {
                let compilation = compiler.compile("{ hello }", None).unwrap();
                compilation.compiled().cloned().unwrap()
            })
        })
        .collect();
    let queries: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert!(queries.iter().all(|query| Arc::ptr_eq(query, &queries[0])));
    let stats = compiler.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.size, 1);
}

#[test]
fn async_plans_run_without_a_runtime() {
    let resolvers = Resolvers::new().field_async("Query", "hello", |info| {
        let name = info.argument("name").cloned();
        async move { Ok(name.unwrap_or_else(|| json!("world"))) }.boxed()
    });
    let compiler = compiler(
        "type Query { hello(name: String): String }",
        resolvers,
        Jit::default(),
    );
    let query = compiler.compile("{ hello }", None).unwrap();
    let response = query
        .compiled()
        .unwrap()
        .execute_sync(&json!({}), &Object::new(), &Context::new());
    assert_eq!(response.data, Some(json!({"hello": "world"})));
}
