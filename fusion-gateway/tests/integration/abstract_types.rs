use fusion_gateway::Operation;
use fusion_gateway::SourceServices;
use fusion_gateway::test_harness::CallLog;
use fusion_gateway::test_harness::MockSource;
use fusion_planner::operation::Field;
use fusion_planner::operation::InlineFragment;
use fusion_planner::operation::Selection;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::common::execute;
use super::common::gateway;
use super::common::schema;

const SEARCH: &str = "query { search { __typename ... on Book { title id } ... on Movie { title id } } }";
const BOOK: &str = "query($__fusion_1_id: ID!) { bookById(id: $__fusion_1_id) { author } }";
const MOVIE: &str = "query($__fusion_2_id: ID!) { movieById(id: $__fusion_2_id) { director } }";

fn media() -> fusion_gateway::CompositeSchema {
    schema(json!({
        "sources": [{ "name": "a" }, { "name": "b" }],
        "types": [
            { "kind": "Object", "name": "Query", "fields": [
                { "name": "search", "type": "[Result!]!", "sources": [{ "source": "a" }] }
            ] },
            { "kind": "Union", "name": "Result", "members": ["Book", "Movie"] },
            { "kind": "Object", "name": "Book",
              "fields": [
                { "name": "id", "type": "ID!", "sources": [{ "source": "a" }, { "source": "b" }] },
                { "name": "title", "type": "String", "sources": [{ "source": "a" }] },
                { "name": "author", "type": "String", "sources": [{ "source": "b" }] }
              ],
              "lookups": [
                { "source": "b", "field": "bookById",
                  "arguments": [{ "name": "id", "type": "ID!", "path": "id" }] }
              ] },
            { "kind": "Object", "name": "Movie",
              "fields": [
                { "name": "id", "type": "ID!", "sources": [{ "source": "a" }, { "source": "b" }] },
                { "name": "title", "type": "String", "sources": [{ "source": "a" }] },
                { "name": "director", "type": "String", "sources": [{ "source": "b" }] }
              ],
              "lookups": [
                { "source": "b", "field": "movieById",
                  "arguments": [{ "name": "id", "type": "ID!", "path": "id" }] }
              ] }
        ]
    }))
}

fn search_query() -> Operation {
    Operation::query([Field::new("search").selections([
        Selection::from(Field::new("__typename")),
        InlineFragment::on("Book")
            .selections([Field::new("title"), Field::new("author")])
            .into(),
        InlineFragment::on("Movie")
            .selections([Field::new("title"), Field::new("director")])
            .into(),
    ])])
}

#[tokio::test]
async fn each_item_is_resolved_by_the_branch_of_its_type() {
    let log = CallLog::new();
    let services = SourceServices::new()
        .with(
            "a",
            MockSource::new()
                .with_json(
                    SEARCH,
                    json!({ "data": { "search": [
                        { "__typename": "Book", "title": "Dune", "id": "b1" },
                        { "__typename": "Movie", "title": "Alien", "id": "m1" },
                        { "__typename": "Book", "title": "Emma", "id": "b2" }
                    ] } }),
                )
                .with_call_log(log.clone()),
        )
        .with(
            "b",
            MockSource::new()
                .with_json_for_variables(
                    BOOK,
                    json!({ "__fusion_1_id": "b1" }),
                    json!({ "data": { "bookById": { "author": "Herbert" } } }),
                )
                .with_json_for_variables(
                    BOOK,
                    json!({ "__fusion_1_id": "b2" }),
                    json!({ "data": { "bookById": { "author": "Austen" } } }),
                )
                .with_json_for_variables(
                    MOVIE,
                    json!({ "__fusion_2_id": "m1" }),
                    json!({ "data": { "movieById": { "director": "Scott" } } }),
                )
                .with_call_log(log.clone()),
        );
    let gateway = gateway(media(), services);

    let response = execute(&gateway, &search_query(), json!({})).await;
    assert_eq!(
        response,
        json!({ "data": { "search": [
            { "__typename": "Book", "title": "Dune", "author": "Herbert" },
            { "__typename": "Movie", "title": "Alien", "director": "Scott" },
            { "__typename": "Book", "title": "Emma", "author": "Austen" }
        ] } })
    );
    let documents: Vec<_> = log
        .calls_to("b")
        .into_iter()
        .map(|call| call.document)
        .collect();
    assert_eq!(documents.len(), 3);
    assert_eq!(documents.iter().filter(|document| *document == MOVIE).count(), 1);
}

#[tokio::test]
async fn items_of_types_without_a_branch_are_left_alone() {
    let log = CallLog::new();
    let services = SourceServices::new()
        .with(
            "a",
            MockSource::new().with_json(
                SEARCH,
                json!({ "data": { "search": [
                    { "__typename": "Magazine", "id": "z1" }
                ] } }),
            ),
        )
        .with("b", MockSource::new().with_call_log(log.clone()));
    let gateway = gateway(media(), services);

    let response = execute(&gateway, &search_query(), json!({})).await;
    assert_eq!(
        response,
        json!({ "data": { "search": [{ "__typename": "Magazine" }] } })
    );
    assert!(log.calls().is_empty());
}
