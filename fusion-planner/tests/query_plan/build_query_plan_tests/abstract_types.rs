use fusion_planner::operation::Field;
use fusion_planner::operation::InlineFragment;
use fusion_planner::operation::Operation;
use fusion_planner::operation::Selection;
use fusion_planner::query_plan::Discriminator;
use fusion_planner::query_plan::PlanStep;
use fusion_planner::query_plan::StepId;
use fusion_planner::schema::FieldPath;
use pretty_assertions::assert_eq;
use serde_json::json;

fn media() -> serde_json::Value {
    json!({
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
    })
}

#[test]
fn dispatches_on_typename_when_concrete_types_need_other_sources() {
    let planner = planner!(media());
    let plan = assert_plan!(
        &planner,
        Operation::query([Field::new("search").selections([
            Selection::from(Field::new("__typename")),
            InlineFragment::on("Book")
                .selections([Field::new("title"), Field::new("author")])
                .into(),
            InlineFragment::on("Movie")
                .selections([Field::new("title"), Field::new("director")])
                .into(),
        ])]),
        @r###"
    QueryPlan(cost: 207) {
      Operation(id: 0, source: a) {
        query { search { __typename ... on Book { title id } ... on Movie { title id } } }
      }
      EntityLookup(id: 1, path: search.@, discriminator: 0.__typename, dependsOn: [0]) {
        Branch(Book, source: b) {
          query($__fusion_1_id: ID!) { bookById(id: $__fusion_1_id) { author } }
        }
        Branch(Movie, source: b) {
          query($__fusion_2_id: ID!) { movieById(id: $__fusion_2_id) { director } }
        }
      }
    }
    "###
    );

    let PlanStep::EntityLookup(lookup) = &plan.steps[1] else {
        panic!("expected an entity lookup step");
    };
    assert!(!lookup.strict);
    assert!(lookup.fallback.is_none());
    assert_eq!(
        lookup.discriminator,
        Discriminator::Field {
            producer: StepId(0),
            path: FieldPath::parse("__typename").unwrap(),
        }
    );
    assert_eq!(lookup.branch("Book").unwrap().owned_fields, vec!["author"]);
    assert!(lookup.branch("Magazine").is_none());
}

#[test]
fn abstract_positions_resolved_by_the_parent_source_stay_inline() {
    let planner = planner!(media());
    assert_plan!(
        &planner,
        Operation::query([Field::new("search").selections([
            InlineFragment::on("Book").selections([Field::new("title")]),
            InlineFragment::on("Movie").selections([Field::new("title")]),
        ])]),
        @r###"
    QueryPlan(cost: 104) {
      Operation(id: 0, source: a) {
        query { search { __typename ... on Book { title } ... on Movie { title } } }
      }
    }
    "###
    );
}
