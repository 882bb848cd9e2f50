//! Property tests for path template matching and URL rendering.

use brrtfn::path::PathTemplate;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn values(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

proptest! {
    #[test]
    fn rendered_urls_match_back_to_the_same_values(
        id in any::<i64>(),
        slug in "[a-zA-Z0-9_.~-]{1,24}",
    ) {
        let template = PathTemplate::compile("/users/{id:int}/posts/{slug}").unwrap();
        let input = values(&[("id", json!(id)), ("slug", json!(slug))]);

        let url = template.render(&input).unwrap();
        let matched = template.matches(&url).unwrap();

        prop_assert_eq!(matched.len(), 2);
        prop_assert_eq!(&matched[0].1, &json!(id));
        prop_assert_eq!(&matched[1].1, &json!(slug));
    }

    #[test]
    fn path_remainder_keeps_every_segment(
        segments in prop::collection::vec("[a-z0-9]{1,8}", 1..6),
    ) {
        let template = PathTemplate::compile("/files/{rest:path-remainder}").unwrap();
        let rest = segments.join("/");

        let matched = template.matches(&format!("/files/{rest}")).unwrap();
        prop_assert_eq!(&matched[0].1, &Value::String(rest));
    }

    #[test]
    fn string_segments_never_cross_a_separator(
        head in "[a-z]{1,8}",
        tail in "[a-z]{1,8}",
    ) {
        let template = PathTemplate::compile("/tags/{name}").unwrap();
        let nested = format!("/tags/{head}/{tail}");
        prop_assert!(template.matches(&nested).is_none());
    }

    #[test]
    fn non_numeric_segments_do_not_match_integers(word in "[a-z]{1,12}") {
        let template = PathTemplate::compile("/items/{id:integer}").unwrap();
        let path = format!("/items/{word}");
        prop_assert!(template.matches(&path).is_none());
    }
}

#[test]
fn overflowing_integer_is_a_conversion_error() {
    let template = PathTemplate::compile("/items/{id:int}").unwrap();
    let err = template.try_match("/items/99999999999999999999").unwrap_err();
    assert_eq!(err.value, "99999999999999999999");
    assert!(template.matches("/items/99999999999999999999").is_none());
}

#[test]
fn render_rejects_values_the_converter_could_not_produce() {
    let template = PathTemplate::compile("/tags/{name}/{n:int}").unwrap();
    assert!(template
        .render(&values(&[("name", json!("a/b")), ("n", json!(1))]))
        .is_none());
    assert!(template
        .render(&values(&[("name", json!("a")), ("n", json!("one"))]))
        .is_none());
    assert!(template.render(&values(&[("name", json!("a"))])).is_none());
    assert_eq!(
        template
            .render(&values(&[("name", json!("a")), ("n", json!(-4))]))
            .as_deref(),
        Some("/tags/a/-4")
    );
}
