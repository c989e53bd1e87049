use chrono::NaiveDate;
use serde_json::json;

use prepscout::extract::{
    StateLocation, extract_linked_data, extract_structured_state, normalize_text, parse_number,
    table_rows, to_date,
};
use prepscout::util::{dedup_by_key, deep_find_all, deep_find_first, truncate_for_log};

#[test]
fn normalize_text_strips_markup_and_entities() {
    assert_eq!(
        normalize_text("<b> Lake   Travis &amp; Westlake </b>").as_deref(),
        Some("Lake Travis & Westlake")
    );
    assert_eq!(normalize_text("  Austin,&nbsp;TX ").as_deref(), Some("Austin, TX"));
    assert_eq!(normalize_text("   "), None);
    assert_eq!(normalize_text("<span></span>"), None);
}

#[test]
fn parse_number_is_tolerant() {
    assert_eq!(parse_number("1,234"), Some(1234.0));
    assert_eq!(parse_number("Rating: 0.89"), Some(0.89));
    assert_eq!(parse_number("-7"), Some(-7.0));
    assert_eq!(parse_number("-"), None);
    assert_eq!(parse_number(""), None);
    assert_eq!(parse_number("TBD"), None);
}

#[test]
fn to_date_accepts_source_formats() {
    let expected = NaiveDate::from_ymd_opt(2025, 9, 5).unwrap();
    assert_eq!(to_date("2025-09-05"), Some(expected));
    assert_eq!(to_date("9/5/2025"), Some(expected));
    assert_eq!(to_date("September 5, 2025"), Some(expected));
    assert_eq!(to_date("Sep 5, 2025"), Some(expected));
    assert_eq!(to_date("2025-09-05T18:30:00Z"), Some(expected));
    assert_eq!(to_date("Friday night"), None);
    assert_eq!(to_date(""), None);
}

const BOTH_LOCATIONS: &str = r#"
<script>window.__PREP_STATE__ = {"from": "hydration"};</script>
<script id="team-data" type="application/json">{"from": "script-tag"}</script>
"#;

const BROKEN_HYDRATION: &str = r#"
<script>window.__PREP_STATE__ = {"from": "hydration", oops};</script>
<script id="team-data" type="application/json">{"from": "script-tag"}</script>
"#;

#[test]
fn structured_state_respects_location_order() {
    let locations = &[
        StateLocation::HydrationVar("__PREP_STATE__"),
        StateLocation::ScriptId("team-data"),
    ];
    let state = extract_structured_state(BOTH_LOCATIONS, locations).expect("state should parse");
    assert_eq!(state["from"], "hydration");
}

#[test]
fn structured_state_falls_through_unparseable_location() {
    let locations = &[
        StateLocation::HydrationVar("__PREP_STATE__"),
        StateLocation::ScriptId("team-data"),
    ];
    let state = extract_structured_state(BROKEN_HYDRATION, locations).expect("state should parse");
    assert_eq!(state["from"], "script-tag");
}

#[test]
fn structured_state_none_when_no_location_matches() {
    assert!(extract_structured_state("<html></html>", &[
        StateLocation::HydrationVar("__PREP_STATE__")
    ])
    .is_none());
}

#[test]
fn hydration_payload_handles_braces_inside_strings() {
    let html = r#"<script>window.__PREP_STATE__ = {"a": "}{", "b": {"c": 1}};</script>"#;
    let state =
        extract_structured_state(html, &[StateLocation::HydrationVar("__PREP_STATE__")])
            .expect("state should parse");
    assert_eq!(state["a"], "}{");
    assert_eq!(state["b"]["c"], 1);
}

#[test]
fn linked_data_skips_bad_blocks_and_flattens_arrays() {
    let html = r#"
    <script type="application/ld+json">{"@type": "SportsTeam", "name": "Westlake"}</script>
    <script type="application/ld+json">{not json at all}</script>
    <script type="application/ld+json">[{"@type": "Person"}, {"@type": "Person"}]</script>
    "#;
    let docs = extract_linked_data(html);
    assert_eq!(docs.len(), 3);
    assert_eq!(docs[0]["name"], "Westlake");
}

#[test]
fn deep_find_does_not_descend_into_matches() {
    let tree = json!({
        "outer": { "kind": "hit", "inner": { "kind": "hit" } },
        "sibling": { "kind": "hit" }
    });
    let hits = deep_find_all(&tree, &|v| v.get("kind").is_some());
    assert_eq!(hits.len(), 2);

    let first = deep_find_first(&tree, &|v| v.get("kind").is_some()).unwrap();
    assert!(first.get("inner").is_some());
}

#[test]
fn dedup_keeps_first_occurrence() {
    let items = vec![("a", 1), ("b", 2), ("a", 3)];
    let deduped = dedup_by_key(items, |(key, _)| *key);
    assert_eq!(deduped, vec![("a", 1), ("b", 2)]);
}

#[test]
fn truncate_respects_char_boundaries() {
    assert_eq!(truncate_for_log("short", 10), "short");
    assert_eq!(truncate_for_log("abcdefgh", 4), "abcd...");
    assert_eq!(truncate_for_log("ééééé", 3), "ééé...");
}

#[test]
fn table_rows_cleans_cells() {
    let html = r#"
    <table>
      <tr><th> Name </th><th>Pos</th></tr>
      <tr><td><a href="/p/1">Jordan&nbsp;Lee</a></td><td> QB </td></tr>
    </table>
    "#;
    let rows = table_rows(html);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1], vec!["Jordan Lee".to_string(), "QB".to_string()]);
}
