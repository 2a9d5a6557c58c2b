//! The warehouse agent answering questions about pipeline results.

use crate::test_utils::*;
use chrono::NaiveDate;
use imagery_agent::{root_agent, AgentSettings, BQ_AGENT_NAME};
use imagery_gcp::mock::{MockModel, MockWarehouse};
use imagery_gcp::{FunctionCall, GenerateContentResponse, Part};
use serde_json::{json, Value};
use std::sync::Arc;

fn call(name: &str, args: Value) -> GenerateContentResponse {
    GenerateContentResponse::from_parts(vec![Part {
        function_call: Some(FunctionCall {
            name: name.to_string(),
            args,
        }),
        ..Part::default()
    }])
}

#[tokio::test]
async fn test_agent_recovers_from_blocked_write() {
    init_tracing();
    let warehouse = Arc::new(MockWarehouse::new());
    warehouse.respond_to(
        "GROUP BY pole_condition",
        vec![json!({"pole_condition": "GOOD", "poles": 7})],
    );
    let model = Arc::new(MockModel::new());
    model.push_response(call(BQ_AGENT_NAME, json!({"request": "How many poles are in good condition?"})));
    model.push_response(call(
        "execute_sql",
        json!({"query": "DELETE FROM imagery_insights_analysis.utility_pole_evaluations WHERE TRUE"}),
    ));
    model.push_response(call(
        "execute_sql",
        json!({"query": "SELECT pole_condition, COUNT(*) AS poles FROM imagery_insights_analysis.utility_pole_evaluations GROUP BY pole_condition"}),
    ));
    model.push_text("7 poles are GOOD.");
    model.push_text("Seven poles are in good condition.");

    let settings = AgentSettings {
        project: config().project,
        location: "global".to_string(),
        dataset: Some("imagery_insights_analysis".to_string()),
        model: "gemini-3-flash-preview".to_string(),
    };
    let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
    let agent = root_agent(&settings, model.clone(), warehouse.clone(), today);

    let answer = agent.respond("How many poles are in good condition?").await.unwrap();
    assert_eq!(answer, "Seven poles are in good condition.");

    let requests = model.requests();
    assert_eq!(requests.len(), 5);

    let rejected = requests[2].1.contents.last().unwrap().parts[0]
        .function_response
        .clone()
        .unwrap();
    assert_eq!(rejected.name, "execute_sql");
    assert_eq!(rejected.response["status"], "ERROR");

    let answered = requests[3].1.contents.last().unwrap().parts[0]
        .function_response
        .clone()
        .unwrap();
    assert_eq!(answered.response["rows"], json!([{"pole_condition": "GOOD", "poles": 7}]));

    assert!(warehouse.queries().iter().all(|sql| !sql.contains("DELETE")));
}
