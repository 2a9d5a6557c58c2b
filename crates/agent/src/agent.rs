//! The tool-calling model loop.
//!
//! Each turn sends the whole conversation, runs any function calls the model
//! makes and feeds their results back, until the model answers in text or the
//! step budget runs out. Tool failures are reported to the model as
//! `{"status": "ERROR", "error_details": ...}` so it can correct itself.

use crate::error::{AgentError, AgentResult};
use crate::tool::{string_arg, string_params, Tool, ToolSet};
use async_trait::async_trait;
use imagery_gcp::{
    Content, FunctionCall, GenerateContentRequest, GenerationConfig, GenerativeModel, Part,
    Tool as ModelTool,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_STEPS: usize = 12;

pub struct Agent {
    pub name: String,
    pub description: String,
    pub model_name: String,
    pub instruction: String,
    pub generation_config: Option<GenerationConfig>,
    pub max_steps: usize,
    tools: ToolSet,
    model: Arc<dyn GenerativeModel>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        model: Arc<dyn GenerativeModel>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            model_name: model_name.into(),
            instruction: String::new(),
            generation_config: None,
            max_steps: DEFAULT_MAX_STEPS,
            tools: ToolSet::new(),
            model,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    fn request(&self, history: &[Content]) -> GenerateContentRequest {
        let mut request = GenerateContentRequest::new(history.to_vec());
        if !self.instruction.is_empty() {
            request = request.with_system_instruction(self.instruction.clone());
        }
        if let Some(config) = &self.generation_config {
            request = request.with_generation_config(config.clone());
        }
        if !self.tools.is_empty() {
            request = request.with_tool(ModelTool::functions(self.tools.declarations()));
        }
        request
    }

    async fn invoke(&self, call: &FunctionCall) -> Value {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(agent = %self.name, tool = %call.name, "Model called an unknown tool");
            return error_payload(&AgentError::UnknownTool(call.name.clone()));
        };
        debug!(agent = %self.name, tool = %call.name, args = %call.args, "Calling tool");
        match tool.call(call.args.clone()).await {
            Ok(Value::Object(map)) => Value::Object(map),
            Ok(other) => json!({ "result": other }),
            Err(e) => {
                warn!(agent = %self.name, tool = %call.name, error = %e, "Tool call failed");
                error_payload(&e)
            }
        }
    }

    /// Continue `history` with a user message and return the final answer.
    ///
    /// Every model turn and tool result is appended to `history`.
    pub async fn run(&self, history: &mut Vec<Content>, message: &str) -> AgentResult<String> {
        history.push(Content::user(vec![Part::text(message)]));

        for step in 0..self.max_steps {
            let response = self
                .model
                .generate(&self.model_name, &self.request(history))
                .await?;
            let content = response.content().cloned().ok_or(AgentError::EmptyResponse)?;
            history.push(content);

            let calls = response.function_calls();
            if calls.is_empty() {
                info!(agent = %self.name, steps = step + 1, "Agent answered");
                return response.text().ok_or(AgentError::EmptyResponse);
            }

            let mut parts = Vec::with_capacity(calls.len());
            for call in &calls {
                parts.push(Part::function_response(&call.name, self.invoke(call).await));
            }
            history.push(Content::user(parts));
        }

        Err(AgentError::StepLimit(self.max_steps))
    }

    /// Answer a single message with a fresh conversation.
    pub async fn respond(&self, message: &str) -> AgentResult<String> {
        let mut history = Vec::new();
        self.run(&mut history, message).await
    }
}

fn error_payload(error: &AgentError) -> Value {
    json!({ "status": "ERROR", "error_details": error.to_string() })
}

/// A sub-agent exposed as a tool that takes a single `request` string.
pub struct AgentTool {
    agent: Arc<Agent>,
}

impl AgentTool {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.agent.name
    }

    fn description(&self) -> &str {
        &self.agent.description
    }

    fn parameters(&self) -> Value {
        string_params(&[("request", "Task for the agent to carry out")])
    }

    async fn call(&self, args: Value) -> AgentResult<Value> {
        let request = string_arg(&self.agent.name, &args, "request")?;
        let answer = self.agent.respond(request).await?;
        Ok(json!({ "result": answer }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagery_gcp::mock::MockModel;
    use imagery_gcp::vertex::ROLE_USER;
    use imagery_gcp::GenerateContentResponse;

    struct Adder;

    #[async_trait]
    impl Tool for Adder {
        fn name(&self) -> &str {
            "add"
        }

        fn description(&self) -> &str {
            "Add two numbers"
        }

        fn parameters(&self) -> Value {
            json!({"type": "OBJECT", "properties": {"a": {"type": "NUMBER"}, "b": {"type": "NUMBER"}}})
        }

        async fn call(&self, args: Value) -> AgentResult<Value> {
            let a = args["a"].as_f64().unwrap_or_default();
            let b = args["b"].as_f64().unwrap_or_default();
            Ok(json!(a + b))
        }
    }

    fn call_part(name: &str, args: Value) -> Part {
        Part {
            function_call: Some(FunctionCall {
                name: name.to_string(),
                args,
            }),
            ..Part::default()
        }
    }

    #[tokio::test]
    async fn test_text_answer_without_tools() {
        let model = Arc::new(MockModel::with_text("hello"));
        let agent = Agent::new("plain", model.clone(), "gemini").with_instruction("Be brief.");

        assert_eq!(agent.respond("hi").await.unwrap(), "hello");
        let (model_name, request) = &model.requests()[0];
        assert_eq!(model_name, "gemini");
        assert!(request.tools.is_empty());
        assert_eq!(
            request.system_instruction.as_ref().unwrap().parts[0].text.as_deref(),
            Some("Be brief.")
        );
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let model = Arc::new(MockModel::new());
        model.push_response(GenerateContentResponse::from_parts(vec![call_part(
            "add",
            json!({"a": 2, "b": 3}),
        )]));
        model.push_text("The sum is 5.");

        let agent = Agent::new("calc", model.clone(), "gemini")
            .with_tools(ToolSet::new().with(Arc::new(Adder)));
        let mut history = Vec::new();
        let answer = agent.run(&mut history, "2+3?").await.unwrap();

        assert_eq!(answer, "The sum is 5.");
        // user, model call, tool response, model answer
        assert_eq!(history.len(), 4);
        let response = history[2].parts[0].function_response.as_ref().unwrap();
        assert_eq!(history[2].role, ROLE_USER);
        assert_eq!(response.name, "add");
        assert_eq!(response.response, json!({"result": 5.0}));

        let (_, second) = &model.requests()[1];
        assert_eq!(second.tools[0].function_declarations[0].name, "add");
        assert_eq!(second.contents.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let model = Arc::new(MockModel::new());
        model.push_response(GenerateContentResponse::from_parts(vec![call_part("drop_table", json!({}))]));
        model.push_text("I cannot do that.");

        let agent = Agent::new("calc", model, "gemini").with_tools(ToolSet::new().with(Arc::new(Adder)));
        let mut history = Vec::new();
        agent.run(&mut history, "drop it").await.unwrap();

        let response = history[2].parts[0].function_response.as_ref().unwrap();
        assert_eq!(response.response["status"], "ERROR");
        assert!(response.response["error_details"]
            .as_str()
            .unwrap()
            .contains("drop_table"));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let model = Arc::new(MockModel::new());
        for _ in 0..3 {
            model.push_response(GenerateContentResponse::from_parts(vec![call_part(
                "add",
                json!({"a": 1, "b": 1}),
            )]));
        }
        let agent = Agent::new("loop", model, "gemini")
            .with_tools(ToolSet::new().with(Arc::new(Adder)))
            .with_max_steps(2);

        let err = agent.respond("loop forever").await.unwrap_err();
        assert!(matches!(err, AgentError::StepLimit(2)));
    }

    #[tokio::test]
    async fn test_agent_tool_delegates() {
        let model = Arc::new(MockModel::new());
        model.push_text("[{\"n\": 1}]");
        let sub = Arc::new(
            Agent::new("bigquery_agent", model.clone(), "gemini").with_description("Runs SQL"),
        );
        let tool = AgentTool::new(sub);

        assert_eq!(tool.name(), "bigquery_agent");
        assert_eq!(tool.description(), "Runs SQL");
        let result = tool.call(json!({"request": "count rows"})).await.unwrap();
        assert_eq!(result["result"], "[{\"n\": 1}]");

        let (_, request) = &model.requests()[0];
        assert_eq!(request.contents[0].parts[0].text.as_deref(), Some("count rows"));
    }

    #[tokio::test]
    async fn test_empty_candidate_is_an_error() {
        let model = Arc::new(MockModel::new());
        model.push_response(GenerateContentResponse::default());
        let agent = Agent::new("empty", model, "gemini");
        assert!(matches!(
            agent.respond("hi").await.unwrap_err(),
            AgentError::EmptyResponse
        ));
    }
}
