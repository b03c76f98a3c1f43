//! The MCP tool surface: phone number lookup and outbound call batches.

use calling::{BatchId, BatchResult, CallDispatcher, CallProvider};
use lookup::{ChatBackend, PhoneLookup};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData, ServerHandler, schemars, tool, tool_handler, tool_router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct FindArgs {
    /// What to look for, e.g. "pizza restaurants in New York City"
    prompt: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CallArgs {
    /// Phone numbers to call
    #[serde(default)]
    numbers: Vec<String>,
    /// A single phone number to call
    #[serde(default)]
    number: Option<String>,
    /// What the voice agent should accomplish on each call
    task: String,
}

impl CallArgs {
    fn recipients(self) -> (Vec<String>, String) {
        let mut numbers = self.numbers;
        numbers.extend(self.number);
        (numbers, self.task)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallReport<'a> {
    batch_id: BatchId,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider_batch_id: Option<&'a str>,
    task: &'a str,
    summary: Option<&'a str>,
    calls: Vec<CallEntry<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallEntry<'a> {
    phone_number: &'a str,
    summary: &'a str,
    transcript: Vec<String>,
}

impl<'a> CallReport<'a> {
    fn new(result: &'a BatchResult) -> Self {
        Self {
            batch_id: result.batch_id,
            provider_batch_id: result.provider_batch_id.as_deref(),
            task: &result.task,
            summary: result.summary.as_deref(),
            calls: result
                .outcomes
                .iter()
                .map(|o| CallEntry {
                    phone_number: &o.phone_number,
                    summary: &o.summary,
                    transcript: o.transcript.iter().map(ToString::to_string).collect(),
                })
                .collect(),
        }
    }
}

/// What a caller is told when a lookup fails. The full error is logged.
fn lookup_failure(e: &lookup::Error) -> &'static str {
    use lookup::Error::*;
    match e {
        InvalidRequest(_) => "the prompt is empty",
        Configuration(_) => "phone lookup is not configured",
        EmptyResult(_) => "no results",
        Network(_) | Upstream { .. } | InvalidResponse(_) => "search provider unavailable",
    }
}

/// What a caller is told when a call batch fails. The full error is logged.
fn call_failure(e: &calling::Error) -> String {
    use calling::Error::*;
    match e {
        InvalidRequest(_) | RecipientInFlight(_) | Timeout { .. } => e.to_string(),
        Configuration(_) => "calling is not configured".to_string(),
        DispatchFailed {
            status: Some(status),
            ..
        } => format!("call provider rejected the batch (status {status})"),
        DispatchFailed { status: None, .. } => "call provider unavailable".to_string(),
    }
}

/// Serves `findPhoneNumbers` and `callNumbers`.
pub struct CallTools<B, P> {
    lookup: PhoneLookup<B>,
    dispatcher: CallDispatcher<P>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl<B: ChatBackend + 'static, P: CallProvider + 'static> CallTools<B, P> {
    pub fn new(lookup: PhoneLookup<B>, dispatcher: CallDispatcher<P>) -> Self {
        Self {
            lookup,
            dispatcher,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "findPhoneNumbers",
        description = "Search the web and return phone numbers relevant to the prompt"
    )]
    async fn find_phone_numbers(
        &self,
        Parameters(args): Parameters<FindArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        match self.lookup.find(&args.prompt).await {
            Ok(result) => Ok(CallToolResult::success(vec![Content::json(&result)?])),
            Err(e) => {
                warn!(error = %e, "phone number lookup failed");
                let body = json!({ "phoneNumbers": [], "error": lookup_failure(&e) });
                Ok(CallToolResult::error(vec![Content::json(body)?]))
            }
        }
    }

    #[tool(
        name = "callNumbers",
        description = "Call each number with an AI voice agent that carries out the task, \
                       and return every call's transcript once all calls have finished"
    )]
    async fn call_numbers(
        &self,
        Parameters(args): Parameters<CallArgs>,
    ) -> Result<CallToolResult, ErrorData> {
        let (numbers, task) = args.recipients();

        let handle = match self.dispatcher.submit(&numbers, &task).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "call batch not submitted");
                return Ok(CallToolResult::error(vec![Content::text(call_failure(&e))]));
            }
        };

        info!(batch_id = %handle.batch_id(), "waiting for call results");
        match handle.wait().await {
            Ok(result) => Ok(CallToolResult::success(vec![Content::json(
                CallReport::new(&result),
            )?])),
            Err(e) => {
                warn!(error = %e, "call batch did not complete");
                Ok(CallToolResult::error(vec![Content::text(call_failure(&e))]))
            }
        }
    }
}

#[tool_handler]
impl<B: ChatBackend + 'static, P: CallProvider + 'static> ServerHandler for CallTools<B, P> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Find phone numbers with findPhoneNumbers, then call them with callNumbers."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calling::{
        BatchCall, BatchSubmission, CallCorrelator, CallOutcome, Correlation, TranscriptTurn,
    };
    use lookup::{ChatRequest, ExtractionClient, SearchClient};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    struct Scripted {
        answer: Option<&'static str>,
    }

    impl ChatBackend for Scripted {
        async fn complete(&self, request: ChatRequest<'_>) -> lookup::Result<String> {
            match (self.answer, request.json_output) {
                (None, _) => Err(lookup::Error::Upstream {
                    status: 401,
                    body: "invalid key sk-live-abc123".into(),
                }),
                (Some(_), true) => Ok(r#"{"phoneNumbers":["(212) 555-0101"]}"#.into()),
                (Some(answer), false) => Ok(answer.into()),
            }
        }
    }

    struct Accepting;

    impl CallProvider for Accepting {
        async fn submit_batch(&self, _call: &BatchCall<'_>) -> calling::Result<BatchSubmission> {
            Ok(BatchSubmission {
                id: Some("btcal_9".into()),
                ..Default::default()
            })
        }
    }

    struct Rejecting;

    impl CallProvider for Rejecting {
        async fn submit_batch(&self, _call: &BatchCall<'_>) -> calling::Result<BatchSubmission> {
            Err(calling::Error::DispatchFailed {
                status: Some(402),
                body: r#"{"detail":"account 8812 out of credits"}"#.into(),
            })
        }
    }

    fn tools_with<P: CallProvider + 'static>(
        answer: Option<&'static str>,
        provider: P,
    ) -> (Arc<CallTools<Scripted, P>>, Arc<CallCorrelator>) {
        let lookup = PhoneLookup::new(
            SearchClient::new(Scripted { answer }),
            ExtractionClient::new(Scripted { answer }),
        );
        let correlator = Arc::new(CallCorrelator::new());
        let dispatcher = CallDispatcher::new(provider, Arc::clone(&correlator))
            .with_max_wait(Some(Duration::from_secs(5)));
        (Arc::new(CallTools::new(lookup, dispatcher)), correlator)
    }

    fn tools(answer: Option<&'static str>) -> (Arc<CallTools<Scripted, Accepting>>, Arc<CallCorrelator>) {
        tools_with(answer, Accepting)
    }

    fn text(result: &CallToolResult) -> String {
        result.content[0].as_text().unwrap().text.clone()
    }

    fn body(result: &CallToolResult) -> Value {
        serde_json::from_str(&text(result)).unwrap()
    }

    fn find(prompt: &str) -> Parameters<FindArgs> {
        Parameters(FindArgs {
            prompt: prompt.to_string(),
        })
    }

    fn call(numbers: &[&str], number: Option<&str>, task: &str) -> Parameters<CallArgs> {
        Parameters(CallArgs {
            numbers: numbers.iter().map(|n| n.to_string()).collect(),
            number: number.map(str::to_string),
            task: task.to_string(),
        })
    }

    #[test]
    fn lists_both_tools() {
        let (tools, _) = tools(None);
        let mut names: Vec<String> = tools
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();
        assert_eq!(names, ["callNumbers", "findPhoneNumbers"]);
    }

    #[tokio::test]
    async fn find_returns_numbers_and_source() {
        let (tools, _) = tools(Some("Joe's Pizza: (212) 555-0101"));
        let result = tools.find_phone_numbers(find("pizza in NYC")).await.unwrap();

        assert_ne!(result.is_error, Some(true));
        let json = body(&result);
        assert_eq!(json["phoneNumbers"], json!(["+1-212-555-0101"]));
        assert_eq!(json["source"], "Joe's Pizza: (212) 555-0101");
    }

    #[tokio::test]
    async fn find_failure_is_structured_without_provider_details() {
        let (tools, _) = tools(None);
        let result = tools.find_phone_numbers(find("pizza")).await.unwrap();

        assert_eq!(result.is_error, Some(true));
        let json = body(&result);
        assert_eq!(json["phoneNumbers"], json!([]));
        assert_eq!(json["error"], "search provider unavailable");
        let raw = text(&result);
        assert!(!raw.contains("sk-live-abc123"));
        assert!(!raw.contains("401"));
    }

    #[test]
    fn lookup_failures_map_to_short_reasons() {
        assert_eq!(
            lookup_failure(&lookup::Error::Configuration("search API key not set".into())),
            "phone lookup is not configured"
        );
        assert_eq!(
            lookup_failure(&lookup::Error::EmptyResult("search".into())),
            "no results"
        );
        assert_eq!(
            lookup_failure(&lookup::Error::InvalidResponse("expected value at 1:1".into())),
            "search provider unavailable"
        );
    }

    #[tokio::test]
    async fn call_numbers_without_recipients_fails_in_band() {
        let (tools, correlator) = tools(None);
        let result = tools.call_numbers(call(&[], None, "t")).await.unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(correlator.live_batches(), 0);
    }

    #[tokio::test]
    async fn rejected_batch_hides_provider_body() {
        let (tools, correlator) = tools_with(None, Rejecting);
        let result = tools
            .call_numbers(call(&["+1-555-000-0001"], None, "t"))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        let raw = text(&result);
        assert_eq!(raw, "call provider rejected the batch (status 402)");
        assert!(!raw.contains("8812"));
        assert_eq!(correlator.live_batches(), 0);
    }

    #[tokio::test]
    async fn call_numbers_reports_every_call() {
        let (tools, correlator) = tools(None);
        let pending = tokio::spawn({
            let tools = Arc::clone(&tools);
            async move {
                tools
                    .call_numbers(call(
                        &["+1-555-000-0001"],
                        Some("+1-555-000-0002"),
                        "confirm appointment",
                    ))
                    .await
            }
        });

        while !correlator.is_pending("+1-555-000-0002") {
            tokio::task::yield_now().await;
        }
        for (number, reply, summary) in [
            ("+1-555-000-0002", "Yes confirmed", "Confirmed"),
            ("+1-555-000-0001", "Not available", "Declined"),
        ] {
            let outcome = CallOutcome::new(
                number,
                vec![TranscriptTurn::new("agent", "Hello"), TranscriptTurn::new("user", reply)],
                summary,
            );
            assert_ne!(correlator.record_completion(outcome), Correlation::Unmatched);
        }

        let result = pending.await.unwrap().unwrap();
        assert_ne!(result.is_error, Some(true));
        let json = body(&result);
        assert_eq!(json["providerBatchId"], "btcal_9");
        assert_eq!(json["summary"], "Declined");
        assert_eq!(json["calls"][0]["phoneNumber"], "+1-555-000-0002");
        assert_eq!(
            json["calls"][0]["transcript"],
            json!(["agent: Hello", "user: Yes confirmed"])
        );
        assert_eq!(json["calls"][1]["summary"], "Declined");
    }

    #[test]
    fn server_advertises_tools() {
        let (tools, _) = tools(None);
        assert!(tools.get_info().capabilities.tools.is_some());
    }
}
