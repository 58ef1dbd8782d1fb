//! End-to-end conversational and file pipelines.

use aafee::prelude::*;
use aafee::stages::NO_INPUT;
use aafee::testing::{assert_end, assert_text, ScriptedLlm};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn chat_loop_carries_history_until_end() {
    let llm = Arc::new(ScriptedLlm::new([
        "Which city? [INSTRUCTION: CONTINUE]",
        "Paris it is. [INSTRUCTION: END]",
    ]));
    let agent = StopContinueAgent::new("planner", llm.clone(), "Plan a trip.");
    let user_lines = Mutex::new(vec!["Paris".to_string()]);
    let chat = LoopedFlow::new("chat", vec![Arc::new(StoredHistoryProvider::new(agent))])
        .with_decision(continue_while_instructed(move || user_lines.lock().pop()))
        .with_max_iterations(5);

    let output = chat.execute(Some(StageValue::text("Plan a weekend"))).await.unwrap();

    assert_end(&output);
    assert_text(&output, "Paris it is. [INSTRUCTION: END]");

    let calls = llm.calls();
    assert_eq!(calls.len(), 2);
    let second: Vec<&str> = calls[1].iter().map(|m| m.text.as_str()).collect();
    let first_input = second.iter().position(|t| *t == "Plan a weekend").unwrap();
    let follow_up = second
        .iter()
        .position(|t| *t == "Which city? [INSTRUCTION: CONTINUE]\nParis")
        .unwrap();
    assert!(first_input < follow_up);
}

#[tokio::test]
async fn linear_pipeline_writes_extracted_code() {
    let dir = tempdir().unwrap();
    let llm = Arc::new(ScriptedLlm::new([
        "Here:\n```rust\nfn main() {}\n```\nand\n```python\nprint(1)\n```",
    ]));
    let peeked = Binding::cell(String::new());
    let flow = FlowBuilder::new()
        .stage(OneShotAgent::new("coder", llm, "Write code."))
        .stage(StagePeek::new(peeked.clone()))
        .stage(CodeBlockExtractor::for_language("rust"))
        .stage(WriteToFileStage::new(dir.path(), "main.txt"))
        .build_linear("codegen");

    let output = flow.execute(Some(StageValue::text("hello world"))).await.unwrap();

    assert_eq!(output, StageValue::List(vec!["fn main() {}".to_string()]));
    assert!(peeked.get().starts_with("Here:"));
    let written = std::fs::read_to_string(dir.path().join("main.txt")).unwrap();
    assert_eq!(written, "[fn main() {}]");
}

#[tokio::test]
async fn peek_reports_missing_input() {
    let seen = Binding::cell(String::new());
    let flow = LinearFlow::new("peek", vec![Arc::new(StagePeek::new(seen.clone()))]);

    let output = flow.execute(None).await.unwrap();

    assert_eq!(output, StageValue::None);
    assert_eq!(seen.get(), NO_INPUT);
}

#[tokio::test]
async fn writing_structured_value_aborts_flow() {
    let dir = tempdir().unwrap();
    let flow = LinearFlow::new(
        "bad-write",
        vec![Arc::new(WriteToFileStage::new(dir.path(), "out.json"))],
    );

    let err = flow
        .execute(Some(StageValue::Structured {
            schema_tag: "Video".into(),
            payload: serde_json::json!({"title": "x"}),
        }))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("cannot write structured value"));
    assert!(!dir.path().join("out.json").exists());
}
