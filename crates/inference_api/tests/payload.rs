use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use inference_api::message::{ContentItem, Message, Role, ToolResult};
use inference_api::payload::message_to_wire;
use inference_api::{normalize, ChatCompletionRequest, ImageWireFormat};

fn image_conversation() -> Vec<Message> {
    vec![Message::with_items(
        Role::User,
        vec![
            ContentItem::Text("what is in this picture?".to_owned()),
            ContentItem::image_bytes(b"ABC".to_vec(), Some("image/jpeg".to_owned())),
        ],
    )]
}

#[test]
fn payload_serialization_defaults_to_streaming_without_budget() {
    let request = ChatCompletionRequest::new("llama3", vec![json!({"role":"user","content":"hi"})]);
    let body = serde_json::to_value(&request).expect("serialize payload");

    assert_eq!(body["model"], Value::String("llama3".to_owned()));
    assert_eq!(body["stream"], Value::Bool(true));
    assert!(body.get("max_tokens").is_none());
}

#[test]
fn payload_prepends_system_prompt_and_sets_budget() {
    let canonical = normalize(&[Message::user("hi")]).expect("normalizes");
    let request = ChatCompletionRequest::from_canonical(
        "llama3",
        Some("You are terse."),
        &canonical,
        ImageWireFormat::OpenAi,
    )
    .with_max_tokens(8192);
    let body = serde_json::to_value(&request).expect("serialize payload");

    assert_eq!(
        body["messages"],
        json!([
            {"role": "system", "content": "You are terse."},
            {"role": "user", "content": "hi"}
        ])
    );
    assert_eq!(body["max_tokens"], json!(8192));
}

#[test]
fn payload_skips_blank_system_prompt() {
    let canonical = normalize(&[Message::user("hi")]).expect("normalizes");
    let request =
        ChatCompletionRequest::from_canonical("m", Some("  "), &canonical, ImageWireFormat::OpenAi);
    assert_eq!(request.messages.len(), 1);
}

#[test]
fn payload_renders_openai_image_url_parts() {
    let canonical = normalize(&image_conversation()).expect("normalizes");
    let wire = message_to_wire(&canonical[0], ImageWireFormat::OpenAi);

    assert_eq!(
        wire,
        vec![json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "what is in this picture?"},
                {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,QUJD"}}
            ]
        })]
    );
}

#[test]
fn payload_renders_qwen_vl_image_parts() {
    let canonical = normalize(&image_conversation()).expect("normalizes");
    let wire = message_to_wire(&canonical[0], ImageWireFormat::QwenVl);

    assert_eq!(
        wire[0]["content"][1],
        json!({"type": "image", "image": "data:image/jpeg;base64,QUJD"})
    );
}

#[test]
fn payload_expands_tool_results_into_tool_messages() {
    let conversation = vec![Message::assistant("").with_tool_results(vec![
        ToolResult {
            call_id: "call_1".to_owned(),
            tool_name: "read_file".to_owned(),
            arguments: json!({"path": "a.txt"}),
            result: json!("contents"),
        },
        ToolResult {
            call_id: "call_2".to_owned(),
            tool_name: "list_dir".to_owned(),
            arguments: json!({}),
            result: json!(["a.txt", "b.txt"]),
        },
    ])];
    let canonical = normalize(&conversation).expect("normalizes");
    let wire = message_to_wire(&canonical[0], ImageWireFormat::OpenAi);

    assert_eq!(
        wire,
        vec![
            json!({"role": "tool", "tool_call_id": "call_1", "name": "read_file", "content": "contents"}),
            json!({"role": "tool", "tool_call_id": "call_2", "name": "list_dir", "content": "[\"a.txt\",\"b.txt\"]"}),
        ]
    );
}

#[test]
fn image_wire_format_parses_aliases() {
    assert_eq!(ImageWireFormat::parse("OpenAI"), Some(ImageWireFormat::OpenAi));
    assert_eq!(ImageWireFormat::parse("qwen_vl"), Some(ImageWireFormat::QwenVl));
    assert_eq!(ImageWireFormat::parse("gemini"), None);
    assert_eq!(ImageWireFormat::QwenVl.as_str(), "qwen-vl");
}
