use inference_api::events::{FinishReason, StreamEvent, ToolCallDelta, Usage};
use inference_api::translate::Translated;
use inference_api::EventTranslator;

#[test]
fn chat_chunk_text_becomes_text_delta() {
    let mut translator = EventTranslator::default();
    let translated =
        translator.translate_payload(r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":"Hel"}}]}"#);
    assert_eq!(translated, Translated::Emit(vec![StreamEvent::text_delta("Hel")]));
}

#[test]
fn chat_chunk_without_content_is_skipped() {
    let mut translator = EventTranslator::default();
    assert_eq!(
        translator.translate_payload(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#),
        Translated::Skip
    );
    assert_eq!(translator.translate_payload(r#"{"choices":[]}"#), Translated::Skip);
}

#[test]
fn malformed_and_unknown_frames_are_skipped() {
    let mut translator = EventTranslator::default();
    assert_eq!(translator.translate_payload("{not json"), Translated::Skip);
    assert_eq!(translator.translate_payload(r#"{"object":"ping"}"#), Translated::Skip);
    assert_eq!(translator.translate_payload(r#"{"type":"future_event"}"#), Translated::Skip);
}

#[test]
fn chat_tool_call_fragments_are_forwarded() {
    let mut translator = EventTranslator::default();
    let translated = translator.translate_payload(
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_9","type":"function","function":{"name":"grep","arguments":"{\"q\""}}]}}]}"#,
    );
    assert_eq!(
        translated,
        Translated::Emit(vec![StreamEvent::ToolCall(ToolCallDelta {
            index: 0,
            call_id: Some("call_9".to_owned()),
            tool_name: Some("grep".to_owned()),
            arguments: "{\"q\"".to_owned(),
        })])
    );
}

#[test]
fn chat_finish_reason_and_usage_reach_finish_event() {
    let mut translator = EventTranslator::default();
    translator.translate_payload(r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#);
    translator.translate_payload(
        r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":34,"total_tokens":46}}"#,
    );

    assert_eq!(
        translator.finish_event(),
        StreamEvent::Finish {
            reason: FinishReason::Length,
            usage: Some(Usage {
                prompt_tokens: Some(12),
                completion_tokens: Some(34),
            }),
        }
    );
}

#[test]
fn finish_defaults_to_stop_without_usage() {
    let translator = EventTranslator::default();
    assert_eq!(
        translator.finish_event(),
        StreamEvent::Finish {
            reason: FinishReason::Stop,
            usage: None,
        }
    );
}

#[test]
fn message_stream_events_are_recognized() {
    let mut translator = EventTranslator::default();
    assert_eq!(
        translator.translate_payload(
            r#"{"type":"message_start","message":{"usage":{"input_tokens":5,"output_tokens":1}}}"#
        ),
        Translated::Skip
    );
    assert_eq!(
        translator.translate_payload(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#
        ),
        Translated::Emit(vec![StreamEvent::text_delta("Hi")])
    );
    assert_eq!(
        translator.translate_payload(
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":7}}"#
        ),
        Translated::Skip
    );

    assert_eq!(translator.finish_reason(), Some(&FinishReason::Stop));
    assert_eq!(
        translator.usage(),
        Usage {
            prompt_tokens: Some(5),
            completion_tokens: Some(7),
        }
    );
}

#[test]
fn in_stream_error_frames_are_skipped_without_ending_translation() {
    let mut translator = EventTranslator::default();
    assert_eq!(
        translator.translate_payload(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#
        ),
        Translated::Skip
    );
    assert_eq!(
        translator.translate_payload(r#"{"error":"context length exceeded"}"#),
        Translated::Skip
    );
    assert_eq!(
        translator.translate_payload(r#"{"choices":[{"delta":{"content":"after"}}]}"#),
        Translated::Emit(vec![StreamEvent::text_delta("after")])
    );
    assert_eq!(translator.finish_reason(), None);
}
