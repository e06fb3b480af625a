// src/bot/extract.rs - Best-effort plain text from the alternative message shapes

use log::warn;
use serde::Deserialize;

use crate::types::{GuardError, MessagePayload};

type Extractor = fn(&MessagePayload) -> Result<Option<String>, GuardError>;

/// Shapes in priority order; the first one with non-empty text supplies it
const EXTRACTORS: [(&str, Extractor); 12] = [
    ("conversation", |p| Ok(non_empty(&p.conversation))),
    ("extended_text", |p| Ok(non_empty(&p.extended_text))),
    ("image_caption", |p| Ok(non_empty(&p.image_caption))),
    ("video_caption", |p| Ok(non_empty(&p.video_caption))),
    ("document_caption", |p| Ok(non_empty(&p.document_caption))),
    ("buttons_content", |p| Ok(non_empty(&p.buttons_content_text))),
    ("buttons_response", |p| {
        Ok(p.buttons_response
            .as_ref()
            .and_then(|r| selection(&r.selected_display_text, &r.selected_button_id)))
    }),
    ("list_description", |p| Ok(non_empty(&p.list_description))),
    ("list_response", |p| {
        Ok(p.list_response
            .as_ref()
            .and_then(|r| selection(&r.title, &r.selected_row_id)))
    }),
    ("interactive_response", interactive_text),
    ("template_reply", |p| {
        Ok(p.template_reply
            .as_ref()
            .and_then(|r| selection(&r.selected_display_text, &r.selected_id)))
    }),
    ("reaction", |p| Ok(non_empty(&p.reaction_text))),
];

fn non_empty(field: &Option<String>) -> Option<String> {
    field.as_ref().filter(|s| !s.is_empty()).cloned()
}

/// A selection reply only counts when it carries its id; the label wins when set
fn selection(label: &Option<String>, id: &Option<String>) -> Option<String> {
    let id = non_empty(id)?;
    Some(non_empty(label).unwrap_or(id))
}

#[derive(Deserialize)]
struct NativeFlowParams {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

fn interactive_text(payload: &MessagePayload) -> Result<Option<String>, GuardError> {
    let Some(raw) = non_empty(&payload.interactive_params_json) else {
        return Ok(None);
    };
    let params: NativeFlowParams = serde_json::from_str(&raw)
        .map_err(|e| GuardError::Classification(format!("interactive params: {}", e)))?;
    Ok(Some(non_empty(&params.id).or(params.text).unwrap_or_default()))
}

/// Text of the first shape present, where empty fields count as absent.
/// An undecodable shape counts as present but empty, so later shapes are
/// not consulted.
pub fn extract_text(payload: &MessagePayload) -> String {
    for (shape, extractor) in EXTRACTORS.iter() {
        match extractor(payload) {
            Ok(Some(text)) => return text,
            Ok(None) => continue,
            Err(e) => {
                warn!("Treating {} as empty: {}", shape, e);
                return String::new();
            }
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ButtonsResponse, ListResponse, TemplateReply};

    #[test]
    fn test_priority_order() {
        let payload = MessagePayload {
            image_caption: Some("caption".into()),
            reaction_text: Some("👍".into()),
            ..MessagePayload::default()
        };
        assert_eq!(extract_text(&payload), "caption");

        let payload = MessagePayload {
            conversation: Some("body".into()),
            extended_text: Some("extended".into()),
            ..MessagePayload::default()
        };
        assert_eq!(extract_text(&payload), "body");
    }

    #[test]
    fn test_selection_replies_prefer_display_text() {
        let payload = MessagePayload {
            buttons_response: Some(ButtonsResponse {
                selected_display_text: Some("Yes".into()),
                selected_button_id: Some("btn-yes".into()),
            }),
            ..MessagePayload::default()
        };
        assert_eq!(extract_text(&payload), "Yes");

        let payload = MessagePayload {
            list_response: Some(ListResponse { title: None, selected_row_id: Some("row-2".into()) }),
            ..MessagePayload::default()
        };
        assert_eq!(extract_text(&payload), "row-2");

        let payload = MessagePayload {
            template_reply: Some(TemplateReply {
                selected_display_text: None,
                selected_id: Some(".menu".into()),
            }),
            ..MessagePayload::default()
        };
        assert_eq!(extract_text(&payload), ".menu");
    }

    #[test]
    fn test_interactive_params() {
        let payload = MessagePayload {
            interactive_params_json: Some(r#"{"id":".tagall","text":"Tag"}"#.into()),
            ..MessagePayload::default()
        };
        assert_eq!(extract_text(&payload), ".tagall");

        let payload = MessagePayload {
            interactive_params_json: Some(r#"{"text":"Tag"}"#.into()),
            ..MessagePayload::default()
        };
        assert_eq!(extract_text(&payload), "Tag");
    }

    #[test]
    fn test_malformed_interactive_params_yield_empty_text() {
        let payload = MessagePayload {
            interactive_params_json: Some("{broken".into()),
            reaction_text: Some("🔥".into()),
            ..MessagePayload::default()
        };
        assert_eq!(extract_text(&payload), "");
    }

    #[test]
    fn test_no_shape_present() {
        assert_eq!(extract_text(&MessagePayload::default()), "");
    }

    #[test]
    fn test_empty_body_falls_through_to_caption() {
        let payload = MessagePayload {
            conversation: Some(String::new()),
            image_caption: Some("join https://chat.whatsapp.com/Abc".into()),
            ..MessagePayload::default()
        };
        assert_eq!(extract_text(&payload), "join https://chat.whatsapp.com/Abc");
    }

    #[test]
    fn test_selection_without_id_is_skipped() {
        let payload = MessagePayload {
            buttons_response: Some(ButtonsResponse {
                selected_display_text: Some("Yes".into()),
                selected_button_id: None,
            }),
            list_response: Some(ListResponse { title: Some("Row".into()), selected_row_id: Some(String::new()) }),
            template_reply: Some(TemplateReply {
                selected_display_text: Some("Menu".into()),
                selected_id: None,
            }),
            reaction_text: Some("👍".into()),
            ..MessagePayload::default()
        };
        assert_eq!(extract_text(&payload), "👍");
    }
}
