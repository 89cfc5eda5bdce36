//! Tests for webhook parsing and normalization.

use super::*;
use chrono::TimeZone;

fn received_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
}

fn merchant() -> MerchantId {
    MerchantId::new("merchant-1").unwrap()
}

fn delivery_with_message(message: serde_json::Value) -> WebhookPayload {
    let body = serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA_ID",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "+2348000000000",
                        "phone_number_id": "1098765"
                    },
                    "contacts": [{"profile": {"name": "Ada"}, "wa_id": "2348011111111"}],
                    "messages": [message]
                }
            }]
        }]
    });
    WebhookPayload::parse(body.to_string().as_bytes()).unwrap()
}

fn single_job(message: serde_json::Value) -> ProcessingJob {
    let mut delivery = normalize(&delivery_with_message(message));
    assert_eq!(delivery.units.len(), 1);
    delivery.units.remove(0).into_job(merchant(), received_at())
}

mod parsing {
    use super::*;

    #[test]
    fn test_invalid_json_is_rejected() {
        let result = WebhookPayload::parse(b"{not json");
        assert!(matches!(result, Err(WebhookError::InvalidPayload { .. })));
    }

    #[test]
    fn test_wrong_field_type_is_rejected() {
        let result = WebhookPayload::parse(br#"{"object":"x","entry":"oops"}"#);
        assert!(matches!(result, Err(WebhookError::InvalidPayload { .. })));
    }

    #[test]
    fn test_missing_fields_default() {
        let payload = WebhookPayload::parse(b"{}").unwrap();

        assert_eq!(payload, WebhookPayload::default());
        assert!(normalize(&payload).is_empty());
    }

    #[test]
    fn test_signature_errors_are_security_errors() {
        assert!(WebhookError::MissingSignature.is_security());
        assert!(!WebhookError::InvalidPayload {
            message: String::new()
        }
        .is_security());
    }
}

mod normalization {
    use super::*;

    #[test]
    fn test_units_and_statuses_keep_payload_order() {
        // Arrange
        let body = serde_json::json!({
            "entry": [
                {"changes": [{
                    "field": "messages",
                    "value": {
                        "metadata": {"display_phone_number": "+111"},
                        "messages": [
                            {"id": "m1", "type": "text", "text": {"body": "a"}},
                            {"id": "m2", "type": "text", "text": {"body": "b"}}
                        ],
                        "statuses": [{"id": "s1", "status": "sent"}]
                    }
                }]},
                {"changes": [{
                    "field": "messages",
                    "value": {
                        "metadata": {"display_phone_number": "+222"},
                        "messages": [{"id": "m3", "type": "text", "text": {"body": "c"}}]
                    }
                }]}
            ]
        });
        let payload = WebhookPayload::parse(body.to_string().as_bytes()).unwrap();

        // Act
        let delivery = normalize(&payload);

        // Assert
        let ids: Vec<_> = delivery.units.iter().map(|u| u.message.id.as_str()).collect();
        let phones: Vec<_> = delivery
            .units
            .iter()
            .map(|u| u.business_phone.as_str())
            .collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        assert_eq!(phones, vec!["+111", "+111", "+222"]);
        assert_eq!(
            delivery.statuses,
            vec![StatusUpdate {
                message_id: "s1".to_string(),
                status: "sent".to_string()
            }]
        );
    }

    #[test]
    fn test_non_message_fields_produce_no_units() {
        let body = serde_json::json!({
            "entry": [{"changes": [{
                "field": "account_update",
                "value": {
                    "messages": [{"id": "m1", "type": "text"}],
                    "statuses": [{"id": "s1", "status": "read"}]
                }
            }]}]
        });
        let payload = WebhookPayload::parse(body.to_string().as_bytes()).unwrap();

        let delivery = normalize(&payload);

        assert!(delivery.units.is_empty());
        assert_eq!(delivery.statuses.len(), 1);
    }
}

mod content_extraction {
    use super::*;

    #[test]
    fn test_text_message() {
        let job = single_job(serde_json::json!({
            "from": "2348011111111",
            "id": "wamid.1",
            "timestamp": "1700000000",
            "type": "text",
            "text": {"body": "Do you have merino?"}
        }));

        assert_eq!(job.kind, MessageKind::Text);
        assert_eq!(job.content, "Do you have merino?");
        assert_eq!(job.message_id, "wamid.1");
        assert_eq!(job.from, "2348011111111");
        assert_eq!(job.to, "+2348000000000");
        assert_eq!(job.business_phone, "+2348000000000");
        assert_eq!(job.timestamp, "1700000000");
        assert_eq!(job.received_at, received_at());
        assert_eq!(job.merchant_id, merchant());
    }

    #[test]
    fn test_audio_message_uses_placeholder() {
        let job = single_job(serde_json::json!({
            "id": "wamid.2",
            "type": "audio",
            "audio": {"id": "media-9", "mime_type": "audio/ogg"}
        }));

        assert_eq!(job.kind, MessageKind::Audio);
        assert_eq!(job.content, "[Audio Message]");
        assert_eq!(job.audio_id.as_deref(), Some("media-9"));
        assert!(job.image_id.is_none());
    }

    #[test]
    fn test_image_message_uses_caption() {
        let job = single_job(serde_json::json!({
            "id": "wamid.3",
            "type": "image",
            "image": {"id": "media-7", "mime_type": "image/jpeg", "caption": "this one"}
        }));

        assert_eq!(job.kind, MessageKind::Image);
        assert_eq!(job.content, "this one");
        assert_eq!(job.image_id.as_deref(), Some("media-7"));
    }

    #[test]
    fn test_image_without_caption_has_empty_content() {
        let job = single_job(serde_json::json!({
            "id": "wamid.4",
            "type": "image",
            "image": {"id": "media-8"}
        }));

        assert_eq!(job.content, "");
        assert_eq!(job.image_id.as_deref(), Some("media-8"));
    }

    #[test]
    fn test_button_reply_uses_title() {
        let job = single_job(serde_json::json!({
            "id": "wamid.5",
            "type": "interactive",
            "interactive": {
                "type": "button_reply",
                "button_reply": {"id": "buy_1", "title": "Buy Now"}
            }
        }));

        assert_eq!(job.kind, MessageKind::Interactive);
        assert_eq!(job.content, "Buy Now");
        assert_eq!(
            job.interactive_data,
            Some(InteractiveData {
                kind: "button_reply".to_string(),
                button_reply: Some(ButtonReply {
                    id: "buy_1".to_string(),
                    title: "Buy Now".to_string()
                }),
            })
        );
    }

    #[test]
    fn test_interactive_without_button_reply_has_empty_content() {
        let job = single_job(serde_json::json!({
            "id": "wamid.6",
            "type": "interactive",
            "interactive": {"type": "list_reply"}
        }));

        assert_eq!(job.content, "");
        assert_eq!(
            job.interactive_data,
            Some(InteractiveData {
                kind: "list_reply".to_string(),
                button_reply: None
            })
        );
    }

    #[test]
    fn test_unsupported_type_becomes_unknown() {
        let job = single_job(serde_json::json!({
            "id": "wamid.7",
            "type": "sticker",
            "sticker": {"id": "media-1"}
        }));

        assert_eq!(job.kind, MessageKind::Unknown);
        assert_eq!(job.content, "");
        assert!(job.audio_id.is_none());
        assert!(job.image_id.is_none());
        assert!(job.interactive_data.is_none());
    }
}

mod missing_objects {
    use super::*;

    #[test]
    fn test_image_without_image_object_has_no_side_fields() {
        let job = single_job(serde_json::json!({"id": "wamid.8", "type": "image"}));

        assert_eq!(job.kind, MessageKind::Image);
        assert_eq!(job.content, "");
        assert!(job.image_id.is_none());

        let wire = serde_json::to_value(&job).unwrap();
        assert!(wire.get("image_id").is_none());
    }

    #[test]
    fn test_audio_without_audio_object_has_no_placeholder() {
        let job = single_job(serde_json::json!({"id": "wamid.9", "type": "audio"}));

        assert_eq!(job.kind, MessageKind::Audio);
        assert_eq!(job.content, "");
        assert!(job.audio_id.is_none());
    }

    #[test]
    fn test_interactive_without_interactive_object_has_no_data() {
        let job = single_job(serde_json::json!({"id": "wamid.10", "type": "interactive"}));

        assert_eq!(job.kind, MessageKind::Interactive);
        assert_eq!(job.content, "");
        assert!(job.interactive_data.is_none());

        let wire = serde_json::to_value(&job).unwrap();
        assert!(wire.get("interactive_data").is_none());
    }

    #[test]
    fn test_empty_media_id_is_omitted() {
        let job = single_job(serde_json::json!({
            "id": "wamid.11",
            "type": "audio",
            "audio": {"mime_type": "audio/ogg"}
        }));

        assert_eq!(job.content, "[Audio Message]");
        assert!(job.audio_id.is_none());
    }
}

mod null_arrays {
    use super::*;

    #[test]
    fn test_null_arrays_read_as_empty() {
        // Arrange
        let body = serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "WABA_ID",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "metadata": {"display_phone_number": "+2348000000000"},
                        "contacts": null,
                        "statuses": null,
                        "messages": [{"id": "m1", "type": "text", "text": {"body": "hi"}}]
                    }
                }, {
                    "field": "messages",
                    "value": {"messages": null}
                }]
            }, {
                "id": "OTHER",
                "changes": null
            }]
        });

        // Act
        let payload = WebhookPayload::parse(body.to_string().as_bytes()).unwrap();
        let delivery = normalize(&payload);

        // Assert
        assert_eq!(delivery.units.len(), 1);
        assert_eq!(delivery.units[0].message.id, "m1");
        assert!(delivery.statuses.is_empty());
    }

    #[test]
    fn test_null_entry_is_empty_delivery() {
        let payload = WebhookPayload::parse(br#"{"object":"x","entry":null}"#).unwrap();

        assert!(payload.entry.is_empty());
        assert!(normalize(&payload).is_empty());
    }
}
