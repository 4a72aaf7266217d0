use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use vehiclink_db::models::{InboxRow, MessageRow};
use vehiclink_types::api::{
    ConversationSummary, MessageResponse, SendMessageRequest, SendMessageResponse,
};

use crate::auth::AppState;
use crate::error::{ApiError, ApiJson, ApiResult, blocking};
use crate::input::{parse_user_id, present};

pub const MAX_MESSAGE_CHARS: usize = 2000;

/// POST /messages/send
pub async fn send_message(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> ApiResult<Json<SendMessageResponse>> {
    let (Some(sender), Some(receiver), Some(_)) = (
        present(&req.sender_id),
        present(&req.receiver_id),
        present(&req.text),
    ) else {
        return Err(ApiError::validation("All fields required"));
    };

    let sender_id = parse_user_id(sender)?.to_string();
    let receiver_id = parse_user_id(receiver)?.to_string();
    let text = req.text.unwrap_or_default();
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::validation(format!(
            "Message must be at most {} characters",
            MAX_MESSAGE_CHARS
        )));
    }

    let message_id = Uuid::new_v4();
    let mid = message_id.to_string();

    blocking(move || {
        if state.db.count_existing_users(&[sender_id.as_str(), receiver_id.as_str()])? != 2 {
            return Err(ApiError::NotFound("User not found"));
        }
        state.db.insert_message(&mid, &sender_id, &receiver_id, &text)?;
        Ok(())
    })
    .await?;

    Ok(Json(SendMessageResponse {
        message: "Message sent successfully".to_string(),
        message_id,
    }))
}

/// GET /messages/chat/{other_user_id}/{my_user_id}
///
/// Opening a conversation marks the other party's messages as seen.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path((other_user_id, my_user_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let other = parse_user_id(&other_user_id)?.to_string();
    let me = parse_user_id(&my_user_id)?.to_string();

    let (marked, rows) = blocking(move || Ok(state.db.open_conversation(&me, &other)?)).await?;
    if marked > 0 {
        debug!("Marked {} messages seen", marked);
    }

    Ok(Json(rows.into_iter().map(message_response).collect()))
}

/// GET /messages/inbox/{user_id}
pub async fn get_inbox(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let user_id = parse_user_id(&user_id)?.to_string();

    let uid = user_id.clone();
    let rows = blocking(move || Ok(state.db.get_inbox_messages(&uid)?)).await?;

    Ok(Json(summarize_inbox(&user_id, rows)))
}

/// Group newest-first inbox rows by conversation partner.
///
/// Partners keep the order of their most recent message. A conversation is
/// unread when any row received by `user_id` is still unseen.
pub fn summarize_inbox(user_id: &str, rows: Vec<InboxRow>) -> Vec<ConversationSummary> {
    let mut summaries: Vec<ConversationSummary> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let msg = &row.message;
        let (partner_id, partner_name) = if msg.sender_id == user_id {
            (&msg.receiver_id, &row.receiver_name)
        } else {
            (&msg.sender_id, &row.sender_name)
        };

        let unread = msg.receiver_id == user_id && !msg.seen;

        match index.get(partner_id).copied() {
            Some(i) => summaries[i].has_unread |= unread,
            None => {
                index.insert(partner_id.clone(), summaries.len());
                summaries.push(ConversationSummary {
                    user_id: parse_id(partner_id, &msg.id),
                    name: partner_name.clone(),
                    has_unread: unread,
                    last_message: msg.text.clone(),
                    last_message_at: parse_timestamp(&msg.created_at, &msg.id),
                });
            }
        }
    }

    summaries
}

fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: parse_id(&row.id, &row.id),
        sender: parse_id(&row.sender_id, &row.id),
        receiver: parse_id(&row.receiver_id, &row.id),
        created_at: parse_timestamp(&row.created_at, &row.id),
        text: row.text,
        seen: row.seen,
    }
}

fn parse_id(raw: &str, message_id: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}' on message '{}': {}", raw, message_id, e);
        Uuid::default()
    })
}

fn parse_timestamp(raw: &str, message_id: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt created_at '{}' on message '{}': {}", raw, message_id, e);
        DateTime::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: &str = "00000000-0000-0000-0000-00000000000a";
    const RAVI: &str = "00000000-0000-0000-0000-00000000000b";
    const MEERA: &str = "00000000-0000-0000-0000-00000000000c";

    fn name_of(id: &str) -> &'static str {
        match id {
            ME => "me",
            RAVI => "ravi",
            _ => "meera",
        }
    }

    fn row(n: u32, from: &str, to: &str, seen: bool) -> InboxRow {
        InboxRow {
            message: MessageRow {
                id: format!("00000000-0000-0000-0001-{:012}", n),
                sender_id: from.to_string(),
                receiver_id: to.to_string(),
                text: format!("msg {}", n),
                seen,
                created_at: format!("2026-01-01T00:00:{:02}.000Z", n),
            },
            sender_name: name_of(from).to_string(),
            receiver_name: name_of(to).to_string(),
        }
    }

    #[test]
    fn groups_by_partner_in_recency_order() {
        let rows = vec![
            row(4, MEERA, ME, true),
            row(3, ME, RAVI, false),
            row(2, RAVI, ME, true),
            row(1, ME, MEERA, true),
        ];

        let inbox = summarize_inbox(ME, rows);
        assert_eq!(inbox.len(), 2);

        assert_eq!(inbox[0].user_id.to_string(), MEERA);
        assert_eq!(inbox[0].name, "meera");
        assert_eq!(inbox[0].last_message, "msg 4");

        assert_eq!(inbox[1].user_id.to_string(), RAVI);
        assert_eq!(inbox[1].name, "ravi");
        assert_eq!(inbox[1].last_message, "msg 3");
    }

    #[test]
    fn unread_only_counts_messages_received_by_viewer() {
        // My own unseen message to ravi must not flag the conversation
        let inbox = summarize_inbox(ME, vec![row(2, ME, RAVI, false), row(1, RAVI, ME, true)]);
        assert!(!inbox[0].has_unread);

        // An older unseen incoming message still flags it
        let inbox = summarize_inbox(ME, vec![row(2, RAVI, ME, true), row(1, RAVI, ME, false)]);
        assert!(inbox[0].has_unread);
    }

    #[test]
    fn empty_inbox() {
        assert!(summarize_inbox(ME, Vec::new()).is_empty());
    }

    #[test]
    fn corrupt_timestamp_falls_back_to_epoch() {
        let mut r = row(1, RAVI, ME, true);
        r.message.created_at = "yesterday".to_string();

        let inbox = summarize_inbox(ME, vec![r]);
        assert_eq!(inbox[0].last_message_at, DateTime::<Utc>::default());
    }
}
