use clap::Subcommand;
use serde_json::json;

use crate::util::{api_request, parse_payload};

#[derive(Subcommand)]
pub enum AssistantCommands {
    /// Submit one classified conversational turn
    Turn {
        /// Intent family (e.g. "create_task", "create_programme")
        #[arg(long)]
        intent_type: String,
        /// Extracted fields as a JSON object
        #[arg(long)]
        payload: Option<String>,
        /// Required fields still missing, in ask-order (repeatable)
        #[arg(long = "missing")]
        missing_fields: Vec<String>,
        /// Question to ask the user for the next missing field
        #[arg(long)]
        follow_up: Option<String>,
    },
    /// Show the active pending intent
    Pending,
    /// Confirm and execute an action
    Confirm {
        /// Action to execute (e.g. "create_task")
        #[arg(long)]
        action_type: String,
        /// Final action payload as a JSON object
        #[arg(long)]
        payload: Option<String>,
    },
    /// Cancel the active pending intent
    Cancel,
}

pub async fn run(api_url: &str, actor_id: &str, command: AssistantCommands) -> i32 {
    match command {
        AssistantCommands::Turn {
            intent_type,
            payload,
            missing_fields,
            follow_up,
        } => {
            let body = json!({
                "intent_type": intent_type,
                "draft_payload": parse_payload(payload.as_deref()),
                "missing_fields": missing_fields,
                "follow_up_question": follow_up,
            });
            api_request(
                api_url,
                reqwest::Method::POST,
                "/v1/assistant/turn",
                Some(actor_id),
                Some(body),
            )
            .await
        }
        AssistantCommands::Pending => {
            api_request(
                api_url,
                reqwest::Method::GET,
                "/v1/assistant/pending",
                Some(actor_id),
                None,
            )
            .await
        }
        AssistantCommands::Confirm {
            action_type,
            payload,
        } => {
            let body = json!({
                "action_type": action_type,
                "payload": parse_payload(payload.as_deref()),
            });
            api_request(
                api_url,
                reqwest::Method::POST,
                "/v1/assistant/confirm",
                Some(actor_id),
                Some(body),
            )
            .await
        }
        AssistantCommands::Cancel => {
            api_request(
                api_url,
                reqwest::Method::POST,
                "/v1/assistant/cancel",
                Some(actor_id),
                None,
            )
            .await
        }
    }
}
