//! `memoria chat`: Send a single message and print the reply.

use memoria_agent::SendMessage;
use memoria_core::turn::ConversationId;

pub async fn run(
    device: String,
    message: String,
    conversation: Option<String>,
    model: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, service) = super::load_service().await?;

    let mut request = SendMessage::new(device, message);
    if let Some(id) = conversation {
        request = request.in_conversation(ConversationId::from(id.as_str()));
    }
    if let Some(model) = model {
        request = request.with_model(model);
    }

    let response = service.send_message(request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("{}", response.response_text);
    println!();
    let category = response
        .category
        .map(|c| c.as_str())
        .unwrap_or("override");
    println!(
        "   model: {}  category: {}  reason: {}  attempts: {}  context: {}",
        response.model_used,
        category,
        response.reason_code.as_str(),
        response.attempts,
        if response.context_used { "yes" } else { "no" },
    );
    println!("   conversation: {}", response.conversation_id);

    Ok(())
}
