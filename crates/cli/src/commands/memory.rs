//! `memoria memory`: Inspect and prune a device's conversation log.

use memoria_core::turn::{ConversationId, DeviceId};

pub async fn show(device: String, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let (config, service) = super::load_service().await?;
    let device = DeviceId::new(device);

    println!("Memory for {device}");
    println!("====================");
    println!("  Backend:    {}", service.storage_backend());
    if config.memory.backend != "in_memory" {
        println!("  Data dir:   {}", config.data_dir().display());
    }

    let linked = service.linked_devices(&device);
    if !linked.is_empty() {
        let names: Vec<_> = linked.iter().map(DeviceId::as_str).collect();
        println!("  Linked:     {}", names.join(", "));
    }
    println!();

    let turns = service.read_memory(&device, limit).await?;
    if turns.is_empty() {
        println!("   No turns stored.");
        return Ok(());
    }

    for turn in &turns {
        let preview: String = turn.content.chars().take(80).collect();
        println!(
            "  {} {:<9} {}",
            turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
            turn.role.as_str(),
            preview
        );
    }
    println!();
    println!("  {} turn(s)", turns.len());

    Ok(())
}

pub async fn forget(device: String, conversation: String) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, service) = super::load_service().await?;
    let device = DeviceId::new(device);
    let conversation = ConversationId::from(conversation.as_str());

    let removed = service.delete_conversation(&device, &conversation).await?;
    println!("Removed {removed} turn(s) from conversation {conversation}");
    Ok(())
}
