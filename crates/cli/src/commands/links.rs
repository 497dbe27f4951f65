//! `memoria link` / `memoria unlink`: Manage shared memory between devices.

use memoria_core::turn::DeviceId;

pub async fn link(device: String, target: String) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, service) = super::load_service().await?;
    let device = DeviceId::new(device);
    let target = DeviceId::new(target);

    if service.link_devices(&device, &target).await? {
        println!("Linked {device} <-> {target}");
    } else {
        println!("{device} and {target} were already linked");
    }
    Ok(())
}

pub async fn unlink(device: String, target: String) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, service) = super::load_service().await?;
    let device = DeviceId::new(device);
    let target = DeviceId::new(target);

    if service.unlink_devices(&device, &target).await? {
        println!("Unlinked {device} <-> {target}");
    } else {
        println!("{device} and {target} were not linked");
    }
    Ok(())
}
